use anyhow::Result;
use pilecursor::base_utils::{DEFAULT_INDEL_QUAL, DELETION_BASE, DELETION_INDEX, DELETION_QUAL};
use pilecursor::pileup_element::sort_elements;
use pilecursor::{
    AlignedRead, ByOffsetThenStart, CigarProgram, ElementFacts, ElementOrder, PileupElement, PileupError,
    ReadRecord,
};
use proptest::prelude::*;
use std::cmp::Ordering;

fn matched_read(name: &str, start: i64, bases: &[u8], quals: Vec<u8>) -> Result<ReadRecord> {
    let cigar = CigarProgram::parse(&format!("{}M", bases.len()))?;
    Ok(ReadRecord::new(name, start, cigar, bases.to_vec(), quals)?)
}

fn plain(read: &ReadRecord, offset: i64) -> Result<PileupElement<'_, ReadRecord>> {
    Ok(PileupElement::from_facts(read, ElementFacts::at_offset(offset))?)
}

#[test]
fn test_deletion_with_negative_offset_fails() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![30; 4])?;
    let result = PileupElement::new(&read, -1, true, false, false, false, false, false, None, -1);
    assert!(matches!(result, Err(PileupError::InvalidConstruction(_))));
    Ok(())
}

#[test]
fn test_offset_outside_read_fails() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![30; 4])?;
    for (offset, is_deletion) in [(-2, false), (4, false), (4, true), (10, false)] {
        let result = PileupElement::new(&read, offset, is_deletion, false, false, false, false, false, None, -1);
        assert!(
            matches!(result, Err(PileupError::InvalidConstruction(_))),
            "offset {} should be rejected",
            offset
        );
    }
    assert!(plain(&read, 3).is_ok());
    assert!(plain(&read, -1).is_ok());
    Ok(())
}

#[test]
fn test_event_normalization() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![30; 4])?;

    let no_event = PileupElement::new(&read, 1, false, false, false, false, false, false, Some("TT".into()), 2)?;
    assert_eq!(no_event.event_bases(), None);
    assert_eq!(no_event.event_length(), -1);

    let before_deletion = PileupElement::new(&read, 1, false, true, false, false, false, false, Some("TT".into()), 3)?;
    assert_eq!(before_deletion.event_bases(), None);
    assert_eq!(before_deletion.event_length(), 3);
    assert!(before_deletion.is_before_deletion_start());

    let before_insertion = PileupElement::new(&read, 1, false, false, false, true, false, false, Some("TT".into()), 2)?;
    assert_eq!(before_insertion.event_bases(), Some("TT"));
    assert_eq!(before_insertion.event_length(), 2);
    Ok(())
}

#[test]
fn test_deletion_adjacency_predicates() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![30; 4])?;
    let inside = PileupElement::new(&read, 1, true, true, true, false, false, false, None, 2)?;
    assert!(inside.is_before_deleted_base());
    assert!(!inside.is_before_deletion_start());
    assert!(inside.is_after_deleted_base());
    assert!(!inside.is_after_deletion_end());

    let after = PileupElement::new(&read, 2, false, false, true, false, false, false, None, -1)?;
    assert!(after.is_after_deletion_end());
    Ok(())
}

#[test]
fn test_accessors_read_through_to_the_read() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![20, 21, 22, 23])?
        .with_mapping_quality(37)
        .with_reverse_strand(true)
        .with_indel_qualities(vec![40, 41, 42, 43], vec![50, 51, 52, 53])?;
    let element = plain(&read, 2)?;

    assert_eq!(element.base(), b'G');
    assert_eq!(element.base_index(), Some(2));
    assert_eq!(element.quality(), 22);
    assert_eq!(element.base_insertion_quality(), 42);
    assert_eq!(element.base_deletion_quality(), 52);
    assert_eq!(element.mapping_quality(), 37);
    assert!(element.is_reverse_strand());
    assert_eq!(element.read().name(), "r1");
    assert_eq!(element.to_string(), "r1 @ 2 = G Q22");
    Ok(())
}

#[test]
fn test_missing_indel_qualities_use_default() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![30; 4])?;
    let element = plain(&read, 0)?;
    assert_eq!(element.base_insertion_quality(), DEFAULT_INDEL_QUAL);
    assert_eq!(element.base_deletion_quality(), DEFAULT_INDEL_QUAL);
    Ok(())
}

#[test]
fn test_synthetic_base() -> Result<()> {
    let read = matched_read("r1", 100, b"ACGT", vec![30; 4])?;
    let deletion = PileupElement::new(&read, 1, true, false, false, false, false, false, None, -1)?;
    assert_eq!(deletion.base(), DELETION_BASE);
    assert_eq!(deletion.base_index(), Some(DELETION_INDEX));

    let leading = PileupElement::new(&read, -1, false, false, false, true, false, false, Some("A".into()), 1)?;
    assert!(leading.is_insertion_at_beginning_of_read());
    assert_eq!(leading.base(), DELETION_BASE);
    assert_eq!(leading.to_string(), "r1 @ -1 = D Q16");
    Ok(())
}

#[test]
fn test_representative_count() -> Result<()> {
    let plain_read = matched_read("plain", 100, b"ACGTA", vec![30; 5])?;
    assert_eq!(plain(&plain_read, 2)?.representative_count()?, 1);

    let reduced = matched_read("reduced", 100, b"ACGTA", vec![30; 5])?.with_reduced_counts(vec![3, 5, 4, 8, 1])?;
    assert_eq!(plain(&reduced, 3)?.representative_count()?, 8);

    let deletion = PileupElement::new(&reduced, 1, true, false, false, false, false, false, None, -1)?;
    // (5 + 4) / 2 rounds half up
    assert_eq!(deletion.representative_count()?, 5);

    let at_end = PileupElement::new(&reduced, 4, true, false, false, false, false, false, None, -1)?;
    assert!(matches!(
        at_end.representative_count(),
        Err(PileupError::MalformedAlignment(_))
    ));

    let leading = PileupElement::new(&reduced, -1, false, false, false, true, false, false, Some("A".into()), 1)?;
    assert_eq!(leading.representative_count()?, 1);
    Ok(())
}

#[test]
fn test_sort_by_offset_then_start() -> Result<()> {
    let early = matched_read("early", 100, b"ACGTACGT", vec![30; 8])?;
    let late = matched_read("late", 103, b"ACGTACGT", vec![30; 8])?;
    let mut elements = vec![plain(&late, 2)?, plain(&early, 5)?, plain(&early, 2)?, plain(&late, 0)?];

    sort_elements(&mut elements, &ByOffsetThenStart);
    let order: Vec<(&str, i64)> = elements.iter().map(|e| (e.read().name(), e.offset())).collect();
    assert_eq!(order, vec![("late", 0), ("early", 2), ("late", 2), ("early", 5)]);
    Ok(())
}

/// Reverse alignment-start order, to show orderings are pluggable.
struct LatestStartFirst;

impl ElementOrder for LatestStartFirst {
    fn compare<R: AlignedRead>(&self, a: &PileupElement<'_, R>, b: &PileupElement<'_, R>) -> Ordering {
        b.read().alignment_start().cmp(&a.read().alignment_start())
    }
}

#[test]
fn test_custom_order() -> Result<()> {
    let early = matched_read("early", 100, b"ACGT", vec![30; 4])?;
    let late = matched_read("late", 102, b"ACGT", vec![30; 4])?;
    let mut elements = vec![plain(&early, 2)?, plain(&late, 0)?];
    sort_elements(&mut elements, &LatestStartFirst);
    assert_eq!(elements[0].read().name(), "late");
    Ok(())
}

fn key(e: &PileupElement<'_, ReadRecord>) -> (i64, i64) {
    (e.offset(), e.read().alignment_start())
}

proptest! {
    #[test]
    fn prop_synthetic_elements_report_deletion_quality(
        quals in prop::collection::vec(0u8..94, 2..40),
        insertion_quals in prop::collection::vec(0u8..94, 40),
        deletion_quals in prop::collection::vec(0u8..94, 40),
        offset_seed in 0usize..1000,
    ) {
        let n = quals.len();
        let bases = vec![b'C'; n];
        let read = matched_read("r", 0, &bases, quals).unwrap()
            .with_indel_qualities(insertion_quals[..n].to_vec(), deletion_quals[..n].to_vec())
            .unwrap();
        let offset = (offset_seed % n) as i64;

        let deletion = PileupElement::new(&read, offset, true, false, false, false, false, false, None, -1).unwrap();
        let leading = PileupElement::new(&read, -1, false, false, false, true, false, false, Some("C".into()), 1).unwrap();
        for element in [&deletion, &leading] {
            prop_assert_eq!(element.quality(), DELETION_QUAL);
            prop_assert_eq!(element.base_insertion_quality(), DELETION_QUAL);
            prop_assert_eq!(element.base_deletion_quality(), DELETION_QUAL);
        }
    }

    #[test]
    fn prop_order_is_offset_then_start(
        picks in prop::collection::vec((0i64..50, -1i64..6), 1..30),
    ) {
        let reads: Vec<ReadRecord> = picks
            .iter()
            .enumerate()
            .map(|(i, (start, _))| matched_read(&format!("r{}", i), *start, b"ACGTAC", vec![30; 6]).unwrap())
            .collect();
        let mut elements: Vec<PileupElement<'_, ReadRecord>> = reads
            .iter()
            .zip(picks.iter())
            .map(|(read, (_, offset))| plain(read, *offset).unwrap())
            .collect();

        for a in &elements {
            prop_assert_eq!(ByOffsetThenStart.compare(a, a), Ordering::Equal);
            for b in &elements {
                let ab = ByOffsetThenStart.compare(a, b);
                prop_assert_eq!(ab, key(a).cmp(&key(b)));
                prop_assert_eq!(ab.reverse(), ByOffsetThenStart.compare(b, a));
            }
        }

        sort_elements(&mut elements, &ByOffsetThenStart);
        for pair in elements.windows(2) {
            prop_assert!(key(&pair[0]) <= key(&pair[1]));
        }
    }
}
