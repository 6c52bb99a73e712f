//! Drives per-read cursors over reference columns and assembles pileup elements.

use crate::cigar_parser::Operation;
use crate::cigar_state::CigarCursor;
use crate::config::{MalformedReadPolicy, PileupConfig};
use crate::error::{PileupError, Result};
use crate::pileup_element::{sort_elements, ByOffsetThenStart, ElementFacts, ElementOrder, PileupElement};
use crate::read::{AlignedRead, ReadRecord};
use anyhow::Context;
use log::{debug, warn};
use rust_htslib::bam::{self, Read};
use std::io::Write;
use std::path::Path;

/// A read together with the cursor walking its CIGAR.
#[derive(Debug)]
pub struct ReadState<R: AlignedRead> {
    read: R,
    cursor: CigarCursor,
}

impl<R: AlignedRead> ReadState<R> {
    pub fn new(read: R) -> Self {
        let cursor = CigarCursor::new(read.cigar().clone());
        ReadState { read, cursor }
    }

    pub fn read(&self) -> &R {
        &self.read
    }

    pub fn cursor(&self) -> &CigarCursor {
        &self.cursor
    }

    /// Resolves `ref_pos` and derives the element context at it.
    ///
    /// Deletions are reported at the offset of the last read base before them.
    pub fn advance(&mut self, ref_pos: i64) -> Result<ElementFacts> {
        let query_pos = self.cursor.resolve(ref_pos, self.read.alignment_start())?;
        let cursor = &self.cursor;
        let current = *cursor.current().ok_or_else(|| {
            PileupError::MalformedAlignment(format!("no operation covers {} in {}", ref_pos, self.read.name()))
        })?;
        let within = cursor.offset_in_operation().unwrap_or(0);
        let at_first = within == 0;
        let at_last = within == current.len as i64 - 1;

        let is_deletion = cursor.is_deletion();
        let offset = if is_deletion {
            if cursor.query_start() == 0 {
                return Err(PileupError::MalformedAlignment(format!(
                    "read {} has a deletion before its first base (cigar {})",
                    self.read.name(),
                    self.read.cigar()
                )));
            }
            cursor.query_start() - 1
        } else {
            query_pos
        };

        let inside_deletion = current.op == Operation::Deletion;
        let previous = if at_first { cursor.previous().map(|e| e.op) } else { None };
        let next = if at_last { cursor.next().map(|e| e.op) } else { None };

        let is_before_deletion = cursor.is_next_deletion() || (inside_deletion && !at_last);
        let is_before_insertion = cursor.is_next_insertion();

        let mut facts = ElementFacts::at_offset(offset);
        facts.is_deletion = is_deletion;
        facts.is_before_deletion = is_before_deletion;
        facts.is_after_deletion = previous == Some(Operation::Deletion) || (inside_deletion && !at_first);
        facts.is_before_insertion = is_before_insertion;
        facts.is_after_insertion = previous == Some(Operation::Insertion);
        facts.is_next_to_soft_clip =
            previous == Some(Operation::SoftClip) || next == Some(Operation::SoftClip);

        if is_before_insertion {
            let len = cursor.next().map_or(0, |e| e.len as usize);
            facts.event_bases = Some(self.inserted_bases(offset + 1, len)?);
            facts.event_length = len as i64;
        } else if is_before_deletion {
            let deleted = if cursor.is_next_deletion() { cursor.next() } else { Some(&current) };
            facts.event_length = deleted.map_or(-1, |e| e.len as i64);
        }

        Ok(facts)
    }

    /// Context for a read that starts with an insertion, reported one column
    /// before its alignment start at the sentinel offset -1.
    pub fn leading_insertion_facts(&self) -> Result<Option<ElementFacts>> {
        let first = self
            .read
            .cigar()
            .iter()
            .find(|e| e.op != Operation::HardClip);
        match first {
            Some(e) if e.op == Operation::Insertion => {
                let mut facts = ElementFacts::at_offset(-1);
                facts.is_before_insertion = true;
                facts.event_bases = Some(self.inserted_bases(0, e.len as usize)?);
                facts.event_length = e.len as i64;
                Ok(Some(facts))
            }
            _ => Ok(None),
        }
    }

    pub fn leading_insertion(&self) -> Result<Option<PileupElement<'_, R>>> {
        match self.leading_insertion_facts()? {
            Some(facts) => Ok(Some(PileupElement::from_facts(&self.read, facts)?)),
            None => Ok(None),
        }
    }

    /// First column this read contributes to.
    pub fn first_column(&self) -> i64 {
        match self.leading_insertion_facts() {
            Ok(Some(_)) => self.read.alignment_start() - 1,
            _ => self.read.alignment_start(),
        }
    }

    /// Facts at `ref_pos`, or `None` when the read does not cover it.
    fn facts_at(&mut self, ref_pos: i64) -> Result<Option<ElementFacts>> {
        let start = self.read.alignment_start();
        if ref_pos < start {
            return if ref_pos == start - 1 {
                self.leading_insertion_facts()
            } else {
                Ok(None)
            };
        }
        if ref_pos > self.read.alignment_end() {
            return Ok(None);
        }
        self.advance(ref_pos).map(Some)
    }

    fn inserted_bases(&self, from: i64, len: usize) -> Result<String> {
        let from = from as usize;
        self.read
            .bases()
            .get(from..from + len)
            .map(|bases| String::from_utf8_lossy(bases).into_owned())
            .ok_or_else(|| {
                PileupError::MalformedAlignment(format!(
                    "insertion of {} bases at offset {} runs past the end of read {}",
                    len,
                    from,
                    self.read.name()
                ))
            })
    }
}

/// Turns a coordinate-sorted stream of reads on one contig into pileup columns.
pub struct PileupWalker<R: AlignedRead, O: ElementOrder = ByOffsetThenStart> {
    config: PileupConfig,
    order: O,
    active: Vec<ReadState<R>>,
    next_pos: Option<i64>,
    last_start: Option<i64>,
    skipped_reads: usize,
}

impl<R: AlignedRead> PileupWalker<R> {
    pub fn new(config: PileupConfig) -> Self {
        PileupWalker::with_order(config, ByOffsetThenStart)
    }
}

impl<R: AlignedRead, O: ElementOrder> PileupWalker<R, O> {
    pub fn with_order(config: PileupConfig, order: O) -> Self {
        PileupWalker {
            config,
            order,
            active: Vec::new(),
            next_pos: None,
            last_start: None,
            skipped_reads: 0,
        }
    }

    /// Reads dropped so far because they were malformed.
    pub fn skipped_reads(&self) -> usize {
        self.skipped_reads
    }

    /// Adds a read, emitting every column that can no longer gain elements.
    pub fn push<F>(&mut self, read: R, emit: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(i64, &[PileupElement<'_, R>]) -> anyhow::Result<()>,
    {
        if read.mapping_quality() < self.config.min_mapping_quality {
            return Ok(());
        }
        if read.cigar().reference_length() == 0 {
            debug!("Ignoring read {} without aligned bases", read.name());
            return Ok(());
        }

        let start = read.alignment_start();
        if let Some(last) = self.last_start {
            if start < last {
                anyhow::bail!(
                    "Reads are not coordinate sorted: {} starts at {} after a read starting at {}",
                    read.name(),
                    start,
                    last
                );
            }
        }
        self.last_start = Some(start);

        // a later read may still place a leading insertion at start - 1
        self.flush_before(start - 1, emit)?;

        let state = ReadState::new(read);
        let first = state.first_column();
        self.next_pos = Some(self.next_pos.map_or(first, |pos| pos.min(first)));
        self.active.push(state);
        Ok(())
    }

    /// Emits all remaining columns.
    pub fn finish<F>(&mut self, emit: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(i64, &[PileupElement<'_, R>]) -> anyhow::Result<()>,
    {
        self.flush_before(i64::MAX, emit)?;
        self.last_start = None;
        Ok(())
    }

    fn flush_before<F>(&mut self, limit: i64, emit: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(i64, &[PileupElement<'_, R>]) -> anyhow::Result<()>,
    {
        while let Some(pos) = self.next_pos {
            if pos >= limit {
                break;
            }
            self.emit_column(pos, emit)?;
            self.active.retain(|state| state.read().alignment_end() > pos);
            self.next_pos = if self.active.is_empty() { None } else { Some(pos + 1) };
        }
        Ok(())
    }

    fn emit_column<F>(&mut self, pos: i64, emit: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(i64, &[PileupElement<'_, R>]) -> anyhow::Result<()>,
    {
        let mut facts = Vec::with_capacity(self.active.len());
        let mut malformed = Vec::new();
        for (idx, state) in self.active.iter_mut().enumerate() {
            match state.facts_at(pos) {
                Ok(f) => facts.push(f),
                Err(e @ PileupError::MalformedAlignment(_)) => match self.config.malformed_reads {
                    MalformedReadPolicy::Skip => {
                        warn!("Skipping read {} at {}: {}", state.read().name(), pos, e);
                        malformed.push(idx);
                        facts.push(None);
                    }
                    MalformedReadPolicy::Abort => {
                        return Err(e).context(format!(
                            "Failed to resolve read {} at {}",
                            state.read().name(),
                            pos
                        ));
                    }
                },
                Err(e) => {
                    return Err(e).context(format!(
                        "Failed to resolve read {} at {}",
                        state.read().name(),
                        pos
                    ))
                }
            }
        }

        {
            let mut elements = Vec::with_capacity(facts.len());
            for (state, f) in self.active.iter().zip(facts) {
                if let Some(f) = f {
                    let element = PileupElement::from_facts(state.read(), f)?;
                    if self.keep(&element) {
                        elements.push(element);
                    }
                }
            }
            sort_elements(&mut elements, &self.order);
            if !elements.is_empty() {
                emit(pos, &elements)?;
            }
        }

        self.skipped_reads += malformed.len();
        for idx in malformed.into_iter().rev() {
            self.active.remove(idx);
        }
        Ok(())
    }

    fn keep(&self, element: &PileupElement<'_, R>) -> bool {
        if element.is_deletion() {
            return self.config.include_deletions;
        }
        element.is_insertion_at_beginning_of_read() || element.quality() >= self.config.min_base_quality
    }
}

/// Renders one column as `contig pos depth bases quals` with a 1-based position.
pub fn format_column<R: AlignedRead>(contig: &str, pos: i64, elements: &[PileupElement<'_, R>]) -> String {
    let mut bases = String::new();
    let mut quals = String::new();
    for element in elements {
        if element.is_deletion() || element.is_insertion_at_beginning_of_read() {
            bases.push('*');
        } else {
            let base = element.base() as char;
            bases.push(if element.is_reverse_strand() {
                base.to_ascii_lowercase()
            } else {
                base.to_ascii_uppercase()
            });
        }
        if let Some(inserted) = element.event_bases() {
            bases.push_str(&format!("+{}{}", inserted.len(), inserted));
        } else if element.is_before_deletion_start() {
            bases.push_str(&format!("-{}", element.event_length()));
        }
        quals.push((element.quality().min(93) + 33) as char);
    }
    format!("{}\t{}\t{}\t{}\t{}", contig, pos + 1, elements.len(), bases, quals)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PileupSummary {
    pub reads_used: usize,
    pub reads_skipped: usize,
    pub columns: usize,
}

/// Writes the pileup of a coordinate-sorted SAM/BAM file to `output`.
pub fn pileup_alignments<P: AsRef<Path>, W: Write>(
    path: P,
    config: &PileupConfig,
    output: &mut W,
) -> anyhow::Result<PileupSummary> {
    let mut reader = bam::Reader::from_path(path.as_ref())
        .context(format!("Failed to open alignment file: {:?}", path.as_ref()))?;
    let header = reader.header().clone();

    let mut summary = PileupSummary::default();
    let mut walker: PileupWalker<ReadRecord> = PileupWalker::new(config.clone());
    let mut contig: Option<(i32, String)> = None;

    for (record_number, record) in reader.records().enumerate() {
        let record = record.context(format!("Failed to read record {}", record_number + 1))?;
        if record.is_unmapped() || record.is_secondary() || record.is_quality_check_failed() || record.is_duplicate() {
            continue;
        }

        let tid = record.tid();
        if contig.as_ref().map(|(t, _)| *t) != Some(tid) {
            if let Some((_, name)) = &contig {
                walker.finish(&mut |pos, elements| write_column(output, name, pos, elements, &mut summary.columns))?;
            }
            let name = String::from_utf8_lossy(header.tid2name(tid as u32)).into_owned();
            debug!("Starting contig {}", name);
            contig = Some((tid, name));
        }

        let read = match ReadRecord::from_bam(&record) {
            Ok(read) => read,
            Err(e) => match config.malformed_reads {
                MalformedReadPolicy::Skip => {
                    warn!("Skipping record {}: {}", record_number + 1, e);
                    summary.reads_skipped += 1;
                    continue;
                }
                MalformedReadPolicy::Abort => {
                    return Err(e).context(format!("Failed to decode record {}", record_number + 1))
                }
            },
        };
        summary.reads_used += 1;

        if let Some((_, name)) = &contig {
            walker.push(read, &mut |pos, elements| write_column(output, name, pos, elements, &mut summary.columns))?;
        }
    }

    if let Some((_, name)) = &contig {
        walker.finish(&mut |pos, elements| write_column(output, name, pos, elements, &mut summary.columns))?;
    }
    summary.reads_skipped += walker.skipped_reads();
    output.flush()?;
    Ok(summary)
}

fn write_column<W: Write, R: AlignedRead>(
    output: &mut W,
    contig: &str,
    pos: i64,
    elements: &[PileupElement<'_, R>],
    columns: &mut usize,
) -> anyhow::Result<()> {
    writeln!(output, "{}", format_column(contig, pos, elements))?;
    *columns += 1;
    Ok(())
}
