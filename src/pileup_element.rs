//! A single read's observation at one reference column.

use crate::base_utils::{simple_base_to_base_index, DEFAULT_INDEL_QUAL, DELETION_BASE, DELETION_QUAL};
use crate::error::{PileupError, Result};
use crate::read::AlignedRead;
use std::cmp::Ordering;
use std::fmt;

/// Cursor-derived context for one (read, column), before it is attached to a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFacts {
    pub offset: i64,
    pub is_deletion: bool,
    pub is_before_deletion: bool,
    pub is_after_deletion: bool,
    pub is_before_insertion: bool,
    pub is_after_insertion: bool,
    pub is_next_to_soft_clip: bool,
    pub event_bases: Option<String>,
    pub event_length: i64,
}

impl ElementFacts {
    /// A plain aligned base with no adjacent events.
    pub fn at_offset(offset: i64) -> Self {
        ElementFacts {
            offset,
            is_deletion: false,
            is_before_deletion: false,
            is_after_deletion: false,
            is_before_insertion: false,
            is_after_insertion: false,
            is_next_to_soft_clip: false,
            event_bases: None,
            event_length: -1,
        }
    }
}

#[derive(Debug)]
pub struct PileupElement<'a, R: AlignedRead> {
    read: &'a R,
    offset: i64,
    is_deletion: bool,
    is_before_deleted_base: bool,
    is_after_deleted_base: bool,
    is_before_insertion: bool,
    is_after_insertion: bool,
    is_next_to_soft_clip: bool,
    event_length: i64,
    event_bases: Option<String>,
}

impl<'a, R: AlignedRead> PileupElement<'a, R> {
    /// Builds an element, rejecting deletions with a negative offset and any
    /// offset that does not index a base of the read (-1 is the only sentinel).
    ///
    /// `event_bases` is kept only before an insertion and `event_length` only
    /// before an insertion or deletion; otherwise they are normalized away.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        read: &'a R,
        offset: i64,
        is_deletion: bool,
        is_before_deletion: bool,
        is_after_deletion: bool,
        is_before_insertion: bool,
        is_after_insertion: bool,
        is_next_to_soft_clip: bool,
        event_bases: Option<String>,
        event_length: i64,
    ) -> Result<Self> {
        if offset < 0 && is_deletion {
            return Err(PileupError::InvalidConstruction(format!(
                "cannot create a deletion with negative offset {} for read {}",
                offset,
                read.name()
            )));
        }
        if offset < -1 || offset >= read.read_length() as i64 {
            return Err(PileupError::InvalidConstruction(format!(
                "offset {} is outside read {} of length {}",
                offset,
                read.name(),
                read.read_length()
            )));
        }

        Ok(PileupElement {
            read,
            offset,
            is_deletion,
            is_before_deleted_base: is_before_deletion,
            is_after_deleted_base: is_after_deletion,
            is_before_insertion,
            is_after_insertion,
            is_next_to_soft_clip,
            event_bases: if is_before_insertion { event_bases } else { None },
            event_length: if is_before_deletion || is_before_insertion {
                event_length
            } else {
                -1
            },
        })
    }

    pub fn from_facts(read: &'a R, facts: ElementFacts) -> Result<Self> {
        PileupElement::new(
            read,
            facts.offset,
            facts.is_deletion,
            facts.is_before_deletion,
            facts.is_after_deletion,
            facts.is_before_insertion,
            facts.is_after_insertion,
            facts.is_next_to_soft_clip,
            facts.event_bases,
            facts.event_length,
        )
    }

    pub fn read(&self) -> &'a R {
        self.read
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn is_deletion(&self) -> bool {
        self.is_deletion
    }

    pub fn is_before_deleted_base(&self) -> bool {
        self.is_before_deleted_base
    }

    pub fn is_after_deleted_base(&self) -> bool {
        self.is_after_deleted_base
    }

    pub fn is_before_deletion_start(&self) -> bool {
        self.is_before_deleted_base && !self.is_deletion
    }

    pub fn is_after_deletion_end(&self) -> bool {
        self.is_after_deleted_base && !self.is_deletion
    }

    pub fn is_before_insertion(&self) -> bool {
        self.is_before_insertion
    }

    pub fn is_after_insertion(&self) -> bool {
        self.is_after_insertion
    }

    pub fn is_next_to_soft_clip(&self) -> bool {
        self.is_next_to_soft_clip
    }

    pub fn is_insertion_at_beginning_of_read(&self) -> bool {
        self.offset == -1
    }

    /// Number of inserted or deleted bases, or -1 without an adjacent event.
    pub fn event_length(&self) -> i64 {
        self.event_length
    }

    /// Inserted bases; `None` for deletions or when no insertion follows.
    pub fn event_bases(&self) -> Option<&str> {
        self.event_bases.as_deref()
    }

    pub fn mapping_quality(&self) -> u8 {
        self.read.mapping_quality()
    }

    pub fn is_reverse_strand(&self) -> bool {
        self.read.is_reverse_strand()
    }

    fn is_synthetic(&self) -> bool {
        self.is_deletion || self.is_insertion_at_beginning_of_read()
    }

    pub fn base(&self) -> u8 {
        if self.is_synthetic() {
            DELETION_BASE
        } else {
            self.read.bases()[self.offset as usize]
        }
    }

    pub fn base_index(&self) -> Option<usize> {
        simple_base_to_base_index(self.base())
    }

    pub fn quality(&self) -> u8 {
        if self.is_synthetic() {
            DELETION_QUAL
        } else {
            self.read.base_qualities()[self.offset as usize]
        }
    }

    pub fn base_insertion_quality(&self) -> u8 {
        if self.is_synthetic() {
            return DELETION_QUAL;
        }
        self.read
            .base_insertion_qualities()
            .map_or(DEFAULT_INDEL_QUAL, |quals| quals[self.offset as usize])
    }

    pub fn base_deletion_quality(&self) -> u8 {
        if self.is_synthetic() {
            return DELETION_QUAL;
        }
        self.read
            .base_deletion_qualities()
            .map_or(DEFAULT_INDEL_QUAL, |quals| quals[self.offset as usize])
    }

    /// How many original reads this element stands for.
    ///
    /// Always 1 unless the read is a reduced read. A deletion takes the rounded
    /// mean of the counts on either side of it.
    pub fn representative_count(&self) -> Result<u32> {
        let counts = match self.read.reduced_counts() {
            Some(counts) if !self.is_insertion_at_beginning_of_read() => counts,
            _ => return Ok(1),
        };
        let offset = self.offset as usize;

        if self.is_deletion {
            if offset + 1 >= self.read.read_length() {
                return Err(PileupError::MalformedAlignment(format!(
                    "Adjacent I/D events in read {} -- cigar: {}",
                    self.read.name(),
                    self.read.cigar()
                )));
            }
            let sum = counts[offset] as u64 + counts[offset + 1] as u64;
            // (a + b) / 2 rounded half up
            Ok(((sum + 1) / 2) as u32)
        } else {
            Ok(counts[offset])
        }
    }
}

impl<R: AlignedRead> fmt::Display for PileupElement<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} = {} Q{}",
            self.read.name(),
            self.offset,
            self.base() as char,
            self.quality()
        )
    }
}

/// An ordering over elements merged into one column.
pub trait ElementOrder {
    fn compare<R: AlignedRead>(&self, a: &PileupElement<'_, R>, b: &PileupElement<'_, R>) -> Ordering;
}

/// Offset ascending, then alignment start ascending.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByOffsetThenStart;

impl ElementOrder for ByOffsetThenStart {
    fn compare<R: AlignedRead>(&self, a: &PileupElement<'_, R>, b: &PileupElement<'_, R>) -> Ordering {
        a.offset
            .cmp(&b.offset)
            .then_with(|| a.read.alignment_start().cmp(&b.read.alignment_start()))
    }
}

pub fn sort_elements<R: AlignedRead, O: ElementOrder>(elements: &mut [PileupElement<'_, R>], order: &O) {
    elements.sort_by(|a, b| order.compare(a, b));
}
