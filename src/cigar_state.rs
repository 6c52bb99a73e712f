//! Incremental reference-to-query coordinate resolution over a CIGAR.
//!
//! A [`CigarCursor`] is driven through non-decreasing reference positions of one
//! read. It only ever moves forward through the operation list, so resolving
//! every position of a read costs O(number of operations + number of positions).

use crate::cigar_parser::{CigarElement, CigarProgram, Operation};
use crate::error::{PileupError, Result};
use log::trace;

/// Context of the most recently resolved position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextFlags(u8);

impl ContextFlags {
    pub const DELETION: ContextFlags = ContextFlags(0x01);
    pub const NEXT_DELETION: ContextFlags = ContextFlags(0x02);
    pub const NEXT_INSERTION: ContextFlags = ContextFlags(0x04);
    pub const NEXT_MATCH_LIKE: ContextFlags = ContextFlags(0x08);

    pub fn empty() -> Self {
        ContextFlags(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ContextFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ContextFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ContextFlags {
    type Output = ContextFlags;

    fn bitor(self, rhs: ContextFlags) -> ContextFlags {
        ContextFlags(self.0 | rhs.0)
    }
}

/// Per-read traversal state over a [`CigarProgram`].
///
/// Not meant to be shared between reads; call [`CigarCursor::reset`] (or build a
/// new cursor) before driving it over a different alignment.
#[derive(Debug, Clone)]
pub struct CigarCursor {
    program: CigarProgram,
    /// Index of the operation containing the last resolved position.
    op_index: Option<usize>,
    /// Reference coordinate of the first base of the current operation.
    ref_start: i64,
    /// Query coordinate of the first base of the current operation.
    query_start: i64,
    flags: ContextFlags,
    last_ref_pos: Option<i64>,
    visited: usize,
}

impl CigarCursor {
    pub fn new(program: CigarProgram) -> Self {
        CigarCursor {
            program,
            op_index: None,
            ref_start: 0,
            query_start: 0,
            flags: ContextFlags::empty(),
            last_ref_pos: None,
            visited: 0,
        }
    }

    pub fn program(&self) -> &CigarProgram {
        &self.program
    }

    /// Returns the cursor to its uninitialized state.
    pub fn reset(&mut self) {
        self.op_index = None;
        self.ref_start = 0;
        self.query_start = 0;
        self.flags = ContextFlags::empty();
        self.last_ref_pos = None;
        self.visited = 0;
    }

    /// Resolves `ref_pos` to a query offset for a read aligned at `alignment_start`.
    ///
    /// Returns -1 when `ref_pos` falls in a deletion or skipped region. Positions
    /// must be supplied in non-decreasing order.
    pub fn resolve(&mut self, ref_pos: i64, alignment_start: i64) -> Result<i64> {
        let idx = match self.op_index {
            None => self.locate(ref_pos, alignment_start)?,
            Some(idx) => {
                if let Some(last) = self.last_ref_pos {
                    if ref_pos < last {
                        return Err(PileupError::UnsupportedQuery {
                            requested: ref_pos,
                            last,
                        });
                    }
                }
                self.advance(idx, ref_pos)?
            }
        };
        self.op_index = Some(idx);
        self.last_ref_pos = Some(ref_pos);
        Ok(self.collect_facts(idx, ref_pos))
    }

    /// First call: scan from the first operation to the one covering `ref_pos`.
    fn locate(&mut self, ref_pos: i64, alignment_start: i64) -> Result<usize> {
        if ref_pos < alignment_start {
            return Err(PileupError::MalformedAlignment(format!(
                "position {} precedes alignment start {}",
                ref_pos, alignment_start
            )));
        }

        if self.program.len() == 1 && self.program[0].op.is_match_like() {
            let len = self.program[0].len as i64;
            if ref_pos - alignment_start >= len {
                return Err(self.beyond_span(ref_pos, alignment_start));
            }
            self.visited += 1;
            self.ref_start = alignment_start;
            self.query_start = 0;
            return Ok(0);
        }

        let mut ref_start = alignment_start;
        let mut query_start = 0i64;
        for (idx, element) in self.program.iter().enumerate() {
            if element.op.consumes_reference() && ref_pos - ref_start < element.len as i64 {
                self.ref_start = ref_start;
                self.query_start = query_start;
                self.visited += idx + 1;
                return Ok(idx);
            }
            ref_start += element.reference_length() as i64;
            query_start += element.query_length() as i64;
        }

        Err(self.beyond_span(ref_pos, alignment_start))
    }

    /// Subsequent calls: move forward until the current operation covers `ref_pos`.
    fn advance(&mut self, mut idx: usize, ref_pos: i64) -> Result<usize> {
        let mut ref_start = self.ref_start;
        let mut query_start = self.query_start;
        let mut visited = 0;

        while ref_pos - ref_start >= self.program[idx].len as i64 {
            if idx + 1 >= self.program.len() {
                return Err(self.beyond_span(ref_pos, ref_start));
            }
            let current = self.program[idx];
            ref_start += current.reference_length() as i64;
            query_start += current.query_length() as i64;
            idx += 1;
            visited += 1;

            // insertions, clips and padding sit between reference operations
            while !self.program[idx].op.consumes_reference() {
                query_start += self.program[idx].query_length() as i64;
                idx += 1;
                visited += 1;
                if idx >= self.program.len() {
                    return Err(self.beyond_span(ref_pos, ref_start));
                }
            }
        }

        self.ref_start = ref_start;
        self.query_start = query_start;
        self.visited += visited;
        Ok(idx)
    }

    fn collect_facts(&mut self, idx: usize, ref_pos: i64) -> i64 {
        let element = self.program[idx];
        let within = ref_pos - self.ref_start;
        self.flags = ContextFlags::empty();

        let query_offset = if element.op.is_match_like() {
            self.query_start + within
        } else {
            // FIXME: deletions and skipped regions share the same sentinel
            self.flags.insert(ContextFlags::DELETION);
            -1
        };

        if within == element.len as i64 - 1 {
            if let Some(next) = self.program.get(idx + 1) {
                match next.op {
                    Operation::Deletion => self.flags.insert(ContextFlags::NEXT_DELETION),
                    Operation::Insertion => self.flags.insert(ContextFlags::NEXT_INSERTION),
                    op if op.is_match_like() => self.flags.insert(ContextFlags::NEXT_MATCH_LIKE),
                    _ => {}
                }
            }
        }

        trace!(
            "resolved {} -> {} at op {} ({}), flags {:#04x}",
            ref_pos,
            query_offset,
            idx,
            element,
            self.flags.bits()
        );
        query_offset
    }

    fn beyond_span(&self, ref_pos: i64, ref_start: i64) -> PileupError {
        PileupError::MalformedAlignment(format!(
            "position {} lies beyond the span of CIGAR {} (scan reached {})",
            ref_pos, self.program, ref_start
        ))
    }

    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    pub fn is_deletion(&self) -> bool {
        self.flags.contains(ContextFlags::DELETION)
    }

    pub fn is_next_deletion(&self) -> bool {
        self.flags.contains(ContextFlags::NEXT_DELETION)
    }

    pub fn is_next_insertion(&self) -> bool {
        self.flags.contains(ContextFlags::NEXT_INSERTION)
    }

    pub fn is_next_match_like(&self) -> bool {
        self.flags.contains(ContextFlags::NEXT_MATCH_LIKE)
    }

    pub fn operation_index(&self) -> Option<usize> {
        self.op_index
    }

    pub fn current(&self) -> Option<&CigarElement> {
        self.op_index.and_then(|idx| self.program.get(idx))
    }

    pub fn previous(&self) -> Option<&CigarElement> {
        self.op_index
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| self.program.get(idx))
    }

    pub fn next(&self) -> Option<&CigarElement> {
        self.op_index.and_then(|idx| self.program.get(idx + 1))
    }

    /// Distance of the last resolved position from the start of the current operation.
    pub fn offset_in_operation(&self) -> Option<i64> {
        self.last_ref_pos.map(|pos| pos - self.ref_start)
    }

    pub fn reference_start(&self) -> i64 {
        self.ref_start
    }

    pub fn query_start(&self) -> i64 {
        self.query_start
    }

    /// Total number of operations examined since construction or the last reset.
    pub fn operations_visited(&self) -> usize {
        self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bit_ops() {
        let mut flags = ContextFlags::empty();
        assert!(flags.is_empty());
        flags.insert(ContextFlags::DELETION);
        assert!(flags.contains(ContextFlags::DELETION));
        assert!(!flags.contains(ContextFlags::NEXT_DELETION));
        assert_eq!(
            (ContextFlags::DELETION | ContextFlags::NEXT_MATCH_LIKE).bits(),
            0x09
        );
    }

    #[test]
    fn test_reset_allows_rewind() {
        let mut cursor = CigarCursor::new(CigarProgram::parse("10M").unwrap());
        assert_eq!(cursor.resolve(8, 0).unwrap(), 8);
        cursor.reset();
        assert_eq!(cursor.resolve(2, 0).unwrap(), 2);
    }
}
