use crate::error::{PileupError, Result};
use std::fmt;
use std::ops::Index;

/// A single CIGAR operation kind.
///
/// Discriminants follow the BAM op-code numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Match = 0,
    Insertion = 1,
    Deletion = 2,
    Skip = 3,
    SoftClip = 4,
    HardClip = 5,
    Padding = 6,
    SequenceMatch = 7,
    SequenceMismatch = 8,
}

/// (consumes reference, consumes query), indexed by op code.
const CONSUMES: [(bool, bool); 9] = [
    (true, true),   // M
    (false, true),  // I
    (true, false),  // D
    (true, false),  // N
    (false, true),  // S
    (false, false), // H
    (false, false), // P
    (true, true),   // =
    (true, true),   // X
];

const SAM_CODES: [char; 9] = ['M', 'I', 'D', 'N', 'S', 'H', 'P', '=', 'X'];

impl Operation {
    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0 => Operation::Match,
            1 => Operation::Insertion,
            2 => Operation::Deletion,
            3 => Operation::Skip,
            4 => Operation::SoftClip,
            5 => Operation::HardClip,
            6 => Operation::Padding,
            7 => Operation::SequenceMatch,
            8 => Operation::SequenceMismatch,
            _ => {
                return Err(PileupError::Decode(format!(
                    "Unknown CIGAR operation code: {}",
                    code
                )))
            }
        })
    }

    pub fn from_char(c: char) -> Result<Self> {
        match SAM_CODES.iter().position(|&code| code == c) {
            Some(idx) => Operation::from_code(idx as u32),
            None => Err(PileupError::Decode(format!("Unknown CIGAR operation: {}", c))),
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn as_char(self) -> char {
        SAM_CODES[self as usize]
    }

    pub fn consumes_reference(self) -> bool {
        CONSUMES[self as usize].0
    }

    pub fn consumes_query(self) -> bool {
        CONSUMES[self as usize].1
    }

    /// M, = or X: the operation places one read base on each reference base.
    pub fn is_match_like(self) -> bool {
        self.consumes_reference() && self.consumes_query()
    }
}

/// One (operation, length) run of a CIGAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarElement {
    pub op: Operation,
    pub len: u32,
}

impl CigarElement {
    pub fn new(op: Operation, len: u32) -> Self {
        CigarElement { op, len }
    }

    /// Decodes a BAM-packed value: length in the high 28 bits, op code in the low 4.
    pub fn from_packed(value: u32) -> Result<Self> {
        let op = Operation::from_code(value & 0xf)?;
        Ok(CigarElement::new(op, value >> 4))
    }

    pub fn to_packed(self) -> u32 {
        (self.len << 4) | self.op.code()
    }

    pub fn reference_length(self) -> u32 {
        if self.op.consumes_reference() {
            self.len
        } else {
            0
        }
    }

    pub fn query_length(self) -> u32 {
        if self.op.consumes_query() {
            self.len
        } else {
            0
        }
    }
}

impl fmt::Display for CigarElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.op.as_char())
    }
}

/// The decoded operation list of one read. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CigarProgram {
    elements: Vec<CigarElement>,
}

impl CigarProgram {
    pub fn new(elements: Vec<CigarElement>) -> Result<Self> {
        if let Some(pos) = elements.iter().position(|e| e.len == 0) {
            return Err(PileupError::Decode(format!(
                "CIGAR operation {} has a non-positive length",
                pos
            )));
        }
        Ok(CigarProgram { elements })
    }

    /// Parses SAM CIGAR text such as `5M2I3M1D4M`. `*` is an empty program.
    pub fn parse(cigar: &str) -> Result<Self> {
        if cigar == "*" {
            return Ok(CigarProgram::default());
        }

        let mut elements = Vec::new();
        let mut num = String::new();

        for c in cigar.chars() {
            if c.is_ascii_digit() {
                num.push(c);
            } else {
                if num.is_empty() {
                    return Err(PileupError::Decode(format!(
                        "Missing run length before '{}' in CIGAR {}",
                        c, cigar
                    )));
                }
                let len = num.parse::<u32>().map_err(|e| {
                    PileupError::Decode(format!("Failed to parse CIGAR run length {}: {}", num, e))
                })?;
                elements.push(CigarElement::new(Operation::from_char(c)?, len));
                num.clear();
            }
        }
        if !num.is_empty() {
            return Err(PileupError::Decode(format!(
                "Trailing run length without an operation in CIGAR {}",
                cigar
            )));
        }

        CigarProgram::new(elements)
    }

    /// Decodes BAM-packed CIGAR values.
    pub fn from_packed(values: &[u32]) -> Result<Self> {
        let elements = values
            .iter()
            .map(|&v| CigarElement::from_packed(v))
            .collect::<Result<Vec<_>>>()?;
        CigarProgram::new(elements)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&CigarElement> {
        self.elements.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CigarElement> {
        self.elements.iter()
    }

    pub fn elements(&self) -> &[CigarElement] {
        &self.elements
    }

    /// Number of reference bases spanned by the alignment.
    pub fn reference_length(&self) -> u64 {
        self.elements.iter().map(|e| e.reference_length() as u64).sum()
    }

    /// Number of read bases the CIGAR accounts for.
    pub fn query_length(&self) -> u64 {
        self.elements.iter().map(|e| e.query_length() as u64).sum()
    }
}

impl Index<usize> for CigarProgram {
    type Output = CigarElement;

    fn index(&self, idx: usize) -> &CigarElement {
        &self.elements[idx]
    }
}

impl<'a> IntoIterator for &'a CigarProgram {
    type Item = &'a CigarElement;
    type IntoIter = std::slice::Iter<'a, CigarElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl fmt::Display for CigarProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elements.is_empty() {
            return write!(f, "*");
        }
        for element in &self.elements {
            write!(f, "{}", element)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumption_table() {
        use Operation::*;
        for op in [Match, SequenceMatch, SequenceMismatch] {
            assert!(op.consumes_reference() && op.consumes_query());
            assert!(op.is_match_like());
        }
        for op in [Deletion, Skip] {
            assert!(op.consumes_reference() && !op.consumes_query());
        }
        for op in [Insertion, SoftClip] {
            assert!(!op.consumes_reference() && op.consumes_query());
        }
        for op in [HardClip, Padding] {
            assert!(!op.consumes_reference() && !op.consumes_query());
        }
    }

    #[test]
    fn test_packed_matches_text() {
        let text = CigarProgram::parse("3S5M2I3M1D4M2N1=1X2H").unwrap();
        let packed: Vec<u32> = text.iter().map(|e| e.to_packed()).collect();
        assert_eq!(CigarProgram::from_packed(&packed).unwrap(), text);
        assert_eq!(text.to_string(), "3S5M2I3M1D4M2N1=1X2H");
    }
}
