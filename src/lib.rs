pub mod base_utils;
pub mod cigar_parser;
pub mod cigar_state;
pub mod config;
pub mod error;
pub mod pileup;
pub mod pileup_element;
pub mod read;

pub use cigar_parser::{CigarElement, CigarProgram, Operation};
pub use cigar_state::{CigarCursor, ContextFlags};
pub use error::PileupError;
pub use pileup_element::{ByOffsetThenStart, ElementFacts, ElementOrder, PileupElement};
pub use read::{AlignedRead, ReadRecord};
