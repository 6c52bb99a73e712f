/// Base reported for deletions and for the before-read-start insertion sentinel.
pub const DELETION_BASE: u8 = b'D';

/// Quality reported wherever `DELETION_BASE` is reported. Downstream likelihood
/// code depends on this exact value.
pub const DELETION_QUAL: u8 = 16;

/// Insertion/deletion quality assumed when a read carries no BI/BD tags.
pub const DEFAULT_INDEL_QUAL: u8 = 45;

/// Index of the deletion pseudo-base in [`simple_base_to_base_index`].
pub const DELETION_INDEX: usize = 4;

/// Maps A/C/G/T to 0..=3 and the deletion symbols `D`, `-`, `*` to 4.
/// Anything else (including `N`) has no index.
pub fn simple_base_to_base_index(base: u8) -> Option<usize> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        b'D' | b'd' | b'-' | b'*' => Some(DELETION_INDEX),
        _ => None,
    }
}
