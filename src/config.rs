use std::str::FromStr;

/// What to do with a read whose CIGAR cannot be resolved at a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReadPolicy {
    /// Log the read and drop it from the rest of the pileup.
    Skip,
    /// Stop and return the error.
    Abort,
}

impl FromStr for MalformedReadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "skip" => Ok(MalformedReadPolicy::Skip),
            "abort" => Ok(MalformedReadPolicy::Abort),
            _ => anyhow::bail!("Unknown error mode: {} (expected skip or abort)", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PileupConfig {
    pub min_mapping_quality: u8,
    /// Applied to aligned bases only; deletions carry a fixed quality.
    pub min_base_quality: u8,
    pub include_deletions: bool,
    pub malformed_reads: MalformedReadPolicy,
}

impl Default for PileupConfig {
    fn default() -> Self {
        PileupConfig {
            min_mapping_quality: 0,
            min_base_quality: 0,
            include_deletions: true,
            malformed_reads: MalformedReadPolicy::Skip,
        }
    }
}
