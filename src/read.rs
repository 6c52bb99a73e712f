use crate::cigar_parser::CigarProgram;
use crate::error::{PileupError, Result};
use rust_htslib::bam;
use rust_htslib::bam::record::Aux;

/// What the pileup engine needs to know about an aligned read.
///
/// Coordinates are 0-based. All slices are owned by the implementor and are
/// never copied by the engine.
pub trait AlignedRead {
    fn name(&self) -> &str;

    /// Reference coordinate of the first aligned base.
    fn alignment_start(&self) -> i64;

    fn cigar(&self) -> &CigarProgram;

    fn bases(&self) -> &[u8];

    fn base_qualities(&self) -> &[u8];

    fn mapping_quality(&self) -> u8;

    fn is_reverse_strand(&self) -> bool;

    fn base_insertion_qualities(&self) -> Option<&[u8]> {
        None
    }

    fn base_deletion_qualities(&self) -> Option<&[u8]> {
        None
    }

    /// Per-base counts of a reduced (collapsed) read, if it is one.
    fn reduced_counts(&self) -> Option<&[u32]> {
        None
    }

    fn is_reduced(&self) -> bool {
        self.reduced_counts().is_some()
    }

    /// Reference coordinate of the last aligned base (inclusive).
    fn alignment_end(&self) -> i64 {
        self.alignment_start() + self.cigar().reference_length() as i64 - 1
    }

    fn read_length(&self) -> usize {
        self.bases().len()
    }
}

/// An owned, in-memory aligned read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    name: String,
    alignment_start: i64,
    cigar: CigarProgram,
    bases: Vec<u8>,
    qualities: Vec<u8>,
    insertion_qualities: Option<Vec<u8>>,
    deletion_qualities: Option<Vec<u8>>,
    mapping_quality: u8,
    reverse_strand: bool,
    reduced_counts: Option<Vec<u32>>,
}

impl ReadRecord {
    pub fn new(
        name: &str,
        alignment_start: i64,
        cigar: CigarProgram,
        bases: Vec<u8>,
        qualities: Vec<u8>,
    ) -> Result<Self> {
        if bases.len() != qualities.len() {
            return Err(PileupError::Decode(format!(
                "Read {} has {} bases but {} qualities",
                name,
                bases.len(),
                qualities.len()
            )));
        }
        if cigar.query_length() != bases.len() as u64 {
            return Err(PileupError::Decode(format!(
                "Read {}: CIGAR {} implies {} bases, actual length {}",
                name,
                cigar,
                cigar.query_length(),
                bases.len()
            )));
        }
        Ok(ReadRecord {
            name: name.to_string(),
            alignment_start,
            cigar,
            bases,
            qualities,
            insertion_qualities: None,
            deletion_qualities: None,
            mapping_quality: 255,
            reverse_strand: false,
            reduced_counts: None,
        })
    }

    pub fn with_mapping_quality(mut self, mapping_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self
    }

    pub fn with_reverse_strand(mut self, reverse_strand: bool) -> Self {
        self.reverse_strand = reverse_strand;
        self
    }

    pub fn with_indel_qualities(
        mut self,
        insertion_qualities: Vec<u8>,
        deletion_qualities: Vec<u8>,
    ) -> Result<Self> {
        for (tag, quals) in [("BI", &insertion_qualities), ("BD", &deletion_qualities)] {
            if quals.len() != self.bases.len() {
                return Err(PileupError::Decode(format!(
                    "Read {}: {} has {} values for {} bases",
                    self.name,
                    tag,
                    quals.len(),
                    self.bases.len()
                )));
            }
        }
        self.insertion_qualities = Some(insertion_qualities);
        self.deletion_qualities = Some(deletion_qualities);
        Ok(self)
    }

    pub fn with_reduced_counts(mut self, counts: Vec<u32>) -> Result<Self> {
        if counts.len() != self.bases.len() {
            return Err(PileupError::Decode(format!(
                "Read {}: {} reduced counts for {} bases",
                self.name,
                counts.len(),
                self.bases.len()
            )));
        }
        self.reduced_counts = Some(counts);
        Ok(self)
    }

    /// Decodes a mapped BAM record, including its BI/BD quality tags and RR counts.
    pub fn from_bam(record: &bam::Record) -> Result<Self> {
        let name = String::from_utf8_lossy(record.qname()).into_owned();
        let cigar = CigarProgram::from_packed(record.raw_cigar())?;
        let bases = record.seq().as_bytes();
        let qualities = record.qual().to_vec();

        let mut read = ReadRecord::new(&name, record.pos(), cigar, bases, qualities)?
            .with_mapping_quality(record.mapq())
            .with_reverse_strand(record.is_reverse());

        let insertion_qualities = phred_string_tag(record, b"BI", &name)?;
        let deletion_qualities = phred_string_tag(record, b"BD", &name)?;
        if let (Some(bi), Some(bd)) = (insertion_qualities, deletion_qualities) {
            read = read.with_indel_qualities(bi, bd)?;
        }

        if let Some(counts) = reduced_counts_tag(record, &name)? {
            read = read.with_reduced_counts(counts)?;
        }

        Ok(read)
    }
}

fn phred_string_tag(record: &bam::Record, tag: &[u8], name: &str) -> Result<Option<Vec<u8>>> {
    match record.aux(tag) {
        Ok(Aux::String(value)) => Ok(Some(value.bytes().map(|q| q.saturating_sub(33)).collect())),
        Ok(_) => Err(PileupError::Decode(format!(
            "Read {}: tag {} is not a string",
            name,
            String::from_utf8_lossy(tag)
        ))),
        Err(_) => Ok(None),
    }
}

/// RR stores the first count verbatim and every other count relative to it.
fn reduced_counts_tag(record: &bam::Record, name: &str) -> Result<Option<Vec<u32>>> {
    let raw: Vec<i64> = match record.aux(b"RR") {
        Ok(Aux::ArrayI8(values)) => values.iter().map(i64::from).collect(),
        Ok(Aux::ArrayU8(values)) => values.iter().map(i64::from).collect(),
        Ok(_) => {
            return Err(PileupError::Decode(format!(
                "Read {}: tag RR is not a byte array",
                name
            )))
        }
        Err(_) => return Ok(None),
    };
    let first = match raw.first() {
        Some(&first) => first,
        None => return Ok(None),
    };
    let counts = raw
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let count = if i == 0 { count } else { first + count };
            count.max(0) as u32
        })
        .collect();
    Ok(Some(counts))
}

impl AlignedRead for ReadRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn alignment_start(&self) -> i64 {
        self.alignment_start
    }

    fn cigar(&self) -> &CigarProgram {
        &self.cigar
    }

    fn bases(&self) -> &[u8] {
        &self.bases
    }

    fn base_qualities(&self) -> &[u8] {
        &self.qualities
    }

    fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    fn is_reverse_strand(&self) -> bool {
        self.reverse_strand
    }

    fn base_insertion_qualities(&self) -> Option<&[u8]> {
        self.insertion_qualities.as_deref()
    }

    fn base_deletion_qualities(&self) -> Option<&[u8]> {
        self.deletion_qualities.as_deref()
    }

    fn reduced_counts(&self) -> Option<&[u32]> {
        self.reduced_counts.as_deref()
    }
}
