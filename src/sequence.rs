use crate::error::QuoteError;
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

/// Half-open interval `[start, end)` over a sequence.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}

/// Consecutive segments induced by a sorted cut vector `0 = c0 < … < ck = len`.
pub fn segments_from_cuts(cuts: &[usize]) -> Vec<Segment> {
    cuts.windows(2)
        .map(|w| Segment::new(w[0], w[1]))
        .collect()
}

/// Immutable DNA sequence over `ACGT`. Subsequences share the underlying
/// buffer, so slicing during decomposition is cheap.
#[derive(Clone, Debug)]
pub struct DnaSequence {
    content: Arc<str>,
    range: Range<usize>,
}

impl DnaSequence {
    pub fn from_sequence(sequence: &str) -> Result<Self, QuoteError> {
        let upper = sequence.to_ascii_uppercase();
        if let Some(bad) = upper.bytes().find(|b| !matches!(b, b'A' | b'C' | b'G' | b'T')) {
            return Err(QuoteError::invalid_input(format!(
                "invalid base '{}' in sequence",
                bad as char
            )));
        }
        let content: Arc<str> = upper.into();
        let range = 0..content.len();
        Ok(Self { content, range })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.content[self.range.clone()]
    }

    /// Sub-sequence for a segment, sharing the underlying buffer.
    pub fn subsequence(&self, segment: Segment) -> Option<DnaSequence> {
        if segment.is_empty() || segment.end > self.len() {
            return None;
        }
        Some(Self {
            content: self.content.clone(),
            range: (self.range.start + segment.start)..(self.range.start + segment.end),
        })
    }

    pub fn gc_fraction(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let gc = self
            .as_str()
            .bytes()
            .filter(|&c| c == b'G' || c == b'C')
            .count();
        gc as f64 / self.len() as f64
    }

    pub fn reverse_complement(&self) -> DnaSequence {
        let rc: String = self
            .as_str()
            .bytes()
            .rev()
            .map(|b| complement(b) as char)
            .collect();
        let range = 0..rc.len();
        Self {
            content: rc.into(),
            range,
        }
    }

    /// Start offsets of all (possibly overlapping) matches of an IUPAC
    /// pattern on the forward strand.
    pub fn find_iupac(&self, pattern: &str) -> Result<Vec<usize>, QuoteError> {
        let re = iupac_to_regex(pattern)?;
        let hay = self.as_str();
        let mut ret = vec![];
        let mut from = 0;
        while let Some(m) = re.find_at(hay, from) {
            ret.push(m.start());
            from = m.start() + 1;
        }
        Ok(ret)
    }
}

impl PartialEq for DnaSequence {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for DnaSequence {}

impl Hash for DnaSequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for DnaSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for DnaSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DnaSequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeqVisitor;
        impl Visitor<'_> for SeqVisitor {
            type Value = DnaSequence;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a DNA sequence over ACGT")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                DnaSequence::from_sequence(v).map_err(|e| E::custom(e.message))
            }
        }
        deserializer.deserialize_str(SeqVisitor)
    }
}

#[inline(always)]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

/// Expand an IUPAC pattern ("GGTCTCN") into an anchored-free regex
/// ("GGTCTC[ACGT]").
pub fn iupac_to_regex(pattern: &str) -> Result<Regex, QuoteError> {
    let mut expr = String::with_capacity(pattern.len() * 4);
    for letter in pattern.bytes() {
        let bases = iupac_bases(letter);
        match bases.len() {
            0 => {
                return Err(QuoteError::invalid_input(format!(
                    "invalid IUPAC letter '{}' in pattern '{pattern}'",
                    letter as char
                )));
            }
            1 => expr.push(bases[0] as char),
            _ => {
                expr.push('[');
                for b in bases {
                    expr.push(b as char);
                }
                expr.push(']');
            }
        }
    }
    Regex::new(&expr).map_err(|e| QuoteError::invalid_input(format!("bad pattern: {e}")))
}

fn iupac_bases(letter: u8) -> Vec<u8> {
    match letter.to_ascii_uppercase() {
        b'A' => vec![b'A'],
        b'C' => vec![b'C'],
        b'G' => vec![b'G'],
        b'T' | b'U' => vec![b'T'],
        b'W' => vec![b'A', b'T'],
        b'S' => vec![b'C', b'G'],
        b'M' => vec![b'A', b'C'],
        b'K' => vec![b'G', b'T'],
        b'R' => vec![b'A', b'G'],
        b'Y' => vec![b'C', b'T'],
        b'B' => vec![b'C', b'G', b'T'],
        b'D' => vec![b'A', b'G', b'T'],
        b'H' => vec![b'A', b'C', b'T'],
        b'V' => vec![b'A', b'C', b'G'],
        b'N' => vec![b'A', b'C', b'G', b'T'],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sequence_normalizes_and_validates() {
        let seq = DnaSequence::from_sequence("acgtACGT").unwrap();
        assert_eq!(seq.as_str(), "ACGTACGT");
        assert_eq!(seq.len(), 8);
        assert!(DnaSequence::from_sequence("ACGX").is_err());
        assert!(DnaSequence::from_sequence("ACGN").is_err());
    }

    #[test]
    fn test_subsequence_shares_buffer() {
        let seq = DnaSequence::from_sequence("ACGTACGTAC").unwrap();
        let sub = seq.subsequence(Segment::new(2, 6)).unwrap();
        assert_eq!(sub.as_str(), "GTAC");
        let subsub = sub.subsequence(Segment::new(1, 3)).unwrap();
        assert_eq!(subsub.as_str(), "TA");
        assert!(seq.subsequence(Segment::new(4, 11)).is_none());
        assert!(seq.subsequence(Segment::new(4, 4)).is_none());
    }

    #[test]
    fn test_gc_fraction() {
        let seq = DnaSequence::from_sequence("AAAGGGTTTCCC").unwrap();
        assert!((seq.gc_fraction() - 0.5).abs() < 1e-12);
        let at = DnaSequence::from_sequence("ATAT").unwrap();
        assert_eq!(at.gc_fraction(), 0.0);
    }

    #[test]
    fn test_reverse_complement() {
        let seq = DnaSequence::from_sequence("ATGC").unwrap();
        assert_eq!(seq.reverse_complement().as_str(), "GCAT");
    }

    #[test]
    fn test_find_iupac() {
        let seq = DnaSequence::from_sequence("GGTCTCAAGGTCTCT").unwrap();
        assert_eq!(seq.find_iupac("GGTCTC").unwrap(), vec![0, 8]);
        // N wildcard
        assert_eq!(seq.find_iupac("GGTCTCN").unwrap(), vec![0, 8]);
        // Overlapping matches are all reported
        let seq = DnaSequence::from_sequence("AAAA").unwrap();
        assert_eq!(seq.find_iupac("AA").unwrap(), vec![0, 1, 2]);
        assert!(seq.find_iupac("AX").is_err());
    }

    #[test]
    fn test_segments_from_cuts() {
        let segs = segments_from_cuts(&[0, 3, 7, 10]);
        assert_eq!(
            segs,
            vec![Segment::new(0, 3), Segment::new(3, 7), Segment::new(7, 10)]
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let seq = DnaSequence::from_sequence("ACGT").unwrap();
        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, "\"ACGT\"");
        let back: DnaSequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seq);
    }
}
