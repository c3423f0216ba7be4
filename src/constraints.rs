use crate::sequence::DnaSequence;
use crate::ENZYMES;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Predicate over a whole sequence (or a candidate fragment).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SequenceConstraint {
    LengthBetween { min: usize, max: usize },
    GcContentBetween { min: f64, max: f64 },
    /// No match of an IUPAC pattern; optionally also on the reverse strand.
    NoPattern { pattern: String, both_strands: bool },
    NoEnzymeSite { enzyme: String },
}

impl SequenceConstraint {
    pub fn accepts(&self, seq: &DnaSequence) -> bool {
        match self {
            Self::LengthBetween { min, max } => (*min..=*max).contains(&seq.len()),
            Self::GcContentBetween { min, max } => {
                let gc = seq.gc_fraction();
                *min <= gc && gc <= *max
            }
            Self::NoPattern {
                pattern,
                both_strands,
            } => {
                let fwd = match seq.find_iupac(pattern) {
                    Ok(hits) => hits.is_empty(),
                    Err(_) => return false, // malformed pattern never accepts
                };
                if !fwd || !both_strands {
                    return fwd;
                }
                seq.reverse_complement()
                    .find_iupac(pattern)
                    .map(|hits| hits.is_empty())
                    .unwrap_or(false)
            }
            Self::NoEnzymeSite { enzyme } => match ENZYMES.get(enzyme) {
                Ok(e) => e.sites(seq).is_empty(),
                Err(_) => false,
            },
        }
    }
}

impl fmt::Display for SequenceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthBetween { min, max } => write!(f, "length in [{min}, {max}]"),
            Self::GcContentBetween { min, max } => {
                write!(f, "GC content in [{min:.2}, {max:.2}]")
            }
            Self::NoPattern { pattern, .. } => write!(f, "no occurrence of '{pattern}'"),
            Self::NoEnzymeSite { enzyme } => write!(f, "no {enzyme} site"),
        }
    }
}

/// Predicate over a single absolute cut position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CutConstraint {
    ForbidRange { from: usize, to: usize },
    ForbidPositions(Vec<usize>),
    OnGrid { step: usize },
}

impl CutConstraint {
    pub fn accepts(&self, position: usize) -> bool {
        match self {
            Self::ForbidRange { from, to } => !(*from..*to).contains(&position),
            Self::ForbidPositions(positions) => !positions.contains(&position),
            Self::OnGrid { step } => *step > 0 && position % step == 0,
        }
    }
}

/// Predicate over a complete candidate cut set. Only evaluated on full
/// solutions, never used to prune interior search nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CutsSetConstraint {
    MaxSegments(usize),
    MinCutSpacing(usize),
    /// No two interior cuts may produce the same `window`-long junction
    /// sequence (or its reverse complement), i.e. colliding overhangs.
    UniqueJunctions {
        window: usize,
        sequence: DnaSequence,
    },
}

impl CutsSetConstraint {
    /// `cuts` is the full sorted cut vector, endpoints included.
    pub fn accepts(&self, cuts: &[usize]) -> bool {
        match self {
            Self::MaxSegments(max) => cuts.len().saturating_sub(1) <= *max,
            Self::MinCutSpacing(min) => cuts.windows(2).all(|w| w[1] - w[0] >= *min),
            Self::UniqueJunctions { window, sequence } => {
                let mut seen = HashSet::new();
                for &cut in &cuts[1..cuts.len().saturating_sub(1)] {
                    let end = (cut + window).min(sequence.len());
                    let junction = match sequence
                        .subsequence(crate::sequence::Segment::new(cut, end))
                    {
                        Some(j) => j,
                        None => continue,
                    };
                    let fwd = junction.as_str().to_string();
                    let rc = junction.reverse_complement().as_str().to_string();
                    let canonical = fwd.min(rc);
                    if !seen.insert(canonical) {
                        return false;
                    }
                }
                true
            }
        }
    }
}

/// Supplier pricing. `min_basepair_price` is a lower bound usable for
/// comparator pruning and A* heuristics; it is 0 for pure fixed pricing,
/// where no per-bp bound exists.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum PricingModel {
    PerBasepair(f64),
    Fixed(f64),
    PerBasepairWithFixed { rate: f64, fixed: f64 },
}

impl PricingModel {
    pub fn price(&self, length: usize) -> f64 {
        match self {
            Self::PerBasepair(rate) => rate * length as f64,
            Self::Fixed(price) => *price,
            Self::PerBasepairWithFixed { rate, fixed } => rate * length as f64 + fixed,
        }
    }

    pub fn min_basepair_price(&self) -> f64 {
        match self {
            Self::PerBasepair(rate) => *rate,
            Self::Fixed(_) => 0.0,
            Self::PerBasepairWithFixed { rate, .. } => *rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Segment;

    #[test]
    fn test_length_and_gc() {
        let seq = DnaSequence::from_sequence("AAAGGGTTTCCC").unwrap();
        assert!(SequenceConstraint::LengthBetween { min: 10, max: 20 }.accepts(&seq));
        assert!(!SequenceConstraint::LengthBetween { min: 13, max: 20 }.accepts(&seq));
        assert!(SequenceConstraint::GcContentBetween { min: 0.4, max: 0.6 }.accepts(&seq));
        assert!(!SequenceConstraint::GcContentBetween { min: 0.6, max: 1.0 }.accepts(&seq));
    }

    #[test]
    fn test_no_pattern_both_strands() {
        let seq = DnaSequence::from_sequence("GGTCTCAAAA").unwrap();
        let fwd_only = SequenceConstraint::NoPattern {
            pattern: "GGTCTC".to_string(),
            both_strands: false,
        };
        assert!(!fwd_only.accepts(&seq));
        // GAGACC is the reverse-complement image of GGTCTC
        let rc_seq = DnaSequence::from_sequence("GAGACCAAAA").unwrap();
        assert!(fwd_only.accepts(&rc_seq));
        let both = SequenceConstraint::NoPattern {
            pattern: "GGTCTC".to_string(),
            both_strands: true,
        };
        assert!(!both.accepts(&rc_seq));
    }

    #[test]
    fn test_no_enzyme_site() {
        let seq = DnaSequence::from_sequence("AAGAATTCAA").unwrap();
        assert!(!SequenceConstraint::NoEnzymeSite {
            enzyme: "EcoRI".to_string()
        }
        .accepts(&seq));
        assert!(SequenceConstraint::NoEnzymeSite {
            enzyme: "BsaI".to_string()
        }
        .accepts(&seq));
        // Unknown enzymes never accept; construction-time lookup is where
        // the configuration error surfaces.
        assert!(!SequenceConstraint::NoEnzymeSite {
            enzyme: "Bogus".to_string()
        }
        .accepts(&seq));
    }

    #[test]
    fn test_cut_constraints() {
        assert!(CutConstraint::ForbidRange { from: 10, to: 20 }.accepts(9));
        assert!(!CutConstraint::ForbidRange { from: 10, to: 20 }.accepts(10));
        assert!(CutConstraint::ForbidRange { from: 10, to: 20 }.accepts(20));
        assert!(!CutConstraint::ForbidPositions(vec![5, 7]).accepts(7));
        assert!(CutConstraint::OnGrid { step: 10 }.accepts(40));
        assert!(!CutConstraint::OnGrid { step: 10 }.accepts(45));
    }

    #[test]
    fn test_set_constraints() {
        assert!(CutsSetConstraint::MaxSegments(3).accepts(&[0, 10, 20, 30]));
        assert!(!CutsSetConstraint::MaxSegments(2).accepts(&[0, 10, 20, 30]));
        assert!(CutsSetConstraint::MinCutSpacing(10).accepts(&[0, 10, 20]));
        assert!(!CutsSetConstraint::MinCutSpacing(11).accepts(&[0, 10, 20]));
    }

    #[test]
    fn test_unique_junctions() {
        // Junctions at cuts 4 and 12 are both "ACGT": collision.
        let seq = DnaSequence::from_sequence("AAAAACGTAAAAACGTAAAA").unwrap();
        let constraint = CutsSetConstraint::UniqueJunctions {
            window: 4,
            sequence: seq.clone(),
        };
        assert!(!constraint.accepts(&[0, 4, 12, 20]));
        assert!(constraint.accepts(&[0, 4, 10, 20]));
        let _ = Segment::new(0, 4);
    }

    #[test]
    fn test_pricing() {
        assert_eq!(PricingModel::PerBasepair(0.25).price(100), 25.0);
        assert_eq!(PricingModel::Fixed(99.0).price(100), 99.0);
        assert_eq!(
            PricingModel::PerBasepairWithFixed {
                rate: 0.1,
                fixed: 10.0
            }
            .price(100),
            20.0
        );
        assert_eq!(PricingModel::Fixed(99.0).min_basepair_price(), 0.0);
        assert_eq!(PricingModel::PerBasepair(0.25).min_basepair_price(), 0.25);
    }
}
