use crate::constraints::{CutConstraint, CutsSetConstraint, SequenceConstraint};
use crate::enzymes::RestrictionEnzyme;
use crate::error::QuoteError;
use crate::sequence::{DnaSequence, Segment};
use crate::ENZYMES;

/// An assembly protocol: its cost/duration model, fragment-size window,
/// constraint sets and segment-to-fragment transform. Consumed by
/// `AssemblyStation`; the catalog itself stays deliberately small.
pub trait AssemblyMethod: Send + Sync {
    fn name(&self) -> &str;

    /// Fixed assembly time added on top of the slowest fragment.
    fn duration(&self) -> f64;

    /// Fixed assembly cost added on top of the fragment prices.
    fn cost(&self) -> f64;

    fn min_segment_length(&self) -> usize {
        1
    }

    fn max_segment_length(&self) -> Option<usize> {
        None
    }

    fn max_fragments(&self) -> Option<usize> {
        None
    }

    /// Constraints on the full input sequence.
    fn sequence_constraints(&self) -> Vec<SequenceConstraint> {
        vec![]
    }

    /// Constraints on each transformed fragment.
    fn fragment_constraints(&self) -> Vec<SequenceConstraint> {
        vec![]
    }

    fn cut_constraints(&self) -> Vec<CutConstraint> {
        vec![]
    }

    fn cuts_set_constraints(&self, _sequence: &DnaSequence) -> Vec<CutsSetConstraint> {
        vec![]
    }

    /// Positions that must appear in any solution.
    fn force_cuts(&self, _sequence: &DnaSequence) -> Vec<usize> {
        vec![]
    }

    /// Positions worth exploring first.
    fn suggest_cuts(&self, _sequence: &DnaSequence) -> Vec<usize> {
        vec![]
    }

    /// The fragment actually ordered for a segment (e.g. with homology
    /// arms or overhang flanks added).
    fn compute_fragment(&self, sequence: &DnaSequence, segment: Segment) -> DnaSequence;

    /// Parameter fingerprint for content-addressed caching.
    fn fingerprint(&self) -> String {
        format!(
            "{}/{:.4}/{:.4}/{}/{:?}",
            self.name(),
            self.cost(),
            self.duration(),
            self.min_segment_length(),
            self.max_segment_length()
        )
    }
}

fn extended_fragment(sequence: &DnaSequence, segment: Segment, flank: usize) -> DnaSequence {
    let start = segment.start.saturating_sub(flank);
    let end = (segment.end + flank).min(sequence.len());
    sequence
        .subsequence(Segment::new(start, end))
        .unwrap_or_else(|| sequence.clone())
}

/// Gibson isothermal assembly: fragments overlap their neighbors by a
/// homology arm on each side.
#[derive(Clone, Debug)]
pub struct GibsonAssembly {
    pub homology_arm: usize,
    pub duration: f64,
    pub cost: f64,
    pub min_segment: usize,
    pub max_segment: Option<usize>,
    pub max_fragments: Option<usize>,
}

impl Default for GibsonAssembly {
    fn default() -> Self {
        Self {
            homology_arm: 40,
            duration: 0.5,
            cost: 10.0,
            min_segment: 100,
            max_segment: Some(4000),
            max_fragments: Some(20),
        }
    }
}

impl AssemblyMethod for GibsonAssembly {
    fn name(&self) -> &str {
        "gibson"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn min_segment_length(&self) -> usize {
        self.min_segment
    }

    fn max_segment_length(&self) -> Option<usize> {
        self.max_segment
    }

    fn max_fragments(&self) -> Option<usize> {
        self.max_fragments
    }

    fn compute_fragment(&self, sequence: &DnaSequence, segment: Segment) -> DnaSequence {
        extended_fragment(sequence, segment, self.homology_arm)
    }
}

/// Golden-Gate assembly with a type IIS enzyme: internal recognition
/// sites are forbidden in fragments and every junction overhang must be
/// unique. Cut suggestions hug existing enzyme sites.
#[derive(Clone, Debug)]
pub struct GoldenGateAssembly {
    enzyme: RestrictionEnzyme,
    pub duration: f64,
    pub cost: f64,
    pub min_segment: usize,
    pub max_segment: Option<usize>,
    pub max_fragments: Option<usize>,
}

impl GoldenGateAssembly {
    /// Unknown enzyme names are a configuration error, raised here and
    /// never at quote time.
    pub fn new(enzyme_name: &str) -> Result<Self, QuoteError> {
        let enzyme = ENZYMES.get(enzyme_name)?.clone();
        Ok(Self {
            enzyme,
            duration: 0.5,
            cost: 15.0,
            min_segment: 50,
            max_segment: Some(3000),
            max_fragments: Some(12),
        })
    }

    pub fn enzyme(&self) -> &RestrictionEnzyme {
        &self.enzyme
    }
}

impl AssemblyMethod for GoldenGateAssembly {
    fn name(&self) -> &str {
        "golden-gate"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn min_segment_length(&self) -> usize {
        self.min_segment
    }

    fn max_segment_length(&self) -> Option<usize> {
        self.max_segment
    }

    fn max_fragments(&self) -> Option<usize> {
        self.max_fragments
    }

    fn fragment_constraints(&self) -> Vec<SequenceConstraint> {
        vec![SequenceConstraint::NoEnzymeSite {
            enzyme: self.enzyme.name.clone(),
        }]
    }

    fn cuts_set_constraints(&self, sequence: &DnaSequence) -> Vec<CutsSetConstraint> {
        vec![CutsSetConstraint::UniqueJunctions {
            window: self.enzyme.overhang,
            sequence: sequence.clone(),
        }]
    }

    fn suggest_cuts(&self, sequence: &DnaSequence) -> Vec<usize> {
        self.enzyme
            .sites(sequence)
            .into_iter()
            .filter(|&p| p > 0 && p < sequence.len())
            .collect()
    }

    fn compute_fragment(&self, sequence: &DnaSequence, segment: Segment) -> DnaSequence {
        extended_fragment(sequence, segment, self.enzyme.overhang)
    }

    fn fingerprint(&self) -> String {
        format!(
            "golden-gate/{}/{:.4}/{:.4}/{}/{:?}",
            self.enzyme.name, self.cost, self.duration, self.min_segment, self.max_segment
        )
    }
}

/// Minimal blunt-ligation method: fragments are the bare segments. Mostly
/// useful for leaf stations and tests.
#[derive(Clone, Debug)]
pub struct BluntAssembly {
    pub duration: f64,
    pub cost: f64,
    pub min_segment: usize,
    pub max_segment: Option<usize>,
    pub max_fragments: Option<usize>,
}

impl Default for BluntAssembly {
    fn default() -> Self {
        Self {
            duration: 0.25,
            cost: 5.0,
            min_segment: 20,
            max_segment: None,
            max_fragments: None,
        }
    }
}

impl AssemblyMethod for BluntAssembly {
    fn name(&self) -> &str {
        "blunt"
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn cost(&self) -> f64 {
        self.cost
    }

    fn min_segment_length(&self) -> usize {
        self.min_segment
    }

    fn max_segment_length(&self) -> Option<usize> {
        self.max_segment
    }

    fn max_fragments(&self) -> Option<usize> {
        self.max_fragments
    }

    fn compute_fragment(&self, sequence: &DnaSequence, segment: Segment) -> DnaSequence {
        sequence
            .subsequence(segment)
            .unwrap_or_else(|| sequence.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> DnaSequence {
        DnaSequence::from_sequence(s).unwrap()
    }

    #[test]
    fn test_gibson_fragment_extension() {
        let method = GibsonAssembly {
            homology_arm: 2,
            ..GibsonAssembly::default()
        };
        let sequence = seq("AAACCCGGGTTT");
        // [3,6) extended by the 2 bp arm on both sides is [1,8)
        let fragment = method.compute_fragment(&sequence, Segment::new(3, 6));
        assert_eq!(fragment.as_str(), "AACCCGG");
        // Clamped at the sequence boundaries
        let fragment = method.compute_fragment(&sequence, Segment::new(0, 3));
        assert_eq!(fragment.as_str(), "AAACC");
    }

    #[test]
    fn test_golden_gate_unknown_enzyme_is_config_error() {
        assert!(GoldenGateAssembly::new("NoSuchEnzyme").is_err());
        assert!(GoldenGateAssembly::new("BsaI").is_ok());
    }

    #[test]
    fn test_golden_gate_forbids_internal_sites() {
        let method = GoldenGateAssembly::new("BsaI").unwrap();
        let constraints = method.fragment_constraints();
        let with_site = seq("AAGGTCTCAA");
        let without = seq("AAAACCCCAA");
        assert!(!constraints[0].accepts(&with_site));
        assert!(constraints[0].accepts(&without));
    }

    #[test]
    fn test_golden_gate_suggests_site_positions() {
        let method = GoldenGateAssembly::new("BsaI").unwrap();
        let sequence = seq("AAAAGGTCTCAAAA");
        assert_eq!(method.suggest_cuts(&sequence), vec![4]);
    }

    #[test]
    fn test_blunt_fragment_is_bare_segment() {
        let method = BluntAssembly::default();
        let sequence = seq("AAACCCGGG");
        let fragment = method.compute_fragment(&sequence, Segment::new(3, 6));
        assert_eq!(fragment.as_str(), "CCC");
    }

    #[test]
    fn test_fingerprints_differ_by_enzyme() {
        let a = GoldenGateAssembly::new("BsaI").unwrap();
        let b = GoldenGateAssembly::new("BsmBI").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
