use crate::cache::{content_key, SingleFlight};
use crate::decomposer::{
    AStarFactor, DecomposerSettings, SegmentDecomposer, SegmentScore,
};
use crate::error::QuoteError;
use crate::methods::AssemblyMethod;
use crate::quote::{PlanEntry, Quote};
use crate::sequence::Segment;
use crate::source::{CutSuggester, QuoteRequest, QuoteSource, MAX_SUPPLIER_DEPTH};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    pub coarse_grain: usize,
    pub fine_grain: usize,
    pub a_star_factor: AStarFactor,
    /// Caps the number of fragments per plan; the method's own
    /// `max_fragments` applies on top of this.
    pub path_size_limit: Option<usize>,
    /// Content-addressed memoization of whole quotes.
    pub memoize: bool,
    /// Pre-appraise the coarse candidate segments on the rayon pool.
    pub parallel_oracle: bool,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            coarse_grain: 10,
            fine_grain: 2,
            a_star_factor: AStarFactor::Disabled,
            path_size_limit: None,
            memoize: true,
            parallel_oracle: false,
        }
    }
}

impl StationSettings {
    pub fn validate(&self) -> Result<(), QuoteError> {
        if self.coarse_grain == 0 || self.fine_grain == 0 {
            return Err(QuoteError::invalid_input("grain sizes must be >= 1"));
        }
        if self.fine_grain > self.coarse_grain {
            return Err(QuoteError::invalid_input(format!(
                "fine_grain {} > coarse_grain {}",
                self.fine_grain, self.coarse_grain
            )));
        }
        if self.path_size_limit == Some(0) {
            return Err(QuoteError::invalid_input("path_size_limit must be >= 1"));
        }
        Ok(())
    }
}

/// A source that fulfills sequences by decomposing them, buying the
/// fragments from a single downstream supplier and assembling them with
/// one method. The downstream supplier may itself be a station, so
/// stations chain into a quoting graph.
pub struct AssemblyStation {
    name: String,
    method: Arc<dyn AssemblyMethod>,
    supplier: Arc<dyn QuoteSource>,
    settings: StationSettings,
    /// Resolved at construction from the supplier's advertised floor.
    a_star_factor: f64,
    cache: SingleFlight<Quote>,
}

impl AssemblyStation {
    pub fn new(
        name: impl Into<String>,
        method: Arc<dyn AssemblyMethod>,
        supplier: Arc<dyn QuoteSource>,
        settings: StationSettings,
    ) -> Result<Self, QuoteError> {
        settings.validate()?;
        let depth = 1 + supplier.graph_depth();
        if depth > MAX_SUPPLIER_DEPTH {
            return Err(QuoteError::new(
                crate::error::ErrorCode::DepthExceeded,
                format!("supplier graph depth {depth} exceeds {MAX_SUPPLIER_DEPTH}"),
            ));
        }
        let a_star_factor = settings.a_star_factor.resolve(supplier.min_basepair_price());
        Ok(Self {
            name: name.into(),
            method,
            supplier,
            settings,
            a_star_factor,
            cache: SingleFlight::new(),
        })
    }

    pub fn settings(&self) -> &StationSettings {
        &self.settings
    }

    fn decomposer_settings(&self, request: &QuoteRequest) -> DecomposerSettings {
        let seq = &request.sequence;
        let mut suggested = self.method.suggest_cuts(seq);
        if let Some(suggester) = self.supplier.as_cut_suggester() {
            suggested.extend(suggester.suggest_cuts(seq));
        }
        let path_size_limit = match (self.settings.path_size_limit, self.method.max_fragments()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        DecomposerSettings {
            min_segment_length: self.method.min_segment_length(),
            max_segment_length: self.method.max_segment_length(),
            coarse_grain: self.settings.coarse_grain,
            fine_grain: self.settings.fine_grain,
            a_star_factor: self.a_star_factor,
            path_size_limit,
            forced_cuts: self.method.force_cuts(seq),
            suggested_cuts: suggested,
            ..DecomposerSettings::default()
        }
    }

    /// Coarse candidate segments, appraised up front when the parallel
    /// oracle is on. A superset of what the first search pass will visit.
    fn coarse_segments(&self, length: usize, settings: &DecomposerSettings) -> Vec<Segment> {
        let mut nodes: Vec<usize> = (0..length)
            .step_by(settings.coarse_grain)
            .chain(std::iter::once(length))
            .collect();
        nodes.dedup();
        let min = settings.min_segment_length;
        let max = settings.max_segment_length.unwrap_or(length);
        let mut segments = vec![];
        for (i, &from) in nodes.iter().enumerate() {
            for &to in &nodes[i + 1..] {
                let len = to - from;
                if len > max {
                    break;
                }
                if len >= min {
                    segments.push(Segment::new(from, to));
                }
            }
        }
        segments
    }

    fn compute_quote(&self, request: &QuoteRequest) -> Quote {
        let seq = &request.sequence;
        for constraint in &self.method.sequence_constraints() {
            if !constraint.accepts(seq) {
                return Quote::rejected(&self.name, seq.clone(), format!("requires {constraint}"));
            }
        }

        // The station spends its own assembly time before any fragment
        // deadline starts counting.
        let remaining = request.max_lead_time.map(|d| d - self.method.duration());
        if remaining.is_some_and(|r| r < 0.0) {
            return Quote::rejected(
                &self.name,
                seq.clone(),
                format!("deadline shorter than assembly time {:.1}", self.method.duration()),
            );
        }

        let settings = self.decomposer_settings(request);
        let fragment_constraints = self.method.fragment_constraints();
        let appraise = |segment: Segment| -> Option<SegmentScore> {
            let fragment = self.method.compute_fragment(seq, segment);
            for constraint in &fragment_constraints {
                if !constraint.accepts(&fragment) {
                    return None;
                }
            }
            let mut child_request = QuoteRequest::new(fragment);
            child_request.max_lead_time = remaining;
            let quote = self.supplier.get_quote(&child_request);
            let price = quote.price?;
            Some(SegmentScore {
                price,
                lead_time: quote.lead_time,
            })
        };

        let prewarmed: HashMap<Segment, Option<SegmentScore>> = if self.settings.parallel_oracle {
            self.coarse_segments(seq.len(), &settings)
                .par_iter()
                .map(|&segment| (segment, appraise(segment)))
                .collect()
        } else {
            HashMap::new()
        };
        let oracle = |segment: Segment| match prewarmed.get(&segment) {
            Some(&score) => score,
            None => appraise(segment),
        };

        let cut_constraints = self.method.cut_constraints();
        let set_constraints = self.method.cuts_set_constraints(seq);
        let mut decomposer = match SegmentDecomposer::new(seq.len(), &oracle, &settings) {
            Ok(decomposer) => decomposer
                .with_cut_constraints(&cut_constraints)
                .with_set_constraints(&set_constraints),
            Err(err) => {
                return Quote::rejected(&self.name, seq.clone(), err.to_string());
            }
        };
        let decomposition = match decomposer.solve() {
            Ok(d) => d,
            Err(err) => {
                let message = if decomposer.was_aborted() {
                    "cut search aborted before exhausting the space".to_string()
                } else {
                    err.to_string()
                };
                debug!("{}: {message}", self.name);
                return Quote::rejected(&self.name, seq.clone(), message);
            }
        };

        // Re-quote the winning segments so the plan carries real child
        // quotes, not just oracle scores.
        let mut plan = Vec::with_capacity(decomposition.segments.len());
        let mut total = self.method.cost();
        let mut slowest = 0.0f64;
        let mut lead_known = true;
        for (segment, _) in &decomposition.segments {
            let fragment = self.method.compute_fragment(seq, *segment);
            let mut child_request = QuoteRequest::new(fragment);
            child_request.max_lead_time = remaining;
            let mut child = self.supplier.get_quote(&child_request);
            if let Some(r) = remaining {
                child.deadline = Some(r);
            }
            let Some(price) = child.price else {
                return Quote::rejected(
                    &self.name,
                    seq.clone(),
                    format!("supplier withdrew fragment {segment:?}"),
                );
            };
            total += price;
            match child.lead_time {
                Some(lead) => slowest = slowest.max(lead),
                None => lead_known = false,
            }
            plan.push(PlanEntry {
                segment: *segment,
                quote: child,
            });
        }
        let lead_time = lead_known.then(|| slowest + self.method.duration());

        debug!(
            "{}: {} fragments, total {:.2}",
            self.name,
            plan.len(),
            total
        );
        let mut quote = Quote::accepted(&self.name, seq.clone(), total, lead_time)
            .with_metadata("assembly_method", self.method.name().into())
            .with_metadata("fragments", plan.len().into());
        if let Some(deadline) = request.max_lead_time {
            quote = quote.with_deadline(deadline);
        }
        if request.with_assembly_plan {
            quote = quote.with_assembly_plan(plan);
        }
        quote
    }

    fn request_key(&self, request: &QuoteRequest) -> u64 {
        content_key(&[
            request.sequence.as_str().to_string(),
            self.method.fingerprint(),
            format!("{:?}", request.max_lead_time.map(f64::to_bits)),
            request.with_assembly_plan.to_string(),
        ])
    }
}

impl QuoteSource for AssemblyStation {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_basepair_price(&self) -> f64 {
        // Fragments cannot be cheaper per base pair than the supplier's
        // own floor; the method's fixed cost only adds to that.
        self.supplier.min_basepair_price()
    }

    fn get_quote(&self, request: &QuoteRequest) -> Quote {
        if self.settings.memoize {
            self.cache
                .get_or_compute(self.request_key(request), || self.compute_quote(request))
        } else {
            self.compute_quote(request)
        }
    }

    fn as_cut_suggester(&self) -> Option<&dyn CutSuggester> {
        Some(self)
    }

    /// Replace each shallow child with the supplier's fully realized quote
    /// for the same fragment, recursively.
    fn expand(&self, quote: Quote) -> Quote {
        if !quote.accepted {
            return quote;
        }
        let mut quote = if quote.assembly_plan.is_empty() {
            let mut request = QuoteRequest::new(quote.sequence.clone()).with_plan();
            request.max_lead_time = quote.deadline;
            self.get_quote(&request)
        } else {
            quote
        };
        let plan = std::mem::take(&mut quote.assembly_plan);
        let plan = plan
            .into_iter()
            .map(|mut entry| {
                entry.quote = self.supplier.expand(entry.quote);
                entry
            })
            .collect();
        quote.with_assembly_plan(plan)
    }

    fn graph_depth(&self) -> usize {
        1 + self.supplier.graph_depth()
    }
}

impl CutSuggester for AssemblyStation {
    fn suggest_cuts(&self, sequence: &crate::sequence::DnaSequence) -> Vec<usize> {
        self.method.suggest_cuts(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{PricingModel, SequenceConstraint};
    use crate::methods::BluntAssembly;
    use crate::sequence::DnaSequence;
    use crate::source::DnaSynthesisOffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seq(n: usize) -> DnaSequence {
        DnaSequence::from_sequence(&"ACGT".repeat(n / 4)).unwrap()
    }

    fn blunt(min: usize, max: usize) -> Arc<dyn AssemblyMethod> {
        Arc::new(BluntAssembly {
            duration: 0.25,
            cost: 5.0,
            min_segment: min,
            max_segment: Some(max),
            max_fragments: None,
        })
    }

    fn offer() -> Arc<dyn QuoteSource> {
        Arc::new(
            DnaSynthesisOffer::new("vendor", PricingModel::PerBasepair(0.1), 5.0)
                .with_constraint(SequenceConstraint::LengthBetween { min: 4, max: 100 }),
        )
    }

    fn settings(coarse: usize) -> StationSettings {
        StationSettings {
            coarse_grain: coarse,
            fine_grain: coarse,
            ..StationSettings::default()
        }
    }

    /// Wrapper counting downstream calls.
    struct Counting {
        inner: Arc<dyn QuoteSource>,
        calls: AtomicUsize,
    }

    impl QuoteSource for Counting {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn min_basepair_price(&self) -> f64 {
            self.inner.min_basepair_price()
        }

        fn get_quote(&self, request: &QuoteRequest) -> Quote {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_quote(request)
        }
    }

    #[test]
    fn test_quotes_and_plans() {
        let _ = env_logger::builder().is_test(true).try_init();
        let station = AssemblyStation::new("station", blunt(20, 50), offer(), settings(10)).unwrap();
        let quote = station.get_quote(&QuoteRequest::new(seq(120)).with_plan());
        assert!(quote.accepted, "{:?}", quote.message);
        // 120 bp at $0.10/bp plus the $5 assembly cost
        assert!((quote.price.unwrap() - 17.0).abs() < 1e-9);
        assert!((quote.lead_time.unwrap() - 5.25).abs() < 1e-9);
        assert_eq!(quote.metadata["assembly_method"], "blunt");
        // The plan tiles the sequence
        let cuts = quote.cut_positions();
        assert!(!cuts.is_empty());
        assert_eq!(quote.assembly_plan.first().unwrap().segment.start, 0);
        assert_eq!(quote.assembly_plan.last().unwrap().segment.end, 120);
        for entry in &quote.assembly_plan {
            let len = entry.segment.len();
            assert!((20..=50).contains(&len));
            assert!(entry.quote.accepted);
        }
    }

    #[test]
    fn test_plan_omitted_unless_requested() {
        let station = AssemblyStation::new("station", blunt(20, 50), offer(), settings(10)).unwrap();
        let quote = station.get_quote(&QuoteRequest::new(seq(120)));
        assert!(quote.accepted);
        assert!(quote.assembly_plan.is_empty());
    }

    #[test]
    fn test_rejects_when_supplier_cannot_source() {
        let supplier: Arc<dyn QuoteSource> = Arc::new(
            DnaSynthesisOffer::new("vendor", PricingModel::PerBasepair(0.1), 5.0)
                .with_constraint(SequenceConstraint::LengthBetween { min: 200, max: 300 }),
        );
        let station = AssemblyStation::new("station", blunt(20, 50), supplier, settings(10)).unwrap();
        let quote = station.get_quote(&QuoteRequest::new(seq(120)));
        assert!(!quote.accepted);
        assert!(quote.price.is_none());
    }

    #[test]
    fn test_deadline_rejections() {
        let station = AssemblyStation::new("station", blunt(20, 50), offer(), settings(10)).unwrap();
        // Tighter than the assembly time alone
        let quote = station.get_quote(&QuoteRequest::new(seq(120)).with_deadline(0.1));
        assert!(!quote.accepted);
        // Enough for assembly but not for the 5-day vendor lead time
        let quote = station.get_quote(&QuoteRequest::new(seq(120)).with_deadline(5.0));
        assert!(!quote.accepted);
        let quote = station.get_quote(&QuoteRequest::new(seq(120)).with_deadline(5.25));
        assert!(quote.accepted);
    }

    #[test]
    fn test_depth_limit_is_construction_error() {
        let mut source: Arc<dyn QuoteSource> = offer();
        for i in 0..MAX_SUPPLIER_DEPTH - 1 {
            source = Arc::new(
                AssemblyStation::new(format!("s{i}"), blunt(20, 50), source, settings(10)).unwrap(),
            );
        }
        assert_eq!(source.graph_depth(), MAX_SUPPLIER_DEPTH);
        let err = AssemblyStation::new("too-deep", blunt(20, 50), source, settings(10));
        assert!(err.is_err());
        assert_eq!(
            err.err().unwrap().code,
            crate::error::ErrorCode::DepthExceeded
        );
    }

    #[test]
    fn test_memoization_skips_recomputation() {
        let counting = Arc::new(Counting {
            inner: offer(),
            calls: AtomicUsize::new(0),
        });
        let station =
            AssemblyStation::new("station", blunt(20, 50), counting.clone(), settings(10)).unwrap();
        let request = QuoteRequest::new(seq(120));
        let first = station.get_quote(&request);
        let after_first = counting.calls.load(Ordering::SeqCst);
        assert!(after_first > 0);
        let second = station.get_quote(&request);
        assert_eq!(counting.calls.load(Ordering::SeqCst), after_first);
        assert_eq!(first.price, second.price);
        // A different deadline is a different cache entry
        let _ = station.get_quote(&QuoteRequest::new(seq(120)).with_deadline(50.0));
        assert!(counting.calls.load(Ordering::SeqCst) > after_first);
    }

    #[test]
    fn test_parallel_oracle_matches_sequential() {
        let mut parallel = settings(10);
        parallel.parallel_oracle = true;
        let plain =
            AssemblyStation::new("station", blunt(20, 50), offer(), settings(10)).unwrap();
        let fast = AssemblyStation::new("station", blunt(20, 50), offer(), parallel).unwrap();
        let request = QuoteRequest::new(seq(120)).with_plan();
        let a = plain.get_quote(&request);
        let b = fast.get_quote(&request);
        assert_eq!(a.accepted, b.accepted);
        assert_eq!(a.price, b.price);
        assert_eq!(a.cut_positions(), b.cut_positions());
    }

    #[test]
    fn test_expand_realizes_nested_plans() {
        let inner = Arc::new(
            AssemblyStation::new("inner", blunt(20, 60), offer(), settings(10)).unwrap(),
        );
        let outer =
            AssemblyStation::new("outer", blunt(100, 200), inner, settings(20)).unwrap();
        let quote = outer.get_quote(&QuoteRequest::new(seq(400)).with_plan());
        assert!(quote.accepted, "{:?}", quote.message);
        // Children come back shallow, expansion realizes their plans
        assert!(quote.assembly_plan.iter().all(|e| e.quote.assembly_plan.is_empty()));
        let expanded = outer.expand(quote);
        assert!(!expanded.assembly_plan.is_empty());
        for entry in &expanded.assembly_plan {
            assert_eq!(entry.quote.source_name, "inner");
            assert!(!entry.quote.assembly_plan.is_empty());
            for leaf in &entry.quote.assembly_plan {
                assert_eq!(leaf.quote.source_name, "vendor");
            }
        }
    }
}
