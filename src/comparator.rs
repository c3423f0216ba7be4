use crate::decomposer::PRICE_EPSILON;
use crate::error::QuoteError;
use crate::quote::Quote;
use crate::sequence::DnaSequence;
use crate::source::{CutSuggester, QuoteRequest, QuoteSource, MAX_SUPPLIER_DEPTH};
use itertools::Itertools;
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// A source that asks several member sources for the same sequence and
/// keeps the cheapest accepted quote. Members are ordered by their
/// advertised per-base-pair floor, which lets the sequential mode stop as
/// soon as no remaining member can beat the incumbent.
pub struct SourceComparator {
    name: String,
    sources: Vec<Arc<dyn QuoteSource>>,
    pruning: bool,
    parallel: bool,
}

impl SourceComparator {
    pub fn new(
        name: impl Into<String>,
        mut sources: Vec<Arc<dyn QuoteSource>>,
    ) -> Result<Self, QuoteError> {
        if sources.is_empty() {
            return Err(QuoteError::invalid_input(
                "a comparator needs at least one source",
            ));
        }
        let depth = 1 + sources
            .iter()
            .map(|s| s.graph_depth())
            .max()
            .unwrap_or(0);
        if depth > MAX_SUPPLIER_DEPTH {
            return Err(QuoteError::new(
                crate::error::ErrorCode::DepthExceeded,
                format!("supplier graph depth {depth} exceeds {MAX_SUPPLIER_DEPTH}"),
            ));
        }
        // Stable sort keeps the declaration order among equal floors, which
        // makes tie-breaking deterministic.
        sources.sort_by(|a, b| a.min_basepair_price().total_cmp(&b.min_basepair_price()));
        Ok(Self {
            name: name.into(),
            sources,
            pruning: true,
            parallel: false,
        })
    }

    pub fn without_pruning(mut self) -> Self {
        self.pruning = false;
        self
    }

    /// Query all members on the rayon pool instead of sequentially. Incurs
    /// every member's cost but the selection is identical.
    pub fn with_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    fn select(&self, quotes: Vec<Quote>, sequence: &DnaSequence) -> Quote {
        let mut best: Option<Quote> = None;
        for quote in quotes {
            if !quote.accepted {
                continue;
            }
            let better = match (&best, quote.price) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(incumbent), Some(price)) => {
                    // Strictly better only, so the lower-floor member wins ties.
                    incumbent.price.is_some_and(|p| price < p - PRICE_EPSILON)
                }
            };
            if better {
                best = Some(quote);
            }
        }
        best.unwrap_or_else(|| {
            Quote::rejected(&self.name, sequence.clone(), "no source accepted the sequence")
        })
    }
}

impl QuoteSource for SourceComparator {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_basepair_price(&self) -> f64 {
        self.sources
            .iter()
            .map(|s| s.min_basepair_price())
            .fold(f64::INFINITY, f64::min)
    }

    fn get_quote(&self, request: &QuoteRequest) -> Quote {
        let sequence = &request.sequence;
        if self.parallel {
            let quotes: Vec<Quote> = self
                .sources
                .par_iter()
                .map(|source| source.get_quote(request))
                .collect();
            return self.select(quotes, sequence);
        }
        let length = sequence.len() as f64;
        let mut best: Option<Quote> = None;
        for source in &self.sources {
            if self.pruning {
                if let Some(incumbent) = best.as_ref().and_then(|q| q.price) {
                    // Members are floor-sorted; once one cannot beat the
                    // incumbent, none of the remaining ones can.
                    if source.min_basepair_price() * length > incumbent + PRICE_EPSILON {
                        debug!("{}: pruned at {}", self.name, source.name());
                        break;
                    }
                }
            }
            let quote = source.get_quote(request);
            let better = match (best.as_ref().and_then(|q| q.price), quote.price) {
                _ if !quote.accepted => false,
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(incumbent), Some(price)) => price < incumbent - PRICE_EPSILON,
            };
            if better {
                best = Some(quote);
            }
        }
        best.unwrap_or_else(|| {
            Quote::rejected(&self.name, sequence.clone(), "no source accepted the sequence")
        })
    }

    fn as_cut_suggester(&self) -> Option<&dyn CutSuggester> {
        Some(self)
    }

    /// Route expansion to the member that issued the winning quote.
    fn expand(&self, quote: Quote) -> Quote {
        match self
            .sources
            .iter()
            .find(|s| s.name() == quote.source_name)
        {
            Some(source) => source.expand(quote),
            None => quote,
        }
    }

    fn graph_depth(&self) -> usize {
        1 + self
            .sources
            .iter()
            .map(|s| s.graph_depth())
            .max()
            .unwrap_or(0)
    }
}

impl CutSuggester for SourceComparator {
    fn suggest_cuts(&self, sequence: &DnaSequence) -> Vec<usize> {
        self.sources
            .iter()
            .filter_map(|s| s.as_cut_suggester())
            .flat_map(|s| s.suggest_cuts(sequence))
            .sorted_unstable()
            .dedup()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{PricingModel, SequenceConstraint};
    use crate::source::DnaSynthesisOffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seq(n: usize) -> DnaSequence {
        DnaSequence::from_sequence(&"ACGT".repeat(n / 4)).unwrap()
    }

    fn offer(name: &str, rate: f64, lead: f64) -> Arc<dyn QuoteSource> {
        Arc::new(DnaSynthesisOffer::new(name, PricingModel::PerBasepair(rate), lead))
    }

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
    fn test_empty_is_config_error() {
        assert!(SourceComparator::new("empty", vec![]).is_err());
    }

    #[test]
    fn test_picks_cheapest_accepted() {
        // The cheaper source rejects, so the pricier one must win.
        let cheap_but_picky: Arc<dyn QuoteSource> = Arc::new(
            DnaSynthesisOffer::new("cheap", PricingModel::PerBasepair(0.40), 3.0)
                .with_constraint(SequenceConstraint::LengthBetween {
                    min: 1000,
                    max: 2000,
                }),
        );
        let comparator = SourceComparator::new(
            "market",
            vec![offer("steady", 0.50, 3.0), cheap_but_picky],
        )
        .unwrap();
        let quote = comparator.get_quote(&QuoteRequest::new(seq(200)));
        assert!(quote.accepted);
        assert_eq!(quote.source_name, "steady");
        assert!((quote.price.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_rejected_falls_back() {
        let picky: Arc<dyn QuoteSource> = Arc::new(
            DnaSynthesisOffer::new("picky", PricingModel::PerBasepair(0.40), 3.0)
                .with_constraint(SequenceConstraint::LengthBetween {
                    min: 1000,
                    max: 2000,
                }),
        );
        let comparator = SourceComparator::new("market", vec![picky]).unwrap();
        let quote = comparator.get_quote(&QuoteRequest::new(seq(200)));
        assert!(!quote.accepted);
        assert_eq!(quote.source_name, "market");
        assert!(quote.price.is_none());
    }

    #[test]
    fn test_pruning_skips_dominated_sources() {
        let expensive = Arc::new(Counting {
            inner: offer("pricey", 1.0, 3.0),
            calls: AtomicUsize::new(0),
        });
        let comparator = SourceComparator::new(
            "market",
            vec![offer("cheap", 0.10, 3.0), expensive.clone()],
        )
        .unwrap();
        let quote = comparator.get_quote(&QuoteRequest::new(seq(200)));
        assert_eq!(quote.source_name, "cheap");
        assert_eq!(expensive.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pruning_and_parallel_agree() {
        let sources = || {
            vec![
                offer("a", 0.30, 3.0),
                offer("b", 0.20, 3.0),
                offer("c", 0.50, 3.0),
            ]
        };
        let request = QuoteRequest::new(seq(200));
        let pruned = SourceComparator::new("m", sources()).unwrap();
        let full = SourceComparator::new("m", sources()).unwrap().without_pruning();
        let par = SourceComparator::new("m", sources()).unwrap().with_parallel();
        let a = pruned.get_quote(&request);
        let b = full.get_quote(&request);
        let c = par.get_quote(&request);
        assert_eq!(a.source_name, "b");
        assert_eq!(a.source_name, b.source_name);
        assert_eq!(a.source_name, c.source_name);
        assert_eq!(a.price, b.price);
        assert_eq!(a.price, c.price);
    }

    #[test]
    fn test_floor_is_member_minimum() {
        let comparator = SourceComparator::new(
            "market",
            vec![offer("a", 0.30, 3.0), offer("b", 0.20, 3.0)],
        )
        .unwrap();
        assert!((comparator.min_basepair_price() - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_deadline_forwarded_to_members() {
        let comparator =
            SourceComparator::new("market", vec![offer("slow", 0.10, 10.0)]).unwrap();
        let quote = comparator.get_quote(&QuoteRequest::new(seq(200)).with_deadline(5.0));
        assert!(!quote.accepted);
    }
}
