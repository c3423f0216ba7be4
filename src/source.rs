use crate::constraints::{PricingModel, SequenceConstraint};
use crate::quote::Quote;
use crate::sequence::DnaSequence;

/// Maximum supplier-graph depth. Exceeding it is a configuration error
/// surfaced at construction time, never unbounded recursion at quote time.
pub const MAX_SUPPLIER_DEPTH: usize = 8;

#[derive(Clone, Debug)]
pub struct QuoteRequest {
    pub sequence: DnaSequence,
    /// Remaining lead-time budget; tightened by each station on the way down.
    pub max_lead_time: Option<f64>,
    /// Whether the issuing source should retain its assembly plan on the
    /// returned quote.
    pub with_assembly_plan: bool,
}

impl QuoteRequest {
    pub fn new(sequence: DnaSequence) -> Self {
        Self {
            sequence,
            max_lead_time: None,
            with_assembly_plan: false,
        }
    }

    pub fn with_deadline(mut self, max_lead_time: f64) -> Self {
        self.max_lead_time = Some(max_lead_time);
        self
    }

    pub fn with_plan(mut self) -> Self {
        self.with_assembly_plan = true;
        self
    }
}

/// Optional capability: a source that can propose good cut positions for a
/// sequence (e.g. around enzyme sites).
pub trait CutSuggester {
    fn suggest_cuts(&self, sequence: &DnaSequence) -> Vec<usize>;
}

/// The sole polymorphic seam of the subsystem: anything that can quote a
/// sequence, be it a leaf supplier, an assembly station, or a comparator.
///
/// Every normal "can't do it" outcome is a rejected `Quote`; a source that
/// panics instead breaks the contract.
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    /// Advertised lower bound on the achievable per-base-pair price, used
    /// for comparator pruning and A* heuristics.
    fn min_basepair_price(&self) -> f64;

    fn get_quote(&self, request: &QuoteRequest) -> Quote;

    /// Type-safe capability check, replacing duck-typed attribute probing.
    fn as_cut_suggester(&self) -> Option<&dyn CutSuggester> {
        None
    }

    /// Recursively replace shallowly quoted children with fully realized
    /// sub-plans. Leaf sources have nothing to expand.
    fn expand(&self, quote: Quote) -> Quote {
        quote
    }

    /// Depth of the supplier graph below (and including) this source.
    fn graph_depth(&self) -> usize {
        1
    }
}

/// A leaf supplier: a commercial synthesis offer with a pricing model, a
/// fixed lead time, and hard sequence acceptance constraints.
#[derive(Clone, Debug)]
pub struct DnaSynthesisOffer {
    name: String,
    pricing: PricingModel,
    lead_time: f64,
    constraints: Vec<SequenceConstraint>,
}

impl DnaSynthesisOffer {
    pub fn new(name: impl Into<String>, pricing: PricingModel, lead_time: f64) -> Self {
        Self {
            name: name.into(),
            pricing,
            lead_time,
            constraints: vec![],
        }
    }

    pub fn with_constraint(mut self, constraint: SequenceConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

impl QuoteSource for DnaSynthesisOffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_basepair_price(&self) -> f64 {
        self.pricing.min_basepair_price()
    }

    fn get_quote(&self, request: &QuoteRequest) -> Quote {
        let seq = &request.sequence;
        for constraint in &self.constraints {
            if !constraint.accepts(seq) {
                return Quote::rejected(&self.name, seq.clone(), format!("requires {constraint}"));
            }
        }
        if let Some(budget) = request.max_lead_time {
            if self.lead_time > budget {
                return Quote::rejected(
                    &self.name,
                    seq.clone(),
                    format!(
                        "lead time {:.1} exceeds remaining budget {:.1}",
                        self.lead_time, budget
                    ),
                );
            }
        }
        Quote::accepted(
            &self.name,
            seq.clone(),
            self.pricing.price(seq.len()),
            Some(self.lead_time),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> DnaSequence {
        DnaSequence::from_sequence(s).unwrap()
    }

    fn offer() -> DnaSynthesisOffer {
        DnaSynthesisOffer::new("acme", PricingModel::PerBasepair(0.5), 5.0)
            .with_constraint(SequenceConstraint::LengthBetween { min: 4, max: 100 })
    }

    #[test]
    fn test_accepts_and_prices() {
        let q = offer().get_quote(&QuoteRequest::new(seq("ACGTACGT")));
        assert!(q.accepted);
        assert_eq!(q.price, Some(4.0));
        assert_eq!(q.lead_time, Some(5.0));
        assert_eq!(q.source_name, "acme");
    }

    #[test]
    fn test_rejects_on_constraint() {
        let q = offer().get_quote(&QuoteRequest::new(seq("ACG")));
        assert!(!q.accepted);
        assert!(q.price.is_none());
        assert!(q.message.unwrap().contains("length in [4, 100]"));
    }

    #[test]
    fn test_rejects_on_deadline() {
        let q = offer().get_quote(&QuoteRequest::new(seq("ACGTACGT")).with_deadline(4.0));
        assert!(!q.accepted);
        let q = offer().get_quote(&QuoteRequest::new(seq("ACGTACGT")).with_deadline(5.0));
        assert!(q.accepted);
    }

    #[test]
    fn test_no_default_capability() {
        let source: &dyn QuoteSource = &offer();
        assert!(source.as_cut_suggester().is_none());
        assert_eq!(source.graph_depth(), 1);
    }
}
