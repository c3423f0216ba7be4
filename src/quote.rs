use crate::sequence::{DnaSequence, Segment};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One fulfilled segment of an assembly plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanEntry {
    pub segment: Segment,
    pub quote: Quote,
}

/// The externally visible result unit: a possibly multi-level tree of
/// accepted or rejected offers. A parent exclusively owns its children.
///
/// Invariants kept by the constructors: a rejected quote has no price and
/// no assembly plan; an accepted quote with a plan prices at the sum of
/// its children plus its own overhead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    pub id: Option<String>,
    pub source_name: String,
    pub sequence: DnaSequence,
    pub accepted: bool,
    pub price: Option<f64>,
    pub lead_time: Option<f64>,
    /// Propagated top-down, never computed bottom-up.
    pub deadline: Option<f64>,
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Empty for a terminal, non-decomposed quote.
    #[serde(default)]
    pub assembly_plan: Vec<PlanEntry>,
}

impl Quote {
    pub fn accepted(
        source_name: impl Into<String>,
        sequence: DnaSequence,
        price: f64,
        lead_time: Option<f64>,
    ) -> Self {
        Self {
            id: None,
            source_name: source_name.into(),
            sequence,
            accepted: true,
            price: Some(price),
            lead_time,
            deadline: None,
            message: None,
            metadata: HashMap::new(),
            assembly_plan: vec![],
        }
    }

    pub fn rejected(
        source_name: impl Into<String>,
        sequence: DnaSequence,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source_name: source_name.into(),
            sequence,
            accepted: false,
            price: None,
            lead_time: None,
            deadline: None,
            message: Some(message.into()),
            metadata: HashMap::new(),
            assembly_plan: vec![],
        }
    }

    /// Attach an assembly plan, ordered by segment start. Ignored on a
    /// rejected quote, which must never carry a plan.
    pub fn with_assembly_plan(mut self, mut plan: Vec<PlanEntry>) -> Self {
        if self.accepted {
            plan.sort_by_key(|e| e.segment);
            self.assembly_plan = plan;
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_deadline(mut self, deadline: f64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn per_basepair_price(&self) -> Option<f64> {
        match (self.price, self.sequence.len()) {
            (Some(price), len) if len > 0 => Some(price / len as f64),
            _ => None,
        }
    }

    /// Sorted interior plan boundaries: every segment end except the last.
    pub fn cut_positions(&self) -> Vec<usize> {
        let mut ends: Vec<usize> = self
            .assembly_plan
            .iter()
            .map(|e| e.segment.end)
            .sorted_unstable()
            .collect();
        ends.pop();
        ends
    }

    /// All nodes of the tree, pre-order.
    pub fn flatten(&self) -> Vec<&Quote> {
        let mut nodes = vec![self];
        for entry in &self.assembly_plan {
            nodes.extend(entry.quote.flatten());
        }
        nodes
    }

    /// Assign depth-first identifiers to every node. Call once the tree is
    /// frozen (after expansion).
    pub fn assign_ids(&mut self) {
        let mut counter = 0u64;
        self.assign_ids_from(&mut counter);
    }

    fn assign_ids_from(&mut self, counter: &mut u64) {
        *counter += 1;
        self.id = Some(format!("q-{counter}"));
        for entry in &mut self.assembly_plan {
            entry.quote.assign_ids_from(counter);
        }
    }

    /// Set this node's deadline to `deadline` and every child's to
    /// `deadline - step_duration`, recursively. Idempotent.
    pub fn propagate_deadline(&mut self, deadline: f64) {
        self.deadline = Some(deadline);
        let child_deadline = deadline - self.step_duration();
        for entry in &mut self.assembly_plan {
            entry.quote.propagate_deadline(child_deadline);
        }
    }

    /// The node's own assembly time: total lead time minus the slowest
    /// child. Zero when lead times are unknown.
    pub fn step_duration(&self) -> f64 {
        let slowest_child = self
            .assembly_plan
            .iter()
            .filter_map(|e| e.quote.lead_time)
            .fold(f64::NEG_INFINITY, f64::max);
        match self.lead_time {
            Some(total) if slowest_child.is_finite() => (total - slowest_child).max(0.0),
            _ => 0.0,
        }
    }

    /// Structural dump for external renderers. Tolerates rejected leaves
    /// (`price: null`, empty plan).
    pub fn report(&self) -> QuoteReport {
        QuoteReport {
            id: self.id.clone(),
            source_name: self.source_name.clone(),
            sequence: self.sequence.as_str().to_string(),
            accepted: self.accepted,
            price: self.price,
            lead_time: self.lead_time,
            deadline: self.deadline,
            message: self.message.clone(),
            metadata: self.metadata.clone(),
            assembly_plan: self
                .assembly_plan
                .iter()
                .map(|e| ReportEntry {
                    segment_start: e.segment.start,
                    segment_end: e.segment.end,
                    child: e.quote.report(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuoteReport {
    pub id: Option<String>,
    pub source_name: String,
    pub sequence: String,
    pub accepted: bool,
    pub price: Option<f64>,
    pub lead_time: Option<f64>,
    pub deadline: Option<f64>,
    pub message: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub assembly_plan: Vec<ReportEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportEntry {
    pub segment_start: usize,
    pub segment_end: usize,
    pub child: QuoteReport,
}
