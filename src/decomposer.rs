use crate::constraints::{CutConstraint, CutsSetConstraint};
use crate::error::{NoSolutionFound, QuoteError};
use crate::sequence::{segments_from_cuts, Segment};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

pub const PRICE_EPSILON: f64 = 1e-9;

// Safety valve for degenerate set-constraint searches.
const DEFAULT_MAX_EXPANSIONS: usize = 1_000_000;

/// Price and optional lead time the cost oracle reports for one segment.
/// A negative price is the rejection sentinel: the edge is simply absent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentScore {
    pub price: f64,
    pub lead_time: Option<f64>,
}

/// Per-segment cost oracle, supplied by the caller and invoked once per
/// distinct candidate segment. `None` means the segment cannot be sourced.
pub trait SegmentOracle: Sync {
    fn appraise(&self, segment: Segment) -> Option<SegmentScore>;
}

impl<F> SegmentOracle for F
where
    F: Fn(Segment) -> Option<SegmentScore> + Sync,
{
    fn appraise(&self, segment: Segment) -> Option<SegmentScore> {
        self(segment)
    }
}

/// Predicate over a whole candidate segment, evaluated before the oracle.
pub trait SegmentFilter: Sync {
    fn accepts(&self, segment: Segment) -> bool;
}

impl<F> SegmentFilter for F
where
    F: Fn(Segment) -> bool + Sync,
{
    fn accepts(&self, segment: Segment) -> bool {
        self(segment)
    }
}

/// A* weighting of the remaining sequence length. `Auto` resolves to
/// `2 × downstream min_basepair_price`, which is only admissible when the
/// downstream price really is bounded below per base pair; keep it
/// `Disabled` when in doubt (plain Dijkstra).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum AStarFactor {
    #[default]
    Disabled,
    Fixed(f64),
    Auto,
}

impl AStarFactor {
    pub fn resolve(&self, min_basepair_price: f64) -> f64 {
        match self {
            Self::Disabled => 0.0,
            Self::Fixed(factor) => *factor,
            Self::Auto => 2.0 * min_basepair_price,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerSettings {
    pub min_segment_length: usize,
    pub max_segment_length: Option<usize>,
    /// First-pass candidate spacing; keeps the graph near `length/coarse_grain` nodes.
    pub coarse_grain: usize,
    /// Second-pass spacing used to refine around each coarse cut.
    pub fine_grain: usize,
    /// Resolved A* factor; 0.0 degrades to Dijkstra.
    pub a_star_factor: f64,
    /// Maximum number of segments in any solution.
    pub path_size_limit: Option<usize>,
    pub forced_cuts: Vec<usize>,
    pub suggested_cuts: Vec<usize>,
    /// Cap on heap pops per search pass; exceeding it aborts the search.
    pub max_expansions: usize,
}

impl Default for DecomposerSettings {
    fn default() -> Self {
        Self {
            min_segment_length: 1,
            max_segment_length: None,
            coarse_grain: 1,
            fine_grain: 1,
            a_star_factor: 0.0,
            path_size_limit: None,
            forced_cuts: vec![],
            suggested_cuts: vec![],
            max_expansions: DEFAULT_MAX_EXPANSIONS,
        }
    }
}

impl DecomposerSettings {
    pub fn validate(&self) -> Result<(), QuoteError> {
        if self.min_segment_length == 0 {
            return Err(QuoteError::invalid_input("min_segment_length must be >= 1"));
        }
        if let Some(max) = self.max_segment_length {
            if max < self.min_segment_length {
                return Err(QuoteError::invalid_input(format!(
                    "max_segment_length {max} < min_segment_length {}",
                    self.min_segment_length
                )));
            }
        }
        if self.coarse_grain == 0 || self.fine_grain == 0 {
            return Err(QuoteError::invalid_input("grain sizes must be >= 1"));
        }
        if self.fine_grain > self.coarse_grain {
            return Err(QuoteError::invalid_input(format!(
                "fine_grain {} > coarse_grain {}",
                self.fine_grain, self.coarse_grain
            )));
        }
        if self.a_star_factor < 0.0 {
            return Err(QuoteError::invalid_input("a_star_factor must be >= 0"));
        }
        if self.path_size_limit == Some(0) {
            return Err(QuoteError::invalid_input("path_size_limit must be >= 1"));
        }
        if self.max_expansions == 0 {
            return Err(QuoteError::invalid_input("max_expansions must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Decomposition {
    /// `0 = c0 < c1 < … < ck = length`
    pub cuts: Vec<usize>,
    pub total_price: f64,
    pub segments: Vec<(Segment, SegmentScore)>,
}

#[derive(Clone, Debug)]
struct PathSolution {
    cuts: Vec<usize>,
    cost: f64,
}

/// Best-first state. The heap is a max-heap, so `Ord` is inverted to pop
/// the state with the smallest `(priority, cost, hops, cuts)` first. This
/// realizes the deterministic tie-break: cheapest, then fewest segments,
/// then lexicographically earliest cut positions.
#[derive(Clone, Debug)]
struct SearchState {
    priority: f64,
    cost: f64,
    path: Vec<usize>,
}

impl SearchState {
    #[inline(always)]
    fn node(&self) -> usize {
        *self.path.last().unwrap_or(&0)
    }

    #[inline(always)]
    fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

impl PartialEq for SearchState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchState {}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.cost.total_cmp(&self.cost))
            .then_with(|| other.hops().cmp(&self.hops()))
            .then_with(|| other.path.cmp(&self.path))
    }
}

/// The optimization core: finds the minimum-cost cut set over an implicit
/// DAG of legal cut positions. See `solve`.
pub struct SegmentDecomposer<'a> {
    length: usize,
    oracle: &'a dyn SegmentOracle,
    settings: &'a DecomposerSettings,
    cut_constraints: &'a [CutConstraint],
    segment_filter: Option<&'a dyn SegmentFilter>,
    set_constraints: &'a [CutsSetConstraint],
    memo: HashMap<Segment, Option<f64>>,
    scores: HashMap<Segment, SegmentScore>,
    aborted: bool,
}

impl<'a> SegmentDecomposer<'a> {
    pub fn new(
        length: usize,
        oracle: &'a dyn SegmentOracle,
        settings: &'a DecomposerSettings,
    ) -> Result<Self, QuoteError> {
        settings.validate()?;
        Ok(Self {
            length,
            oracle,
            settings,
            cut_constraints: &[],
            segment_filter: None,
            set_constraints: &[],
            memo: HashMap::new(),
            scores: HashMap::new(),
            aborted: false,
        })
    }

    pub fn with_cut_constraints(mut self, constraints: &'a [CutConstraint]) -> Self {
        self.cut_constraints = constraints;
        self
    }

    pub fn with_segment_filter(mut self, filter: &'a dyn SegmentFilter) -> Self {
        self.segment_filter = Some(filter);
        self
    }

    pub fn with_set_constraints(mut self, constraints: &'a [CutsSetConstraint]) -> Self {
        self.set_constraints = constraints;
        self
    }

    /// Two-pass constrained shortest-path search: a coarse-grain pass over
    /// a small candidate graph, then a fine-grain re-search around each
    /// winning coarse cut. Constraint failures and oracle rejections are
    /// silent edge removals; only an empty search space surfaces, as
    /// `NoSolutionFound`.
    pub fn solve(&mut self) -> Result<Decomposition, NoSolutionFound> {
        self.aborted = false;
        if self.length == 0 {
            return Err(NoSolutionFound);
        }
        let forced = self.normalized_forced()?;
        let suggested = self.normalized_suggested();

        // Suggested cuts seed an incumbent solution that both bounds the
        // main pass and survives it on ties.
        let mut incumbent = None;
        if !suggested.is_empty() {
            let mut nodes: Vec<usize> = vec![0, self.length];
            nodes.extend_from_slice(&forced);
            nodes.extend_from_slice(&suggested);
            nodes.sort_unstable();
            nodes.dedup();
            incumbent = self.search(&nodes, &forced, None);
            if incumbent.is_some() {
                debug!("suggested-cut incumbent found");
            }
        }

        let coarse_nodes = self.grid_nodes(self.settings.coarse_grain, &forced, &suggested);
        let bound = incumbent.as_ref().map(|s| s.cost);
        let coarse = self.search(&coarse_nodes, &forced, bound);
        let mut best = match pick_better(coarse, incumbent) {
            Some(best) => best,
            None => return Err(NoSolutionFound),
        };

        if self.settings.fine_grain < self.settings.coarse_grain && best.cuts.len() > 2 {
            let fine_nodes = self.refinement_nodes(&best.cuts, &forced);
            let fine = self.search(&fine_nodes, &forced, Some(best.cost));
            best = pick_better(fine, Some(best.clone())).unwrap_or(best);
        }

        let segments = segments_from_cuts(&best.cuts)
            .into_iter()
            .map(|seg| {
                let score = self.scores.get(&seg).copied().unwrap_or(SegmentScore {
                    price: 0.0,
                    lead_time: None,
                });
                (seg, score)
            })
            .collect();
        Ok(Decomposition {
            cuts: best.cuts,
            total_price: best.cost,
            segments,
        })
    }

    /// Whether the last `solve` ran out of its expansion budget before
    /// exhausting the search space. Lets callers tell "aborted" apart
    /// from a genuinely empty space.
    pub fn was_aborted(&self) -> bool {
        self.aborted
    }

    fn cut_allowed(&self, position: usize) -> bool {
        self.cut_constraints.iter().all(|c| c.accepts(position))
    }

    fn normalized_forced(&self) -> Result<Vec<usize>, NoSolutionFound> {
        // A forced cut beyond the sequence can never appear in a solution.
        // Positions 0 and `length` are endpoints of every solution, so
        // forcing them is a no-op.
        if self.settings.forced_cuts.iter().any(|&p| p > self.length) {
            return Err(NoSolutionFound);
        }
        let mut forced: Vec<usize> = self
            .settings
            .forced_cuts
            .iter()
            .copied()
            .filter(|&p| p > 0 && p < self.length)
            .collect();
        forced.sort_unstable();
        forced.dedup();
        // A forced cut at an illegal location empties the search space.
        if forced.iter().any(|&p| !self.cut_allowed(p)) {
            return Err(NoSolutionFound);
        }
        Ok(forced)
    }

    fn normalized_suggested(&self) -> Vec<usize> {
        let mut suggested: Vec<usize> = self
            .settings
            .suggested_cuts
            .iter()
            .copied()
            .filter(|&p| p > 0 && p < self.length && self.cut_allowed(p))
            .collect();
        suggested.sort_unstable();
        suggested.dedup();
        suggested
    }

    fn grid_nodes(&self, grain: usize, forced: &[usize], suggested: &[usize]) -> Vec<usize> {
        let mut nodes: Vec<usize> = vec![0, self.length];
        nodes.extend_from_slice(forced);
        nodes.extend_from_slice(suggested);
        let mut p = grain;
        while p < self.length {
            nodes.push(p);
            p += grain;
        }
        nodes.retain(|&p| self.cut_allowed(p));
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Fine-grain candidates around each interior coarse cut, clamped by
    /// the adjacent coarse cuts. The coarse cuts themselves are kept so
    /// refinement can never regress.
    fn refinement_nodes(&self, coarse_cuts: &[usize], forced: &[usize]) -> Vec<usize> {
        let radius = self.settings.coarse_grain;
        let grain = self.settings.fine_grain;
        let mut nodes: Vec<usize> = vec![0, self.length];
        nodes.extend_from_slice(forced);
        for (idx, &cut) in coarse_cuts.iter().enumerate() {
            if idx == 0 || idx + 1 == coarse_cuts.len() {
                continue;
            }
            nodes.push(cut);
            let lo = coarse_cuts[idx - 1].max(cut.saturating_sub(radius)) + 1;
            let hi = (coarse_cuts[idx + 1] - 1).min(cut + radius);
            let mut p = lo.div_ceil(grain) * grain;
            while p <= hi {
                if self.cut_allowed(p) {
                    nodes.push(p);
                }
                p += grain;
            }
        }
        nodes.retain(|&p| self.cut_allowed(p));
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    fn edge_cost(&mut self, from: usize, to: usize) -> Option<f64> {
        let segment = Segment::new(from, to);
        if let Some(&cached) = self.memo.get(&segment) {
            return cached;
        }
        let price = if self.segment_filter.is_some_and(|f| !f.accepts(segment)) {
            None
        } else {
            match self.oracle.appraise(segment) {
                // Negative price is the rejection sentinel.
                Some(score) if score.price >= 0.0 => {
                    self.scores.insert(segment, score);
                    Some(score.price)
                }
                _ => None,
            }
        };
        self.memo.insert(segment, price);
        price
    }

    fn search(
        &mut self,
        nodes: &[usize],
        forced: &[usize],
        bound: Option<f64>,
    ) -> Option<PathSolution> {
        if nodes.first() != Some(&0) || nodes.last() != Some(&self.length) {
            return None;
        }
        let min_len = self.settings.min_segment_length;
        let max_len = self.settings.max_segment_length.unwrap_or(self.length);
        let hop_limit = self.settings.path_size_limit.unwrap_or(usize::MAX);
        let pop_limit = self.settings.max_expansions;
        let factor = self.settings.a_star_factor;
        let total_len = self.length;
        let h = move |node: usize| factor * (total_len - node) as f64;
        // Set-level constraints can reject the cheapest complete path, so
        // dominance pruning must stay off to keep next-best paths reachable.
        // A hop cap invalidates cost-only dominance the same way: the cheap
        // prefix may be the one that cannot finish within the cap.
        let keep_alternates =
            !self.set_constraints.is_empty() || self.settings.path_size_limit.is_some();

        let mut best_cost: HashMap<usize, f64> = HashMap::new();
        let mut heap = BinaryHeap::new();
        heap.push(SearchState {
            priority: h(0),
            cost: 0.0,
            path: vec![0],
        });
        let mut pops = 0usize;

        while let Some(state) = heap.pop() {
            pops += 1;
            if pops > pop_limit {
                warn!("cut search aborted after {pop_limit} expansions");
                self.aborted = true;
                return None;
            }
            let node = state.node();
            if let Some(b) = bound {
                if state.cost > b + PRICE_EPSILON {
                    continue;
                }
            }
            if node == self.length {
                if self.set_constraints.iter().all(|c| c.accepts(&state.path)) {
                    return Some(PathSolution {
                        cuts: state.path,
                        cost: state.cost,
                    });
                }
                debug!("complete cut set {:?} rejected by set constraint", state.path);
                continue;
            }
            if !keep_alternates {
                if let Some(&known) = best_cost.get(&node) {
                    if state.cost > known + PRICE_EPSILON {
                        continue;
                    }
                }
            }
            if state.hops() >= hop_limit {
                continue;
            }
            let next_forced = forced.iter().copied().find(|&f| f > node);
            let from_idx = nodes.partition_point(|&p| p <= node);
            for &next in &nodes[from_idx..] {
                let seg_len = next - node;
                if seg_len > max_len {
                    break;
                }
                // An edge may not skip over a forced cut.
                if next_forced.is_some_and(|f| next > f) {
                    break;
                }
                if seg_len < min_len {
                    continue;
                }
                let Some(price) = self.edge_cost(node, next) else {
                    continue;
                };
                let cost = state.cost + price;
                if let Some(b) = bound {
                    if cost + h(next) > b + PRICE_EPSILON {
                        continue;
                    }
                }
                if !keep_alternates {
                    match best_cost.get(&next) {
                        Some(&known) if cost > known + PRICE_EPSILON => continue,
                        Some(&known) => {
                            if cost < known {
                                best_cost.insert(next, cost);
                            }
                        }
                        None => {
                            best_cost.insert(next, cost);
                        }
                    }
                }
                let mut path = state.path.clone();
                path.push(next);
                heap.push(SearchState {
                    priority: cost + h(next),
                    cost,
                    path,
                });
            }
        }
        None
    }
}

fn pick_better(a: Option<PathSolution>, b: Option<PathSolution>) -> Option<PathSolution> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a
                .cost
                .total_cmp(&b.cost)
                .then_with(|| a.cuts.len().cmp(&b.cuts.len()))
                .then_with(|| a.cuts.cmp(&b.cuts));
            if a.cost < b.cost - PRICE_EPSILON
                || ((a.cost - b.cost).abs() <= PRICE_EPSILON && ord != Ordering::Greater)
            {
                Some(a)
            } else {
                Some(b)
            }
        }
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}
