use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::heuristics::Heuristic;
use crate::selection::FlawSelectionOrder;

/// The search regime of the driver.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SearchAlgorithm {
    AStar,
    /// Iterative deepening on plan rank: children above the current rank
    /// limit are deferred to the next restart.
    IdaStar,
}

/// Planner configuration for one `solve` invocation.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub search_algorithm: SearchAlgorithm,
    pub heuristic: Heuristic,
    pub weight: f32,
    /// Flaw-selection strategies used round-robin, each with its own
    /// plan queue.
    pub flaw_orders: Vec<FlawSelectionOrder>,
    /// Per-strategy limit on generated plans; a strategy reaching its
    /// limit is retired.
    pub search_limits: Vec<usize>,
    pub ground_actions: bool,
    pub domain_constraints: bool,
    pub strip_static_preconditions: bool,
    pub random_open_conditions: bool,
    /// When set, an inequality between two variables becomes an open
    /// condition branched on explicitly instead of a binding constraint.
    pub branch_on_inequality: bool,
    pub random_seed: u64,
    pub verbosity: u32,
    /// Polled at the top of every driver iteration; setting it makes the
    /// search return the no-solution signal.
    pub interrupt: Option<Arc<AtomicBool>>,
}

impl Default for Parameters {
    fn default() -> Parameters {
        Parameters {
            search_algorithm: SearchAlgorithm::AStar,
            heuristic: Heuristic::Ucpop,
            weight: 1.0,
            flaw_orders: vec![FlawSelectionOrder::ucpop()],
            search_limits: vec![usize::MAX],
            ground_actions: false,
            domain_constraints: false,
            strip_static_preconditions: false,
            random_open_conditions: false,
            branch_on_inequality: false,
            random_seed: 0,
            verbosity: 0,
            interrupt: None,
        }
    }
}

impl Parameters {
    pub fn search_limit(&self, flaw_order: usize) -> usize {
        self.search_limits.get(flaw_order).copied().unwrap_or(usize::MAX)
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map_or(false, |flag| flag.load(std::sync::atomic::Ordering::Relaxed))
    }
}
