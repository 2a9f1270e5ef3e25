//! The black-box numeric optimizer contract and the shipped fallback.
//!
//! Propagation in the flow resolver pins every multiplier it can determine
//! directly. What remains is an under-determined system: several rows per
//! link, no unique solution. That residue is handed to a [`FlowOptimizer`]
//! as a [`FlowProblem`]; the optimizer's internal formulation is out of
//! scope here, only the contract is: minimize cost subject to the given
//! constraints with non-negative multipliers, and report how trustworthy
//! the result is.
//!
//! [`GreedyOptimizer`] is the deterministic reference implementation used
//! by default and in tests: it walks the links in order and satisfies each
//! with its lowest-waste row.

use crate::table::LinkAlgorithm;
use fabrica_core::id::{LinkId, ObjectId, RowId};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Problem statement
// ---------------------------------------------------------------------------

/// One undetermined row: its per-craft flows and its ranking inputs.
#[derive(Debug, Clone)]
pub struct ProblemRow {
    pub row: RowId,
    /// Signed goods flow per craft (products positive).
    pub flows: HashMap<ObjectId, f64>,
    /// Waste rank: cost of inputs minus value of outputs, per craft.
    /// Lower is better.
    pub waste: f64,
    /// Inaccessible recipes rank strictly last regardless of waste.
    pub accessible: bool,
}

/// One unresolved link constraint. `residual` is the net amount still to
/// produce after all pinned rows' contributions.
#[derive(Debug, Clone)]
pub struct ProblemLink {
    pub link: LinkId,
    pub goods: ObjectId,
    pub residual: f64,
    pub algorithm: LinkAlgorithm,
}

/// The under-determined residue of one table's resolution, in table order.
#[derive(Debug, Clone, Default)]
pub struct FlowProblem {
    pub rows: Vec<ProblemRow>,
    pub links: Vec<ProblemLink>,
}

impl FlowProblem {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.links.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How much to trust a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerOutcome {
    /// Constraints satisfied within tolerance.
    Solved,
    /// Best-effort: the optimizer failed or timed out, multipliers are
    /// retained but rows must be flagged.
    Inaccurate,
    /// No feasible assignment exists under the constraints.
    Infeasible,
}

/// Multipliers for (a subset of) the problem rows, plus trust level. Rows
/// absent from the map resolve to zero.
#[derive(Debug, Clone)]
pub struct Solution {
    pub multipliers: HashMap<RowId, f64>,
    pub outcome: OptimizerOutcome,
}

/// External optimizer contract. Implementations must be deterministic for
/// a given problem or callers lose reproducible flows.
pub trait FlowOptimizer {
    fn solve(&self, problem: &FlowProblem) -> Solution;
}

// ---------------------------------------------------------------------------
// GreedyOptimizer
// ---------------------------------------------------------------------------

/// Deterministic waste-ranked fallback.
///
/// Walks the links in the order given. For each link it picks the best
/// untouched candidate row by (accessible first, lowest waste, first in
/// problem order) and solves that row's multiplier as if all other
/// undetermined rows were zero, clamping negatives to zero. Rows never
/// picked stay at zero. The outcome degrades to `Inaccurate` when any
/// `Match` link cannot be satisfied this way.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyOptimizer;

impl GreedyOptimizer {
    pub fn new() -> Self {
        Self
    }
}

impl FlowOptimizer for GreedyOptimizer {
    fn solve(&self, problem: &FlowProblem) -> Solution {
        let mut multipliers: HashMap<RowId, f64> = HashMap::new();
        let mut exact = true;

        for link in &problem.links {
            // Contribution already decided by earlier links.
            let decided: f64 = problem
                .rows
                .iter()
                .filter_map(|r| {
                    let m = multipliers.get(&r.row)?;
                    Some(m * r.flows.get(&link.goods).copied().unwrap_or(0.0))
                })
                .sum();
            let residual = link.residual - decided;
            if residual.abs() <= f64::EPSILON {
                continue;
            }

            // First in problem order wins ties, so only a strictly better
            // rank replaces the running best.
            let mut candidate: Option<&ProblemRow> = None;
            for r in &problem.rows {
                if multipliers.contains_key(&r.row)
                    || r.flows.get(&link.goods).copied().unwrap_or(0.0) == 0.0
                {
                    continue;
                }
                let better = match candidate {
                    None => true,
                    Some(best) => (!r.accessible, r.waste) < (!best.accessible, best.waste),
                };
                if better {
                    candidate = Some(r);
                }
            }
            let Some(candidate) = candidate else {
                if link.algorithm == LinkAlgorithm::Match && residual.abs() > f64::EPSILON {
                    exact = false;
                }
                continue;
            };

            let per_craft = candidate.flows[&link.goods];
            let mut multiplier = residual / per_craft;
            if multiplier < 0.0 {
                multiplier = 0.0;
                if link.algorithm == LinkAlgorithm::Match {
                    exact = false;
                }
            }
            multipliers.insert(candidate.row, multiplier);
        }

        Solution {
            multipliers,
            outcome: if exact {
                OptimizerOutcome::Solved
            } else {
                OptimizerOutcome::Inaccurate
            },
        }
    }
}
