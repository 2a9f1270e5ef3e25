//! The production network model.
//!
//! A [`Project`] holds a tree of production tables over a loaded
//! [`ObjectGraph`](fabrica_core::graph::ObjectGraph). Rows place recipes,
//! links couple goods to target amounts, and subgroups nest whole tables
//! under a row. All mutation is command-based and reversible
//! ([`ModelCommand`]); flow resolution ([`Project::resolve`]) turns the
//! current structure into per-row multipliers and per-goods net flows,
//! reporting infeasibility through warning flags rather than errors.

pub mod command;
pub mod flow;
pub mod solver;
pub mod table;

pub use command::{LinkSnapshot, ModelCommand, RowSnapshot, TableSnapshot};
pub use flow::{FLOW_TOLERANCE, flows_match};
pub use solver::{
    FlowOptimizer, FlowProblem, GreedyOptimizer, OptimizerOutcome, ProblemLink, ProblemRow,
    Solution,
};
pub use table::{
    FixedAmount, LinkAlgorithm, ModelError, ProductionLink, ProductionTable, Project, RecipeRow,
    TableFlow,
};
