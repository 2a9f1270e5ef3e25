//! Core data model for factory calculation.
//!
//! This crate owns the immutable side of the workspace: game objects and
//! their typed dependency groups ([`graph`]), dense and generational id
//! types ([`id`]), and the bitset flag types shared by the analysis and
//! model crates ([`flags`]). The optional `data-loader` feature adds JSON
//! loading of game data files.
//!
//! Everything here is plain data. Derived state (accessibility, milestone
//! masks, flows) lives in the `fabrica-analysis` and `fabrica-model`
//! crates, which consume this one.

pub mod flags;
pub mod graph;
pub mod id;
pub mod object;

#[cfg(feature = "data-loader")]
pub mod data_loader;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use flags::{LinkFlags, MilestoneMask, RowWarnings};
pub use graph::{
    DependencyGroup, DependencyKind, GraphBuildError, GraphProblem, ObjectGraph,
    ObjectGraphBuilder,
};
pub use id::{LinkId, ObjectId, RowId, TableId};
pub use object::{GameObject, Ingredient, ObjectPayload, Product};
