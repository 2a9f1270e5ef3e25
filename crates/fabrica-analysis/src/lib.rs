//! Graph analysis passes for factory calculation.
//!
//! Two fixpoint propagators over the `fabrica-core` object graph:
//!
//! - [`accessibility`]: which objects are reachable from the root set,
//!   honoring user overrides, plus a stricter `automatable` variant that
//!   excludes manual-only crafting paths.
//! - [`milestone`]: which user-selected milestones gate each accessible
//!   object, as a per-object [`fabrica_core::MilestoneMask`] preferring
//!   the fewest-milestone path.
//!
//! Both passes are pure functions of their inputs: rerun on any change to
//! the graph, root set, override map, or milestone list. The optional
//! `parallel` feature switches the accessibility sweep to rayon.

pub mod accessibility;
pub mod milestone;

pub use accessibility::{AccessibilityAnalysis, AccessibilityInfo, OverrideMap, OverrideState};
pub use milestone::{MilestoneAnalysis, MilestoneError};
