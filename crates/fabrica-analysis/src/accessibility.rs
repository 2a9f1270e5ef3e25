//! Accessibility propagation over the object graph.
//!
//! A breadth-first monotone fixpoint: objects start inaccessible and flip
//! to accessible when a dependency group is satisfied, until a full pass
//! changes nothing. State only grows during iteration, so convergence is
//! bounded by the object count. `ForcedInaccessible` overrides are applied
//! as a final filter after the fixpoint, never inside it, which keeps the
//! iteration monotone.
//!
//! A second pass with the same shape computes `automatable`: it refuses to
//! route satisfaction through `manual_only` entities, so objects reachable
//! only via manual crafting come out accessible but not automatable.

use fabrica_core::graph::{DependencyGroup, ObjectGraph};
use fabrica_core::id::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// User override of the computed accessibility of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideState {
    /// Accessible regardless of missing prerequisites.
    ForcedAccessible,
    /// Inaccessible regardless of graph reachability.
    ForcedInaccessible,
}

/// Absence of an entry means no override.
pub type OverrideMap = HashMap<ObjectId, OverrideState>;

/// Per-object result snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibilityInfo {
    pub accessible: bool,
    pub automatable: bool,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// The result of one accessibility propagation over a graph.
///
/// Recompute from scratch whenever the graph, the root set, or the
/// override map changes; results are never patched incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibilityAnalysis {
    accessible: Vec<bool>,
    automatable: Vec<bool>,
    /// Accessible with no prerequisites: root or ForcedAccessible. Seeds
    /// anchor the milestone pass.
    seeds: Vec<bool>,
}

impl AccessibilityAnalysis {
    /// Run the propagation. Never fails: cycles with no external entry
    /// simply stay inaccessible.
    pub fn run(graph: &ObjectGraph, overrides: &OverrideMap) -> Self {
        let len = graph.len();
        let mut seeds = vec![false; len];
        for id in graph.ids() {
            seeds[id.index()] = graph.is_root(id)
                || overrides.get(&id) == Some(&OverrideState::ForcedAccessible);
        }

        let mut accessible = seeds.clone();
        fixpoint(graph, &mut accessible, |member, state| state[member.index()]);

        // Automatable pass: manual-only entities never satisfy a group, and
        // are themselves never automatable.
        let manual: Vec<bool> = graph
            .objects()
            .map(|obj| obj.as_entity().is_some_and(|e| e.manual_only))
            .collect();
        let mut automatable: Vec<bool> = seeds
            .iter()
            .zip(&manual)
            .map(|(&seed, &is_manual)| seed && !is_manual)
            .collect();
        {
            let manual = &manual;
            fixpoint(graph, &mut automatable, move |member, state| {
                state[member.index()] && !manual[member.index()]
            });
        }

        // Final filter: forced-inaccessible wins over everything above.
        for (&id, &state) in overrides {
            if state == OverrideState::ForcedInaccessible && id.index() < len {
                accessible[id.index()] = false;
                automatable[id.index()] = false;
                seeds[id.index()] = false;
            }
        }
        for index in 0..len {
            automatable[index] &= accessible[index] && !manual[index];
        }

        Self {
            accessible,
            automatable,
            seeds,
        }
    }

    #[inline]
    pub fn is_accessible(&self, id: ObjectId) -> bool {
        self.accessible.get(id.index()).copied().unwrap_or(false)
    }

    #[inline]
    pub fn is_automatable(&self, id: ObjectId) -> bool {
        self.automatable.get(id.index()).copied().unwrap_or(false)
    }

    /// True for objects accessible with no prerequisites (root set members
    /// and forced-accessible overrides that survived filtering).
    #[inline]
    pub fn is_seed(&self, id: ObjectId) -> bool {
        self.seeds.get(id.index()).copied().unwrap_or(false)
    }

    pub fn info(&self, id: ObjectId) -> AccessibilityInfo {
        AccessibilityInfo {
            accessible: self.is_accessible(id),
            automatable: self.is_automatable(id),
        }
    }

    pub fn accessible_count(&self) -> usize {
        self.accessible.iter().filter(|&&a| a).count()
    }
}

// ---------------------------------------------------------------------------
// Fixpoint core
// ---------------------------------------------------------------------------

fn group_satisfied<F>(group: &DependencyGroup, state: &[bool], member_ok: &F) -> bool
where
    F: Fn(ObjectId, &[bool]) -> bool,
{
    if group.is_disabled() {
        return false;
    }
    if group.require_everything {
        // An empty conjunctive group is unsatisfiable, not vacuously true.
        !group.members.is_empty() && group.members.iter().all(|&m| member_ok(m, state))
    } else {
        group.members.iter().any(|&m| member_ok(m, state))
    }
}

fn object_satisfied<F>(graph: &ObjectGraph, id: ObjectId, state: &[bool], member_ok: &F) -> bool
where
    F: Fn(ObjectId, &[bool]) -> bool,
{
    graph
        .groups(id)
        .iter()
        .any(|group| group_satisfied(group, state, member_ok))
}

/// Sequential fixpoint: in-place sweeps until a pass changes nothing.
#[cfg(not(feature = "parallel"))]
fn fixpoint<F>(graph: &ObjectGraph, state: &mut [bool], member_ok: F)
where
    F: Fn(ObjectId, &[bool]) -> bool + Sync,
{
    loop {
        let mut changed = false;
        for id in graph.ids() {
            if state[id.index()] {
                continue;
            }
            if object_satisfied(graph, id, state, &member_ok) {
                state[id.index()] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Parallel fixpoint: Jacobi rounds over a frozen previous state. Reaches
/// the same fixpoint as the sequential sweep because the update is
/// monotone; it may just take more rounds.
#[cfg(feature = "parallel")]
fn fixpoint<F>(graph: &ObjectGraph, state: &mut [bool], member_ok: F)
where
    F: Fn(ObjectId, &[bool]) -> bool + Sync,
{
    use rayon::prelude::*;

    loop {
        let frozen: &[bool] = state;
        let next: Vec<bool> = (0..graph.len() as u32)
            .into_par_iter()
            .map(ObjectId)
            .map(|id| {
                frozen[id.index()] || object_satisfied(graph, id, frozen, &member_ok)
            })
            .collect();
        if next[..] == state[..] {
            break;
        }
        state.copy_from_slice(&next);
    }
}
