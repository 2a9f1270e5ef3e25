//! Milestone mask propagation.
//!
//! For an ordered list of user-selected milestone objects, compute per
//! object which milestones gate it, directly or transitively. Masks use
//! [`MilestoneMask`]: bit 0 means "accessible at all", bits 1..=63 map to
//! milestone list positions. Inaccessible objects keep the
//! [`MilestoneMask::UNREACHABLE`] sentinel; callers check accessibility
//! before trusting a mask.
//!
//! The pass has the same shape as accessibility: sweep the graph, compute
//! each object's mask from its dependency groups, repeat until stable.
//! Disjunctive groups contribute the easiest alternative (minimum
//! popcount, ties broken by member order as supplied to the builder);
//! conjunctive groups OR all members. Cheapest simple paths dominate, so
//! the sweep count is bounded by the object count.

use crate::accessibility::AccessibilityAnalysis;
use fabrica_core::flags::MilestoneMask;
use fabrica_core::graph::ObjectGraph;
use fabrica_core::id::ObjectId;
use std::collections::HashMap;

/// Errors rejecting a milestone list before any propagation runs.
#[derive(Debug, thiserror::Error)]
pub enum MilestoneError {
    #[error("too many milestones: {0} (limit {max})", max = MilestoneMask::MAX_MILESTONES)]
    TooManyMilestones(usize),
    #[error("milestone object not in graph: {0:?}")]
    UnknownMilestone(ObjectId),
}

/// The result of one milestone propagation: a mask per object plus the
/// milestone list it was computed against. Changing the list invalidates
/// the whole result; there is no incremental update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneAnalysis {
    masks: Vec<MilestoneMask>,
    milestones: Vec<ObjectId>,
}

impl MilestoneAnalysis {
    /// Run the propagation. The milestone list is ordered: entry `i` maps
    /// to mask bit `i + 1`.
    pub fn run(
        graph: &ObjectGraph,
        access: &AccessibilityAnalysis,
        milestones: &[ObjectId],
    ) -> Result<Self, MilestoneError> {
        if milestones.len() > MilestoneMask::MAX_MILESTONES {
            return Err(MilestoneError::TooManyMilestones(milestones.len()));
        }
        let mut own_bit: HashMap<ObjectId, MilestoneMask> = HashMap::new();
        for (index, &milestone) in milestones.iter().enumerate() {
            if !graph.contains(milestone) {
                return Err(MilestoneError::UnknownMilestone(milestone));
            }
            own_bit.insert(milestone, MilestoneMask::milestone_bit(index));
        }

        let mut masks = vec![MilestoneMask::UNREACHABLE; graph.len()];
        for id in graph.ids() {
            if access.is_seed(id) {
                let own = own_bit.get(&id).copied().unwrap_or(MilestoneMask::EMPTY);
                masks[id.index()] = MilestoneMask::ACCESSIBLE | own;
            }
        }

        // Bellman-Ford-shaped sweeps: cheapest masks flow outward from the
        // seeds; a cycle only ever adds bits, so simple paths win and the
        // round count is capped by the object count.
        let mut rounds = 0;
        loop {
            let mut changed = false;
            for id in graph.ids() {
                if !access.is_accessible(id) || access.is_seed(id) {
                    continue;
                }
                let own = own_bit.get(&id).copied().unwrap_or(MilestoneMask::EMPTY);
                if let Some(candidate) = compute_mask(graph, id, &masks, own) {
                    if candidate != masks[id.index()] {
                        masks[id.index()] = candidate;
                        changed = true;
                    }
                }
            }
            rounds += 1;
            if !changed || rounds > graph.len() {
                break;
            }
        }

        Ok(Self {
            masks,
            milestones: milestones.to_vec(),
        })
    }

    /// The mask of `id`. [`MilestoneMask::UNREACHABLE`] for inaccessible
    /// or unknown objects.
    #[inline]
    pub fn mask(&self, id: ObjectId) -> MilestoneMask {
        self.masks
            .get(id.index())
            .copied()
            .unwrap_or(MilestoneMask::UNREACHABLE)
    }

    /// The milestone list this result was computed against.
    pub fn milestones(&self) -> &[ObjectId] {
        &self.milestones
    }

    /// The highest-positioned milestone gating `id`, if any. O(1) per the
    /// mask representation.
    pub fn highest_milestone(&self, id: ObjectId) -> Option<ObjectId> {
        let mask = self.mask(id);
        if mask.is_unreachable() {
            return None;
        }
        let bit = mask.highest_bit()?;
        if bit == 0 {
            return None;
        }
        self.milestones.get(bit as usize - 1).copied()
    }
}

/// The mask `id` would have given current member masks: bit 0, its own
/// milestone bit, and contributions OR-ed across currently computable
/// groups. None while no group is computable yet.
fn compute_mask(
    graph: &ObjectGraph,
    id: ObjectId,
    masks: &[MilestoneMask],
    own: MilestoneMask,
) -> Option<MilestoneMask> {
    let mut candidate = MilestoneMask::ACCESSIBLE | own;
    let mut any_group = false;
    for group in graph.groups(id) {
        if group.is_disabled() {
            continue;
        }
        let contribution = if group.require_everything {
            let mut all = MilestoneMask::EMPTY;
            let mut complete = !group.members.is_empty();
            for &member in &group.members {
                let mask = masks[member.index()];
                if mask.is_unreachable() {
                    complete = false;
                    break;
                }
                all |= mask;
            }
            if complete { Some(all) } else { None }
        } else {
            // Easiest alternative: minimum popcount, first supplied wins
            // ties.
            let mut best: Option<MilestoneMask> = None;
            for &member in &group.members {
                let mask = masks[member.index()];
                if mask.is_unreachable() {
                    continue;
                }
                match best {
                    Some(b) if mask.popcount() >= b.popcount() => {}
                    _ => best = Some(mask),
                }
            }
            best
        };
        if let Some(contribution) = contribution {
            candidate |= contribution;
            any_group = true;
        }
    }
    any_group.then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::{AccessibilityAnalysis, OverrideMap};
    use fabrica_core::test_utils::{smelting_chain, two_path};

    fn analyze(
        fx: &fabrica_core::test_utils::Fixture,
        milestones: &[ObjectId],
    ) -> MilestoneAnalysis {
        let access = AccessibilityAnalysis::run(&fx.graph, &OverrideMap::new());
        MilestoneAnalysis::run(&fx.graph, &access, milestones).unwrap()
    }

    #[test]
    fn seeds_get_bare_accessible_mask() {
        let fx = smelting_chain();
        let analysis = analyze(&fx, &[]);
        assert_eq!(analysis.mask(fx.id("iron-ore")), MilestoneMask::ACCESSIBLE);
        assert_eq!(analysis.mask(fx.id("stone-furnace")), MilestoneMask::ACCESSIBLE);
    }

    #[test]
    fn milestone_gates_its_dependents() {
        let fx = smelting_chain();
        let tech = fx.id("steel-processing");
        let analysis = analyze(&fx, &[tech]);

        let tech_bit = MilestoneMask::milestone_bit(0);
        // The technology carries its own bit.
        assert!(analysis.mask(tech).contains(tech_bit));
        // Steel smelting is unlocked by the technology, so it inherits the
        // bit; iron smelting does not.
        assert!(analysis.mask(fx.id("steel-smelting")).contains(tech_bit));
        assert!(analysis.mask(fx.id("steel-plate")).contains(tech_bit));
        assert!(!analysis.mask(fx.id("iron-smelting")).contains(tech_bit));
        assert!(!analysis.mask(fx.id("iron-plate")).contains(tech_bit));
    }

    #[test]
    fn disjunctive_source_takes_min_popcount_path() {
        let fx = two_path();
        // recipe-a needs one milestone (tech-a); recipe-b needs two.
        let milestones = [fx.id("tech-a"), fx.id("tech-b"), fx.id("tech-c")];
        let analysis = analyze(&fx, &milestones);

        let target = analysis.mask(fx.id("target"));
        assert!(target.contains(MilestoneMask::milestone_bit(0)));
        assert!(!target.contains(MilestoneMask::milestone_bit(1)));
        assert!(!target.contains(MilestoneMask::milestone_bit(2)));
        assert_eq!(target.popcount(), 2); // accessible + tech-a
    }

    #[test]
    fn conjunctive_group_ors_all_members() {
        let fx = two_path();
        let milestones = [fx.id("tech-b"), fx.id("tech-c")];
        let analysis = analyze(&fx, &milestones);

        // recipe-b requires both techs, so its mask carries both bits.
        let mask = analysis.mask(fx.id("recipe-b"));
        assert!(mask.contains(MilestoneMask::milestone_bit(0)));
        assert!(mask.contains(MilestoneMask::milestone_bit(1)));
    }

    #[test]
    fn cheaper_alternative_beats_supply_order() {
        let fx = two_path();
        let milestones = [fx.id("tech-a")];
        let analysis = analyze(&fx, &milestones);
        // recipe-b carries no milestone bits at all, so it undercuts the
        // first-supplied recipe-a.
        let target = analysis.mask(fx.id("target"));
        assert_eq!(target, MilestoneMask::ACCESSIBLE);
    }

    #[test]
    fn equal_cost_alternatives_resolve_to_first_supplied_member() {
        let fx = two_path();
        // With tech-a and tech-b selected (and tech-c not), both producers
        // cost exactly one milestone, with different bits.
        let milestones = [fx.id("tech-a"), fx.id("tech-b")];
        let analysis = analyze(&fx, &milestones);
        assert_eq!(analysis.mask(fx.id("recipe-a")).popcount(), 2);
        assert_eq!(analysis.mask(fx.id("recipe-b")).popcount(), 2);

        // target's source group lists recipe-a first, so its path wins the
        // tie and tech-b never enters the mask.
        let target = analysis.mask(fx.id("target"));
        assert!(target.contains(MilestoneMask::milestone_bit(0)));
        assert!(!target.contains(MilestoneMask::milestone_bit(1)));

        // Reversing the milestone list moves the bits but not the choice.
        let analysis = analyze(&fx, &[fx.id("tech-b"), fx.id("tech-a")]);
        let target = analysis.mask(fx.id("target"));
        assert!(target.contains(MilestoneMask::milestone_bit(1)));
        assert!(!target.contains(MilestoneMask::milestone_bit(0)));
    }

    #[test]
    fn inaccessible_objects_keep_the_sentinel() {
        let fx = smelting_chain();
        let mut overrides = OverrideMap::new();
        overrides.insert(fx.id("steel-plate"), crate::accessibility::OverrideState::ForcedInaccessible);
        let access = AccessibilityAnalysis::run(&fx.graph, &overrides);
        let analysis = MilestoneAnalysis::run(&fx.graph, &access, &[]).unwrap();
        assert!(analysis.mask(fx.id("steel-plate")).is_unreachable());
    }

    #[test]
    fn too_many_milestones_rejected() {
        let fx = smelting_chain();
        let access = AccessibilityAnalysis::run(&fx.graph, &OverrideMap::new());
        let list = vec![fx.id("iron-ore"); MilestoneMask::MAX_MILESTONES + 1];
        let result = MilestoneAnalysis::run(&fx.graph, &access, &list);
        assert!(matches!(result, Err(MilestoneError::TooManyMilestones(64))));
    }

    #[test]
    fn unknown_milestone_rejected() {
        let fx = smelting_chain();
        let access = AccessibilityAnalysis::run(&fx.graph, &OverrideMap::new());
        let bogus = ObjectId(9999);
        let result = MilestoneAnalysis::run(&fx.graph, &access, &[bogus]);
        assert!(matches!(result, Err(MilestoneError::UnknownMilestone(id)) if id == bogus));
    }

    #[test]
    fn highest_milestone_query() {
        let fx = smelting_chain();
        let tech = fx.id("steel-processing");
        let analysis = analyze(&fx, &[tech]);
        assert_eq!(analysis.highest_milestone(fx.id("steel-plate")), Some(tech));
        assert_eq!(analysis.highest_milestone(fx.id("iron-plate")), None);
    }

    #[test]
    fn rerun_is_bit_identical() {
        let fx = two_path();
        let milestones = [fx.id("tech-a"), fx.id("tech-b")];
        let first = analyze(&fx, &milestones);
        let second = analyze(&fx, &milestones);
        assert_eq!(first, second);
    }
}
