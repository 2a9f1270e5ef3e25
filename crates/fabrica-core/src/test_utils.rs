//! Shared graph fixtures for tests across the workspace.
//!
//! Compiled for this crate's own tests and, behind the `test-utils`
//! feature, for dependent crates' tests.

use crate::graph::{DependencyKind, GraphProblem, ObjectGraph, ObjectGraphBuilder};
use crate::id::ObjectId;
use crate::object::{
    EntitySpec, Ingredient, ItemSpec, ObjectPayload, Product, RecipeSpec, TechnologySpec,
};

/// A finished fixture graph with name-based id lookup for assertions.
pub struct Fixture {
    pub graph: ObjectGraph,
    pub problems: Vec<GraphProblem>,
}

impl Fixture {
    /// Id of a fixture object. Panics on unknown names; fixtures are
    /// static so a miss is a test bug.
    pub fn id(&self, name: &str) -> ObjectId {
        self.graph
            .object_by_name(name)
            .unwrap_or_else(|| panic!("no fixture object named {name:?}"))
            .id
    }
}

fn item(fuel_value: f64) -> ObjectPayload {
    ObjectPayload::Item(ItemSpec {
        fuel_value,
        stack_size: 100,
    })
}

fn entity(crafting_speed: f64, energy_usage: f64, manual_only: bool) -> ObjectPayload {
    ObjectPayload::Entity(EntitySpec {
        crafting_speed,
        module_slots: 0,
        energy_usage,
        manual_only,
    })
}

fn recipe(time: f64, ingredients: Vec<(ObjectId, f64)>, products: Vec<(ObjectId, f64)>) -> ObjectPayload {
    ObjectPayload::Recipe(RecipeSpec {
        time,
        ingredients: ingredients
            .into_iter()
            .map(|(goods, amount)| Ingredient {
                goods,
                amount,
                temperature: None,
            })
            .collect(),
        products: products
            .into_iter()
            .map(|(goods, amount)| Product { goods, amount })
            .collect(),
    })
}

/// A linear smelting chain with a technology gate:
///
/// ```text
/// iron-ore (root) --iron-smelting--> iron-plate --steel-smelting--> steel-plate
///                                                 ^ unlocked by steel-processing
/// ```
///
/// `stone-furnace` (root) crafts both recipes; `character` (root) is a
/// manual-only entity that crafts `iron-smelting` only.
pub fn smelting_chain() -> Fixture {
    let mut b = ObjectGraphBuilder::new();

    let ore = b.add_object("iron-ore", item(0.0)).unwrap();
    let coal = b.add_object("coal", item(4_000_000.0)).unwrap();
    let plate = b.add_object("iron-plate", item(0.0)).unwrap();
    let steel = b.add_object("steel-plate", item(0.0)).unwrap();
    let furnace = b
        .add_object("stone-furnace", entity(1.0, 90_000.0, false))
        .unwrap();
    let character = b.add_object("character", entity(0.5, 0.0, true)).unwrap();
    let smelt = b
        .add_object("iron-smelting", recipe(3.2, vec![(ore, 1.0)], vec![(plate, 1.0)]))
        .unwrap();
    let steel_smelt = b
        .add_object(
            "steel-smelting",
            recipe(16.0, vec![(plate, 5.0)], vec![(steel, 1.0)]),
        )
        .unwrap();
    let steel_tech = b
        .add_object(
            "steel-processing",
            ObjectPayload::Technology(TechnologySpec {
                ingredients: vec![Ingredient {
                    goods: plate,
                    amount: 1.0,
                    temperature: None,
                }],
                count: 50.0,
            }),
        )
        .unwrap();

    for root in [ore, coal, furnace, character] {
        b.mark_root(root).unwrap();
    }

    b.add_group(smelt, DependencyKind::Ingredient, true, vec![ore])
        .unwrap();
    b.add_group(
        smelt,
        DependencyKind::CraftingEntity,
        false,
        vec![furnace, character],
    )
    .unwrap();
    b.add_group(steel_smelt, DependencyKind::Ingredient, true, vec![plate])
        .unwrap();
    b.add_group(
        steel_smelt,
        DependencyKind::CraftingEntity,
        false,
        vec![furnace],
    )
    .unwrap();
    b.add_group(
        steel_smelt,
        DependencyKind::TechnologyUnlock,
        false,
        vec![steel_tech],
    )
    .unwrap();
    b.add_group(steel_tech, DependencyKind::Ingredient, true, vec![plate])
        .unwrap();
    b.add_group(plate, DependencyKind::Source, false, vec![smelt])
        .unwrap();
    b.add_group(steel, DependencyKind::Source, false, vec![steel_smelt])
        .unwrap();

    let (graph, problems) = b.finish();
    Fixture { graph, problems }
}

/// A goods with two alternative producer recipes, each gated behind a
/// different technology. Exercises disjunctive sources and milestone
/// path selection:
///
/// ```text
/// ore (root) --recipe-a (tech-a)--> target
/// ore (root) --recipe-b (tech-b, tech-c)--> target
/// ```
pub fn two_path() -> Fixture {
    let mut b = ObjectGraphBuilder::new();

    let ore = b.add_object("ore", item(0.0)).unwrap();
    let target = b.add_object("target", item(0.0)).unwrap();
    let tech_a = b
        .add_object(
            "tech-a",
            ObjectPayload::Technology(TechnologySpec {
                ingredients: vec![],
                count: 10.0,
            }),
        )
        .unwrap();
    let tech_b = b
        .add_object(
            "tech-b",
            ObjectPayload::Technology(TechnologySpec {
                ingredients: vec![],
                count: 10.0,
            }),
        )
        .unwrap();
    let tech_c = b
        .add_object(
            "tech-c",
            ObjectPayload::Technology(TechnologySpec {
                ingredients: vec![],
                count: 10.0,
            }),
        )
        .unwrap();
    let recipe_a = b
        .add_object("recipe-a", recipe(1.0, vec![(ore, 1.0)], vec![(target, 1.0)]))
        .unwrap();
    let recipe_b = b
        .add_object("recipe-b", recipe(1.0, vec![(ore, 1.0)], vec![(target, 1.0)]))
        .unwrap();

    b.mark_root(ore).unwrap();
    for tech in [tech_a, tech_b, tech_c] {
        b.mark_root(tech).unwrap();
    }

    b.add_group(recipe_a, DependencyKind::Ingredient, true, vec![ore])
        .unwrap();
    b.add_group(
        recipe_a,
        DependencyKind::TechnologyUnlock,
        false,
        vec![tech_a],
    )
    .unwrap();
    b.add_group(recipe_b, DependencyKind::Ingredient, true, vec![ore])
        .unwrap();
    b.add_group(
        recipe_b,
        DependencyKind::TechnologyPrerequisite,
        true,
        vec![tech_b, tech_c],
    )
    .unwrap();
    b.add_group(
        target,
        DependencyKind::Source,
        false,
        vec![recipe_a, recipe_b],
    )
    .unwrap();

    let (graph, problems) = b.finish();
    Fixture { graph, problems }
}
