//! Data-driven object graph loading from JSON.
//!
//! Feature-gated behind `data-loader`. Game data names objects by string;
//! the loader registers every object first, then resolves references and
//! derives the dependency groups the propagators consume. Unresolved names
//! degrade the referencing group and are reported as [`GraphProblem`]s.

use crate::graph::{
    DependencyKind, GraphBuildError, GraphProblem, ObjectGraph, ObjectGraphBuilder,
};
use crate::id::ObjectId;
use crate::object::{
    EntitySpec, FluidSpec, Ingredient, ItemSpec, ObjectPayload, Product, QualitySpec, RecipeSpec,
    TechnologySpec, TemperatureBand,
};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("graph build error: {0}")]
    Graph(#[from] GraphBuildError),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level game data file.
#[derive(Debug, serde::Deserialize)]
pub struct GameDataFile {
    #[serde(default)]
    pub items: Vec<ItemData>,
    #[serde(default)]
    pub fluids: Vec<FluidData>,
    #[serde(default)]
    pub entities: Vec<EntityData>,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
    #[serde(default)]
    pub technologies: Vec<TechnologyData>,
    #[serde(default)]
    pub qualities: Vec<QualityData>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ItemData {
    pub name: String,
    #[serde(default)]
    pub fuel_value: f64,
    #[serde(default = "default_stack_size")]
    pub stack_size: u32,
    /// Accessible with no prerequisites (raw resources, starting items).
    #[serde(default)]
    pub root: bool,
}

fn default_stack_size() -> u32 {
    100
}

#[derive(Debug, serde::Deserialize)]
pub struct FluidData {
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub root: bool,
}

fn default_temperature() -> f64 {
    15.0
}

#[derive(Debug, serde::Deserialize)]
pub struct EntityData {
    pub name: String,
    #[serde(default = "default_speed")]
    pub crafting_speed: f64,
    #[serde(default)]
    pub module_slots: u32,
    #[serde(default)]
    pub energy_usage: f64,
    #[serde(default)]
    pub manual_only: bool,
    /// The item that places this entity, if any.
    #[serde(default)]
    pub item_to_place: Option<String>,
    #[serde(default)]
    pub root: bool,
}

fn default_speed() -> f64 {
    1.0
}

#[derive(Debug, serde::Deserialize)]
pub struct IoData {
    pub goods: String,
    pub amount: f64,
    #[serde(default)]
    pub min_temperature: Option<f64>,
    #[serde(default)]
    pub max_temperature: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default = "default_time")]
    pub time: f64,
    #[serde(default)]
    pub ingredients: Vec<IoData>,
    #[serde(default)]
    pub products: Vec<IoData>,
    /// Entities that can craft this recipe.
    #[serde(default)]
    pub crafters: Vec<String>,
    /// Technologies that unlock this recipe. Empty means always unlocked.
    #[serde(default)]
    pub unlocked_by: Vec<String>,
}

fn default_time() -> f64 {
    1.0
}

#[derive(Debug, serde::Deserialize)]
pub struct TechnologyData {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: f64,
    #[serde(default)]
    pub ingredients: Vec<IoData>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

fn default_count() -> f64 {
    1.0
}

#[derive(Debug, serde::Deserialize)]
pub struct QualityData {
    pub name: String,
    pub level: u32,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load an object graph from a JSON string.
pub fn load_game_data(json: &str) -> Result<(ObjectGraph, Vec<GraphProblem>), LoadError> {
    let data: GameDataFile = serde_json::from_str(json)?;
    build_graph(data)
}

fn build_graph(data: GameDataFile) -> Result<(ObjectGraph, Vec<GraphProblem>), LoadError> {
    let mut builder = ObjectGraphBuilder::new();

    // Pass 1: register every object so forward references resolve.
    let mut roots: Vec<ObjectId> = Vec::new();
    for item in &data.items {
        let id = builder.add_object(
            &item.name,
            ObjectPayload::Item(ItemSpec {
                fuel_value: item.fuel_value,
                stack_size: item.stack_size,
            }),
        )?;
        if item.root {
            roots.push(id);
        }
    }
    for fluid in &data.fluids {
        let id = builder.add_object(
            &fluid.name,
            ObjectPayload::Fluid(FluidSpec {
                temperature: fluid.temperature,
            }),
        )?;
        if fluid.root {
            roots.push(id);
        }
    }
    for entity in &data.entities {
        let id = builder.add_object(
            &entity.name,
            ObjectPayload::Entity(EntitySpec {
                crafting_speed: entity.crafting_speed,
                module_slots: entity.module_slots,
                energy_usage: entity.energy_usage,
                manual_only: entity.manual_only,
            }),
        )?;
        if entity.root {
            roots.push(id);
        }
    }
    for recipe in &data.recipes {
        // Payload references are resolved in pass 2; placeholder lists here.
        builder.add_object(
            &recipe.name,
            ObjectPayload::Recipe(RecipeSpec {
                time: recipe.time,
                ingredients: Vec::new(),
                products: Vec::new(),
            }),
        )?;
    }
    for tech in &data.technologies {
        builder.add_object(
            &tech.name,
            ObjectPayload::Technology(TechnologySpec {
                ingredients: Vec::new(),
                count: tech.count,
            }),
        )?;
    }
    for quality in &data.qualities {
        builder.add_object(
            &quality.name,
            ObjectPayload::Quality(QualitySpec {
                level: quality.level,
            }),
        )?;
    }
    for id in roots {
        builder.mark_root(id)?;
    }

    // Pass 2: resolve references, fill payloads, derive dependency groups.
    let mut producers: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();

    for recipe in &data.recipes {
        let Some(id) = builder.id_of(&recipe.name) else {
            continue;
        };

        let ingredients = resolve_io(&mut builder, id, &recipe.ingredients);
        let products = resolve_io(&mut builder, id, &recipe.products);
        for product in &products {
            producers.entry(product.goods).or_default().push(id);
        }

        let ingredient_goods: Vec<ObjectId> = ingredients.iter().map(|i| i.goods).collect();
        if !ingredient_goods.is_empty() {
            builder.add_group(id, DependencyKind::Ingredient, true, ingredient_goods)?;
        }
        let crafters = resolve_names(&mut builder, id, &recipe.crafters);
        if !crafters.is_empty() {
            builder.add_group(id, DependencyKind::CraftingEntity, false, crafters)?;
        }
        let unlocks = resolve_names(&mut builder, id, &recipe.unlocked_by);
        if !unlocks.is_empty() {
            builder.add_group(id, DependencyKind::TechnologyUnlock, false, unlocks)?;
        }

        let products_for_payload = products
            .iter()
            .map(|p| Product {
                goods: p.goods,
                amount: p.amount,
            })
            .collect();
        builder.set_recipe_io(id, ingredients, products_for_payload)?;
    }

    for tech in &data.technologies {
        let Some(id) = builder.id_of(&tech.name) else {
            continue;
        };

        let ingredients = resolve_io(&mut builder, id, &tech.ingredients);
        let ingredient_goods: Vec<ObjectId> = ingredients.iter().map(|i| i.goods).collect();
        if !ingredient_goods.is_empty() {
            builder.add_group(id, DependencyKind::Ingredient, true, ingredient_goods)?;
        }
        let prerequisites = resolve_names(&mut builder, id, &tech.prerequisites);
        if !prerequisites.is_empty() {
            builder.add_group(
                id,
                DependencyKind::TechnologyPrerequisite,
                true,
                prerequisites,
            )?;
        }
        builder.set_technology_ingredients(id, ingredients)?;
    }

    for entity in &data.entities {
        let Some(id) = builder.id_of(&entity.name) else {
            continue;
        };
        if let Some(place_item) = &entity.item_to_place {
            match builder.id_of(place_item) {
                Some(item_id) => {
                    builder.add_group(id, DependencyKind::ItemToPlace, false, vec![item_id])?;
                }
                None => {
                    builder.record_problem(GraphProblem::UnresolvedName {
                        object: id,
                        name: place_item.clone(),
                    });
                    builder.add_group(id, DependencyKind::Disabled, false, Vec::new())?;
                }
            }
        }
    }

    // Non-root goods are reachable through the recipes that produce them.
    let mut producer_entries: Vec<(ObjectId, Vec<ObjectId>)> = producers.into_iter().collect();
    producer_entries.sort_by_key(|(goods, _)| *goods);
    for (goods, recipes) in producer_entries {
        builder.add_group(goods, DependencyKind::Source, false, recipes)?;
    }

    Ok(builder.finish())
}

/// Resolve a list of io entries, recording problems for unknown names.
fn resolve_io(builder: &mut ObjectGraphBuilder, object: ObjectId, io: &[IoData]) -> Vec<Ingredient> {
    let mut resolved = Vec::with_capacity(io.len());
    for entry in io {
        match builder.id_of(&entry.goods) {
            Some(goods) => {
                let temperature = match (entry.min_temperature, entry.max_temperature) {
                    (None, None) => None,
                    (min, max) => Some(TemperatureBand {
                        min: min.unwrap_or(f64::NEG_INFINITY),
                        max: max.unwrap_or(f64::INFINITY),
                    }),
                };
                resolved.push(Ingredient {
                    goods,
                    amount: entry.amount,
                    temperature,
                });
            }
            None => {
                builder.record_problem(GraphProblem::UnresolvedName {
                    object,
                    name: entry.goods.clone(),
                });
            }
        }
    }
    resolved
}

/// Resolve a list of object names, recording problems for unknown names.
fn resolve_names(
    builder: &mut ObjectGraphBuilder,
    object: ObjectId,
    names: &[String],
) -> Vec<ObjectId> {
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        match builder.id_of(name) {
            Some(id) => resolved.push(id),
            None => {
                builder.record_problem(GraphProblem::UnresolvedName {
                    object,
                    name: name.clone(),
                });
            }
        }
    }
    resolved
}
