//! Game objects: the immutable nodes of the dependency graph.
//!
//! Objects are created once at load time and referenced by [`ObjectId`]
//! everywhere else, never copied. Kind-specific data lives in a closed
//! [`ObjectPayload`] enum so that dispatch over kinds is exhaustive at
//! compile time.

use crate::id::ObjectId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kind payloads
// ---------------------------------------------------------------------------

/// An item that can flow through production links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpec {
    /// Energy released when burned as fuel. 0 means not usable as fuel.
    #[serde(default)]
    pub fuel_value: f64,
    #[serde(default = "default_stack_size")]
    pub stack_size: u32,
}

fn default_stack_size() -> u32 {
    100
}

/// A fluid. Fluids are goods like items but carry a temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidSpec {
    /// Temperature the fluid is produced at by default.
    pub temperature: f64,
}

/// Acceptable temperature range for a fluid ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBand {
    pub min: f64,
    pub max: f64,
}

impl TemperatureBand {
    #[inline]
    pub fn accepts(&self, temperature: f64) -> bool {
        temperature >= self.min && temperature <= self.max
    }
}

/// One recipe ingredient: goods consumed per craft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub goods: ObjectId,
    pub amount: f64,
    /// For fluid ingredients: the temperature range the recipe accepts.
    #[serde(default)]
    pub temperature: Option<TemperatureBand>,
}

/// One recipe product: goods produced per craft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub goods: ObjectId,
    pub amount: f64,
}

/// A crafting recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSpec {
    /// Seconds per craft at crafting speed 1.
    pub time: f64,
    /// Ordered: order is a determinism anchor for downstream tie-breaks.
    pub ingredients: Vec<Ingredient>,
    pub products: Vec<Product>,
}

/// A technology. Behaves like a recipe that consumes research ingredients
/// and produces nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologySpec {
    /// Research ingredients consumed per unit of research.
    pub ingredients: Vec<Ingredient>,
    /// Number of research units required.
    pub count: f64,
}

/// A crafting entity (building).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub crafting_speed: f64,
    #[serde(default)]
    pub module_slots: u32,
    /// Fuel energy consumed per second while crafting. 0 means the entity
    /// needs no fuel.
    #[serde(default)]
    pub energy_usage: f64,
    /// The entity requires manual operation and can never automate recipes.
    #[serde(default)]
    pub manual_only: bool,
}

/// A quality tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySpec {
    pub level: u32,
}

// ---------------------------------------------------------------------------
// GameObject
// ---------------------------------------------------------------------------

/// Kind-specific payload of a game object. One variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectPayload {
    Item(ItemSpec),
    Fluid(FluidSpec),
    Recipe(RecipeSpec),
    Technology(TechnologySpec),
    Entity(EntitySpec),
    Quality(QualitySpec),
}

/// An immutable node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObject {
    pub id: ObjectId,
    pub name: String,
    pub payload: ObjectPayload,
}

impl GameObject {
    /// Goods are objects that can flow through production links.
    #[inline]
    pub fn is_goods(&self) -> bool {
        matches!(
            self.payload,
            ObjectPayload::Item(_) | ObjectPayload::Fluid(_)
        )
    }

    /// True for objects a recipe row can reference.
    #[inline]
    pub fn is_recipe_like(&self) -> bool {
        matches!(
            self.payload,
            ObjectPayload::Recipe(_) | ObjectPayload::Technology(_)
        )
    }

    pub fn as_recipe(&self) -> Option<&RecipeSpec> {
        match &self.payload {
            ObjectPayload::Recipe(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_technology(&self) -> Option<&TechnologySpec> {
        match &self.payload {
            ObjectPayload::Technology(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntitySpec> {
        match &self.payload {
            ObjectPayload::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&ItemSpec> {
        match &self.payload {
            ObjectPayload::Item(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_fluid(&self) -> Option<&FluidSpec> {
        match &self.payload {
            ObjectPayload::Fluid(f) => Some(f),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.payload {
            ObjectPayload::Item(_) => "item",
            ObjectPayload::Fluid(_) => "fluid",
            ObjectPayload::Recipe(_) => "recipe",
            ObjectPayload::Technology(_) => "technology",
            ObjectPayload::Entity(_) => "entity",
            ObjectPayload::Quality(_) => "quality",
        }
    }
}
