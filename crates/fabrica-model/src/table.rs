//! The production network model: projects, tables, rows, and links.
//!
//! A [`Project`] owns a tree of [`ProductionTable`]s rooted at
//! [`Project::root`]. Tables, rows, and links live in slotmap arenas keyed
//! by generational ids; a nested table records its owner as
//! `(TableId, RowId)` parent fields, never a live handle, so the tree has
//! no reference cycles to manage.
//!
//! All user-facing mutation goes through the command layer (`command`
//! module): the methods here are crate-internal primitives the commands
//! compose. Derived flow state is cached per table and invalidated upward
//! on every structural change; recomputation is lazy on read (`flow`
//! module).

use fabrica_core::flags::{LinkFlags, RowWarnings};
use fabrica_core::graph::ObjectGraph;
use fabrica_core::id::{LinkId, ObjectId, RowId, TableId};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;

use crate::command::ModelCommand;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Precondition failures for model mutations. Infeasible flow is never an
/// error; it surfaces as warning flags so the model stays editable.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown table: {0:?}")]
    UnknownTable(TableId),
    #[error("unknown row: {0:?}")]
    UnknownRow(RowId),
    #[error("unknown link: {0:?}")]
    UnknownLink(LinkId),
    #[error("object {0:?} does not resolve in the loaded graph")]
    UnresolvedObject(ObjectId),
    #[error("object {0:?} is not a recipe or technology")]
    NotRecipeLike(ObjectId),
    #[error("object {0:?} is not goods")]
    NotGoods(ObjectId),
    #[error("object {0:?} is not a crafting entity")]
    NotAnEntity(ObjectId),
    #[error("row {0:?} has no subgroup")]
    NoSubgroup(RowId),
    #[error("row {0:?} already has a subgroup")]
    HasSubgroup(RowId),
    #[error("subgroup of row {0:?} is not empty")]
    SubgroupNotEmpty(RowId),
    #[error("row index {index} out of bounds for table {table:?}")]
    RowIndexOutOfBounds { table: TableId, index: usize },
}

// ---------------------------------------------------------------------------
// Rows and links
// ---------------------------------------------------------------------------

/// At most one fixed-amount constraint per row; setting one clears any
/// other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FixedAmount {
    /// Pin the number of buildings.
    Buildings(f64),
    /// Pin fuel consumption per second.
    Fuel(f64),
    /// Pin consumption of one ingredient per second.
    Ingredient(ObjectId, f64),
    /// Pin production of one product per second.
    Product(ObjectId, f64),
}

/// How a link's constraint is interpreted during flow resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkAlgorithm {
    /// Net flow must equal the link amount exactly.
    #[default]
    Match,
    /// Net flow must be at least the link amount; surplus is tolerated.
    AllowOverProduction,
}

/// One recipe or technology instance placed by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRow {
    pub recipe: ObjectId,
    pub owner: TableId,
    pub entity: Option<ObjectId>,
    pub quality: Option<ObjectId>,
    pub fuel: Option<ObjectId>,
    pub enabled: bool,
    /// User-declared number of already-built buildings.
    pub built_count: Option<f64>,
    pub fixed: Option<FixedAmount>,
    pub subgroup: Option<TableId>,
}

impl RecipeRow {
    fn new(recipe: ObjectId, owner: TableId) -> Self {
        Self {
            recipe,
            owner,
            entity: None,
            quality: None,
            fuel: None,
            enabled: true,
            built_count: None,
            fixed: None,
            subgroup: None,
        }
    }
}

/// Couples a goods to a target net amount within one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLink {
    pub goods: ObjectId,
    pub owner: TableId,
    /// Signed net production target. 0 means balance only.
    pub amount: f64,
    pub algorithm: LinkAlgorithm,
}

/// A node of the table tree: an ordered list of rows plus the links scoped
/// to this table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductionTable {
    pub rows: Vec<RowId>,
    pub links: Vec<LinkId>,
    /// `None` for the root table.
    pub parent: Option<(TableId, RowId)>,
}

// ---------------------------------------------------------------------------
// Flow cache
// ---------------------------------------------------------------------------

/// Resolved flow of one table. Derived data: always recomputable from the
/// rows and links, never the source of truth.
#[derive(Debug, Clone, Default)]
pub struct TableFlow {
    /// Non-negative crafts-per-second multiplier per enabled row.
    pub multipliers: SecondaryMap<RowId, f64>,
    pub warnings: SecondaryMap<RowId, RowWarnings>,
    /// Net flow of each link's goods summed over its captured rows.
    pub link_flows: SecondaryMap<LinkId, f64>,
    pub link_flags: SecondaryMap<LinkId, LinkFlags>,
    /// Rows of the owning table that touch each link's goods.
    pub captured_rows: SecondaryMap<LinkId, Vec<RowId>>,
    /// Signed net flow per goods referenced anywhere in the table.
    pub net_flow: HashMap<ObjectId, f64>,
    /// Net flow of goods touched here but not linked here: visible to the
    /// parent table as if this table were a composite recipe.
    pub exports: HashMap<ObjectId, f64>,
}

impl TableFlow {
    pub fn multiplier(&self, row: RowId) -> f64 {
        self.multipliers.get(row).copied().unwrap_or(0.0)
    }

    pub fn row_warnings(&self, row: RowId) -> RowWarnings {
        self.warnings.get(row).copied().unwrap_or(RowWarnings::EMPTY)
    }

    pub fn link_flow(&self, link: LinkId) -> f64 {
        self.link_flows.get(link).copied().unwrap_or(0.0)
    }

    pub fn link_flags(&self, link: LinkId) -> LinkFlags {
        self.link_flags.get(link).copied().unwrap_or(LinkFlags::EMPTY)
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// The root of the model: arenas, the table tree, the undo history, and
/// the cost table used for waste ranking.
#[derive(Debug, Serialize, Deserialize)]
pub struct Project {
    pub(crate) graph: ObjectGraph,
    pub(crate) tables: SlotMap<TableId, ProductionTable>,
    pub(crate) rows: SlotMap<RowId, RecipeRow>,
    pub(crate) links: SlotMap<LinkId, ProductionLink>,
    pub(crate) root: TableId,
    /// Per-object scalar cost from the external cost collaborator. Used
    /// only for waste ranking; missing entries cost 0.
    pub(crate) costs: HashMap<ObjectId, f64>,
    pub(crate) undo_stack: Vec<ModelCommand>,
    pub(crate) redo_stack: Vec<ModelCommand>,
    /// Flow cache: a missing entry means dirty.
    #[serde(skip)]
    pub(crate) flows: SecondaryMap<TableId, TableFlow>,
}

impl Project {
    /// Create an empty project over a loaded object graph.
    pub fn new(graph: ObjectGraph) -> Self {
        let mut tables = SlotMap::with_key();
        let root = tables.insert(ProductionTable::default());
        Self {
            graph,
            tables,
            rows: SlotMap::with_key(),
            links: SlotMap::with_key(),
            root,
            costs: HashMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            flows: SecondaryMap::new(),
        }
    }

    // -- queries ------------------------------------------------------------

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn root(&self) -> TableId {
        self.root
    }

    pub fn table(&self, id: TableId) -> Result<&ProductionTable, ModelError> {
        self.tables.get(id).ok_or(ModelError::UnknownTable(id))
    }

    pub fn row(&self, id: RowId) -> Result<&RecipeRow, ModelError> {
        self.rows.get(id).ok_or(ModelError::UnknownRow(id))
    }

    pub fn link(&self, id: LinkId) -> Result<&ProductionLink, ModelError> {
        self.links.get(id).ok_or(ModelError::UnknownLink(id))
    }

    /// The link for `goods` in `table`, if one exists.
    pub fn link_for_goods(&self, table: TableId, goods: ObjectId) -> Option<LinkId> {
        let table = self.tables.get(table)?;
        table
            .links
            .iter()
            .copied()
            .find(|&l| self.links.get(l).is_some_and(|link| link.goods == goods))
    }

    /// The cached flow of a table, if current. `resolve` recomputes it.
    pub fn cached_flow(&self, table: TableId) -> Option<&TableFlow> {
        self.flows.get(table)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    // -- cost table ---------------------------------------------------------

    /// Replace the cost of one goods in the waste-ranking table.
    pub fn set_cost(&mut self, goods: ObjectId, cost: f64) {
        self.costs.insert(goods, cost);
    }

    pub fn cost(&self, goods: ObjectId) -> f64 {
        self.costs.get(&goods).copied().unwrap_or(0.0)
    }

    // -- validation ---------------------------------------------------------

    pub(crate) fn require_recipe_like(&self, id: ObjectId) -> Result<(), ModelError> {
        let object = self
            .graph
            .object(id)
            .ok_or(ModelError::UnresolvedObject(id))?;
        if object.is_recipe_like() {
            Ok(())
        } else {
            Err(ModelError::NotRecipeLike(id))
        }
    }

    pub(crate) fn require_goods(&self, id: ObjectId) -> Result<(), ModelError> {
        let object = self
            .graph
            .object(id)
            .ok_or(ModelError::UnresolvedObject(id))?;
        if object.is_goods() {
            Ok(())
        } else {
            Err(ModelError::NotGoods(id))
        }
    }

    pub(crate) fn require_entity(&self, id: ObjectId) -> Result<(), ModelError> {
        let object = self
            .graph
            .object(id)
            .ok_or(ModelError::UnresolvedObject(id))?;
        if object.as_entity().is_some() {
            Ok(())
        } else {
            Err(ModelError::NotAnEntity(id))
        }
    }

    // -- invalidation -------------------------------------------------------

    /// Drop the cached flow of `table` and every ancestor. Called by every
    /// structural mutation.
    pub(crate) fn invalidate(&mut self, table: TableId) {
        let mut current = Some(table);
        while let Some(id) = current {
            self.flows.remove(id);
            current = self.tables.get(id).and_then(|t| t.parent.map(|(p, _)| p));
        }
    }

    // -- structural primitives (command layer calls these) ------------------

    /// Insert a new row referencing `recipe` at `index` (append when out of
    /// range is an error; `None` appends).
    pub(crate) fn insert_row(
        &mut self,
        table: TableId,
        recipe: ObjectId,
        index: Option<usize>,
    ) -> Result<RowId, ModelError> {
        self.require_recipe_like(recipe)?;
        self.table(table)?;
        let row = self.rows.insert(RecipeRow::new(recipe, table));
        let rows = &mut self.tables[table].rows;
        let index = index.unwrap_or(rows.len());
        if index > rows.len() {
            self.rows.remove(row);
            return Err(ModelError::RowIndexOutOfBounds { table, index });
        }
        rows.insert(index, row);
        self.invalidate(table);
        Ok(row)
    }

    /// Remove `row` from its table, cascading subgroup deletion. Returns
    /// the former index in the owning table.
    pub(crate) fn delete_row(&mut self, row: RowId) -> Result<usize, ModelError> {
        let owner = self.row(row)?.owner;
        let subgroup = self.rows[row].subgroup;
        if let Some(subgroup) = subgroup {
            self.delete_table_recursive(subgroup);
        }
        let index = self.tables[owner]
            .rows
            .iter()
            .position(|&r| r == row)
            .ok_or(ModelError::UnknownRow(row))?;
        self.tables[owner].rows.remove(index);
        self.rows.remove(row);
        self.invalidate(owner);
        Ok(index)
    }

    fn delete_table_recursive(&mut self, table: TableId) {
        let Some(t) = self.tables.get(table) else {
            return;
        };
        let rows = t.rows.clone();
        let links = t.links.clone();
        for row in rows {
            if let Some(sub) = self.rows.get(row).and_then(|r| r.subgroup) {
                self.delete_table_recursive(sub);
            }
            self.rows.remove(row);
        }
        for link in links {
            self.links.remove(link);
        }
        self.flows.remove(table);
        self.tables.remove(table);
    }

    /// Create a link, idempotent per goods per table: an existing link for
    /// the goods is returned unchanged.
    pub(crate) fn create_link(
        &mut self,
        table: TableId,
        goods: ObjectId,
        amount: f64,
        algorithm: LinkAlgorithm,
    ) -> Result<(LinkId, bool), ModelError> {
        self.require_goods(goods)?;
        self.table(table)?;
        if let Some(existing) = self.link_for_goods(table, goods) {
            return Ok((existing, false));
        }
        let link = self.links.insert(ProductionLink {
            goods,
            owner: table,
            amount,
            algorithm,
        });
        self.tables[table].links.push(link);
        self.invalidate(table);
        Ok((link, true))
    }

    pub(crate) fn delete_link(&mut self, link: LinkId) -> Result<ProductionLink, ModelError> {
        let owner = self.link(link)?.owner;
        self.tables[owner].links.retain(|&l| l != link);
        let removed = self
            .links
            .remove(link)
            .ok_or(ModelError::UnknownLink(link))?;
        self.invalidate(owner);
        Ok(removed)
    }

    /// Attach an empty subgroup table to a row that has none.
    pub(crate) fn attach_subgroup(&mut self, row: RowId) -> Result<TableId, ModelError> {
        let owner = self.row(row)?.owner;
        if self.rows[row].subgroup.is_some() {
            return Err(ModelError::HasSubgroup(row));
        }
        let table = self.tables.insert(ProductionTable {
            rows: Vec::new(),
            links: Vec::new(),
            parent: Some((owner, row)),
        });
        self.rows[row].subgroup = Some(table);
        self.invalidate(owner);
        Ok(table)
    }

    /// Remove an empty subgroup table from a row.
    pub(crate) fn detach_subgroup(&mut self, row: RowId) -> Result<(), ModelError> {
        let owner = self.row(row)?.owner;
        let table = self.rows[row].subgroup.ok_or(ModelError::NoSubgroup(row))?;
        let t = self.table(table)?;
        if !t.rows.is_empty() || !t.links.is_empty() {
            return Err(ModelError::SubgroupNotEmpty(row));
        }
        self.tables.remove(table);
        self.rows[row].subgroup = None;
        self.invalidate(owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabrica_core::test_utils::smelting_chain;

    fn project() -> (Project, ObjectId, ObjectId) {
        let fx = smelting_chain();
        let smelt = fx.id("iron-smelting");
        let plate = fx.id("iron-plate");
        (Project::new(fx.graph), smelt, plate)
    }

    #[test]
    fn new_project_has_empty_root_table() {
        let (project, _, _) = project();
        let root = project.table(project.root()).unwrap();
        assert!(root.rows.is_empty());
        assert!(root.links.is_empty());
        assert!(root.parent.is_none());
    }

    #[test]
    fn insert_row_validates_reference_kind() {
        let (mut project, smelt, plate) = project();
        let root = project.root();

        let row = project.insert_row(root, smelt, None).unwrap();
        assert_eq!(project.row(row).unwrap().recipe, smelt);

        // Goods are not recipe-like.
        let err = project.insert_row(root, plate, None).unwrap_err();
        assert!(matches!(err, ModelError::NotRecipeLike(id) if id == plate));

        // Dangling object ids are rejected, never a panic.
        let err = project.insert_row(root, ObjectId(9999), None).unwrap_err();
        assert!(matches!(err, ModelError::UnresolvedObject(_)));
    }

    #[test]
    fn link_creation_is_idempotent_per_goods() {
        let (mut project, _, plate) = project();
        let root = project.root();

        let (first, created) = project
            .create_link(root, plate, 5.0, LinkAlgorithm::Match)
            .unwrap();
        assert!(created);
        let (second, created) = project
            .create_link(root, plate, 99.0, LinkAlgorithm::AllowOverProduction)
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        // The existing link is untouched.
        assert_eq!(project.link(first).unwrap().amount, 5.0);
        assert_eq!(project.table(root).unwrap().links.len(), 1);
    }

    #[test]
    fn link_requires_goods() {
        let (mut project, smelt, _) = project();
        let root = project.root();
        let err = project
            .create_link(root, smelt, 1.0, LinkAlgorithm::Match)
            .unwrap_err();
        assert!(matches!(err, ModelError::NotGoods(_)));
    }

    #[test]
    fn delete_row_cascades_subgroup() {
        let (mut project, smelt, plate) = project();
        let root = project.root();

        let row = project.insert_row(root, smelt, None).unwrap();
        let sub = project.attach_subgroup(row).unwrap();
        let inner = project.insert_row(sub, smelt, None).unwrap();
        project
            .create_link(sub, plate, 0.0, LinkAlgorithm::Match)
            .unwrap();

        project.delete_row(row).unwrap();
        assert!(project.row(inner).is_err());
        assert!(project.table(sub).is_err());
        assert!(project.table(root).unwrap().rows.is_empty());
    }

    #[test]
    fn detach_subgroup_requires_empty() {
        let (mut project, smelt, _) = project();
        let root = project.root();
        let row = project.insert_row(root, smelt, None).unwrap();
        let sub = project.attach_subgroup(row).unwrap();
        project.insert_row(sub, smelt, None).unwrap();

        let err = project.detach_subgroup(row).unwrap_err();
        assert!(matches!(err, ModelError::SubgroupNotEmpty(_)));
    }

    #[test]
    fn invalidation_walks_ancestors() {
        let (mut project, smelt, _) = project();
        let root = project.root();
        let row = project.insert_row(root, smelt, None).unwrap();
        let sub = project.attach_subgroup(row).unwrap();

        // Seed fake cache entries, then mutate the subgroup.
        project.flows.insert(root, TableFlow::default());
        project.flows.insert(sub, TableFlow::default());
        project.insert_row(sub, smelt, None).unwrap();
        assert!(project.cached_flow(sub).is_none());
        assert!(project.cached_flow(root).is_none());
    }
}
