//! Reversible mutation commands.
//!
//! Every user-facing mutation is an immutable [`ModelCommand`] applied
//! through [`Project::apply`], which validates preconditions, performs the
//! mutation, and returns the inverse command. The undo history is a plain
//! `Vec<ModelCommand>` of inverses; `undo` pops one, applies it, and
//! pushes its inverse onto the redo stack. Applying a fresh command clears
//! the redo stack.
//!
//! Removal inverses carry full snapshots ([`RowSnapshot`],
//! [`TableSnapshot`]) so nested subgroups restore byte-for-byte.

use crate::table::{FixedAmount, LinkAlgorithm, ModelError, ProductionLink, Project};
use fabrica_core::id::{LinkId, ObjectId, RowId, TableId};
use fabrica_core::object::ObjectPayload;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Everything needed to rebuild a removed row, including its subgroup
/// subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSnapshot {
    pub recipe: ObjectId,
    pub entity: Option<ObjectId>,
    pub quality: Option<ObjectId>,
    pub fuel: Option<ObjectId>,
    pub enabled: bool,
    pub built_count: Option<f64>,
    pub fixed: Option<FixedAmount>,
    pub subgroup: Option<TableSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub rows: Vec<RowSnapshot>,
    pub links: Vec<LinkSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub goods: ObjectId,
    pub amount: f64,
    pub algorithm: LinkAlgorithm,
}

impl LinkSnapshot {
    fn of(link: &ProductionLink) -> Self {
        Self {
            goods: link.goods,
            amount: link.amount,
            algorithm: link.algorithm,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One reversible model mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelCommand {
    AddRow {
        table: TableId,
        recipe: ObjectId,
        /// Insertion index; append when `None`.
        at: Option<usize>,
    },
    RemoveRow {
        row: RowId,
    },
    /// Inverse of `RemoveRow`: rebuild a row (and its subtree) in place.
    RestoreRow {
        table: TableId,
        at: usize,
        snapshot: RowSnapshot,
    },
    SetEntity {
        row: RowId,
        entity: Option<ObjectId>,
    },
    SetFuel {
        row: RowId,
        fuel: Option<ObjectId>,
    },
    SetQuality {
        row: RowId,
        quality: Option<ObjectId>,
    },
    SetEnabled {
        row: RowId,
        enabled: bool,
    },
    SetBuiltCount {
        row: RowId,
        built_count: Option<f64>,
    },
    /// Mutual exclusion is structural: a row holds at most one constraint.
    SetFixedAmount {
        row: RowId,
        fixed: Option<FixedAmount>,
    },
    /// Idempotent: a goods already linked in the table is left untouched.
    CreateLink {
        table: TableId,
        goods: ObjectId,
        amount: f64,
        algorithm: LinkAlgorithm,
    },
    RemoveLink {
        link: LinkId,
    },
    /// Inverse of `RemoveLink`.
    RestoreLink {
        table: TableId,
        snapshot: LinkSnapshot,
    },
    SetLinkAmount {
        link: LinkId,
        amount: f64,
    },
    SetLinkAlgorithm {
        link: LinkId,
        algorithm: LinkAlgorithm,
    },
    /// Attach an empty subgroup to a row without one.
    CreateSubgroup {
        row: RowId,
    },
    /// Remove a row's subgroup; the subgroup must be empty.
    RemoveSubgroup {
        row: RowId,
    },
    /// Dissolve a row's subgroup: splice its rows into the parent at the
    /// row's former position and drop the row and the subgroup's links.
    UnpackSubgroup {
        row: RowId,
    },
    /// Inverse of `UnpackSubgroup`: gather `count` rows starting at `at`
    /// back into a fresh subgroup owned by a restored row.
    RepackSubgroup {
        table: TableId,
        at: usize,
        count: usize,
        row: RowSnapshot,
        links: Vec<LinkSnapshot>,
    },
    /// Produced as the inverse of a mutation that changed nothing.
    Noop,
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

impl Project {
    /// Apply a command, push its inverse onto the undo stack, and clear
    /// the redo stack. Returns the inverse.
    pub fn apply(&mut self, command: ModelCommand) -> Result<ModelCommand, ModelError> {
        let inverse = self.execute(command)?;
        self.undo_stack.push(inverse.clone());
        self.redo_stack.clear();
        Ok(inverse)
    }

    /// Undo the most recent command. Returns false when the history is
    /// empty.
    pub fn undo(&mut self) -> Result<bool, ModelError> {
        let Some(command) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let inverse = self.execute(command)?;
        self.redo_stack.push(inverse);
        Ok(true)
    }

    /// Redo the most recently undone command. Returns false when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> Result<bool, ModelError> {
        let Some(command) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let inverse = self.execute(command)?;
        self.undo_stack.push(inverse);
        Ok(true)
    }

    fn execute(&mut self, command: ModelCommand) -> Result<ModelCommand, ModelError> {
        match command {
            ModelCommand::AddRow { table, recipe, at } => {
                let row = self.insert_row(table, recipe, at)?;
                Ok(ModelCommand::RemoveRow { row })
            }
            ModelCommand::RemoveRow { row } => {
                let table = self.row(row)?.owner;
                let snapshot = self.snapshot_row(row)?;
                let at = self.delete_row(row)?;
                Ok(ModelCommand::RestoreRow {
                    table,
                    at,
                    snapshot,
                })
            }
            ModelCommand::RestoreRow {
                table,
                at,
                snapshot,
            } => {
                let row = self.restore_row(table, Some(at), &snapshot)?;
                Ok(ModelCommand::RemoveRow { row })
            }
            ModelCommand::SetEntity { row, entity } => {
                if let Some(entity) = entity {
                    self.require_entity(entity)?;
                }
                let owner = self.row(row)?.owner;
                let previous = std::mem::replace(&mut self.rows[row].entity, entity);
                self.invalidate(owner);
                Ok(ModelCommand::SetEntity {
                    row,
                    entity: previous,
                })
            }
            ModelCommand::SetFuel { row, fuel } => {
                if let Some(fuel) = fuel {
                    self.require_goods(fuel)?;
                }
                let owner = self.row(row)?.owner;
                let previous = std::mem::replace(&mut self.rows[row].fuel, fuel);
                self.invalidate(owner);
                Ok(ModelCommand::SetFuel {
                    row,
                    fuel: previous,
                })
            }
            ModelCommand::SetQuality { row, quality } => {
                if let Some(quality) = quality {
                    let object = self
                        .graph
                        .object(quality)
                        .ok_or(ModelError::UnresolvedObject(quality))?;
                    if !matches!(object.payload, ObjectPayload::Quality(_)) {
                        return Err(ModelError::UnresolvedObject(quality));
                    }
                }
                let owner = self.row(row)?.owner;
                let previous = std::mem::replace(&mut self.rows[row].quality, quality);
                self.invalidate(owner);
                Ok(ModelCommand::SetQuality {
                    row,
                    quality: previous,
                })
            }
            ModelCommand::SetEnabled { row, enabled } => {
                let owner = self.row(row)?.owner;
                let previous = std::mem::replace(&mut self.rows[row].enabled, enabled);
                self.invalidate(owner);
                Ok(ModelCommand::SetEnabled {
                    row,
                    enabled: previous,
                })
            }
            ModelCommand::SetBuiltCount { row, built_count } => {
                let owner = self.row(row)?.owner;
                let previous = std::mem::replace(&mut self.rows[row].built_count, built_count);
                self.invalidate(owner);
                Ok(ModelCommand::SetBuiltCount {
                    row,
                    built_count: previous,
                })
            }
            ModelCommand::SetFixedAmount { row, fixed } => {
                match fixed {
                    Some(FixedAmount::Ingredient(goods, _))
                    | Some(FixedAmount::Product(goods, _)) => self.require_goods(goods)?,
                    _ => {}
                }
                let owner = self.row(row)?.owner;
                let previous = std::mem::replace(&mut self.rows[row].fixed, fixed);
                self.invalidate(owner);
                Ok(ModelCommand::SetFixedAmount {
                    row,
                    fixed: previous,
                })
            }
            ModelCommand::CreateLink {
                table,
                goods,
                amount,
                algorithm,
            } => {
                let (link, created) = self.create_link(table, goods, amount, algorithm)?;
                if created {
                    Ok(ModelCommand::RemoveLink { link })
                } else {
                    Ok(ModelCommand::Noop)
                }
            }
            ModelCommand::RemoveLink { link } => {
                let table = self.link(link)?.owner;
                let removed = self.delete_link(link)?;
                Ok(ModelCommand::RestoreLink {
                    table,
                    snapshot: LinkSnapshot::of(&removed),
                })
            }
            ModelCommand::RestoreLink { table, snapshot } => {
                let (link, _) =
                    self.create_link(table, snapshot.goods, snapshot.amount, snapshot.algorithm)?;
                Ok(ModelCommand::RemoveLink { link })
            }
            ModelCommand::SetLinkAmount { link, amount } => {
                let owner = self.link(link)?.owner;
                let previous = std::mem::replace(&mut self.links[link].amount, amount);
                self.invalidate(owner);
                Ok(ModelCommand::SetLinkAmount {
                    link,
                    amount: previous,
                })
            }
            ModelCommand::SetLinkAlgorithm { link, algorithm } => {
                let owner = self.link(link)?.owner;
                let previous = std::mem::replace(&mut self.links[link].algorithm, algorithm);
                self.invalidate(owner);
                Ok(ModelCommand::SetLinkAlgorithm {
                    link,
                    algorithm: previous,
                })
            }
            ModelCommand::CreateSubgroup { row } => {
                self.attach_subgroup(row)?;
                Ok(ModelCommand::RemoveSubgroup { row })
            }
            ModelCommand::RemoveSubgroup { row } => {
                self.detach_subgroup(row)?;
                Ok(ModelCommand::CreateSubgroup { row })
            }
            ModelCommand::UnpackSubgroup { row } => self.unpack_subgroup(row),
            ModelCommand::RepackSubgroup {
                table,
                at,
                count,
                row,
                links,
            } => self.repack_subgroup(table, at, count, &row, &links),
            ModelCommand::Noop => Ok(ModelCommand::Noop),
        }
    }

    // -- snapshots ----------------------------------------------------------

    fn snapshot_row(&self, row: RowId) -> Result<RowSnapshot, ModelError> {
        let r = self.row(row)?;
        let subgroup = match r.subgroup {
            Some(table) => Some(self.snapshot_table(table)?),
            None => None,
        };
        Ok(RowSnapshot {
            recipe: r.recipe,
            entity: r.entity,
            quality: r.quality,
            fuel: r.fuel,
            enabled: r.enabled,
            built_count: r.built_count,
            fixed: r.fixed,
            subgroup,
        })
    }

    fn snapshot_table(&self, table: TableId) -> Result<TableSnapshot, ModelError> {
        let t = self.table(table)?;
        let rows = t
            .rows
            .iter()
            .map(|&row| self.snapshot_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        let links = t
            .links
            .iter()
            .map(|&link| Ok(LinkSnapshot::of(self.link(link)?)))
            .collect::<Result<Vec<_>, ModelError>>()?;
        Ok(TableSnapshot { rows, links })
    }

    fn restore_row(
        &mut self,
        table: TableId,
        at: Option<usize>,
        snapshot: &RowSnapshot,
    ) -> Result<RowId, ModelError> {
        let row = self.insert_row(table, snapshot.recipe, at)?;
        {
            let r = &mut self.rows[row];
            r.entity = snapshot.entity;
            r.quality = snapshot.quality;
            r.fuel = snapshot.fuel;
            r.enabled = snapshot.enabled;
            r.built_count = snapshot.built_count;
            r.fixed = snapshot.fixed;
        }
        if let Some(sub_snapshot) = &snapshot.subgroup {
            let sub = self.attach_subgroup(row)?;
            self.restore_table(sub, sub_snapshot)?;
        }
        Ok(row)
    }

    fn restore_table(&mut self, table: TableId, snapshot: &TableSnapshot) -> Result<(), ModelError> {
        for row_snapshot in &snapshot.rows {
            self.restore_row(table, None, row_snapshot)?;
        }
        for link in &snapshot.links {
            self.create_link(table, link.goods, link.amount, link.algorithm)?;
        }
        Ok(())
    }

    // -- subgroup unpack / repack -------------------------------------------

    fn unpack_subgroup(&mut self, row: RowId) -> Result<ModelCommand, ModelError> {
        let owner = self.row(row)?.owner;
        let sub = self.rows[row].subgroup.ok_or(ModelError::NoSubgroup(row))?;
        let at = self.tables[owner]
            .rows
            .iter()
            .position(|&r| r == row)
            .ok_or(ModelError::UnknownRow(row))?;

        let child_rows = self.tables[sub].rows.clone();
        let child_links = self.tables[sub].links.clone();
        let links: Vec<LinkSnapshot> = child_links
            .iter()
            .map(|&l| LinkSnapshot::of(&self.links[l]))
            .collect();

        let r = &self.rows[row];
        let row_snapshot = RowSnapshot {
            recipe: r.recipe,
            entity: r.entity,
            quality: r.quality,
            fuel: r.fuel,
            enabled: r.enabled,
            built_count: r.built_count,
            fixed: r.fixed,
            subgroup: None,
        };

        // Splice the children into the parent at the row's position; no
        // other row moves relative to its neighbors. Reparenting a child
        // must also rewire its own subgroup's parent pointer, or cache
        // invalidation stops walking past it.
        for link in child_links {
            self.links.remove(link);
        }
        for &child in &child_rows {
            self.rows[child].owner = owner;
            if let Some(child_sub) = self.rows[child].subgroup {
                self.tables[child_sub].parent = Some((owner, child));
            }
        }
        let count = child_rows.len();
        self.tables[owner].rows.splice(at..=at, child_rows);
        self.rows.remove(row);
        self.flows.remove(sub);
        self.tables.remove(sub);
        self.invalidate(owner);

        Ok(ModelCommand::RepackSubgroup {
            table: owner,
            at,
            count,
            row: row_snapshot,
            links,
        })
    }

    fn repack_subgroup(
        &mut self,
        table: TableId,
        at: usize,
        count: usize,
        row: &RowSnapshot,
        links: &[LinkSnapshot],
    ) -> Result<ModelCommand, ModelError> {
        let len = self.table(table)?.rows.len();
        if at + count > len {
            return Err(ModelError::RowIndexOutOfBounds {
                table,
                index: at + count,
            });
        }

        let owner_row = self.restore_row(table, Some(at), row)?;
        let sub = self.attach_subgroup(owner_row)?;
        // The repacked children now sit immediately after the restored row.
        let children: Vec<RowId> = self.tables[table]
            .rows
            .drain(at + 1..at + 1 + count)
            .collect();
        for &child in &children {
            self.rows[child].owner = sub;
            if let Some(child_sub) = self.rows[child].subgroup {
                self.tables[child_sub].parent = Some((sub, child));
            }
        }
        self.tables[sub].rows = children;
        for link in links {
            self.create_link(sub, link.goods, link.amount, link.algorithm)?;
        }
        self.invalidate(table);
        Ok(ModelCommand::UnpackSubgroup { row: owner_row })
    }
}
