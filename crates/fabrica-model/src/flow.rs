//! Flow resolution over production tables.
//!
//! [`Project::resolve`] computes, for one table and every dirty table
//! below it, a non-negative multiplier per row and a signed net flow per
//! goods. Resolution never fails: infeasibility is reported through
//! [`RowWarnings`] and [`LinkFlags`], because the model must stay editable
//! and renderable whatever the user typed in.
//!
//! The pipeline per table, after subgroups (post-order):
//!
//! 1. Build per-craft unit flows per row (recipe io, fuel burn, subgroup
//!    exports as constants).
//! 2. Pin multipliers from fixed-amount constraints.
//! 3. Propagate: repeatedly solve links with exactly one undetermined
//!    captured row.
//! 4. Hand the under-determined residue to the [`FlowOptimizer`].
//! 5. Derive warnings, link flags, net flows, and exports.

use crate::solver::{FlowOptimizer, FlowProblem, OptimizerOutcome, ProblemLink, ProblemRow};
use crate::table::{FixedAmount, LinkAlgorithm, ModelError, Project, TableFlow};
use fabrica_analysis::AccessibilityAnalysis;
use fabrica_core::flags::{LinkFlags, RowWarnings};
use fabrica_core::id::{LinkId, ObjectId, RowId, TableId};
use fabrica_core::object::ObjectPayload;
use std::collections::HashMap;

/// Relative tolerance for flow matching.
pub const FLOW_TOLERANCE: f64 = 1e-8;

/// True when `a` and `b` agree within the relative flow tolerance.
#[inline]
pub fn flows_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= FLOW_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

// ---------------------------------------------------------------------------
// Per-row working state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RowCtx {
    row: RowId,
    enabled: bool,
    /// Signed goods flow per craft.
    unit_flows: HashMap<ObjectId, f64>,
    /// Subgroup exports: absolute flows, not scaled by the multiplier.
    const_flows: HashMap<ObjectId, f64>,
    warnings: RowWarnings,
    multiplier: f64,
    /// Pinned by a fixed amount or by link propagation.
    pinned: bool,
    fixed_pin: bool,
    /// Buildings needed per multiplier unit: recipe time / entity speed.
    buildings_per_unit: f64,
    waste: f64,
    accessible: bool,
    child_unmatched: bool,
}

impl RowCtx {
    fn pin(&mut self, multiplier: f64) {
        self.multiplier = multiplier;
        self.pinned = true;
    }

    fn flow_of(&self, goods: ObjectId) -> f64 {
        self.unit_flows.get(&goods).copied().unwrap_or(0.0)
    }

    fn touches(&self, goods: ObjectId) -> bool {
        self.flow_of(goods) != 0.0 || self.const_flows.contains_key(&goods)
    }
}

// ---------------------------------------------------------------------------
// Resolution entry point
// ---------------------------------------------------------------------------

impl Project {
    /// Resolve `table` and every dirty table below it, post-order, and
    /// return the table's flow. Clean cached tables are not recomputed.
    pub fn resolve(
        &mut self,
        table: TableId,
        access: &AccessibilityAnalysis,
        optimizer: &dyn FlowOptimizer,
    ) -> Result<&TableFlow, ModelError> {
        self.table(table)?;
        for tid in self.post_order(table) {
            if self.flows.contains_key(tid) {
                continue;
            }
            let flow = self.compute_table(tid, access, optimizer)?;
            self.flows.insert(tid, flow);
        }
        self.flows
            .get(table)
            .ok_or(ModelError::UnknownTable(table))
    }

    /// Subgroup tables before their owners.
    fn post_order(&self, table: TableId) -> Vec<TableId> {
        let mut order = Vec::new();
        self.post_order_into(table, &mut order);
        order
    }

    fn post_order_into(&self, table: TableId, order: &mut Vec<TableId>) {
        if let Some(t) = self.tables.get(table) {
            for &row in &t.rows {
                if let Some(sub) = self.rows.get(row).and_then(|r| r.subgroup) {
                    self.post_order_into(sub, order);
                }
            }
        }
        order.push(table);
    }

    fn compute_table(
        &self,
        table: TableId,
        access: &AccessibilityAnalysis,
        optimizer: &dyn FlowOptimizer,
    ) -> Result<TableFlow, ModelError> {
        let t = self.table(table)?;
        let row_ids = t.rows.clone();
        let link_ids = t.links.clone();

        let mut rows: Vec<RowCtx> = row_ids
            .iter()
            .map(|&row| self.build_row_ctx(row, access))
            .collect::<Result<_, _>>()?;

        // Step 2: fixed-amount pins.
        for ctx in &mut rows {
            if !ctx.enabled {
                continue;
            }
            let fixed = self.rows[ctx.row].fixed;
            if let Some(fixed) = fixed {
                self.apply_fixed_pin(ctx, fixed);
            }
        }

        // Captured rows per link: enabled rows touching the goods.
        let mut captured: HashMap<LinkId, Vec<usize>> = HashMap::new();
        for &link in &link_ids {
            let goods = self.links[link].goods;
            let indices: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, ctx)| ctx.enabled && ctx.touches(goods))
                .map(|(i, _)| i)
                .collect();
            captured.insert(link, indices);
        }

        // Step 3: single-unknown propagation.
        let mut resolved: HashMap<LinkId, bool> = HashMap::new();
        loop {
            let mut progress = false;
            for &link in &link_ids {
                if resolved.contains_key(&link) {
                    continue;
                }
                let goods = self.links[link].goods;
                let amount = self.links[link].amount;
                let algorithm = self.links[link].algorithm;
                let indices = &captured[&link];

                let unknowns: Vec<usize> = indices
                    .iter()
                    .copied()
                    .filter(|&i| !rows[i].pinned && rows[i].flow_of(goods) != 0.0)
                    .collect();
                match unknowns.len() {
                    0 => {
                        resolved.insert(link, true);
                        progress = true;
                    }
                    1 => {
                        let unknown = unknowns[0];
                        let known: f64 = indices
                            .iter()
                            .filter(|&&i| i != unknown)
                            .map(|&i| {
                                let ctx = &rows[i];
                                ctx.multiplier * ctx.flow_of(goods)
                                    + ctx.const_flows.get(&goods).copied().unwrap_or(0.0)
                            })
                            .sum::<f64>()
                            + rows[unknown]
                                .const_flows
                                .get(&goods)
                                .copied()
                                .unwrap_or(0.0);
                        let mut multiplier = (amount - known) / rows[unknown].flow_of(goods);
                        if multiplier < 0.0 {
                            if algorithm == LinkAlgorithm::Match {
                                rows[unknown]
                                    .warnings
                                    .insert(RowWarnings::OVERPRODUCTION_REQUIRED);
                            }
                            multiplier = 0.0;
                        }
                        rows[unknown].pin(multiplier);
                        resolved.insert(link, true);
                        progress = true;
                    }
                    _ => {}
                }
            }
            if !progress {
                break;
            }
        }

        // Deadlock candidates: unresolved balance-only links with no fixed
        // anchor that share a captured row with another such link.
        let candidates: Vec<LinkId> = link_ids
            .iter()
            .copied()
            .filter(|link| {
                !resolved.contains_key(link)
                    && self.links[*link].amount == 0.0
                    && !captured[link].iter().any(|&i| rows[i].fixed_pin)
            })
            .collect();
        for (n, &a) in candidates.iter().enumerate() {
            for &b in &candidates[n + 1..] {
                let shares = captured[&a].iter().any(|i| captured[&b].contains(i));
                if shares {
                    for &i in captured[&a].iter().chain(&captured[&b]) {
                        rows[i].warnings.insert(RowWarnings::DEADLOCK_CANDIDATE);
                    }
                }
            }
        }

        // Step 4: hand the residue to the optimizer.
        let pending: Vec<LinkId> = link_ids
            .iter()
            .copied()
            .filter(|link| !resolved.contains_key(link))
            .collect();
        if !pending.is_empty() {
            let mut problem = FlowProblem::default();
            let mut problem_indices = Vec::new();
            for (i, ctx) in rows.iter().enumerate() {
                let in_pending = pending
                    .iter()
                    .any(|link| captured[link].contains(&i) && !ctx.pinned);
                if in_pending {
                    problem.rows.push(ProblemRow {
                        row: ctx.row,
                        flows: ctx.unit_flows.clone(),
                        waste: ctx.waste,
                        accessible: ctx.accessible,
                    });
                    problem_indices.push(i);
                }
            }
            for &link in &pending {
                let goods = self.links[link].goods;
                let decided: f64 = captured[&link]
                    .iter()
                    .map(|&i| {
                        let ctx = &rows[i];
                        let scaled = if ctx.pinned {
                            ctx.multiplier * ctx.flow_of(goods)
                        } else {
                            0.0
                        };
                        scaled + ctx.const_flows.get(&goods).copied().unwrap_or(0.0)
                    })
                    .sum();
                problem.links.push(ProblemLink {
                    link,
                    goods,
                    residual: self.links[link].amount - decided,
                    algorithm: self.links[link].algorithm,
                });
            }

            let solution = optimizer.solve(&problem);
            for &i in &problem_indices {
                let multiplier = solution
                    .multipliers
                    .get(&rows[i].row)
                    .copied()
                    .unwrap_or(0.0);
                rows[i].pin(multiplier.max(0.0));
                if solution.outcome != OptimizerOutcome::Solved {
                    rows[i].warnings.insert(RowWarnings::SOLUTION_INACCURATE);
                }
            }
        }

        // Step 5: warnings, link flags, net flows.
        let mut flow = TableFlow::default();
        for ctx in &mut rows {
            let row = &self.rows[ctx.row];
            if let Some(built) = row.built_count {
                let buildings = ctx.multiplier * ctx.buildings_per_unit;
                if buildings > built && !flows_match(buildings, built) {
                    ctx.warnings.insert(RowWarnings::EXCEEDS_BUILT_COUNT);
                }
            }
            flow.multipliers.insert(ctx.row, ctx.multiplier);
        }

        for &link in &link_ids {
            let goods = self.links[link].goods;
            let amount = self.links[link].amount;
            let algorithm = self.links[link].algorithm;
            let indices = &captured[&link];

            let mut produced = 0.0;
            let mut consumed = 0.0;
            let mut child_unmatched = false;
            for &i in indices {
                let ctx = &rows[i];
                let contribution = ctx.multiplier * ctx.flow_of(goods)
                    + ctx.const_flows.get(&goods).copied().unwrap_or(0.0);
                if contribution > 0.0 {
                    produced += contribution;
                } else {
                    consumed += -contribution;
                }
                child_unmatched |= ctx.child_unmatched;
            }
            let net = produced - consumed;

            let mut flags = LinkFlags::EMPTY;
            if produced > 0.0 {
                flags.insert(LinkFlags::HAS_PRODUCTION);
            }
            if consumed > 0.0 {
                flags.insert(LinkFlags::HAS_CONSUMPTION);
            }
            if produced > 0.0 && consumed > 0.0 {
                flags.insert(LinkFlags::HAS_PRODUCTION_AND_CONSUMPTION);
            }
            let matched = match algorithm {
                LinkAlgorithm::Match => flows_match(net, amount),
                LinkAlgorithm::AllowOverProduction => {
                    net >= amount || flows_match(net, amount)
                }
            };
            if !matched {
                flags.insert(LinkFlags::LINK_NOT_MATCHED);
                if child_unmatched {
                    flags.insert(LinkFlags::LINK_RECURSIVE_NOT_MATCHED);
                }
                // Over-determined: every captured unknown was consumed by
                // fixed pins, so the conflict sits on the last fixed row.
                let last_fixed = indices.iter().rev().find(|&&i| rows[i].fixed_pin);
                if let Some(&i) = last_fixed {
                    rows[i].warnings.insert(RowWarnings::FIXED_AMOUNT_CONFLICT);
                }
            }
            if child_unmatched {
                flags.insert(LinkFlags::CHILD_NOT_MATCHED);
            }

            flow.link_flows.insert(link, net);
            flow.link_flags.insert(link, flags);
            flow.captured_rows
                .insert(link, indices.iter().map(|&i| rows[i].row).collect());
        }

        for ctx in &rows {
            if !ctx.enabled {
                flow.warnings.insert(ctx.row, ctx.warnings);
                continue;
            }
            for (&goods, &unit) in &ctx.unit_flows {
                *flow.net_flow.entry(goods).or_insert(0.0) += ctx.multiplier * unit;
            }
            for (&goods, &constant) in &ctx.const_flows {
                *flow.net_flow.entry(goods).or_insert(0.0) += constant;
            }
            flow.warnings.insert(ctx.row, ctx.warnings);
        }

        for (&goods, &net) in &flow.net_flow {
            let linked = link_ids
                .iter()
                .any(|&link| self.links[link].goods == goods);
            if !linked && !flows_match(net, 0.0) {
                flow.exports.insert(goods, net);
            }
        }

        Ok(flow)
    }

    // -- row context --------------------------------------------------------

    fn build_row_ctx(
        &self,
        row: RowId,
        access: &AccessibilityAnalysis,
    ) -> Result<RowCtx, ModelError> {
        let r = self.row(row)?;
        let object = self
            .graph
            .object(r.recipe)
            .ok_or(ModelError::UnresolvedObject(r.recipe))?;

        let mut ctx = RowCtx {
            row,
            enabled: r.enabled,
            accessible: access.is_accessible(r.recipe),
            ..RowCtx::default()
        };

        let (time, is_recipe) = match &object.payload {
            ObjectPayload::Recipe(spec) => {
                for ingredient in &spec.ingredients {
                    *ctx.unit_flows.entry(ingredient.goods).or_insert(0.0) -= ingredient.amount;
                    if let (Some(band), Some(fluid)) = (
                        ingredient.temperature,
                        self.graph
                            .object(ingredient.goods)
                            .and_then(|o| o.as_fluid()),
                    ) {
                        if !band.accepts(fluid.temperature) {
                            ctx.warnings.insert(RowWarnings::TEMPERATURE_MISMATCH);
                        }
                    }
                }
                for product in &spec.products {
                    *ctx.unit_flows.entry(product.goods).or_insert(0.0) += product.amount;
                }
                (spec.time, true)
            }
            ObjectPayload::Technology(spec) => {
                for ingredient in &spec.ingredients {
                    *ctx.unit_flows.entry(ingredient.goods).or_insert(0.0) -= ingredient.amount;
                }
                (1.0, false)
            }
            _ => return Err(ModelError::NotRecipeLike(r.recipe)),
        };

        let (speed, energy) = match r.entity.and_then(|e| self.graph.object(e)) {
            Some(entity_object) => match entity_object.as_entity() {
                Some(spec) => (spec.crafting_speed, spec.energy_usage),
                None => (1.0, 0.0),
            },
            None => {
                if is_recipe {
                    ctx.warnings.insert(RowWarnings::ENTITY_NOT_SPECIFIED);
                }
                (1.0, 0.0)
            }
        };
        ctx.buildings_per_unit = if speed > 0.0 { time / speed } else { 0.0 };

        if energy > 0.0 {
            let fuel_value = r
                .fuel
                .and_then(|f| self.graph.object(f))
                .and_then(|o| o.as_item())
                .map(|item| item.fuel_value)
                .unwrap_or(0.0);
            match r.fuel {
                Some(fuel) if fuel_value > 0.0 => {
                    *ctx.unit_flows.entry(fuel).or_insert(0.0) -= energy * time / fuel_value;
                }
                _ => ctx.warnings.insert(RowWarnings::FUEL_NOT_SPECIFIED),
            }
        }

        if let Some(sub) = r.subgroup {
            if let Some(child) = self.flows.get(sub) {
                ctx.const_flows = child.exports.clone();
                ctx.child_unmatched = child
                    .link_flags
                    .values()
                    .any(|flags| flags.contains(LinkFlags::LINK_NOT_MATCHED));
            }
        }

        ctx.waste = -ctx
            .unit_flows
            .iter()
            .map(|(&goods, &unit)| self.cost(goods) * unit)
            .sum::<f64>();

        Ok(ctx)
    }

    fn apply_fixed_pin(&self, ctx: &mut RowCtx, fixed: FixedAmount) {
        match fixed {
            FixedAmount::Buildings(buildings) => {
                if ctx.buildings_per_unit > 0.0 {
                    ctx.pin(buildings / ctx.buildings_per_unit);
                    ctx.fixed_pin = true;
                }
            }
            FixedAmount::Fuel(amount) => {
                let fuel_burn = self.rows[ctx.row]
                    .fuel
                    .map(|f| -ctx.flow_of(f))
                    .unwrap_or(0.0);
                if fuel_burn > 0.0 {
                    ctx.pin(amount / fuel_burn);
                    ctx.fixed_pin = true;
                } else {
                    ctx.warnings.insert(RowWarnings::FUEL_NOT_SPECIFIED);
                }
            }
            FixedAmount::Ingredient(goods, amount) => {
                let consumption = -ctx.flow_of(goods);
                if consumption > 0.0 {
                    ctx.pin(amount / consumption);
                    ctx.fixed_pin = true;
                } else {
                    ctx.warnings.insert(RowWarnings::FIXED_AMOUNT_CONFLICT);
                }
            }
            FixedAmount::Product(goods, amount) => {
                let production = ctx.flow_of(goods);
                if production > 0.0 {
                    ctx.pin(amount / production);
                    ctx.fixed_pin = true;
                } else {
                    ctx.warnings.insert(RowWarnings::FIXED_AMOUNT_CONFLICT);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ModelCommand;
    use crate::solver::GreedyOptimizer;
    use fabrica_analysis::OverrideMap;
    use fabrica_core::graph::{DependencyKind, ObjectGraphBuilder};
    use fabrica_core::object::{Ingredient, ItemSpec, Product, RecipeSpec};
    use fabrica_core::test_utils::{smelting_chain, two_path};

    struct Ctx {
        project: Project,
        access: AccessibilityAnalysis,
    }

    fn ctx_from(graph: fabrica_core::graph::ObjectGraph) -> Ctx {
        let access = AccessibilityAnalysis::run(&graph, &OverrideMap::new());
        Ctx {
            project: Project::new(graph),
            access,
        }
    }

    fn chain_ctx() -> Ctx {
        ctx_from(smelting_chain().graph)
    }

    fn id(c: &Ctx, name: &str) -> ObjectId {
        c.project.graph().object_by_name(name).unwrap().id
    }

    fn add_row(c: &mut Ctx, table: TableId, recipe: ObjectId) -> RowId {
        c.project
            .apply(ModelCommand::AddRow {
                table,
                recipe,
                at: None,
            })
            .unwrap();
        *c.project.table(table).unwrap().rows.last().unwrap()
    }

    fn add_link(c: &mut Ctx, table: TableId, goods: ObjectId, amount: f64) -> LinkId {
        c.project
            .apply(ModelCommand::CreateLink {
                table,
                goods,
                amount,
                algorithm: LinkAlgorithm::Match,
            })
            .unwrap();
        c.project.link_for_goods(table, goods).unwrap()
    }

    fn resolve(c: &mut Ctx, table: TableId) -> TableFlow {
        let access = c.access.clone();
        c.project
            .resolve(table, &access, &GreedyOptimizer::new())
            .unwrap()
            .clone()
    }

    // -- single-recipe balance ----------------------------------------------

    #[test]
    fn single_recipe_balance_resolves_target_over_rate() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");
        let smelt = id(&c, "iron-smelting");
        let furnace = id(&c, "stone-furnace");
        let coal = id(&c, "coal");

        let row = add_row(&mut c, root, smelt);
        c.project
            .apply(ModelCommand::SetEntity {
                row,
                entity: Some(furnace),
            })
            .unwrap();
        c.project
            .apply(ModelCommand::SetFuel {
                row,
                fuel: Some(coal),
            })
            .unwrap();
        let link = add_link(&mut c, root, plate, 5.0);

        let flow = resolve(&mut c, root);
        // One plate per craft: multiplier = amount / rate = 5.
        assert!(flows_match(flow.multiplier(row), 5.0));
        assert!(flow.row_warnings(row).is_empty());
        assert!(flows_match(flow.link_flow(link), 5.0));
        assert!(!flow.link_flags(link).contains(LinkFlags::LINK_NOT_MATCHED));
        // Unlinked inputs export to the (nonexistent) parent scope.
        assert!(flows_match(flow.exports[&id(&c, "iron-ore")], -5.0));
    }

    #[test]
    fn empty_table_resolves_to_empty_flow() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let flow = resolve(&mut c, root);
        assert!(flow.net_flow.is_empty());
        assert!(flow.multipliers.is_empty());
    }

    // -- propagation --------------------------------------------------------

    #[test]
    fn link_constraints_propagate_along_the_chain() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let steel = id(&c, "steel-plate");
        let plate = id(&c, "iron-plate");

        let recipe_1 = id(&c, "steel-smelting");
        let steel_row = add_row(&mut c, root, recipe_1);
        let recipe_2 = id(&c, "iron-smelting");
        let plate_row = add_row(&mut c, root, recipe_2);
        add_link(&mut c, root, steel, 2.0);
        add_link(&mut c, root, plate, 0.0);

        let flow = resolve(&mut c, root);
        // 2 steel needs 2 crafts; each craft eats 5 plates; balance link
        // forces 10 plate crafts.
        assert!(flows_match(flow.multiplier(steel_row), 2.0));
        assert!(flows_match(flow.multiplier(plate_row), 10.0));
        assert!(flows_match(flow.net_flow[&plate], 0.0));
    }

    #[test]
    fn fixed_buildings_pin_the_multiplier() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let smelt = id(&c, "iron-smelting");
        let furnace = id(&c, "stone-furnace");

        let row = add_row(&mut c, root, smelt);
        c.project
            .apply(ModelCommand::SetEntity {
                row,
                entity: Some(furnace),
            })
            .unwrap();
        c.project
            .apply(ModelCommand::SetFixedAmount {
                row,
                fixed: Some(FixedAmount::Buildings(8.0)),
            })
            .unwrap();

        let flow = resolve(&mut c, root);
        // 8 buildings at speed 1 over 3.2s craft time: 2.5 crafts/s.
        assert!(flows_match(flow.multiplier(row), 2.5));
        assert!(flows_match(flow.net_flow[&id(&c, "iron-plate")], 2.5));
    }

    #[test]
    fn conflicting_fixed_amount_flags_instead_of_resolving() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");

        let recipe_3 = id(&c, "iron-smelting");
        let row = add_row(&mut c, root, recipe_3);
        c.project
            .apply(ModelCommand::SetFixedAmount {
                row,
                fixed: Some(FixedAmount::Product(plate, 10.0)),
            })
            .unwrap();
        let link = add_link(&mut c, root, plate, 5.0);

        let flow = resolve(&mut c, root);
        // The pin wins; the link records the mismatch and the fixed row is
        // flagged as the conflict site.
        assert!(flows_match(flow.multiplier(row), 10.0));
        assert!(flow.link_flags(link).contains(LinkFlags::LINK_NOT_MATCHED));
        assert!(flow
            .row_warnings(row)
            .contains(RowWarnings::FIXED_AMOUNT_CONFLICT));
    }

    // -- overproduction -----------------------------------------------------

    fn overproduction_graph() -> fabrica_core::graph::ObjectGraph {
        // A recipe that can only produce: any negative target is infeasible
        // under Match.
        let mut b = ObjectGraphBuilder::new();
        let goods = b
            .add_object(
                "widget",
                fabrica_core::object::ObjectPayload::Item(ItemSpec {
                    fuel_value: 0.0,
                    stack_size: 100,
                }),
            )
            .unwrap();
        let make = b
            .add_object(
                "make-widget",
                fabrica_core::object::ObjectPayload::Recipe(RecipeSpec {
                    time: 1.0,
                    ingredients: vec![],
                    products: vec![Product {
                        goods,
                        amount: 1.0,
                    }],
                }),
            )
            .unwrap();
        b.mark_root(goods).unwrap();
        b.add_group(goods, DependencyKind::Source, false, vec![make])
            .unwrap();
        b.finish().0
    }

    #[test]
    fn infeasible_match_suggests_overproduction() {
        let mut c = ctx_from(overproduction_graph());
        let root = c.project.root();
        let widget = id(&c, "widget");

        let recipe_4 = id(&c, "make-widget");
        let row = add_row(&mut c, root, recipe_4);
        let link = add_link(&mut c, root, widget, -5.0);

        let flow = resolve(&mut c, root);
        assert!(flows_match(flow.multiplier(row), 0.0));
        assert!(flow
            .row_warnings(row)
            .contains(RowWarnings::OVERPRODUCTION_REQUIRED));
        assert!(flow.link_flags(link).contains(LinkFlags::LINK_NOT_MATCHED));
    }

    #[test]
    fn allow_over_production_clears_the_mismatch() {
        let mut c = ctx_from(overproduction_graph());
        let root = c.project.root();
        let widget = id(&c, "widget");

        let recipe_5 = id(&c, "make-widget");
        let row = add_row(&mut c, root, recipe_5);
        c.project
            .apply(ModelCommand::CreateLink {
                table: root,
                goods: widget,
                amount: -5.0,
                algorithm: LinkAlgorithm::AllowOverProduction,
            })
            .unwrap();
        let link = c.project.link_for_goods(root, widget).unwrap();

        let flow = resolve(&mut c, root);
        assert!(flows_match(flow.multiplier(row), 0.0));
        assert!(!flow
            .row_warnings(row)
            .contains(RowWarnings::OVERPRODUCTION_REQUIRED));
        assert!(!flow.link_flags(link).contains(LinkFlags::LINK_NOT_MATCHED));
    }

    // -- nesting ------------------------------------------------------------

    #[test]
    fn nesting_isolates_linked_goods_and_exports_the_rest() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");
        let ore = id(&c, "iron-ore");

        let recipe_6 = id(&c, "steel-smelting");
        let owner = add_row(&mut c, root, recipe_6);
        c.project
            .apply(ModelCommand::CreateSubgroup { row: owner })
            .unwrap();
        let sub = c.project.row(owner).unwrap().subgroup.unwrap();
        let recipe_7 = id(&c, "iron-smelting");
        add_row(&mut c, sub, recipe_7);
        add_link(&mut c, sub, plate, 3.0);

        let flow = resolve(&mut c, root);
        // Plate is linked inside the subgroup: it does not leak upward.
        // Ore is consumed there but unlinked: it aggregates into the parent.
        assert!(flows_match(flow.net_flow[&ore], -3.0));
        let parent_plate = flow.net_flow.get(&plate).copied().unwrap_or(0.0);
        assert!(flows_match(parent_plate, 0.0));

        let sub_flow = c.project.cached_flow(sub).unwrap();
        assert!(flows_match(sub_flow.exports[&ore], -3.0));
        assert!(!sub_flow.exports.contains_key(&plate));
    }

    #[test]
    fn unpacked_subgroups_still_invalidate_their_ancestors() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");
        let ore = id(&c, "iron-ore");

        // root -> outer row -> sub -> mid row -> inner table with a link.
        let recipe_8 = id(&c, "steel-smelting");
        let outer = add_row(&mut c, root, recipe_8);
        c.project
            .apply(ModelCommand::CreateSubgroup { row: outer })
            .unwrap();
        let sub = c.project.row(outer).unwrap().subgroup.unwrap();
        let recipe_9 = id(&c, "steel-smelting");
        let mid = add_row(&mut c, sub, recipe_9);
        c.project
            .apply(ModelCommand::CreateSubgroup { row: mid })
            .unwrap();
        let inner = c.project.row(mid).unwrap().subgroup.unwrap();
        let recipe_10 = id(&c, "iron-smelting");
        add_row(&mut c, inner, recipe_10);
        add_link(&mut c, inner, plate, 5.0);

        c.project
            .apply(ModelCommand::UnpackSubgroup { row: outer })
            .unwrap();
        let flow = resolve(&mut c, root);
        assert!(flows_match(flow.net_flow[&ore], -5.0));

        // A mutation inside the surviving grandchild table must drop the
        // root cache, not just its own.
        let link = c.project.link_for_goods(inner, plate).unwrap();
        c.project
            .apply(ModelCommand::SetLinkAmount { link, amount: 11.0 })
            .unwrap();
        assert!(c.project.cached_flow(root).is_none());
        let flow = resolve(&mut c, root);
        assert!(flows_match(flow.net_flow[&ore], -11.0));
    }

    // -- deadlock -----------------------------------------------------------

    fn mutual_cycle_graph() -> fabrica_core::graph::ObjectGraph {
        let mut b = ObjectGraphBuilder::new();
        let item = |b: &mut ObjectGraphBuilder, name: &str| {
            b.add_object(
                name,
                fabrica_core::object::ObjectPayload::Item(ItemSpec {
                    fuel_value: 0.0,
                    stack_size: 100,
                }),
            )
            .unwrap()
        };
        let a = item(&mut b, "a");
        let c = item(&mut b, "c");
        let recipe = |b: &mut ObjectGraphBuilder, name: &str, from: ObjectId, to: ObjectId| {
            b.add_object(
                name,
                fabrica_core::object::ObjectPayload::Recipe(RecipeSpec {
                    time: 1.0,
                    ingredients: vec![Ingredient {
                        goods: from,
                        amount: 1.0,
                        temperature: None,
                    }],
                    products: vec![Product {
                        goods: to,
                        amount: 1.0,
                    }],
                }),
            )
            .unwrap()
        };
        let forward = recipe(&mut b, "a-to-c", a, c);
        let backward = recipe(&mut b, "c-to-a", c, a);
        b.mark_root(a).unwrap();
        b.mark_root(c).unwrap();
        b.add_group(forward, DependencyKind::Ingredient, true, vec![a])
            .unwrap();
        b.add_group(backward, DependencyKind::Ingredient, true, vec![c])
            .unwrap();
        b.finish().0
    }

    #[test]
    fn mutually_dependent_links_report_deadlock() {
        let mut c = ctx_from(mutual_cycle_graph());
        let root = c.project.root();
        let a = id(&c, "a");
        let goods_c = id(&c, "c");

        let recipe_11 = id(&c, "a-to-c");
        let forward = add_row(&mut c, root, recipe_11);
        let recipe_12 = id(&c, "c-to-a");
        let backward = add_row(&mut c, root, recipe_12);
        add_link(&mut c, root, a, 0.0);
        add_link(&mut c, root, goods_c, 0.0);

        let flow = resolve(&mut c, root);
        assert!(flow
            .row_warnings(forward)
            .contains(RowWarnings::DEADLOCK_CANDIDATE));
        assert!(flow
            .row_warnings(backward)
            .contains(RowWarnings::DEADLOCK_CANDIDATE));
        // The greedy fallback settles everything at zero.
        assert!(flows_match(flow.multiplier(forward), 0.0));
        assert!(flows_match(flow.multiplier(backward), 0.0));
    }

    #[test]
    fn anchored_cycle_is_not_a_deadlock() {
        let mut c = ctx_from(mutual_cycle_graph());
        let root = c.project.root();
        let a = id(&c, "a");
        let goods_c = id(&c, "c");

        let recipe_13 = id(&c, "a-to-c");
        let forward = add_row(&mut c, root, recipe_13);
        let recipe_14 = id(&c, "c-to-a");
        let backward = add_row(&mut c, root, recipe_14);
        c.project
            .apply(ModelCommand::SetFixedAmount {
                row: forward,
                fixed: Some(FixedAmount::Product(goods_c, 4.0)),
            })
            .unwrap();
        add_link(&mut c, root, a, 0.0);
        add_link(&mut c, root, goods_c, 0.0);

        let flow = resolve(&mut c, root);
        assert!(!flow
            .row_warnings(forward)
            .contains(RowWarnings::DEADLOCK_CANDIDATE));
        assert!(flows_match(flow.multiplier(forward), 4.0));
        assert!(flows_match(flow.multiplier(backward), 4.0));
    }

    // -- under-determined systems -------------------------------------------

    #[test]
    fn under_determined_rows_fall_to_the_optimizer() {
        let mut c = ctx_from(two_path().graph);
        let root = c.project.root();
        let target = id(&c, "target");

        let recipe_15 = id(&c, "recipe-a");
        let row_a = add_row(&mut c, root, recipe_15);
        let recipe_16 = id(&c, "recipe-b");
        let row_b = add_row(&mut c, root, recipe_16);
        let link = add_link(&mut c, root, target, 10.0);

        let flow = resolve(&mut c, root);
        // Equal waste: the greedy fallback deterministically prefers the
        // first row.
        assert!(flows_match(flow.multiplier(row_a), 10.0));
        assert!(flows_match(flow.multiplier(row_b), 0.0));
        assert!(!flow.link_flags(link).contains(LinkFlags::LINK_NOT_MATCHED));
    }

    // -- warnings -----------------------------------------------------------

    #[test]
    fn missing_entity_and_fuel_are_warned_not_rejected() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let recipe_17 = id(&c, "iron-smelting");
        let row = add_row(&mut c, root, recipe_17);

        let flow = resolve(&mut c, root);
        assert!(flow
            .row_warnings(row)
            .contains(RowWarnings::ENTITY_NOT_SPECIFIED));

        let furnace = id(&c, "stone-furnace");
        c.project
            .apply(ModelCommand::SetEntity {
                row,
                entity: Some(furnace),
            })
            .unwrap();
        let flow = resolve(&mut c, root);
        assert!(flow
            .row_warnings(row)
            .contains(RowWarnings::FUEL_NOT_SPECIFIED));
        assert!(!flow
            .row_warnings(row)
            .contains(RowWarnings::ENTITY_NOT_SPECIFIED));
    }

    #[test]
    fn exceeding_built_count_is_flagged() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");
        let furnace = id(&c, "stone-furnace");

        let recipe_18 = id(&c, "iron-smelting");
        let row = add_row(&mut c, root, recipe_18);
        c.project
            .apply(ModelCommand::SetEntity {
                row,
                entity: Some(furnace),
            })
            .unwrap();
        c.project
            .apply(ModelCommand::SetBuiltCount {
                row,
                built_count: Some(4.0),
            })
            .unwrap();
        add_link(&mut c, root, plate, 10.0);

        let flow = resolve(&mut c, root);
        // 10 crafts/s at 3.2s per craft needs 32 furnaces, built only 4.
        assert!(flow
            .row_warnings(row)
            .contains(RowWarnings::EXCEEDS_BUILT_COUNT));
    }

    #[test]
    fn disabled_rows_do_not_contribute() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");

        let recipe_19 = id(&c, "iron-smelting");
        let row = add_row(&mut c, root, recipe_19);
        c.project
            .apply(ModelCommand::SetEnabled {
                row,
                enabled: false,
            })
            .unwrap();
        let link = add_link(&mut c, root, plate, 5.0);

        let flow = resolve(&mut c, root);
        assert!(flows_match(flow.multiplier(row), 0.0));
        assert!(flow.link_flags(link).contains(LinkFlags::LINK_NOT_MATCHED));
    }

    #[test]
    fn resolve_uses_cache_until_invalidated() {
        let mut c = chain_ctx();
        let root = c.project.root();
        let plate = id(&c, "iron-plate");
        let recipe_20 = id(&c, "iron-smelting");
        let row = add_row(&mut c, root, recipe_20);
        add_link(&mut c, root, plate, 5.0);

        resolve(&mut c, root);
        assert!(c.project.cached_flow(root).is_some());

        // A structural mutation drops the cache; the next resolve sees the
        // new amount.
        let link = c.project.link_for_goods(root, plate).unwrap();
        c.project
            .apply(ModelCommand::SetLinkAmount { link, amount: 7.0 })
            .unwrap();
        assert!(c.project.cached_flow(root).is_none());
        let flow = resolve(&mut c, root);
        assert!(flows_match(flow.multiplier(row), 7.0));
    }
}
