//! Region generator (spec.md §4.5): turns reactive scopes into a nested tree
//! of [`Region`]s, each carrying the instructions that belong to it, its
//! dependency set (refined by the shape analyzer into property-level paths
//! where possible), and the flags the lowerer needs (`has_control_flow`,
//! `has_jsx`, `should_memoize`).

use crate::ir::{Function, Instruction};
use crate::reactive_scope::ReactiveScopeAnalysis;
use crate::shape::{ShapeAnalysis, Subscription};
use std::collections::HashSet;

pub type RegionId = u32;

#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub scope_id: u32,
    pub blocks: HashSet<crate::ir::BlockId>,
    pub instructions: Vec<Instruction>,
    /// Dependency names, refined to `base.prop` entries where the shape
    /// analyzer found a property-level subscription is safe (spec.md §4.5).
    pub dependencies: Vec<String>,
    pub declarations: HashSet<String>,
    pub has_control_flow: bool,
    pub has_jsx: bool,
    pub should_memoize: bool,
    pub children: Vec<RegionId>,
    pub parent_id: Option<RegionId>,
}

#[derive(Debug, Default)]
pub struct RegionAnalysis {
    pub regions: Vec<Region>,
    pub roots: Vec<RegionId>,
}

impl RegionAnalysis {
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn region_for_declaration(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.declarations.contains(name))
    }
}

pub fn generate(function: &Function, scopes: &ReactiveScopeAnalysis, shapes: &ShapeAnalysis) -> RegionAnalysis {
    let mut regions: Vec<Region> = Vec::new();

    for scope in &scopes.scopes {
        let instructions = collect_scope_instructions(function, scope);
        let has_jsx = instructions.iter().any(|i| i.value().map(contains_jsx).unwrap_or(false));
        let has_control_flow = scope.blocks.len() > 1 || instructions.iter().any(|i| matches!(i, Instruction::Phi { .. }));

        let dependencies = refine_dependencies(scope, shapes);

        regions.push(Region {
            id: scope.id,
            scope_id: scope.id,
            blocks: scope.blocks.clone(),
            instructions,
            dependencies,
            declarations: scope.declarations.clone(),
            has_control_flow,
            has_jsx,
            should_memoize: scope.should_memoize,
            children: Vec::new(),
            parent_id: None,
        });
    }

    nest_by_block_containment(&mut regions);

    let roots = regions.iter().filter(|r| r.parent_id.is_none()).map(|r| r.id).collect();
    RegionAnalysis { regions, roots }
}

fn collect_scope_instructions(function: &Function, scope: &crate::reactive_scope::ReactiveScope) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut sorted_blocks: Vec<_> = function.blocks.iter().filter(|b| scope.blocks.contains(&b.id)).collect();
    sorted_blocks.sort_by_key(|b| b.id);
    for block in sorted_blocks {
        for inst in &block.instructions {
            let name = inst.target_name().map(crate::ir::ssa::base_name);
            let belongs = name.map(|n| scope.declarations.contains(&n)).unwrap_or(false);
            if belongs {
                out.push(inst.clone());
            }
        }
    }
    out
}

fn contains_jsx(expr: &crate::ir::Expression) -> bool {
    let mut found = false;
    crate::ir::walk_expression(expr, &mut |e| {
        if matches!(e, crate::ir::Expression::Jsx(_)) {
            found = true;
        }
    });
    found
}

/// Expands each scope dependency to `base.prop` entries when the shape
/// analyzer found a safe property-level subscription for that base and no
/// whole-object access is required (spec.md §4.5); otherwise the dependency
/// is kept whole.
fn refine_dependencies(scope: &crate::reactive_scope::ReactiveScope, shapes: &ShapeAnalysis) -> Vec<String> {
    let mut out = Vec::new();
    let mut deps: Vec<&String> = scope.dependencies.iter().collect();
    deps.sort();
    for dep in deps {
        match shapes.decision_for(dep).map(|d| &d.subscription) {
            Some(Subscription::Property(keys)) if !keys.is_empty() => {
                for key in keys {
                    out.push(format!("{dep}.{key}"));
                }
            }
            _ => out.push(dep.clone()),
        }
    }
    out
}

/// Assigns parent/child links by smallest-enclosing-block-set containment
/// (spec.md §3 invariant: "Region children's block sets are subsets of
/// their parent's; siblings may share blocks only if one contains the
/// other"). Runs in O(n^2) over regions, which is fine — region counts are
/// bounded by scope counts, themselves bounded by variable counts per
/// function.
fn nest_by_block_containment(regions: &mut [Region]) {
    let snapshot: Vec<(RegionId, HashSet<crate::ir::BlockId>)> = regions.iter().map(|r| (r.id, r.blocks.clone())).collect();

    let mut parents: Vec<(RegionId, Option<RegionId>)> = Vec::new();
    for (id, blocks) in &snapshot {
        let mut best: Option<(RegionId, usize)> = None;
        for (other_id, other_blocks) in &snapshot {
            if other_id == id {
                continue;
            }
            if blocks.is_subset(other_blocks) && other_blocks.len() > blocks.len() {
                let size = other_blocks.len();
                if best.map(|(_, best_size)| size < best_size).unwrap_or(true) {
                    best = Some((*other_id, size));
                }
            }
        }
        parents.push((*id, best.map(|(p, _)| p)));
    }

    for (id, parent) in &parents {
        if let Some(region) = regions.iter_mut().find(|r| r.id == *id) {
            region.parent_id = *parent;
        }
    }
    for (id, parent) in parents {
        if let Some(parent_id) = parent {
            if let Some(parent_region) = regions.iter_mut().find(|r| r.id == parent_id) {
                parent_region.children.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::config::CompilerConfig;
    use crate::ir::*;
    use crate::{reactive_scope, shape};

    #[test]
    fn scope_with_external_effect_becomes_region_with_declarations() {
        let b0 = BasicBlock {
            id: 0,
            instructions: vec![
                Instruction::Assign { target: "a".into(), value: Expression::Identifier("b".into()), declaration_kind: DeclarationKind::Const },
            ],
            terminator: Terminator::Return(Some(Expression::Identifier("a".into()))),
        };
        let func = Function { name: "f".into(), params: vec!["b".into()], raw_params: vec![], blocks: vec![b0], entry: 0, flags: FunctionFlags::default(), hook_return_info: None };
        let cfg_analysis = cfg::analyze(&func).unwrap();
        let config = CompilerConfig::default();
        let scopes = reactive_scope::analyze(&func, &cfg_analysis, &config).unwrap();
        let shapes = shape::analyze(&func);
        let regions = generate(&func, &scopes, &shapes);
        assert!(regions.region_for_declaration("a").is_some());
    }
}
