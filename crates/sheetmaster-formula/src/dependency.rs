//! Dependency tracking for formula calculation
//!
//! The graph is rebuilt from the grid on every full recompute. Edges run from a
//! formula cell to every cell its formula reads; ranges are expanded to their
//! member cells. Traversals are iterative so adversarial or circular sheets
//! cannot exhaust the stack.

use crate::ast::FormulaExpr;
use crate::evaluator::function_registry;
use crate::parser::parse_formula;
use ahash::AHashMap;
use sheetmaster_core::{CellAddress, Grid};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{trace, warn};

static NO_CELLS: BTreeSet<CellAddress> = BTreeSet::new();

/// References read by a single formula
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormulaReferences {
    /// Every cell read, ranges expanded
    pub cells: BTreeSet<CellAddress>,
    /// The formula calls a volatile function
    pub volatile: bool,
}

/// Extract the references of a formula's text
///
/// Unparseable formulas read nothing. Ranges larger than `max_range_cells` are
/// skipped; evaluating them yields `#REF!` anyway.
pub fn formula_references(formula: &str, max_range_cells: u64) -> FormulaReferences {
    let mut refs = FormulaReferences::default();

    let expr = match parse_formula(formula) {
        Ok(expr) => expr,
        Err(e) => {
            trace!(formula, error = %e, "formula has no references: parse failed");
            return refs;
        }
    };

    let registry = function_registry();
    expr.walk(&mut |node| match node {
        FormulaExpr::CellRef(addr) => {
            refs.cells.insert(*addr);
        }
        FormulaExpr::RangeRef(range) => match range.expand(max_range_cells) {
            Ok(cells) => refs.cells.extend(cells),
            Err(e) => warn!(formula, error = %e, "skipping range in dependency scan"),
        },
        FormulaExpr::Function { name, .. } if registry.is_volatile(name) => {
            refs.volatile = true;
        }
        _ => {}
    });

    refs
}

/// Dependency graph for formula cells
///
/// Tracks which cells each formula reads (precedents) and, in reverse, which
/// formulas read each cell (dependents).
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Formula cell → cells it reads
    precedents: BTreeMap<CellAddress, BTreeSet<CellAddress>>,
    /// Cell → formula cells that read it
    dependents: BTreeMap<CellAddress, BTreeSet<CellAddress>>,
    /// Formula cells calling volatile functions
    volatile: BTreeSet<CellAddress>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every formula in the grid
    pub fn build(grid: &Grid, max_range_cells: u64) -> Self {
        let mut graph = Self::new();
        for (addr, formula) in grid.formula_cells() {
            let refs = formula_references(formula, max_range_cells);
            graph.add_formula(addr);
            for precedent in refs.cells {
                graph.add_dependency(precedent, addr);
            }
            if refs.volatile {
                graph.mark_volatile(addr);
            }
        }
        graph
    }

    /// Register a formula cell, even one that reads nothing
    pub fn add_formula(&mut self, cell: CellAddress) {
        self.precedents.entry(cell).or_default();
    }

    /// Add a dependency: `dependent` reads `precedent`
    pub fn add_dependency(&mut self, precedent: CellAddress, dependent: CellAddress) {
        self.dependents.entry(precedent).or_default().insert(dependent);
        self.precedents.entry(dependent).or_default().insert(precedent);
    }

    /// Flag a formula cell as volatile
    pub fn mark_volatile(&mut self, cell: CellAddress) {
        self.add_formula(cell);
        self.volatile.insert(cell);
    }

    /// True when the cell holds a formula
    pub fn is_formula(&self, cell: CellAddress) -> bool {
        self.precedents.contains_key(&cell)
    }

    /// Formula cells in row-major order
    pub fn formula_cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        self.precedents.keys().copied()
    }

    /// Number of formula cells
    pub fn len(&self) -> usize {
        self.precedents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precedents.is_empty()
    }

    /// Cells the given formula reads
    pub fn precedents_of(&self, cell: CellAddress) -> impl Iterator<Item = CellAddress> + '_ {
        self.precedents.get(&cell).unwrap_or(&NO_CELLS).iter().copied()
    }

    /// Formula cells that read the given cell
    pub fn dependents_of(&self, cell: CellAddress) -> impl Iterator<Item = CellAddress> + '_ {
        self.dependents.get(&cell).unwrap_or(&NO_CELLS).iter().copied()
    }

    /// Formula cells calling volatile functions
    pub fn volatile_cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        self.volatile.iter().copied()
    }

    /// Cells that are members of a reference cycle
    ///
    /// Runs Tarjan's strongly connected components algorithm with an explicit
    /// stack. A cell is circular when its component has more than one member or
    /// when it reads itself. Cells that only depend on a cycle are not included.
    pub fn find_circular(&self) -> BTreeSet<CellAddress> {
        let nodes: Vec<CellAddress> = self.precedents.keys().copied().collect();
        let position: AHashMap<CellAddress, usize> =
            nodes.iter().enumerate().map(|(i, addr)| (*addr, i)).collect();

        // Only formula cells have outgoing edges, so only they can close a cycle
        let adjacency: Vec<Vec<usize>> = nodes
            .iter()
            .map(|addr| {
                self.precedents_of(*addr)
                    .filter_map(|p| position.get(&p).copied())
                    .collect()
            })
            .collect();

        let n = nodes.len();
        let mut index: Vec<Option<usize>> = vec![None; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack = Vec::new();
        let mut next_index = 0;
        let mut circular = BTreeSet::new();

        for root in 0..n {
            if index[root].is_some() {
                continue;
            }

            index[root] = Some(next_index);
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            // (node, next edge to explore)
            let mut calls = vec![(root, 0usize)];

            while let Some(frame) = calls.last_mut() {
                let v = frame.0;
                if let Some(&w) = adjacency[v].get(frame.1) {
                    frame.1 += 1;
                    match index[w] {
                        None => {
                            index[w] = Some(next_index);
                            lowlink[w] = next_index;
                            next_index += 1;
                            stack.push(w);
                            on_stack[w] = true;
                            calls.push((w, 0));
                        }
                        Some(w_index) if on_stack[w] => {
                            lowlink[v] = lowlink[v].min(w_index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                calls.pop();
                if let Some(&(parent, _)) = calls.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }

                if index[v] == Some(lowlink[v]) {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    if component.len() > 1 || adjacency[v].contains(&v) {
                        circular.extend(component.into_iter().map(|i| nodes[i]));
                    }
                }
            }
        }

        if !circular.is_empty() {
            warn!(count = circular.len(), "circular references detected");
        }
        circular
    }

    /// Every non-circular formula cell, each after the formula cells it reads
    pub fn evaluation_order(&self, circular: &BTreeSet<CellAddress>) -> Vec<CellAddress> {
        self.post_order(self.formula_cells(), circular)
    }

    /// The given formula cells in evaluation order
    ///
    /// Precedents outside `cells` are assumed up to date and are left out.
    pub fn evaluation_order_for(
        &self,
        cells: &BTreeSet<CellAddress>,
        circular: &BTreeSet<CellAddress>,
    ) -> Vec<CellAddress> {
        let mut order = self.post_order(cells.iter().copied(), circular);
        order.retain(|cell| cells.contains(cell));
        order
    }

    /// Depth-first post-order over formula precedents, skipping circular cells
    fn post_order(
        &self,
        roots: impl IntoIterator<Item = CellAddress>,
        circular: &BTreeSet<CellAddress>,
    ) -> Vec<CellAddress> {
        let mut order = Vec::with_capacity(self.precedents.len());
        let mut visited = BTreeSet::new();

        for root in roots {
            if !self.is_formula(root) || circular.contains(&root) || !visited.insert(root) {
                continue;
            }

            let mut stack = vec![(root, self.precedents.get(&root).unwrap_or(&NO_CELLS).iter())];
            while let Some((cell, pending)) = stack.last_mut() {
                match pending.next() {
                    Some(&next) => {
                        if self.is_formula(next) && !circular.contains(&next) && visited.insert(next) {
                            stack.push((next, self.precedents.get(&next).unwrap_or(&NO_CELLS).iter()));
                        }
                    }
                    None => {
                        order.push(*cell);
                        stack.pop();
                    }
                }
            }
        }

        order
    }

    /// Formula cells whose value can change when `changed` cells change
    ///
    /// Follows dependents transitively; changed cells that are formulas are
    /// part of the result.
    pub fn dependents_closure(
        &self,
        changed: impl IntoIterator<Item = CellAddress>,
    ) -> BTreeSet<CellAddress> {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<CellAddress> = changed.into_iter().collect();
        let mut seen: BTreeSet<CellAddress> = queue.iter().copied().collect();

        while let Some(cell) = queue.pop_front() {
            if self.is_formula(cell) {
                reached.insert(cell);
            }
            for dependent in self.dependents_of(cell) {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        reached
    }
}
