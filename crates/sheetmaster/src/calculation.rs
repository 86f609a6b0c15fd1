//! Sheet recompute engine
//!
//! Regenerates every derived (`computed`) value of a grid from the raw inputs,
//! with dependency ordering and circular reference detection.
//!
//! A full recompute runs in five phases:
//! 1. literal cells get their coerced value
//! 2. the dependency graph is rebuilt from every formula
//! 3. cycle members are stamped `#CIRCULAR!`
//! 4. the remaining formulas are put in dependency order
//! 5. formulas are evaluated in that order, each reading finalized values
//!
//! The incremental mode re-evaluates only the formulas reachable from changed
//! cells, and falls back to a full pass whenever it cannot prove the result
//! would be identical.
//!
//! # Example
//!
//! ```rust
//! use sheetmaster::calculation::recompute;
//! use sheetmaster::{CellAddress, ComputedValue, Grid};
//!
//! let mut grid = Grid::new();
//! grid.set_value(CellAddress::new(0, 0), "5").unwrap();
//! grid.set_value(CellAddress::new(0, 1), "=A1*2").unwrap();
//!
//! let grid = recompute(&grid);
//! assert_eq!(grid.computed(CellAddress::new(0, 1)), Some(&ComputedValue::Number(10.0)));
//! ```

use serde::Serialize;
use sheetmaster_core::{diff_values, Cell, CellAddress, CellError, ComputedValue, Grid};
use sheetmaster_formula::{evaluate_formula, DependencyGraph, EvaluationContext, DEFAULT_MAX_RANGE_CELLS};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// How [`Recomputer::update`] brings a grid up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecomputeMode {
    /// Re-evaluate every formula
    #[default]
    Full,
    /// Re-evaluate only formulas affected by changed cells
    Incremental,
}

/// Options for recomputation
#[derive(Debug, Clone)]
pub struct RecomputeOptions {
    /// Largest number of cells a single range may expand to
    pub max_range_cells: u64,
    /// Strategy used by [`Recomputer::update`]
    pub mode: RecomputeMode,
}

impl Default for RecomputeOptions {
    fn default() -> Self {
        Self {
            max_range_cells: DEFAULT_MAX_RANGE_CELLS,
            mode: RecomputeMode::Full,
        }
    }
}

/// Statistics from a recompute run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeStats {
    /// Total number of formula cells
    pub formula_count: usize,
    /// Number of formulas evaluated
    pub cells_calculated: usize,
    /// Number of cells stamped `#CIRCULAR!`
    pub circular_cells: usize,
    /// Number of evaluated formulas that produced an error value
    pub errors: usize,
    /// Formulas selected for re-evaluation by an incremental pass
    pub dirty_cells: usize,
}

/// The recompute engine
#[derive(Debug, Clone, Default)]
pub struct Recomputer {
    options: RecomputeOptions,
}

impl Recomputer {
    /// Create an engine with the given options
    pub fn new(options: RecomputeOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &RecomputeOptions {
        &self.options
    }

    /// Recompute every cell of `grid`
    pub fn recompute(&self, grid: &Grid) -> (Grid, RecomputeStats) {
        let mut out = grid.clone();
        let mut stats = RecomputeStats::default();

        // Phase 1: literals
        for (_, cell) in out.cells_mut() {
            if !cell.is_formula() {
                cell.computed = ComputedValue::from_literal(&cell.value);
            }
        }

        // Phase 2: dependency graph
        let graph = DependencyGraph::build(&out, self.options.max_range_cells);
        stats.formula_count = graph.len();
        if graph.is_empty() {
            return (out, stats);
        }

        // Phase 3: cycles
        let circular = graph.find_circular();
        for &addr in &circular {
            out.set_computed(addr, ComputedValue::Error(CellError::Circular));
        }
        stats.circular_cells = circular.len();

        // Phase 4 and 5: ordered evaluation
        let order = graph.evaluation_order(&circular);
        stats.dirty_cells = order.len();
        self.evaluate_cells(&mut out, &order, &mut stats);

        debug!(
            formulas = stats.formula_count,
            calculated = stats.cells_calculated,
            circular = stats.circular_cells,
            errors = stats.errors,
            "full recompute finished"
        );
        (out, stats)
    }

    /// Recompute `grid` given `previous`, a fully recomputed earlier version
    ///
    /// Cells whose raw value differs between the two are the changed set. Only
    /// formulas reachable from them (plus volatile formulas) are re-evaluated;
    /// every other formula keeps its value from `previous`. Falls back to a
    /// full recompute when the grid was resized, when a changed cell is or was
    /// a formula, or when the affected formulas touch a cycle.
    pub fn recompute_changed(&self, grid: &Grid, previous: &Grid) -> (Grid, RecomputeStats) {
        // Bounds decide which references are #REF!
        if grid.row_count() != previous.row_count() || grid.col_count() != previous.col_count() {
            debug!(
                rows = grid.row_count(),
                previous_rows = previous.row_count(),
                "grid resized; falling back to full recompute"
            );
            return self.recompute(grid);
        }

        let changed = changed_cells(previous, grid);

        let is_formula = |g: &Grid, addr: CellAddress| g.get(addr).map_or(false, Cell::is_formula);
        if let Some(addr) = changed
            .iter()
            .find(|addr| is_formula(grid, **addr) || is_formula(previous, **addr))
        {
            debug!(cell = %addr, "formula edited; falling back to full recompute");
            return self.recompute(grid);
        }

        let mut out = grid.clone();
        for (addr, cell) in out.cells_mut() {
            cell.computed = if cell.is_formula() {
                previous.computed(addr).cloned().unwrap_or_default()
            } else {
                ComputedValue::from_literal(&cell.value)
            };
        }

        let graph = DependencyGraph::build(&out, self.options.max_range_cells);
        let circular = graph.find_circular();

        let roots = changed.iter().copied().chain(graph.volatile_cells());
        let dirty = graph.dependents_closure(roots);
        if dirty.iter().any(|addr| circular.contains(addr)) {
            debug!("change reaches a circular reference; falling back to full recompute");
            return self.recompute(grid);
        }

        let mut stats = RecomputeStats {
            formula_count: graph.len(),
            circular_cells: circular.len(),
            dirty_cells: dirty.len(),
            ..Default::default()
        };

        let order = graph.evaluation_order_for(&dirty, &circular);
        self.evaluate_cells(&mut out, &order, &mut stats);

        debug!(
            changed = changed.len(),
            dirty = stats.dirty_cells,
            calculated = stats.cells_calculated,
            "incremental recompute finished"
        );
        (out, stats)
    }

    /// Bring `grid` up to date using the configured [`RecomputeMode`]
    ///
    /// Incremental mode needs the previous recomputed grid; without it a full
    /// pass runs.
    pub fn update(&self, grid: &Grid, previous: Option<&Grid>) -> (Grid, RecomputeStats) {
        match (self.options.mode, previous) {
            (RecomputeMode::Incremental, Some(previous)) => self.recompute_changed(grid, previous),
            _ => self.recompute(grid),
        }
    }

    /// Evaluate formulas in order, writing each result before the next runs
    fn evaluate_cells(&self, grid: &mut Grid, order: &[CellAddress], stats: &mut RecomputeStats) {
        for &addr in order {
            let value = {
                let Some(formula) = grid.get(addr).and_then(Cell::formula) else {
                    continue;
                };
                let ctx = EvaluationContext::new(grid).with_max_range_cells(self.options.max_range_cells);
                evaluate_formula(formula, &ctx)
            };

            trace!(cell = %addr, value = %value, "evaluated");
            if value.is_error() {
                stats.errors += 1;
            }
            grid.set_computed(addr, value);
            stats.cells_calculated += 1;
        }
    }
}

/// Recompute a grid with default options
pub fn recompute(grid: &Grid) -> Grid {
    Recomputer::default().recompute(grid).0
}

/// Changed cells between two grids, as a set
pub fn changed_cells(previous: &Grid, grid: &Grid) -> BTreeSet<CellAddress> {
    diff_values(previous, grid)
        .into_iter()
        .map(|change| change.address)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn a(label: &str) -> CellAddress {
        CellAddress::parse(label).unwrap()
    }

    fn grid(cells: &[(&str, &str)]) -> Grid {
        let mut grid = Grid::new();
        for (label, value) in cells {
            grid.set_value(a(label), *value).unwrap();
        }
        grid
    }

    fn computed(grid: &Grid, label: &str) -> ComputedValue {
        grid.computed(a(label)).cloned().unwrap_or_default()
    }

    #[test]
    fn test_literals_are_coerced() {
        let out = recompute(&grid(&[("A1", " 42 "), ("A2", "hello"), ("A3", "1e3")]));
        assert_eq!(computed(&out, "A1"), ComputedValue::Number(42.0));
        assert_eq!(computed(&out, "A2"), ComputedValue::Text("hello".into()));
        assert_eq!(computed(&out, "A3"), ComputedValue::Number(1000.0));
    }

    #[test]
    fn test_chain_is_ordered() {
        let (out, stats) = Recomputer::default().recompute(&grid(&[
            ("A1", "=B1+1"),
            ("B1", "=C1*2"),
            ("C1", "3"),
        ]));
        assert_eq!(computed(&out, "B1"), ComputedValue::Number(6.0));
        assert_eq!(computed(&out, "A1"), ComputedValue::Number(7.0));
        assert_eq!(stats.formula_count, 2);
        assert_eq!(stats.cells_calculated, 2);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_circular_cells_and_downstream() {
        let (out, stats) = Recomputer::default().recompute(&grid(&[
            ("A1", "=B1"),
            ("B1", "=A1"),
            ("C1", "=A1+1"),
            ("D1", "=IFERROR(A1,0)"),
        ]));
        assert_eq!(computed(&out, "A1"), ComputedValue::Error(CellError::Circular));
        assert_eq!(computed(&out, "B1"), ComputedValue::Error(CellError::Circular));
        assert_eq!(computed(&out, "C1"), ComputedValue::Error(CellError::Circular));
        assert_eq!(computed(&out, "D1"), ComputedValue::Number(0.0));
        assert_eq!(stats.circular_cells, 2);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_errors_stay_in_their_cells() {
        let out = recompute(&grid(&[
            ("A1", "=1/0"),
            ("A2", "=FOO(1)"),
            ("A3", "=SUM(A1:"),
            ("A4", "=2+2"),
        ]));
        assert_eq!(computed(&out, "A1"), ComputedValue::Error(CellError::Div0));
        assert_eq!(computed(&out, "A2"), ComputedValue::Error(CellError::Generic));
        assert_eq!(computed(&out, "A4"), ComputedValue::Number(4.0));
        assert!(computed(&out, "A3").is_error());
    }

    #[test]
    fn test_deeply_nested_formula_is_contained() {
        let deep = format!("={}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let out = recompute(&grid(&[("A1", "2"), ("B1", &deep), ("C1", "=A1*3"), ("D1", "=B1")]));
        assert_eq!(computed(&out, "B1"), ComputedValue::Error(CellError::Generic));
        assert_eq!(computed(&out, "C1"), ComputedValue::Number(6.0));
        assert_eq!(computed(&out, "D1"), ComputedValue::Error(CellError::Generic));
    }

    #[test]
    fn test_range_ceiling() {
        let recomputer = Recomputer::new(RecomputeOptions {
            max_range_cells: 10,
            ..Default::default()
        });
        let (out, _) = recomputer.recompute(&grid(&[("A1", "=SUM(B1:B20)"), ("A2", "=SUM(B1:B5)")]));
        assert_eq!(computed(&out, "A1"), ComputedValue::Error(CellError::Ref));
        assert_eq!(computed(&out, "A2"), ComputedValue::Number(0.0));
    }

    #[test]
    fn test_incremental_matches_full() {
        let recomputer = Recomputer::default();
        let base = grid(&[
            ("A1", "1"),
            ("A2", "2"),
            ("B1", "=A1*10"),
            ("B2", "=A2*10"),
            ("C1", "=B1+B2"),
        ]);
        let (previous, _) = recomputer.recompute(&base);

        let mut edited = previous.clone();
        edited.set_value(a("A1"), "5").unwrap();

        let (incremental, stats) = recomputer.recompute_changed(&edited, &previous);
        assert_eq!(incremental, recomputer.recompute(&edited).0);
        assert_eq!(computed(&incremental, "C1"), ComputedValue::Number(70.0));
        assert_eq!(stats.dirty_cells, 2);
        assert_eq!(stats.cells_calculated, 2);
    }

    #[test]
    fn test_incremental_falls_back_on_formula_edit() {
        let recomputer = Recomputer::default();
        let (previous, _) = recomputer.recompute(&grid(&[("A1", "1"), ("B1", "=A1")]));

        let mut edited = previous.clone();
        edited.set_value(a("B1"), "=A1+1").unwrap();

        let (out, stats) = recomputer.recompute_changed(&edited, &previous);
        assert_eq!(computed(&out, "B1"), ComputedValue::Number(2.0));
        assert_eq!(stats.cells_calculated, stats.formula_count);
    }

    #[test]
    fn test_incremental_falls_back_on_resize() {
        let recomputer = Recomputer::default();
        let mut small = Grid::with_size(100, 26);
        small.set_value(a("A1"), "1").unwrap();
        small.set_value(a("B1"), "=A150").unwrap();
        small.set_value(a("C1"), "=SUM(A1:A150)").unwrap();
        let (previous, _) = recomputer.recompute(&small);
        assert_eq!(computed(&previous, "B1"), ComputedValue::Error(CellError::Ref));

        let mut grown = previous.clone();
        grown.ensure_rows(200);
        grown.set_value(a("D200"), "x").unwrap();

        let (incremental, stats) = recomputer.recompute_changed(&grown, &previous);
        assert_eq!(incremental, recomputer.recompute(&grown).0);
        assert_eq!(computed(&incremental, "B1"), ComputedValue::Number(0.0));
        assert_eq!(computed(&incremental, "C1"), ComputedValue::Number(1.0));
        assert_eq!(stats.cells_calculated, stats.formula_count);
    }

    #[test]
    fn test_update_dispatches_on_mode() {
        let incremental = Recomputer::new(RecomputeOptions {
            mode: RecomputeMode::Incremental,
            ..Default::default()
        });
        let (previous, _) = incremental.recompute(&grid(&[("A1", "1"), ("B1", "=A1"), ("C1", "=7")]));

        let mut edited = previous.clone();
        edited.set_value(a("A1"), "2").unwrap();

        let (out, stats) = incremental.update(&edited, Some(&previous));
        assert_eq!(computed(&out, "B1"), ComputedValue::Number(2.0));
        assert_eq!(stats.cells_calculated, 1);

        let (_, stats) = incremental.update(&edited, None);
        assert_eq!(stats.cells_calculated, 2);
    }

    #[test]
    fn test_changed_cells() {
        let before = grid(&[("A1", "1"), ("B1", "x")]);
        let after = grid(&[("A1", "1"), ("B1", "y"), ("C1", "z")]);
        assert_eq!(changed_cells(&before, &after), [a("B1"), a("C1")].into_iter().collect());
    }
}
