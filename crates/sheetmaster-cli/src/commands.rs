//! Subcommand implementations
//!
//! Each command writes its report to `out` so it can be exercised without a
//! terminal.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use sheetmaster::{
    apply_merge, diff_values, prepare_merge, ConflictPick, RecomputeMode, RecomputeOptions,
    Recomputer, SheetState,
};
use sheetmaster_formula::{evaluate_formula, DependencyGraph, EvaluationContext};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read a sheet from a JSON file
pub fn load_sheet(path: &Path) -> Result<SheetState> {
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let state: SheetState = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse sheet '{}'", path.display()))?;
    debug!("loaded {} cells from {}", state.grid.len(), path.display());
    Ok(state)
}

/// Write a sheet as JSON to `output`, or to `out` when no path is given
fn write_sheet(state: &SheetState, output: Option<&Path>, pretty: bool, out: &mut dyn Write) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_json(state, pretty, &mut writer)?;
            writer.flush()?;
            info!("wrote {}", path.display());
        }
        None => write_json(state, pretty, out)?,
    }
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T, pretty: bool, out: &mut dyn Write) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

pub fn recompute(
    input: &Path,
    output: Option<&Path>,
    incremental_from: Option<&Path>,
    max_range_cells: u64,
    pretty: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let mut state = load_sheet(input)?;
    let previous = incremental_from.map(load_sheet).transpose()?;

    let recomputer = Recomputer::new(RecomputeOptions {
        max_range_cells,
        mode: if previous.is_some() {
            RecomputeMode::Incremental
        } else {
            RecomputeMode::Full
        },
    });
    let (grid, stats) = recomputer.update(&state.grid, previous.as_ref().map(|p| &p.grid));
    state.grid = grid;

    eprintln!(
        "Calculated {} of {} formulas ({} errors, {} circular)",
        stats.cells_calculated, stats.formula_count, stats.errors, stats.circular_cells
    );
    write_sheet(&state, output, pretty, out)
}

pub fn eval(formula: &str, sheet: Option<&Path>, out: &mut dyn Write) -> Result<()> {
    let formula = if formula.starts_with('=') {
        formula.to_string()
    } else {
        format!("={}", formula)
    };

    let value = match sheet {
        Some(path) => {
            let grid = sheetmaster::recompute(&load_sheet(path)?.grid);
            evaluate_formula(&formula, &EvaluationContext::new(&grid))
        }
        None => evaluate_formula(&formula, &EvaluationContext::simple()),
    };
    writeln!(out, "{}", value)?;
    Ok(())
}

pub fn deps(input: &Path, out: &mut dyn Write) -> Result<()> {
    let state = load_sheet(input)?;
    let graph = DependencyGraph::build(&state.grid, sheetmaster_formula::DEFAULT_MAX_RANGE_CELLS);

    for cell in graph.formula_cells() {
        let precedents: Vec<String> = graph.precedents_of(cell).map(|p| p.to_string()).collect();
        let volatile = if graph.volatile_cells().any(|v| v == cell) {
            " (volatile)"
        } else {
            ""
        };
        writeln!(out, "{}{} <- {}", cell, volatile, precedents.join(", "))?;
    }

    let circular = graph.find_circular();
    if !circular.is_empty() {
        let cells: Vec<String> = circular.iter().map(|c| c.to_string()).collect();
        writeln!(out, "circular: {}", cells.join(", "))?;
    }
    Ok(())
}

/// Parse `ROW,COL=main|branch` conflict picks
pub fn parse_picks(picks: &[String]) -> Result<BTreeMap<String, ConflictPick>> {
    picks
        .iter()
        .map(|pick| {
            let Some((id, side)) = pick.rsplit_once('=') else {
                bail!("Invalid pick '{}': expected ROW,COL=main|branch", pick);
            };
            let side: ConflictPick = side.parse()?;
            Ok((id.trim().to_string(), side))
        })
        .collect()
}

pub fn merge(
    [base, main, branch]: [&Path; 3],
    picks: &BTreeMap<String, ConflictPick>,
    apply: bool,
    max_range_cells: u64,
    output: Option<&Path>,
    pretty: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let base = load_sheet(base)?;
    let main = load_sheet(main)?;
    let branch = load_sheet(branch)?;

    let result = prepare_merge(&base, &main, &branch).context("Merge failed")?;
    eprintln!(
        "Applied {} cells and {} layout entries from branch; {} conflicts",
        result.applied,
        result.applied_meta,
        result.conflicts.len()
    );

    if !apply {
        return write_json(&result.conflicts, pretty, out);
    }

    let unresolved = result
        .conflicts
        .iter()
        .filter(|c| !picks.contains_key(&c.id))
        .count();
    if unresolved > 0 {
        eprintln!("{} unpicked conflicts keep main", unresolved);
    }

    let recomputer = Recomputer::new(RecomputeOptions {
        max_range_cells,
        ..Default::default()
    });
    let merged = apply_merge(result, picks, &recomputer).context("Failed to apply conflict picks")?;
    write_sheet(&merged, output, pretty, out)
}

pub fn diff(before: &Path, after: &Path, out: &mut dyn Write) -> Result<()> {
    let before = load_sheet(before)?;
    let after = load_sheet(after)?;

    for change in diff_values(&before.grid, &after.grid) {
        writeln!(out, "{}: {:?} -> {:?}", change.address, change.before, change.after)?;
    }
    Ok(())
}
