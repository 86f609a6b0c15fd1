//! Sheetmaster CLI - recompute, inspect and merge sheet files

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetmaster")]
#[command(author, version, about = "Recompute, inspect and merge spreadsheet state files")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute every cell of a sheet file
    Recompute {
        /// Input sheet (JSON)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recompute incrementally against this earlier, recomputed sheet
        #[arg(long, value_name = "PREVIOUS")]
        incremental_from: Option<PathBuf>,

        /// Largest number of cells a single range may expand to
        #[arg(long, default_value_t = sheetmaster_formula::DEFAULT_MAX_RANGE_CELLS)]
        max_range_cells: u64,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Evaluate one formula, optionally against a sheet
    Eval {
        /// Formula text, with or without the leading '='
        formula: String,

        /// Sheet to read references from
        #[arg(short, long)]
        sheet: Option<PathBuf>,
    },

    /// Show each formula's precedents and any circular references
    Deps {
        /// Input sheet (JSON)
        input: PathBuf,
    },

    /// Three-way merge a branch into main
    Merge {
        /// Common ancestor sheet
        base: PathBuf,
        /// Main sheet
        main: PathBuf,
        /// Branch sheet
        branch: PathBuf,

        /// Resolve a conflict, as ROW,COL=main|branch
        #[arg(long = "pick", value_name = "ID=SIDE")]
        picks: Vec<String>,

        /// Write the merged, recomputed sheet instead of listing conflicts
        #[arg(long)]
        apply: bool,

        /// Largest number of cells a single range may expand to
        #[arg(long, default_value_t = sheetmaster_formula::DEFAULT_MAX_RANGE_CELLS)]
        max_range_cells: u64,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List cells whose raw value differs between two sheets
    Diff {
        before: PathBuf,
        after: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Recompute {
            input,
            output,
            incremental_from,
            max_range_cells,
            pretty,
        } => commands::recompute(
            &input,
            output.as_deref(),
            incremental_from.as_deref(),
            max_range_cells,
            pretty,
            &mut out,
        ),
        Commands::Eval { formula, sheet } => commands::eval(&formula, sheet.as_deref(), &mut out),
        Commands::Deps { input } => commands::deps(&input, &mut out),
        Commands::Merge {
            base,
            main,
            branch,
            picks,
            apply,
            max_range_cells,
            output,
            pretty,
        } => {
            let picks = commands::parse_picks(&picks)?;
            commands::merge(
                [base.as_path(), main.as_path(), branch.as_path()],
                &picks,
                apply,
                max_range_cells,
                output.as_deref(),
                pretty,
                &mut out,
            )
        }
        Commands::Diff { before, after } => commands::diff(&before, &after, &mut out),
    }
}
