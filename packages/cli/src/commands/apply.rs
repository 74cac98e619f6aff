use super::{open_document, save_document};
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use revisor_editor::ExecResult;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Document to revise
    pub input: PathBuf,

    /// JSON file holding one operation or an array of them ("-" reads stdin)
    pub ops: PathBuf,

    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Accept every pending change after applying
    #[arg(long, conflicts_with_all = ["reject_all", "dry_run"])]
    pub accept_all: bool,

    /// Reject every pending change after applying
    #[arg(long, conflicts_with = "dry_run")]
    pub reject_all: bool,

    /// Where to write the revised document (defaults to the input file)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Print the batch result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn apply(args: ApplyArgs, config: &Config) -> Result<()> {
    let ops = read_ops(&args.ops)?;
    let mut engine = open_document(&args.input, config)?;

    let result = engine.apply_json(&ops, args.dry_run)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    let resolved = if args.accept_all {
        engine.accept_all()
    } else if args.reject_all {
        engine.reject_all()
    } else {
        Vec::new()
    };
    if !resolved.is_empty() && !args.json {
        let verb = if args.accept_all { "Accepted" } else { "Rejected" };
        println!("   {} {} change(s)", verb.green(), resolved.len());
    }

    let changed = !result.change_ids().is_empty() || !resolved.is_empty();
    if changed && !args.dry_run {
        let output = args.out.as_ref().unwrap_or(&args.input);
        save_document(output, &engine)?;
        if !args.json {
            println!("   {} {}", "Wrote".green(), output.display());
        }
    }

    Ok(())
}

fn read_ops(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut ops = String::new();
        std::io::stdin()
            .read_to_string(&mut ops)
            .context("Failed to read operations from stdin")?;
        return Ok(ops);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read operations from {}", path.display()))
}

fn print_result(result: &ExecResult) {
    for outcome in &result.outcomes {
        let mark = if outcome.success { "✓".green() } else { "✗".red() };
        let op = format!("[{}] {}", outcome.index, outcome.op_type).bold();
        println!("{} {} {}", mark, op, outcome.message);
        for id in &outcome.change_ids {
            println!("     {} {}", "change".dimmed(), id);
        }
    }

    println!();
    let label = if result.success {
        "Done".green().bold()
    } else {
        "Done".yellow().bold()
    };
    println!("✨ {} {}", label, result.message);
}
