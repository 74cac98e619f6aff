use super::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ChangesArgs {
    /// Document to inspect
    pub input: PathBuf,

    /// Print the changes as JSON
    #[arg(long)]
    pub json: bool,
}

/// List pending changes, oldest first
pub fn changes(args: ChangesArgs, config: &Config) -> Result<()> {
    let engine = open_document(&args.input, config)?;
    let changes = engine.list();

    if args.json {
        println!("{}", serde_json::to_string_pretty(changes)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("{} No pending changes", "✓".green());
        return Ok(());
    }

    for change in changes {
        println!("{} {}", change.id.bold(), change.summary);
        println!("   {} {}", "kind:".dimmed(), change.kind.as_str());
        if !change.before_preview.is_empty() {
            println!("   {} {}", "-".red(), change.before_preview);
        }
        if !change.after_preview.is_empty() {
            println!("   {} {}", "+".green(), change.after_preview);
        }
        if !change.depends_on.is_empty() {
            println!("   {} {}", "depends on:".dimmed(), change.depends_on.join(", "));
        }
    }
    println!();
    println!("   {} pending change(s)", changes.len());

    Ok(())
}
