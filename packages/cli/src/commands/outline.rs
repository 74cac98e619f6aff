use super::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct OutlineArgs {
    /// Document to read
    pub input: PathBuf,

    /// Print the outline as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn outline(args: OutlineArgs, config: &Config) -> Result<()> {
    let engine = open_document(&args.input, config)?;
    let entries = engine.outline();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}", "No headings".dimmed());
    }
    for entry in entries {
        let indent = "  ".repeat(usize::from(entry.level.saturating_sub(1)));
        println!("{}{} {}", indent, format!("H{}", entry.level).dimmed(), entry.text);
    }
    Ok(())
}
