use super::{open_document, save_document};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use revisor_editor::Engine;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Document holding the changes
    pub input: PathBuf,

    /// Change ids to accept
    #[arg(long, value_name = "ID")]
    pub accept: Vec<String>,

    /// Change ids to reject
    #[arg(long, value_name = "ID")]
    pub reject: Vec<String>,

    /// Accept every pending change
    #[arg(long, conflicts_with_all = ["accept", "reject", "reject_all"])]
    pub accept_all: bool,

    /// Reject every pending change
    #[arg(long, conflicts_with_all = ["accept", "reject"])]
    pub reject_all: bool,

    /// Where to write the document (defaults to the input file)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn resolve(args: ResolveArgs, config: &Config) -> Result<()> {
    if args.accept.is_empty() && args.reject.is_empty() && !args.accept_all && !args.reject_all {
        return Err(anyhow!("Nothing to resolve: pass --accept, --reject, --accept-all or --reject-all"));
    }

    let mut engine = open_document(&args.input, config)?;
    let mut resolved = Vec::new();

    if args.accept_all {
        report("Accepted", &engine.accept_all(), &mut resolved);
    } else if args.reject_all {
        report("Rejected", &engine.reject_all(), &mut resolved);
    } else {
        for id in &args.accept {
            resolve_one(&mut engine, id, true, &mut resolved);
        }
        for id in &args.reject {
            resolve_one(&mut engine, id, false, &mut resolved);
        }
    }

    if !resolved.is_empty() {
        let output = args.out.as_ref().unwrap_or(&args.input);
        save_document(output, &engine)?;
        println!();
        println!("   {} {}", "Wrote".green(), output.display());
    }
    println!("   {} change(s) still pending", engine.list().len());

    Ok(())
}

fn resolve_one(engine: &mut Engine, id: &str, accept: bool, resolved: &mut Vec<String>) {
    // Already resolved by an earlier cascade
    if resolved.iter().any(|r| r == id) {
        return;
    }

    let (verb, result) = if accept {
        ("Accepted", engine.accept(id))
    } else {
        ("Rejected", engine.reject(id))
    };
    match result {
        Ok(ids) => report(verb, &ids, resolved),
        Err(err) => println!("{} {}", "✗".red(), err),
    }
}

fn report(verb: &str, ids: &[String], resolved: &mut Vec<String>) {
    for id in ids {
        println!("{} {} {}", "✓".green(), verb, id);
    }
    resolved.extend_from_slice(ids);
}
