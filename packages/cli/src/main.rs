mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{
    apply, changes, outline, resolve, text, ApplyArgs, ChangesArgs, OutlineArgs, ResolveArgs, TextArgs,
};
use config::Config;
use tracing_subscriber::EnvFilter;

/// Revisor CLI - tracked-change editing for documents
#[derive(Parser, Debug)]
#[command(name = "revisor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a batch of operations as tracked changes
    Apply(ApplyArgs),

    /// List pending changes
    Changes(ChangesArgs),

    /// Accept or reject pending changes
    Resolve(ResolveArgs),

    /// Print the document text with every change accepted
    Text(TextArgs),

    /// Print the heading outline
    Outline(OutlineArgs),
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?.display().to_string();
    let config = Config::load(&cwd)?;
    init_logging(&config);

    match cli.command {
        Command::Apply(args) => apply(args, &config),
        Command::Changes(args) => changes(args, &config),
        Command::Resolve(args) => resolve(args, &config),
        Command::Text(args) => text(args, &config),
        Command::Outline(args) => outline(args, &config),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
