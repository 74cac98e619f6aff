use super::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TextArgs {
    /// Document to read
    pub input: PathBuf,
}

/// Print the plain text with every pending change accepted
pub fn text(args: TextArgs, config: &Config) -> Result<()> {
    let engine = open_document(&args.input, config)?;
    println!("{}", engine.get_latest_plain_text());
    Ok(())
}
