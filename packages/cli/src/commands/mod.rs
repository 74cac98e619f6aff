pub mod apply;
pub mod changes;
pub mod outline;
pub mod resolve;
pub mod text;

pub use apply::{apply, ApplyArgs};
pub use changes::{changes, ChangesArgs};
pub use outline::{outline, OutlineArgs};
pub use resolve::{resolve, ResolveArgs};
pub use text::{text, TextArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use revisor_editor::Engine;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Open a document file with the configured engine options
pub fn open_document(path: &Path, config: &Config) -> Result<Engine> {
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let engine = Engine::open(&path.to_string_lossy(), &source, config.engine_options())
        .with_context(|| format!("Failed to open {}", path.display()))?;
    debug!(path = %path.display(), pending = engine.list().len(), "opened document");
    Ok(engine)
}

/// Write the document, change markers included
pub fn save_document(path: &Path, engine: &Engine) -> Result<()> {
    fs::write(path, engine.serialize()).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), version = engine.version(), "saved document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.rvx");
        fs::write(&path, "<p>Hello world.</p>").unwrap();

        let engine = open_document(&path, &Config::default()).unwrap();
        assert_eq!(engine.get_latest_plain_text(), "Hello world.");

        save_document(&path, &engine).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<p>Hello world.</p>\n");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_document(&dir.path().join("missing.rvx"), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
