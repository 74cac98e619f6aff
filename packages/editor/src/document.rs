//! # Content Synchronization Cell
//!
//! Single authoritative handle to the current document state. Every engine
//! call reads through `current()` and writes through `edit()`/`commit()`, so
//! operation N+1 always sees what operation N left behind, whether or not
//! the caller re-fetched anything in between.
//!
//! ## Lifecycle
//!
//! ```text
//! open → DocumentState ──edit(op)──▶ DocumentState' ──edit(op)──▶ ...
//!                          │ Err
//!                          └──▶ unchanged
//! ```
//!
//! `edit` runs the closure against a working copy and commits it only on
//! success, so a failed operation leaves no trace.

use crate::errors::EditResult;
use crate::ledger::Ledger;
use revisor_markup::ast::Document;
use revisor_markup::IDGenerator;

/// Everything an edit may touch
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub doc: Document,
    pub ledger: Ledger,
    /// Ids for new blocks
    pub block_ids: IDGenerator,
    /// Ids for new changes
    pub change_ids: IDGenerator,
    /// Block ids chosen on the review surface, used by `scope: "selection"`
    pub selection: Vec<String>,
}

impl DocumentState {
    pub fn new(doc: Document, block_ids: IDGenerator, change_ids: IDGenerator) -> Self {
        Self {
            doc,
            ledger: Ledger::new(),
            block_ids,
            change_ids,
            selection: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ContentCell {
    state: DocumentState,
    /// Current version number (increments on each commit)
    version: u64,
}

impl ContentCell {
    pub fn new(state: DocumentState) -> Self {
        Self { state, version: 0 }
    }

    pub fn current(&self) -> &DocumentState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the state wholesale
    pub fn commit(&mut self, state: DocumentState) -> u64 {
        self.state = state;
        self.version += 1;
        self.version
    }

    /// Run `f` against a working copy and commit it if `f` succeeds
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut DocumentState) -> EditResult<T>) -> EditResult<T> {
        let mut working = self.state.clone();
        let value = f(&mut working)?;
        self.commit(working);
        Ok(value)
    }

    /// Run `f` against a throwaway copy; the cell never changes
    pub fn preview<T>(&self, f: impl FnOnce(&mut DocumentState) -> EditResult<T>) -> EditResult<T> {
        let mut scratch = self.state.clone();
        f(&mut scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EditError;
    use revisor_markup::parse;

    fn cell() -> ContentCell {
        let doc = parse("<p>One</p>").unwrap();
        ContentCell::new(DocumentState::new(
            doc,
            IDGenerator::from_seed("b"),
            IDGenerator::from_seed("c"),
        ))
    }

    #[test]
    fn test_edit_commits_on_success() {
        let mut cell = cell();
        cell.edit(|state| {
            state.doc.blocks.clear();
            Ok(())
        })
        .unwrap();

        assert!(cell.current().doc.blocks.is_empty());
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn test_failed_edit_leaves_no_trace() {
        let mut cell = cell();
        let result: EditResult<()> = cell.edit(|state| {
            state.doc.blocks.clear();
            Err(EditError::NotFound("x".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(cell.current().doc.blocks.len(), 1);
        assert_eq!(cell.version(), 0);
    }

    #[test]
    fn test_preview_never_changes_state() {
        let cell = cell();
        let count = cell
            .preview(|state| {
                state.doc.blocks.clear();
                Ok(state.doc.blocks.len())
            })
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(cell.current().doc.blocks.len(), 1);
    }
}
