//! # Revisor Editor
//!
//! Tracked-change revision engine for revisor documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ markup: text → Document tree, flattening    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: operations → tracked changes        │
//! │  - Locate text across runs (matcher)        │
//! │  - Wrap edits in old/new pairs (annotator)  │
//! │  - Dispatch operation kinds (executor)      │
//! │  - Accept/reject with dependencies (ledger) │
//! │  - One authoritative state (document)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Nothing is destroyed until accepted**: every edit keeps the original
//!    content beside the proposal
//! 2. **Proposed view is what later edits see**: matching runs over the
//!    document as if every pending change were accepted
//! 3. **Best-effort batches**: an operation that cannot apply is skipped with
//!    a reason and leaves no trace
//!
//! ## Usage
//!
//! ```rust,ignore
//! use revisor_editor::{Engine, EngineOptions, Operation, Target};
//! use serde_json::json;
//!
//! let mut engine = Engine::open("report.docx", "<p>Hello world.</p>", EngineOptions::default())?;
//!
//! let op = Operation::new("replace_text", Target::text("world"), json!({ "replace": "earth" }));
//! let result = engine.apply(&[op], false);
//!
//! for change in engine.list() {
//!     println!("{}: {}", change.id, change.summary);
//! }
//! engine.accept(&result.change_ids()[0])?;
//! ```

mod annotator;
mod document;
mod engine;
mod errors;
mod executor;
mod ledger;
mod matcher;
mod operations;
mod scope;

pub use annotator::{annotate_block, annotate_inline, dominant_marks, proposed_runs, DiffPair, RegionSummary};
pub use document::{ContentCell, DocumentState};
pub use engine::{Engine, EngineOptions, ExecResult, OpOutcome};
pub use errors::{EditError, EditResult, EditorError};
pub use executor::{outline, Executor, OpReport};
pub use ledger::{preview, recover, ChangeKind, ChangeRecord, Ledger, Resolution, SettingChange, SettingKey};
pub use matcher::{find_all, MatchOptions, MatchSpan};
pub use operations::*;
pub use scope::{all_blocks, BlockRef};

pub use revisor_markup as markup;
