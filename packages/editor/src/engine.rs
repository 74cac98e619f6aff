//! # Engine
//!
//! Public entry point. An [`Engine`] owns one document behind a
//! [`ContentCell`] and exposes operation batches, the change ledger and the
//! text views a reviewer needs.
//!
//! Operations in a batch run in order, best effort: each one either commits
//! fully or is skipped with a reason, and the next one sees the document the
//! previous one left behind.

use crate::document::{ContentCell, DocumentState};
use crate::errors::{EditError, EditResult, EditorError};
use crate::executor::{outline, Executor, OpReport};
use crate::ledger::{recover, recover_settings, ChangeRecord, Resolution};
use crate::operations::Operation;
use crate::scope::all_blocks;
use revisor_markup::ast::{Document, OutlineEntry};
use revisor_markup::{flatten, parse_with_generator, serialize, IDGenerator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    /// Retry a whitespace-bearing search with flexible whitespace when the
    /// exact search finds nothing
    pub fuzzy_whitespace: bool,
    /// Longest before/after preview stored on a change record
    pub preview_chars: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fuzzy_whitespace: true,
            preview_chars: 80,
        }
    }
}

/// Outcome of one operation in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpOutcome {
    pub index: usize,
    pub op_type: String,
    pub success: bool,
    pub message: String,
    /// Error kind when the operation was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub match_count: usize,
    pub change_ids: Vec<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OpOutcome {
    fn applied(index: usize, op_type: &str, dry_run: bool, report: OpReport) -> Self {
        Self {
            index,
            op_type: op_type.to_string(),
            success: true,
            message: report.message,
            error: None,
            match_count: report.match_count,
            change_ids: report.change_ids,
            dry_run,
            data: report.data,
        }
    }

    fn skipped(index: usize, op_type: &str, dry_run: bool, err: &EditError) -> Self {
        Self {
            index,
            op_type: op_type.to_string(),
            success: false,
            message: err.to_string(),
            error: Some(err.kind().to_string()),
            match_count: 0,
            change_ids: Vec::new(),
            dry_run,
            data: None,
        }
    }
}

/// Result of an operation batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecResult {
    /// Every operation succeeded
    pub success: bool,
    pub message: String,
    /// Data produced by the batch (the outline, for `extract_outline`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub outcomes: Vec<OpOutcome>,
}

impl ExecResult {
    fn from_outcomes(outcomes: Vec<OpOutcome>) -> Self {
        let applied = outcomes.iter().filter(|o| o.success).count();
        let skipped = outcomes.len() - applied;
        let message = match (applied, skipped) {
            (_, 0) => format!("{} operation(s) applied", applied),
            (0, _) => format!("all {} operation(s) skipped", skipped),
            _ => format!("{} operation(s) applied, {} skipped", applied, skipped),
        };
        let data = outcomes.iter().rev().find_map(|o| o.data.clone());

        Self {
            success: skipped == 0,
            message,
            data,
            outcomes,
        }
    }

    /// Total matches (or estimated changes) across the batch
    pub fn count(&self) -> usize {
        self.outcomes.iter().map(|o| o.match_count).sum()
    }

    /// Change ids created by the batch, in order
    pub fn change_ids(&self) -> Vec<String> {
        self.outcomes.iter().flat_map(|o| o.change_ids.clone()).collect()
    }
}

#[derive(Debug)]
pub struct Engine {
    name: String,
    cell: ContentCell,
    options: EngineOptions,
}

impl Engine {
    /// Open a document from markup. Change markers and pending settings
    /// already present in the markup become `Recovered` ledger entries.
    #[instrument(skip(markup, options))]
    pub fn open(name: &str, markup: &str, options: EngineOptions) -> Result<Self, EditorError> {
        let (mut doc, block_ids) = parse_with_generator(markup, IDGenerator::new(name))?;
        let mut change_ids = IDGenerator::from_seed(format!("{}-c", block_ids.seed()));

        let mut recovered = recover(&doc, options.preview_chars);
        recovered.extend(recover_settings(&mut doc));
        for record in &recovered {
            change_ids.observe(&record.id);
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "Recovered pending changes");
        }

        let mut state = DocumentState::new(doc, block_ids, change_ids);
        for record in recovered {
            state.ledger.push(record);
        }

        Ok(Self {
            name: name.to_string(),
            cell: ContentCell::new(state),
            options,
        })
    }

    /// Wrap an already-built document
    pub fn new(name: &str, mut doc: Document, options: EngineOptions) -> Self {
        let block_ids = IDGenerator::new(name);
        let mut change_ids = IDGenerator::from_seed(format!("{}-c", block_ids.seed()));
        let mut recovered = recover(&doc, options.preview_chars);
        recovered.extend(recover_settings(&mut doc));
        for record in &recovered {
            change_ids.observe(&record.id);
        }

        let mut state = DocumentState::new(doc, block_ids, change_ids);
        for block in all_blocks(&state.doc) {
            state.block_ids.observe(&block.id);
        }
        for record in recovered {
            state.ledger.push(record);
        }

        Self {
            name: name.to_string(),
            cell: ContentCell::new(state),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run a batch of operations. With `dry_run` set (or per operation),
    /// operations only report what they would do.
    #[instrument(skip(self, ops), fields(document = %self.name, ops = ops.len()))]
    pub fn apply(&mut self, ops: &[Operation], dry_run: bool) -> ExecResult {
        let outcomes = ops
            .iter()
            .enumerate()
            .map(|(index, op)| self.run(index, op, dry_run || op.dry_run))
            .collect();

        let result = ExecResult::from_outcomes(outcomes);
        info!(success = result.success, changes = result.change_ids().len(), "{}", result.message);
        result
    }

    /// Run a batch given as JSON: a single operation object or an array.
    /// Elements that do not decode as operations are skipped with
    /// `invalid_op_shape`; the rest still run.
    pub fn apply_json(&mut self, json: &str, dry_run: bool) -> Result<ExecResult, EditorError> {
        let items = match serde_json::from_str::<Value>(json)? {
            Value::Array(items) => items,
            item @ Value::Object(_) => vec![item],
            _ => {
                return Err(EditError::InvalidOpShape("expected an operation or an array of operations".to_string()).into());
            }
        };

        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let op_type = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            match serde_json::from_value::<Operation>(item) {
                Ok(op) => outcomes.push(self.run(index, &op, dry_run || op.dry_run)),
                Err(e) => {
                    let err = EditError::InvalidOpShape(e.to_string());
                    warn!(index, op_type = %op_type, error = %err, "Operation skipped");
                    outcomes.push(OpOutcome::skipped(index, &op_type, dry_run, &err));
                }
            }
        }

        let result = ExecResult::from_outcomes(outcomes);
        info!(success = result.success, changes = result.change_ids().len(), "{}", result.message);
        Ok(result)
    }

    fn run(&mut self, index: usize, op: &Operation, dry_run: bool) -> OpOutcome {
        let options = &self.options;
        let result = if dry_run {
            self.cell.preview(|state| Executor::new(state, options, true).execute(op))
        } else {
            self.cell.edit(|state| Executor::new(state, options, false).execute(op))
        };

        match result {
            Ok(report) => {
                debug!(index, op_type = %op.op_type, matches = report.match_count, "Operation applied");
                OpOutcome::applied(index, &op.op_type, dry_run, report)
            }
            Err(err) => {
                warn!(index, op_type = %op.op_type, error = %err, "Operation skipped");
                OpOutcome::skipped(index, &op.op_type, dry_run, &err)
            }
        }
    }

    /// Pending changes, oldest first
    pub fn list(&self) -> &[ChangeRecord] {
        self.cell.current().ledger.list()
    }

    pub fn get(&self, id: &str) -> Option<&ChangeRecord> {
        self.cell.current().ledger.get(id)
    }

    /// Accept a change (and, first, everything it depends on). Returns the
    /// ids resolved.
    pub fn accept(&mut self, id: &str) -> EditResult<Vec<String>> {
        self.resolve(id, Resolution::Accept)
    }

    /// Reject a change (and, first, everything that depends on it)
    pub fn reject(&mut self, id: &str) -> EditResult<Vec<String>> {
        self.resolve(id, Resolution::Reject)
    }

    pub fn accept_all(&mut self) -> Vec<String> {
        self.resolve_all(Resolution::Accept)
    }

    pub fn reject_all(&mut self) -> Vec<String> {
        self.resolve_all(Resolution::Reject)
    }

    fn resolve(&mut self, id: &str, resolution: Resolution) -> EditResult<Vec<String>> {
        let resolved = self
            .cell
            .edit(|state| state.ledger.resolve(&mut state.doc, id, resolution))?;
        info!(id, ?resolution, resolved = resolved.len(), "Resolved change");
        Ok(resolved)
    }

    fn resolve_all(&mut self, resolution: Resolution) -> Vec<String> {
        let resolved = match self
            .cell
            .edit(|state| Ok(state.ledger.resolve_all(&mut state.doc, resolution)))
        {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(?resolution, error = %err, "Resolving every change failed");
                Vec::new()
            }
        };
        info!(?resolution, resolved = resolved.len(), "Resolved all changes");
        resolved
    }

    /// Plain text of the proposed view: every pending change accepted
    pub fn get_latest_plain_text(&self) -> String {
        flatten(&self.cell.current().doc).text
    }

    /// Markup for the current document, change markers and pending setting
    /// changes included
    pub fn serialize(&self) -> String {
        let state = self.cell.current();
        let pending = state.ledger.pending_settings();
        if pending.is_empty() {
            return serialize(&state.doc);
        }
        let mut doc = state.doc.clone();
        doc.settings.pending = pending;
        serialize(&doc)
    }

    pub fn document(&self) -> &Document {
        &self.cell.current().doc
    }

    /// Set the block ids `scope: "selection"` refers to
    pub fn select(&mut self, ids: &[String]) -> EditResult<()> {
        self.cell.edit(|state| {
            if let Some(missing) = ids.iter().find(|id| state.doc.find_block(id).is_none()) {
                return Err(EditError::NotFound(format!("block {} is not in the document", missing)));
            }
            state.selection = ids.to_vec();
            Ok(())
        })
    }

    pub fn selection(&self) -> &[String] {
        &self.cell.current().selection
    }

    /// Headings of the proposed view
    pub fn outline(&self) -> Vec<OutlineEntry> {
        outline(&self.cell.current().doc)
    }

    /// Number of committed edits since the document was opened
    pub fn version(&self) -> u64 {
        self.cell.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Target;
    use serde_json::json;

    fn engine(markup: &str) -> Engine {
        Engine::open("test.docx", markup, EngineOptions::default()).unwrap()
    }

    #[test]
    fn test_open_recovers_markers() {
        let engine = engine(r#"<p>A <del change="c-7">b</del><ins change="c-7">c</ins></p>"#);
        assert_eq!(engine.list().len(), 1);
        assert_eq!(engine.get_latest_plain_text(), "A c");
    }

    #[test]
    fn test_change_ids_use_document_seed() {
        let mut engine = engine("<p>Hello world.</p>");
        let op = Operation::new("replace_text", Target::text("world"), json!({ "replace": "earth" }));
        let result = engine.apply(&[op], false);

        let seed = IDGenerator::new("test.docx").seed().to_string();
        assert_eq!(result.change_ids(), vec![format!("{}-c-1", seed)]);
    }

    #[test]
    fn test_batch_reports_skipped_ops() {
        let mut engine = engine("<p>Hello world.</p>");
        let ops = vec![
            Operation::new("replace_text", Target::text("missing"), json!({ "replace": "x" })),
            Operation::new("replace_text", Target::text("Hello"), json!({ "replace": "Hi" })),
        ];
        let result = engine.apply(&ops, false);

        assert!(!result.success);
        assert_eq!(result.outcomes[0].error.as_deref(), Some("not_found"));
        assert!(result.outcomes[1].success);
        assert_eq!(engine.get_latest_plain_text(), "Hi world.");
    }

    #[test]
    fn test_apply_json_accepts_single_object() {
        let mut engine = engine("<p>Hello world.</p>");
        let result = engine
            .apply_json(
                r#"{"type": "replace_text", "target": {"text": "world"}, "params": {"replace": "earth"}}"#,
                false,
            )
            .unwrap();
        assert!(result.success);
        assert_eq!(engine.get_latest_plain_text(), "Hello earth.");

        let err = engine.apply_json("42", false).unwrap_err();
        assert!(matches!(err, EditorError::Edit(EditError::InvalidOpShape(_))));
    }

    #[test]
    fn test_select_rejects_unknown_blocks() {
        let mut engine = engine("<p>One</p>");
        let err = engine.select(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, EditError::NotFound(_)));
        assert!(engine.selection().is_empty());
    }
}
