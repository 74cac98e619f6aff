//! # Operation Executor
//!
//! Dispatches one operation against a [`DocumentState`]. Text operations go
//! through the match engine and the inline annotator; block operations
//! locate their target blocks and add old/new block pairs; setting
//! operations change the live value and record the previous one.
//!
//! Every operation locates and validates before it mutates anything. In
//! estimate mode (dry run) it stops after locating and reports what it would
//! do.

use crate::annotator::{annotate_block, dominant_marks, proposed_runs, rewrite_range, tag_block, RegionSummary};
use crate::document::DocumentState;
use crate::engine::EngineOptions;
use crate::errors::{EditError, EditResult};
use crate::ledger::{preview, ChangeKind, ChangeRecord, SettingChange, SettingKey};
use crate::matcher::{find_all, MatchOptions, MatchSpan};
use crate::operations::*;
use crate::scope::{candidate_blocks, holds_pending, require_free, text_segments, BlockRef};
use chrono::Utc;
use revisor_common::{walk_block, Visitor};
use revisor_markup::ast::*;
use revisor_markup::flatten;
use revisor_markup::style::{heading_level, NORMAL};
use revisor_markup::Style;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Largest table `insert_table` will build
const MAX_TABLE_SIZE: usize = 64;
/// Largest column count for the page layout
const MAX_COLUMNS: u8 = 6;

/// What a successful operation did (or would do, in a dry run)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpReport {
    pub message: String,
    pub match_count: usize,
    pub change_ids: Vec<String>,
    pub data: Option<Value>,
}

impl OpReport {
    fn applied(message: String, match_count: usize, change_ids: Vec<String>) -> Self {
        Self {
            message,
            match_count,
            change_ids,
            data: None,
        }
    }

    fn estimate(match_count: usize, message: String) -> Self {
        Self {
            message: format!("Dry run: {}", message),
            match_count,
            change_ids: Vec::new(),
            data: Some(json!({ "estimated_changes": match_count })),
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Ledger entry under construction
struct Draft {
    summary: String,
    before: String,
    after: String,
    match_count: usize,
    meta: Value,
    depends_on: Vec<String>,
    setting: Option<SettingChange>,
}

impl Draft {
    fn new(summary: String) -> Self {
        Self {
            summary,
            before: String::new(),
            after: String::new(),
            match_count: 1,
            meta: Value::Null,
            depends_on: Vec::new(),
            setting: None,
        }
    }

    fn texts(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before = before.into();
        self.after = after.into();
        self
    }

    fn count(mut self, match_count: usize) -> Self {
        self.match_count = match_count;
        self
    }

    fn meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    fn depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    fn setting(mut self, setting: SettingChange) -> Self {
        self.setting = Some(setting);
        self
    }
}

/// Where inserted blocks go
enum InsertAt {
    /// Next to each of these top-level blocks
    Around(Vec<String>, Position),
    /// At the end of the document
    End,
}

pub struct Executor<'a> {
    state: &'a mut DocumentState,
    options: &'a EngineOptions,
    estimate: bool,
}

impl<'a> Executor<'a> {
    pub fn new(state: &'a mut DocumentState, options: &'a EngineOptions, estimate: bool) -> Self {
        Self {
            state,
            options,
            estimate,
        }
    }

    pub fn execute(&mut self, op: &Operation) -> EditResult<OpReport> {
        let kind = op.kind()?;
        debug!(op_type = %kind, scope = ?op.target.scope, estimate = self.estimate, "Executing operation");

        match kind {
            OpKind::ReplaceText => self.replace_text(op),
            OpKind::FormatText => self.format_text(op),
            OpKind::FormatParagraph => self.format_paragraph(op),
            OpKind::ApplyStyle => self.apply_style(op),
            OpKind::DefineStyle => self.define_style(op),
            OpKind::ModifyStyle => self.modify_style(op),
            OpKind::ClearFormat => self.clear_format(op),
            OpKind::CopyFormat => self.copy_format(op),
            OpKind::ListEdit => self.list_edit(op),
            OpKind::InsertPageBreak => self.insert_page_break(op),
            OpKind::StructureEdit => self.structure_edit(op),
            OpKind::TableEdit => self.table_edit(op),
            OpKind::ImageEdit => self.image_edit(op),
            OpKind::PageSetup => self.page_setup(op),
            OpKind::HeaderFooter => self.header_footer(op),
            OpKind::Columns => self.columns(op),
            OpKind::Watermark => self.watermark(op),
            OpKind::Toc => self.toc(op),
        }
    }

    // Text operations

    fn replace_text(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: ReplaceParams = op.params()?;
        let (needle, from_target) = match params.search {
            Some(search) => (search, false),
            None => (op.target.text.clone().unwrap_or_default(), true),
        };

        let mut matches = self.find(op, &needle, from_target)?;
        if !params.all {
            matches.truncate(1);
        }
        if matches.is_empty() {
            return Err(EditError::NotFound(format!("\"{}\" does not occur in the target", needle)));
        }
        if self.estimate {
            let n = matches.len();
            return Ok(OpReport::estimate(n, format!("would replace {} of \"{}\"", plural(n, "occurrence"), needle)));
        }

        let replacement = params.replace;
        let propose = |region: &[Inline]| -> Vec<Inline> {
            if replacement.is_empty() {
                Vec::new()
            } else {
                vec![Inline::text(replacement.clone(), dominant_marks(region))]
            }
        };
        let describe = |summary: &RegionSummary| {
            if summary.new_text.is_empty() {
                format!("Delete \"{}\"", summary.old_text)
            } else {
                format!("Replace \"{}\" with \"{}\"", summary.old_text, summary.new_text)
            }
        };

        let ids = self.rewrite_matches(OpKind::ReplaceText, op, &matches, &propose, &describe)?;
        Ok(OpReport::applied(
            format!("Replaced {} of \"{}\"", plural(ids.len(), "occurrence"), needle),
            ids.len(),
            ids,
        ))
    }

    fn format_text(&mut self, op: &Operation) -> EditResult<OpReport> {
        let patch: MarkPatch = op.params()?;
        if patch.is_empty() {
            return Err(EditError::InvalidOpShape(
                "format_text needs at least one formatting attribute".to_string(),
            ));
        }
        let needle = op.target.text.clone().unwrap_or_default();

        let matches = self.find(op, &needle, true)?;
        if matches.is_empty() {
            return Err(EditError::NotFound(format!("\"{}\" does not occur in the target", needle)));
        }
        if self.estimate {
            let n = matches.len();
            return Ok(OpReport::estimate(n, format!("would format {} of \"{}\"", plural(n, "occurrence"), needle)));
        }

        let propose = |region: &[Inline]| -> Vec<Inline> {
            proposed_runs(region)
                .into_iter()
                .map(|run| Inline::text(run.text, run.marks.patched(&patch)))
                .collect()
        };
        let describe = |summary: &RegionSummary| format!("Format \"{}\"", summary.old_text);

        let ids = self.rewrite_matches(OpKind::FormatText, op, &matches, &propose, &describe)?;
        Ok(OpReport::applied(
            format!("Formatted {} of \"{}\"", plural(ids.len(), "occurrence"), needle),
            ids.len(),
            ids,
        ))
    }

    fn clear_format(&mut self, op: &Operation) -> EditResult<OpReport> {
        let inline_mode = op.target.scope != Scope::AnchorText && op.target.text.as_deref().is_some_and(|t| !t.is_empty());

        if inline_mode {
            let needle = op.target.text.clone().unwrap_or_default();
            let matches = self.find(op, &needle, true)?;
            if matches.is_empty() {
                return Err(EditError::NotFound(format!("\"{}\" does not occur in the target", needle)));
            }
            if self.estimate {
                let n = matches.len();
                return Ok(OpReport::estimate(n, format!("would clear formatting of {}", plural(n, "occurrence"))));
            }

            let propose = |region: &[Inline]| -> Vec<Inline> {
                proposed_runs(region)
                    .into_iter()
                    .map(|run| Inline::text(run.text, Marks::default()))
                    .collect()
            };
            let describe = |summary: &RegionSummary| format!("Clear formatting of \"{}\"", summary.old_text);
            let ids = self.rewrite_matches(OpKind::ClearFormat, op, &matches, &propose, &describe)?;
            return Ok(OpReport::applied(
                format!("Cleared formatting of {}", plural(ids.len(), "occurrence")),
                ids.len(),
                ids,
            ));
        }

        let targets = self.text_blocks(op)?;
        let transform = |block: &Block| -> EditResult<Option<Block>> {
            let mut new = block.clone();
            new.style = None;
            new.attrs = BlockAttrs::default();
            if let Some(inlines) = new.inlines_mut() {
                clear_marks(inlines);
            }
            Ok(Some(new))
        };
        self.rewrite_blocks(OpKind::ClearFormat, op, targets, &transform, "Clear formatting", Vec::new())
    }

    // Block operations

    fn format_paragraph(&mut self, op: &Operation) -> EditResult<OpReport> {
        let patch: BlockAttrs = op.params()?;
        if patch.is_empty() {
            return Err(EditError::InvalidOpShape(
                "format_paragraph needs at least one paragraph attribute".to_string(),
            ));
        }

        let targets = self.text_blocks(op)?;
        let transform = |block: &Block| -> EditResult<Option<Block>> {
            let mut new = block.clone();
            new.attrs.merge(&patch);
            Ok(Some(new))
        };
        let names: Vec<&str> = patch.entries().into_iter().map(|(name, _)| name).collect();
        let summary = format!("Set {}", names.join(", "));
        self.rewrite_blocks(OpKind::FormatParagraph, op, targets, &transform, &summary, Vec::new())
    }

    fn apply_style(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: ApplyStyleParams = op.params()?;
        if !self.state.doc.styles.contains(&params.style) {
            return Err(EditError::NotFound(format!("style \"{}\" is not defined", params.style)));
        }

        let targets = self.text_blocks(op)?;
        let name = params.style.clone();
        let transform = |block: &Block| -> EditResult<Option<Block>> {
            let mut new = block.clone();
            new.style = (name != NORMAL).then(|| name.clone());
            if let Some(level) = heading_level(&name) {
                new.kind = BlockKind::Heading { level };
            } else if name == NORMAL && matches!(new.kind, BlockKind::Heading { .. }) {
                new.kind = BlockKind::Paragraph;
            }
            Ok(Some(new))
        };

        let depends_on: Vec<String> = self
            .state
            .ledger
            .latest_for(&SettingKey::Style(params.style.clone()))
            .map(|r| vec![r.id.clone()])
            .unwrap_or_default();
        let summary = format!("Apply style {}", params.style);
        self.rewrite_blocks(OpKind::ApplyStyle, op, targets, &transform, &summary, depends_on)
    }

    fn copy_format(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: CopyFormatParams = op.params()?;
        if params.source.is_empty() {
            return Err(EditError::EmptyInput("copy_format source anchor is empty".to_string()));
        }

        let source_target = Target::anchor(params.source.clone());
        let sources = self.filter_candidates(&source_target, |b| b.kind.holds_text())?;
        let source_id = first(require_free(sources, "source paragraph")?)?;
        let source = self
            .state
            .doc
            .find_block(&source_id)
            .cloned()
            .ok_or_else(|| EditError::NotFound(format!("block {} is gone", source_id)))?;

        let targets: Vec<String> = self.text_blocks(op)?.into_iter().filter(|id| *id != source_id).collect();
        if targets.is_empty() {
            return Err(EditError::NotFound("no paragraph to copy the format onto".to_string()));
        }

        let transform = |block: &Block| -> EditResult<Option<Block>> {
            let mut new = block.clone();
            new.kind = source.kind.clone();
            new.style = source.style.clone();
            new.attrs = source.attrs.clone();
            Ok(Some(new))
        };
        let summary = format!("Copy format of \"{}\"", preview(&source.visible_text(), self.options.preview_chars));
        self.rewrite_blocks(OpKind::CopyFormat, op, targets, &transform, &summary, Vec::new())
    }

    fn list_edit(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: ListEditParams = op.params()?;
        let (kind, summary) = match params.action {
            ListAction::ToBullet => (BlockKind::ListItem { ordered: false }, "Convert to bulleted list"),
            ListAction::ToNumbered => (BlockKind::ListItem { ordered: true }, "Convert to numbered list"),
            ListAction::ToParagraph => (BlockKind::Paragraph, "Convert to paragraphs"),
        };

        let targets = self.text_blocks(op)?;
        let transform = |block: &Block| -> EditResult<Option<Block>> {
            let mut new = block.clone();
            new.kind = kind.clone();
            Ok(Some(new))
        };
        self.rewrite_blocks(OpKind::ListEdit, op, targets, &transform, summary, Vec::new())
    }

    fn insert_page_break(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: PageBreakParams = op.params()?;
        let at = self.insert_targets(op, params.position)?;
        let make = || Block::new(String::new(), BlockKind::PageBreak);
        self.insert_blocks(OpKind::InsertPageBreak, op, at, &make, "Insert page break".to_string(), "page break")
    }

    fn structure_edit(&mut self, op: &Operation) -> EditResult<OpReport> {
        match op.params::<StructureAction>()? {
            StructureAction::ExtractOutline => {
                let entries = outline(&self.state.doc);
                let n = entries.len();
                let report = OpReport::applied(format!("Outline has {}", plural(n, "heading")), n, Vec::new());
                match serde_json::to_value(&entries) {
                    Ok(data) => Ok(report.with_data(data)),
                    Err(err) => {
                        warn!(error = %err, "Outline could not be encoded");
                        Ok(report)
                    }
                }
            }
            StructureAction::MoveBlock { destination, position } => self.move_block(op, &destination, position),
        }
    }

    fn move_block(&mut self, op: &Operation, destination: &str, position: Position) -> EditResult<OpReport> {
        if destination.is_empty() {
            return Err(EditError::EmptyInput("move_block destination anchor is empty".to_string()));
        }
        let target = match (&op.target.scope, &op.target.text) {
            (Scope::Document, Some(text)) => Target::anchor(text.clone()),
            (Scope::Document, None) => {
                return Err(EditError::InvalidOpShape("move_block needs a target block".to_string()));
            }
            _ => op.target.clone(),
        };

        let movable = |b: &Block| !b.kind.holds_blocks() || b.kind == BlockKind::Table;
        let source_id = first(require_free(self.filter_candidates(&target, movable)?, "block to move")?)?;
        let source_path = self.path_of(&source_id)?;

        let destinations: Vec<BlockRef> = self
            .filter_candidates(&Target::anchor(destination), movable)?
            .into_iter()
            .filter(|r| {
                r.id != source_id
                    && self
                        .state
                        .doc
                        .path_of(&r.id)
                        .map_or(false, |path| !path.starts_with(&source_path))
            })
            .collect();
        let dest_id = first(require_free(destinations, "destination block")?)?;

        if self.estimate {
            return Ok(OpReport::estimate(1, "would move 1 block".to_string()));
        }

        let change_id = self.next_change_id();
        let source = self.block_at(&source_path)?.clone();
        let dest_text = self.block_text(&dest_id);

        let mut moved = source.clone();
        self.fresh_ids(&mut moved);
        tag_block(&mut moved, &change_id, Side::New);
        if let Some(block) = self.state.doc.block_at_mut(&source_path) {
            tag_block(block, &change_id, Side::Old);
        }

        let dest_path = self.path_of(&dest_id)?;
        let index = last_index(&dest_path)?;
        let siblings = self.siblings_mut(&dest_path)?;
        let at = match position {
            Position::Before => index,
            Position::After => index + 1,
        };
        siblings.insert(at, moved);

        let text = source.visible_text();
        let where_to = match position {
            Position::Before => "before",
            Position::After => "after",
        };
        let summary = format!(
            "Move \"{}\" {} \"{}\"",
            preview(&text, self.options.preview_chars),
            where_to,
            preview(&dest_text, self.options.preview_chars)
        );
        let draft = Draft::new(summary)
            .texts(text.clone(), text)
            .meta(json!({ "source": source_id, "destination": dest_id, "position": position }));
        self.record(OpKind::StructureEdit, op, change_id.clone(), draft);

        Ok(OpReport::applied("Moved 1 block".to_string(), 1, vec![change_id]))
    }

    fn table_edit(&mut self, op: &Operation) -> EditResult<OpReport> {
        match op.params::<TableAction>()? {
            TableAction::InsertTable { rows, cols, position } => {
                if rows == 0 || cols == 0 || rows > MAX_TABLE_SIZE || cols > MAX_TABLE_SIZE {
                    return Err(EditError::InvalidOpShape(format!(
                        "table size must be between 1x1 and {}x{}",
                        MAX_TABLE_SIZE, MAX_TABLE_SIZE
                    )));
                }
                let at = self.insert_targets(op, position)?;
                let make = || build_table(rows, cols);
                let summary = format!("Insert {}x{} table", rows, cols);
                self.insert_blocks(OpKind::TableEdit, op, at, &make, summary, "table")
            }
            action => self.edit_table(op, action),
        }
    }

    fn edit_table(&mut self, op: &Operation, action: TableAction) -> EditResult<OpReport> {
        let tables = self.filter_candidates(&op.target, |b| b.kind == BlockKind::Table)?;
        let table_id = first(require_free(tables, "table")?)?;
        let table_path = self.path_of(&table_id)?;
        let table = self.block_at(&table_path)?.clone();
        let rows = table.children();

        let (change_id, summary, before, after) = match &action {
            TableAction::InsertRow { index, cells } => {
                let index = index.unwrap_or(rows.len());
                if index > rows.len() {
                    return Err(EditError::InvalidOpShape(format!(
                        "row index {} is past the end of a {}-row table",
                        index,
                        rows.len()
                    )));
                }
                let cols = rows
                    .first()
                    .map(|row| row.children().len())
                    .filter(|n| *n > 0)
                    .unwrap_or(cells.len().max(1));
                if cells.len() > cols {
                    return Err(EditError::InvalidOpShape(format!(
                        "{} cells given for a {}-column table",
                        cells.len(),
                        cols
                    )));
                }
                if self.estimate {
                    return Ok(OpReport::estimate(1, "would insert 1 row".to_string()));
                }

                let mut row = build_row(cols, cells);
                self.fresh_ids(&mut row);
                let text = row.visible_text();
                let change_id = self.next_change_id();
                tag_block(&mut row, &change_id, Side::New);
                self.children_mut(&table_path)?.insert(index, row);
                (change_id, format!("Insert table row {}", index), String::new(), text)
            }
            TableAction::DeleteRow { index } => {
                let row = rows
                    .get(*index)
                    .ok_or_else(|| EditError::NotFound(format!("table has no row {}", index)))?;
                if holds_pending(row) {
                    return Err(EditError::NotFound(format!("row {} lies in a pending change", index)));
                }
                if self.estimate {
                    return Ok(OpReport::estimate(1, "would delete 1 row".to_string()));
                }

                let text = row.visible_text();
                let change_id = self.next_change_id();
                if let Some(row) = self.children_mut(&table_path)?.get_mut(*index) {
                    tag_block(row, &change_id, Side::Old);
                }
                (change_id, format!("Delete table row {}", index), text, String::new())
            }
            TableAction::SetCell { row, col, text } => {
                let target_row = rows
                    .get(*row)
                    .ok_or_else(|| EditError::NotFound(format!("table has no row {}", row)))?;
                let cell = target_row
                    .children()
                    .get(*col)
                    .ok_or_else(|| EditError::NotFound(format!("table has no cell at row {}, column {}", row, col)))?;
                if target_row.is_pending() || holds_pending(cell) {
                    return Err(EditError::NotFound(format!(
                        "cell at row {}, column {} lies in a pending change",
                        row, col
                    )));
                }
                if self.estimate {
                    return Ok(OpReport::estimate(1, "would set 1 cell".to_string()));
                }

                let old_text = cell.visible_text();
                let template = cell.children().iter().find(|b| b.kind.holds_text());
                let marks = template
                    .and_then(Block::inlines)
                    .map(|inlines| dominant_marks(inlines))
                    .unwrap_or_default();
                let mut paragraph = Block::new(String::new(), BlockKind::Paragraph);
                if let Some(template) = template {
                    paragraph.kind = template.kind.clone();
                    paragraph.style = template.style.clone();
                    paragraph.attrs = template.attrs.clone();
                }
                if !text.is_empty() {
                    paragraph.content = Content::Inline(vec![Inline::text(text.clone(), marks)]);
                }
                self.fresh_ids(&mut paragraph);

                let change_id = self.next_change_id();
                tag_block(&mut paragraph, &change_id, Side::New);
                let mut cell_path = table_path.clone();
                cell_path.extend([*row, *col]);
                let children = self.children_mut(&cell_path)?;
                for child in children.iter_mut() {
                    tag_block(child, &change_id, Side::Old);
                }
                children.push(paragraph);
                (change_id, format!("Set cell ({}, {})", row, col), old_text, text.clone())
            }
            TableAction::InsertTable { .. } => {
                return Err(EditError::InvalidOpShape("insert_table does not edit an existing table".to_string()));
            }
        };

        let draft = Draft::new(summary.clone())
            .texts(before, after)
            .meta(json!({ "table": table_id }));
        self.record(OpKind::TableEdit, op, change_id.clone(), draft);
        Ok(OpReport::applied(summary, 1, vec![change_id]))
    }

    fn image_edit(&mut self, op: &Operation) -> EditResult<OpReport> {
        match op.params::<ImageAction>()? {
            ImageAction::Insert {
                url,
                width,
                alt,
                position,
            } => {
                if url.is_empty() {
                    return Err(EditError::EmptyInput("image url is empty".to_string()));
                }
                let at = self.insert_targets(op, position)?;
                let summary = format!("Insert image {}", url);
                let make = || {
                    Block::new(
                        String::new(),
                        BlockKind::Image {
                            url: url.clone(),
                            width: width.clone(),
                            alt: alt.clone(),
                        },
                    )
                };
                self.insert_blocks(OpKind::ImageEdit, op, at, &make, summary, "image")
            }
            ImageAction::Resize { width } => {
                if width.is_empty() {
                    return Err(EditError::EmptyInput("image width is empty".to_string()));
                }
                let targets = require_free(self.filter_candidates(&op.target, is_image)?, "image")?;
                let transform = |block: &Block| -> EditResult<Option<Block>> {
                    let mut new = block.clone();
                    if let BlockKind::Image { width: w, .. } = &mut new.kind {
                        *w = Some(width.clone());
                    }
                    Ok(Some(new))
                };
                let summary = format!("Resize image to {}", width);
                self.rewrite_blocks(OpKind::ImageEdit, op, targets, &transform, &summary, Vec::new())
            }
            ImageAction::Replace { url } => {
                if url.is_empty() {
                    return Err(EditError::EmptyInput("image url is empty".to_string()));
                }
                let targets = require_free(self.filter_candidates(&op.target, is_image)?, "image")?;
                let transform = |block: &Block| -> EditResult<Option<Block>> {
                    let mut new = block.clone();
                    if let BlockKind::Image { url: u, .. } = &mut new.kind {
                        *u = url.clone();
                    }
                    Ok(Some(new))
                };
                let summary = format!("Replace image with {}", url);
                self.rewrite_blocks(OpKind::ImageEdit, op, targets, &transform, &summary, Vec::new())
            }
        }
    }

    // Setting operations

    fn define_style(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: StyleParams = op.params()?;
        if params.name.is_empty() {
            return Err(EditError::EmptyInput("style name is empty".to_string()));
        }
        let styles = &self.state.doc.styles;
        if styles.contains(&params.name) {
            return Err(EditError::InvalidOpShape(format!(
                "style \"{}\" already exists; use modify_style",
                params.name
            )));
        }
        if let Some(parent) = &params.based_on {
            if !styles.contains(parent) {
                return Err(EditError::NotFound(format!("base style \"{}\" is not defined", parent)));
            }
        }

        let style = Style {
            name: params.name.clone(),
            based_on: params.based_on,
            marks: params.marks,
            paragraph: params.paragraph,
        };
        let change = SettingChange::Style {
            name: params.name.clone(),
            previous: None,
            proposed: style,
        };
        self.change_setting(
            OpKind::DefineStyle,
            op,
            change,
            format!("Define style {}", params.name),
            (String::new(), params.name),
        )
    }

    fn modify_style(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: StyleParams = op.params()?;
        let existing = self
            .state
            .doc
            .styles
            .get(&params.name)
            .cloned()
            .ok_or_else(|| EditError::NotFound(format!("style \"{}\" is not defined", params.name)))?;
        if params.marks.is_empty() && params.paragraph.is_empty() && params.based_on.is_none() {
            return Err(EditError::InvalidOpShape(format!(
                "modify_style needs at least one attribute for \"{}\"",
                params.name
            )));
        }
        if let Some(parent) = &params.based_on {
            if *parent == params.name || !self.state.doc.styles.contains(parent) {
                return Err(EditError::NotFound(format!("base style \"{}\" is not usable", parent)));
            }
        }

        let mut proposed = existing.clone();
        proposed.marks = params.marks.over(&existing.marks);
        proposed.paragraph.merge(&params.paragraph);
        if params.based_on.is_some() {
            proposed.based_on = params.based_on;
        }

        let change = SettingChange::Style {
            name: params.name.clone(),
            previous: Some(existing),
            proposed,
        };
        self.change_setting(
            OpKind::ModifyStyle,
            op,
            change,
            format!("Modify style {}", params.name),
            (params.name.clone(), params.name),
        )
    }

    fn page_setup(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: PageSetupParams = op.params()?;
        if params.is_empty() {
            return Err(EditError::InvalidOpShape("page_setup needs at least one field".to_string()));
        }
        if let Some(orientation) = &params.orientation {
            if orientation != "portrait" && orientation != "landscape" {
                return Err(EditError::InvalidOpShape(format!(
                    "orientation must be \"portrait\" or \"landscape\", not \"{}\"",
                    orientation
                )));
            }
        }

        let previous = self.state.doc.settings.page.clone();
        let mut proposed = previous.clone();
        for (slot, value) in [
            (&mut proposed.size, params.size),
            (&mut proposed.orientation, params.orientation),
            (&mut proposed.margin_top, params.margin_top),
            (&mut proposed.margin_bottom, params.margin_bottom),
            (&mut proposed.margin_left, params.margin_left),
            (&mut proposed.margin_right, params.margin_right),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }

        let texts = (describe_page(&previous), describe_page(&proposed));
        let change = SettingChange::Page { previous, proposed };
        self.change_setting(OpKind::PageSetup, op, change, "Change page setup".to_string(), texts)
    }

    fn header_footer(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: HeaderFooterParams = op.params()?;
        if params == HeaderFooterParams::default() {
            return Err(EditError::InvalidOpShape("header_footer needs a header, footer or page_numbers".to_string()));
        }

        let previous = self.state.doc.settings.header_footer.clone();
        let mut proposed = previous.clone();
        if let Some(header) = params.header {
            proposed.header = (!header.is_empty()).then_some(header);
        }
        if let Some(footer) = params.footer {
            proposed.footer = (!footer.is_empty()).then_some(footer);
        }
        if let Some(page_numbers) = params.page_numbers {
            proposed.page_numbers = page_numbers;
        }

        let texts = (describe_header_footer(&previous), describe_header_footer(&proposed));
        let change = SettingChange::HeaderFooter { previous, proposed };
        self.change_setting(OpKind::HeaderFooter, op, change, "Change header and footer".to_string(), texts)
    }

    fn columns(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: ColumnsParams = op.params()?;
        if params.count == 0 || params.count > MAX_COLUMNS {
            return Err(EditError::InvalidOpShape(format!(
                "column count must be between 1 and {}",
                MAX_COLUMNS
            )));
        }

        let previous = self.state.doc.settings.columns.clone();
        let proposed = Columns {
            count: params.count,
            gap: params.gap.or_else(|| previous.gap.clone()),
        };
        let texts = (
            plural(previous.count as usize, "column"),
            plural(proposed.count as usize, "column"),
        );
        let change = SettingChange::Columns { previous, proposed };
        self.change_setting(OpKind::Columns, op, change, "Change column layout".to_string(), texts)
    }

    fn watermark(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: WatermarkParams = op.params()?;
        let previous = self.state.doc.settings.watermark.clone();
        let proposed = match params.text {
            Some(text) if !text.is_empty() => Some(Watermark {
                text,
                color: params.color,
                opacity: params.opacity,
            }),
            _ => None,
        };

        let describe = |w: &Option<Watermark>| w.as_ref().map(|w| w.text.clone()).unwrap_or_default();
        let summary = if proposed.is_some() { "Set watermark" } else { "Remove watermark" };
        let texts = (describe(&previous), describe(&proposed));
        let change = SettingChange::Watermark { previous, proposed };
        self.change_setting(OpKind::Watermark, op, change, summary.to_string(), texts)
    }

    fn toc(&mut self, op: &Operation) -> EditResult<OpReport> {
        let params: TocParams = op.params()?;
        if let Some(level) = params.max_level {
            if !(1..=3).contains(&level) {
                return Err(EditError::InvalidOpShape("toc max_level must be 1, 2 or 3".to_string()));
            }
        }

        let previous = self.state.doc.settings.toc.clone();
        let proposed = params.enabled.then(|| {
            let mut toc = previous.clone().unwrap_or_default();
            if let Some(title) = params.title {
                toc.title = title;
            }
            if let Some(level) = params.max_level {
                toc.max_level = level;
            }
            toc
        });

        let describe = |toc: &Option<TableOfContents>| {
            toc.as_ref()
                .map(|t| format!("{} (levels 1-{})", t.title, t.max_level))
                .unwrap_or_default()
        };
        let summary = if proposed.is_some() { "Set table of contents" } else { "Remove table of contents" };
        let texts = (describe(&previous), describe(&proposed));
        let change = SettingChange::Toc { previous, proposed };
        self.change_setting(OpKind::Toc, op, change, summary.to_string(), texts)
    }

    // Shared machinery

    fn find(&self, op: &Operation, needle: &str, needle_from_target: bool) -> EditResult<Vec<MatchSpan>> {
        if needle.is_empty() {
            return Err(EditError::EmptyInput("search text is empty".to_string()));
        }
        let flat = flatten(&self.state.doc);
        let segments = text_segments(
            &self.state.doc,
            &flat.segments,
            &op.target,
            &self.state.selection,
            needle_from_target,
        )?;
        let options = MatchOptions {
            fuzzy_whitespace: self.options.fuzzy_whitespace,
        };
        let matches = find_all(&segments, needle, options)?;
        debug!(needle, matches = matches.len(), "Located text");
        Ok(matches)
    }

    /// Rewrite each match as an inline old/new pair, one change per match
    fn rewrite_matches(
        &mut self,
        kind: OpKind,
        op: &Operation,
        matches: &[MatchSpan],
        propose: &dyn Fn(&[Inline]) -> Vec<Inline>,
        describe: &dyn Fn(&RegionSummary) -> String,
    ) -> EditResult<Vec<String>> {
        let ids: Vec<String> = matches.iter().map(|_| self.next_change_id()).collect();
        let mut summaries = vec![RegionSummary::default(); matches.len()];

        // Later matches first, so earlier offsets in the same block stay valid
        for (i, m) in matches.iter().enumerate().rev() {
            let inlines = self.inlines_mut(&m.block_id)?;
            summaries[i] = rewrite_range(inlines, m.start..m.end, &ids[i], |region| propose(region));
        }

        for ((m, id), summary) in matches.iter().zip(&ids).zip(summaries) {
            let draft = Draft::new(describe(&summary))
                .texts(summary.old_text, summary.new_text)
                .meta(json!({ "block_id": m.block_id, "offset": m.start, "matched": m.text }))
                .depends_on(summary.depends_on);
            self.record(kind, op, id.clone(), draft);
        }
        Ok(ids)
    }

    /// Replace each target block with an old/new pair sharing one change
    fn rewrite_blocks(
        &mut self,
        kind: OpKind,
        op: &Operation,
        targets: Vec<String>,
        transform: &dyn Fn(&Block) -> EditResult<Option<Block>>,
        summary: &str,
        depends_on: Vec<String>,
    ) -> EditResult<OpReport> {
        let mut rewrites = Vec::new();
        for id in targets {
            let Some(block) = self.state.doc.find_block(&id) else {
                continue;
            };
            if let Some(new) = transform(block)? {
                if new != *block {
                    rewrites.push((id, new));
                }
            }
        }

        let n = rewrites.len();
        if self.estimate {
            return Ok(OpReport::estimate(n, format!("would change {}", plural(n, "block"))));
        }
        if n == 0 {
            return Ok(OpReport::applied(
                "Every target already has that format; nothing changed".to_string(),
                0,
                Vec::new(),
            ));
        }

        let change_id = self.next_change_id();
        let before = self.block_text(&rewrites[0].0);
        let after = rewrites[0].1.visible_text();
        let block_ids: Vec<String> = rewrites.iter().map(|(id, _)| id.clone()).collect();

        for (id, mut new) in rewrites.into_iter().rev() {
            self.fresh_ids(&mut new);
            let path = self.path_of(&id)?;
            let index = last_index(&path)?;
            let siblings = self.siblings_mut(&path)?;
            let (old, new) = annotate_block(&siblings[index], new, &change_id);
            siblings[index] = old;
            siblings.insert(index + 1, new);
        }

        let draft = Draft::new(format!("{} ({})", summary, plural(n, "block")))
            .texts(before, after)
            .count(n)
            .meta(json!({ "blocks": block_ids }))
            .depends_on(depends_on);
        self.record(kind, op, change_id.clone(), draft);

        Ok(OpReport::applied(
            format!("{}: {} changed", summary, plural(n, "block")),
            n,
            vec![change_id],
        ))
    }

    /// Insert one new-tagged block per anchor (or one at the end)
    fn insert_blocks(
        &mut self,
        kind: OpKind,
        op: &Operation,
        at: InsertAt,
        make: &dyn Fn() -> Block,
        summary: String,
        what: &str,
    ) -> EditResult<OpReport> {
        let n = match &at {
            InsertAt::Around(anchors, _) => anchors.len(),
            InsertAt::End => 1,
        };
        if self.estimate {
            return Ok(OpReport::estimate(n, format!("would insert {}", plural(n, what))));
        }

        let change_id = self.next_change_id();
        let meta = match at {
            InsertAt::End => {
                let block = self.new_block(make, &change_id);
                self.state.doc.blocks.push(block);
                json!({ "position": "end" })
            }
            InsertAt::Around(anchors, position) => {
                for id in anchors.iter().rev() {
                    let block = self.new_block(make, &change_id);
                    let path = self.path_of(id)?;
                    let index = last_index(&path)?;
                    let at = match position {
                        Position::Before => index,
                        Position::After => index + 1,
                    };
                    self.siblings_mut(&path)?.insert(at, block);
                }
                json!({ "anchors": anchors, "position": position })
            }
        };

        let after = make().visible_text();
        let draft = Draft::new(summary).texts(String::new(), after).count(n).meta(meta);
        self.record(kind, op, change_id.clone(), draft);

        Ok(OpReport::applied(format!("Inserted {}", plural(n, what)), n, vec![change_id]))
    }

    /// Make a setting change live and record its previous value
    fn change_setting(
        &mut self,
        kind: OpKind,
        op: &Operation,
        change: SettingChange,
        summary: String,
        texts: (String, String),
    ) -> EditResult<OpReport> {
        if self.estimate {
            return Ok(OpReport::estimate(1, summary.to_lowercase()));
        }
        if change.is_noop() {
            return Ok(OpReport::applied(format!("{}: already set; nothing changed", summary), 0, Vec::new()));
        }

        let depends_on: Vec<String> = self
            .state
            .ledger
            .latest_for(&change.key())
            .map(|r| vec![r.id.clone()])
            .unwrap_or_default();

        change.apply(&mut self.state.doc);
        let change_id = self.next_change_id();
        let draft = Draft::new(summary.clone())
            .texts(texts.0, texts.1)
            .meta(change.to_meta())
            .depends_on(depends_on)
            .setting(change);
        self.record(kind, op, change_id.clone(), draft);

        Ok(OpReport::applied(summary, 1, vec![change_id]))
    }

    fn record(&mut self, kind: OpKind, op: &Operation, id: String, draft: Draft) {
        let preview_chars = self.options.preview_chars;
        let mut depends_on: Vec<String> = Vec::new();
        for dep in draft.depends_on {
            if dep != id && self.state.ledger.contains(&dep) && !depends_on.contains(&dep) {
                depends_on.push(dep);
            }
        }

        self.state.ledger.push(ChangeRecord {
            id,
            kind: ChangeKind::Operation(kind),
            scope: op.target.scope,
            summary: draft.summary,
            before_preview: preview(&draft.before, preview_chars),
            after_preview: preview(&draft.after, preview_chars),
            match_count: draft.match_count,
            created_at: Utc::now(),
            meta: draft.meta,
            depends_on,
            setting: draft.setting,
        });
    }

    /// Free text-holding blocks covered by the target
    fn text_blocks(&self, op: &Operation) -> EditResult<Vec<String>> {
        require_free(self.filter_candidates(&op.target, |b| b.kind.holds_text())?, "paragraph")
    }

    fn filter_candidates(&self, target: &Target, pred: impl Fn(&Block) -> bool) -> EditResult<Vec<BlockRef>> {
        let doc = &self.state.doc;
        Ok(candidate_blocks(doc, target, &self.state.selection)?
            .into_iter()
            .filter(|r| doc.find_block(&r.id).is_some_and(&pred))
            .collect())
    }

    /// Where an insert operation puts its blocks. Document scope without
    /// text appends to the end; anything else inserts next to the top-level
    /// block containing each target.
    fn insert_targets(&self, op: &Operation, position: Position) -> EditResult<InsertAt> {
        if op.target.scope == Scope::Document && op.target.text.is_none() {
            return Ok(InsertAt::End);
        }
        let target = match (&op.target.scope, &op.target.text) {
            (Scope::Document, Some(text)) => Target::anchor(text.clone()),
            _ => op.target.clone(),
        };

        let doc = &self.state.doc;
        let roots: Vec<BlockRef> = candidate_blocks(doc, &target, &self.state.selection)?
            .into_iter()
            .filter_map(|r| {
                let path = doc.path_of(&r.id)?;
                let root = doc.blocks.get(*path.first()?)?;
                Some(BlockRef {
                    id: root.id.clone(),
                    pending: root.is_pending(),
                })
            })
            .collect();
        Ok(InsertAt::Around(require_free(roots, "block")?, position))
    }

    fn next_change_id(&mut self) -> String {
        self.state.change_ids.new_id()
    }

    /// A new-tagged block with fresh ids
    fn new_block(&mut self, make: &dyn Fn() -> Block, change_id: &str) -> Block {
        let mut block = make();
        self.fresh_ids(&mut block);
        tag_block(&mut block, change_id, Side::New);
        block
    }

    fn fresh_ids(&mut self, block: &mut Block) {
        let ids = &mut self.state.block_ids;
        block.reassign_ids(&mut || ids.new_id());
    }

    fn block_text(&self, id: &str) -> String {
        self.state.doc.find_block(id).map(Block::visible_text).unwrap_or_default()
    }

    fn path_of(&self, id: &str) -> EditResult<Vec<usize>> {
        self.state
            .doc
            .path_of(id)
            .ok_or_else(|| EditError::NotFound(format!("block {} is not in the document", id)))
    }

    fn block_at(&self, path: &[usize]) -> EditResult<&Block> {
        self.state
            .doc
            .block_at(path)
            .ok_or_else(|| EditError::NotFound(format!("no block at {:?}", path)))
    }

    fn siblings_mut(&mut self, path: &[usize]) -> EditResult<&mut Vec<Block>> {
        self.state
            .doc
            .siblings_mut(path)
            .ok_or_else(|| EditError::NotFound(format!("no block list at {:?}", path)))
    }

    fn children_mut(&mut self, path: &[usize]) -> EditResult<&mut Vec<Block>> {
        self.state
            .doc
            .block_at_mut(path)
            .and_then(Block::children_mut)
            .ok_or_else(|| EditError::NotFound(format!("block at {:?} holds no blocks", path)))
    }

    fn inlines_mut(&mut self, block_id: &str) -> EditResult<&mut Vec<Inline>> {
        let path = self.path_of(block_id)?;
        self.state
            .doc
            .block_at_mut(&path)
            .and_then(Block::inlines_mut)
            .ok_or_else(|| EditError::NotFound(format!("block {} holds no text", block_id)))
    }
}

/// Headings that remain once pending changes are accepted
pub fn outline(doc: &Document) -> Vec<OutlineEntry> {
    #[derive(Default)]
    struct Outline {
        entries: Vec<OutlineEntry>,
    }

    impl Visitor for Outline {
        fn visit_block(&mut self, block: &Block) {
            if matches!(block.change, Some(ChangeMark { side: Side::Old, .. })) {
                return;
            }
            if let BlockKind::Heading { level } = block.kind {
                self.entries.push(OutlineEntry {
                    block_id: block.id.clone(),
                    level,
                    text: block.visible_text(),
                });
            }
            walk_block(self, block);
        }
    }

    let mut outline = Outline::default();
    for block in &doc.blocks {
        outline.visit_block(block);
    }
    outline.entries
}

fn clear_marks(inlines: &mut [Inline]) {
    for inline in inlines {
        match inline {
            Inline::Text(run) => run.marks = Marks::default(),
            Inline::Change(change) => clear_marks(&mut change.children),
        }
    }
}

fn build_table(rows: usize, cols: usize) -> Block {
    let rows = (0..rows).map(|_| build_row(cols, &[])).collect();
    Block::new(String::new(), BlockKind::Table).with_blocks(rows)
}

fn build_row(cols: usize, cells: &[String]) -> Block {
    let cells = (0..cols)
        .map(|i| {
            let mut paragraph = Block::new(String::new(), BlockKind::Paragraph);
            if let Some(text) = cells.get(i).filter(|t| !t.is_empty()) {
                paragraph = paragraph.with_inlines(vec![Inline::text(text.clone(), Marks::default())]);
            }
            Block::new(String::new(), BlockKind::TableCell).with_blocks(vec![paragraph])
        })
        .collect();
    Block::new(String::new(), BlockKind::TableRow).with_blocks(cells)
}

fn is_image(block: &Block) -> bool {
    matches!(block.kind, BlockKind::Image { .. })
}

fn first(ids: Vec<String>) -> EditResult<String> {
    ids.into_iter()
        .next()
        .ok_or_else(|| EditError::NotFound("no block matches the target".to_string()))
}

fn last_index(path: &[usize]) -> EditResult<usize> {
    path.last()
        .copied()
        .ok_or_else(|| EditError::NotFound("empty block path".to_string()))
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

fn describe_page(page: &PageSetup) -> String {
    format!(
        "{} {}, margins {} {} {} {}",
        page.size, page.orientation, page.margin_top, page.margin_right, page.margin_bottom, page.margin_left
    )
}

fn describe_header_footer(hf: &HeaderFooter) -> String {
    let mut parts = Vec::new();
    if let Some(header) = &hf.header {
        parts.push(format!("header \"{}\"", header));
    }
    if let Some(footer) = &hf.footer {
        parts.push(format!("footer \"{}\"", footer));
    }
    if hf.page_numbers {
        parts.push("page numbers".to_string());
    }
    parts.join(", ")
}
