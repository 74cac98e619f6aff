//! Resolves an operation's target to the blocks (or text segments) it
//! covers.

use crate::errors::{EditError, EditResult};
use crate::operations::{Filter, Scope, Target};
use revisor_common::{walk_block, Visitor};
use revisor_markup::ast::{Block, BlockKind, Document, InlineChange};
use revisor_markup::style::NORMAL;
use revisor_markup::Segment;
use std::collections::HashSet;

/// A block in document order, with whether it sits in a pending change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub id: String,
    /// The block or one of its ancestors carries a change marker
    pub pending: bool,
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<BlockRef>,
    pending_depth: usize,
}

impl Visitor for BlockCollector {
    fn visit_block(&mut self, block: &Block) {
        let marked = block.is_pending();
        self.blocks.push(BlockRef {
            id: block.id.clone(),
            pending: marked || self.pending_depth > 0,
        });

        if marked {
            self.pending_depth += 1;
        }
        walk_block(self, block);
        if marked {
            self.pending_depth -= 1;
        }
    }
}

#[derive(Default)]
struct PendingFinder {
    found: bool,
}

impl Visitor for PendingFinder {
    fn visit_block(&mut self, block: &Block) {
        if block.is_pending() {
            self.found = true;
        } else if !self.found {
            walk_block(self, block);
        }
    }

    fn visit_change(&mut self, _change: &InlineChange) {
        self.found = true;
    }
}

/// Whether a block, a block under it, or any of their inline runs carries
/// a pending change
pub fn holds_pending(block: &Block) -> bool {
    let mut finder = PendingFinder::default();
    finder.visit_block(block);
    finder.found
}

/// Every block in document order, nested blocks included
pub fn all_blocks(doc: &Document) -> Vec<BlockRef> {
    let mut collector = BlockCollector::default();
    for block in &doc.blocks {
        collector.visit_block(block);
    }
    collector.blocks
}

/// Blocks selected by a target, before any per-operation kind filtering
pub fn candidate_blocks(doc: &Document, target: &Target, selection: &[String]) -> EditResult<Vec<BlockRef>> {
    let blocks = all_blocks(doc);
    let keep = |pred: &dyn Fn(&Block) -> bool| -> Vec<BlockRef> {
        blocks
            .iter()
            .filter(|r| doc.find_block(&r.id).is_some_and(|b| pred(b)))
            .cloned()
            .collect()
    };

    match target.scope {
        Scope::Document => Ok(blocks.clone()),
        Scope::AnchorText => {
            let anchor = anchor_text(target)?;
            Ok(keep(&|block: &Block| matches_anchor(block, anchor)))
        }
        Scope::Selection => {
            let ids = selected_ids(doc, selection)?;
            Ok(blocks.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
        }
        Scope::Rule => {
            let filter = rule_filter(target)?;
            Ok(keep(&|block: &Block| matches_filter(block, filter)))
        }
    }
}

/// Narrow candidates to the blocks an operation may rewrite. Fails with
/// `NotFound` when nothing matched or every match is inside a pending change.
pub fn require_free(candidates: Vec<BlockRef>, what: &str) -> EditResult<Vec<String>> {
    if candidates.is_empty() {
        return Err(EditError::NotFound(format!("no {} matches the target", what)));
    }

    let mut seen = HashSet::new();
    let free: Vec<String> = candidates
        .into_iter()
        .filter(|r| !r.pending && seen.insert(r.id.clone()))
        .map(|r| r.id)
        .collect();

    if free.is_empty() {
        return Err(EditError::NotFound(format!(
            "every matching {} lies in a pending change; resolve it first",
            what
        )));
    }
    Ok(free)
}

/// Segments a text operation may search. `needle_from_target` is set when
/// `target.text` is the search text itself rather than a block anchor.
pub fn text_segments(
    doc: &Document,
    segments: &[Segment],
    target: &Target,
    selection: &[String],
    needle_from_target: bool,
) -> EditResult<Vec<Segment>> {
    let allowed: Option<HashSet<String>> = match target.scope {
        Scope::Document => None,
        Scope::AnchorText if needle_from_target => None,
        Scope::AnchorText => {
            let anchor = anchor_text(target)?;
            let roots = doc_blocks_where(doc, |b| matches_anchor(b, anchor));
            Some(subtree_ids(doc, &roots))
        }
        Scope::Selection => Some(selected_ids(doc, selection)?),
        Scope::Rule => {
            let filter = rule_filter(target)?;
            let roots = doc_blocks_where(doc, |b| matches_filter(b, filter));
            Some(subtree_ids(doc, &roots))
        }
    };

    Ok(segments
        .iter()
        .filter(|s| allowed.as_ref().map_or(true, |ids| ids.contains(&s.block_id)))
        .cloned()
        .collect())
}

pub fn matches_anchor(block: &Block, anchor: &str) -> bool {
    if block.visible_text().contains(anchor) {
        return true;
    }
    match &block.kind {
        BlockKind::Image { url, alt, .. } => {
            url.contains(anchor) || alt.as_deref().is_some_and(|alt| alt.contains(anchor))
        }
        _ => false,
    }
}

pub fn matches_filter(block: &Block, filter: &Filter) -> bool {
    if let Some(kind) = &filter.kind {
        if kind_name(&block.kind) != kind {
            return false;
        }
    }
    if let Some(style) = &filter.style {
        if effective_style(block) != *style {
            return false;
        }
    }
    if let Some(level) = filter.level {
        if block.kind != (BlockKind::Heading { level }) {
            return false;
        }
    }
    if !filter.block_ids.is_empty() && !filter.block_ids.contains(&block.id) {
        return false;
    }
    true
}

/// Name used by rule filters
pub fn kind_name(kind: &BlockKind) -> &'static str {
    match kind {
        BlockKind::Paragraph => "paragraph",
        BlockKind::Heading { .. } => "heading",
        BlockKind::ListItem { .. } => "list_item",
        BlockKind::Table => "table",
        BlockKind::TableRow => "table_row",
        BlockKind::TableCell => "table_cell",
        BlockKind::Image { .. } => "image",
        BlockKind::Container => "container",
        BlockKind::PageBreak => "page_break",
    }
}

/// Style name a block renders with when it names none
fn effective_style(block: &Block) -> String {
    match (&block.style, &block.kind) {
        (Some(style), _) => style.clone(),
        (None, BlockKind::Heading { level }) => format!("Heading{}", level),
        (None, _) => NORMAL.to_string(),
    }
}

fn anchor_text(target: &Target) -> EditResult<&str> {
    match target.text.as_deref() {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(EditError::EmptyInput("anchor text is empty".to_string())),
    }
}

fn rule_filter(target: &Target) -> EditResult<&Filter> {
    match &target.filter {
        Some(filter) if !filter.is_empty() => Ok(filter),
        _ => Err(EditError::InvalidOpShape("scope \"rule\" needs a filter".to_string())),
    }
}

fn selected_ids(doc: &Document, selection: &[String]) -> EditResult<HashSet<String>> {
    if selection.is_empty() {
        return Err(EditError::NotFound("nothing is selected".to_string()));
    }
    Ok(subtree_ids(doc, selection))
}

fn doc_blocks_where(doc: &Document, pred: impl Fn(&Block) -> bool) -> Vec<String> {
    all_blocks(doc)
        .into_iter()
        .filter(|r| doc.find_block(&r.id).is_some_and(&pred))
        .map(|r| r.id)
        .collect()
}

/// The given blocks plus everything nested inside them
fn subtree_ids(doc: &Document, roots: &[String]) -> HashSet<String> {
    fn collect(block: &Block, out: &mut HashSet<String>) {
        out.insert(block.id.clone());
        for child in block.children() {
            collect(child, out);
        }
    }
    let mut out = HashSet::new();
    for id in roots {
        if let Some(block) = doc.find_block(id) {
            collect(block, &mut out);
        }
    }
    out
}
