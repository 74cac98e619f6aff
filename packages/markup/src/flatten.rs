//! Formatting-free view of a document.
//!
//! Flattening walks every text-bearing block and concatenates its visible
//! text, producing one [`Segment`] per block. Visible means "as the document
//! reads with every pending change accepted": plain runs and new fragments
//! are included, old fragments and old-tagged blocks are skipped. Bytes that
//! sit inside a pending fragment or a pending block are recorded as tagged.

use crate::ast::{Block, ChangeMark, Content, Document, Inline, Side};
use serde::Serialize;
use std::ops::Range;

/// Where one flattened byte lives in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextLocation {
    pub block_id: String,
    /// Byte offset within the block's visible text
    pub offset: usize,
    /// Whether the byte belongs to a pending change
    pub tagged: bool,
}

/// Visible text of one text-bearing block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub block_id: String,
    /// Offset of this segment within `FlatText::text`
    pub start: usize,
    pub text: String,
    /// Local byte ranges that belong to pending changes
    pub tagged: Vec<Range<usize>>,
}

impl Segment {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_tagged(&self, offset: usize) -> bool {
        self.tagged.iter().any(|r| r.contains(&offset))
    }

    /// Whether every byte of `range` lies inside pending changes
    pub fn fully_tagged(&self, range: Range<usize>) -> bool {
        range.clone().all(|offset| self.is_tagged(offset))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlatText {
    /// Segments joined by `\n`
    pub text: String,
    pub segments: Vec<Segment>,
}

impl FlatText {
    /// Translate a flattened offset back to a tree location. Separator
    /// newlines between segments have no location.
    pub fn locate(&self, offset: usize) -> Option<TextLocation> {
        let index = self.segments.partition_point(|s| s.end() <= offset);
        let segment = self.segments.get(index)?;
        if offset < segment.start {
            return None;
        }
        let local = offset - segment.start;
        Some(TextLocation {
            block_id: segment.block_id.clone(),
            offset: local,
            tagged: segment.is_tagged(local),
        })
    }

    pub fn segment(&self, block_id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.block_id == block_id)
    }
}

/// Flatten the whole document
pub fn flatten(doc: &Document) -> FlatText {
    flatten_blocks(&doc.blocks)
}

/// Flatten a list of blocks (and everything nested inside them)
pub fn flatten_blocks(blocks: &[Block]) -> FlatText {
    let mut flat = FlatText::default();
    for block in blocks {
        flatten_block(block, false, &mut flat);
    }
    flat
}

fn flatten_block(block: &Block, inside_pending: bool, flat: &mut FlatText) {
    let pending = match &block.change {
        Some(ChangeMark { side: Side::Old, .. }) => return,
        Some(ChangeMark { side: Side::New, .. }) => true,
        None => inside_pending,
    };

    match &block.content {
        Content::Inline(inlines) => {
            let mut text = String::new();
            let mut tagged = Vec::new();
            collect_inlines(inlines, pending, &mut text, &mut tagged);
            if pending && !text.is_empty() {
                tagged = vec![0..text.len()];
            }

            if !flat.segments.is_empty() {
                flat.text.push('\n');
            }
            let start = flat.text.len();
            flat.text.push_str(&text);
            flat.segments.push(Segment {
                block_id: block.id.clone(),
                start,
                text,
                tagged,
            });
        }
        Content::Blocks(children) => {
            for child in children {
                flatten_block(child, pending, flat);
            }
        }
        Content::Empty => {}
    }
}

fn collect_inlines(inlines: &[Inline], in_change: bool, text: &mut String, tagged: &mut Vec<Range<usize>>) {
    for inline in inlines {
        match inline {
            Inline::Text(run) => {
                let start = text.len();
                text.push_str(&run.text);
                if in_change && !run.text.is_empty() {
                    push_range(tagged, start..text.len());
                }
            }
            Inline::Change(change) => match change.side {
                Side::New => collect_inlines(&change.children, true, text, tagged),
                Side::Old => {}
            },
        }
    }
}

fn push_range(ranges: &mut Vec<Range<usize>>, range: Range<usize>) {
    if let Some(last) = ranges.last_mut() {
        if last.end == range.start {
            last.end = range.end;
            return;
        }
    }
    ranges.push(range);
}
