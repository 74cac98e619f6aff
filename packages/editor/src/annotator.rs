//! # Diff Annotator
//!
//! Turns a matched region or a whole block into an old/new pair tagged with
//! one change id.
//!
//! Inline regions are cut out of a block's inline list by *visible* offset
//! (the offsets the match engine reports). Old fragments have no visible
//! width; one sitting exactly on a cut goes to the right-hand side. At the
//! start of a region it is kept only when its new side is in the region
//! too, so a neighbouring pure deletion stays an independent change.
//!
//! ```text
//! Hello <b>wor</b>ld.     replace "world" → "earth"
//!   ↓
//! Hello <del c><b>wor</b>ld</del><ins c>earth</ins>.
//! ```

use revisor_markup::ast::{Block, ChangeMark, Inline, InlineChange, Marks, Side, TextRun};
use revisor_markup::normalize_inlines;
use std::ops::Range;

/// What an inline annotation did, for previews and the ledger
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionSummary {
    /// Visible text of the region before the change
    pub old_text: String,
    /// Visible text proposed in its place
    pub new_text: String,
    /// Pending changes with fragments inside the region
    pub depends_on: Vec<String>,
}

/// Old/new fragments of one inline change
#[derive(Debug, Clone, PartialEq)]
pub struct DiffPair {
    pub old: Inline,
    /// `None` when the change is a pure deletion
    pub new: Option<Inline>,
}

/// Wrap an original region and its proposed content in a fragment pair.
/// The old fragment keeps the region verbatim, formatting and nested
/// fragments included.
pub fn annotate_inline(region: Vec<Inline>, proposed: Vec<Inline>, change_id: &str) -> DiffPair {
    let proposed = normalize_inlines(proposed);
    DiffPair {
        old: Inline::Change(InlineChange {
            id: change_id.to_string(),
            side: Side::Old,
            children: region,
        }),
        new: (!proposed.is_empty()).then(|| {
            Inline::Change(InlineChange {
                id: change_id.to_string(),
                side: Side::New,
                children: proposed,
            })
        }),
    }
}

/// Replace the visible `range` of `inlines` with an old/new pair whose new
/// side is built from the region by `propose`
pub fn rewrite_range(
    inlines: &mut Vec<Inline>,
    range: Range<usize>,
    change_id: &str,
    propose: impl FnOnce(&[Inline]) -> Vec<Inline>,
) -> RegionSummary {
    let (before, region, after) = extract(std::mem::take(inlines), range);

    let proposed = propose(&region);
    let summary = RegionSummary {
        old_text: visible_text(&region),
        new_text: visible_text(&proposed),
        depends_on: change_ids(&region),
    };

    let pair = annotate_inline(region, proposed, change_id);
    let mut rebuilt = before;
    rebuilt.push(pair.old);
    rebuilt.extend(pair.new);
    rebuilt.extend(after);
    *inlines = normalize_inlines(rebuilt);

    summary
}

/// Tag a clone of `old` and a replacement block as one change. The
/// replacement gets the change's new side; the caller inserts it directly
/// after the old block.
pub fn annotate_block(old: &Block, mut new: Block, change_id: &str) -> (Block, Block) {
    let mut old = old.clone();
    tag_block(&mut old, change_id, Side::Old);
    tag_block(&mut new, change_id, Side::New);
    (old, new)
}

pub fn tag_block(block: &mut Block, change_id: &str, side: Side) {
    block.change = Some(ChangeMark {
        id: change_id.to_string(),
        side,
    });
}

/// Split into (before, region, after) at visible offsets
pub fn extract(inlines: Vec<Inline>, range: Range<usize>) -> (Vec<Inline>, Vec<Inline>, Vec<Inline>) {
    let (mut before, rest) = split_at(inlines, range.start);
    let (mut region, after) = split_at(rest, range.end.saturating_sub(range.start));

    let proposed = new_side_ids(&region);
    let leading = region
        .iter()
        .take_while(|inline| matches!(inline, Inline::Change(c) if c.side == Side::Old && !proposed.contains(&c.id)))
        .count();
    before.extend(region.drain(..leading));
    (before, region, after)
}

fn new_side_ids(inlines: &[Inline]) -> Vec<String> {
    let mut out = Vec::new();
    for inline in inlines {
        if let Inline::Change(change) = inline {
            if change.side == Side::New && !out.contains(&change.id) {
                out.push(change.id.clone());
            }
            out.extend(new_side_ids(&change.children));
        }
    }
    out
}

/// Split an inline list at a visible byte offset
pub fn split_at(inlines: Vec<Inline>, at: usize) -> (Vec<Inline>, Vec<Inline>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut pos = 0;

    for inline in inlines {
        let len = visible_len(&inline);
        let goes_left = if len == 0 { pos < at } else { pos + len <= at };

        if !right.is_empty() || (!goes_left && pos >= at) {
            right.push(inline);
        } else if goes_left {
            left.push(inline);
        } else {
            let (l, r) = split_node(inline, at - pos);
            left.extend(l);
            right.extend(r);
        }
        pos += len;
    }

    (left, right)
}

fn split_node(inline: Inline, at: usize) -> (Option<Inline>, Option<Inline>) {
    match inline {
        Inline::Text(run) => {
            let mut cut = at.min(run.text.len());
            while !run.text.is_char_boundary(cut) {
                cut -= 1;
            }
            let (l, r) = run.text.split_at(cut);
            let piece = |text: &str| (!text.is_empty()).then(|| Inline::text(text, run.marks.clone()));
            (piece(l), piece(r))
        }
        Inline::Change(change) => {
            let (l, r) = split_at(change.children, at);
            let piece = |children: Vec<Inline>| {
                (!children.is_empty()).then(|| {
                    Inline::Change(InlineChange {
                        id: change.id.clone(),
                        side: change.side,
                        children,
                    })
                })
            };
            (piece(l), piece(r))
        }
    }
}

/// Bytes an inline node contributes to the visible text
pub fn visible_len(inline: &Inline) -> usize {
    match inline {
        Inline::Text(run) => run.text.len(),
        Inline::Change(change) if change.side == Side::New => change.children.iter().map(visible_len).sum(),
        Inline::Change(_) => 0,
    }
}

pub fn visible_text(inlines: &[Inline]) -> String {
    proposed_runs(inlines).iter().map(|run| run.text.as_str()).collect()
}

/// The runs of a region as it reads with its pending changes accepted
pub fn proposed_runs(inlines: &[Inline]) -> Vec<TextRun> {
    fn collect(inlines: &[Inline], out: &mut Vec<TextRun>) {
        for inline in inlines {
            match inline {
                Inline::Text(run) => out.push(run.clone()),
                Inline::Change(change) if change.side == Side::New => collect(&change.children, out),
                Inline::Change(_) => {}
            }
        }
    }
    let mut out = Vec::new();
    collect(inlines, &mut out);
    out
}

/// Formatting of the run covering the most visible bytes of a region.
/// Ties go to the run seen first.
pub fn dominant_marks(inlines: &[Inline]) -> Marks {
    let mut totals: Vec<(Marks, usize)> = Vec::new();
    for run in proposed_runs(inlines) {
        match totals.iter_mut().find(|(marks, _)| *marks == run.marks) {
            Some((_, total)) => *total += run.text.len(),
            None => totals.push((run.marks, run.text.len())),
        }
    }

    let mut best: Option<(Marks, usize)> = None;
    for (marks, total) in totals {
        if best.as_ref().map_or(true, |(_, b)| total > *b) {
            best = Some((marks, total));
        }
    }
    best.map(|(marks, _)| marks).unwrap_or_default()
}

/// Ids of every change fragment inside `inlines`, in order of appearance
pub fn change_ids(inlines: &[Inline]) -> Vec<String> {
    fn collect(inlines: &[Inline], out: &mut Vec<String>) {
        for inline in inlines {
            if let Inline::Change(change) = inline {
                if !out.contains(&change.id) {
                    out.push(change.id.clone());
                }
                collect(&change.children, out);
            }
        }
    }
    let mut out = Vec::new();
    collect(inlines, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use revisor_markup::{parse, serializer::serialize_inlines};

    fn inlines(source: &str) -> Vec<Inline> {
        let doc = parse(&format!("<p>{}</p>", source)).unwrap();
        doc.blocks[0].inlines().unwrap().clone()
    }

    fn markup(inlines: &[Inline]) -> String {
        let mut out = String::new();
        serialize_inlines(inlines, &mut out);
        out
    }

    fn replace_with(text: &'static str) -> impl FnOnce(&[Inline]) -> Vec<Inline> {
        move |region| vec![Inline::text(text, dominant_marks(region))]
    }

    #[test]
    fn test_split_inside_formatted_run() {
        let (left, right) = split_at(inlines("Hello <b>world</b>"), 8);
        assert_eq!(markup(&left), "Hello <b>wo</b>");
        assert_eq!(markup(&right), "<b>rld</b>");
    }

    #[test]
    fn test_old_fragment_on_cut_goes_right() {
        let source = r#"a<del change="c-1">X</del>b"#;
        let (left, right) = split_at(inlines(source), 1);
        assert_eq!(markup(&left), "a");
        assert_eq!(markup(&right), r#"<del change="c-1">X</del>b"#);
    }

    #[test]
    fn test_rewrite_across_runs_keeps_old_formatting() {
        let mut content = inlines("Hello <b>wor</b>ld.");
        let summary = rewrite_range(&mut content, 6..11, "c-9", replace_with("earth"));

        assert_eq!(summary.old_text, "world");
        assert_eq!(summary.new_text, "earth");
        assert!(summary.depends_on.is_empty());
        // "ld" (2 bytes) loses to "wor" (3 bytes), so the new text is bold
        assert_eq!(
            markup(&content),
            r#"Hello <del change="c-9"><b>wor</b>ld</del><ins change="c-9"><b>earth</b></ins>."#
        );
    }

    #[test]
    fn test_empty_replacement_has_no_new_fragment() {
        let mut content = inlines("abc");
        rewrite_range(&mut content, 1..2, "c-1", |_| Vec::new());
        assert_eq!(markup(&content), r#"a<del change="c-1">b</del>c"#);
    }

    #[test]
    fn test_region_over_pending_fragment_records_dependency() {
        let mut content = inlines(r#"<del change="c-1">Q1</del><ins change="c-1">Q2</ins> report"#);
        let summary = rewrite_range(&mut content, 0..9, "c-2", replace_with("Q3 report"));

        assert_eq!(summary.old_text, "Q2 report");
        assert_eq!(summary.depends_on, vec!["c-1".to_string()]);
        assert_eq!(
            markup(&content),
            r#"<del change="c-2"><del change="c-1">Q1</del><ins change="c-1">Q2</ins> report</del><ins change="c-2">Q3 report</ins>"#
        );
    }

    #[test]
    fn test_deletion_before_region_stays_outside() {
        let mut content = inlines(r#"Hello <del change="c-1">big </del>world"#);
        let summary = rewrite_range(&mut content, 6..11, "c-2", replace_with("earth"));

        assert_eq!(summary.old_text, "world");
        assert!(summary.depends_on.is_empty());
        assert_eq!(
            markup(&content),
            r#"Hello <del change="c-1">big </del><del change="c-2">world</del><ins change="c-2">earth</ins>"#
        );
    }

    #[test]
    fn test_annotate_block_tags_both_sides() {
        let doc = parse("<p>Body</p>").unwrap();
        let mut new = doc.blocks[0].clone();
        new.id = "n-1".to_string();
        new.attrs.align = Some("center".to_string());

        let (old, new) = annotate_block(&doc.blocks[0], new, "c-3");
        assert_eq!(old.change.as_ref().map(|m| m.side), Some(Side::Old));
        assert_eq!(new.change.as_ref().map(|m| m.side), Some(Side::New));
        assert_eq!(old.attrs.align, None);
        assert_eq!(new.attrs.align.as_deref(), Some("center"));
    }
}
