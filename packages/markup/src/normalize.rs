use crate::ast::{Block, Content, Document, Inline};

/// Canonical form of an inline sequence: empty runs and empty change
/// fragments are dropped, adjacent runs with identical marks merge, and
/// adjacent fragments of the same change and side merge.
pub fn normalize_inlines(inlines: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(inlines.len());

    for inline in inlines {
        match inline {
            Inline::Text(run) => {
                if run.text.is_empty() {
                    continue;
                }
                if let Some(Inline::Text(prev)) = out.last_mut() {
                    if prev.marks == run.marks {
                        prev.text.push_str(&run.text);
                        continue;
                    }
                }
                out.push(Inline::Text(run));
            }
            Inline::Change(mut change) => {
                change.children = normalize_inlines(change.children);
                if change.children.is_empty() {
                    continue;
                }
                if let Some(Inline::Change(prev)) = out.last_mut() {
                    if prev.id == change.id && prev.side == change.side {
                        let mut merged = std::mem::take(&mut prev.children);
                        merged.extend(change.children);
                        prev.children = normalize_inlines(merged);
                        continue;
                    }
                }
                out.push(Inline::Change(change));
            }
        }
    }

    out
}

pub fn normalize_block(block: &mut Block) {
    match &mut block.content {
        Content::Inline(inlines) => {
            *inlines = normalize_inlines(std::mem::take(inlines));
        }
        Content::Blocks(children) => children.iter_mut().for_each(normalize_block),
        Content::Empty => {}
    }
}

pub fn normalize_document(doc: &mut Document) {
    doc.blocks.iter_mut().for_each(normalize_block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{InlineChange, Marks, Side};

    #[test]
    fn test_merges_runs_with_same_marks() {
        let bold = Marks {
            bold: true,
            ..Marks::default()
        };
        let inlines = vec![
            Inline::text("a", Marks::default()),
            Inline::text("b", Marks::default()),
            Inline::text("", bold.clone()),
            Inline::text("c", bold.clone()),
        ];
        let normalized = normalize_inlines(inlines);
        assert_eq!(
            normalized,
            vec![Inline::text("ab", Marks::default()), Inline::text("c", bold)]
        );
    }

    #[test]
    fn test_merges_split_fragments_of_one_change() {
        let fragment = |text: &str| {
            Inline::Change(InlineChange {
                id: "c-1".to_string(),
                side: Side::New,
                children: vec![Inline::text(text, Marks::default())],
            })
        };
        let normalized = normalize_inlines(vec![fragment("Q"), fragment("2")]);
        assert_eq!(normalized, vec![fragment("Q2")]);
    }

    #[test]
    fn test_drops_empty_fragments() {
        let empty = Inline::Change(InlineChange {
            id: "c-1".to_string(),
            side: Side::New,
            children: vec![Inline::text("", Marks::default())],
        });
        assert!(normalize_inlines(vec![empty]).is_empty());
    }
}
