use revisor_markup::ast::*;
use revisor_markup::Style;

/// Visitor pattern for traversing the document tree immutably
///
/// This trait provides default implementations that walk the entire tree.
/// Override specific visit_* methods to perform custom actions on nodes.
/// Every walk matches the node enums exhaustively, so a new block or inline
/// kind fails to compile here until it is handled.
pub trait Visitor: Sized {
    fn visit_document(&mut self, doc: &Document) {
        walk_document(self, doc);
    }

    fn visit_settings(&mut self, _settings: &Settings) {
        // Leaf node, no children to walk
    }

    fn visit_style(&mut self, _style: &Style) {
        // Leaf node, no children to walk
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_inline(&mut self, inline: &Inline) {
        walk_inline(self, inline);
    }

    fn visit_change(&mut self, change: &InlineChange) {
        walk_change(self, change);
    }

    fn visit_text_run(&mut self, _run: &TextRun) {
        // Leaf node, no children to walk
    }
}

/// Mutable visitor pattern for transforming the document tree
///
/// Similar to Visitor, but provides mutable access to nodes. The `*_list`
/// hooks see whole sibling lists so visitors can remove or splice nodes.
pub trait VisitorMut: Sized {
    fn visit_document_mut(&mut self, doc: &mut Document) {
        walk_document_mut(self, doc);
    }

    fn visit_block_list_mut(&mut self, blocks: &mut Vec<Block>) {
        walk_block_list_mut(self, blocks);
    }

    fn visit_block_mut(&mut self, block: &mut Block) {
        walk_block_mut(self, block);
    }

    fn visit_inline_list_mut(&mut self, inlines: &mut Vec<Inline>) {
        walk_inline_list_mut(self, inlines);
    }

    fn visit_inline_mut(&mut self, inline: &mut Inline) {
        walk_inline_mut(self, inline);
    }

    fn visit_change_mut(&mut self, change: &mut InlineChange) {
        walk_change_mut(self, change);
    }

    fn visit_text_run_mut(&mut self, _run: &mut TextRun) {
        // Leaf node, no children to walk
    }
}

// Default walk implementations for immutable visitor

pub fn walk_document<V: Visitor>(visitor: &mut V, doc: &Document) {
    visitor.visit_settings(&doc.settings);
    for style in doc.styles.iter() {
        visitor.visit_style(style);
    }
    for block in &doc.blocks {
        visitor.visit_block(block);
    }
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &Block) {
    match &block.content {
        Content::Inline(inlines) => {
            for inline in inlines {
                visitor.visit_inline(inline);
            }
        }
        Content::Blocks(children) => {
            for child in children {
                visitor.visit_block(child);
            }
        }
        Content::Empty => {
            // No children to walk
        }
    }
}

pub fn walk_inline<V: Visitor>(visitor: &mut V, inline: &Inline) {
    match inline {
        Inline::Text(run) => visitor.visit_text_run(run),
        Inline::Change(change) => visitor.visit_change(change),
    }
}

pub fn walk_change<V: Visitor>(visitor: &mut V, change: &InlineChange) {
    for inline in &change.children {
        visitor.visit_inline(inline);
    }
}

// Default walk implementations for mutable visitor

pub fn walk_document_mut<V: VisitorMut>(visitor: &mut V, doc: &mut Document) {
    visitor.visit_block_list_mut(&mut doc.blocks);
}

pub fn walk_block_list_mut<V: VisitorMut>(visitor: &mut V, blocks: &mut Vec<Block>) {
    for block in blocks.iter_mut() {
        visitor.visit_block_mut(block);
    }
}

pub fn walk_block_mut<V: VisitorMut>(visitor: &mut V, block: &mut Block) {
    match &mut block.content {
        Content::Inline(inlines) => visitor.visit_inline_list_mut(inlines),
        Content::Blocks(children) => visitor.visit_block_list_mut(children),
        Content::Empty => {
            // No children to walk
        }
    }
}

pub fn walk_inline_list_mut<V: VisitorMut>(visitor: &mut V, inlines: &mut Vec<Inline>) {
    for inline in inlines.iter_mut() {
        visitor.visit_inline_mut(inline);
    }
}

pub fn walk_inline_mut<V: VisitorMut>(visitor: &mut V, inline: &mut Inline) {
    match inline {
        Inline::Text(run) => visitor.visit_text_run_mut(run),
        Inline::Change(change) => visitor.visit_change_mut(change),
    }
}

pub fn walk_change_mut<V: VisitorMut>(visitor: &mut V, change: &mut InlineChange) {
    visitor.visit_inline_list_mut(&mut change.children);
}

#[cfg(test)]
mod tests {
    use super::*;
    use revisor_markup::parse;

    #[derive(Default)]
    struct Counter {
        blocks: usize,
        runs: usize,
        changes: usize,
    }

    impl Visitor for Counter {
        fn visit_block(&mut self, block: &Block) {
            self.blocks += 1;
            walk_block(self, block);
        }

        fn visit_change(&mut self, change: &InlineChange) {
            self.changes += 1;
            walk_change(self, change);
        }

        fn visit_text_run(&mut self, _run: &TextRun) {
            self.runs += 1;
        }
    }

    struct Uppercase;

    impl VisitorMut for Uppercase {
        fn visit_text_run_mut(&mut self, run: &mut TextRun) {
            run.text = run.text.to_uppercase();
        }
    }

    #[test]
    fn test_visitor_reaches_nested_nodes() {
        let doc = parse(
            r#"<p>a <b>b</b><del change="c-1">c</del></p><table><tr><td>d</td></tr></table>"#,
        )
        .unwrap();

        let mut counter = Counter::default();
        counter.visit_document(&doc);

        // p, table, tr, td, implicit p
        assert_eq!(counter.blocks, 5);
        assert_eq!(counter.runs, 4);
        assert_eq!(counter.changes, 1);
    }

    #[test]
    fn test_mutable_visitor_rewrites_runs() {
        let mut doc = parse(r#"<p>a <ins change="c-1">b</ins></p>"#).unwrap();
        Uppercase.visit_document_mut(&mut doc);
        assert_eq!(doc.blocks[0].visible_text(), "A B");
    }
}
