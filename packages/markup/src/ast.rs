use crate::style::StyleSheet;
use serde::{Deserialize, Serialize};

/// Root document node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub settings: Settings,
    pub styles: StyleSheet,
    pub blocks: Vec<Block>,
}

/// Block-level node (paragraph, heading, table, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    /// Named style reference, resolved through the document's style sheet
    pub style: Option<String>,
    pub attrs: BlockAttrs,
    /// Set when the whole block is one side of a pending change
    pub change: Option<ChangeMark>,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading { level: u8 },
    ListItem { ordered: bool },
    Table,
    TableRow,
    TableCell,
    Image {
        url: String,
        width: Option<String>,
        alt: Option<String>,
    },
    Container,
    PageBreak,
}

impl BlockKind {
    /// Whether blocks of this kind hold inline runs directly
    pub fn holds_text(&self) -> bool {
        matches!(
            self,
            BlockKind::Paragraph | BlockKind::Heading { .. } | BlockKind::ListItem { .. }
        )
    }

    /// Whether blocks of this kind hold nested blocks
    pub fn holds_blocks(&self) -> bool {
        matches!(
            self,
            BlockKind::Table | BlockKind::TableRow | BlockKind::TableCell | BlockKind::Container
        )
    }

    /// Markup tag name for this kind
    pub fn tag(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "p",
            BlockKind::Heading { level: 1 } => "h1",
            BlockKind::Heading { level: 2 } => "h2",
            BlockKind::Heading { .. } => "h3",
            BlockKind::ListItem { .. } => "li",
            BlockKind::Table => "table",
            BlockKind::TableRow => "tr",
            BlockKind::TableCell => "td",
            BlockKind::Image { .. } => "img",
            BlockKind::Container => "div",
            BlockKind::PageBreak => "pagebreak",
        }
    }
}

/// Children of a block: inline runs, or nested blocks for table/container kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "children", rename_all = "snake_case")]
pub enum Content {
    Inline(Vec<Inline>),
    Blocks(Vec<Block>),
    Empty,
}

impl Content {
    /// Empty content appropriate for a block kind
    pub fn for_kind(kind: &BlockKind) -> Self {
        if kind.holds_text() {
            Content::Inline(Vec::new())
        } else if kind.holds_blocks() {
            Content::Blocks(Vec::new())
        } else {
            Content::Empty
        }
    }
}

/// Paragraph-level formatting attributes. `None` means "not set".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockAttrs {
    pub align: Option<String>,
    pub line_height: Option<String>,
    pub spacing_before: Option<String>,
    pub spacing_after: Option<String>,
    pub indent: Option<String>,
    pub margin_left: Option<String>,
    pub margin_right: Option<String>,
    pub background: Option<String>,
    pub border: Option<String>,
}

impl BlockAttrs {
    pub fn is_empty(&self) -> bool {
        *self == BlockAttrs::default()
    }

    /// Overlay every attribute set in `patch` onto `self`
    pub fn merge(&mut self, patch: &BlockAttrs) {
        fn set(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        set(&mut self.align, &patch.align);
        set(&mut self.line_height, &patch.line_height);
        set(&mut self.spacing_before, &patch.spacing_before);
        set(&mut self.spacing_after, &patch.spacing_after);
        set(&mut self.indent, &patch.indent);
        set(&mut self.margin_left, &patch.margin_left);
        set(&mut self.margin_right, &patch.margin_right);
        set(&mut self.background, &patch.background);
        set(&mut self.border, &patch.border);
    }

    /// `self` with unset attributes filled in from `parent`
    pub fn over(&self, parent: &BlockAttrs) -> BlockAttrs {
        let mut merged = parent.clone();
        merged.merge(self);
        merged
    }

    /// (markup name, value) pairs for every set attribute
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("align", &self.align),
            ("line-height", &self.line_height),
            ("space-before", &self.spacing_before),
            ("space-after", &self.spacing_after),
            ("indent", &self.indent),
            ("margin-left", &self.margin_left),
            ("margin-right", &self.margin_right),
            ("background", &self.background),
            ("border", &self.border),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }

    /// Set an attribute from its markup name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "align" => &mut self.align,
            "line-height" => &mut self.line_height,
            "space-before" => &mut self.spacing_before,
            "space-after" => &mut self.spacing_after,
            "indent" => &mut self.indent,
            "margin-left" => &mut self.margin_left,
            "margin-right" => &mut self.margin_right,
            "background" => &mut self.background,
            "border" => &mut self.border,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Inline node: a formatted text run or a tagged change fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Text(TextRun),
    Change(InlineChange),
}

impl Inline {
    pub fn text(text: impl Into<String>, marks: Marks) -> Self {
        Inline::Text(TextRun {
            text: text.into(),
            marks,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub marks: Marks,
}

/// One side of a pending inline change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineChange {
    pub id: String,
    pub side: Side,
    pub children: Vec<Inline>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Original content, shown struck through until resolved
    Old,
    /// Proposed content, shown highlighted until resolved
    New,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Old => "old",
            Side::New => "new",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "old" => Some(Side::Old),
            "new" => Some(Side::New),
            _ => None,
        }
    }
}

/// Change tag carried by a block that is one side of a pending change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMark {
    pub id: String,
    pub side: Side,
}

/// Character formatting attribute set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub superscript: bool,
    pub subscript: bool,
    pub color: Option<String>,
    pub background: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<String>,
    pub letter_spacing: Option<String>,
}

impl Marks {
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }

    /// Apply every field set in `patch`
    pub fn apply(&mut self, patch: &MarkPatch) {
        fn flag(slot: &mut bool, value: Option<bool>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn value(slot: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                // An empty string clears the attribute
                *slot = if v.is_empty() { None } else { Some(v.clone()) };
            }
        }
        flag(&mut self.bold, patch.bold);
        flag(&mut self.italic, patch.italic);
        flag(&mut self.underline, patch.underline);
        flag(&mut self.strikethrough, patch.strikethrough);
        flag(&mut self.superscript, patch.superscript);
        flag(&mut self.subscript, patch.subscript);
        value(&mut self.color, &patch.color);
        value(&mut self.background, &patch.background);
        value(&mut self.font_family, &patch.font_family);
        value(&mut self.font_size, &patch.font_size);
        value(&mut self.letter_spacing, &patch.letter_spacing);
    }

    pub fn patched(&self, patch: &MarkPatch) -> Marks {
        let mut marks = self.clone();
        marks.apply(patch);
        marks
    }
}

/// Partial character formatting: only `Some` fields are applied
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkPatch {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strikethrough: Option<bool>,
    pub superscript: Option<bool>,
    pub subscript: Option<bool>,
    pub color: Option<String>,
    pub background: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<String>,
    pub letter_spacing: Option<String>,
}

impl MarkPatch {
    pub fn is_empty(&self) -> bool {
        *self == MarkPatch::default()
    }

    /// `self` with unset fields filled in from `parent`
    pub fn over(&self, parent: &MarkPatch) -> MarkPatch {
        MarkPatch {
            bold: self.bold.or(parent.bold),
            italic: self.italic.or(parent.italic),
            underline: self.underline.or(parent.underline),
            strikethrough: self.strikethrough.or(parent.strikethrough),
            superscript: self.superscript.or(parent.superscript),
            subscript: self.subscript.or(parent.subscript),
            color: self.color.clone().or_else(|| parent.color.clone()),
            background: self.background.clone().or_else(|| parent.background.clone()),
            font_family: self.font_family.clone().or_else(|| parent.font_family.clone()),
            font_size: self.font_size.clone().or_else(|| parent.font_size.clone()),
            letter_spacing: self.letter_spacing.clone().or_else(|| parent.letter_spacing.clone()),
        }
    }
}

/// Page size, orientation and margins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSetup {
    pub size: String,
    pub orientation: String,
    pub margin_top: String,
    pub margin_bottom: String,
    pub margin_left: String,
    pub margin_right: String,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            size: "A4".to_string(),
            orientation: "portrait".to_string(),
            margin_top: "2.54cm".to_string(),
            margin_bottom: "2.54cm".to_string(),
            margin_left: "3.18cm".to_string(),
            margin_right: "3.18cm".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooter {
    pub header: Option<String>,
    pub footer: Option<String>,
    pub page_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub count: u8,
    pub gap: Option<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self { count: 1, gap: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Watermark {
    pub text: String,
    pub color: Option<String>,
    pub opacity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOfContents {
    pub title: String,
    pub max_level: u8,
}

impl Default for TableOfContents {
    fn default() -> Self {
        Self {
            title: "Contents".to_string(),
            max_level: 3,
        }
    }
}

/// Document-wide settings that live outside the block tree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub page: PageSetup,
    pub header_footer: HeaderFooter,
    pub columns: Columns,
    pub watermark: Option<Watermark>,
    pub toc: Option<TableOfContents>,
    /// Setting changes still under review
    pub pending: Vec<PendingSetting>,
}

/// A setting change saved mid-review. The proposed value is already live in
/// the settings; `values` keeps `{previous, proposed}` as JSON so the change
/// can still be rejected after a reopen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingSetting {
    pub change: String,
    /// page, header_footer, columns, watermark, toc or style
    pub setting: String,
    pub summary: String,
    pub before: String,
    pub after: String,
    pub values: String,
}

impl Settings {
    pub fn is_default(&self) -> bool {
        *self == Settings::default()
    }
}

impl Block {
    pub fn new(id: String, kind: BlockKind) -> Self {
        let content = Content::for_kind(&kind);
        Self {
            id,
            kind,
            style: None,
            attrs: BlockAttrs::default(),
            change: None,
            content,
        }
    }

    pub fn with_inlines(mut self, inlines: Vec<Inline>) -> Self {
        self.content = Content::Inline(inlines);
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.content = Content::Blocks(blocks);
        self
    }

    pub fn inlines(&self) -> Option<&Vec<Inline>> {
        match &self.content {
            Content::Inline(inlines) => Some(inlines),
            _ => None,
        }
    }

    pub fn inlines_mut(&mut self) -> Option<&mut Vec<Inline>> {
        match &mut self.content {
            Content::Inline(inlines) => Some(inlines),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Block] {
        match &self.content {
            Content::Blocks(blocks) => blocks,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Block>> {
        match &mut self.content {
            Content::Blocks(blocks) => Some(blocks),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.change.is_some()
    }

    /// Text as it reads with every pending change accepted: old fragments
    /// are skipped, new fragments are included. Nested blocks are joined
    /// with newlines.
    pub fn visible_text(&self) -> String {
        match &self.content {
            Content::Inline(inlines) => {
                let mut out = String::new();
                push_visible(inlines, &mut out);
                out
            }
            Content::Blocks(blocks) => blocks
                .iter()
                .filter(|b| !matches!(b.change, Some(ChangeMark { side: Side::Old, .. })))
                .map(Block::visible_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Content::Empty => String::new(),
        }
    }

    /// Assign fresh ids to this block and every nested block
    pub fn reassign_ids(&mut self, next_id: &mut impl FnMut() -> String) {
        self.id = next_id();
        if let Content::Blocks(children) = &mut self.content {
            for child in children {
                child.reassign_ids(next_id);
            }
        }
    }
}

fn push_visible(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(run) => out.push_str(&run.text),
            Inline::Change(change) if change.side == Side::New => push_visible(&change.children, out),
            Inline::Change(_) => {}
        }
    }
}

/// Heading entry returned by outline extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub block_id: String,
    pub level: u8,
    pub text: String,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a block anywhere in the tree by id
    pub fn find_block(&self, id: &str) -> Option<&Block> {
        fn find<'a>(blocks: &'a [Block], id: &str) -> Option<&'a Block> {
            for block in blocks {
                if block.id == id {
                    return Some(block);
                }
                if let Some(found) = find(block.children(), id) {
                    return Some(found);
                }
            }
            None
        }
        find(&self.blocks, id)
    }

    /// Index path from the root to a block (e.g. `[2, 0, 1]` = third root
    /// block, its first child, that child's second child)
    pub fn path_of(&self, id: &str) -> Option<Vec<usize>> {
        fn search(blocks: &[Block], id: &str, path: &mut Vec<usize>) -> bool {
            for (i, block) in blocks.iter().enumerate() {
                path.push(i);
                if block.id == id || search(block.children(), id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        search(&self.blocks, id, &mut path).then_some(path)
    }

    pub fn block_at(&self, path: &[usize]) -> Option<&Block> {
        let (first, rest) = path.split_first()?;
        let mut block = self.blocks.get(*first)?;
        for index in rest {
            block = block.children().get(*index)?;
        }
        Some(block)
    }

    pub fn block_at_mut(&mut self, path: &[usize]) -> Option<&mut Block> {
        let (first, rest) = path.split_first()?;
        let mut block = self.blocks.get_mut(*first)?;
        for index in rest {
            block = block.children_mut()?.get_mut(*index)?;
        }
        Some(block)
    }

    /// The sibling list that contains the block at `path`
    pub fn siblings_mut(&mut self, path: &[usize]) -> Option<&mut Vec<Block>> {
        match path.split_last() {
            Some((_, [])) => Some(&mut self.blocks),
            Some((_, parent)) => self.block_at_mut(parent)?.children_mut(),
            None => None,
        }
    }
}
