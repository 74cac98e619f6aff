use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::id_generator::IDGenerator;
use crate::normalize::normalize_inlines;
use crate::style::Style;
use crate::tokenizer::{close_tag_name, parse_tag_head, tokenize, unescape, TagHead, Token};
use std::ops::Range;

/// Parser for Revisor markup
pub struct Parser<'src> {
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    source_len: usize,
    id_generator: IDGenerator,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, id_generator: IDGenerator) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            source_len: source.len(),
            id_generator,
        })
    }

    /// Hand back the id generator so callers can keep numbering blocks
    pub fn into_id_generator(self) -> IDGenerator {
        self.id_generator
    }

    /// Parse a complete document
    pub fn parse_document(&mut self) -> ParseResult<Document> {
        let mut doc = Document::new();

        loop {
            self.skip_whitespace();
            let Some((token, span)) = self.peek().cloned() else {
                break;
            };

            match token {
                Token::OpenTag(slice) => {
                    self.advance();
                    let head = parse_tag_head(slice, span.start)?;
                    match head.name {
                        "meta" => self.parse_meta(&head, &mut doc.settings)?,
                        "styles" => self.parse_styles(&head, &mut doc)?,
                        _ => {
                            let block = self.parse_block(&head, span.start)?;
                            doc.blocks.push(block);
                        }
                    }
                }
                Token::CloseTag(slice) => {
                    return Err(ParseError::unexpected_token(
                        span.start,
                        "block tag",
                        format!("</{}>", close_tag_name(slice)),
                    ));
                }
                Token::Text(_) => {
                    return Err(ParseError::invalid_syntax(span.start, "text outside of a block"));
                }
            }
        }

        Ok(doc)
    }

    fn parse_block(&mut self, head: &TagHead<'src>, pos: usize) -> ParseResult<Block> {
        let kind = block_kind(head, pos)?;
        let mut block = Block::new(self.id_generator.new_id(), kind);
        apply_block_attrs(head, &mut block, pos)?;

        if head.self_closing {
            return Ok(block);
        }

        if block.kind.holds_text() {
            let mut inlines = Vec::new();
            self.parse_inlines(head.name, &Marks::default(), &mut inlines)?;
            block.content = Content::Inline(normalize_inlines(inlines));
        } else if block.kind.holds_blocks() {
            block.content = Content::Blocks(self.parse_child_blocks(head.name, &block.kind)?);
        } else {
            self.skip_whitespace();
            self.expect_close(head.name)?;
        }

        Ok(block)
    }

    fn parse_child_blocks(&mut self, parent: &str, kind: &BlockKind) -> ParseResult<Vec<Block>> {
        let mut children = Vec::new();

        loop {
            self.skip_whitespace();
            let Some((token, span)) = self.peek().cloned() else {
                return Err(ParseError::unexpected_eof(self.source_len));
            };

            match token {
                Token::CloseTag(_) => {
                    self.expect_close(parent)?;
                    return Ok(children);
                }
                Token::OpenTag(slice) => {
                    let head = parse_tag_head(slice, span.start)?;
                    if *kind == BlockKind::TableCell && is_inline_tag(head.name) {
                        children.push(self.parse_implicit_paragraph(parent)?);
                        return Ok(children);
                    }
                    self.advance();
                    children.push(self.parse_block(&head, span.start)?);
                }
                Token::Text(_) if *kind == BlockKind::TableCell => {
                    children.push(self.parse_implicit_paragraph(parent)?);
                    return Ok(children);
                }
                Token::Text(_) => {
                    return Err(ParseError::invalid_syntax(
                        span.start,
                        format!("text directly inside <{}>", parent),
                    ));
                }
            }
        }
    }

    /// `<td>plain text</td>` is shorthand for `<td><p>plain text</p></td>`
    fn parse_implicit_paragraph(&mut self, parent: &str) -> ParseResult<Block> {
        let mut inlines = Vec::new();
        self.parse_inlines(parent, &Marks::default(), &mut inlines)?;
        Ok(Block::new(self.id_generator.new_id(), BlockKind::Paragraph)
            .with_inlines(normalize_inlines(inlines)))
    }

    /// Parse inline content up to and including `</close>`. Formatting
    /// wrappers are flattened into the marks of the runs they contain.
    fn parse_inlines(&mut self, close: &str, marks: &Marks, out: &mut Vec<Inline>) -> ParseResult<()> {
        loop {
            let Some((token, span)) = self.advance().cloned() else {
                return Err(ParseError::unexpected_eof(self.source_len));
            };

            match token {
                Token::Text(text) => out.push(Inline::text(unescape(text), marks.clone())),
                Token::CloseTag(slice) => {
                    let name = close_tag_name(slice);
                    if name == close {
                        return Ok(());
                    }
                    return Err(ParseError::mismatched_close(span.start, close, name));
                }
                Token::OpenTag(slice) => {
                    let head = parse_tag_head(slice, span.start)?;
                    if head.self_closing {
                        // Empty wrapper carries no text
                        continue;
                    }
                    match head.name {
                        "del" | "ins" => {
                            let id = head.attr("change").ok_or_else(|| {
                                ParseError::invalid_attribute(span.start, format!("<{}> needs a change id", head.name))
                            })?;
                            let side = if head.name == "del" { Side::Old } else { Side::New };
                            let mut children = Vec::new();
                            self.parse_inlines(head.name, marks, &mut children)?;
                            out.push(Inline::Change(InlineChange {
                                id: unescape(id),
                                side,
                                children,
                            }));
                        }
                        name if is_inline_tag(name) => {
                            let nested = inline_marks(&head, marks);
                            self.parse_inlines(name, &nested, out)?;
                        }
                        name => {
                            return Err(ParseError::unexpected_token(
                                span.start,
                                "inline content",
                                format!("<{}>", name),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn parse_meta(&mut self, head: &TagHead<'src>, settings: &mut Settings) -> ParseResult<()> {
        if head.self_closing {
            return Ok(());
        }

        loop {
            self.skip_whitespace();
            let Some((token, span)) = self.advance().cloned() else {
                return Err(ParseError::unexpected_eof(self.source_len));
            };

            match token {
                Token::CloseTag(slice) if close_tag_name(slice) == "meta" => return Ok(()),
                Token::OpenTag(slice) => {
                    let item = parse_tag_head(slice, span.start)?;
                    match item.name {
                        "page" => {
                            let page = &mut settings.page;
                            for (name, slot) in [
                                ("size", &mut page.size),
                                ("orientation", &mut page.orientation),
                                ("margin-top", &mut page.margin_top),
                                ("margin-bottom", &mut page.margin_bottom),
                                ("margin-left", &mut page.margin_left),
                                ("margin-right", &mut page.margin_right),
                            ] {
                                if let Some(value) = item.attr(name) {
                                    *slot = unescape(value);
                                }
                            }
                        }
                        "header" => {
                            settings.header_footer.header = Some(self.parse_plain_text(&item)?);
                        }
                        "footer" => {
                            settings.header_footer.page_numbers = item.flag("page-numbers");
                            let text = self.parse_plain_text(&item)?;
                            settings.header_footer.footer = (!text.is_empty()).then_some(text);
                        }
                        "columns" => {
                            settings.columns.count = parse_number(&item, "count", span.start)?.unwrap_or(1);
                            settings.columns.gap = item.attr("gap").map(unescape);
                        }
                        "watermark" => {
                            settings.watermark = Some(Watermark {
                                text: item.attr("text").map(unescape).unwrap_or_default(),
                                color: item.attr("color").map(unescape),
                                opacity: item.attr("opacity").map(unescape),
                            });
                        }
                        "toc" => {
                            let mut toc = TableOfContents::default();
                            if let Some(title) = item.attr("title") {
                                toc.title = unescape(title);
                            }
                            if let Some(level) = parse_number(&item, "max-level", span.start)? {
                                toc.max_level = level;
                            }
                            settings.toc = Some(toc);
                        }
                        "pending" => {
                            let change = item
                                .attr("change")
                                .ok_or_else(|| ParseError::invalid_attribute(span.start, "<pending> needs a change id"))?;
                            let text = |name: &str| item.attr(name).map(unescape).unwrap_or_default();
                            settings.pending.push(PendingSetting {
                                change: unescape(change),
                                setting: text("setting"),
                                summary: text("summary"),
                                before: text("before"),
                                after: text("after"),
                                values: text("values"),
                            });
                        }
                        other => {
                            return Err(ParseError::unexpected_token(span.start, "setting", format!("<{}>", other)));
                        }
                    }
                    if !item.self_closing && !matches!(item.name, "header" | "footer") {
                        self.skip_whitespace();
                        self.expect_close(item.name)?;
                    }
                }
                other => {
                    return Err(ParseError::unexpected_token(span.start, "setting or </meta>", other.to_string()));
                }
            }
        }
    }

    fn parse_styles(&mut self, head: &TagHead<'src>, doc: &mut Document) -> ParseResult<()> {
        if head.self_closing {
            return Ok(());
        }

        loop {
            self.skip_whitespace();
            let Some((token, span)) = self.advance().cloned() else {
                return Err(ParseError::unexpected_eof(self.source_len));
            };

            match token {
                Token::CloseTag(slice) if close_tag_name(slice) == "styles" => return Ok(()),
                Token::OpenTag(slice) => {
                    let item = parse_tag_head(slice, span.start)?;
                    if item.name != "style" {
                        return Err(ParseError::unexpected_token(span.start, "<style>", format!("<{}>", item.name)));
                    }
                    let style = style_from_head(&item, span.start)?;
                    doc.styles.set(style);
                    if !item.self_closing {
                        self.skip_whitespace();
                        self.expect_close("style")?;
                    }
                }
                other => {
                    return Err(ParseError::unexpected_token(span.start, "<style> or </styles>", other.to_string()));
                }
            }
        }
    }

    /// Text content of a simple element such as `<header>`
    fn parse_plain_text(&mut self, head: &TagHead<'src>) -> ParseResult<String> {
        if head.self_closing {
            return Ok(String::new());
        }
        let mut text = String::new();
        loop {
            let Some((token, span)) = self.advance().cloned() else {
                return Err(ParseError::unexpected_eof(self.source_len));
            };
            match token {
                Token::Text(t) => text.push_str(&unescape(t)),
                Token::CloseTag(slice) if close_tag_name(slice) == head.name => return Ok(text),
                other => {
                    return Err(ParseError::unexpected_token(
                        span.start,
                        format!("text or </{}>", head.name),
                        other.to_string(),
                    ))
                }
            }
        }
    }

    fn expect_close(&mut self, name: &str) -> ParseResult<()> {
        match self.advance().cloned() {
            Some((Token::CloseTag(slice), span)) => {
                let found = close_tag_name(slice);
                if found == name {
                    Ok(())
                } else {
                    Err(ParseError::mismatched_close(span.start, name, found))
                }
            }
            Some((other, span)) => Err(ParseError::unexpected_token(
                span.start,
                format!("</{}>", name),
                other.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(self.source_len)),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some((Token::Text(text), _)) = self.peek() {
            if !text.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }
}

fn is_inline_tag(name: &str) -> bool {
    matches!(name, "b" | "i" | "u" | "s" | "sup" | "sub" | "span" | "del" | "ins")
}

fn block_kind(head: &TagHead<'_>, pos: usize) -> ParseResult<BlockKind> {
    let kind = match head.name {
        "p" => BlockKind::Paragraph,
        "h1" => BlockKind::Heading { level: 1 },
        "h2" => BlockKind::Heading { level: 2 },
        "h3" => BlockKind::Heading { level: 3 },
        "li" => BlockKind::ListItem {
            ordered: head.flag("ordered"),
        },
        "table" => BlockKind::Table,
        "tr" => BlockKind::TableRow,
        "td" => BlockKind::TableCell,
        "div" => BlockKind::Container,
        "pagebreak" => BlockKind::PageBreak,
        "img" => BlockKind::Image {
            url: head
                .attr("src")
                .map(unescape)
                .ok_or_else(|| ParseError::invalid_attribute(pos, "<img> needs a src"))?,
            width: head.attr("width").map(unescape),
            alt: head.attr("alt").map(unescape),
        },
        other => {
            return Err(ParseError::unexpected_token(pos, "block tag", format!("<{}>", other)));
        }
    };
    Ok(kind)
}

fn apply_block_attrs(head: &TagHead<'_>, block: &mut Block, pos: usize) -> ParseResult<()> {
    for (name, value) in &head.attrs {
        let Some(value) = value else { continue };
        match *name {
            "style-name" => block.style = Some(unescape(value)),
            "change" => {
                let side = head
                    .attr("side")
                    .and_then(Side::parse)
                    .ok_or_else(|| ParseError::invalid_attribute(pos, "change marker needs side=\"old\" or side=\"new\""))?;
                block.change = Some(ChangeMark {
                    id: unescape(value),
                    side,
                });
            }
            // Consumed by `block_kind` or by the change marker
            "src" | "width" | "alt" | "side" => {}
            other => {
                // Unknown attributes are dropped
                block.attrs.set(other, unescape(value));
            }
        }
    }
    Ok(())
}

fn inline_marks(head: &TagHead<'_>, marks: &Marks) -> Marks {
    let mut nested = marks.clone();
    match head.name {
        "b" => nested.bold = true,
        "i" => nested.italic = true,
        "u" => nested.underline = true,
        "s" => nested.strikethrough = true,
        "sup" => nested.superscript = true,
        "sub" => nested.subscript = true,
        _ => {}
    }
    let value = |name: &str| head.attr(name).map(unescape);
    if let Some(color) = value("color") {
        nested.color = Some(color);
    }
    if let Some(bg) = value("bg") {
        nested.background = Some(bg);
    }
    if let Some(font) = value("font") {
        nested.font_family = Some(font);
    }
    if let Some(size) = value("size") {
        nested.font_size = Some(size);
    }
    if let Some(spacing) = value("spacing") {
        nested.letter_spacing = Some(spacing);
    }
    nested
}

fn style_from_head(head: &TagHead<'_>, pos: usize) -> ParseResult<Style> {
    let name = head
        .attr("name")
        .map(unescape)
        .ok_or_else(|| ParseError::invalid_attribute(pos, "<style> needs a name"))?;
    let mut style = Style::new(name);
    style.based_on = head.attr("based-on").map(unescape);

    for (attr, value) in &head.attrs {
        let flag = || match value {
            None => Ok(Some(true)),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(ParseError::invalid_attribute(pos, format!("{}=\"{}\" is not a boolean", attr, other))),
        };
        let text = || value.map(unescape);
        let marks = &mut style.marks;
        match *attr {
            "name" | "based-on" => {}
            "bold" => marks.bold = flag()?,
            "italic" => marks.italic = flag()?,
            "underline" => marks.underline = flag()?,
            "strikethrough" => marks.strikethrough = flag()?,
            "superscript" => marks.superscript = flag()?,
            "subscript" => marks.subscript = flag()?,
            "color" => marks.color = text(),
            "bg" => marks.background = text(),
            "font" => marks.font_family = text(),
            "size" => marks.font_size = text(),
            "spacing" => marks.letter_spacing = text(),
            other => {
                if let Some(value) = value {
                    style.paragraph.set(other, unescape(value));
                }
            }
        }
    }

    Ok(style)
}

fn parse_number(head: &TagHead<'_>, name: &str, pos: usize) -> ParseResult<Option<u8>> {
    head.attr(name)
        .map(|v| {
            v.parse::<u8>()
                .map_err(|_| ParseError::invalid_attribute(pos, format!("{}=\"{}\" is not a number", name, v)))
        })
        .transpose()
}

/// Parse markup with block ids seeded from an anonymous document name
pub fn parse(source: &str) -> ParseResult<Document> {
    parse_with_name(source, "<anonymous>")
}

pub fn parse_with_name(source: &str, name: &str) -> ParseResult<Document> {
    parse_with_generator(source, IDGenerator::new(name)).map(|(doc, _)| doc)
}

/// Parse markup and return the id generator positioned after the last
/// block id it handed out
pub fn parse_with_generator(source: &str, id_generator: IDGenerator) -> ParseResult<(Document, IDGenerator)> {
    let mut parser = Parser::new(source, id_generator)?;
    let doc = parser.parse_document()?;
    Ok((doc, parser.into_id_generator()))
}
