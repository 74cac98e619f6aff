use crate::ast::*;
use crate::style::Style;
use crate::tokenizer::{escape_attr, escape_text};

/// Serializer converts a document tree back to markup.
///
/// Output is canonical: attributes are written in a fixed order, nested
/// formatting is emitted per run, and block structure is indented. Parsing
/// the output and serializing again yields the same text.
pub struct Serializer {
    indent_level: usize,
    indent_string: String,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_string: "  ".to_string(),
        }
    }

    /// Serialize a Document to markup
    pub fn serialize(&mut self, doc: &Document) -> String {
        let mut output = String::new();

        if !doc.settings.is_default() {
            self.serialize_settings(&doc.settings, &mut output);
        }

        let styles: Vec<&Style> = doc.styles.customized().collect();
        if !styles.is_empty() {
            output.push_str("<styles>\n");
            self.indent_level += 1;
            for style in styles {
                self.write_indent(&mut output);
                serialize_style(style, &mut output);
                output.push('\n');
            }
            self.indent_level -= 1;
            output.push_str("</styles>\n");
        }

        for block in &doc.blocks {
            self.serialize_block(block, &mut output);
        }

        output
    }

    fn serialize_settings(&mut self, settings: &Settings, output: &mut String) {
        output.push_str("<meta>\n");
        self.indent_level += 1;

        if settings.page != PageSetup::default() {
            let page = &settings.page;
            self.write_indent(output);
            output.push_str("<page");
            write_attr(output, "size", &page.size);
            write_attr(output, "orientation", &page.orientation);
            write_attr(output, "margin-top", &page.margin_top);
            write_attr(output, "margin-bottom", &page.margin_bottom);
            write_attr(output, "margin-left", &page.margin_left);
            write_attr(output, "margin-right", &page.margin_right);
            output.push_str("/>\n");
        }

        let hf = &settings.header_footer;
        if let Some(header) = &hf.header {
            self.write_indent(output);
            output.push_str("<header>");
            output.push_str(&escape_text(header));
            output.push_str("</header>\n");
        }
        if hf.footer.is_some() || hf.page_numbers {
            self.write_indent(output);
            output.push_str("<footer");
            if hf.page_numbers {
                output.push_str(" page-numbers");
            }
            output.push('>');
            output.push_str(&escape_text(hf.footer.as_deref().unwrap_or("")));
            output.push_str("</footer>\n");
        }

        if settings.columns != Columns::default() {
            self.write_indent(output);
            output.push_str("<columns");
            write_attr(output, "count", &settings.columns.count.to_string());
            if let Some(gap) = &settings.columns.gap {
                write_attr(output, "gap", gap);
            }
            output.push_str("/>\n");
        }

        if let Some(watermark) = &settings.watermark {
            self.write_indent(output);
            output.push_str("<watermark");
            write_attr(output, "text", &watermark.text);
            if let Some(color) = &watermark.color {
                write_attr(output, "color", color);
            }
            if let Some(opacity) = &watermark.opacity {
                write_attr(output, "opacity", opacity);
            }
            output.push_str("/>\n");
        }

        if let Some(toc) = &settings.toc {
            self.write_indent(output);
            output.push_str("<toc");
            write_attr(output, "title", &toc.title);
            write_attr(output, "max-level", &toc.max_level.to_string());
            output.push_str("/>\n");
        }

        for pending in &settings.pending {
            self.write_indent(output);
            output.push_str("<pending");
            write_attr(output, "change", &pending.change);
            write_attr(output, "setting", &pending.setting);
            write_attr(output, "summary", &pending.summary);
            write_attr(output, "before", &pending.before);
            write_attr(output, "after", &pending.after);
            write_attr(output, "values", &pending.values);
            output.push_str("/>\n");
        }

        self.indent_level -= 1;
        output.push_str("</meta>\n");
    }

    fn serialize_block(&mut self, block: &Block, output: &mut String) {
        self.write_indent(output);
        let tag = block.kind.tag();
        output.push('<');
        output.push_str(tag);

        match &block.kind {
            BlockKind::ListItem { ordered: true } => output.push_str(" ordered"),
            BlockKind::Image { url, width, alt } => {
                write_attr(output, "src", url);
                if let Some(width) = width {
                    write_attr(output, "width", width);
                }
                if let Some(alt) = alt {
                    write_attr(output, "alt", alt);
                }
            }
            _ => {}
        }

        if let Some(style) = &block.style {
            write_attr(output, "style-name", style);
        }
        for (name, value) in block.attrs.entries() {
            write_attr(output, name, value);
        }
        if let Some(mark) = &block.change {
            write_attr(output, "change", &mark.id);
            write_attr(output, "side", mark.side.as_str());
        }

        match &block.content {
            Content::Empty => output.push_str("/>\n"),
            Content::Inline(inlines) => {
                output.push('>');
                serialize_inlines(inlines, output);
                close_tag(tag, output);
                output.push('\n');
            }
            Content::Blocks(children) if children.is_empty() => {
                output.push('>');
                close_tag(tag, output);
                output.push('\n');
            }
            Content::Blocks(children) => {
                output.push_str(">\n");
                self.indent_level += 1;
                for child in children {
                    self.serialize_block(child, output);
                }
                self.indent_level -= 1;
                self.write_indent(output);
                close_tag(tag, output);
                output.push('\n');
            }
        }
    }

    fn write_indent(&self, output: &mut String) {
        for _ in 0..self.indent_level {
            output.push_str(&self.indent_string);
        }
    }
}

/// Serialize inline content without any surrounding block tag
pub fn serialize_inlines(inlines: &[Inline], output: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(run) => serialize_run(run, output),
            Inline::Change(change) => {
                let tag = match change.side {
                    Side::Old => "del",
                    Side::New => "ins",
                };
                output.push('<');
                output.push_str(tag);
                write_attr(output, "change", &change.id);
                output.push('>');
                serialize_inlines(&change.children, output);
                close_tag(tag, output);
            }
        }
    }
}

fn serialize_run(run: &TextRun, output: &mut String) {
    let marks = &run.marks;
    let mut wrappers: Vec<&str> = Vec::new();

    let has_span = marks.color.is_some()
        || marks.background.is_some()
        || marks.font_family.is_some()
        || marks.font_size.is_some()
        || marks.letter_spacing.is_some();
    if has_span {
        output.push_str("<span");
        for (name, value) in [
            ("color", &marks.color),
            ("bg", &marks.background),
            ("font", &marks.font_family),
            ("size", &marks.font_size),
            ("spacing", &marks.letter_spacing),
        ] {
            if let Some(value) = value {
                write_attr(output, name, value);
            }
        }
        output.push('>');
        wrappers.push("span");
    }

    for (enabled, tag) in [
        (marks.bold, "b"),
        (marks.italic, "i"),
        (marks.underline, "u"),
        (marks.strikethrough, "s"),
        (marks.superscript, "sup"),
        (marks.subscript, "sub"),
    ] {
        if enabled {
            output.push('<');
            output.push_str(tag);
            output.push('>');
            wrappers.push(tag);
        }
    }

    output.push_str(&escape_text(&run.text));

    for tag in wrappers.iter().rev() {
        close_tag(tag, output);
    }
}

fn serialize_style(style: &Style, output: &mut String) {
    output.push_str("<style");
    write_attr(output, "name", &style.name);
    if let Some(parent) = &style.based_on {
        write_attr(output, "based-on", parent);
    }

    let marks = &style.marks;
    for (name, flag) in [
        ("bold", marks.bold),
        ("italic", marks.italic),
        ("underline", marks.underline),
        ("strikethrough", marks.strikethrough),
        ("superscript", marks.superscript),
        ("subscript", marks.subscript),
    ] {
        match flag {
            Some(true) => {
                output.push(' ');
                output.push_str(name);
            }
            Some(false) => write_attr(output, name, "false"),
            None => {}
        }
    }
    for (name, value) in [
        ("color", &marks.color),
        ("bg", &marks.background),
        ("font", &marks.font_family),
        ("size", &marks.font_size),
        ("spacing", &marks.letter_spacing),
    ] {
        if let Some(value) = value {
            write_attr(output, name, value);
        }
    }
    for (name, value) in style.paragraph.entries() {
        write_attr(output, name, value);
    }
    output.push_str("/>");
}

fn write_attr(output: &mut String, name: &str, value: &str) {
    output.push(' ');
    output.push_str(name);
    output.push_str("=\"");
    output.push_str(&escape_attr(value));
    output.push('"');
}

fn close_tag(tag: &str, output: &mut String) {
    output.push_str("</");
    output.push_str(tag);
    output.push('>');
}

/// Convenience function to serialize a document
pub fn serialize(doc: &Document) -> String {
    Serializer::new().serialize(doc)
}
