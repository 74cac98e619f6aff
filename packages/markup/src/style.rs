//! Named styles.
//!
//! A style bundles character formatting (`MarkPatch`) and paragraph
//! formatting (`BlockAttrs`) and may inherit from another style through
//! `based_on`. Inheritance is resolved at lookup time by shallow merging
//! child over parent, so editing a parent style retroactively changes every
//! style derived from it.

use crate::ast::{BlockAttrs, MarkPatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NORMAL: &str = "Normal";
pub const BUILTIN_STYLES: [&str; 4] = [NORMAL, "Heading1", "Heading2", "Heading3"];

/// Longest `based_on` chain followed before giving up
const MAX_INHERITANCE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub name: String,
    pub based_on: Option<String>,
    #[serde(default)]
    pub marks: MarkPatch,
    #[serde(default)]
    pub paragraph: BlockAttrs,
}

impl Style {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            based_on: None,
            marks: MarkPatch::default(),
            paragraph: BlockAttrs::default(),
        }
    }

    pub fn based_on(mut self, parent: impl Into<String>) -> Self {
        self.based_on = Some(parent.into());
        self
    }

    pub fn is_builtin(&self) -> bool {
        is_builtin(&self.name)
    }
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_STYLES.contains(&name)
}

/// Heading level a built-in heading style maps to
pub fn heading_level(name: &str) -> Option<u8> {
    match name {
        "Heading1" => Some(1),
        "Heading2" => Some(2),
        "Heading3" => Some(3),
        _ => None,
    }
}

/// Effective formatting of a style after inheritance
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvedStyle {
    pub marks: MarkPatch,
    pub paragraph: BlockAttrs,
}

/// Style table of a document. Built-in styles always exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheet {
    styles: BTreeMap<String, Style>,
}

impl Default for StyleSheet {
    fn default() -> Self {
        let mut styles = BTreeMap::new();
        for style in builtin_styles() {
            styles.insert(style.name.clone(), style);
        }
        Self { styles }
    }
}

fn builtin_styles() -> Vec<Style> {
    let heading = |name: &str, size: &str| {
        let mut style = Style::new(name).based_on(NORMAL);
        style.marks.bold = Some(true);
        style.marks.font_size = Some(size.to_string());
        style.paragraph.spacing_before = Some("12pt".to_string());
        style.paragraph.spacing_after = Some("6pt".to_string());
        style
    };

    let mut normal = Style::new(NORMAL);
    normal.marks.font_size = Some("11pt".to_string());

    vec![
        normal,
        heading("Heading1", "20pt"),
        heading("Heading2", "16pt"),
        heading("Heading3", "14pt"),
    ]
}

impl StyleSheet {
    pub fn get(&self, name: &str) -> Option<&Style> {
        self.styles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// Insert or replace a style, returning the previous definition
    pub fn set(&mut self, style: Style) -> Option<Style> {
        self.styles.insert(style.name.clone(), style)
    }

    /// Remove a user-defined style. Built-in styles are never removed.
    pub fn remove(&mut self, name: &str) -> Option<Style> {
        if is_builtin(name) {
            return None;
        }
        self.styles.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Style> {
        self.styles.values()
    }

    /// Styles that differ from a fresh sheet (what needs serializing)
    pub fn customized(&self) -> impl Iterator<Item = &Style> {
        let defaults = StyleSheet::default();
        self.styles
            .values()
            .filter(move |style| defaults.get(&style.name) != Some(*style))
    }

    /// Resolve a style through its `based_on` chain. Missing parents end the
    /// chain; cycles are cut at the first repeated name.
    pub fn resolve(&self, name: &str) -> Option<ResolvedStyle> {
        let mut style = self.get(name)?;
        let mut resolved = ResolvedStyle {
            marks: style.marks.clone(),
            paragraph: style.paragraph.clone(),
        };
        let mut seen = vec![style.name.as_str()];

        while let Some(parent_name) = style.based_on.as_deref() {
            if seen.contains(&parent_name) || seen.len() >= MAX_INHERITANCE_DEPTH {
                break;
            }
            let Some(parent) = self.get(parent_name) else {
                break;
            };
            resolved.marks = resolved.marks.over(&parent.marks);
            resolved.paragraph = resolved.paragraph.over(&parent.paragraph);
            seen.push(parent_name);
            style = parent;
        }

        Some(resolved)
    }
}
