//! # Operations
//!
//! JSON-shaped operation descriptors as the tool-calling loop sends them:
//!
//! ```json
//! { "type": "replace_text",
//!   "target": { "scope": "document", "text": "world" },
//!   "params": { "replace": "earth" },
//!   "dry_run": false }
//! ```
//!
//! `type` stays a string until dispatch so an unknown type can be reported
//! per operation instead of failing the whole batch. `params` are decoded
//! into the typed struct for the operation kind; a decode failure is an
//! `InvalidOpShape`.

use crate::errors::{EditError, EditResult};
use revisor_markup::ast::{BlockAttrs, MarkPatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub dry_run: bool,
}

impl Operation {
    pub fn new(op_type: impl Into<String>, target: Target, params: Value) -> Self {
        Self {
            op_type: op_type.into(),
            target,
            params,
            dry_run: false,
        }
    }

    pub fn kind(&self) -> EditResult<OpKind> {
        self.op_type.parse()
    }

    /// Decode `params` into the struct for this operation kind
    pub fn params<T: DeserializeOwned>(&self) -> EditResult<T> {
        let params = match &self.params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(params).map_err(|e| EditError::InvalidOpShape(format!("{}: {}", self.op_type, e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub filter: Option<Filter>,
}

impl Target {
    pub fn document() -> Self {
        Self::default()
    }

    pub fn anchor(text: impl Into<String>) -> Self {
        Self {
            scope: Scope::AnchorText,
            text: Some(text.into()),
            filter: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            scope: Scope::Document,
            text: Some(text.into()),
            filter: None,
        }
    }

    pub fn selection() -> Self {
        Self {
            scope: Scope::Selection,
            ..Self::default()
        }
    }

    pub fn rule(filter: Filter) -> Self {
        Self {
            scope: Scope::Rule,
            text: None,
            filter: Some(filter),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Selection,
    #[default]
    Document,
    AnchorText,
    Rule,
}

/// Block criteria for `scope: "rule"`. Every given field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// `paragraph`, `heading`, `list_item`, `table`, `image`, ...
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    /// Heading level
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub block_ids: Vec<String>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        *self == Filter::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    ReplaceText,
    FormatText,
    FormatParagraph,
    ApplyStyle,
    DefineStyle,
    ModifyStyle,
    ClearFormat,
    CopyFormat,
    ListEdit,
    InsertPageBreak,
    StructureEdit,
    TableEdit,
    ImageEdit,
    PageSetup,
    HeaderFooter,
    Columns,
    Watermark,
    Toc,
}

impl OpKind {
    pub const ALL: [OpKind; 18] = [
        OpKind::ReplaceText,
        OpKind::FormatText,
        OpKind::FormatParagraph,
        OpKind::ApplyStyle,
        OpKind::DefineStyle,
        OpKind::ModifyStyle,
        OpKind::ClearFormat,
        OpKind::CopyFormat,
        OpKind::ListEdit,
        OpKind::InsertPageBreak,
        OpKind::StructureEdit,
        OpKind::TableEdit,
        OpKind::ImageEdit,
        OpKind::PageSetup,
        OpKind::HeaderFooter,
        OpKind::Columns,
        OpKind::Watermark,
        OpKind::Toc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::ReplaceText => "replace_text",
            OpKind::FormatText => "format_text",
            OpKind::FormatParagraph => "format_paragraph",
            OpKind::ApplyStyle => "apply_style",
            OpKind::DefineStyle => "define_style",
            OpKind::ModifyStyle => "modify_style",
            OpKind::ClearFormat => "clear_format",
            OpKind::CopyFormat => "copy_format",
            OpKind::ListEdit => "list_edit",
            OpKind::InsertPageBreak => "insert_page_break",
            OpKind::StructureEdit => "structure_edit",
            OpKind::TableEdit => "table_edit",
            OpKind::ImageEdit => "image_edit",
            OpKind::PageSetup => "page_setup",
            OpKind::HeaderFooter => "header_footer",
            OpKind::Columns => "columns",
            OpKind::Watermark => "watermark",
            OpKind::Toc => "toc",
        }
    }

    /// Kinds that change a live setting instead of tagging the tree
    pub fn is_setting(&self) -> bool {
        matches!(
            self,
            OpKind::PageSetup
                | OpKind::HeaderFooter
                | OpKind::DefineStyle
                | OpKind::ModifyStyle
                | OpKind::Columns
                | OpKind::Watermark
                | OpKind::Toc
        )
    }
}

impl FromStr for OpKind {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EditError::UnknownOpType(s.to_string()))
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a new block goes relative to its reference block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Before,
    After,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplaceParams {
    /// Defaults to `target.text`
    #[serde(default)]
    pub search: Option<String>,
    pub replace: String,
    /// `false` replaces the first match only
    #[serde(default = "default_true")]
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplyStyleParams {
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StyleParams {
    pub name: String,
    #[serde(default)]
    pub based_on: Option<String>,
    #[serde(flatten)]
    pub marks: MarkPatch,
    #[serde(flatten)]
    pub paragraph: BlockAttrs,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CopyFormatParams {
    /// Anchor text of the block whose format is copied
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListAction {
    ToBullet,
    ToNumbered,
    ToParagraph,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListEditParams {
    pub action: ListAction,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageBreakParams {
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StructureAction {
    MoveBlock {
        /// Anchor text of the block to move next to
        destination: String,
        #[serde(default)]
        position: Position,
    },
    ExtractOutline,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TableAction {
    InsertRow {
        /// Defaults to appending
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        cells: Vec<String>,
    },
    DeleteRow {
        index: usize,
    },
    SetCell {
        row: usize,
        col: usize,
        text: String,
    },
    InsertTable {
        rows: usize,
        cols: usize,
        #[serde(default)]
        position: Position,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ImageAction {
    Resize {
        width: String,
    },
    Replace {
        url: String,
    },
    Insert {
        url: String,
        #[serde(default)]
        width: Option<String>,
        #[serde(default)]
        alt: Option<String>,
        #[serde(default)]
        position: Position,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageSetupParams {
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub orientation: Option<String>,
    #[serde(default)]
    pub margin_top: Option<String>,
    #[serde(default)]
    pub margin_bottom: Option<String>,
    #[serde(default)]
    pub margin_left: Option<String>,
    #[serde(default)]
    pub margin_right: Option<String>,
}

impl PageSetupParams {
    pub fn is_empty(&self) -> bool {
        *self == PageSetupParams::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HeaderFooterParams {
    /// An empty string removes the header
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub page_numbers: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnsParams {
    pub count: u8,
    #[serde(default)]
    pub gap: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WatermarkParams {
    /// Absent or empty removes the watermark
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub opacity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TocParams {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub max_level: Option<u8>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}
