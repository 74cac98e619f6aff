//! # Pending-Change Ledger
//!
//! Ordered collection of change records. Each record is either tied to
//! old/new markers in the tree (resolved by tree surgery) or to a setting
//! whose proposed value is already live (resolved by keeping it or by
//! restoring the previous value).
//!
//! ## Dependencies
//!
//! A record may depend on older records, for example when its old fragment
//! carries a fragment of an earlier change, or when it edits a setting that
//! an earlier pending change also edited. Accepting a record accepts its
//! dependencies first; rejecting a record rejects its dependents first.
//! Resolution is the only path that removes a record.

use crate::annotator::visible_text;
use crate::errors::{EditError, EditResult};
use crate::operations::{OpKind, Scope};
use chrono::{DateTime, Utc};
use revisor_common::{walk_block, walk_block_list_mut, walk_change, walk_inline_list_mut, Visitor, VisitorMut};
use revisor_markup::ast::{
    Block, Columns, Document, HeaderFooter, Inline, InlineChange, PageSetup, PendingSetting, Side, TableOfContents,
    Watermark,
};
use revisor_markup::{normalize_inlines, Style};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// What produced a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Operation(OpKind),
    /// Markers found in a document when it was opened
    Recovered,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Operation(kind) => kind.as_str(),
            ChangeKind::Recovered => "recovered",
        }
    }
}

impl Serialize for ChangeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One pending, reviewable edit
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub id: String,
    pub kind: ChangeKind,
    pub scope: Scope,
    pub summary: String,
    pub before_preview: String,
    pub after_preview: String,
    pub match_count: usize,
    pub created_at: DateTime<Utc>,
    pub meta: Value,
    pub depends_on: Vec<String>,
    /// Previous and proposed value of a setting change
    #[serde(skip)]
    pub setting: Option<SettingChange>,
}

impl ChangeRecord {
    pub fn is_setting(&self) -> bool {
        self.setting.is_some()
    }
}

/// Identity of a live setting, used to chain changes to the same value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Page,
    HeaderFooter,
    Columns,
    Watermark,
    Toc,
    Style(String),
}

/// A setting change whose proposed value is live until rejected
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    Page {
        previous: PageSetup,
        proposed: PageSetup,
    },
    HeaderFooter {
        previous: HeaderFooter,
        proposed: HeaderFooter,
    },
    Columns {
        previous: Columns,
        proposed: Columns,
    },
    Watermark {
        previous: Option<Watermark>,
        proposed: Option<Watermark>,
    },
    Toc {
        previous: Option<TableOfContents>,
        proposed: Option<TableOfContents>,
    },
    Style {
        name: String,
        previous: Option<Style>,
        proposed: Style,
    },
}

impl SettingChange {
    pub fn key(&self) -> SettingKey {
        match self {
            SettingChange::Page { .. } => SettingKey::Page,
            SettingChange::HeaderFooter { .. } => SettingKey::HeaderFooter,
            SettingChange::Columns { .. } => SettingKey::Columns,
            SettingChange::Watermark { .. } => SettingKey::Watermark,
            SettingChange::Toc { .. } => SettingKey::Toc,
            SettingChange::Style { name, .. } => SettingKey::Style(name.clone()),
        }
    }

    /// Name stored with a pending setting in `<meta>`
    pub fn name(&self) -> &'static str {
        match self {
            SettingChange::Page { .. } => "page",
            SettingChange::HeaderFooter { .. } => "header_footer",
            SettingChange::Columns { .. } => "columns",
            SettingChange::Watermark { .. } => "watermark",
            SettingChange::Toc { .. } => "toc",
            SettingChange::Style { .. } => "style",
        }
    }

    /// Rebuild a change from its name and the `{previous, proposed}` payload
    /// of [`SettingChange::to_meta`]
    pub fn from_meta(name: &str, meta: &Value) -> Result<Self, serde_json::Error> {
        fn field<T: DeserializeOwned>(meta: &Value, key: &str) -> Result<T, serde_json::Error> {
            serde_json::from_value(meta.get(key).cloned().unwrap_or(Value::Null))
        }
        Ok(match name {
            "page" => SettingChange::Page {
                previous: field(meta, "previous")?,
                proposed: field(meta, "proposed")?,
            },
            "header_footer" => SettingChange::HeaderFooter {
                previous: field(meta, "previous")?,
                proposed: field(meta, "proposed")?,
            },
            "columns" => SettingChange::Columns {
                previous: field(meta, "previous")?,
                proposed: field(meta, "proposed")?,
            },
            "watermark" => SettingChange::Watermark {
                previous: field(meta, "previous")?,
                proposed: field(meta, "proposed")?,
            },
            "toc" => SettingChange::Toc {
                previous: field(meta, "previous")?,
                proposed: field(meta, "proposed")?,
            },
            "style" => {
                let proposed: Style = field(meta, "proposed")?;
                SettingChange::Style {
                    name: proposed.name.clone(),
                    previous: field(meta, "previous")?,
                    proposed,
                }
            }
            other => {
                return Err(serde::de::Error::custom(format!("unknown setting \"{}\"", other)));
            }
        })
    }

    /// Make the proposed value live
    pub fn apply(&self, doc: &mut Document) {
        let settings = &mut doc.settings;
        match self {
            SettingChange::Page { proposed, .. } => settings.page = proposed.clone(),
            SettingChange::HeaderFooter { proposed, .. } => settings.header_footer = proposed.clone(),
            SettingChange::Columns { proposed, .. } => settings.columns = proposed.clone(),
            SettingChange::Watermark { proposed, .. } => settings.watermark = proposed.clone(),
            SettingChange::Toc { proposed, .. } => settings.toc = proposed.clone(),
            SettingChange::Style { proposed, .. } => {
                doc.styles.set(proposed.clone());
            }
        }
    }

    /// Put the previous value back
    pub fn restore(&self, doc: &mut Document) {
        let settings = &mut doc.settings;
        match self {
            SettingChange::Page { previous, .. } => settings.page = previous.clone(),
            SettingChange::HeaderFooter { previous, .. } => settings.header_footer = previous.clone(),
            SettingChange::Columns { previous, .. } => settings.columns = previous.clone(),
            SettingChange::Watermark { previous, .. } => settings.watermark = previous.clone(),
            SettingChange::Toc { previous, .. } => settings.toc = previous.clone(),
            SettingChange::Style { name, previous, .. } => match previous {
                Some(style) => {
                    doc.styles.set(style.clone());
                }
                None => {
                    doc.styles.remove(name);
                }
            },
        }
    }

    /// `{previous, proposed}` payload for the record's `meta`
    pub fn to_meta(&self) -> Value {
        fn encode<T: Serialize>(value: &T) -> Value {
            serde_json::to_value(value).unwrap_or_else(|err| {
                warn!(error = %err, "Setting value could not be encoded");
                Value::Null
            })
        }
        fn pair<T: Serialize>(previous: &T, proposed: &T) -> Value {
            json!({ "previous": encode(previous), "proposed": encode(proposed) })
        }
        match self {
            SettingChange::Page { previous, proposed } => pair(previous, proposed),
            SettingChange::HeaderFooter { previous, proposed } => pair(previous, proposed),
            SettingChange::Columns { previous, proposed } => pair(previous, proposed),
            SettingChange::Watermark { previous, proposed } => pair(previous, proposed),
            SettingChange::Toc { previous, proposed } => pair(previous, proposed),
            SettingChange::Style { previous, proposed, .. } => pair(previous, &Some(proposed.clone())),
        }
    }

    /// The proposed value is already the live one
    pub fn is_noop(&self) -> bool {
        match self {
            SettingChange::Page { previous, proposed } => previous == proposed,
            SettingChange::HeaderFooter { previous, proposed } => previous == proposed,
            SettingChange::Columns { previous, proposed } => previous == proposed,
            SettingChange::Watermark { previous, proposed } => previous == proposed,
            SettingChange::Toc { previous, proposed } => previous == proposed,
            SettingChange::Style { previous, proposed, .. } => previous.as_ref() == Some(proposed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Accept,
    Reject,
}

impl Resolution {
    /// The marker side that survives this resolution
    pub fn kept_side(&self) -> Side {
        match self {
            Resolution::Accept => Side::New,
            Resolution::Reject => Side::Old,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<ChangeRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: ChangeRecord) {
        debug!(change_id = %record.id, kind = record.kind.as_str(), "Recording change");
        self.records.push(record);
    }

    /// Pending setting changes in the form saved inside `<meta>`
    pub fn pending_settings(&self) -> Vec<PendingSetting> {
        self.records
            .iter()
            .filter_map(|record| {
                let setting = record.setting.as_ref()?;
                Some(PendingSetting {
                    change: record.id.clone(),
                    setting: setting.name().to_string(),
                    summary: record.summary.clone(),
                    before: record.before_preview.clone(),
                    after: record.after_preview.clone(),
                    values: setting.to_meta().to_string(),
                })
            })
            .collect()
    }

    /// Most recent pending change to a setting
    pub fn latest_for(&self, key: &SettingKey) -> Option<&ChangeRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.setting.as_ref().map(SettingChange::key).as_ref() == Some(key))
    }

    /// Resolve one change, cascading through its dependencies (accept) or
    /// its dependents (reject). Returns every resolved id in order.
    #[instrument(skip(self, doc))]
    pub fn resolve(&mut self, doc: &mut Document, id: &str, resolution: Resolution) -> EditResult<Vec<String>> {
        if !self.contains(id) {
            return Err(EditError::ResolutionNotFound(id.to_string()));
        }

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        self.cascade(id, resolution, &mut seen, &mut order);

        for change_id in &order {
            if let Some(record) = self.remove(change_id) {
                apply_resolution(doc, &record, resolution);
            }
        }

        info!(resolved = order.len(), "Resolved changes");
        Ok(order)
    }

    /// Resolve every pending change. Accepting walks oldest first, rejecting
    /// newest first.
    #[instrument(skip(self, doc))]
    pub fn resolve_all(&mut self, doc: &mut Document, resolution: Resolution) -> Vec<String> {
        let mut ids: Vec<String> = self.records.iter().map(|r| r.id.clone()).collect();
        if resolution == Resolution::Reject {
            ids.reverse();
        }

        let mut resolved = Vec::new();
        for id in ids {
            // Already resolved by an earlier cascade
            if !self.contains(&id) {
                continue;
            }
            match self.resolve(doc, &id, resolution) {
                Ok(order) => resolved.extend(order),
                Err(err) => warn!(change_id = %id, error = %err, "Could not resolve change"),
            }
        }
        resolved
    }

    fn cascade(&self, id: &str, resolution: Resolution, seen: &mut HashSet<String>, order: &mut Vec<String>) {
        if !seen.insert(id.to_string()) {
            return;
        }
        let Some(record) = self.get(id) else {
            return;
        };

        let first: Vec<String> = match resolution {
            Resolution::Accept => record.depends_on.clone(),
            Resolution::Reject => self
                .records
                .iter()
                .filter(|r| r.depends_on.iter().any(|d| d == id))
                .map(|r| r.id.clone())
                .collect(),
        };
        for other in first {
            self.cascade(&other, resolution, seen, order);
        }
        order.push(id.to_string());
    }

    fn remove(&mut self, id: &str) -> Option<ChangeRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        let record = self.records.remove(index);
        for other in &mut self.records {
            other.depends_on.retain(|d| d != id);
        }
        Some(record)
    }
}

fn apply_resolution(doc: &mut Document, record: &ChangeRecord, resolution: Resolution) {
    debug!(change_id = %record.id, ?resolution, "Applying resolution");
    match (&record.setting, resolution) {
        (Some(_), Resolution::Accept) => {}
        (Some(setting), Resolution::Reject) => setting.restore(doc),
        (None, _) => ResolveMarkers {
            id: &record.id,
            keep: resolution.kept_side(),
        }
        .visit_document_mut(doc),
    }
}

/// Removes the dropped side of one change and unwraps the kept side
struct ResolveMarkers<'a> {
    id: &'a str,
    keep: Side,
}

impl<'a> VisitorMut for ResolveMarkers<'a> {
    fn visit_block_list_mut(&mut self, blocks: &mut Vec<Block>) {
        blocks.retain(|block| match &block.change {
            Some(mark) => mark.id != self.id || mark.side == self.keep,
            None => true,
        });
        for block in blocks.iter_mut() {
            if block.change.as_ref().is_some_and(|mark| mark.id == self.id) {
                block.change = None;
            }
        }
        walk_block_list_mut(self, blocks);
    }

    fn visit_inline_list_mut(&mut self, inlines: &mut Vec<Inline>) {
        walk_inline_list_mut(self, inlines);

        let mut resolved = Vec::with_capacity(inlines.len());
        for inline in std::mem::take(inlines) {
            match inline {
                Inline::Change(change) if change.id == self.id => {
                    if change.side == self.keep {
                        resolved.extend(change.children);
                    }
                }
                other => resolved.push(other),
            }
        }
        *inlines = normalize_inlines(resolved);
    }
}

/// Truncate preview text to `max_chars` characters
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[derive(Debug, Default)]
struct FoundMarker {
    old_text: String,
    new_text: String,
    fragments: usize,
    blocks: usize,
    nested: Vec<String>,
}

impl FoundMarker {
    fn push_text(&mut self, side: Side, text: &str) {
        let slot = match side {
            Side::Old => &mut self.old_text,
            Side::New => &mut self.new_text,
        };
        if !slot.is_empty() && !text.is_empty() {
            slot.push(' ');
        }
        slot.push_str(text);
    }
}

/// Collects every change id present in a tree
#[derive(Debug, Default)]
struct MarkerScan {
    order: Vec<String>,
    found: HashMap<String, FoundMarker>,
    enclosing: Vec<String>,
}

impl MarkerScan {
    fn entry(&mut self, id: &str) -> &mut FoundMarker {
        if !self.found.contains_key(id) {
            self.order.push(id.to_string());
        }
        self.found.entry(id.to_string()).or_default()
    }
}

impl Visitor for MarkerScan {
    fn visit_block(&mut self, block: &Block) {
        if let Some(mark) = &block.change {
            let text = block.visible_text();
            let found = self.entry(&mark.id);
            found.blocks += 1;
            found.push_text(mark.side, &text);
        }
        walk_block(self, block);
    }

    fn visit_change(&mut self, change: &InlineChange) {
        let text = visible_text(&change.children);
        for outer in &self.enclosing {
            if *outer != change.id {
                if let Some(found) = self.found.get_mut(outer) {
                    if !found.nested.contains(&change.id) {
                        found.nested.push(change.id.clone());
                    }
                }
            }
        }

        let found = self.entry(&change.id);
        found.fragments += 1;
        found.push_text(change.side, &text);

        self.enclosing.push(change.id.clone());
        walk_change(self, change);
        self.enclosing.pop();
    }
}

/// Build one record per change id already present in a document, so
/// markers saved mid-review stay resolvable
pub fn recover(doc: &Document, preview_chars: usize) -> Vec<ChangeRecord> {
    let mut scan = MarkerScan::default();
    scan.visit_document(doc);

    let known: HashSet<&String> = scan.order.iter().collect();
    let now = Utc::now();
    scan.order
        .iter()
        .filter_map(|id| {
            let found = scan.found.get(id)?;
            Some(ChangeRecord {
                id: id.clone(),
                kind: ChangeKind::Recovered,
                scope: Scope::Document,
                summary: format!("Pending change {} found in the document", id),
                before_preview: preview(&found.old_text, preview_chars),
                after_preview: preview(&found.new_text, preview_chars),
                match_count: found.fragments + found.blocks,
                created_at: now,
                meta: json!({ "fragments": found.fragments, "blocks": found.blocks }),
                depends_on: found.nested.iter().filter(|n| known.contains(n)).cloned().collect(),
                setting: None,
            })
        })
        .collect()
}

/// Take the pending setting changes saved in `<meta>` out of the document
/// and rebuild their records. A change to a setting depends on the previous
/// pending change to the same setting. Entries that cannot be read are
/// dropped with a warning; their proposed value stays live.
pub fn recover_settings(doc: &mut Document) -> Vec<ChangeRecord> {
    let now = Utc::now();
    let mut records: Vec<ChangeRecord> = Vec::new();

    for pending in std::mem::take(&mut doc.settings.pending) {
        let setting = serde_json::from_str::<Value>(&pending.values)
            .and_then(|meta| SettingChange::from_meta(&pending.setting, &meta));
        let setting = match setting {
            Ok(setting) => setting,
            Err(err) => {
                warn!(change_id = %pending.change, error = %err, "Dropping unreadable pending setting");
                continue;
            }
        };

        let key = setting.key();
        let depends_on: Vec<String> = records
            .iter()
            .rev()
            .find(|r| r.setting.as_ref().map(SettingChange::key).as_ref() == Some(&key))
            .map(|r| vec![r.id.clone()])
            .unwrap_or_default();

        records.push(ChangeRecord {
            id: pending.change,
            kind: ChangeKind::Recovered,
            scope: Scope::Document,
            summary: pending.summary,
            before_preview: pending.before,
            after_preview: pending.after,
            match_count: 1,
            created_at: now,
            meta: setting.to_meta(),
            depends_on,
            setting: Some(setting),
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use revisor_markup::{parse, serialize};

    fn record(id: &str, depends_on: &[&str]) -> ChangeRecord {
        ChangeRecord {
            id: id.to_string(),
            kind: ChangeKind::Operation(OpKind::ReplaceText),
            scope: Scope::Document,
            summary: String::new(),
            before_preview: String::new(),
            after_preview: String::new(),
            match_count: 1,
            created_at: Utc::now(),
            meta: Value::Null,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            setting: None,
        }
    }

    #[test]
    fn test_accept_and_reject_markers() {
        let source = r#"<p>Hello <del change="c-1">world</del><ins change="c-1">earth</ins>.</p>"#;

        let mut doc = parse(source).unwrap();
        let mut ledger = Ledger::new();
        ledger.push(record("c-1", &[]));
        ledger.resolve(&mut doc, "c-1", Resolution::Accept).unwrap();
        assert_eq!(serialize(&doc), "<p>Hello earth.</p>\n");
        assert!(ledger.is_empty());

        let mut doc = parse(source).unwrap();
        ledger.push(record("c-1", &[]));
        ledger.resolve(&mut doc, "c-1", Resolution::Reject).unwrap();
        assert_eq!(serialize(&doc), "<p>Hello world.</p>\n");
    }

    #[test]
    fn test_block_markers() {
        let source = r#"<p change="c-1" side="old">Before</p><p change="c-1" side="new" align="center">Before</p>"#;
        let mut doc = parse(source).unwrap();
        let mut ledger = Ledger::new();
        ledger.push(record("c-1", &[]));
        ledger.resolve(&mut doc, "c-1", Resolution::Accept).unwrap();

        assert_eq!(doc.blocks.len(), 1);
        assert!(doc.blocks[0].change.is_none());
        assert_eq!(doc.blocks[0].attrs.align.as_deref(), Some("center"));
    }

    #[test]
    fn test_missing_id_is_resolution_not_found() {
        let mut doc = Document::new();
        let mut ledger = Ledger::new();
        let err = ledger.resolve(&mut doc, "nope", Resolution::Accept).unwrap_err();
        assert_eq!(err, EditError::ResolutionNotFound("nope".to_string()));
    }

    #[test]
    fn test_accept_cascades_to_dependencies() {
        let source = r#"<p><del change="c-2"><del change="c-1">Q1</del><ins change="c-1">Q2</ins> report</del><ins change="c-2">Q3 report</ins></p>"#;
        let mut doc = parse(source).unwrap();
        let mut ledger = Ledger::new();
        ledger.push(record("c-1", &[]));
        ledger.push(record("c-2", &["c-1"]));

        let order = ledger.resolve(&mut doc, "c-2", Resolution::Accept).unwrap();
        assert_eq!(order, vec!["c-1".to_string(), "c-2".to_string()]);
        assert_eq!(serialize(&doc), "<p>Q3 report</p>\n");
    }

    #[test]
    fn test_reject_cascades_to_dependents() {
        let source = r#"<p><del change="c-2"><del change="c-1">Q1</del><ins change="c-1">Q2</ins> report</del><ins change="c-2">Q3 report</ins></p>"#;
        let mut doc = parse(source).unwrap();
        let mut ledger = Ledger::new();
        ledger.push(record("c-1", &[]));
        ledger.push(record("c-2", &["c-1"]));

        let order = ledger.resolve(&mut doc, "c-1", Resolution::Reject).unwrap();
        assert_eq!(order, vec!["c-2".to_string(), "c-1".to_string()]);
        assert_eq!(serialize(&doc), "<p>Q1 report</p>\n");
    }

    #[test]
    fn test_recover_rebuilds_records() {
        let source = r#"<p><del change="c-2"><ins change="c-1">Q2</ins> report</del><ins change="c-2">Q3 report</ins></p><p change="c-3" side="new">Added</p>"#;
        let doc = parse(source).unwrap();
        let records = recover(&doc, 80);

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c-2", "c-1", "c-3"]);
        assert_eq!(records[0].depends_on, vec!["c-1".to_string()]);
        assert_eq!(records[0].before_preview, "Q2 report");
        assert_eq!(records[0].after_preview, "Q3 report");
        assert_eq!(records[2].after_preview, "Added");
        assert_eq!(records[2].kind, ChangeKind::Recovered);
    }

    #[test]
    fn test_resolve_all_skips_ids_resolved_by_cascade() {
        let source = r#"<p><del change="c-1"><del change="c-2">Q1</del><ins change="c-2">Q2</ins> report</del><ins change="c-1">Q3 report</ins></p>"#;
        let mut doc = parse(source).unwrap();
        let mut ledger = Ledger::new();
        ledger.push(record("c-1", &["c-2"]));
        ledger.push(record("c-2", &[]));

        let order = ledger.resolve_all(&mut doc, Resolution::Accept);
        assert_eq!(order, vec!["c-2".to_string(), "c-1".to_string()]);
        assert!(ledger.is_empty());
        assert_eq!(serialize(&doc), "<p>Q3 report</p>\n");
    }

    #[test]
    fn test_setting_change_meta_round_trip() {
        let change = SettingChange::Watermark {
            previous: None,
            proposed: Some(Watermark {
                text: "DRAFT".to_string(),
                color: None,
                opacity: None,
            }),
        };
        let rebuilt = SettingChange::from_meta(change.name(), &change.to_meta()).unwrap();
        assert_eq!(rebuilt, change);
        assert!(SettingChange::from_meta("margins", &change.to_meta()).is_err());
    }

    #[test]
    fn test_recover_settings_chains_same_setting() {
        let mut doc = parse("<p>x</p>").unwrap();
        let first = SettingChange::Columns {
            previous: Columns::default(),
            proposed: Columns { count: 2, gap: None },
        };
        let second = SettingChange::Columns {
            previous: Columns { count: 2, gap: None },
            proposed: Columns { count: 3, gap: None },
        };
        for (id, change) in [("c-1", &first), ("c-2", &second)] {
            doc.settings.pending.push(PendingSetting {
                change: id.to_string(),
                setting: change.name().to_string(),
                values: change.to_meta().to_string(),
                ..PendingSetting::default()
            });
        }
        doc.settings.pending.push(PendingSetting {
            change: "c-3".to_string(),
            setting: "page".to_string(),
            values: "not json".to_string(),
            ..PendingSetting::default()
        });

        let records = recover_settings(&mut doc);
        assert!(doc.settings.pending.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].depends_on, vec!["c-1".to_string()]);
        assert_eq!(records[1].setting.as_ref(), Some(&second));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("a longer line", 6), "a long...");
    }
}
