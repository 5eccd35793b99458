//! Template inspection: what a sheet holds and which cells look like fields

use crate::config::TemplateConfig;
use crate::error::Result;
use crate::package::Package;
use crate::relationships::resolve_sheet_path;
use crate::shared_strings::SharedStringTable;
use crate::worksheet::{CellView, WorksheetTree};
use serde::Serialize;

pub use crate::relationships::list_sheets;

/// Maximum length of a suggested field name, in characters
pub const MAX_FIELD_NAME_LEN: usize = 30;

/// What a template cell currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Formula,
    String,
    InlineString,
    Boolean,
    Number,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Formula => "formula",
            CellKind::String => "string",
            CellKind::InlineString => "inline_string",
            CellKind::Boolean => "boolean",
            CellKind::Number => "number",
        }
    }
}

/// One non-empty cell of an analyzed sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSummary {
    pub reference: String,
    pub kind: CellKind,
    /// Display value; formulas show as `=FORMULA=<body>`
    pub value: String,
}

fn summarize(view: CellView, strings: &SharedStringTable) -> Option<CellSummary> {
    let reference = view.reference.to_string();
    if let Some(formula) = view.formula {
        return Some(CellSummary {
            reference,
            kind: CellKind::Formula,
            value: format!("=FORMULA={}", formula),
        });
    }

    let (kind, value) = match view.cell_type.as_deref() {
        Some("s") => {
            let index: usize = view.value?.trim().parse().ok()?;
            (CellKind::String, strings.get(index)?.to_string())
        }
        Some("str") => (CellKind::String, view.value?),
        Some("inlineStr") => (CellKind::InlineString, view.inline_text?),
        Some("b") => {
            let truthy = view.value?.trim() == "1";
            (CellKind::Boolean, if truthy { "TRUE" } else { "FALSE" }.to_string())
        }
        _ => (CellKind::Number, view.value?),
    };

    if value.is_empty() {
        return None;
    }
    Some(CellSummary {
        reference,
        kind,
        value,
    })
}

/// Every cell of `sheet_name` (or the first sheet) holding a formula or a value
pub fn analyze_sheet(package: &mut Package, sheet_name: Option<&str>) -> Result<Vec<CellSummary>> {
    let sheet_path = resolve_sheet_path(package, sheet_name)?;
    let strings = SharedStringTable::load(package)?;
    let xml = package.read_part(&sheet_path)?;
    let tree = WorksheetTree::parse(&xml, &sheet_path)?;

    Ok(tree
        .cells()?
        .into_iter()
        .filter_map(|view| summarize(view, &strings))
        .collect())
}

/// Field name derived from a label: lowercase, non-alphanumerics as `_`.
///
/// Returns `None` when nothing usable is left.
pub fn suggest_field_name(label: &str) -> Option<String> {
    let name: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let name: String = name.trim_matches('_').chars().take(MAX_FIELD_NAME_LEN).collect();
    (!name.is_empty()).then_some(name)
}

/// Draft field mapping from the text cells of an analyzed sheet.
///
/// At most `limit` fields are suggested; a label seen twice keeps its first cell.
pub fn suggest_mapping(cells: &[CellSummary], limit: usize) -> TemplateConfig {
    let mut config = TemplateConfig::default();
    for cell in cells {
        if config.fields.len() >= limit {
            break;
        }
        if !matches!(cell.kind, CellKind::String | CellKind::InlineString) {
            continue;
        }
        if let Some(field) = suggest_field_name(&cell.value) {
            config
                .fields
                .entry(field)
                .or_insert_with(|| cell.reference.clone());
        }
    }
    config
}
