//! Resolve sheet names to worksheet parts through the workbook and its relationships

use crate::error::{PatchError, Result, xml_err};
use crate::package::Package;
use crate::xml::{attr_value, attr_value_local};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;

/// Fallback workbook location when the package has no root relationships
pub const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
/// Fallback shared-strings location when the workbook declares no relationship for it
pub const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

const ROOT_RELS_PART: &str = "_rels/.rels";
const OFFICE_DOCUMENT_TYPE: &str = "/officeDocument";
const SHARED_STRINGS_TYPE: &str = "/sharedStrings";

/// Visibility of a sheet as declared in the workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetState {
    Visible,
    Hidden,
    VeryHidden,
}

/// One `<sheet>` declaration of the workbook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: Option<u32>,
    pub rel_id: String,
    pub state: SheetState,
}

/// Sheets declared by the workbook part, in declaration order
#[derive(Debug, Clone)]
pub struct WorkbookManifest {
    pub part: String,
    pub sheets: Vec<SheetEntry>,
}

impl WorkbookManifest {
    /// Parse the `<sheets>` list of a workbook part.
    ///
    /// A workbook without a `<sheets>` element is malformed. A sheet
    /// without a relationship id is malformed too since it can never be
    /// resolved to a part.
    pub fn parse(xml: &[u8], part: &str) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut sheets = Vec::new();
        let mut saw_sheets = false;
        loop {
            match reader.read_event_into(&mut buf).map_err(|e| xml_err(part, e))? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"sheets" => saw_sheets = true,
                    b"sheet" if saw_sheets => {
                        let name = attr_value(&e, b"name", part)?.ok_or_else(|| {
                            PatchError::WorkbookMalformed("sheet without a name".to_string())
                        })?;
                        let rel_id = attr_value_local(&e, b"id", part)?.ok_or_else(|| {
                            PatchError::WorkbookMalformed(format!(
                                "sheet '{}' has no relationship id",
                                name
                            ))
                        })?;
                        let sheet_id = attr_value(&e, b"sheetId", part)?.and_then(|s| s.parse().ok());
                        let state = match attr_value(&e, b"state", part)?.as_deref() {
                            Some("hidden") => SheetState::Hidden,
                            Some("veryHidden") => SheetState::VeryHidden,
                            _ => SheetState::Visible,
                        };
                        sheets.push(SheetEntry {
                            name,
                            sheet_id,
                            rel_id,
                            state,
                        });
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_sheets {
            return Err(PatchError::WorkbookMalformed(format!(
                "'{}' has no <sheets> element",
                part
            )));
        }

        Ok(Self {
            part: part.to_string(),
            sheets,
        })
    }

    /// Exact, case-sensitive lookup by sheet name
    pub fn find(&self, name: &str) -> Option<&SheetEntry> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// A single `<Relationship>` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Relationships of one source part, with targets resolved against it
#[derive(Debug, Clone)]
pub struct RelationshipTable {
    source_part: String,
    entries: Vec<Relationship>,
}

impl RelationshipTable {
    /// Parse a `.rels` part belonging to `source_part` (empty for the package root)
    pub fn parse(xml: &[u8], rels_part: &str, source_part: &str) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut entries = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).map_err(|e| xml_err(rels_part, e))? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                    let id = attr_value(&e, b"Id", rels_part)?.unwrap_or_default();
                    let rel_type = attr_value(&e, b"Type", rels_part)?.unwrap_or_default();
                    let target = attr_value(&e, b"Target", rels_part)?.unwrap_or_default();
                    let external = attr_value(&e, b"TargetMode", rels_part)?
                        .is_some_and(|mode| mode.eq_ignore_ascii_case("External"));
                    entries.push(Relationship {
                        id,
                        rel_type,
                        target,
                        external,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self {
            source_part: source_part.to_string(),
            entries,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    /// First relationship whose type URI ends with `suffix` (`/sharedStrings`)
    pub fn find_by_type(&self, suffix: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.rel_type.ends_with(suffix))
    }

    /// Package-rooted path of an internal relationship target
    pub fn target_path(&self, rel: &Relationship) -> String {
        resolve_target(&self.source_part, &rel.target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Path of the relationships part describing `part` (`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`)
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if part.is_empty() => ROOT_RELS_PART.to_string(),
        None => format!("_rels/{}.rels", part),
    }
}

/// Normalize a relationship target to a package-rooted path.
///
/// Absolute targets (`/xl/worksheets/sheet1.xml`) are already rooted.
/// Targets that already start with the source part's directory are taken
/// as rooted as well. Everything else is joined to that directory with
/// `.` and `..` segments collapsed.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(rooted) = target.strip_prefix('/') {
        return normalize_path(rooted);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    if base_dir.is_empty() {
        return normalize_path(target);
    }
    if target.starts_with(base_dir) && target[base_dir.len()..].starts_with('/') {
        return normalize_path(target);
    }
    normalize_path(&format!("{}/{}", base_dir, target))
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Locate the workbook part through the package root relationships
pub fn workbook_part_path(package: &mut Package) -> Result<String> {
    let path = match package.read_optional_part(ROOT_RELS_PART)? {
        Some(xml) => {
            let root = RelationshipTable::parse(&xml, ROOT_RELS_PART, "")?;
            root.find_by_type(OFFICE_DOCUMENT_TYPE)
                .map(|rel| root.target_path(rel))
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string())
        }
        None => DEFAULT_WORKBOOK_PART.to_string(),
    };

    if !package.contains(&path) {
        return Err(PatchError::WorkbookMalformed(format!(
            "workbook part '{}' is missing",
            path
        )));
    }
    Ok(path)
}

fn load_manifest(package: &mut Package) -> Result<WorkbookManifest> {
    let part = workbook_part_path(package)?;
    let xml = package.read_part(&part)?;
    WorkbookManifest::parse(&xml, &part)
}

fn load_workbook_rels(package: &mut Package, workbook_part: &str) -> Result<RelationshipTable> {
    let rels_part = rels_path_for(workbook_part);
    let xml = package.read_optional_part(&rels_part)?.ok_or_else(|| {
        PatchError::WorkbookMalformed(format!("relationship part '{}' is missing", rels_part))
    })?;
    RelationshipTable::parse(&xml, &rels_part, workbook_part)
}

/// Sheets declared by the workbook, in order
pub fn list_sheets(package: &mut Package) -> Result<Vec<SheetEntry>> {
    Ok(load_manifest(package)?.sheets)
}

/// Resolve a sheet name (or the first declared sheet) to its worksheet part path
pub fn resolve_sheet_path(package: &mut Package, sheet_name: Option<&str>) -> Result<String> {
    let manifest = load_manifest(package)?;

    let entry = match sheet_name {
        Some(name) => manifest
            .find(name)
            .ok_or_else(|| PatchError::SheetNotFound(name.to_string()))?,
        None => manifest.sheets.first().ok_or_else(|| {
            PatchError::WorkbookMalformed("workbook declares no sheets".to_string())
        })?,
    };

    let rels = load_workbook_rels(package, &manifest.part)?;
    let rel = rels.get(&entry.rel_id).ok_or_else(|| {
        PatchError::WorkbookMalformed(format!(
            "relationship '{}' for sheet '{}' not found",
            entry.rel_id, entry.name
        ))
    })?;

    let path = rels.target_path(rel);
    if rel.external || !package.contains(&path) {
        return Err(PatchError::WorkbookMalformed(format!(
            "worksheet part '{}' for sheet '{}' is missing",
            path, entry.name
        )));
    }

    log::debug!("Resolved sheet '{}' to '{}'", entry.name, path);
    Ok(path)
}

/// Shared-strings part path, if the package has one
pub fn shared_strings_path(package: &mut Package) -> Result<Option<String>> {
    let workbook_part = workbook_part_path(package)?;
    let rels_part = rels_path_for(&workbook_part);
    if let Some(xml) = package.read_optional_part(&rels_part)? {
        let rels = RelationshipTable::parse(&xml, &rels_part, &workbook_part)?;
        if let Some(rel) = rels.find_by_type(SHARED_STRINGS_TYPE) {
            let path = rels.target_path(rel);
            if package.contains(&path) {
                return Ok(Some(path));
            }
        }
    }

    Ok(package
        .contains(DEFAULT_SHARED_STRINGS_PART)
        .then(|| DEFAULT_SHARED_STRINGS_PART.to_string()))
}
