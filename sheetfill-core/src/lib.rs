//! sheetfill-core: Fill cell values into XLSX templates without touching anything else
//!
//! A template is opened as a zip package, the target worksheet is located
//! through the workbook relationships, and only the requested cells are
//! rewritten. Every other part of the package is copied verbatim, so
//! styles, merged ranges, formulas and drawings survive unchanged.
//!
//! ```no_run
//! use sheetfill_core::{CellUpdate, TemplatePatcher};
//!
//! # fn main() -> sheetfill_core::Result<()> {
//! let patcher = TemplatePatcher::from_file("Template.xlsx".as_ref())?;
//! let bytes = patcher.generate(
//!     &[CellUpdate::new("B3", "MSN12345"), CellUpdate::new("C4", 42)],
//!     Some("Sheet1"),
//! )?;
//! std::fs::write("out.xlsx", bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod cell_ref;
pub mod config;
pub mod error;
pub mod inspect;
pub mod package;
pub mod patcher;
pub mod relationships;
pub mod shared_strings;
pub mod value;
pub mod worksheet;
mod xml;

pub use cell_ref::CellRef;
pub use config::{TemplateConfig, TemplateRegistry};
pub use error::{PatchError, Result};
pub use inspect::{CellKind, CellSummary, analyze_sheet, suggest_field_name, suggest_mapping};
pub use package::{Package, PartInfo};
pub use patcher::{BatchJob, PatchOutcome, TemplatePatcher, generate, generate_batch};
pub use relationships::{
    RelationshipTable, SheetEntry, SheetState, WorkbookManifest, list_sheets, resolve_sheet_path,
};
pub use shared_strings::SharedStringTable;
pub use value::{CellUpdate, CellValue};
pub use worksheet::{CellView, UpdateStatus, WorksheetTree};
