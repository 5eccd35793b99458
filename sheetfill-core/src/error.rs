//! Error types for template patching

use thiserror::Error;

/// Result alias used across the patch engine
pub type Result<T> = std::result::Result<T, PatchError>;

/// Everything that can abort a generate call.
///
/// Template errors mean the supplied package is corrupt or not a spreadsheet
/// package at all. Request errors mean the caller asked for something the
/// template cannot satisfy and should fix the request. Neither is retried.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("template is not a zip package: {0}")]
    NotAZipPackage(#[source] zip::result::ZipError),

    #[error("part '{0}' not found in package")]
    MissingPart(String),

    #[error("sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("workbook is malformed: {0}")]
    WorkbookMalformed(String),

    #[error("worksheet '{0}' is malformed: {1}")]
    MalformedWorksheet(String, String),

    #[error("invalid cell reference: {0}")]
    CellReferenceInvalid(String),

    #[error("value for cell {0} cannot be stored: non-finite number or a character XML does not allow")]
    InvalidValue(String),

    #[error("no cell updates provided")]
    NoUpdates,

    #[error("invalid XML in '{0}': {1}")]
    InvalidXml(String, String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PatchError {
    /// True when the caller can fix the request; false when the template itself is broken.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            PatchError::SheetNotFound(_)
                | PatchError::CellReferenceInvalid(_)
                | PatchError::InvalidValue(_)
                | PatchError::NoUpdates
        )
    }
}

/// Attach the part name to a reader or unescaping failure
pub(crate) fn xml_err(part: &str, err: impl std::fmt::Display) -> PatchError {
    PatchError::InvalidXml(part.to_string(), err.to_string())
}
