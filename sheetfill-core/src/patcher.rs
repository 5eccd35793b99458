//! Template patching entry points: one document, or many in parallel

use crate::error::{PatchError, Result};
use crate::package::Package;
use crate::relationships::resolve_sheet_path;
use crate::shared_strings::SharedStringTable;
use crate::value::CellUpdate;
use crate::worksheet::{self, UpdateStatus};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Generated package plus a report of what happened to each update
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub bytes: Vec<u8>,
    /// Worksheet part that was patched
    pub sheet_path: String,
    /// One entry per update, in request order
    pub statuses: Vec<(String, UpdateStatus)>,
    /// Strings appended to the shared-string table
    pub strings_added: usize,
}

impl PatchOutcome {
    /// Coordinates left alone because they hold formulas
    pub fn skipped_formulas(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, status)| *status == UpdateStatus::SkippedFormula)
            .map(|(coordinate, _)| coordinate.as_str())
            .collect()
    }
}

/// One document to produce from a shared template
#[derive(Debug, Clone, Default)]
pub struct BatchJob {
    pub sheet_name: Option<String>,
    pub updates: Vec<CellUpdate>,
}

/// A loaded template that documents are generated from.
///
/// The template bytes are immutable and shared; every generate call opens
/// its own view of the package, so one patcher can serve many threads.
#[derive(Debug, Clone)]
pub struct TemplatePatcher {
    template: Arc<[u8]>,
}

impl TemplatePatcher {
    /// Wrap template bytes, checking that they form a zip package
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let template: Arc<[u8]> = Arc::from(bytes);
        Package::from_shared(Arc::clone(&template))?;
        Ok(Self { template })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(std::fs::read(path)?)
    }

    /// Raw template bytes
    pub fn template(&self) -> &[u8] {
        &self.template
    }

    /// Patch `updates` into `sheet_name` (or the first sheet) and return the new package
    pub fn generate(&self, updates: &[CellUpdate], sheet_name: Option<&str>) -> Result<Vec<u8>> {
        self.generate_with_outcome(updates, sheet_name)
            .map(|outcome| outcome.bytes)
    }

    /// Like [`generate`](Self::generate) but reports the status of every update
    pub fn generate_with_outcome(
        &self,
        updates: &[CellUpdate],
        sheet_name: Option<&str>,
    ) -> Result<PatchOutcome> {
        if updates.is_empty() {
            return Err(PatchError::NoUpdates);
        }

        let mut package = Package::from_shared(Arc::clone(&self.template))?;
        let sheet_path = resolve_sheet_path(&mut package, sheet_name)?;

        let mut strings = SharedStringTable::load(&mut package)?;
        let strings_before = strings.len();
        let use_shared_strings = strings.is_present();

        let sheet_xml = package.read_part(&sheet_path)?;
        let patched = worksheet::patch(
            &sheet_xml,
            &sheet_path,
            updates,
            &mut strings,
            use_shared_strings,
        )?;

        let mut overrides = BTreeMap::new();
        overrides.insert(sheet_path.clone(), patched.xml);
        if strings.is_modified() {
            if let Some(part) = strings.part_path() {
                overrides.insert(part.to_string(), strings.serialize()?);
            }
        }

        let bytes = package.write(&overrides)?;
        let statuses: Vec<(String, UpdateStatus)> = updates
            .iter()
            .map(|u| u.coordinate.clone())
            .zip(patched.statuses)
            .collect();
        let outcome = PatchOutcome {
            bytes,
            sheet_path,
            statuses,
            strings_added: strings.len() - strings_before,
        };

        log::info!(
            "Patched {} cells in '{}' ({} formula cells skipped, {} strings added)",
            updates.len(),
            outcome.sheet_path,
            outcome.skipped_formulas().len(),
            outcome.strings_added
        );
        Ok(outcome)
    }

    /// Generate one document per job in parallel; results keep job order
    pub fn generate_batch(&self, jobs: &[BatchJob]) -> Vec<Result<Vec<u8>>> {
        jobs.par_iter()
            .map(|job| self.generate(&job.updates, job.sheet_name.as_deref()))
            .collect()
    }
}

/// Patch a template given as bytes. See [`TemplatePatcher::generate`].
pub fn generate(template: &[u8], updates: &[CellUpdate], sheet_name: Option<&str>) -> Result<Vec<u8>> {
    TemplatePatcher::new(template.to_vec())?.generate(updates, sheet_name)
}

/// Generate many documents from one template. See [`TemplatePatcher::generate_batch`].
pub fn generate_batch(template: &[u8], jobs: &[BatchJob]) -> Result<Vec<Result<Vec<u8>>>> {
    Ok(TemplatePatcher::new(template.to_vec())?.generate_batch(jobs))
}
