//! JSON report of a reconciliation run

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::database::MalformedRecord;
use crate::reconcile::{Assignment, ReconcileWarning, Reconciliation};
use crate::stats::Stats;
use crate::validate::Validation;

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub stats: &'a Stats,
    pub skipped_records: &'a [MalformedRecord],
    pub assignments: &'a [Assignment],
    pub warnings: &'a [ReconcileWarning],
    pub validation: Validation,
}

impl<'a> ReconcileReport<'a> {
    pub fn new(
        reconciliation: &'a Reconciliation,
        validation: Validation,
        stats: &'a Stats,
        skipped_records: &'a [MalformedRecord],
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            stats,
            skipped_records,
            assignments: &reconciliation.assignments,
            warnings: &reconciliation.warnings,
            validation,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(&path, self.to_json()?)
            .with_context(|| format!("Failed to write report {:?}", path.as_ref()))
    }
}
