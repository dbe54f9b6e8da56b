use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::EntryId;

/// Outcome of checking a reconciled entry set against the prior database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// False when the entry count changed; blocks persisting the update
    pub ok: bool,
    pub prior_count: usize,
    pub reconciled_count: usize,
    /// Previously implemented or tested identifiers missing from the update
    pub regressions: BTreeSet<EntryId>,
}

/// Compares counts and looks for tracked identifiers that did not carry forward.
///
/// `ok` reflects only the count check; regressions are reported independently.
pub fn validate<'a, I>(
    prior_count: usize,
    reconciled_count: usize,
    tracked: &BTreeSet<EntryId>,
    reconciled_ids: I,
) -> Validation
where
    I: IntoIterator<Item = &'a EntryId>,
{
    let ok = prior_count == reconciled_count;
    if ok {
        log::info!(
            "Original database and updated entries both have {} unique ids",
            prior_count
        );
    } else {
        log::debug!(
            "Original database had {} unique ids, but updated entries have {}",
            prior_count,
            reconciled_count
        );
    }

    let mut regressions = tracked.clone();
    for id in reconciled_ids {
        regressions.remove(id);
    }
    for id in &regressions {
        log::debug!("{} had a test and/or implementation but is missing from the update", id);
    }

    Validation {
        ok,
        prior_count,
        reconciled_count,
        regressions,
    }
}
