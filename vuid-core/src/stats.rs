use serde::Serialize;
use std::collections::HashMap;

use crate::models::EntrySet;

/// Summary numbers for an extracted entry set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub unique_ids: usize,
    /// Distinct messages that occur under more than one identifier
    pub repeat_strings: usize,
    pub implicit_count: usize,
}

pub fn analyze(entries: &EntrySet, implicit_count: usize) -> Stats {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.message.as_str()).or_default() += 1;
    }

    let mut repeat_strings = 0;
    for (message, count) in &counts {
        if *count > 1 {
            repeat_strings += 1;
            log::warn!("String '{}' repeated {} times", message, count);
        }
    }

    Stats {
        unique_ids: entries.len(),
        repeat_strings,
        implicit_count,
    }
}
