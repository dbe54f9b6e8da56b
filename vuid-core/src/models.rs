use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of digits used for the zero-padded sequence suffix of an identifier
pub const SEQUENCE_WIDTH: usize = 5;

/// Largest sequence number that fits the identifier width
pub const MAX_SEQUENCE: u32 = 99_999;

/// Errors raised when an identifier string cannot be interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("identifier '{0}' has no numeric sequence suffix")]
    MissingSequence(String),

    #[error("identifier '{0}' has a sequence number above 99999")]
    SequenceOverflow(String),
}

/// Stable identifier of a requirement: `<prefix><5-digit sequence>`
///
/// Ordering is by prefix and then by numeric sequence, which matches the
/// lexical order of the rendered form as long as sequences stay below 100000.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntryId {
    prefix: String,
    sequence: u32,
}

impl EntryId {
    pub fn new(prefix: impl Into<String>, sequence: u32) -> Self {
        Self {
            prefix: prefix.into(),
            sequence,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Returns an identifier with the same prefix and a different sequence number
    pub fn with_sequence(&self, sequence: u32) -> Self {
        Self {
            prefix: self.prefix.clone(),
            sequence,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.prefix,
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

impl FromStr for EntryId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = s.trim_end_matches(|c: char| c.is_ascii_digit());
        if prefix.len() == s.len() {
            return Err(IdParseError::MissingSequence(s.to_string()));
        }
        let sequence = s[prefix.len()..]
            .parse::<u32>()
            .ok()
            .filter(|sequence| *sequence <= MAX_SEQUENCE)
            .ok_or_else(|| IdParseError::SequenceOverflow(s.to_string()))?;
        Ok(Self::new(prefix, sequence))
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntryId {
    type Error = IdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One valid usage requirement extracted from the spec, or the reconciled
/// form of it carrying its final identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementEntry {
    pub id: EntryId,
    /// Full message: prefix, section heading, requirement text and spec link
    pub message: String,
    /// API function the requirement appears under (may be empty)
    pub api: String,
    /// True when the requirement came from an implicit valid usage block
    pub implicit: bool,
}

impl RequirementEntry {
    pub fn new(id: EntryId, message: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
            api: api.into(),
            implicit: false,
        }
    }

    pub fn implicit(mut self, implicit: bool) -> Self {
        self.implicit = implicit;
        self
    }

    /// Same content under a different identifier
    pub fn with_id(&self, id: EntryId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

/// Set of requirement entries keyed and ordered by identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySet {
    entries: BTreeMap<EntryId, RequirementEntry>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the entry previously stored under the same id
    pub fn insert(&mut self, entry: RequirementEntry) -> Option<RequirementEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    pub fn get(&self, id: &EntryId) -> Option<&RequirementEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identifier order
    pub fn iter(&self) -> btree_map::Values<'_, EntryId, RequirementEntry> {
        self.entries.values()
    }

    pub fn ids(&self) -> btree_map::Keys<'_, EntryId, RequirementEntry> {
        self.entries.keys()
    }

    pub fn max_sequence(&self) -> Option<u32> {
        self.entries.keys().map(EntryId::sequence).max()
    }
}

impl FromIterator<RequirementEntry> for EntrySet {
    fn from_iter<I: IntoIterator<Item = RequirementEntry>>(iter: I) -> Self {
        let mut set = EntrySet::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

impl<'a> IntoIterator for &'a EntrySet {
    type Item = &'a RequirementEntry;
    type IntoIter = btree_map::Values<'a, EntryId, RequirementEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Test association recorded for a database entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestName {
    /// No information about a test (`Unknown`)
    #[default]
    Unknown,
    /// Check is not implemented so there is no test (`None`)
    NotImplemented,
    /// Name of the test exercising the check
    Named(String),
}

impl TestName {
    pub fn parse(value: &str) -> Self {
        match value {
            "Unknown" | "" => TestName::Unknown,
            "None" => TestName::NotImplemented,
            name => TestName::Named(name.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, TestName::Named(_))
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestName::Unknown => write!(f, "Unknown"),
            TestName::NotImplemented => write!(f, "None"),
            TestName::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Persisted record for one identifier, carrying the operational metadata
/// that cannot be derived from the spec itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: EntryId,
    pub implemented: bool,
    pub testname: TestName,
    pub api: String,
    pub message: String,
    pub note: String,
}

impl DatabaseRecord {
    /// Record for an entry that has no history: not implemented, test unknown
    pub fn fresh(entry: &RequirementEntry) -> Self {
        Self {
            id: entry.id.clone(),
            implemented: false,
            testname: TestName::Unknown,
            api: entry.api.clone(),
            message: entry.message.clone(),
            note: String::new(),
        }
    }

    /// True when the check is implemented or has a known test, meaning its
    /// disappearance must be triaged
    pub fn is_tracked(&self) -> bool {
        self.implemented || self.testname.is_known()
    }
}

/// Prepends the `implicit` marker to a note unless it is already present
pub fn note_with_implicit(note: &str) -> String {
    if note.contains("implicit") {
        note.to_string()
    } else if note.is_empty() {
        "implicit".to_string()
    } else {
        format!("implicit, {}", note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_display_pads_sequence() {
        let id = EntryId::new("VALIDATION_ERROR_", 42);
        assert_eq!(id.to_string(), "VALIDATION_ERROR_00042");
    }

    #[test]
    fn test_entry_id_parse() {
        let id: EntryId = "VALIDATION_ERROR_00123".parse().unwrap();
        assert_eq!(id.prefix(), "VALIDATION_ERROR_");
        assert_eq!(id.sequence(), 123);

        let id: EntryId = "ERR_7".parse().unwrap();
        assert_eq!(id.to_string(), "ERR_00007");
    }

    #[test]
    fn test_entry_id_parse_rejects_missing_sequence() {
        assert_eq!(
            "VALIDATION_ERROR_".parse::<EntryId>(),
            Err(IdParseError::MissingSequence("VALIDATION_ERROR_".to_string()))
        );
        assert!(matches!(
            "ERR_99999999999".parse::<EntryId>(),
            Err(IdParseError::SequenceOverflow(_))
        ));
    }

    #[test]
    fn test_entry_id_parse_rejects_sequence_wider_than_five_digits() {
        assert_eq!("ERR_99999".parse::<EntryId>().unwrap().sequence(), MAX_SEQUENCE);
        assert!(matches!(
            "ERR_100000".parse::<EntryId>(),
            Err(IdParseError::SequenceOverflow(_))
        ));
        assert!(matches!(
            "ERR_4294967295".parse::<EntryId>(),
            Err(IdParseError::SequenceOverflow(_))
        ));
    }

    #[test]
    fn test_entry_id_orders_numerically() {
        let mut ids = vec![
            EntryId::new("ERR_", 10),
            EntryId::new("ERR_", 2),
            EntryId::new("ERR_", 7),
        ];
        ids.sort();
        let seqs: Vec<u32> = ids.iter().map(EntryId::sequence).collect();
        assert_eq!(seqs, vec![2, 7, 10]);
    }

    #[test]
    fn test_entry_id_serde_as_string() {
        let id = EntryId::new("ERR_", 5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ERR_00005\"");
        let back: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_entry_set_insert_reports_previous() {
        let mut set = EntrySet::new();
        let id = EntryId::new("ERR_", 1);
        assert!(set.insert(RequirementEntry::new(id.clone(), "first", "")).is_none());
        let previous = set.insert(RequirementEntry::new(id.clone(), "second", ""));
        assert_eq!(previous.map(|e| e.message), Some("first".to_string()));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&id).map(|e| e.message.as_str()), Some("second"));
    }

    #[test]
    fn test_entry_set_max_sequence() {
        let set: EntrySet = [3, 11, 5]
            .into_iter()
            .map(|seq| RequirementEntry::new(EntryId::new("ERR_", seq), "msg", ""))
            .collect();
        assert_eq!(set.max_sequence(), Some(11));
        assert_eq!(EntrySet::new().max_sequence(), None);
    }

    #[test]
    fn test_testname_parse() {
        assert_eq!(TestName::parse("Unknown"), TestName::Unknown);
        assert_eq!(TestName::parse("None"), TestName::NotImplemented);
        assert_eq!(
            TestName::parse("VkLayerTest.Foo"),
            TestName::Named("VkLayerTest.Foo".to_string())
        );
        assert_eq!(TestName::NotImplemented.to_string(), "None");
    }

    #[test]
    fn test_record_is_tracked() {
        let entry = RequirementEntry::new(EntryId::new("ERR_", 1), "msg", "vkFoo");
        let mut record = DatabaseRecord::fresh(&entry);
        assert!(!record.is_tracked());

        record.testname = TestName::NotImplemented;
        assert!(!record.is_tracked());

        record.testname = TestName::Named("Test".to_string());
        assert!(record.is_tracked());

        record.testname = TestName::Unknown;
        record.implemented = true;
        assert!(record.is_tracked());
    }

    #[test]
    fn test_note_with_implicit() {
        assert_eq!(note_with_implicit(""), "implicit");
        assert_eq!(note_with_implicit("flaky"), "implicit, flaky");
        assert_eq!(note_with_implicit("implicit, flaky"), "implicit, flaky");
    }
}
