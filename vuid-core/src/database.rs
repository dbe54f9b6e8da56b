//! Flat-file database of validation identifiers
//!
//! Each record is one line of six fields joined by [`DELIMITER`]:
//! identifier, implemented flag, test name, API, full message and note.
//! Lines starting with `#` and blank lines are ignored.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{note_with_implicit, DatabaseRecord, EntryId, EntrySet, TestName};

/// Field separator, chosen so it never shows up in spec prose
pub const DELIMITER: &str = "~^~";

/// Number of fields in a well-formed record line
pub const FIELD_COUNT: usize = 6;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL: Duration = Duration::from_millis(100);

/// A database line that could not be interpreted and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    /// 1-based line number in the source text
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

/// In-memory view of the identifier database
#[derive(Debug, Clone, Default)]
pub struct Database {
    records: BTreeMap<EntryId, DatabaseRecord>,
    skipped: Vec<MalformedRecord>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses database text, skipping (and remembering) malformed lines
    pub fn parse(content: &str) -> Self {
        let mut db = Database::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_record(line) {
                Ok(record) => {
                    if let Some(previous) = db.records.insert(record.id.clone(), record) {
                        log::warn!(
                            "Database line {} redefines {}, keeping the later record",
                            index + 1,
                            previous.id
                        );
                    }
                }
                Err(reason) => {
                    log::debug!(
                        "Skipping bad database line {}: {} ({})",
                        index + 1,
                        line,
                        reason
                    );
                    db.skipped.push(MalformedRecord {
                        line_number: index + 1,
                        line: line.to_string(),
                        reason,
                    });
                }
            }
        }

        db
    }

    /// Derives the next persisted snapshot from reconciled entries.
    ///
    /// Content comes from the entries; implementation status, test name and
    /// note are carried over from `prior` when the identifier existed before.
    pub fn from_entries(entries: &EntrySet, prior: &Database) -> Self {
        let records = entries
            .iter()
            .map(|entry| {
                let mut record = DatabaseRecord::fresh(entry);
                if let Some(old) = prior.get(&entry.id) {
                    record.implemented = old.implemented;
                    record.testname = old.testname.clone();
                    record.note = old.note.clone();
                }
                if entry.implicit {
                    record.note = note_with_implicit(&record.note);
                }
                (record.id.clone(), record)
            })
            .collect();

        Self {
            records,
            skipped: Vec::new(),
        }
    }

    pub fn get(&self, id: &EntryId) -> Option<&DatabaseRecord> {
        self.records.get(id)
    }

    /// Records in identifier order
    pub fn records(&self) -> impl Iterator<Item = &DatabaseRecord> {
        self.records.values()
    }

    /// Identifier to full message mapping
    pub fn messages(&self) -> impl Iterator<Item = (&EntryId, &str)> {
        self.records
            .iter()
            .map(|(id, record)| (id, record.message.as_str()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest sequence number of any loaded identifier
    pub fn max_sequence(&self) -> Option<u32> {
        self.records.keys().map(EntryId::sequence).max()
    }

    /// First sequence number available for a brand-new identifier
    pub fn next_sequence(&self) -> u32 {
        self.max_sequence().map_or(0, |max| max.saturating_add(1))
    }

    /// Lines skipped while parsing
    pub fn skipped(&self) -> &[MalformedRecord] {
        &self.skipped
    }

    /// Identifiers that are implemented or have a known test
    pub fn tracked_ids(&self) -> BTreeSet<EntryId> {
        self.records
            .values()
            .filter(|record| record.is_tracked())
            .map(|record| record.id.clone())
            .collect()
    }

    /// Renders the database text: schema header, one line per record,
    /// trailing blank line
    pub fn render(&self, id_prefix: &str) -> String {
        let d = DELIMITER;
        let mut lines = vec![
            "# This is a database file with validation error check information".to_string(),
            "# Comments are denoted with '#' char".to_string(),
            "# The format of the lines is:".to_string(),
            format!(
                "# <error_enum>{d}<check_implemented>{d}<testname>{d}<api>{d}<errormsg>{d}<note>"
            ),
            format!(
                "# error_enum: Unique error enum for this check of format {}<uniqueid>",
                id_prefix
            ),
            "# check_implemented: 'Y' if check has been implemented in layers, or 'N' for not implemented"
                .to_string(),
            "# testname: Name of validation test for this check, 'Unknown' for unknown, or 'None' if not implemented"
                .to_string(),
            "# api: API function that this check is related to".to_string(),
            "# errormsg: The unique error message for this check that includes spec language and link"
                .to_string(),
            "# note: Free txt field with any custom notes related to the check in question"
                .to_string(),
        ];

        for record in self.records.values() {
            lines.push(
                [
                    record.id.to_string(),
                    if record.implemented { "Y" } else { "N" }.to_string(),
                    record.testname.to_string(),
                    record.api.clone(),
                    record.message.clone(),
                    record.note.clone(),
                ]
                .join(d),
            );
        }

        let mut out = lines.join("\n");
        out.push_str("\n\n");
        out
    }
}

fn parse_record(line: &str) -> std::result::Result<DatabaseRecord, String> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() != FIELD_COUNT {
        return Err(format!(
            "expected {} fields but found {}",
            FIELD_COUNT,
            fields.len()
        ));
    }

    let id: EntryId = fields[0].parse().map_err(|e| format!("{}", e))?;
    let implemented = match fields[1] {
        "Y" | "y" => true,
        "N" | "n" => false,
        other => return Err(format!("implemented flag must be Y or N, not '{}'", other)),
    };

    Ok(DatabaseRecord {
        id,
        implemented,
        testname: TestName::parse(fields[2]),
        api: fields[3].to_string(),
        message: fields[4].to_string(),
        note: fields[5].to_string(),
    })
}

/// Handles loading and saving the database file with advisory locking
pub struct DatabaseFile {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl DatabaseFile {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let mut lock_name = file_path.as_os_str().to_os_string();
        lock_name.push(".lock");
        Self {
            file_path,
            lock_file_path: PathBuf::from(lock_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Acquire an exclusive lock for writing; released when the handle drops
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        let start = std::time::Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for database lock - another process may be updating: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Acquire a shared lock for reading, if a lock file exists
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        let start = std::time::Instant::now();
        loop {
            match FileExt::try_lock_shared(&lock_file) {
                Ok(()) => return Ok(Some(lock_file)),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for database lock - another process may be updating: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(LOCK_POLL);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Loads and parses the database file
    pub fn load(&self) -> Result<Database> {
        let _lock = self.acquire_read_lock()?;

        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read database file: {:?}", self.file_path))?;

        let db = Database::parse(&content);
        log::info!(
            "Loaded {} records from {:?} (max sequence {:?})",
            db.len(),
            self.file_path,
            db.max_sequence()
        );
        Ok(db)
    }

    /// Writes the database file under an exclusive lock
    pub fn save(&self, db: &Database, id_prefix: &str) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut lock_file = self.acquire_write_lock()?;

        // Lock holder info, for debugging stale locks
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        log::info!("Generating database file {:?}", self.file_path);
        fs::write(&self.file_path, db.render(id_prefix))
            .with_context(|| format!("Failed to write database file: {:?}", self.file_path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequirementEntry;
    use tempfile::TempDir;

    fn line(fields: [&str; 6]) -> String {
        fields.join(DELIMITER)
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let content = format!(
            "# header\n\n{}\n   \n{}\n",
            line(["ERR_00001", "Y", "TestA", "vkFoo", "msg one", ""]),
            line(["ERR_00004", "N", "Unknown", "vkBar", "msg two", "note"]),
        );
        let db = Database::parse(&content);

        assert_eq!(db.len(), 2);
        assert_eq!(db.max_sequence(), Some(4));
        assert_eq!(db.next_sequence(), 5);
        assert!(db.skipped().is_empty());

        let record = db.get(&EntryId::new("ERR_", 1)).unwrap();
        assert!(record.implemented);
        assert_eq!(record.testname, TestName::Named("TestA".to_string()));
        assert_eq!(record.api, "vkFoo");
    }

    #[test]
    fn test_parse_reports_wrong_field_count_and_continues() {
        let content = format!(
            "{}\nERR_00002~^~N~^~Unknown~^~vkFoo~^~missing note\n{}\n",
            line(["ERR_00001", "N", "Unknown", "vkFoo", "ok", ""]),
            line(["ERR_00003", "N", "None", "vkFoo", "also ok", ""]),
        );
        let db = Database::parse(&content);

        assert_eq!(db.len(), 2);
        assert_eq!(db.skipped().len(), 1);
        assert_eq!(db.skipped()[0].line_number, 2);
        assert!(db.skipped()[0].reason.contains("found 5"));
        assert!(db.get(&EntryId::new("ERR_", 2)).is_none());
    }

    #[test]
    fn test_parse_rejects_bad_identifier_and_flag() {
        let content = format!(
            "{}\n{}\n",
            line(["NOT_AN_ID", "N", "Unknown", "", "msg", ""]),
            line(["ERR_00001", "maybe", "Unknown", "", "msg", ""]),
        );
        let db = Database::parse(&content);
        assert!(db.is_empty());
        assert_eq!(db.skipped().len(), 2);
        assert_eq!(db.max_sequence(), None);
        assert_eq!(db.next_sequence(), 0);
    }

    #[test]
    fn test_parse_skips_oversized_identifier() {
        let content = format!(
            "{}\n{}\n",
            line(["ERR_4294967295", "N", "Unknown", "vkA", "msg", ""]),
            line(["ERR_00004", "N", "Unknown", "vkA", "other", ""]),
        );
        let db = Database::parse(&content);
        assert_eq!(db.len(), 1);
        assert_eq!(db.skipped().len(), 1);
        assert_eq!(db.skipped()[0].line_number, 1);
        assert_eq!(db.next_sequence(), 5);
    }

    #[test]
    fn test_tracked_ids() {
        let content = [
            line(["ERR_00001", "Y", "Unknown", "", "a", ""]),
            line(["ERR_00002", "N", "SomeTest", "", "b", ""]),
            line(["ERR_00003", "N", "None", "", "c", ""]),
            line(["ERR_00004", "N", "Unknown", "", "d", ""]),
        ]
        .join("\n");
        let tracked = Database::parse(&content).tracked_ids();
        let seqs: Vec<u32> = tracked.iter().map(EntryId::sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_from_entries_carries_prior_status() {
        let prior = Database::parse(&line([
            "ERR_00001", "Y", "TestA", "vkFoo", "old wording", "reviewed",
        ]));

        let entries: EntrySet = vec![
            RequirementEntry::new(EntryId::new("ERR_", 1), "new wording", "vkFoo"),
            RequirementEntry::new(EntryId::new("ERR_", 2), "brand new", "vkBar").implicit(true),
        ]
        .into_iter()
        .collect();

        let next = Database::from_entries(&entries, &prior);
        let carried = next.get(&EntryId::new("ERR_", 1)).unwrap();
        assert!(carried.implemented);
        assert_eq!(carried.testname, TestName::Named("TestA".to_string()));
        assert_eq!(carried.message, "new wording");
        assert_eq!(carried.note, "reviewed");

        let fresh = next.get(&EntryId::new("ERR_", 2)).unwrap();
        assert!(!fresh.implemented);
        assert_eq!(fresh.testname, TestName::Unknown);
        assert_eq!(fresh.note, "implicit");
    }

    #[test]
    fn test_implicit_note_not_duplicated() {
        let prior = Database::parse(&line(["ERR_00001", "N", "Unknown", "", "m", "implicit"]));
        let entries: EntrySet =
            std::iter::once(RequirementEntry::new(EntryId::new("ERR_", 1), "m", "").implicit(true))
                .collect();
        let next = Database::from_entries(&entries, &prior);
        assert_eq!(next.get(&EntryId::new("ERR_", 1)).unwrap().note, "implicit");
    }

    #[test]
    fn test_render_sorted_with_header_and_trailing_blank_line() {
        let content = [
            line(["ERR_00010", "N", "Unknown", "vkB", "second", ""]),
            line(["ERR_00002", "Y", "None", "vkA", "first", "x"]),
        ]
        .join("\n");
        let rendered = Database::parse(&content).render("ERR_");

        assert!(rendered.starts_with("# This is a database file"));
        assert!(rendered.contains("of format ERR_<uniqueid>"));
        assert!(rendered.ends_with("second~^~\n\n"));

        let records: Vec<&str> = rendered.lines().filter(|l| l.starts_with("ERR_")).collect();
        assert_eq!(
            records,
            vec![
                "ERR_00002~^~Y~^~None~^~vkA~^~first~^~x",
                "ERR_00010~^~N~^~Unknown~^~vkB~^~second~^~",
            ]
        );
    }

    #[test]
    fn test_save_and_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db").join("vuid_database.txt");
        let file = DatabaseFile::new(&path);

        let db = Database::parse(&line(["ERR_00003", "Y", "TestC", "vkC", "msg", ""]));
        file.save(&db, "ERR_").unwrap();

        assert!(path.exists());
        assert!(temp_dir.path().join("db").join("vuid_database.txt.lock").exists());

        let loaded = file.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&EntryId::new("ERR_", 3)), db.get(&EntryId::new("ERR_", 3)));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = DatabaseFile::new(temp_dir.path().join("missing.txt"));
        let err = file.load().unwrap_err();
        assert!(err.to_string().contains("Failed to read database file"));
    }
}
