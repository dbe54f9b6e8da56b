//! Reconciliation of freshly extracted entries against the prior database
//!
//! Every fresh entry is mapped onto an existing identifier when it is judged
//! to be the same requirement, or onto a newly allocated one otherwise. The
//! matching tiers, first hit wins:
//!
//! 1. operator-forced remap of the entry's default sequence number
//! 2. identical full message
//! 3. identical (api, message without link)
//! 4. identical (api, core requirement text), where a prior text also
//!    matches with a period added before its closing quote
//! 5. nothing: allocate the next sequence number
//!
//! Tiers 3 and 4 may yield several aliased candidates. A single candidate is
//! taken; among several, the one continuing the run of consecutively reused
//! sequence numbers is taken; otherwise a new identifier is allocated and the
//! entry is flagged for manual review. Each old identifier is used at most
//! once per pass.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::database::Database;
use crate::models::{EntryId, EntrySet, RequirementEntry};
use crate::remap::RemapTable;
use crate::validate::{validate, Validation};

/// Start of the spec link appended to every message; matches both
/// `http://` and `https://` spec URLs
pub const LINK_MARKER: &str = "(http";

/// Phrase introducing the quoted requirement text in a message
pub const STATEMENT_MARKER: &str = " which states ";

/// Message with the trailing spec link removed
pub fn strip_link(message: &str) -> &str {
    match message.find(LINK_MARKER) {
        Some(pos) => &message[..pos],
        None => message,
    }
    .trim_end()
}

/// Quoted requirement text of a link-stripped message, without the
/// section preamble
pub fn core_text(no_link: &str) -> &str {
    match no_link.split_once(STATEMENT_MARKER) {
        Some((_, core)) => core,
        None => no_link,
    }
}

/// Core text ending in `.'` instead of `'`, so a prior statement still
/// matches once a final period is added
pub fn period_variant(core: &str) -> Option<String> {
    if core.ends_with(".'") {
        return None;
    }
    core.strip_suffix('\'')
        .map(|stripped| format!("{}.'", stripped))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    api: String,
    text: String,
}

impl MatchKey {
    fn new(api: &str, text: &str) -> Self {
        Self {
            api: api.to_string(),
            text: text.to_string(),
        }
    }
}

/// One key to many identifiers
#[derive(Debug, Default)]
struct AliasIndex {
    map: HashMap<MatchKey, Vec<EntryId>>,
}

impl AliasIndex {
    fn insert(&mut self, key: MatchKey, id: &EntryId) {
        let ids = self.map.entry(key).or_default();
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    /// `None` when the key was never indexed, otherwise the candidates
    /// not yet consumed (possibly none)
    fn available(&self, key: &MatchKey, consumed: &HashSet<EntryId>) -> Option<Vec<EntryId>> {
        self.map.get(key).map(|ids| {
            ids.iter()
                .filter(|id| !consumed.contains(*id))
                .cloned()
                .collect()
        })
    }
}

/// Matching tier that produced candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    NoLink,
    Core,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::NoLink => write!(f, "no-link"),
            Tier::Core => write!(f, "core"),
        }
    }
}

/// How a fresh entry obtained its final identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "tier", rename_all = "kebab-case")]
pub enum MatchKind {
    /// Operator-supplied remap
    Forced,
    /// Identical full message
    FullMessage,
    /// Exactly one available candidate in the tier
    Single(Tier),
    /// Candidate continuing the last mapped sequence
    Sequence(Tier),
    /// Several candidates, none in sequence; new identifier allocated
    Ambiguous(Tier),
    /// No match at all; new identifier allocated
    New,
}

impl MatchKind {
    /// True when the final identifier was freshly allocated
    pub fn is_allocated(&self) -> bool {
        matches!(self, MatchKind::Ambiguous(_) | MatchKind::New)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// Default identifier given by the extractor
    pub fresh: EntryId,
    /// Identifier the entry ends up with
    pub assigned: EntryId,
    pub kind: MatchKind,
}

/// Non-fatal conditions found while reconciling; all need human attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "kebab-case")]
pub enum ReconcileWarning {
    /// Two prior records carry the same full message; the first is indexed
    DuplicatePriorMessage { id: EntryId, kept: EntryId },
    /// Full message matched an identifier already used in this pass
    ConsumedFullMatch { fresh: EntryId, matched: EntryId },
    /// Several candidates without a sequence tie-break
    Ambiguous {
        fresh: EntryId,
        assigned: EntryId,
        tier: Tier,
        candidates: Vec<EntryId>,
    },
    /// Two fresh entries ended up on one identifier; the later one won
    Collision {
        id: EntryId,
        replaced: EntryId,
        by: EntryId,
    },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileWarning::DuplicatePriorMessage { id, kept } => write!(
                f,
                "duplicate full message in prior database: {} repeats {}",
                id, kept
            ),
            ReconcileWarning::ConsumedFullMatch { fresh, matched } => write!(
                f,
                "{} has the exact message of {} but that id is already taken",
                fresh, matched
            ),
            ReconcileWarning::Ambiguous {
                fresh,
                assigned,
                tier,
                candidates,
            } => {
                let list: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "{} matched {} message of [{}] without a sequence id, assigned new id {} for manual review",
                    fresh,
                    tier,
                    list.join(", "),
                    assigned
                )
            }
            ReconcileWarning::Collision { id, replaced, by } => write!(
                f,
                "about to overwrite {}: fresh entry {} replaces fresh entry {}",
                id, by, replaced
            ),
        }
    }
}

/// Lookup structures built once from the prior database
#[derive(Debug)]
pub struct PriorIndex {
    full: HashMap<String, EntryId>,
    no_link: AliasIndex,
    core: AliasIndex,
    tracked: BTreeSet<EntryId>,
    prior_count: usize,
    next_sequence: u32,
    warnings: Vec<ReconcileWarning>,
}

impl PriorIndex {
    pub fn build(prior: &Database) -> Self {
        let mut index = PriorIndex {
            full: HashMap::new(),
            no_link: AliasIndex::default(),
            core: AliasIndex::default(),
            tracked: prior.tracked_ids(),
            prior_count: prior.len(),
            next_sequence: prior.next_sequence(),
            warnings: Vec::new(),
        };

        for record in prior.records() {
            let id = &record.id;
            match index.full.get(&record.message) {
                Some(kept) => {
                    log::debug!(
                        "Found duplicate full message in prior database: {} repeats {}",
                        id,
                        kept
                    );
                    index.warnings.push(ReconcileWarning::DuplicatePriorMessage {
                        id: id.clone(),
                        kept: kept.clone(),
                    });
                }
                None => {
                    index.full.insert(record.message.clone(), id.clone());
                }
            }

            let no_link = strip_link(&record.message);
            index.no_link.insert(MatchKey::new(&record.api, no_link), id);

            let core = core_text(no_link);
            index.core.insert(MatchKey::new(&record.api, core), id);
            if let Some(variant) = period_variant(core) {
                index.core.insert(MatchKey::new(&record.api, &variant), id);
            }
        }

        index
    }

    /// Identifiers that were implemented or tested before this pass
    pub fn tracked(&self) -> &BTreeSet<EntryId> {
        &self.tracked
    }

    pub fn prior_count(&self) -> usize {
        self.prior_count
    }
}

/// Matching state threaded through one reconciliation pass
#[derive(Debug)]
pub struct Reconciler {
    index: PriorIndex,
    remap: RemapTable,
    consumed: HashSet<EntryId>,
    last_mapped: Option<u32>,
    next_sequence: u32,
    warnings: Vec<ReconcileWarning>,
}

impl Reconciler {
    pub fn new(prior: &Database, remap: RemapTable) -> Self {
        let mut index = PriorIndex::build(prior);
        let warnings = std::mem::take(&mut index.warnings);
        Self {
            next_sequence: index.next_sequence,
            index,
            remap,
            consumed: HashSet::new(),
            last_mapped: None,
            warnings,
        }
    }

    /// Sequence number of the most recently reused identifier
    pub fn last_mapped(&self) -> Option<u32> {
        self.last_mapped
    }

    pub fn set_last_mapped(&mut self, sequence: Option<u32>) {
        self.last_mapped = sequence;
    }

    /// Sequence number the next allocated identifier will get
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn warnings(&self) -> &[ReconcileWarning] {
        &self.warnings
    }

    /// Decides the final identifier of one fresh entry and updates the state
    pub fn assign(&mut self, entry: &RequirementEntry) -> Assignment {
        let (assigned, kind) = self.resolve(entry);
        log::debug!("{} -> {} ({:?})", entry.id, assigned, kind);
        Assignment {
            fresh: entry.id.clone(),
            assigned,
            kind,
        }
    }

    fn resolve(&mut self, entry: &RequirementEntry) -> (EntryId, MatchKind) {
        if let Some(target) = self.remap.get(entry.id.sequence()) {
            let id = entry.id.with_sequence(target);
            log::info!("Using user-supplied remap to force {} to be {}", entry.id, id);
            self.consume(&id);
            return (id, MatchKind::Forced);
        }

        if let Some(id) = self.index.full.get(&entry.message).cloned() {
            if !self.consumed.contains(&id) {
                self.consume(&id);
                return (id, MatchKind::FullMessage);
            }
            log::debug!(
                "{} has the exact message of {} but that id is already taken",
                entry.id,
                id
            );
            self.warnings.push(ReconcileWarning::ConsumedFullMatch {
                fresh: entry.id.clone(),
                matched: id,
            });
        }

        let no_link = strip_link(&entry.message);
        let key = MatchKey::new(&entry.api, no_link);
        if let Some(candidates) = self.index.no_link.available(&key, &self.consumed) {
            return self.choose(entry, Tier::NoLink, candidates);
        }

        let core = core_text(no_link);
        // Only prior text carries the period variant; the fresh key is exact
        let key = MatchKey::new(&entry.api, core);
        if let Some(candidates) = self.index.core.available(&key, &self.consumed) {
            return self.choose(entry, Tier::Core, candidates);
        }

        let id = self.allocate(&entry.id);
        log::info!(
            "Completely new id and error code, update new id from {} to unique {}",
            entry.id,
            id
        );
        (id, MatchKind::New)
    }

    fn choose(
        &mut self,
        entry: &RequirementEntry,
        tier: Tier,
        candidates: Vec<EntryId>,
    ) -> (EntryId, MatchKind) {
        if let [only] = candidates.as_slice() {
            let id = only.clone();
            self.consume(&id);
            return (id, MatchKind::Single(tier));
        }

        let in_sequence = self.last_mapped.and_then(|last| {
            candidates
                .iter()
                .find(|id| Some(id.sequence()) == last.checked_add(1))
                .cloned()
        });
        if let Some(id) = in_sequence {
            self.consume(&id);
            return (id, MatchKind::Sequence(tier));
        }

        let id = self.allocate(&entry.id);
        let warning = ReconcileWarning::Ambiguous {
            fresh: entry.id.clone(),
            assigned: id.clone(),
            tier,
            candidates,
        };
        log::debug!("{}", warning);
        self.warnings.push(warning);
        (id, MatchKind::Ambiguous(tier))
    }

    fn consume(&mut self, id: &EntryId) {
        self.consumed.insert(id.clone());
        self.last_mapped = Some(id.sequence());
    }

    fn allocate(&mut self, fresh: &EntryId) -> EntryId {
        let id = fresh.with_sequence(self.next_sequence);
        self.next_sequence = self.next_sequence.saturating_add(1);
        id
    }

    /// Reconciles every fresh entry in identifier order
    pub fn run(mut self, fresh: &EntrySet) -> Reconciliation {
        let mut entries = EntrySet::new();
        let mut assignments = Vec::with_capacity(fresh.len());
        let mut owners: HashMap<EntryId, EntryId> = HashMap::new();

        for entry in fresh {
            let assignment = self.assign(entry);
            if let Some(replaced) = owners.insert(assignment.assigned.clone(), entry.id.clone()) {
                let warning = ReconcileWarning::Collision {
                    id: assignment.assigned.clone(),
                    replaced,
                    by: entry.id.clone(),
                };
                log::debug!("{}", warning);
                self.warnings.push(warning);
            }
            entries.insert(entry.with_id(assignment.assigned.clone()));
            assignments.push(assignment);
        }

        log::info!("Reconciled {} entries", assignments.len());

        Reconciliation {
            entries,
            assignments,
            warnings: self.warnings,
            prior_count: self.index.prior_count,
            tracked: self.index.tracked,
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Fresh content under final identifiers
    pub entries: EntrySet,
    /// One decision per fresh entry, in processing order
    pub assignments: Vec<Assignment>,
    pub warnings: Vec<ReconcileWarning>,
    pub prior_count: usize,
    pub tracked: BTreeSet<EntryId>,
}

impl Reconciliation {
    /// Count check plus regression scan of tracked identifiers
    pub fn validate(&self) -> Validation {
        validate(
            self.prior_count,
            self.entries.len(),
            &self.tracked,
            self.entries.ids(),
        )
    }

    /// Assignments that received a freshly allocated identifier
    pub fn allocated(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().filter(|a| a.kind.is_allocated())
    }
}

/// Reconciles `fresh` against `prior`, applying forced remaps first
pub fn reconcile(fresh: &EntrySet, prior: &Database, remap: &RemapTable) -> Reconciliation {
    Reconciler::new(prior, remap.clone()).run(fresh)
}
