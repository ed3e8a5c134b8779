//! Shared typed models used across extraction, storage, and query layers.

use std::fmt;

use indexmap::IndexSet;
use serde::{Serialize, Serializer};

/// Ordered, de-duplicated set of canonical tickers. Iteration follows first
/// occurrence in the source.
pub type SymbolSet = IndexSet<String>;

/// Index label applied when a loaded row carries no index of its own.
pub const UNKNOWN_INDEX: &str = "UNKNOWN";

// ---------------------------------------------------------------------------
// Match tiers
// ---------------------------------------------------------------------------

/// Confidence tier of a match, in descending precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchReason {
    Exact,
    Prefix,
    Fuzzy,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::Exact => "exact",
            MatchReason::Prefix => "prefix",
            MatchReason::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Query-time records
// ---------------------------------------------------------------------------

/// A pool entry that survived the matcher's threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub name: Option<String>,
    /// Index label of the pool row this candidate came from, if any.
    pub index: Option<String>,
    pub reason: MatchReason,
    pub score: f64,
}

/// A ranked, enriched search result. Built once per query and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SymbolHit {
    pub symbol: String,
    pub name: String,
    pub indices: Vec<String>,
    #[serde(serialize_with = "serialize_score")]
    pub score: f64,
    pub reason: MatchReason,
}

/// Round a score to three decimals for any textual rendering.
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

fn serialize_score<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_score(*score))
}

// ---------------------------------------------------------------------------
// Loaded / stored rows
// ---------------------------------------------------------------------------

/// One row of an index constituents file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquityRow {
    pub symbol: String,
    pub name: String,
    pub index: String,
    pub isin: Option<String>,
    pub sector: Option<String>,
}

/// A stored display name for a symbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquityName {
    pub symbol: String,
    pub name: String,
    pub source: Option<String>,
    pub as_of: Option<String>,
}

// ---------------------------------------------------------------------------
// Write outcomes
// ---------------------------------------------------------------------------

/// Outcome of `SymbolStore::upsert_names`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NameUpsert {
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
}

/// Outcome of a membership upsert for one index label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MembershipUpsert {
    pub inserted: usize,
    pub total_for_index: usize,
}

/// Whether an ingestion step produced anything usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ok,
    /// Zero valid symbols were parsed from the source.
    Empty,
}

/// Summary of one `ingest_symbols` run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub found: usize,
    pub before: usize,
    pub inserted: usize,
    pub total: usize,
    pub index: Option<String>,
    pub membership_inserted: usize,
    pub membership_total: usize,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.status == IngestStatus::Ok
    }
}
