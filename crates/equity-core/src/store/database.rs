//! SQLite storage layer for the symbol directory.
//!
//! Each public method opens its own connection so callers never manage
//! connection lifetime. Writes go through one transaction per call and are
//! serialized by an in-process lock plus `BEGIN IMMEDIATE`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::errors::{EquityError, EquityResult};
use crate::models::{EquityName, MembershipUpsert, NameUpsert};
use crate::query::enrich::{sorted_labels, EnrichmentSource};
use crate::query::guards::{clamp_limit, truncate_query, MAX_CANDIDATE_LIMIT};
use crate::store::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if raw.len() > 2 {
                expanded.push(&raw[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Trimmed, upper-cased, non-empty values in first-seen order.
fn normalize_symbols<I, S>(symbols: I) -> IndexSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    symbols
        .into_iter()
        .map(|s| normalize_key(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> EquityResult<usize> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(n.max(0) as usize)
}

fn stage_symbols(conn: &Connection, symbols: &IndexSet<String>) -> EquityResult<()> {
    conn.execute_batch(&schema::STAGING_STATEMENTS.join("\n"))?;
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO temp.staged_symbols(symbol) VALUES (?1);")?;
    for sym in symbols {
        stmt.execute(params![sym])?;
    }
    Ok(())
}

/// Symbol store backed by a single SQLite file.
pub struct SymbolStore {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

impl SymbolStore {
    /// Open (creating if needed) the store at `path` and bring its schema up
    /// to date. Any failure to create or open the file is reported as
    /// [`EquityError::StoreUnavailable`].
    pub fn open(path: impl AsRef<Path>) -> EquityResult<Self> {
        let expanded = expand_tilde(path.as_ref());
        let unavailable = |reason: String| EquityError::StoreUnavailable {
            path: expanded.display().to_string(),
            reason,
        };
        if let Some(parent) = expanded.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }
        let store = Self {
            db_path: expanded.clone(),
            write_lock: Mutex::new(()),
        };
        store.init_schema().map_err(|e| match e {
            EquityError::Sqlite(err) => unavailable(err.to_string()),
            other => other,
        })?;
        info!(path = %store.db_path.display(), "store_opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> EquityResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Set WAL mode, create tables and indexes, then run pending migrations.
    pub fn init_schema(&self) -> EquityResult<()> {
        let _guard = self.write_lock.lock();
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&conn)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Equities
    // -----------------------------------------------------------------------

    /// Insert symbols not yet stored. Returns the total number of stored
    /// symbols afterwards.
    pub fn upsert<I, S>(&self, symbols: I) -> EquityResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let staged = normalize_symbols(symbols);
        if staged.is_empty() {
            return self.count();
        }

        let _guard = self.write_lock.lock();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        stage_symbols(&tx, &staged)?;
        let inserted = tx.execute(
            "INSERT INTO equities(symbol) \
             SELECT s.symbol FROM temp.staged_symbols s \
             LEFT JOIN equities e ON e.symbol = s.symbol \
             WHERE e.symbol IS NULL;",
            [],
        )?;
        let total = count(&tx, "SELECT COUNT(*) FROM equities;", [])?;
        tx.commit()?;

        info!(staged = staged.len(), inserted, total, "equities_upserted");
        Ok(total)
    }

    pub fn count(&self) -> EquityResult<usize> {
        let conn = self.connect()?;
        count(&conn, "SELECT COUNT(*) FROM equities;", [])
    }

    /// Every stored symbol, sorted.
    pub fn fetch_all(&self) -> EquityResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT symbol FROM equities ORDER BY symbol;")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    /// Insert new symbol → name pairs and refresh pairs whose name changed.
    /// Unchanged pairs are not written. The first name given for a symbol
    /// wins within one call.
    pub fn upsert_names<I, S, T>(&self, pairs: I, source: Option<&str>) -> EquityResult<NameUpsert>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut staged: IndexMap<String, String> = IndexMap::new();
        for (sym, name) in pairs {
            let sym = normalize_key(sym.as_ref());
            let name = name.as_ref().trim();
            if sym.is_empty() || name.is_empty() {
                continue;
            }
            staged.entry(sym).or_insert_with(|| name.to_string());
        }

        let _guard = self.write_lock.lock();
        let mut conn = self.connect()?;
        if staged.is_empty() {
            let total = count(&conn, "SELECT COUNT(*) FROM equity_names;", [])?;
            return Ok(NameUpsert {
                inserted: 0,
                updated: 0,
                total,
            });
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(&schema::STAGING_STATEMENTS.join("\n"))?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO temp.staged_names(symbol, name) VALUES (?1, ?2);")?;
            for (sym, name) in &staged {
                stmt.execute(params![sym, name])?;
            }
        }
        let updated = tx.execute(
            "UPDATE equity_names SET \
                 name = (SELECT s.name FROM temp.staged_names s WHERE s.symbol = equity_names.symbol), \
                 source = ?1, \
                 as_of = CURRENT_TIMESTAMP \
             WHERE EXISTS ( \
                 SELECT 1 FROM temp.staged_names s \
                 WHERE s.symbol = equity_names.symbol AND s.name <> equity_names.name \
             );",
            params![source],
        )?;
        let inserted = tx.execute(
            "INSERT INTO equity_names(symbol, name, source, as_of) \
             SELECT s.symbol, s.name, ?1, CURRENT_TIMESTAMP FROM temp.staged_names s \
             LEFT JOIN equity_names n ON n.symbol = s.symbol \
             WHERE n.symbol IS NULL;",
            params![source],
        )?;
        let total = count(&tx, "SELECT COUNT(*) FROM equity_names;", [])?;
        tx.commit()?;

        info!(staged = staged.len(), inserted, updated, total, source = ?source, "names_upserted");
        Ok(NameUpsert {
            inserted,
            updated,
            total,
        })
    }

    pub fn fetch_name(&self, symbol: &str) -> EquityResult<Option<EquityName>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT symbol, name, source, as_of FROM equity_names WHERE UPPER(symbol) = ?1;",
                params![normalize_key(symbol)],
                |row| {
                    Ok(EquityName {
                        symbol: row.get(0)?,
                        name: row.get(1)?,
                        source: row.get(2)?,
                        as_of: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Names keyed by upper-cased symbol. Unknown symbols are absent.
    pub fn fetch_names_for_symbols(&self, symbols: &[String]) -> EquityResult<HashMap<String, String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT name FROM equity_names WHERE UPPER(symbol) = ?1;")?;
        let mut out = HashMap::new();
        for key in normalize_symbols(symbols) {
            if let Some(name) = stmt
                .query_row(params![key], |row| row.get::<_, String>(0))
                .optional()?
            {
                out.insert(key, name);
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Index membership
    // -----------------------------------------------------------------------

    /// Register `symbols` as members of `index_label`. Returns how many edges
    /// were new and the index's member count afterwards.
    pub fn upsert_membership<I, S>(&self, symbols: I, index_label: &str) -> EquityResult<MembershipUpsert>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let label = normalize_key(index_label);
        if label.is_empty() {
            return Err(EquityError::Query("index label must not be empty".to_string()));
        }
        let staged = normalize_symbols(symbols);

        let _guard = self.write_lock.lock();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let member_sql = "SELECT COUNT(*) FROM equity_membership WHERE \"index\" = ?1;";
        let before = count(&tx, member_sql, params![label])?;
        if !staged.is_empty() {
            stage_symbols(&tx, &staged)?;
            tx.execute(
                "INSERT INTO equity_membership(symbol, \"index\") \
                 SELECT s.symbol, ?1 FROM temp.staged_symbols s \
                 LEFT JOIN equity_membership m ON m.symbol = s.symbol AND m.\"index\" = ?1 \
                 WHERE m.symbol IS NULL;",
                params![label],
            )?;
        }
        let after = count(&tx, member_sql, params![label])?;
        tx.commit()?;

        let result = MembershipUpsert {
            inserted: after.saturating_sub(before),
            total_for_index: after,
        };
        info!(
            index = %label,
            inserted = result.inserted,
            total = result.total_for_index,
            "membership_upserted"
        );
        Ok(result)
    }

    /// Register every stored equity as a member of `index_label`.
    pub fn sync_index_membership(&self, index_label: &str) -> EquityResult<MembershipUpsert> {
        let symbols = self.fetch_all()?;
        debug!(index = %index_label, symbols = symbols.len(), "membership_sync");
        self.upsert_membership(&symbols, index_label)
    }

    /// Distinct labels `symbol` belongs to, sorted. Matching is
    /// case-insensitive; an unknown symbol yields an empty list.
    pub fn fetch_indices_for_symbol(&self, symbol: &str) -> EquityResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT \"index\" FROM equity_membership \
             WHERE UPPER(symbol) = UPPER(?1) ORDER BY \"index\";",
        )?;
        let out = stmt
            .query_map(params![symbol.trim()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        debug!(symbol, count = out.len(), "symbol_indices");
        Ok(out)
    }

    pub fn fetch_indices_for_symbols(
        &self,
        symbols: &[String],
    ) -> EquityResult<HashMap<String, Vec<String>>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT \"index\" FROM equity_membership WHERE UPPER(symbol) = ?1;")?;
        let mut out = HashMap::new();
        for key in normalize_symbols(symbols) {
            let labels = stmt
                .query_map(params![key], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            if !labels.is_empty() {
                out.insert(key, sorted_labels(labels));
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Query-time reads
    // -----------------------------------------------------------------------

    /// Symbols equal to or starting with `query` (case-insensitive), sorted
    /// and capped at `limit`.
    pub fn fetch_candidates(&self, query: &str, limit: i64) -> EquityResult<Vec<String>> {
        let q = truncate_query(query.trim());
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let limit = clamp_limit(limit, MAX_CANDIDATE_LIMIT);
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT symbol FROM equities \
             WHERE UPPER(symbol) = UPPER(?1) OR UPPER(symbol) LIKE UPPER(?2) ESCAPE '\\' \
             ORDER BY symbol LIMIT ?3;",
        )?;
        let rows = stmt
            .query_map(params![q, format!("{}%", escape_like(&q)), limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        info!(query = %q, rows = rows.len(), "db_candidates_fetched");
        Ok(rows)
    }

    /// The fuzzy-search pool: every stored symbol with its name, if any.
    /// With a non-empty `indices` filter only members of those indices are
    /// returned (labels compared trimmed and case-insensitively).
    pub fn fetch_pool(&self, indices: Option<&[String]>) -> EquityResult<Vec<(String, Option<String>)>> {
        let labels: Vec<String> = indices
            .map(|ix| normalize_symbols(ix).into_iter().collect())
            .unwrap_or_default();

        let mut sql = String::from(
            "SELECT e.symbol, n.name FROM equities e \
             LEFT JOIN equity_names n ON n.symbol = e.symbol",
        );
        if !labels.is_empty() {
            let placeholders = vec!["?"; labels.len()].join(", ");
            sql.push_str(&format!(
                " WHERE EXISTS (SELECT 1 FROM equity_membership m \
                 WHERE m.symbol = e.symbol AND UPPER(m.\"index\") IN ({placeholders}))"
            ));
        }
        sql.push_str(" ORDER BY e.symbol;");

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(labels.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rows = rows.len(), indices = ?labels, "pool_fetched");
        Ok(rows)
    }
}

impl EnrichmentSource for SymbolStore {
    fn names_for(&self, symbols: &[String]) -> EquityResult<HashMap<String, String>> {
        self.fetch_names_for_symbols(symbols)
    }

    fn indices_for(&self, symbols: &[String]) -> EquityResult<HashMap<String, Vec<String>>> {
        self.fetch_indices_for_symbols(symbols)
    }
}
