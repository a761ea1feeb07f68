//! `SQLite` suggestion store.
//!
//! One row per unordered contact pair, enforced by `UNIQUE(contact1_id,
//! contact2_id)`. The row ID is derived from the pair, so re-detecting a pair
//! keeps its identity across scans and restarts.

use super::connection::{
    acquire_lock, db_error, from_db_timestamp, open_database, open_in_memory, to_db_timestamp,
};
use crate::config::DismissalPolicy;
use crate::models::{
    ContactId, ContactPair, DuplicateMatchReason, DuplicateSuggestion, SuggestionId,
    SuggestionStatus,
};
use crate::storage::traits::{RecordSummary, SuggestionStore};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::instrument;

const SELECT_SUGGESTION: &str = "SELECT id, contact1_id, contact2_id, score, reasons, status,
        fingerprint, created_at, updated_at
 FROM duplicate_suggestions";

/// `SQLite`-backed suggestion store.
pub struct SqliteSuggestionStore {
    conn: Mutex<Connection>,
    policy: DismissalPolicy,
}

impl SqliteSuggestionStore {
    /// Opens (or creates) the suggestion table in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_database(path.as_ref(), "open_suggestions_db")?;
        let store = Self {
            conn: Mutex::new(conn),
            policy: DismissalPolicy::default(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory("open_suggestions_db_memory")?;
        let store = Self {
            conn: Mutex::new(conn),
            policy: DismissalPolicy::default(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Sets the dismissal policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DismissalPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS duplicate_suggestions (
                id TEXT PRIMARY KEY,
                contact1_id TEXT NOT NULL,
                contact2_id TEXT NOT NULL,
                score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
                reasons TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'pending',
                fingerprint TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (contact1_id, contact2_id),
                CHECK (contact1_id < contact2_id)
            );

            CREATE INDEX IF NOT EXISTS idx_suggestions_status ON duplicate_suggestions(status);
            ",
        )
        .map_err(db_error("initialize_suggestions_schema"))?;
        Ok(())
    }

    fn set_status(
        &self,
        id: &SuggestionId,
        status: SuggestionStatus,
        allowed_from: &[SuggestionStatus],
    ) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM duplicate_suggestions WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("get_suggestion_status"))?;
        let Some(current) = current else {
            return Err(Error::suggestion_not_found(id));
        };
        let current = decode_status(&current)?;
        if !allowed_from.contains(&current) {
            return Ok(false);
        }

        conn.execute(
            "UPDATE duplicate_suggestions SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.as_str(),
                status.as_str(),
                to_db_timestamp(crate::current_timestamp())
            ],
        )
        .map_err(db_error("update_suggestion_status"))?;
        Ok(true)
    }

    fn query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<DuplicateSuggestion>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(db_error("prepare_suggestions"))?;
        let rows = stmt
            .query_map(args, SuggestionRow::from_row)
            .map_err(db_error("query_suggestions"))?;
        rows.map(|r| r.map_err(db_error("read_suggestion")).and_then(SuggestionRow::decode))
            .collect()
    }
}

struct SuggestionRow {
    id: String,
    contact1_id: String,
    contact2_id: String,
    score: i64,
    reasons: String,
    status: String,
    fingerprint: String,
    created_at: i64,
    updated_at: i64,
}

impl SuggestionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            contact1_id: row.get(1)?,
            contact2_id: row.get(2)?,
            score: row.get(3)?,
            reasons: row.get(4)?,
            status: row.get(5)?,
            fingerprint: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<DuplicateSuggestion> {
        let match_reasons: Vec<DuplicateMatchReason> = serde_json::from_str(&self.reasons)
            .map_err(|e| Error::OperationFailed {
                operation: "decode_reasons".to_string(),
                cause: format!("{}: {e}", self.id),
            })?;
        Ok(DuplicateSuggestion {
            id: SuggestionId::new(self.id),
            contact1_id: ContactId::new(self.contact1_id),
            contact2_id: ContactId::new(self.contact2_id),
            score: u8::try_from(self.score.clamp(0, 100)).unwrap_or(100),
            match_reasons,
            status: decode_status(&self.status)?,
            fingerprint: self.fingerprint,
            created_at: from_db_timestamp(self.created_at),
            updated_at: from_db_timestamp(self.updated_at),
        })
    }
}

fn decode_status(raw: &str) -> Result<SuggestionStatus> {
    SuggestionStatus::parse(raw).ok_or_else(|| Error::OperationFailed {
        operation: "decode_status".to_string(),
        cause: format!("unknown suggestion status '{raw}'"),
    })
}

fn encode_reasons(reasons: &[DuplicateMatchReason]) -> Result<String> {
    serde_json::to_string(reasons).map_err(|e| Error::OperationFailed {
        operation: "encode_reasons".to_string(),
        cause: e.to_string(),
    })
}

impl SuggestionStore for SqliteSuggestionStore {
    fn load_pending(&self, existing: &HashSet<ContactId>) -> Result<Vec<DuplicateSuggestion>> {
        let all = self.query(
            &format!(
                "{SELECT_SUGGESTION} WHERE status = 'pending'
                 ORDER BY score DESC, contact1_id, contact2_id"
            ),
            &[],
        )?;
        Ok(all
            .into_iter()
            .filter(|s| existing.contains(&s.contact1_id) && existing.contains(&s.contact2_id))
            .collect())
    }

    #[instrument(skip(self, suggestions), fields(count = suggestions.len()))]
    fn record(&self, suggestions: &[DuplicateSuggestion]) -> Result<RecordSummary> {
        let mut summary = RecordSummary::default();
        let now = to_db_timestamp(crate::current_timestamp());

        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(db_error("begin_record"))?;

        for suggestion in suggestions {
            let Some(pair) = suggestion.pair() else {
                tracing::warn!(id = %suggestion.id, "Skipping self-pair suggestion");
                continue;
            };
            let reasons = encode_reasons(&suggestion.match_reasons)?;
            let existing: Option<(String, String, String)> = tx
                .query_row(
                    "SELECT id, status, fingerprint FROM duplicate_suggestions
                     WHERE contact1_id = ?1 AND contact2_id = ?2",
                    params![pair.first().as_str(), pair.second().as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(db_error("lookup_suggestion"))?;

            let Some((row_id, status, fingerprint)) = existing else {
                tx.execute(
                    "INSERT INTO duplicate_suggestions
                        (id, contact1_id, contact2_id, score, reasons, status, fingerprint,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?7)",
                    params![
                        SuggestionId::for_pair(&pair).as_str(),
                        pair.first().as_str(),
                        pair.second().as_str(),
                        i64::from(suggestion.score),
                        reasons,
                        suggestion.fingerprint,
                        now,
                    ],
                )
                .map_err(db_error("insert_suggestion"))?;
                summary.inserted += 1;
                continue;
            };

            let reopen = match decode_status(&status)? {
                SuggestionStatus::Pending => false,
                SuggestionStatus::Dismissed
                    if self.policy.resurface_on_change && fingerprint != suggestion.fingerprint =>
                {
                    true
                },
                SuggestionStatus::Dismissed | SuggestionStatus::Merged => {
                    summary.suppressed += 1;
                    continue;
                },
            };

            tx.execute(
                "UPDATE duplicate_suggestions
                 SET score = ?2, reasons = ?3, fingerprint = ?4, status = 'pending',
                     updated_at = ?5
                 WHERE id = ?1",
                params![
                    row_id,
                    i64::from(suggestion.score),
                    reasons,
                    suggestion.fingerprint,
                    now,
                ],
            )
            .map_err(db_error("refresh_suggestion"))?;
            if reopen {
                tracing::info!(id = %row_id, "Dismissed pair changed, resurfacing");
                summary.resurfaced += 1;
            } else {
                summary.updated += 1;
            }
        }

        tx.commit().map_err(db_error("commit_record"))?;
        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            resurfaced = summary.resurfaced,
            suppressed = summary.suppressed,
            "Recorded scan results"
        );
        Ok(summary)
    }

    #[instrument(skip(self), fields(suggestion_id = %id))]
    fn dismiss(&self, id: &SuggestionId) -> Result<bool> {
        self.set_status(id, SuggestionStatus::Dismissed, &[SuggestionStatus::Pending])
    }

    #[instrument(skip(self), fields(suggestion_id = %id))]
    fn mark_merged(&self, id: &SuggestionId) -> Result<bool> {
        self.set_status(
            id,
            SuggestionStatus::Merged,
            &[SuggestionStatus::Pending, SuggestionStatus::Dismissed],
        )
    }

    fn get(&self, id: &SuggestionId) -> Result<Option<DuplicateSuggestion>> {
        let mut found = self.query(
            &format!("{SELECT_SUGGESTION} WHERE id = ?1"),
            &[&id.as_str()],
        )?;
        Ok(found.pop())
    }

    fn pending_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM duplicate_suggestions WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(db_error("count_pending"))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn expire_stale(&self, detected: &[ContactPair]) -> Result<usize> {
        let keep: HashSet<SuggestionId> = detected.iter().map(SuggestionId::for_pair).collect();

        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(db_error("begin_expire_stale"))?;
        let pending: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT id FROM duplicate_suggestions WHERE status = 'pending'")
                .map_err(db_error("prepare_expire_stale"))?;
            let rows = stmt
                .query_map([], |row| row.get(0))
                .map_err(db_error("query_expire_stale"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("read_expire_stale"))?
        };

        let mut removed = 0;
        for id in pending {
            if keep.contains(&SuggestionId::new(id.clone())) {
                continue;
            }
            removed += tx
                .execute("DELETE FROM duplicate_suggestions WHERE id = ?1", params![id])
                .map_err(db_error("delete_stale"))?;
        }
        tx.commit().map_err(db_error("commit_expire_stale"))?;

        if removed > 0 {
            tracing::debug!(removed, "Expired stale pending suggestions");
        }
        Ok(removed)
    }

    fn prune_orphans(&self, existing: &HashSet<ContactId>) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(db_error("begin_prune_orphans"))?;
        let candidates: Vec<(String, String, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, contact1_id, contact2_id FROM duplicate_suggestions
                     WHERE status != 'merged'",
                )
                .map_err(db_error("prepare_prune_orphans"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .map_err(db_error("query_prune_orphans"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_error("read_prune_orphans"))?
        };

        let mut removed = 0;
        for (id, first, second) in candidates {
            if existing.contains(&ContactId::new(first)) && existing.contains(&ContactId::new(second))
            {
                continue;
            }
            removed += tx
                .execute("DELETE FROM duplicate_suggestions WHERE id = ?1", params![id])
                .map_err(db_error("delete_orphan"))?;
        }
        tx.commit().map_err(db_error("commit_prune_orphans"))?;

        if removed > 0 {
            tracing::debug!(removed, "Pruned orphaned suggestions");
        }
        Ok(removed)
    }
}
