use crate::collaborators::{ScoreRecord, ScoreSink, SharedFeatureLookup, SharedFeatureRow};
use crate::entity::EntityDocument;
use crate::error::{Result, RiskError};
use crate::tier::RiskScore;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SHARED_FEATURE_LOOKUP: &str = "shared-feature lookup";

/// Create the scoring tables if they don't exist yet
pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    // (in-memory databases answer "memory")
    let _mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(RiskError::persistence)?;

    // ==========================================================================
    // Risk scores, one row per (entity, lens)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS RES_RISK_SCORE (
            RES_ENT_ID INTEGER NOT NULL,
            LENS_ID INTEGER NOT NULL,
            QUALITY_STATE TEXT NOT NULL,
            COLLISION_STATE TEXT NOT NULL,
            QUERY_STATE TEXT NOT NULL,
            REASON TEXT,
            QUERY_REASON TEXT,
            SCORED_AT TEXT NOT NULL,
            PRIMARY KEY (RES_ENT_ID, LENS_ID)
        )",
        [],
    )
    .map_err(RiskError::persistence)?;

    // ==========================================================================
    // Feature index: which entity holds which engine feature id
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS RES_FEAT_EKEY (
            LIB_FEAT_ID INTEGER NOT NULL,
            UTYPE_CODE TEXT,
            RES_ENT_ID INTEGER NOT NULL,
            LENS_ID INTEGER NOT NULL
        )",
        [],
    )
    .map_err(RiskError::persistence)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feat_ekey_feature ON RES_FEAT_EKEY(LIB_FEAT_ID, LENS_ID)",
        [],
    )
    .map_err(RiskError::persistence)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feat_ekey_entity ON RES_FEAT_EKEY(RES_ENT_ID, LENS_ID)",
        [],
    )
    .map_err(RiskError::persistence)?;

    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Score persistence and shared-feature lookup over one SQLite connection.
///
/// A connection is not shared between threads; each worker opens its own store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            RiskError::persistence(format!(
                "Failed to open database {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        // Workers each hold a connection to the same file
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(RiskError::persistence)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(RiskError::persistence)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Stored record for (entity_id, lens_id), if any.
    pub fn get_score(&self, entity_id: i64, lens_id: i64) -> Result<Option<ScoreRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT QUALITY_STATE, COLLISION_STATE, QUERY_STATE, REASON, QUERY_REASON, SCORED_AT
                 FROM RES_RISK_SCORE
                 WHERE RES_ENT_ID = ?1 AND LENS_ID = ?2",
                params![entity_id, lens_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(RiskError::persistence)?;

        let Some((quality, collision, query, reason, query_reason, scored_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ScoreRecord {
            entity_id,
            lens_id,
            quality: parse_state(&quality)?,
            collision: parse_state(&collision)?,
            query_risk: parse_state(&query)?,
            reason: reason.unwrap_or_default(),
            query_reason: query_reason.unwrap_or_default(),
            scored_at: Some(scored_at),
        }))
    }

    pub fn count_scores(&self, lens_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM RES_RISK_SCORE WHERE LENS_ID = ?1",
                params![lens_id],
                |row| row.get(0),
            )
            .map_err(RiskError::persistence)
    }

    /// Replace the feature index rows of one entity with the features of `doc`.
    ///
    /// Values without an engine feature id are not indexed. Returns rows written.
    pub fn index_entity_features(&self, lens_id: i64, doc: &EntityDocument) -> Result<usize> {
        let entity_id = doc.entity_id();
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(RiskError::persistence)?;

        tx.execute(
            "DELETE FROM RES_FEAT_EKEY WHERE RES_ENT_ID = ?1 AND LENS_ID = ?2",
            params![entity_id, lens_id],
        )
        .map_err(RiskError::persistence)?;

        let mut indexed = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO RES_FEAT_EKEY (LIB_FEAT_ID, UTYPE_CODE, RES_ENT_ID, LENS_ID)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(RiskError::persistence)?;

            for value in doc.resolved_entity.features.values().flatten() {
                if let Some(feature_id) = value.feature_id {
                    stmt.execute(params![feature_id, value.usage_type, entity_id, lens_id])
                        .map_err(RiskError::persistence)?;
                    indexed += 1;
                }
            }
        }

        tx.commit().map_err(RiskError::persistence)?;
        debug!(entity_id, lens_id, indexed, "Indexed entity features");
        Ok(indexed)
    }
}

fn parse_state(state: &str) -> Result<RiskScore> {
    RiskScore::from_literal(state)
        .ok_or_else(|| RiskError::persistence(format!("Unknown risk state in database: {}", state)))
}

// ============================================================================
// COLLABORATOR IMPLEMENTATIONS
// ============================================================================

impl ScoreSink for SqliteStore {
    fn upsert_score(&self, record: &ScoreRecord) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(RiskError::persistence)?;

        tx.execute(
            "INSERT INTO RES_RISK_SCORE (
                RES_ENT_ID, LENS_ID, QUALITY_STATE, COLLISION_STATE, QUERY_STATE,
                REASON, QUERY_REASON, SCORED_AT
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (RES_ENT_ID, LENS_ID) DO UPDATE SET
                QUALITY_STATE = excluded.QUALITY_STATE,
                COLLISION_STATE = excluded.COLLISION_STATE,
                QUERY_STATE = excluded.QUERY_STATE,
                REASON = excluded.REASON,
                QUERY_REASON = excluded.QUERY_REASON,
                SCORED_AT = excluded.SCORED_AT",
            params![
                record.entity_id,
                record.lens_id,
                record.quality.as_str(),
                record.collision.as_str(),
                record.query_risk.as_str(),
                record.reason,
                record.query_reason,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(RiskError::persistence)?;

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().map_err(RiskError::persistence)
    }

    fn delete_score(&self, entity_id: i64, lens_id: i64) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(RiskError::persistence)?;

        let deleted = tx
            .execute(
                "DELETE FROM RES_RISK_SCORE WHERE RES_ENT_ID = ?1 AND LENS_ID = ?2",
                params![entity_id, lens_id],
            )
            .map_err(RiskError::persistence)?;

        tx.commit().map_err(RiskError::persistence)?;

        if deleted > 0 {
            info!(entity_id, lens_id, "Deleted risk score of unresolved entity");
        }
        Ok(())
    }
}

impl SharedFeatureLookup for SqliteStore {
    fn find_sharers(
        &self,
        feature_ids: &[i64],
        exclude_entity_id: i64,
        lens_id: i64,
    ) -> Result<Vec<SharedFeatureRow>> {
        if feature_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; feature_ids.len()].join(",");
        let sql = format!(
            "SELECT LIB_FEAT_ID, UTYPE_CODE, RES_ENT_ID FROM RES_FEAT_EKEY
             WHERE RES_ENT_ID <> ? AND LENS_ID = ? AND LIB_FEAT_ID IN ({})",
            placeholders
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| RiskError::collaborator(SHARED_FEATURE_LOOKUP, e))?;

        let bound = [exclude_entity_id, lens_id]
            .into_iter()
            .chain(feature_ids.iter().copied());

        let rows = stmt
            .query_map(params_from_iter(bound), |row| {
                Ok(SharedFeatureRow {
                    feature_id: row.get(0)?,
                    usage_type: row.get(1)?,
                    other_entity_id: row.get(2)?,
                })
            })
            .map_err(|e| RiskError::collaborator(SHARED_FEATURE_LOOKUP, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RiskError::collaborator(SHARED_FEATURE_LOOKUP, e))?;

        Ok(rows)
    }
}
