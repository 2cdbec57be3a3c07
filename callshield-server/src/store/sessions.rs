//! Session row mutations
//!
//! The ingest path writes status (and a user-safe failure note); the
//! advice worker writes advice, analyzing and its own last_error. The
//! columns are disjoint so the two writers never clobber each other.

use super::LiveStore;
use callshield_common::time::now_ms;
use callshield_common::{CallStatus, CoachingAdvice, Result};
use tracing::{debug, info};

/// User-safe note stored when a call transitions to failed
pub const CALL_FAILED_NOTE: &str = "The call could not be completed.";

impl LiveStore {
    /// Create the session row if missing, otherwise apply the status
    /// transition. The slug is immutable once set. Idempotent: a repeat
    /// event that changes nothing writes nothing and notifies nobody.
    pub async fn upsert_session(
        &self,
        call_id: &str,
        slug: &str,
        status: Option<CallStatus>,
    ) -> Result<()> {
        let existing = self.get_summary(call_id).await?;

        match existing {
            None => {
                let status = status.unwrap_or(CallStatus::Unknown);
                let last_error = (status == CallStatus::Failed).then(|| CALL_FAILED_NOTE);
                sqlx::query(
                    "INSERT INTO sessions (call_id, slug, status, last_error, updated_at, version) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                )
                .bind(call_id)
                .bind(slug)
                .bind(status.as_str())
                .bind(last_error)
                .bind(now_ms())
                .execute(&self.pool)
                .await?;
                info!(call_id = %call_id, slug = %slug, status = %status, "Session created");
                self.publish_session(call_id).await;
            }
            Some(row) => {
                let Some(next) = status else { return Ok(()) };
                let applied = CallStatus::transition(row.status, next);
                if applied == row.status {
                    debug!(call_id = %call_id, status = %row.status, "Status unchanged");
                    return Ok(());
                }
                let failure_note =
                    (applied == CallStatus::Failed).then(|| CALL_FAILED_NOTE.to_string());
                sqlx::query(
                    "UPDATE sessions SET status = ?2, \
                     last_error = COALESCE(?3, last_error), \
                     updated_at = ?4, version = version + 1 \
                     WHERE call_id = ?1",
                )
                .bind(call_id)
                .bind(applied.as_str())
                .bind(failure_note)
                .bind(now_ms())
                .execute(&self.pool)
                .await?;
                info!(call_id = %call_id, from = %row.status, to = %applied, "Status transition");
                self.publish_session(call_id).await;
            }
        }

        Ok(())
    }

    /// Apply a status transition on an existing row.
    pub async fn set_status(
        &self,
        call_id: &str,
        status: CallStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let Some(row) = self.get_summary(call_id).await? else {
            return Ok(());
        };
        let applied = CallStatus::transition(row.status, status);
        if applied == row.status && last_error.is_none() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE sessions SET status = ?2, last_error = COALESCE(?3, last_error), \
             updated_at = ?4, version = version + 1 WHERE call_id = ?1",
        )
        .bind(call_id)
        .bind(applied.as_str())
        .bind(last_error)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        self.publish_session(call_id).await;
        Ok(())
    }

    /// Flip the analyzing flag (model call in flight).
    pub async fn set_analyzing(&self, call_id: &str, analyzing: bool) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET analyzing = ?2, updated_at = ?3, version = version + 1 \
             WHERE call_id = ?1",
        )
        .bind(call_id)
        .bind(analyzing as i64)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        self.publish_session(call_id).await;
        Ok(())
    }

    /// Persist a new advice snapshot, replacing last_error and the
    /// analyzing flag in the same write.
    pub async fn set_advice(
        &self,
        call_id: &str,
        advice: &CoachingAdvice,
        last_error: Option<&str>,
        analyzing: bool,
    ) -> Result<()> {
        let json = serde_json::to_string(advice)
            .map_err(|e| callshield_common::Error::Internal(format!("advice encode: {e}")))?;
        sqlx::query(
            "UPDATE sessions SET advice = ?2, last_advice_at = ?3, last_error = ?4, \
             analyzing = ?5, updated_at = ?6, version = version + 1 WHERE call_id = ?1",
        )
        .bind(call_id)
        .bind(json)
        .bind(advice.updated_at)
        .bind(last_error)
        .bind(analyzing as i64)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        debug!(
            call_id = %call_id,
            score = advice.risk_score,
            level = advice.risk_level.as_str(),
            "Advice persisted"
        );
        self.publish_session(call_id).await;
        Ok(())
    }
}
