//! Per-user storage ledger.
//!
//! `storage_used` is only ever changed through [`QuotaLedger::commit`],
//! [`QuotaLedger::commit_in`] or [`QuotaLedger::charge`]. Uploads use
//! `charge`, which checks and increments in one conditional update, so two
//! concurrent uploads cannot both slip under the limit.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::db::DbPool;
use crate::{FileboxError, Result};

/// Snapshot of a user's storage consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    /// Bytes consumed.
    pub used_bytes: i64,
    /// Bytes allowed.
    pub limit_bytes: i64,
    /// Bytes left (never negative).
    pub available_bytes: i64,
    /// Usage percentage (0.0 - 100.0+).
    pub usage_percent: f64,
}

impl StorageUsage {
    /// Build a usage snapshot from used and limit values.
    pub fn new(used_bytes: i64, limit_bytes: i64) -> Self {
        let usage_percent = if limit_bytes == 0 {
            0.0
        } else {
            (used_bytes as f64 / limit_bytes as f64) * 100.0
        };

        Self {
            used_bytes,
            limit_bytes,
            available_bytes: (limit_bytes - used_bytes).max(0),
            usage_percent,
        }
    }

    /// Whether adding `additional_bytes` would go over the limit.
    ///
    /// Landing exactly on the limit is allowed. A sum that overflows `i64`
    /// always exceeds.
    pub fn would_exceed(&self, additional_bytes: i64) -> bool {
        self.used_bytes
            .checked_add(additional_bytes)
            .map_or(true, |total| total > self.limit_bytes)
    }
}

/// Quota ledger over the `users` table.
pub struct QuotaLedger<'a> {
    pool: &'a DbPool,
}

impl<'a> QuotaLedger<'a> {
    /// Create a new QuotaLedger with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Current usage for a user.
    pub async fn usage(&self, user_id: i64) -> Result<StorageUsage> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT storage_used, storage_limit FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;

        let (used, limit) = row.ok_or_else(|| FileboxError::NotFound("user".to_string()))?;
        Ok(StorageUsage::new(used, limit))
    }

    /// Pre-flight check for an upload of `requested_bytes`.
    ///
    /// This is an estimate against the caller's declared length and reserves
    /// nothing; the authoritative check is [`QuotaLedger::charge`].
    pub async fn reserve(&self, user_id: i64, requested_bytes: i64) -> Result<()> {
        if requested_bytes < 0 {
            return Err(FileboxError::Validation(
                "requested size must not be negative".to_string(),
            ));
        }

        let usage = self.usage(user_id).await?;
        if usage.would_exceed(requested_bytes) {
            debug!(
                user_id,
                requested_bytes,
                used = usage.used_bytes,
                limit = usage.limit_bytes,
                "Quota reservation denied"
            );
            return Err(FileboxError::QuotaExceeded {
                requested: requested_bytes,
                available: usage.available_bytes,
            });
        }

        Ok(())
    }

    /// Apply `delta_bytes` to a user's usage. Never denies.
    ///
    /// Negative deltas stop at zero.
    pub async fn commit(&self, user_id: i64, delta_bytes: i64) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await?;
        Self::commit_in(&mut conn, user_id, delta_bytes).await
    }

    /// [`QuotaLedger::commit`] on an open connection or transaction.
    pub async fn commit_in(conn: &mut SqliteConnection, user_id: i64, delta_bytes: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET storage_used = MAX(storage_used + ?, 0) WHERE id = ?")
                .bind(delta_bytes)
                .bind(user_id)
                .execute(conn)
                .await?;

        if result.rows_affected() == 0 {
            return Err(FileboxError::NotFound("user".to_string()));
        }

        debug!(user_id, delta_bytes, "Ledger committed");
        Ok(())
    }

    /// Atomically add `bytes` to a user's usage if the result stays within
    /// the limit.
    ///
    /// Runs on the caller's transaction so the charge commits or rolls back
    /// together with the file record.
    pub async fn charge(conn: &mut SqliteConnection, user_id: i64, bytes: i64) -> Result<()> {
        if bytes < 0 {
            return Err(FileboxError::Validation(
                "charged size must not be negative".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE users SET storage_used = storage_used + ?
             WHERE id = ? AND storage_used + ? <= storage_limit",
        )
        .bind(bytes)
        .bind(user_id)
        .bind(bytes)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT storage_used, storage_limit FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?;

        match row {
            Some((used, limit)) => Err(FileboxError::QuotaExceeded {
                requested: bytes,
                available: (limit - used).max(0),
            }),
            None => Err(FileboxError::NotFound("user".to_string())),
        }
    }

    /// Recompute a user's usage from their live files.
    ///
    /// Returns `(previous, current)` usage.
    pub async fn reconcile(&self, user_id: i64) -> Result<(i64, i64)> {
        let previous = self.usage(user_id).await?.used_bytes;

        let current: i64 = sqlx::query_scalar(
            "UPDATE users
             SET storage_used = (SELECT COALESCE(SUM(size), 0) FROM files WHERE owner_id = users.id)
             WHERE id = ?
             RETURNING storage_used",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        if previous != current {
            info!(user_id, previous, current, "Ledger reconciled");
        }

        Ok((previous, current))
    }
}
