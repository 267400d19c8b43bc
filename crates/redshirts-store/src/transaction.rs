//! Scoped transactions.
//!
//! A [`StoreTx`] is resolved exactly once: [`StoreTx::commit`] on the success
//! path, [`StoreTx::rollback`] or `Drop` everywhere else. Dropping covers `?`
//! early returns and cancelled futures, so a transaction can never be left
//! open by a caller that gives up half way.

use rusqlite::Connection;

use crate::error::Result;

/// An open transaction that owns its connection.
pub struct StoreTx {
    conn: Connection,
    finished: bool,
}

impl StoreTx {
    pub(crate) fn begin(conn: Connection) -> Result<Self> {
        conn.execute_batch("BEGIN DEFERRED")?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Underlying connection, for queries inside this transaction.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Make every change of this transaction durable.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // A failed COMMIT (e.g. SQLITE_BUSY) can leave the transaction open.
            if !self.conn.is_autocommit() {
                let _ = self.conn.execute_batch("ROLLBACK");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Discard every change of this transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for StoreTx {
    fn drop(&mut self) {
        if self.finished || self.conn.is_autocommit() {
            return;
        }
        tracing::debug!("rolling back unfinished transaction");
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(error = %e, "rollback of dropped transaction failed");
        }
    }
}
