//! Message persistence: insert-once creation, cursor reads and purging.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, ErrorCode};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Message, NewMessage, PLAYER_JOINS_LOBBY};
use crate::transaction::StoreTx;

const MESSAGE_COLUMNS: &str = "id, send_time, lobby_id, player_id, number, topic, message";

/// Result of [`StoreTx::create_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The message was inserted and received this number.
    Created { number: i64 },
    /// A message with the same id already exists; nothing was written.
    Conflict,
}

impl StoreTx {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a message, assigning the next number of its lobby.
    ///
    /// A duplicate `id` is reported as [`CreateOutcome::Conflict`] and leaves
    /// the lobby sequence untouched.
    pub fn create_message(&self, message: &NewMessage) -> Result<CreateOutcome> {
        let payload = serde_json::to_string(&message.message)?;

        self.conn().execute_batch("SAVEPOINT create_message")?;
        match self.insert_numbered(message, &payload) {
            Ok(number) => {
                self.conn().execute_batch("RELEASE create_message")?;
                Ok(CreateOutcome::Created { number })
            }
            Err(e) => {
                self.conn()
                    .execute_batch("ROLLBACK TO create_message; RELEASE create_message")?;
                if is_duplicate_id(&e) {
                    tracing::debug!(id = %message.id, "message already exists");
                    Ok(CreateOutcome::Conflict)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn insert_numbered(&self, message: &NewMessage, payload: &str) -> rusqlite::Result<i64> {
        let number: i64 = self.conn().query_row(
            "INSERT INTO lobby_sequences (lobby_id, last_number) VALUES (?1, 1)
             ON CONFLICT(lobby_id) DO UPDATE SET last_number = last_number + 1
             RETURNING last_number",
            params![message.lobby_id.to_string()],
            |row| row.get(0),
        )?;

        self.conn().execute(
            "INSERT INTO messages (id, send_time, lobby_id, player_id, number, topic, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                format_timestamp(&message.send_time),
                message.lobby_id.to_string(),
                message.player_id.to_string(),
                number,
                message.topic,
                payload,
            ],
        )?;

        Ok(number)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Messages of `lobby_id` numbered above `after_number`, excluding those
    /// authored by `exclude_player_id`, in ascending number order.
    pub fn get_messages(
        &self,
        lobby_id: Uuid,
        exclude_player_id: Uuid,
        after_number: i64,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE lobby_id = ?1 AND player_id != ?2 AND number > ?3
             ORDER BY number ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                lobby_id.to_string(),
                exclude_player_id.to_string(),
                after_number
            ],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Like [`get_messages`](Self::get_messages), but anchored to the first
    /// join marker `exclude_player_id` has in the lobby.
    ///
    /// A player without a join marker gets no messages.
    pub fn get_messages_first_request(
        &self,
        lobby_id: Uuid,
        exclude_player_id: Uuid,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE lobby_id = ?1 AND player_id != ?2 AND number > (
                 SELECT number FROM messages
                 WHERE lobby_id = ?1 AND player_id = ?2 AND topic = ?3
                 ORDER BY number ASC
                 LIMIT 1
             )
             ORDER BY number ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                lobby_id.to_string(),
                exclude_player_id.to_string(),
                PLAYER_JOINS_LOBBY
            ],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete every message sent strictly before `before`.
    pub fn delete_messages_before(&self, before: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE send_time < ?1",
            params![format_timestamp(&before)],
        )?;
        Ok(affected)
    }
}

/// Fixed-width UTC form, so that text comparison in SQL is time comparison.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_duplicate_id(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let ts_str: String = row.get(1)?;
    let lobby_id_str: String = row.get(2)?;
    let player_id_str: String = row.get(3)?;
    let number: i64 = row.get(4)?;
    let topic: String = row.get(5)?;
    let payload: String = row.get(6)?;

    let id = parse_uuid(0, &id_str)?;
    let send_time: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let lobby_id = parse_uuid(2, &lobby_id_str)?;
    let player_id = parse_uuid(3, &player_id_str)?;
    let message = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id,
        lobby_id,
        player_id,
        send_time,
        number,
        topic,
        message,
    })
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
