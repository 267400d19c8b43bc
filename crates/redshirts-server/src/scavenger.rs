//! Periodic purge of messages past the retention window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use redshirts_store::{Database, StoreError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Deletes aged-out messages on a fixed interval.
#[derive(Debug, Clone)]
pub struct Scavenger {
    db: Database,
    retention: Duration,
    interval: Duration,
}

impl Scavenger {
    pub fn new(db: Database, retention: Duration, interval: Duration) -> Self {
        Self {
            db,
            retention,
            interval,
        }
    }

    /// Run the sweep loop in the background until the handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Starting message scavenger"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let scavenger = self.clone();
            let span = info_span!("scavenger", sweep_id = %Uuid::new_v4());
            let result = tokio::task::spawn_blocking(move || {
                span.in_scope(|| scavenger.sweep(Utc::now()))
            })
            .await;

            match result {
                Ok(Ok(0)) => debug!("No expired messages"),
                Ok(Ok(count)) => info!(count, "Purged expired messages"),
                Ok(Err(e)) => warn!(error = %e, "Message sweep failed, retrying next tick"),
                Err(e) => warn!(error = %e, "Message sweep task aborted, retrying next tick"),
            }
        }
    }

    /// Delete every message older than the retention window as of `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            warn!(
                retention_secs = self.retention.as_secs(),
                "Retention window out of range, nothing purged"
            );
            return Ok(0);
        };

        let tx = self.db.begin()?;
        let count = tx.delete_messages_before(cutoff)?;
        tx.commit()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use redshirts_store::NewMessage;
    use serde_json::json;

    use super::*;
    use crate::context::RequestContext;
    use crate::service::{Cursor, MessageService, Principal};
    use crate::testing::{open_db, FakeLobby};

    fn message_at(lobby_id: Uuid, player_id: Uuid, send_time: DateTime<Utc>) -> NewMessage {
        NewMessage {
            id: Uuid::new_v4(),
            lobby_id,
            player_id,
            send_time,
            topic: "CHAT".to_string(),
            message: json!({}),
        }
    }

    fn count_messages(db: &Database) -> i64 {
        let tx = db.begin().unwrap();
        tx.conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_purged_messages_are_never_delivered_again() {
        let (_dir, db) = open_db();
        let lobby = Arc::new(FakeLobby::default());
        let service = MessageService::new(db.clone(), lobby.clone());
        let lobby_id = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        lobby.place(alice, lobby_id);
        lobby.place(bob, lobby_id);
        let ctx = RequestContext::new("test");
        let now = Utc::now();

        for age in [120, 90, 5] {
            service
                .create_message(
                    &ctx,
                    Principal::Player(alice),
                    message_at(lobby_id, alice, now - ChronoDuration::seconds(age)),
                )
                .await
                .unwrap();
        }

        let scavenger = Scavenger::new(db, Duration::from_secs(30), Duration::from_secs(60));
        assert_eq!(scavenger.sweep(now).unwrap(), 2);

        let delivered = service
            .get_messages(&ctx, bob, lobby_id, Cursor::After(0))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].number, 3);
    }

    #[test]
    fn test_sweep_with_nothing_expired() {
        let (_dir, db) = open_db();
        let scavenger = Scavenger::new(db, Duration::from_secs(30), Duration::from_secs(60));
        assert_eq!(scavenger.sweep(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_retention_purges_nothing() {
        let (_dir, db) = open_db();
        let tx = db.begin().unwrap();
        tx.create_message(&message_at(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() - ChronoDuration::hours(1),
        ))
        .unwrap();
        tx.commit().unwrap();

        let scavenger = Scavenger::new(db.clone(), Duration::MAX, Duration::from_secs(60));
        assert_eq!(scavenger.sweep(Utc::now()).unwrap(), 0);
        assert_eq!(count_messages(&db), 1);
    }

    #[tokio::test]
    async fn test_spawned_loop_purges_in_background() {
        let (_dir, db) = open_db();
        let tx = db.begin().unwrap();
        tx.create_message(&message_at(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() - ChronoDuration::hours(1),
        ))
        .unwrap();
        tx.commit().unwrap();

        let handle = Scavenger::new(
            db.clone(),
            Duration::from_secs(1),
            Duration::from_millis(50),
        )
        .spawn();

        let mut remaining = count_messages(&db);
        for _ in 0..40 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            remaining = count_messages(&db);
        }
        handle.abort();

        assert_eq!(remaining, 0);
    }
}
