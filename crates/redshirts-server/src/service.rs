//! Message creation and delivery.
//!
//! Each operation is one transaction: authorize against the lobby service,
//! touch the store, commit. Any error returned through `?` drops the open
//! [`StoreTx`], which rolls it back. Store steps run on the blocking pool;
//! only the lobby service calls are awaited on the runtime.

use std::sync::Arc;

use redshirts_store::{is_reserved_topic, CreateOutcome, Database, Message, NewMessage, StoreTx};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::ServerError;
use crate::lobby::LobbyDirectory;

/// Author id stamped on messages the lobby service posts on its own behalf.
pub const SYSTEM_AUTHOR: Uuid = Uuid::nil();

/// Who is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// A player, authorized by their current lobby membership.
    Player(Uuid),
    /// The lobby service itself. Skips membership checks.
    System,
}

/// Where a fetch should resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// The player has not fetched yet; start after their join marker.
    First,
    /// Resume after the highest number the player has seen.
    After(i64),
}

impl Cursor {
    /// Wire value meaning "no prior cursor".
    pub const NO_CURSOR: i64 = -1;

    pub fn from_wire(number: i64) -> Result<Self, ServerError> {
        match number {
            Self::NO_CURSOR => Ok(Cursor::First),
            n if n >= 0 => Ok(Cursor::After(n)),
            n => Err(ServerError::Validation(format!(
                "cursor must be {} or a non-negative number, got {n}",
                Self::NO_CURSOR
            ))),
        }
    }
}

#[derive(Clone)]
pub struct MessageService {
    db: Database,
    lobby: Arc<dyn LobbyDirectory>,
}

impl MessageService {
    pub fn new(db: Database, lobby: Arc<dyn LobbyDirectory>) -> Self {
        Self { db, lobby }
    }

    /// Store a message, idempotently on its id.
    ///
    /// Players may only post to the lobby they are currently in, under their
    /// own id, and never with a reserved topic.
    pub async fn create_message(
        &self,
        ctx: &RequestContext,
        principal: Principal,
        message: NewMessage,
    ) -> Result<(), ServerError> {
        if let Principal::Player(player_id) = principal {
            if message.player_id != player_id {
                return Err(ServerError::Unauthorized {
                    player_id,
                    lobby_id: message.lobby_id,
                });
            }
            if is_reserved_topic(&message.topic) {
                return Err(ServerError::SystemOnly("post reserved-topic messages"));
            }
        }

        let tx = self.begin().await?;

        if let Principal::Player(player_id) = principal {
            self.authorize(ctx, player_id, message.lobby_id).await?;
        }

        blocking(move || {
            insert(&tx, &message)?;
            tx.commit()
                .map_err(ServerError::store("committing message"))
        })
        .await
    }

    /// Messages the player has not seen yet, in number order.
    ///
    /// A successful fetch also reports the player as alive to the lobby
    /// service.
    pub async fn get_messages(
        &self,
        ctx: &RequestContext,
        player_id: Uuid,
        lobby_id: Uuid,
        cursor: Cursor,
    ) -> Result<Vec<Message>, ServerError> {
        let tx = self.begin().await?;

        self.authorize(ctx, player_id, lobby_id).await?;

        let (tx, messages) = blocking(move || {
            let messages = match cursor {
                Cursor::First => tx.get_messages_first_request(lobby_id, player_id),
                Cursor::After(number) => tx.get_messages(lobby_id, player_id, number),
            }
            .map_err(ServerError::store("loading messages"))?;
            Ok((tx, messages))
        })
        .await?;

        self.lobby.update_last_refresh(ctx, player_id).await?;

        blocking(move || {
            tx.commit()
                .map_err(ServerError::store("committing fetch"))
        })
        .await?;

        debug!(
            %lobby_id,
            %player_id,
            ?cursor,
            count = messages.len(),
            "delivered messages"
        );
        Ok(messages)
    }

    /// Record the join marker that anchors `player_id`'s first fetch.
    pub async fn record_player_joined(
        &self,
        principal: Principal,
        lobby_id: Uuid,
        player_id: Uuid,
    ) -> Result<(), ServerError> {
        self.record_system_message(principal, NewMessage::player_joined(lobby_id, player_id))
            .await
    }

    /// Record that `player_id` left `lobby_id`.
    pub async fn record_player_left(
        &self,
        principal: Principal,
        lobby_id: Uuid,
        player_id: Uuid,
    ) -> Result<(), ServerError> {
        self.record_system_message(principal, NewMessage::player_left(lobby_id, player_id))
            .await
    }

    async fn record_system_message(
        &self,
        principal: Principal,
        message: NewMessage,
    ) -> Result<(), ServerError> {
        if principal != Principal::System {
            return Err(ServerError::SystemOnly("record lobby membership"));
        }

        let tx = self.begin().await?;
        blocking(move || {
            insert(&tx, &message)?;
            tx.commit()
                .map_err(ServerError::store("committing membership marker"))
        })
        .await
    }

    async fn authorize(
        &self,
        ctx: &RequestContext,
        player_id: Uuid,
        lobby_id: Uuid,
    ) -> Result<(), ServerError> {
        let player = self.lobby.get_player(ctx, player_id).await?;
        if player.lobby_id != lobby_id {
            debug!(
                %player_id,
                current_lobby = %player.lobby_id,
                target_lobby = %lobby_id,
                "player is not in target lobby"
            );
            return Err(ServerError::Unauthorized {
                player_id,
                lobby_id,
            });
        }
        Ok(())
    }

    async fn begin(&self) -> Result<StoreTx, ServerError> {
        let db = self.db.clone();
        blocking(move || {
            db.begin()
                .map_err(ServerError::store("opening transaction"))
        })
        .await
    }
}

/// Run a store step on the blocking pool. SQLite calls may sit in the busy
/// handler for up to the busy timeout.
async fn blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("store task failed: {e}")))?
}

fn insert(tx: &StoreTx, message: &NewMessage) -> Result<(), ServerError> {
    match tx
        .create_message(message)
        .map_err(ServerError::store("creating message"))?
    {
        CreateOutcome::Created { number } => info!(
            id = %message.id,
            lobby_id = %message.lobby_id,
            player_id = %message.player_id,
            topic = %message.topic,
            number,
            "message created"
        ),
        CreateOutcome::Conflict => debug!(id = %message.id, "message already stored"),
    }
    Ok(())
}
