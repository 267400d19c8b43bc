//! # redshirts-store
//!
//! Persistence for lobby messages, backed by SQLite.
//!
//! Every logical operation runs inside a [`StoreTx`] obtained from
//! [`Database::begin`]. The transaction owns its own connection, so it can be
//! held across `.await` points while the caller talks to other services, and
//! it rolls back automatically unless [`StoreTx::commit`] is called.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod transaction;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use messages::CreateOutcome;
pub use models::*;
pub use transaction::StoreTx;
