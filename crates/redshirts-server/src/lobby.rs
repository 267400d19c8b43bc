//! Lobby membership lookups.
//!
//! The lobby service owns players and their current lobby. This module asks
//! it, on every operation, which lobby a player is in and tells it when a
//! player was last seen polling for messages. Nothing is cached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::context::{RequestContext, CORRELATION_ID_HEADER};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// A player as reported by the lobby service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: Uuid,
    pub lobby_id: Uuid,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Player {0} not found")]
    NotFound(Uuid),

    #[error("Lobby service unreachable: {0}")]
    Unreachable(String),

    #[error("Lobby service timed out")]
    Timeout,

    #[error("Lobby service answered with status {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed lobby service response: {0}")]
    BadResponse(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Source of truth for lobby membership and player liveness.
#[async_trait]
pub trait LobbyDirectory: Send + Sync {
    /// Resolve the player's current lobby membership.
    async fn get_player(
        &self,
        ctx: &RequestContext,
        player_id: Uuid,
    ) -> Result<Player, GatewayError>;

    /// Record that the player is alive (has just fetched messages).
    async fn update_last_refresh(
        &self,
        ctx: &RequestContext,
        player_id: Uuid,
    ) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// [`LobbyDirectory`] backed by the lobby service's REST API.
#[derive(Debug, Clone)]
pub struct LobbyClient {
    http: reqwest::Client,
    base_url: String,
}

impl LobbyClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        player_id: Uuid,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, correlation_id = %ctx.correlation_id, "calling lobby service");

        let response = self
            .http
            .request(method, &url)
            .header(CORRELATION_ID_HEADER, ctx.correlation_id.as_str())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .send()
            .await
            .map_err(classify)?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(player_id)),
            status => Err(GatewayError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[async_trait]
impl LobbyDirectory for LobbyClient {
    async fn get_player(
        &self,
        ctx: &RequestContext,
        player_id: Uuid,
    ) -> Result<Player, GatewayError> {
        let response = self
            .send(ctx, Method::GET, &format!("/player/{player_id}"), player_id)
            .await?;

        let body = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::BadResponse(e.to_string()))
    }

    async fn update_last_refresh(
        &self,
        ctx: &RequestContext,
        player_id: Uuid,
    ) -> Result<(), GatewayError> {
        self.send(
            ctx,
            Method::PATCH,
            &format!("/player/{player_id}/last-refresh"),
            player_id,
        )
        .await?;
        Ok(())
    }
}

fn classify(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_decode() || e.is_body() {
        GatewayError::BadResponse(e.to_string())
    } else if e.is_builder() {
        GatewayError::Client(e.to_string())
    } else {
        GatewayError::Unreachable(e.to_string())
    }
}
