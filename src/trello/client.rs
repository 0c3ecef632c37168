//! Trello REST collaborator.
//!
//! Implements the engine's fetch/update/delete contract per entity type.
//! Card-scoped resources (attachments, stickers) go through [`CardEndpoint`].

use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::sync::{Remote, Snapshot};

use super::api_types::{ActionSnapshot, AttachmentSnapshot, MemberSnapshot, StickerSnapshot};
use super::fields::{Selections, WireFields};

pub const DEFAULT_BASE_URL: &str = "https://api.trello.com/1/";

/// Trello API client wrapper
#[derive(Clone)]
pub struct TrelloClient {
  http: Client,
  base: Url,
  key: String,
  token: String,
  selections: Selections,
}

impl TrelloClient {
  pub fn new(base_url: &str, key: String, token: String) -> Result<Self> {
    // Url::join drops the last segment unless the base ends with a slash.
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base = Url::parse(&base).map_err(|e| eyre!("Invalid Trello URL {}: {}", base_url, e))?;

    let http = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      key,
      token,
      selections: Selections::default(),
    })
  }

  pub fn from_config(config: &Config) -> Result<Self> {
    let key = Config::get_api_key()?;
    let token = Config::get_token()?;
    Ok(Self::new(&config.trello.url, key, token)?.with_selections(config.selections()?))
  }

  pub fn with_selections(mut self, selections: Selections) -> Self {
    self.selections = selections;
    self
  }

  pub fn selections(&self) -> &Selections {
    &self.selections
  }

  /// Endpoint for resources nested under a card.
  pub fn card(&self, card_id: impl Into<String>) -> CardEndpoint {
    CardEndpoint {
      client: self.clone(),
      card_id: card_id.into(),
    }
  }

  fn request(&self, method: Method, path: &str) -> SyncResult<RequestBuilder> {
    let url = self
      .base
      .join(path)
      .map_err(|e| SyncError::Transport(format!("bad request path {}: {}", path, e)))?;
    trace!(%method, %url, "trello request");
    Ok(
      self
        .http
        .request(method, url)
        .query(&[("key", &self.key), ("token", &self.token)]),
    )
  }

  async fn get<T: DeserializeOwned>(
    &self,
    kind: &'static str,
    id: &str,
    path: &str,
    query: &[(&'static str, String)],
  ) -> SyncResult<T> {
    let response = send(kind, id, self.request(Method::GET, path)?.query(query)).await?;
    decode(response).await
  }

  async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    kind: &'static str,
    id: &str,
    path: &str,
    body: &B,
  ) -> SyncResult<T> {
    let response = send(kind, id, self.request(Method::PUT, path)?.json(body)).await?;
    decode(response).await
  }

  async fn delete_at(&self, kind: &'static str, id: &str, path: &str) -> SyncResult<()> {
    send(kind, id, self.request(Method::DELETE, path)?).await?;
    Ok(())
  }
}

impl std::fmt::Debug for TrelloClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TrelloClient")
      .field("base", &self.base.as_str())
      .field("selections", &self.selections)
      .finish_non_exhaustive()
  }
}

/// Send a request and map unsuccessful statuses onto engine errors.
async fn send(kind: &'static str, id: &str, request: RequestBuilder) -> SyncResult<Response> {
  let response = request.send().await?;
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  debug!(kind, id, %status, body = %body, "trello request failed");
  Err(match status {
    StatusCode::NOT_FOUND => SyncError::NotFound {
      kind,
      id: id.to_string(),
    },
    s if s.is_client_error() => SyncError::Conflict(format!("{}: {}", s, body.trim())),
    s => SyncError::Transport(format!("{}: {}", s, body.trim())),
  })
}

async fn decode<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
  let bytes = response.bytes().await?;
  serde_json::from_slice(&bytes)
    .map_err(|e| SyncError::Transport(format!("failed to decode response: {}", e)))
}

#[async_trait]
impl Remote<MemberSnapshot> for TrelloClient {
  async fn fetch(&self, id: &str) -> SyncResult<MemberSnapshot> {
    let query = self.selections.member.query();
    self
      .get(MemberSnapshot::KIND, id, &format!("members/{}", id), &query)
      .await
  }

  async fn update(&self, id: &str, partial: &MemberSnapshot) -> SyncResult<MemberSnapshot> {
    self
      .put(MemberSnapshot::KIND, id, &format!("members/{}", id), partial)
      .await
  }

  async fn delete(&self, _id: &str) -> SyncResult<()> {
    Err(SyncError::Conflict("members cannot be deleted".into()))
  }
}

#[async_trait]
impl Remote<ActionSnapshot> for TrelloClient {
  async fn fetch(&self, id: &str) -> SyncResult<ActionSnapshot> {
    let query = self.selections.action.query();
    self
      .get(ActionSnapshot::KIND, id, &format!("actions/{}", id), &query)
      .await
  }

  async fn update(&self, id: &str, partial: &ActionSnapshot) -> SyncResult<ActionSnapshot> {
    self
      .put(ActionSnapshot::KIND, id, &format!("actions/{}", id), partial)
      .await
  }

  async fn delete(&self, id: &str) -> SyncResult<()> {
    self
      .delete_at(ActionSnapshot::KIND, id, &format!("actions/{}", id))
      .await
  }
}

/// Card-scoped endpoints for attachments and stickers.
#[derive(Debug, Clone)]
pub struct CardEndpoint {
  client: TrelloClient,
  card_id: String,
}

impl CardEndpoint {
  pub fn card_id(&self) -> &str {
    &self.card_id
  }

  fn path(&self, resource: &str, id: &str) -> String {
    if id.is_empty() {
      format!("cards/{}/{}", self.card_id, resource)
    } else {
      format!("cards/{}/{}/{}", self.card_id, resource, id)
    }
  }

  /// All attachments on the card.
  pub async fn attachments(&self) -> SyncResult<Vec<AttachmentSnapshot>> {
    let query = self.client.selections.attachment.query();
    self
      .client
      .get("card", &self.card_id, &self.path("attachments", ""), &query)
      .await
  }

  /// All stickers on the card.
  pub async fn stickers(&self) -> SyncResult<Vec<StickerSnapshot>> {
    let query = self.client.selections.sticker.query();
    self
      .client
      .get("card", &self.card_id, &self.path("stickers", ""), &query)
      .await
  }
}

#[async_trait]
impl Remote<AttachmentSnapshot> for CardEndpoint {
  async fn fetch(&self, id: &str) -> SyncResult<AttachmentSnapshot> {
    let query = self.client.selections.attachment.query();
    self
      .client
      .get(AttachmentSnapshot::KIND, id, &self.path("attachments", id), &query)
      .await
  }

  async fn update(&self, id: &str, partial: &AttachmentSnapshot) -> SyncResult<AttachmentSnapshot> {
    self
      .client
      .put(AttachmentSnapshot::KIND, id, &self.path("attachments", id), partial)
      .await
  }

  async fn delete(&self, id: &str) -> SyncResult<()> {
    self
      .client
      .delete_at(AttachmentSnapshot::KIND, id, &self.path("attachments", id))
      .await
  }
}

#[async_trait]
impl Remote<StickerSnapshot> for CardEndpoint {
  async fn fetch(&self, id: &str) -> SyncResult<StickerSnapshot> {
    let query = self.client.selections.sticker.query();
    self
      .client
      .get(StickerSnapshot::KIND, id, &self.path("stickers", id), &query)
      .await
  }

  async fn update(&self, id: &str, partial: &StickerSnapshot) -> SyncResult<StickerSnapshot> {
    self
      .client
      .put(StickerSnapshot::KIND, id, &self.path("stickers", id), partial)
      .await
  }

  async fn delete(&self, id: &str) -> SyncResult<()> {
    self
      .client
      .delete_at(StickerSnapshot::KIND, id, &self.path("stickers", id))
      .await
  }
}
