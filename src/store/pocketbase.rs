//! PocketBase implementation of [`RecordStore`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::api_types::{
  ApiAuthRequest, ApiAuthResponse, ApiErrorResponse, ApiListResponse, ApiRealtimeConnect,
  ApiRealtimeMessage, ApiRealtimeSubscribe,
};
use super::sse::{SseDecoder, SseFrame};
use super::{
  ChangeEvent, Collection, Filter, ListQuery, RecordStore, StoreError, Subscription,
};
use crate::config::PocketBaseConfig;

/// Records requested per page when walking a full list.
const PAGE_SIZE: usize = 500;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The user the client is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
  pub id: String,
  pub email: Option<String>,
  pub name: Option<String>,
}

#[derive(Debug)]
struct AuthState {
  token: String,
  user: AuthUser,
}

/// PocketBase REST + realtime client.
#[derive(Clone)]
pub struct PocketBaseClient {
  http: reqwest::Client,
  base: Url,
  auth_collection: String,
  auth: Arc<RwLock<Option<AuthState>>>,
}

impl PocketBaseClient {
  pub fn new(config: &PocketBaseConfig) -> Result<Self, StoreError> {
    let mut base = Url::parse(&config.url)?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    // No overall request timeout: the realtime stream is long-lived.
    let http = reqwest::Client::builder()
      .connect_timeout(CONNECT_TIMEOUT)
      .build()?;

    Ok(Self {
      http,
      base,
      auth_collection: config.auth_collection.clone(),
      auth: Arc::new(RwLock::new(None)),
    })
  }

  /// Log in with identity + password against the configured auth collection.
  pub async fn authenticate(&self, identity: &str, password: &str) -> Result<AuthUser, StoreError> {
    let url = self.endpoint(&format!(
      "api/collections/{}/auth-with-password",
      self.auth_collection
    ))?;

    let response = self
      .http
      .post(url)
      .json(&ApiAuthRequest { identity, password })
      .send()
      .await?;
    let body: ApiAuthResponse = decode(response, "auth-with-password").await?;

    let user = AuthUser {
      id: body.record.id,
      email: body.record.email,
      name: body.record.name,
    };
    info!(user = %user.id, "Authenticated against {}", self.auth_collection);

    *self.auth.write().unwrap_or_else(PoisonError::into_inner) = Some(AuthState {
      token: body.token,
      user: user.clone(),
    });
    Ok(user)
  }

  pub fn is_authenticated(&self) -> bool {
    self
      .auth
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  pub fn current_user(&self) -> Option<AuthUser> {
    self
      .auth
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .map(|state| state.user.clone())
  }

  fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
    Ok(self.base.join(path)?)
  }

  fn records_url(&self, collection: Collection) -> Result<Url, StoreError> {
    self.endpoint(&format!("api/collections/{}/records", collection))
  }

  fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
    let token = self
      .auth
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .map(|state| state.token.clone());
    match token {
      Some(token) => request.header(AUTHORIZATION, token),
      None => request,
    }
  }

  async fn fetch_page(
    &self,
    collection: Collection,
    query: &ListQuery,
    page: usize,
    per_page: usize,
  ) -> Result<ApiListResponse, StoreError> {
    let mut url = self.records_url(collection)?;
    {
      let mut pairs = url.query_pairs_mut();
      pairs.append_pair("page", &page.to_string());
      pairs.append_pair("perPage", &per_page.to_string());
      if let Some(sort) = &query.sort {
        pairs.append_pair("sort", sort);
      }
      if let Some(filter) = &query.filter {
        pairs.append_pair("filter", &filter.to_string());
      }
      if let Some(fields) = &query.fields {
        pairs.append_pair("fields", &fields.join(","));
      }
    }

    let what = format!("{} records", collection);
    let response = self.authorized(self.http.get(url)).send().await?;
    decode(response, &what).await
  }
}

impl RecordStore for PocketBaseClient {
  async fn list<T>(&self, collection: Collection, query: &ListQuery) -> Result<Vec<T>, StoreError>
  where
    T: DeserializeOwned + Send,
  {
    let mut records = Vec::new();
    let mut page = 1;

    loop {
      let response = self.fetch_page(collection, query, page, PAGE_SIZE).await?;
      let count = response.items.len();
      for item in response.items {
        records.push(serde_json::from_value(item)?);
      }

      let last_page = response.total_pages > 0 && page as i64 >= response.total_pages;
      if count < PAGE_SIZE || last_page {
        break;
      }
      page += 1;
    }

    debug!(%collection, count = records.len(), "Listed records");
    Ok(records)
  }

  async fn first<T>(&self, collection: Collection, filter: &Filter) -> Result<T, StoreError>
  where
    T: DeserializeOwned + Send,
  {
    let query = ListQuery::new().filter(filter.clone());
    let response = self.fetch_page(collection, &query, 1, 1).await?;

    match response.items.into_iter().next() {
      Some(item) => Ok(serde_json::from_value(item)?),
      None => Err(StoreError::NotFound(format!(
        "{} matching {}",
        collection, filter
      ))),
    }
  }

  async fn subscribe(&self, collections: &[Collection]) -> Result<Subscription, StoreError> {
    let url = self.endpoint("api/realtime")?;

    let response = self
      .authorized(self.http.get(url.clone()))
      .header(ACCEPT, "text/event-stream")
      .send()
      .await?;
    let response = check_status(response, "realtime connect").await?;

    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut backlog = Vec::new();

    // The server announces our client id before anything else can be routed to us.
    let client_id = loop {
      let chunk = match stream.next().await {
        Some(chunk) => chunk?,
        None => {
          return Err(StoreError::Realtime(
            "stream closed before PB_CONNECT".to_string(),
          ))
        }
      };

      let mut client_id = None;
      for frame in decoder.push(&chunk) {
        if client_id.is_none() && frame.event == "PB_CONNECT" {
          let connect: ApiRealtimeConnect = serde_json::from_str(&frame.data)?;
          client_id = Some(connect.client_id);
        } else {
          backlog.push(frame);
        }
      }
      if let Some(id) = client_id {
        break id;
      }
    };

    let topics: Vec<String> = collections.iter().map(|c| format!("{}/*", c)).collect();
    let body = ApiRealtimeSubscribe {
      client_id: &client_id,
      subscriptions: topics.clone(),
    };
    let response = self.authorized(self.http.post(url)).json(&body).send().await?;
    check_status(response, "realtime subscribe").await?;
    info!(client_id = %client_id, ?topics, "Realtime subscription established");

    let (tx, rx) = mpsc::unbounded_channel();
    for frame in &backlog {
      forward(&tx, frame);
    }

    let reader = tokio::spawn(async move {
      while let Some(chunk) = stream.next().await {
        match chunk {
          Ok(bytes) => {
            for frame in decoder.push(&bytes) {
              if !forward(&tx, &frame) {
                return;
              }
            }
          }
          Err(e) => {
            warn!("Realtime stream failed: {}", e);
            break;
          }
        }
      }
      debug!("Realtime stream closed");
    });

    Ok(Subscription::new(rx, Some(reader)))
  }
}

/// Route one SSE frame to the subscriber. Returns false once nobody is listening.
fn forward(tx: &mpsc::UnboundedSender<ChangeEvent>, frame: &SseFrame) -> bool {
  let topic = frame.event.split('/').next().unwrap_or_default();
  let Some(collection) = Collection::from_name(topic) else {
    return true;
  };

  match serde_json::from_str::<ApiRealtimeMessage>(&frame.data) {
    Ok(message) => tx
      .send(ChangeEvent {
        collection,
        action: message.action,
        record: message.record,
      })
      .is_ok(),
    Err(e) => {
      warn!(topic = %frame.event, id = ?frame.id, "Ignoring malformed realtime frame: {}", e);
      true
    }
  }
}

async fn check_status(response: Response, what: &str) -> Result<Response, StoreError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  if status == StatusCode::NOT_FOUND {
    return Err(StoreError::NotFound(what.to_string()));
  }

  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<ApiErrorResponse>(&body)
    .map(|e| e.message)
    .unwrap_or(body);
  Err(StoreError::Status {
    status: status.as_u16(),
    message,
  })
}

async fn decode<R: DeserializeOwned>(response: Response, what: &str) -> Result<R, StoreError> {
  let response = check_status(response, what).await?;
  let bytes = response.bytes().await?;
  Ok(serde_json::from_slice(&bytes)?)
}
