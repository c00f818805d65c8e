//! Serde types matching PocketBase API responses.

use serde::{Deserialize, Serialize};

// ============================================================================
// Records
// ============================================================================

/// One page of `GET /api/collections/{c}/records`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListResponse {
  #[serde(default)]
  pub total_pages: i64,
  #[serde(default)]
  pub items: Vec<serde_json::Value>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
  #[serde(default)]
  pub message: String,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiAuthRequest<'a> {
  pub identity: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthResponse {
  pub token: String,
  pub record: ApiAuthRecord,
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthRecord {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
}

// ============================================================================
// Realtime
// ============================================================================

/// Data of the `PB_CONNECT` frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRealtimeConnect {
  pub client_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRealtimeSubscribe<'a> {
  pub client_id: &'a str,
  pub subscriptions: Vec<String>,
}

/// Data of a collection change frame.
#[derive(Debug, Deserialize)]
pub struct ApiRealtimeMessage {
  pub action: crate::store::ChangeAction,
  pub record: serde_json::Value,
}
