//! Authenticated HTTP client for the maintenance API.
//!
//! Wraps `reqwest` with the backend's `{success, data}` envelope handling and
//! a bounded recovery policy for stale tokens: on a 401 the client asks its
//! [`TokenProvider`] for a refreshed token exactly once and retries the
//! request exactly once. Every other error status surfaces immediately.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::error::Error;

/// HTTP client with bearer-token attachment and single 401 retry.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Create a client for the given API base (e.g. `https://api.example.com`).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("triage/0.1"));

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The token the next request would carry, used as part of the reference
    /// cache key.
    pub async fn current_token(&self) -> Option<String> {
        self.tokens.bearer_token().await
    }

    /// `GET` a JSON payload from `path` (relative to the API base).
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Value, Error> {
        self.request_json(Method::GET, path, query, None).await
    }

    /// `PATCH` a JSON body to `path`.
    pub async fn patch_json(&self, path: &str, body: &Value) -> Result<Value, Error> {
        self.request_json(Method::PATCH, path, &[], Some(body)).await
    }

    /// `POST` a JSON body to `path`.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, Error> {
        self.request_json(Method::POST, path, &[], Some(body)).await
    }

    /// Execute a request, classify the response, and unwrap the envelope
    /// checks. An HTTP 200 with `success: false` is surfaced as an
    /// application-level failure.
    async fn request_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let response = self.execute(method, path, query, body).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        let value: Value = response.json().await?;
        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let message = backend_message(&value)
                .unwrap_or_else(|| "backend reported failure".to_string());
            return Err(Error::Application(message));
        }
        Ok(value)
    }

    /// Send the request once; on a 401 (and only then) refresh the token once
    /// and retry once with the new token.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response, Error> {
        let url = format!("{}{path}", self.base_url);
        let token = self.tokens.bearer_token().await;

        let response = self
            .send_once(method.clone(), &url, query, body, token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path, "Received 401, attempting token refresh");
        let Some(fresh) = self.tokens.refresh().await else {
            warn!(path, "Token refresh yielded no token; surfacing 401");
            return Ok(response);
        };

        self.send_once(method, &url, query, body, Some(&fresh)).await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, Error> {
        let mut request = self.http.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        // Requests without a token go out without the header; the backend
        // decides whether that is acceptable.
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(request.send().await?)
    }
}

/// Build a structured error from a non-2xx response without ever failing
/// during error construction: unparsable bodies degrade to `HTTP <status>`.
async fn error_from_response(status: StatusCode, response: reqwest::Response) -> Error {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .as_ref()
        .and_then(backend_message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    Error::Http {
        status: status.as_u16(),
        message,
    }
}

fn backend_message(value: &Value) -> Option<String> {
    for key in ["message", "error", "details"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Decode the `data` field of an envelope (or the whole value when the
/// backend omits the wrapper).
pub fn decode_data<T: DeserializeOwned>(mut value: Value) -> Result<T, Error> {
    let payload = match value.get_mut("data") {
        Some(data) if !data.is_null() => data.take(),
        _ => value,
    };
    Ok(serde_json::from_value(payload)?)
}

/// Decode a list payload: `{data:{items}}`, bare `{items}`, or a bare array.
pub fn decode_items<T: DeserializeOwned>(mut value: Value) -> Result<Vec<T>, Error> {
    let mut payload = match value.get_mut("data") {
        Some(data) if !data.is_null() => data.take(),
        _ => value,
    };
    let items = match payload.get_mut("items") {
        Some(items) => items.take(),
        None => payload,
    };
    Ok(serde_json::from_value(items)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_items_accepts_all_list_shapes() {
        let wrapped = serde_json::json!({"success": true, "data": {"items": [1, 2]}});
        let bare_items = serde_json::json!({"items": [3]});
        let bare_array = serde_json::json!([4, 5, 6]);

        assert_eq!(decode_items::<i32>(wrapped).unwrap(), vec![1, 2]);
        assert_eq!(decode_items::<i32>(bare_items).unwrap(), vec![3]);
        assert_eq!(decode_items::<i32>(bare_array).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn decode_data_unwraps_envelope() {
        let value = serde_json::json!({"success": true, "data": {"id": "t-1"}});
        let data: Value = decode_data(value).unwrap();
        assert_eq!(data["id"], "t-1");
    }

    #[test]
    fn backend_message_prefers_message_field() {
        let value = serde_json::json!({"message": "boom", "error": "other"});
        assert_eq!(backend_message(&value), Some("boom".to_string()));
        assert_eq!(backend_message(&serde_json::json!({})), None);
    }
}
