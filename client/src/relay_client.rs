//! Thin HTTP wrapper over §6's bundle-store and message-queue contracts. The
//! relay is an external collaborator (spec.md §1): this module only shapes the
//! requests/responses, it never touches `protocol` types directly -- callers
//! hand it `common`'s wire twins and get wire twins back.

use common::{FetchedPreKeyBundleWire, InitialMessageWire, PreKeyBundleWire};
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::ClientError;

/// One relay, addressed by its base HTTP URL (e.g. `http://127.0.0.1:3030`).
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    session_id: Uuid,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// The same relay, addressed as a `ws://`/`wss://` base for the live bridge.
    pub fn websocket_base_url(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        }
    }

    /// `PUT /bundles/:identity` (§6).
    pub async fn publish_bundle(&self, identity_path: &str, bundle: &PreKeyBundleWire) -> Result<(), ClientError> {
        let response = self
            .http
            .put(format!("{}/bundles/{identity_path}", self.base_url))
            .json(bundle)
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED).await.map(|_| ())
    }

    /// `GET /bundles/:identity` (§6). The relay pops one one-time prekey per call.
    pub async fn fetch_bundle(&self, identity_path: &str) -> Result<FetchedPreKeyBundleWire, ClientError> {
        let response = self.http.get(format!("{}/bundles/{identity_path}", self.base_url)).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `POST /messages/:identity` (§6): submits the handshake's initial message,
    /// returns the relay-minted session id.
    pub async fn post_message(&self, identity_path: &str, message: &InitialMessageWire) -> Result<Uuid, ClientError> {
        let response = self
            .http
            .post(format!("{}/messages/{identity_path}", self.base_url))
            .json(message)
            .send()
            .await?;
        let body = expect_status(response, StatusCode::CREATED).await?;
        let parsed: PostMessageResponse = serde_json::from_str(&body)?;
        Ok(parsed.session_id)
    }

    /// `GET /messages/:session_id` (§6): removed from the queue on success.
    pub async fn get_message(&self, session_id: Uuid) -> Result<InitialMessageWire, ClientError> {
        let response = self.http.get(format!("{}/messages/{session_id}", self.base_url)).send().await?;
        let body = expect_status(response, StatusCode::OK).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

async fn expect_status(response: reqwest::Response, expected: StatusCode) -> Result<String, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if status != expected {
        return Err(ClientError::Relay { status, body });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_base_url_rewrites_http_scheme() {
        let relay = RelayClient::new("http://127.0.0.1:3030");
        assert_eq!(relay.websocket_base_url(), "ws://127.0.0.1:3030");
    }

    #[test]
    fn websocket_base_url_rewrites_https_scheme() {
        let relay = RelayClient::new("https://relay.example.com");
        assert_eq!(relay.websocket_base_url(), "wss://relay.example.com");
    }
}
