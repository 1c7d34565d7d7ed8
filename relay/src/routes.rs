//! HTTP/WebSocket routes implementing §6's three relay contracts over the
//! in-memory state in [`crate::state`].

use std::convert::Infallible;

use common::{BridgeFrameWire, InitialMessageWire, PreKeyBundleWire};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::{Filter, Rejection, Reply};

use crate::errors::RelayError;
use crate::state::{AppState, JoinOutcome};

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let publish_bundle = warp::put()
        .and(warp::path!("bundles" / String))
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(publish_bundle_handler);

    let fetch_bundle = warp::get()
        .and(warp::path!("bundles" / String))
        .and(with_state.clone())
        .and_then(fetch_bundle_handler);

    let post_message = warp::post()
        .and(warp::path!("messages" / String))
        .and(warp::body::json())
        .and(with_state.clone())
        .and_then(post_message_handler);

    let get_message = warp::get()
        .and(warp::path!("messages" / Uuid))
        .and(with_state.clone())
        .and_then(get_message_handler);

    let bridge = warp::path!("bridge" / Uuid)
        .and(warp::ws())
        .and(with_state)
        .map(|session_id: Uuid, ws: warp::ws::Ws, state: AppState| {
            ws.on_upgrade(move |socket| bridge_session(session_id, socket, state))
        });

    publish_bundle
        .or(fetch_bundle)
        .or(post_message)
        .or(get_message)
        .or(bridge)
        .recover(handle_rejection)
}

async fn publish_bundle_handler(
    identity_b64: String,
    bundle: PreKeyBundleWire,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    state
        .bundles
        .lock()
        .await
        .publish(identity_b64, bundle)
        .map(|()| warp::reply::with_status(warp::reply::json(&json!({})), StatusCode::CREATED))
        .map_err(warp::reject::custom)
}

async fn fetch_bundle_handler(identity_b64: String, state: AppState) -> Result<impl Reply, Rejection> {
    state
        .bundles
        .lock()
        .await
        .fetch(&identity_b64)
        .map(|bundle| warp::reply::json(&bundle))
        .map_err(warp::reject::custom)
}

async fn post_message_handler(
    identity_b64: String,
    message: InitialMessageWire,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    // This reference relay routes pickup by session id, not by recipient identity;
    // the path segment exists only to match §6's contract shape.
    let _ = identity_b64;
    let session_id = state.messages.lock().await.enqueue(message);
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "session_id": session_id })),
        StatusCode::CREATED,
    ))
}

async fn get_message_handler(session_id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    state
        .messages
        .lock()
        .await
        .take(session_id, state.message_ttl)
        .map(|message| warp::reply::json(&message))
        .map_err(warp::reject::custom)
}

async fn bridge_session(session_id: Uuid, socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (my_outgoing_tx, mut my_outgoing_rx) = mpsc::unbounded_channel::<BridgeFrameWire>();

    let their_outgoing = {
        let outcome = state.bridge.lock().await.join(session_id, my_outgoing_tx);
        match outcome {
            JoinOutcome::Paired(their_outgoing) => their_outgoing,
            JoinOutcome::Waiting(rx) => match tokio::time::timeout(state.bridge_ttl, rx).await {
                Ok(Ok(their_outgoing)) => their_outgoing,
                _ => {
                    tracing::warn!(%session_id, "live bridge timed out waiting for a second peer");
                    state.bridge.lock().await.cancel(&session_id);
                    return;
                }
            },
        }
    };

    tracing::debug!(%session_id, "live bridge pair established");

    if ws_tx.send(Message::text("OK")).await.is_err() {
        return;
    }

    let forward_in = tokio::spawn(async move {
        while let Some(frame) = my_outgoing_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else { break };
            if ws_tx.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_str() else { continue };
        match serde_json::from_str::<BridgeFrameWire>(text) {
            Ok(frame) => {
                if their_outgoing.send(frame).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(%session_id, error = %e, "dropping malformed bridge frame"),
        }
    }

    forward_in.abort();
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(relay_err) = err.find::<RelayError>() {
        let status = match relay_err {
            RelayError::BundleNotFound | RelayError::MessageNotFound => StatusCode::NOT_FOUND,
            RelayError::DuplicateSignature => StatusCode::BAD_REQUEST,
            RelayError::NoOneTimePrekeysRemaining => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::BridgeTimeout => StatusCode::REQUEST_TIMEOUT,
        };
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": relay_err.to_string() })),
            status,
        ));
    }

    if err.is_not_found() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": "not found" })),
            StatusCode::NOT_FOUND,
        ));
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": "internal error" })),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}
