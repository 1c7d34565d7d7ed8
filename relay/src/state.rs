//! In-memory relay state (§4.7 of the expanded spec): the bundle store, the
//! message queue, and the live bridge. Every field here already holds wire bytes
//! -- the relay is deliberately blind to plaintext and long-term secret material.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{BridgeFrameWire, FetchedPreKeyBundleWire, InitialMessageWire, PreKeyBundleWire};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::errors::RelayError;

#[derive(Clone)]
pub struct AppState {
    pub bundles: Arc<Mutex<BundleStore>>,
    pub messages: Arc<Mutex<MessageQueue>>,
    pub bridge: Arc<Mutex<LiveBridge>>,
    pub message_ttl: Duration,
    pub bridge_ttl: Duration,
}

impl AppState {
    pub fn new(message_ttl: Duration, bridge_ttl: Duration) -> Self {
        Self {
            bundles: Arc::new(Mutex::new(BundleStore::default())),
            messages: Arc::new(Mutex::new(MessageQueue::default())),
            bridge: Arc::new(Mutex::new(LiveBridge::default())),
            message_ttl,
            bridge_ttl,
        }
    }
}

struct PublishedBundle {
    bundle: PreKeyBundleWire,
    unused_one_time_keys: Vec<String>,
}

/// Published prekey bundles, keyed by the identity's base64-encoded public key.
/// One one-time prekey is popped off the batch per fetch (§3, §9).
#[derive(Default)]
pub struct BundleStore {
    bundles: HashMap<String, PublishedBundle>,
}

impl BundleStore {
    /// `PUT /bundles/:identity_b64` (§6): rejects republishing an identical
    /// `signed_prekey_sig`, forcing a genuine rotation rather than a no-op refresh.
    pub fn publish(&mut self, identity_b64: String, bundle: PreKeyBundleWire) -> Result<(), RelayError> {
        if let Some(existing) = self.bundles.get(&identity_b64) {
            if existing.bundle.signed_prekey_sig == bundle.signed_prekey_sig {
                return Err(RelayError::DuplicateSignature);
            }
        }
        let unused_one_time_keys = bundle.one_time_prekeys_pub.clone();
        self.bundles.insert(
            identity_b64,
            PublishedBundle {
                bundle,
                unused_one_time_keys,
            },
        );
        Ok(())
    }

    /// `GET /bundles/:identity_b64` (§6).
    pub fn fetch(&mut self, identity_b64: &str) -> Result<FetchedPreKeyBundleWire, RelayError> {
        let entry = self.bundles.get_mut(identity_b64).ok_or(RelayError::BundleNotFound)?;
        let one_time_prekey_pub = entry
            .unused_one_time_keys
            .pop()
            .ok_or(RelayError::NoOneTimePrekeysRemaining)?;
        Ok(FetchedPreKeyBundleWire {
            identity_verifying_key: entry.bundle.identity_verifying_key.clone(),
            signed_prekey_pub: entry.bundle.signed_prekey_pub.clone(),
            signed_prekey_sig: entry.bundle.signed_prekey_sig.clone(),
            one_time_prekey_pub,
        })
    }
}

struct QueuedMessage {
    message: InitialMessageWire,
    queued_at: Instant,
}

/// Initial messages awaiting first pickup, keyed by the relay-minted session id
/// (§6). Removed on successful read; swept on expiry regardless.
#[derive(Default)]
pub struct MessageQueue {
    messages: HashMap<Uuid, QueuedMessage>,
}

impl MessageQueue {
    /// `POST /messages/:identity_b64` (§6): mints a new session id for the message.
    pub fn enqueue(&mut self, message: InitialMessageWire) -> Uuid {
        let session_id = Uuid::new_v4();
        self.messages.insert(
            session_id,
            QueuedMessage {
                message,
                queued_at: Instant::now(),
            },
        );
        session_id
    }

    /// `GET /messages/:session_id` (§6).
    pub fn take(&mut self, session_id: Uuid, ttl: Duration) -> Result<InitialMessageWire, RelayError> {
        let entry = self.messages.remove(&session_id).ok_or(RelayError::MessageNotFound)?;
        if entry.queued_at.elapsed() > ttl {
            return Err(RelayError::MessageNotFound);
        }
        Ok(entry.message)
    }

    pub fn sweep_expired(&mut self, ttl: Duration) {
        self.messages.retain(|_, entry| entry.queued_at.elapsed() <= ttl);
    }
}

type FrameSender = mpsc::UnboundedSender<BridgeFrameWire>;

/// What a `join` call returns: either we're the first peer on this session id and
/// must wait for the second to show up, or we're the second and are paired
/// immediately with the first's delivery channel.
pub enum JoinOutcome {
    Waiting(oneshot::Receiver<FrameSender>),
    Paired(FrameSender),
}

/// Pairs the two endpoints of `GET /bridge/:session_id` (§6) and lets each forward
/// every frame it receives to the other, verbatim, with no buffering beyond the
/// channel itself.
#[derive(Default)]
pub struct LiveBridge {
    waiting: HashMap<Uuid, (FrameSender, oneshot::Sender<FrameSender>)>,
}

impl LiveBridge {
    /// `my_outgoing` is this peer's own delivery channel: frames the bridge should
    /// push here get forwarded out over this peer's websocket. Returns the channel
    /// this peer should forward its own incoming frames to.
    pub fn join(&mut self, session_id: Uuid, my_outgoing: FrameSender) -> JoinOutcome {
        if let Some((their_outgoing, notify_them)) = self.waiting.remove(&session_id) {
            let _ = notify_them.send(my_outgoing);
            return JoinOutcome::Paired(their_outgoing);
        }
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(session_id, (my_outgoing, tx));
        JoinOutcome::Waiting(rx)
    }

    pub fn cancel(&mut self, session_id: &Uuid) {
        self.waiting.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle(sig: &str) -> PreKeyBundleWire {
        PreKeyBundleWire {
            identity_pub: "identity".to_string(),
            identity_verifying_key: "verifying-key".to_string(),
            signed_prekey_pub: "spk".to_string(),
            signed_prekey_sig: sig.to_string(),
            one_time_prekeys_pub: vec!["otpk1".to_string(), "otpk2".to_string()],
        }
    }

    #[test]
    fn republishing_the_same_signature_is_rejected() {
        let mut store = BundleStore::default();
        store.publish("alice".to_string(), sample_bundle("sig-a")).unwrap();
        let err = store.publish("alice".to_string(), sample_bundle("sig-a")).unwrap_err();
        assert!(matches!(err, RelayError::DuplicateSignature));
    }

    #[test]
    fn rotation_with_a_new_signature_is_accepted() {
        let mut store = BundleStore::default();
        store.publish("alice".to_string(), sample_bundle("sig-a")).unwrap();
        assert!(store.publish("alice".to_string(), sample_bundle("sig-b")).is_ok());
    }

    #[test]
    fn fetch_pops_one_one_time_prekey_per_call() {
        let mut store = BundleStore::default();
        store.publish("alice".to_string(), sample_bundle("sig-a")).unwrap();

        store.fetch("alice").unwrap();
        store.fetch("alice").unwrap();
        let err = store.fetch("alice").unwrap_err();
        assert!(matches!(err, RelayError::NoOneTimePrekeysRemaining));
    }

    #[test]
    fn message_is_removed_after_one_successful_take() {
        let mut queue = MessageQueue::default();
        let message = InitialMessageWire {
            initiator_identity_pub: "a".to_string(),
            responder_identity_pub: "b".to_string(),
            responder_signed_prekey_pub: "c".to_string(),
            ephemeral_pub: "d".to_string(),
            one_time_prekey_pub: "e".to_string(),
            header: "f".to_string(),
            payload: "g".to_string(),
        };
        let session_id = queue.enqueue(message);

        assert!(queue.take(session_id, Duration::from_secs(60)).is_ok());
        let err = queue.take(session_id, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, RelayError::MessageNotFound));
    }
}
