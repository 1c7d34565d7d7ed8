//! Client-side bookkeeping (§3/§4.6 of the expanded spec) tying the `protocol`
//! crate's X3DH handshake and header-encrypted Double Ratchet to the relay
//! contracts in §6: identity and prekey state, the per-peer session directory,
//! the relay's HTTP surface, and the live-bridge WebSocket transport.

pub mod errors;
pub mod live_session;
pub mod relay_client;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use common::{decode_fetched_bundle, decode_initial_message, FetchedPreKeyBundleWire, InitialMessageWire, PreKeyBundleWire};
use config::ClientConfig;
use protocol::directory::SessionDirectory;
use protocol::identity::{publish_bundle, IdentityKeyPair, OneTimePrekeySet, SignedPrekeyState};
use protocol::primitives::PublicKey;
use protocol::x3dh;
use uuid::Uuid;

pub use errors::ClientError;
pub use live_session::LiveSession;
pub use relay_client::RelayClient;

/// One client's full local state: its long-term identity, its own prekey
/// bookkeeping, the relay it talks to, and every ratchet session it currently
/// owns (§5: single-writer per session, independent across sessions).
pub struct Client {
    identity: IdentityKeyPair,
    signed_prekey: SignedPrekeyState,
    one_time_prekeys: OneTimePrekeySet,
    directory: SessionDirectory,
    relay: RelayClient,
}

impl Client {
    /// Generates a fresh identity keypair and connects to the relay named by
    /// `config`. The identity is created once per client and destroyed only with
    /// it (§3) -- there is no persistence layer in scope (§1 Non-goals).
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            identity: IdentityKeyPair::generate(),
            signed_prekey: SignedPrekeyState::new(),
            one_time_prekeys: OneTimePrekeySet::new(),
            directory: SessionDirectory::new(),
            relay: RelayClient::new(config.relay_url.clone()),
        }
    }

    pub fn identity_public(&self) -> PublicKey {
        self.identity.public()
    }

    /// The relay path segment identifying this client: its identity public key,
    /// URL-safe base64 so it is itself a valid single path segment (distinct from
    /// the standard base64 `common::wire` uses for payload fields).
    pub fn identity_path(&self) -> String {
        encode_identity_path(&self.identity_public())
    }

    /// Publish-bundle (§4.5): rotates the signed prekey, mints ten fresh one-time
    /// prekeys, and publishes the result to the relay.
    pub async fn publish_bundle(&mut self) -> Result<(), ClientError> {
        let bundle = publish_bundle(&self.identity, &mut self.signed_prekey, &mut self.one_time_prekeys);
        let wire = PreKeyBundleWire::from(&bundle);
        self.relay.publish_bundle(&self.identity_path(), &wire).await
    }

    /// Initiator side of the handshake (§4.5): fetches `peer`'s bundle, runs
    /// X3DH, submits the initial message to the relay, and registers the new
    /// ratchet session under the session id the relay mints. Returns that id.
    pub async fn send_initial_message(
        &mut self,
        peer: PublicKey,
        info: &[u8],
        plaintext: &[u8],
    ) -> Result<Uuid, ClientError> {
        let peer_path = encode_identity_path(&peer);
        let bundle_wire: FetchedPreKeyBundleWire = self.relay.fetch_bundle(&peer_path).await?;
        let bundle = decode_fetched_bundle(&bundle_wire)?;

        let (initial_message, ratchet) = x3dh::send_initial_message(&self.identity, peer, &bundle, info, plaintext)?;
        let wire = InitialMessageWire::from(&initial_message);
        let session_id = self.relay.post_message(&peer_path, &wire).await?;

        self.directory.insert(session_id, ratchet);
        Ok(session_id)
    }

    /// Responder side of the handshake (§4.5): fetches the initial message the
    /// relay is holding for `session_id`, selects the matching signed prekey and
    /// consumes the matching one-time prekey, seeds a new ratchet, and returns
    /// the decrypted plaintext.
    pub async fn receive_initial_message(&mut self, session_id: Uuid, info: &[u8]) -> Result<Vec<u8>, ClientError> {
        let wire = self.relay.get_message(session_id).await?;
        let message = decode_initial_message(&wire)?;

        let (plaintext, ratchet) = x3dh::receive_initial_message(
            &self.identity,
            &self.signed_prekey,
            &mut self.one_time_prekeys,
            &message,
            info,
        )?;

        self.directory.insert(session_id, ratchet);
        Ok(plaintext)
    }

    /// Encrypts `plaintext` under the ratchet owning `session_id` (§4.4).
    pub fn encrypt(&mut self, session_id: Uuid, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ClientError> {
        let ratchet = self.directory.get_mut(&session_id).ok_or(ClientError::UnknownSession(session_id))?;
        Ok(ratchet.encrypt(plaintext)?)
    }

    /// Decrypts a `(header, payload)` frame under the ratchet owning `session_id`.
    pub fn decrypt(&mut self, session_id: Uuid, header: &[u8], payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        let ratchet = self.directory.get_mut(&session_id).ok_or(ClientError::UnknownSession(session_id))?;
        Ok(ratchet.decrypt(header, payload)?)
    }

    /// Joins the relay's live bridge for `session_id` (§6): blocks until the
    /// relay has paired this connection with its counterpart.
    pub async fn open_live_session(&self, session_id: Uuid) -> Result<LiveSession, ClientError> {
        LiveSession::connect(&self.relay.websocket_base_url(), session_id).await
    }

    pub fn session_count(&self) -> usize {
        self.directory.len()
    }
}

fn encode_identity_path(public: &PublicKey) -> String {
    URL_SAFE_NO_PAD.encode(public.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_path_is_stable_for_the_same_key() {
        let identity = IdentityKeyPair::generate();
        assert_eq!(encode_identity_path(&identity.public()), encode_identity_path(&identity.public()));
    }

    #[test]
    fn identity_path_differs_across_keys() {
        let a = IdentityKeyPair::generate();
        let b = IdentityKeyPair::generate();
        assert_ne!(encode_identity_path(&a.public()), encode_identity_path(&b.public()));
    }
}
