//! Per-client identity and prekey bookkeeping (spec.md §3): the long-term identity
//! keypair, signed-prekey rotation with a retained previous key, the one-time
//! prekey set consumed during X3DH handshakes, and the two prekey-bundle shapes
//! that cross the relay boundary.

use std::collections::HashMap;

use crate::constants::ONE_TIME_PREKEY_BATCH;
use crate::primitives::{self, derive_verifying_key, sign, KeyPair, PrivateKey, PublicKey, Signature, VerifyingKey};

/// Long-term Curve25519 identity keypair. Created once per client, destroyed only
/// with the client; the public half doubles as the peer identifier.
pub struct IdentityKeyPair {
    pub keypair: KeyPair,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self {
            keypair: KeyPair::generate(),
        }
    }

    pub fn public(&self) -> PublicKey {
        self.keypair.public
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        derive_verifying_key(&self.keypair.private)
    }

    /// XEdDSA-style signature over `message` using this identity's private scalar
    /// directly (§4.1).
    pub fn sign(&self, message: &[u8]) -> Signature {
        sign(&self.keypair.private, message, primitives::random_bytes::<64>())
    }
}

/// The current signed prekey plus the immediately previous one, retained so an
/// in-flight handshake addressed to the older key still succeeds (§3). Any older
/// signed prekey is discarded on the next rotation.
#[derive(Default)]
pub struct SignedPrekeyState {
    current: Option<(KeyPair, Signature)>,
    previous: Option<(KeyPair, Signature)>,
}

impl SignedPrekeyState {
    pub fn new() -> Self {
        Self {
            current: None,
            previous: None,
        }
    }

    /// Rotates in a fresh signed prekey signed by `identity`. If one already
    /// existed it becomes `previous`, displacing any older retained key; otherwise
    /// this is the client's first-ever signed prekey. Returns the new keypair and
    /// its signature so the caller can build a bundle to publish.
    pub fn rotate(&mut self, identity: &IdentityKeyPair) -> (KeyPair, Signature) {
        let new_current = KeyPair::generate();
        let new_signature = identity.sign(&new_current.public.0);
        if let Some(outgoing) = self.current.take() {
            self.previous = Some(outgoing);
        }
        self.current = Some((new_current.clone(), new_signature));
        (new_current, new_signature)
    }

    pub fn current_public(&self) -> Option<PublicKey> {
        self.current.as_ref().map(|(kp, _)| kp.public)
    }

    /// Locates the private signed prekey matching `public`: first the current one,
    /// then the retained previous one (§4.5 step 2 of receive-initial-message).
    pub fn find_private(&self, public: &PublicKey) -> Option<&PrivateKey> {
        if let Some((kp, _)) = &self.current {
            if kp.public == *public {
                return Some(&kp.private);
            }
        }
        if let Some((kp, _)) = &self.previous {
            if kp.public == *public {
                return Some(&kp.private);
            }
        }
        None
    }
}

/// Set of unused one-time prekeys, keyed by public-key bytes so single-use removal
/// is the commit point (§9).
#[derive(Default)]
pub struct OneTimePrekeySet {
    keys: HashMap<PublicKey, PrivateKey>,
}

impl OneTimePrekeySet {
    pub fn new() -> Self {
        Self { keys: HashMap::new() }
    }

    /// Generates a fresh batch of `ONE_TIME_PREKEY_BATCH` (10) one-time prekeys and
    /// appends them to the set, returning their public halves for publication.
    pub fn generate_batch(&mut self) -> Vec<PublicKey> {
        let mut publics = Vec::with_capacity(ONE_TIME_PREKEY_BATCH);
        for _ in 0..ONE_TIME_PREKEY_BATCH {
            let kp = KeyPair::generate();
            self.keys.insert(kp.public, kp.private);
            publics.push(kp.public);
        }
        publics
    }

    /// Single-use consumption by public key, at the responder (§9): removal is the
    /// commit point.
    pub fn take(&mut self, public: &PublicKey) -> Option<PrivateKey> {
        self.keys.remove(public)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Published prekey bundle (§3): `{identity_pub, signed_prekey_pub,
/// signed_prekey_sig, one_time_prekeys_pub[]}`. Republishing an identical
/// `signed_prekey_sig` is rejected by the relay, not here -- this is only the
/// payload shape.
#[derive(Clone, Debug)]
pub struct PublishedPreKeyBundle {
    pub identity_pub: PublicKey,
    /// The Ed25519 verifying key derived from this identity's Curve25519 scalar
    /// (§4.1) -- distinct from `identity_pub`, which is the X25519 Montgomery
    /// point used for DH and cannot verify an XEdDSA-style signature itself.
    pub identity_verifying_key: VerifyingKey,
    pub signed_prekey_pub: PublicKey,
    pub signed_prekey_sig: Signature,
    pub one_time_prekeys_pub: Vec<PublicKey>,
}

/// Prekey bundle as fetched by the initiator (§3): the relay pops one one-time
/// prekey per fetch.
#[derive(Clone, Copy, Debug)]
pub struct FetchedPreKeyBundle {
    pub identity_verifying_key: VerifyingKey,
    pub signed_prekey_pub: PublicKey,
    pub signed_prekey_sig: Signature,
    pub one_time_prekey_pub: PublicKey,
}

/// Publish-bundle (§4.5): rotates the signed prekey, generates ten fresh one-time
/// prekeys, and returns the bundle to publish to the relay.
pub fn publish_bundle(
    identity: &IdentityKeyPair,
    signed_prekey: &mut SignedPrekeyState,
    one_time_prekeys: &mut OneTimePrekeySet,
) -> PublishedPreKeyBundle {
    let (current, signature) = signed_prekey.rotate(identity);
    let one_time_prekeys_pub = one_time_prekeys.generate_batch();
    PublishedPreKeyBundle {
        identity_pub: identity.public(),
        identity_verifying_key: identity.verifying_key(),
        signed_prekey_pub: current.public,
        signed_prekey_sig: signature,
        one_time_prekeys_pub,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_retains_previous_and_discards_older() {
        let identity = IdentityKeyPair::generate();
        let mut state = SignedPrekeyState::new();

        let (first, _) = state.rotate(&identity);
        let (second, _) = state.rotate(&identity);
        let (third, _) = state.rotate(&identity);

        assert!(state.find_private(&second.public).is_some());
        assert!(state.find_private(&third.public).is_some());
        assert!(state.find_private(&first.public).is_none());
    }

    #[test]
    fn one_time_prekey_is_single_use() {
        let mut set = OneTimePrekeySet::new();
        let publics = set.generate_batch();
        assert_eq!(set.len(), ONE_TIME_PREKEY_BATCH);

        let first = publics[0];
        assert!(set.take(&first).is_some());
        assert!(set.take(&first).is_none());
        assert_eq!(set.len(), ONE_TIME_PREKEY_BATCH - 1);
    }

    #[test]
    fn publish_bundle_signature_verifies_against_identity() {
        let identity = IdentityKeyPair::generate();
        let mut signed_prekey = SignedPrekeyState::new();
        let mut otpks = OneTimePrekeySet::new();

        let bundle = publish_bundle(&identity, &mut signed_prekey, &mut otpks);
        assert_eq!(bundle.one_time_prekeys_pub.len(), ONE_TIME_PREKEY_BATCH);
        assert!(crate::primitives::verify(
            &identity.verifying_key(),
            &bundle.signed_prekey_pub.0,
            &bundle.signed_prekey_sig
        ));
    }
}
