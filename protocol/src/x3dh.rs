//! The Extended Triple Diffie-Hellman handshake (§4.5). Publish-bundle lives in
//! `identity.rs`; this module covers the two operations that seed a new ratchet
//! session: the initiator's send-initial-message and the responder's
//! receive-initial-message.

use crate::errors::X3dhError;
use crate::identity::{FetchedPreKeyBundle, IdentityKeyPair, OneTimePrekeySet, SignedPrekeyState};
use crate::primitives::{hkdf, verify, x25519, KeyPair, PublicKey};
use crate::ratchet::Ratchet;

/// The handshake's initial message (§6: core-level shape, base64/JSON wire framing
/// is `common`'s concern). Submitted to the relay by the initiator, fetched and
/// consumed exactly once by the responder.
#[derive(Clone, Debug)]
pub struct InitialMessage {
    pub initiator_identity_pub: PublicKey,
    pub responder_identity_pub: PublicKey,
    pub responder_signed_prekey_pub: PublicKey,
    pub ephemeral_pub: PublicKey,
    pub one_time_prekey_pub: PublicKey,
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Initiator side of §4.5. Assumes `bundle` has already been fetched from the relay
/// (relay I/O is an external collaborator, §1): verifies its signature, runs the
/// four DHs, seeds a new initiator ratchet re-using `my_identity` as the first
/// ratchet keypair, and encrypts `plaintext` as the session's first message.
pub fn send_initial_message(
    my_identity: &IdentityKeyPair,
    their_identity_pub: PublicKey,
    bundle: &FetchedPreKeyBundle,
    info: &[u8],
    plaintext: &[u8],
) -> Result<(InitialMessage, Ratchet), X3dhError> {
    if !verify(&bundle.identity_verifying_key, &bundle.signed_prekey_pub.0, &bundle.signed_prekey_sig) {
        return Err(X3dhError::InvalidBundleSignature);
    }

    let ephemeral = KeyPair::generate();

    let dh1 = x25519(&my_identity.keypair.private, &bundle.signed_prekey_pub);
    let dh2 = x25519(&ephemeral.private, &their_identity_pub);
    let dh3 = x25519(&ephemeral.private, &bundle.signed_prekey_pub);
    let dh4 = x25519(&ephemeral.private, &bundle.one_time_prekey_pub);

    let sk = derive_seed_keys(&dh1, &dh2, &dh3, &dh4, info)?;
    let ad = associated_data(my_identity.public(), their_identity_pub);

    let mut ratchet = Ratchet::init_initiator(
        ad,
        info.to_vec(),
        Some(my_identity.keypair.clone()),
        bundle.signed_prekey_pub,
        sk,
    )?;

    let (header, payload) = ratchet.encrypt(plaintext)?;

    Ok((
        InitialMessage {
            initiator_identity_pub: my_identity.public(),
            responder_identity_pub: their_identity_pub,
            responder_signed_prekey_pub: bundle.signed_prekey_pub,
            ephemeral_pub: ephemeral.public,
            one_time_prekey_pub: bundle.one_time_prekey_pub,
            header,
            payload,
        },
        ratchet,
    ))
}

/// Responder side of §4.5. Locates the signed prekey `msg` was addressed to
/// (current or retained previous), removes the one-time prekey it consumed
/// (single-use, §9), mirrors the four DHs, seeds a new responder ratchet re-using
/// that signed prekey as the first ratchet keypair (the initiator's first header
/// names the signed prekey's public half as `DHr`, so the responder must ratchet
/// from the matching private half to land on the same sending chain), and
/// decrypts the embedded first message.
pub fn receive_initial_message(
    my_identity: &IdentityKeyPair,
    signed_prekey_state: &SignedPrekeyState,
    one_time_prekeys: &mut OneTimePrekeySet,
    msg: &InitialMessage,
    info: &[u8],
) -> Result<(Vec<u8>, Ratchet), X3dhError> {
    let spk_private = signed_prekey_state
        .find_private(&msg.responder_signed_prekey_pub)
        .ok_or_else(|| {
            tracing::warn!("initial message addressed to an unknown signed prekey");
            X3dhError::UnknownSignedPrekey
        })?
        .clone();

    let otpk_private = one_time_prekeys.take(&msg.one_time_prekey_pub).ok_or_else(|| {
        tracing::warn!("initial message consumed an unknown one-time prekey");
        X3dhError::UnknownOneTimePrekey
    })?;

    let dh1 = x25519(&spk_private, &msg.initiator_identity_pub);
    let dh2 = x25519(&my_identity.keypair.private, &msg.ephemeral_pub);
    let dh3 = x25519(&spk_private, &msg.ephemeral_pub);
    let dh4 = x25519(&otpk_private, &msg.ephemeral_pub);

    let sk = derive_seed_keys(&dh1, &dh2, &dh3, &dh4, info)?;
    let ad = associated_data(msg.initiator_identity_pub, my_identity.public());

    let responder_ratchet_keypair = KeyPair {
        private: spk_private,
        public: msg.responder_signed_prekey_pub,
    };
    let mut ratchet = Ratchet::init_responder(ad, info.to_vec(), Some(responder_ratchet_keypair), sk);
    let plaintext = ratchet.decrypt(&msg.header, &msg.payload)?;

    Ok((plaintext, ratchet))
}

/// `AD = initiator_identity_pub ‖ responder_identity_pub` (§3).
fn associated_data(initiator_identity_pub: PublicKey, responder_identity_pub: PublicKey) -> Vec<u8> {
    let mut ad = Vec::with_capacity(64);
    ad.extend_from_slice(&initiator_identity_pub.0);
    ad.extend_from_slice(&responder_identity_pub.0);
    ad
}

/// `IKM = 0xFF×32 ‖ DH1 ‖ DH2 ‖ DH3 ‖ DH4`; `OKM = hkdf(IKM, info, 96)`; split into
/// three 32-byte seed keys in order (§4.5).
fn derive_seed_keys(
    dh1: &[u8; 32],
    dh2: &[u8; 32],
    dh3: &[u8; 32],
    dh4: &[u8; 32],
    info: &[u8],
) -> Result<([u8; 32], [u8; 32], [u8; 32]), X3dhError> {
    let mut ikm = vec![0xFFu8; 32];
    ikm.extend_from_slice(dh1);
    ikm.extend_from_slice(dh2);
    ikm.extend_from_slice(dh3);
    ikm.extend_from_slice(dh4);

    let okm = hkdf(&ikm, info, 96, None)?;
    let mut sk0 = [0u8; 32];
    let mut sk1 = [0u8; 32];
    let mut sk2 = [0u8; 32];
    sk0.copy_from_slice(&okm[0..32]);
    sk1.copy_from_slice(&okm[32..64]);
    sk2.copy_from_slice(&okm[64..96]);
    Ok((sk0, sk1, sk2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{publish_bundle, OneTimePrekeySet, SignedPrekeyState};

    fn fetch_bundle_for(
        identity: &IdentityKeyPair,
        signed_prekey: &mut SignedPrekeyState,
        otpks: &mut OneTimePrekeySet,
    ) -> FetchedPreKeyBundle {
        let published = publish_bundle(identity, signed_prekey, otpks);
        FetchedPreKeyBundle {
            identity_verifying_key: published.identity_verifying_key,
            signed_prekey_pub: published.signed_prekey_pub,
            signed_prekey_sig: published.signed_prekey_sig,
            one_time_prekey_pub: published.one_time_prekeys_pub[0],
        }
    }

    #[test]
    fn handshake_round_trips_hello() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let mut bob_spk = SignedPrekeyState::new();
        let mut bob_otpks = OneTimePrekeySet::new();

        let bundle = fetch_bundle_for(&bob, &mut bob_spk, &mut bob_otpks);
        let (initial_message, _alice_ratchet) =
            send_initial_message(&alice, bob.public(), &bundle, b"demo", b"hello").unwrap();

        let (plaintext, _bob_ratchet) =
            receive_initial_message(&bob, &bob_spk, &mut bob_otpks, &initial_message, b"demo").unwrap();

        assert_eq!(plaintext, b"hello");
        assert_eq!(bob_otpks.len(), 9);
    }

    #[test]
    fn flipped_signature_byte_is_rejected() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let mut bob_spk = SignedPrekeyState::new();
        let mut bob_otpks = OneTimePrekeySet::new();

        let mut bundle = fetch_bundle_for(&bob, &mut bob_spk, &mut bob_otpks);
        bundle.signed_prekey_sig.0[0] ^= 0xFF;

        let err = send_initial_message(&alice, bob.public(), &bundle, b"demo", b"hello").unwrap_err();
        assert!(matches!(err, X3dhError::InvalidBundleSignature));
    }

    #[test]
    fn one_time_prekey_reuse_is_rejected() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let mut bob_spk = SignedPrekeyState::new();
        let mut bob_otpks = OneTimePrekeySet::new();
        let bundle = fetch_bundle_for(&bob, &mut bob_spk, &mut bob_otpks);

        let (initial_message, _) = send_initial_message(&alice, bob.public(), &bundle, b"demo", b"hello").unwrap();
        receive_initial_message(&bob, &bob_spk, &mut bob_otpks, &initial_message, b"demo").unwrap();

        let err = receive_initial_message(&bob, &bob_spk, &mut bob_otpks, &initial_message, b"demo").unwrap_err();
        assert!(matches!(err, X3dhError::UnknownOneTimePrekey));
    }

    #[test]
    fn signed_prekey_rotation_still_accepts_in_flight_message_once() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let mut bob_spk = SignedPrekeyState::new();
        let mut bob_otpks = OneTimePrekeySet::new();
        let bundle = fetch_bundle_for(&bob, &mut bob_spk, &mut bob_otpks);

        let (initial_message, _) = send_initial_message(&alice, bob.public(), &bundle, b"demo", b"hi").unwrap();

        // One rotation: the in-flight message still addresses the now-previous key.
        bob_spk.rotate(&bob);
        assert!(receive_initial_message(&bob, &bob_spk, &mut bob_otpks, &initial_message, b"demo").is_ok());
    }

    #[test]
    fn two_rotations_fail_with_unknown_signed_prekey() {
        let alice = IdentityKeyPair::generate();
        let bob = IdentityKeyPair::generate();
        let mut bob_spk = SignedPrekeyState::new();
        let mut bob_otpks = OneTimePrekeySet::new();
        let bundle = fetch_bundle_for(&bob, &mut bob_spk, &mut bob_otpks);

        let (initial_message, _) = send_initial_message(&alice, bob.public(), &bundle, b"demo", b"hi").unwrap();

        bob_spk.rotate(&bob);
        bob_spk.rotate(&bob);

        let err = receive_initial_message(&bob, &bob_spk, &mut bob_otpks, &initial_message, b"demo").unwrap_err();
        assert!(matches!(err, X3dhError::UnknownSignedPrekey));
    }
}
