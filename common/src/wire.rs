//! JSON wire twins (§3 of the expanded spec) for every structure that crosses the
//! relay boundary: base64-encoded byte fields, `serde`-derived (de)serialization.
//! Encoding a core type into its wire twin is an infallible `From` impl; decoding
//! back is a free function (Rust's orphan rules forbid `TryFrom<&Wire> for
//! protocol::Core` here, since neither type is local to this crate).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use protocol::identity::{FetchedPreKeyBundle, PublishedPreKeyBundle};
use protocol::primitives::{PublicKey, Signature, VerifyingKey};
use protocol::x3dh::InitialMessage;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], CommonError> {
    let bytes = STANDARD.decode(s).map_err(|_| CommonError::Base64)?;
    bytes.try_into().map_err(|_| CommonError::WrongLength)
}

fn decode_bytes(s: &str) -> Result<Vec<u8>, CommonError> {
    STANDARD.decode(s).map_err(|_| CommonError::Base64)
}

/// Wire shape of a published prekey bundle (§6): identity key, signed prekey and
/// its signature, and the batch of one-time prekeys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreKeyBundleWire {
    pub identity_pub: String,
    /// The Ed25519 verifying key derived from the identity's Curve25519 scalar
    /// (§4.1) -- what `signed_prekey_sig` actually verifies against, distinct from
    /// `identity_pub`'s X25519 Montgomery point.
    pub identity_verifying_key: String,
    pub signed_prekey_pub: String,
    pub signed_prekey_sig: String,
    pub one_time_prekeys_pub: Vec<String>,
}

impl From<&PublishedPreKeyBundle> for PreKeyBundleWire {
    fn from(bundle: &PublishedPreKeyBundle) -> Self {
        PreKeyBundleWire {
            identity_pub: encode(&bundle.identity_pub.0),
            identity_verifying_key: encode(&bundle.identity_verifying_key.0),
            signed_prekey_pub: encode(&bundle.signed_prekey_pub.0),
            signed_prekey_sig: encode(&bundle.signed_prekey_sig.0),
            one_time_prekeys_pub: bundle.one_time_prekeys_pub.iter().map(|k| encode(&k.0)).collect(),
        }
    }
}

/// Decodes a [`PreKeyBundleWire`] back into the core [`PublishedPreKeyBundle`].
pub fn decode_published_bundle(wire: &PreKeyBundleWire) -> Result<PublishedPreKeyBundle, CommonError> {
    Ok(PublishedPreKeyBundle {
        identity_pub: PublicKey(decode_fixed(&wire.identity_pub)?),
        identity_verifying_key: VerifyingKey(decode_fixed(&wire.identity_verifying_key)?),
        signed_prekey_pub: PublicKey(decode_fixed(&wire.signed_prekey_pub)?),
        signed_prekey_sig: Signature(decode_fixed(&wire.signed_prekey_sig)?),
        one_time_prekeys_pub: wire
            .one_time_prekeys_pub
            .iter()
            .map(|k| decode_fixed(k).map(PublicKey))
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Wire shape of a fetched prekey bundle (§6): the relay has already popped one
/// one-time prekey out of the published batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchedPreKeyBundleWire {
    pub identity_verifying_key: String,
    pub signed_prekey_pub: String,
    pub signed_prekey_sig: String,
    pub one_time_prekey_pub: String,
}

impl From<&FetchedPreKeyBundle> for FetchedPreKeyBundleWire {
    fn from(bundle: &FetchedPreKeyBundle) -> Self {
        FetchedPreKeyBundleWire {
            identity_verifying_key: encode(&bundle.identity_verifying_key.0),
            signed_prekey_pub: encode(&bundle.signed_prekey_pub.0),
            signed_prekey_sig: encode(&bundle.signed_prekey_sig.0),
            one_time_prekey_pub: encode(&bundle.one_time_prekey_pub.0),
        }
    }
}

/// Decodes a [`FetchedPreKeyBundleWire`] back into the core [`FetchedPreKeyBundle`].
pub fn decode_fetched_bundle(wire: &FetchedPreKeyBundleWire) -> Result<FetchedPreKeyBundle, CommonError> {
    Ok(FetchedPreKeyBundle {
        identity_verifying_key: VerifyingKey(decode_fixed(&wire.identity_verifying_key)?),
        signed_prekey_pub: PublicKey(decode_fixed(&wire.signed_prekey_pub)?),
        signed_prekey_sig: Signature(decode_fixed(&wire.signed_prekey_sig)?),
        one_time_prekey_pub: PublicKey(decode_fixed(&wire.one_time_prekey_pub)?),
    })
}

/// Wire shape of the handshake's initial message (§6): every public key X3DH
/// touches, plus the header-encrypted first Double Ratchet frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitialMessageWire {
    pub initiator_identity_pub: String,
    pub responder_identity_pub: String,
    pub responder_signed_prekey_pub: String,
    pub ephemeral_pub: String,
    pub one_time_prekey_pub: String,
    pub header: String,
    pub payload: String,
}

impl From<&InitialMessage> for InitialMessageWire {
    fn from(msg: &InitialMessage) -> Self {
        InitialMessageWire {
            initiator_identity_pub: encode(&msg.initiator_identity_pub.0),
            responder_identity_pub: encode(&msg.responder_identity_pub.0),
            responder_signed_prekey_pub: encode(&msg.responder_signed_prekey_pub.0),
            ephemeral_pub: encode(&msg.ephemeral_pub.0),
            one_time_prekey_pub: encode(&msg.one_time_prekey_pub.0),
            header: encode(&msg.header),
            payload: encode(&msg.payload),
        }
    }
}

/// Decodes an [`InitialMessageWire`] back into the core [`InitialMessage`].
pub fn decode_initial_message(wire: &InitialMessageWire) -> Result<InitialMessage, CommonError> {
    Ok(InitialMessage {
        initiator_identity_pub: PublicKey(decode_fixed(&wire.initiator_identity_pub)?),
        responder_identity_pub: PublicKey(decode_fixed(&wire.responder_identity_pub)?),
        responder_signed_prekey_pub: PublicKey(decode_fixed(&wire.responder_signed_prekey_pub)?),
        ephemeral_pub: PublicKey(decode_fixed(&wire.ephemeral_pub)?),
        one_time_prekey_pub: PublicKey(decode_fixed(&wire.one_time_prekey_pub)?),
        header: decode_bytes(&wire.header)?,
        payload: decode_bytes(&wire.payload)?,
    })
}

/// A frame on the live bridge (§6): the header-encrypted Double Ratchet header and
/// payload, base64-encoded, with no further framing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeFrameWire {
    pub header: String,
    pub payload: String,
}

impl BridgeFrameWire {
    pub fn encode(header: &[u8], payload: &[u8]) -> Self {
        BridgeFrameWire {
            header: encode(header),
            payload: encode(payload),
        }
    }

    pub fn decode(&self) -> Result<(Vec<u8>, Vec<u8>), CommonError> {
        Ok((decode_bytes(&self.header)?, decode_bytes(&self.payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::identity::{publish_bundle, IdentityKeyPair, OneTimePrekeySet, SignedPrekeyState};

    #[test]
    fn published_bundle_round_trips_through_its_wire_twin() {
        let identity = IdentityKeyPair::generate();
        let mut signed_prekey = SignedPrekeyState::new();
        let mut otpks = OneTimePrekeySet::new();
        let bundle = publish_bundle(&identity, &mut signed_prekey, &mut otpks);

        let wire = PreKeyBundleWire::from(&bundle);
        let decoded = decode_published_bundle(&wire).unwrap();

        assert_eq!(decoded.identity_pub, bundle.identity_pub);
        assert_eq!(decoded.one_time_prekeys_pub.len(), bundle.one_time_prekeys_pub.len());
    }

    #[test]
    fn bridge_frame_round_trips_arbitrary_bytes() {
        let wire = BridgeFrameWire::encode(&[1, 2, 3], &[4, 5, 6, 7]);
        let (header, payload) = wire.decode().unwrap();
        assert_eq!(header, vec![1, 2, 3]);
        assert_eq!(payload, vec![4, 5, 6, 7]);
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let wire = PreKeyBundleWire {
            identity_pub: "not valid base64!!".to_string(),
            identity_verifying_key: String::new(),
            signed_prekey_pub: String::new(),
            signed_prekey_sig: String::new(),
            one_time_prekeys_pub: Vec::new(),
        };
        assert!(matches!(decode_published_bundle(&wire), Err(CommonError::Base64)));
    }
}
