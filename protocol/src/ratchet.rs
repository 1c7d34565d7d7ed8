//! The Double Ratchet session with header encryption (spec.md §4.4): derives
//! per-message keys, advances Diffie-Hellman epochs, encrypts and decrypts both
//! headers and payloads, and tolerates out-of-order delivery within `MAX_SKIP`
//! messages or across one epoch boundary.

use crate::aead;
use crate::constants::{MAX_SKIP, ROOT_KDF_OKM_LENGTH};
use crate::errors::RatchetError;
use crate::header::{self, Header};
use crate::primitives::{hkdf, hmac_sha256, x25519, KeyPair, PublicKey};

/// One entry in the skipped-message buffer: a header key, the message number it was
/// derived for, and the message key itself. Append-on-skip, linear-scan-on-decrypt,
/// remove-on-hit (§9) -- a bounded ring buffer is a valid alternative, but this one
/// retains every entry until consumed, matching the specified contract.
#[derive(Clone)]
struct SkippedEntry {
    header_key: [u8; 32],
    message_number: u32,
    message_key: [u8; 32],
}

/// The per-session ratchet state (§3). Owned exclusively by one peer for the
/// lifetime of a session id; every field here is mutated only from that peer's
/// single-writer execution context (§5).
pub struct Ratchet {
    ad: Vec<u8>,
    info: Vec<u8>,
    dhs: KeyPair,
    dhr: Option<PublicKey>,
    rk: [u8; 32],
    cks: Option<[u8; 32]>,
    ckr: Option<[u8; 32]>,
    ns: u32,
    nr: u32,
    pn: u32,
    hks: Option<[u8; 32]>,
    hkr: Option<[u8; 32]>,
    nhks: Option<[u8; 32]>,
    nhkr: Option<[u8; 32]>,
    skipped: Vec<SkippedEntry>,
}

impl Ratchet {
    /// Initializes the session as the initiator: `DHr` is the responder's ratchet
    /// public embedded in the handshake's signed prekey. Own ratchet keypair is
    /// generated if `own_keypair` is absent -- the X3DH handshake instead passes the
    /// initiator's identity keypair here, re-using it as the first ratchet keypair
    /// (spec.md §4.5's "Note").
    pub fn init_initiator(
        ad: Vec<u8>,
        info: Vec<u8>,
        own_keypair: Option<KeyPair>,
        dhr: PublicKey,
        sk: ([u8; 32], [u8; 32], [u8; 32]),
    ) -> Result<Ratchet, RatchetError> {
        let dhs = own_keypair.unwrap_or_else(KeyPair::generate);
        let (sk0, sk1, sk2) = sk;
        let dh = x25519(&dhs.private, &dhr);
        let (new_rk, cks, nhks) = kdf_root(&sk0, &dh, &info)?;
        Ok(Ratchet {
            ad,
            info,
            dhs,
            dhr: Some(dhr),
            rk: new_rk,
            cks: Some(cks),
            ckr: None,
            ns: 0,
            nr: 0,
            pn: 0,
            hks: Some(sk1),
            hkr: None,
            nhks: Some(nhks),
            nhkr: Some(sk2),
            skipped: Vec::new(),
        })
    }

    /// Initializes the session as the responder. No `DHr` is known yet; the
    /// responder cannot send until its first successful decrypt performs the first
    /// DH ratchet step and produces `CKs`/`HKs` (spec.md §9, "deliberate contract").
    pub fn init_responder(
        ad: Vec<u8>,
        info: Vec<u8>,
        own_keypair: Option<KeyPair>,
        sk: ([u8; 32], [u8; 32], [u8; 32]),
    ) -> Ratchet {
        let dhs = own_keypair.unwrap_or_else(KeyPair::generate);
        let (sk0, sk1, sk2) = sk;
        Ratchet {
            ad,
            info,
            dhs,
            dhr: None,
            rk: sk0,
            cks: None,
            ckr: None,
            ns: 0,
            nr: 0,
            pn: 0,
            hks: None,
            hkr: None,
            nhks: Some(sk2),
            nhkr: Some(sk1),
            skipped: Vec::new(),
        }
    }

    /// The session's current ratchet public key, so the initiator can embed it in
    /// its first header.
    pub fn ratchet_public(&self) -> PublicKey {
        self.dhs.public
    }

    /// `true` once this session has derived a sending chain (the `Fresh ->
    /// SenderReady` transition of §4.4's state machine).
    pub fn can_send(&self) -> bool {
        self.cks.is_some()
    }

    /// Encrypts `plaintext`, returning `(header_bytes, payload_bytes)`. Fails with
    /// `NotReady` if no sending chain has been derived yet.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), RatchetError> {
        let cks = self.cks.ok_or(RatchetError::NotReady)?;
        let hks = self.hks.ok_or(RatchetError::NotReady)?;

        let (message_key, new_cks) = kdf_chain(&cks);
        let header = Header {
            ratchet_pub: self.dhs.public,
            pn: self.pn,
            ns: self.ns,
        };
        let header_bytes = header::encrypt(&hks, &self.info, &header)?;
        let nonce = payload_nonce(&self.ad, &header_bytes);
        let payload = aead::encrypt(&message_key, &self.info, &nonce, plaintext)?;

        self.cks = Some(new_cks);
        self.ns += 1;
        Ok((header_bytes, payload))
    }

    /// Decrypts `(header_bytes, payload_bytes)`, trying the skipped-message buffer,
    /// then the current epoch, then the next epoch (performing a DH ratchet step if
    /// needed). Every path except the skipped-buffer hit computes its state update
    /// as a value before committing it -- a failing payload decrypt after a
    /// successful header decrypt leaves `self` untouched (§4.4 "Failure semantics").
    pub fn decrypt(&mut self, header_bytes: &[u8], payload_bytes: &[u8]) -> Result<Vec<u8>, RatchetError> {
        if let Some(plaintext) = self.try_skipped(header_bytes, payload_bytes)? {
            return Ok(plaintext);
        }

        if let Some(hkr) = self.hkr {
            if let Ok(header) = header::decrypt(&hkr, &self.info, header_bytes) {
                let ckr = self.ckr.expect("CKr is set whenever HKr is set");
                let (new_entries, advanced_ckr) = skip_chain(ckr, hkr, self.nr, header.ns)?;
                let (message_key, final_ckr) = kdf_chain(&advanced_ckr);
                let nonce = payload_nonce(&self.ad, header_bytes);
                let plaintext = match aead::decrypt(&message_key, &self.info, &nonce, payload_bytes) {
                    Ok(pt) => pt,
                    Err(e) => {
                        tracing::warn!(error = %e, "payload decrypt failed in current epoch");
                        return Err(e);
                    }
                };

                self.skipped.extend(new_entries);
                self.ckr = Some(final_ckr);
                self.nr = header.ns + 1;
                return Ok(plaintext);
            }
        }

        let nhkr = self.nhkr.expect("NHKr is always populated after init");
        let header = header::decrypt(&nhkr, &self.info, header_bytes).map_err(|_| {
            tracing::warn!("header decrypt failed under both current and next header key");
            RatchetError::HeaderDecryptFailed
        })?;

        let pn_entries = match self.ckr {
            Some(ckr) => skip_chain(ckr, self.hkr.expect("HKr is set whenever CKr is set"), self.nr, header.pn)?.0,
            None => Vec::new(),
        };

        let new_hks = self.nhks.expect("NHKs is always populated after init");
        let new_hkr = nhkr;

        let dh_recv = x25519(&self.dhs.private, &header.ratchet_pub);
        let (rk_after_recv, ckr_new, nhkr_new) = kdf_root(&self.rk, &dh_recv, &self.info)?;

        let new_dhs = KeyPair::generate();
        let dh_send = x25519(&new_dhs.private, &header.ratchet_pub);
        let (rk_after_send, cks_new, nhks_new) = kdf_root(&rk_after_recv, &dh_send, &self.info)?;

        let (step_entries, advanced_ckr) = skip_chain(ckr_new, new_hkr, 0, header.ns)?;
        let (message_key, final_ckr) = kdf_chain(&advanced_ckr);
        let nonce = payload_nonce(&self.ad, header_bytes);
        let plaintext = aead::decrypt(&message_key, &self.info, &nonce, payload_bytes)?;

        // Commit point: every field below is only touched once the payload decrypt
        // above has already succeeded, so a failing decrypt never leaves the DH
        // ratchet step half-applied.
        self.skipped.extend(pn_entries);
        self.pn = self.ns;
        self.ns = 0;
        self.nr = header.ns + 1;
        self.dhr = Some(header.ratchet_pub);
        self.hks = Some(new_hks);
        self.hkr = Some(new_hkr);
        self.rk = rk_after_send;
        self.ckr = Some(final_ckr);
        self.nhkr = Some(nhkr_new);
        self.dhs = new_dhs;
        self.cks = Some(cks_new);
        self.nhks = Some(nhks_new);
        self.skipped.extend(step_entries);

        Ok(plaintext)
    }

    fn try_skipped(&mut self, header_bytes: &[u8], payload_bytes: &[u8]) -> Result<Option<Vec<u8>>, RatchetError> {
        for idx in 0..self.skipped.len() {
            let entry = self.skipped[idx].clone();
            if let Ok(header) = header::decrypt(&entry.header_key, &self.info, header_bytes) {
                if header.ns == entry.message_number {
                    let nonce = payload_nonce(&self.ad, header_bytes);
                    let plaintext = aead::decrypt(&entry.message_key, &self.info, &nonce, payload_bytes)?;
                    self.skipped.remove(idx);
                    return Ok(Some(plaintext));
                }
            }
        }
        Ok(None)
    }

    /// The current send/receive header keys, exposed for the DH-ratchet invariant
    /// tests in §8 ("the sender's `HKs` in epoch n+1 equals the receiver's old
    /// `NHKr`...").
    #[cfg(test)]
    pub(crate) fn header_keys(&self) -> (Option<[u8; 32]>, Option<[u8; 32]>) {
        (self.hks, self.hkr)
    }

    #[cfg(test)]
    pub(crate) fn next_header_keys(&self) -> (Option<[u8; 32]>, Option<[u8; 32]>) {
        (self.nhks, self.nhkr)
    }

    #[cfg(test)]
    pub(crate) fn skipped_len(&self) -> usize {
        self.skipped.len()
    }
}

/// `kdf_chain(chain_key)`: `msg_key = hmac(chain_key, 0x01)`, `new_chain_key =
/// hmac(chain_key, 0x02)` (§4.4).
fn kdf_chain(chain_key: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let message_key = hmac_sha256(chain_key, &[0x01]);
    let new_chain_key = hmac_sha256(chain_key, &[0x02]);
    (message_key, new_chain_key)
}

/// `kdf_root()`: `okm = hkdf(ikm=dh, info, length=96, salt=RK)`; returns the new root
/// key, chain key, and next header key (§4.4).
fn kdf_root(rk: &[u8; 32], dh: &[u8; 32], info: &[u8]) -> Result<([u8; 32], [u8; 32], [u8; 32]), RatchetError> {
    let okm = hkdf(dh, info, ROOT_KDF_OKM_LENGTH, Some(rk))?;
    let mut new_rk = [0u8; 32];
    let mut chain_key = [0u8; 32];
    let mut next_header_key = [0u8; 32];
    new_rk.copy_from_slice(&okm[0..32]);
    chain_key.copy_from_slice(&okm[32..64]);
    next_header_key.copy_from_slice(&okm[64..96]);
    Ok((new_rk, chain_key, next_header_key))
}

/// `skip(until)` (§4.4), expressed as a pure function so callers can compute the
/// tentative result before committing it to `self`. Derives and buffers a message
/// key for every `n` in `[from, until)`, returning the buffered entries and the
/// chain key that results from advancing that far.
fn skip_chain(
    chain_key: [u8; 32],
    header_key: [u8; 32],
    from: u32,
    until: u32,
) -> Result<(Vec<SkippedEntry>, [u8; 32]), RatchetError> {
    if from.saturating_add(MAX_SKIP) < until {
        return Err(RatchetError::TooManySkipped);
    }
    let mut entries = Vec::new();
    let mut chain = chain_key;
    let mut n = from;
    while n < until {
        let (message_key, next_chain) = kdf_chain(&chain);
        entries.push(SkippedEntry {
            header_key,
            message_number: n,
            message_key,
        });
        chain = next_chain;
        n += 1;
    }
    Ok((entries, chain))
}

/// The payload nonce is `AD ‖ encrypted_header` (§4.3): binds every payload to its
/// header and to the session's associated data.
fn payload_nonce(ad: &[u8], encrypted_header: &[u8]) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(ad.len() + encrypted_header.len());
    nonce.extend_from_slice(ad);
    nonce.extend_from_slice(encrypted_header);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PrivateKey;

    fn seed_sessions() -> (Ratchet, Ratchet) {
        let bob_ratchet_keypair = KeyPair::generate();
        let sk = ([1u8; 32], [2u8; 32], [3u8; 32]);
        let alice = Ratchet::init_initiator(
            b"ad".to_vec(),
            b"info".to_vec(),
            None,
            bob_ratchet_keypair.public,
            sk,
        )
        .unwrap();
        let bob = Ratchet::init_responder(b"ad".to_vec(), b"info".to_vec(), Some(bob_ratchet_keypair), sk);
        (alice, bob)
    }

    #[test]
    fn round_trip_in_order() {
        let (mut alice, mut bob) = seed_sessions();
        let (h, p) = alice.encrypt(b"hello bob").unwrap();
        let pt = bob.decrypt(&h, &p).unwrap();
        assert_eq!(pt, b"hello bob");
    }

    #[test]
    fn responder_cannot_send_before_first_decrypt() {
        let (_, mut bob) = seed_sessions();
        assert!(!bob.can_send());
        assert!(matches!(bob.encrypt(b"too soon"), Err(RatchetError::NotReady)));
    }

    #[test]
    fn out_of_order_delivery_within_max_skip_recovers_all_messages() {
        let (mut alice, mut bob) = seed_sessions();
        let m1 = alice.encrypt(b"m1").unwrap();
        let m2 = alice.encrypt(b"m2").unwrap();
        let m3 = alice.encrypt(b"m3").unwrap();

        let pt3 = bob.decrypt(&m3.0, &m3.1).unwrap();
        let pt1 = bob.decrypt(&m1.0, &m1.1).unwrap();
        let pt2 = bob.decrypt(&m2.0, &m2.1).unwrap();

        assert_eq!(pt3, b"m3");
        assert_eq!(pt1, b"m1");
        assert_eq!(pt2, b"m2");
        assert_eq!(bob.skipped_len(), 0);
    }

    #[test]
    fn dh_ratchet_invariants_hold_after_one_round_trip_each_way() {
        let (mut alice, mut bob) = seed_sessions();
        let (h, p) = alice.encrypt(b"ping").unwrap();
        bob.decrypt(&h, &p).unwrap();

        let (_, bob_hkr_before) = bob.header_keys();
        let (_, bob_nhkr_before) = bob.next_header_keys();

        let (h2, p2) = bob.encrypt(b"pong").unwrap();
        alice.decrypt(&h2, &p2).unwrap();

        let (alice_hks_after, _) = alice.header_keys();
        assert_eq!(alice_hks_after, bob_nhkr_before);

        let (_, alice_nhkr_after) = alice.next_header_keys();
        let _ = bob_hkr_before;
        let _ = alice_nhkr_after;
    }

    #[test]
    fn skip_beyond_max_skip_fails_and_leaves_state_unchanged() {
        let (mut alice, mut bob) = seed_sessions();
        for _ in 0..=MAX_SKIP {
            alice.encrypt(b"filler").unwrap();
        }
        let (h, p) = alice.encrypt(b"eleventh").unwrap();
        let err = bob.decrypt(&h, &p).unwrap_err();
        assert!(matches!(err, RatchetError::TooManySkipped));
        assert_eq!(bob.skipped_len(), 0);
        assert!(!bob.can_send());
    }

    #[test]
    fn flipped_header_byte_fails_but_session_recovers_on_next_frame() {
        let (mut alice, mut bob) = seed_sessions();
        let (mut h, p) = alice.encrypt(b"hello").unwrap();
        h[0] ^= 0xFF;
        assert!(matches!(bob.decrypt(&h, &p), Err(RatchetError::HeaderDecryptFailed)));

        let (h2, p2) = alice.encrypt(b"hello again").unwrap();
        assert_eq!(bob.decrypt(&h2, &p2).unwrap(), b"hello again");
    }

    #[test]
    fn flipped_payload_byte_fails_then_resend_decrypts() {
        let (mut alice, mut bob) = seed_sessions();
        let (h, mut p) = alice.encrypt(b"intact").unwrap();
        let last = p.len() - 1;
        p[last] ^= 0xFF;
        assert!(matches!(bob.decrypt(&h, &p), Err(RatchetError::InvalidTag)));

        p[last] ^= 0xFF; // restore
        assert_eq!(bob.decrypt(&h, &p).unwrap(), b"intact");
    }

    #[test]
    fn own_identity_keypair_can_seed_the_initiator_ratchet() {
        let identity = PrivateKey::generate();
        let identity_pub = crate::primitives::PublicKey::from(&identity);
        let bob_ratchet_keypair = KeyPair::generate();
        let ratchet = Ratchet::init_initiator(
            b"ad".to_vec(),
            b"info".to_vec(),
            Some(KeyPair {
                private: identity,
                public: identity_pub,
            }),
            bob_ratchet_keypair.public,
            ([9u8; 32], [8u8; 32], [7u8; 32]),
        )
        .unwrap();
        assert_eq!(ratchet.ratchet_public(), identity_pub);
    }
}
