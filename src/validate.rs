//! Event admission: schema, kind policy and signature checks.

use anyhow::{anyhow, Result};
use secp256k1::{schnorr::Signature, Message, Secp256k1, VerifyOnly, XOnlyPublicKey};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::event::{Event, SchemaError};

/// Why an event was refused.
///
/// The `Display` form of the last two variants starts with the NIP-01
/// machine-readable prefix and is sent verbatim in the `OK` message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed: {0}")]
    Malformed(#[from] SchemaError),
    #[error("blocked: only ephemeral events (kind 20000-29999) are accepted, got kind {0}")]
    Blocked(u64),
    #[error("invalid: bad event id or signature")]
    InvalidSignature,
}

/// Cryptographic check of an event's id and signature.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, ev: &Event) -> bool;
}

/// BIP-340 Schnorr verification over the NIP-01 event digest.
pub struct Schnorr {
    secp: Secp256k1<VerifyOnly>,
}

impl Schnorr {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }

    /// Verify an event's ID and Schnorr signature.
    fn verify_event(&self, ev: &Event) -> Result<()> {
        let hash = ev.digest();
        if hex::encode(hash) != ev.id {
            return Err(anyhow!("id mismatch"));
        }
        let sig = Signature::from_slice(&hex::decode(&ev.sig)?)?;
        let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey)?)?;
        let msg = Message::from_digest_slice(&hash)?;
        self.secp.verify_schnorr(&sig, &msg, &pk)?;
        Ok(())
    }
}

impl Default for Schnorr {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Schnorr {
    fn verify(&self, ev: &Event) -> bool {
        match self.verify_event(ev) {
            Ok(()) => true,
            Err(e) => {
                debug!(id = %ev.id, "signature check failed: {e}");
                false
            }
        }
    }
}

/// Accepts every signature. Only for development setups with `VERIFY_SIG=0`.
pub struct SkipVerify;

impl SignatureVerifier for SkipVerify {
    fn verify(&self, _ev: &Event) -> bool {
        true
    }
}

/// Admission pipeline shared by every session.
pub struct Validator {
    verifier: Box<dyn SignatureVerifier>,
}

impl Validator {
    pub fn new(verifier: impl SignatureVerifier + 'static) -> Self {
        Self {
            verifier: Box::new(verifier),
        }
    }

    /// Validator backed by [`Schnorr`] or, when `verify_sig` is off, [`SkipVerify`].
    pub fn from_flag(verify_sig: bool) -> Self {
        if verify_sig {
            Self::new(Schnorr::new())
        } else {
            Self::new(SkipVerify)
        }
    }

    /// Full check of a raw event object.
    pub fn validate(&self, raw: &Value) -> Result<Event, ValidationError> {
        let ev = Event::from_value(raw)?;
        self.admit(&ev)?;
        Ok(ev)
    }

    /// Policy and signature checks for an event that already passed the schema.
    ///
    /// The kind policy runs first so blocked events never cost a signature
    /// verification.
    pub fn admit(&self, ev: &Event) -> Result<(), ValidationError> {
        if !ev.is_ephemeral() {
            return Err(ValidationError::Blocked(ev.kind));
        }
        if !self.verifier.verify(ev) {
            return Err(ValidationError::InvalidSignature);
        }
        Ok(())
    }
}
