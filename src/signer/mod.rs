//! Signed Result Transport (C3).
//!
//! Wraps a tool result payload in an envelope carrying an HMAC-SHA256
//! signature over `(result_id, payload, iat, exp)`, so a caller holding only
//! the envelope can verify the result came from this server and has not
//! expired, without a round trip back to persistence.
//!
//! Grounded on the teacher's HMAC primitives already present in its
//! dependency stack (`sha2`, `hex`) — the envelope/verify protocol itself is
//! new, there being no prior signing code in the teacher to adapt.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signature lifetime in seconds (§4.3).
pub const TTL_SECONDS: i64 = 600;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signature expired")]
    Expired,
    #[error("invalid signature")]
    Invalid,
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl SignerError {
    /// Stable error `code` per §7.
    pub fn code(&self) -> &'static str {
        match self {
            SignerError::Expired => "EXPIRED_SIGNATURE",
            SignerError::Invalid => "INVALID_SIGNATURE",
            SignerError::Malformed(_) => "SIGNATURE_ERROR",
        }
    }
}

/// The payload a signed envelope attests to: a tool call result bound to a
/// specific `result_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedPayload {
    pub result_id: String,
    pub payload: serde_json::Value,
    pub iat: i64,
    pub exp: i64,
}

/// The wire envelope: the payload plus its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub result_id: String,
    pub payload: serde_json::Value,
    pub sig: String,
}

/// HMAC-SHA256 signer/verifier over `SignedPayload`.
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into().into_bytes(),
        }
    }

    fn mac_over(&self, result_id: &str, payload: &serde_json::Value, iat: i64, exp: i64) -> Result<String, SignerError> {
        let canonical = SignedPayload {
            result_id: result_id.to_string(),
            payload: payload.clone(),
            iat,
            exp,
        };
        let bytes = serde_json::to_vec(&canonical)
            .map_err(|e| SignerError::Malformed(e.to_string()))?;
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| SignerError::Malformed(e.to_string()))?;
        mac.update(&bytes);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Sign `payload` under a fresh `result_id`, stamping `iat` = `now` and
    /// `exp` = `now + TTL_SECONDS`.
    pub fn sign(&self, payload: serde_json::Value, now: i64) -> Result<SignedEnvelope, SignerError> {
        let result_id = uuid::Uuid::new_v4().to_string();
        let iat = now;
        let exp = now + TTL_SECONDS;
        let sig = self.mac_over(&result_id, &payload, iat, exp)?;

        Ok(SignedEnvelope {
            result_id,
            payload: serde_json::json!({ "iat": iat, "exp": exp, "body": payload }),
            sig,
        })
    }

    /// Verify `envelope`, returning the original tool-result body on success.
    pub fn verify(&self, envelope: &SignedEnvelope, now: i64) -> Result<serde_json::Value, SignerError> {
        let iat = envelope
            .payload
            .get("iat")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SignerError::Malformed("missing iat".to_string()))?;
        let exp = envelope
            .payload
            .get("exp")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SignerError::Malformed("missing exp".to_string()))?;
        let body = envelope
            .payload
            .get("body")
            .cloned()
            .ok_or_else(|| SignerError::Malformed("missing payload body".to_string()))?;

        let expected = self.mac_over(&envelope.result_id, &body, iat, exp)?;
        if expected != envelope.sig {
            return Err(SignerError::Invalid);
        }
        if now > exp {
            return Err(SignerError::Expired);
        }

        Ok(body)
    }
}
