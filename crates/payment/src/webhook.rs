//! Webhook payload parsing and signature verification.

use common::PaymentIntentId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PaymentError, Result};
use crate::intent::PaymentOutcome;

/// The body the gateway POSTs to `/payments/webhook`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub intent_id: PaymentIntentId,
    /// Gateway-side status word; mapped onto [`PaymentOutcome`].
    pub status: String,
}

impl WebhookPayload {
    /// Maps the gateway's status vocabulary to the closed outcome set.
    pub fn outcome(&self) -> Result<PaymentOutcome> {
        match self.status.as_str() {
            "authorized" => Ok(PaymentOutcome::Authorized),
            "captured" | "succeeded" => Ok(PaymentOutcome::Captured),
            "failed" | "declined" => Ok(PaymentOutcome::Failed),
            other => Err(PaymentError::UnrecognizedStatus(other.to_string())),
        }
    }
}

/// Verifies webhook bodies against the gateway's shared secret.
///
/// The signature is the hex SHA-256 digest of `secret.body`; nothing in
/// the body is trusted before this check passes.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    /// Creates a verifier for the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes the signature for a raw body. Used by the in-memory
    /// gateway and tests to produce deliverable webhooks.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(body);
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Checks a signature against a raw body.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<()> {
        if self.sign(body) == signature {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature)
        }
    }
}
