//! The payment coordinator.

use async_trait::async_trait;
use common::{Currency, Money, OrderId, PaymentIntentId};
use domain::PaymentMethod;

use crate::error::{PaymentError, Result};
use crate::gateway::{ChargeRequest, GatewayDecision, PaymentGateway};
use crate::intent::{IntentStatus, PaymentIntent, PaymentOutcome};
use crate::store::PaymentIntentStore;
use crate::webhook::{WebhookPayload, WebhookVerifier};

/// Result of an initiation call.
#[derive(Debug, Clone)]
pub struct InitiateResult {
    pub intent: PaymentIntent,
    /// Set when the gateway settled synchronously (or a replay found an
    /// already-settled intent); the orchestrator funnels it into the same
    /// transition path a webhook would take.
    pub outcome: Option<PaymentOutcome>,
}

/// Payment operations consumed by the saga orchestrator.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Creates (or, on replay, returns) the payment intent for an order.
    async fn initiate(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: Currency,
        method: PaymentMethod,
        idempotency_key: &str,
    ) -> Result<InitiateResult>;

    /// Refunds a settled intent.
    async fn refund(&self, intent_id: PaymentIntentId) -> Result<()>;

    /// Loads an intent by id.
    async fn intent(&self, intent_id: PaymentIntentId) -> Result<Option<PaymentIntent>>;
}

/// Coordinates payment intents against a gateway.
#[derive(Clone)]
pub struct PaymentCoordinator<G, S> {
    gateway: G,
    store: S,
    verifier: WebhookVerifier,
}

impl<G: PaymentGateway, S: PaymentIntentStore> PaymentCoordinator<G, S> {
    /// Creates a coordinator with the gateway's shared webhook secret.
    pub fn new(gateway: G, store: S, webhook_secret: impl Into<String>) -> Self {
        Self {
            gateway,
            store,
            verifier: WebhookVerifier::new(webhook_secret),
        }
    }

    /// Returns the verifier (tests use it to sign deliverable webhooks).
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Validates and decodes a gateway webhook.
    ///
    /// The signature is checked before the body is parsed; unknown intents
    /// are rejected rather than ignored, so replay or spoofing attempts
    /// surface in logs instead of disappearing.
    #[tracing::instrument(skip(self, raw_body, signature))]
    pub async fn reconcile_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<(PaymentIntentId, PaymentOutcome)> {
        self.verifier.verify(raw_body, signature)?;

        let payload: WebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::MalformedPayload(e.to_string()))?;
        let outcome = payload.outcome()?;

        let intent = self
            .store
            .get(payload.intent_id)
            .await?
            .ok_or(PaymentError::UnknownIntent(payload.intent_id))?;

        // First settlement wins; replays and late webhooks must not
        // overwrite a settled (or refunded) intent.
        if intent.status == IntentStatus::Pending {
            self.store
                .set_status(intent.id, IntentStatus::from(outcome))
                .await?;
        }

        metrics::counter!("payment_webhooks_reconciled").increment(1);
        tracing::info!(intent_id = %intent.id, ?outcome, "webhook reconciled");
        Ok((intent.id, outcome))
    }

    async fn submit_to_gateway(&self, intent: &PaymentIntent) -> Result<Option<PaymentOutcome>> {
        let request = ChargeRequest {
            intent_id: intent.id,
            order_id: intent.order_id,
            amount: intent.amount,
            currency: intent.currency,
            method: intent.method,
            idempotency_key: intent.idempotency_key.clone(),
        };

        match self.gateway.create_intent(&request).await? {
            GatewayDecision::Pending => Ok(None),
            GatewayDecision::Immediate(outcome) => {
                self.store
                    .set_status(intent.id, IntentStatus::from(outcome))
                    .await?;
                Ok(Some(outcome))
            }
        }
    }
}

#[async_trait]
impl<G: PaymentGateway, S: PaymentIntentStore> PaymentService for PaymentCoordinator<G, S> {
    #[tracing::instrument(skip(self))]
    async fn initiate(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: Currency,
        method: PaymentMethod,
        idempotency_key: &str,
    ) -> Result<InitiateResult> {
        if let Some(existing) = self.store.get_by_idempotency_key(idempotency_key).await? {
            // Settled intents answer from the record. A still-Pending
            // intent is resubmitted; the gateway deduplicates on the
            // intent id, so this cannot double-charge.
            return match existing.status.as_outcome() {
                Some(outcome) => Ok(InitiateResult {
                    intent: existing,
                    outcome: Some(outcome),
                }),
                None if existing.status == IntentStatus::Refunded => Ok(InitiateResult {
                    intent: existing,
                    outcome: None,
                }),
                None => {
                    let outcome = self.submit_to_gateway(&existing).await?;
                    let intent = self
                        .store
                        .get(existing.id)
                        .await?
                        .ok_or(PaymentError::UnknownIntent(existing.id))?;
                    Ok(InitiateResult { intent, outcome })
                }
            };
        }

        let intent = PaymentIntent::new(order_id, amount, currency, method, idempotency_key);
        self.store.insert(&intent).await?;
        metrics::counter!("payment_intents_created").increment(1);

        let outcome = self.submit_to_gateway(&intent).await?;
        let intent = self
            .store
            .get(intent.id)
            .await?
            .ok_or(PaymentError::UnknownIntent(intent.id))?;

        tracing::info!(intent_id = %intent.id, status = %intent.status, "payment initiated");
        Ok(InitiateResult { intent, outcome })
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, intent_id: PaymentIntentId) -> Result<()> {
        let intent = self
            .store
            .get(intent_id)
            .await?
            .ok_or(PaymentError::UnknownIntent(intent_id))?;

        if intent.status == IntentStatus::Refunded {
            return Ok(()); // replayed refund
        }

        self.gateway.refund(intent_id).await?;
        self.store
            .set_status(intent_id, IntentStatus::Refunded)
            .await?;

        metrics::counter!("payment_refunds").increment(1);
        tracing::info!(%intent_id, "payment refunded");
        Ok(())
    }

    async fn intent(&self, intent_id: PaymentIntentId) -> Result<Option<PaymentIntent>> {
        self.store.get(intent_id).await
    }
}
