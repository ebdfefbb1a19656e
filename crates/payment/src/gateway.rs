//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{Currency, Money, OrderId, PaymentIntentId};
use domain::PaymentMethod;

use crate::error::{PaymentError, Result};
use crate::intent::PaymentOutcome;

/// A charge request sent to the gateway.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub intent_id: PaymentIntentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub idempotency_key: String,
}

/// What the gateway answered at charge time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayDecision {
    /// The gateway will deliver the outcome asynchronously via webhook.
    Pending,
    /// The gateway settled the charge synchronously.
    Immediate(PaymentOutcome),
}

/// Trait for the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submits a charge. Gateways deduplicate on the intent id, so a
    /// retried submission does not create a second charge attempt.
    async fn create_intent(&self, request: &ChargeRequest) -> Result<GatewayDecision>;

    /// Refunds a settled charge.
    async fn refund(&self, intent_id: PaymentIntentId) -> Result<()>;
}

#[derive(Debug)]
struct InMemoryGatewayState {
    /// Decisions already handed out, keyed by intent id (gateway-side
    /// idempotency).
    decisions: HashMap<PaymentIntentId, GatewayDecision>,
    refunds: Vec<PaymentIntentId>,
    /// The decision the next unseen charge will receive.
    next_decision: GatewayDecision,
    /// Number of upcoming calls that fail as unavailable before any
    /// decision is made (simulates network timeouts).
    outages_remaining: u32,
    charge_count: usize,
}

impl Default for InMemoryGatewayState {
    fn default() -> Self {
        Self {
            decisions: HashMap::new(),
            refunds: Vec::new(),
            next_decision: GatewayDecision::Immediate(PaymentOutcome::Captured),
            outages_remaining: 0,
            charge_count: 0,
        }
    }
}

/// In-memory gateway for tests and the default binary.
///
/// Defaults to capturing every charge synchronously; tests steer it with
/// [`set_next_decision`](InMemoryGateway::set_next_decision) and
/// [`fail_next`](InMemoryGateway::fail_next).
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a new gateway that captures charges synchronously.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decision handed to the next unseen charge.
    pub fn set_next_decision(&self, decision: GatewayDecision) {
        self.state.lock().unwrap().next_decision = decision;
    }

    /// Makes the next `n` calls fail with `Unavailable` before answering.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().outages_remaining = n;
    }

    /// Number of distinct charges actually created.
    pub fn charge_count(&self) -> usize {
        self.state.lock().unwrap().charge_count
    }

    /// Intents refunded so far.
    pub fn refunded(&self) -> Vec<PaymentIntentId> {
        self.state.lock().unwrap().refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_intent(&self, request: &ChargeRequest) -> Result<GatewayDecision> {
        let mut state = self.state.lock().unwrap();

        if state.outages_remaining > 0 {
            state.outages_remaining -= 1;
            return Err(PaymentError::Unavailable("gateway timeout".to_string()));
        }

        if let Some(decision) = state.decisions.get(&request.intent_id) {
            return Ok(*decision);
        }

        let decision = state.next_decision;
        state.decisions.insert(request.intent_id, decision);
        state.charge_count += 1;
        Ok(decision)
    }

    async fn refund(&self, intent_id: PaymentIntentId) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.outages_remaining > 0 {
            state.outages_remaining -= 1;
            return Err(PaymentError::Unavailable("gateway timeout".to_string()));
        }

        state.refunds.push(intent_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChargeRequest {
        ChargeRequest {
            intent_id: PaymentIntentId::new(),
            order_id: OrderId::new(),
            amount: Money::from_cents(1000),
            currency: Currency::Usd,
            method: PaymentMethod::Card,
            idempotency_key: "k1".to_string(),
        }
    }

    #[tokio::test]
    async fn default_decision_is_immediate_capture() {
        let gateway = InMemoryGateway::new();
        let decision = gateway.create_intent(&request()).await.unwrap();
        assert_eq!(decision, GatewayDecision::Immediate(PaymentOutcome::Captured));
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn replayed_charge_is_not_counted_twice() {
        let gateway = InMemoryGateway::new();
        let req = request();

        gateway.create_intent(&req).await.unwrap();
        gateway.create_intent(&req).await.unwrap();

        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn replay_returns_original_decision_after_mode_change() {
        let gateway = InMemoryGateway::new();
        let req = request();
        gateway.create_intent(&req).await.unwrap();

        gateway.set_next_decision(GatewayDecision::Immediate(PaymentOutcome::Failed));
        let decision = gateway.create_intent(&req).await.unwrap();
        assert_eq!(decision, GatewayDecision::Immediate(PaymentOutcome::Captured));
    }

    #[tokio::test]
    async fn outages_fail_then_recover() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(2);
        let req = request();

        assert!(matches!(
            gateway.create_intent(&req).await,
            Err(PaymentError::Unavailable(_))
        ));
        assert!(matches!(
            gateway.create_intent(&req).await,
            Err(PaymentError::Unavailable(_))
        ));
        assert!(gateway.create_intent(&req).await.is_ok());
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn refund_is_recorded() {
        let gateway = InMemoryGateway::new();
        let id = PaymentIntentId::new();
        gateway.refund(id).await.unwrap();
        assert_eq!(gateway.refunded(), vec![id]);
    }
}
