//! The checkout orchestrator.

use chrono::Utc;
use common::{CartId, Currency, OrderId, PaymentIntentId, UserId};
use domain::{Order, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
use inventory::{InventoryError, ReservationLine, ReservationService, VariantKey};
use outbox::{
    EventKind, InventoryReleasedPayload, OrderCancelledPayload, OrderConfirmedPayload,
    OrderCreatedPayload, OrderRefundedPayload, OutboxEvent, PaymentCompletedPayload,
};
use payment::{PaymentOutcome, PaymentService};

use crate::cart::CartSource;
use crate::error::{CheckoutError, Result};
use crate::instance::{SagaInstance, SagaStep};
use crate::locks::OrderLocks;
use crate::retry::{RetryError, RetryPolicy, with_retry};
use crate::store::SagaStore;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Currency orders settle in.
    pub currency: Currency,
    /// How old a cart snapshot may be at checkout start.
    pub cart_freshness: chrono::Duration,
    /// Retry budget for each outbound call.
    pub retry: RetryPolicy,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Usd,
            cart_freshness: chrono::Duration::minutes(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Input to `start_checkout`.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// What `start_checkout` hands back: the order id and where the saga got
/// to synchronously (Confirmed when the gateway settled inline,
/// PaymentPending when the outcome arrives by webhook).
#[derive(Debug, Clone, Copy)]
pub struct CheckoutStarted {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Drives orders through reservation → payment → confirmation, with
/// compensation on failure.
///
/// Every outbound call carries an idempotency key derived from the order
/// id and a bounded retry budget; every transition persists atomically
/// with the outbox events it emits. Per-order locks serialize work for one
/// order while unrelated orders proceed in parallel.
pub struct CheckoutOrchestrator<ST, C, I, P> {
    store: ST,
    carts: C,
    inventory: I,
    payments: P,
    locks: OrderLocks,
    config: SagaConfig,
}

impl<ST, C, I, P> CheckoutOrchestrator<ST, C, I, P>
where
    ST: SagaStore,
    C: CartSource,
    I: ReservationService,
    P: PaymentService,
{
    /// Creates an orchestrator over the given collaborators.
    pub fn new(store: ST, carts: C, inventory: I, payments: P, config: SagaConfig) -> Self {
        Self {
            store,
            carts,
            inventory,
            payments,
            locks: OrderLocks::new(),
            config,
        }
    }

    /// Starts a checkout: snapshot the cart, create the order, reserve
    /// stock, initiate payment.
    ///
    /// Returns once the saga reaches either a synchronous terminal state or
    /// PaymentPending (webhook path). Business failures reject with the
    /// order already persisted in its terminal status.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, cart_id = %request.cart_id))]
    pub async fn start_checkout(&self, request: CheckoutRequest) -> Result<CheckoutStarted> {
        metrics::counter!("checkout_started").increment(1);
        let started = std::time::Instant::now();

        let snapshot = self
            .carts
            .snapshot(request.cart_id)
            .await?
            .ok_or(CheckoutError::UnknownCart(request.cart_id))?;
        snapshot.validate(Utc::now(), self.config.cart_freshness)?;

        let order_id = OrderId::new();
        let mut order = Order::from_snapshot(
            order_id,
            request.user_id,
            &snapshot,
            self.config.currency,
            request.payment_method,
            request.shipping_address,
        );
        let mut saga = SagaInstance::new(order_id);

        let created = OutboxEvent::new(
            EventKind::OrderCreated,
            &OrderCreatedPayload {
                order_id,
                user_id: order.user_id(),
                total: order.total(),
            },
        )?;
        self.store.persist(&order, &saga, vec![created]).await?;
        tracing::info!(%order_id, total = %order.total(), "checkout started");

        let _guard = self.locks.acquire(order_id).await;
        let outcome = self.drive(&mut order, &mut saga).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        outcome?;

        if order.status() == OrderStatus::Cancelled
            && order.payment_status() == PaymentStatus::Failed
        {
            return Err(CheckoutError::PaymentDeclined { order_id });
        }

        Ok(CheckoutStarted {
            order_id,
            status: order.status(),
        })
    }

    /// Applies a payment outcome to an order, whichever way it arrived.
    ///
    /// The synchronous gateway answer and the asynchronous webhook both
    /// land here, so the state machine has a single source of truth. An
    /// outcome for an order that is no longer PaymentPending is
    /// acknowledged and ignored.
    #[tracing::instrument(skip(self))]
    pub async fn handle_payment_outcome(
        &self,
        intent_id: PaymentIntentId,
        outcome: PaymentOutcome,
    ) -> Result<()> {
        let intent = self
            .payments
            .intent(intent_id)
            .await?
            .ok_or(CheckoutError::UnknownIntent(intent_id))?;
        let order_id = intent.order_id;

        let _guard = self.locks.acquire(order_id).await;
        let (mut order, mut saga) = self
            .store
            .load(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;

        self.apply_payment_outcome(&mut order, &mut saga, intent_id, outcome)
            .await
    }

    /// Requests cancellation. Valid until the order is Confirmed; after
    /// that, refunds are the only way back.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<()> {
        let _guard = self.locks.acquire(order_id).await;
        let (mut order, mut saga) = self
            .store
            .load(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;

        if !order.status().can_cancel() {
            return Err(CheckoutError::InvalidState {
                order_id,
                status: order.status(),
                action: "cancel",
            });
        }

        self.compensate(&mut order, &mut saga, "cancelled by user")
            .await
    }

    /// Refunds a confirmed order.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, order_id: OrderId) -> Result<()> {
        let _guard = self.locks.acquire(order_id).await;
        let (mut order, mut saga) = self
            .store
            .load(order_id)
            .await?
            .ok_or(CheckoutError::UnknownOrder(order_id))?;

        if !order.status().can_refund() {
            return Err(CheckoutError::InvalidState {
                order_id,
                status: order.status(),
                action: "refund",
            });
        }

        order.transition(OrderStatus::Refunding)?;
        saga.advance(SagaStep::Refund);
        self.store.persist(&order, &saga, vec![]).await?;

        self.finish_refund(&mut order, &mut saga).await
    }

    /// Current order and saga snapshot, for the read side.
    pub async fn status(&self, order_id: OrderId) -> Result<Option<(Order, SagaInstance)>> {
        Ok(self.store.load(order_id).await?)
    }

    /// Drives every non-terminal saga forward after a restart.
    ///
    /// Completed side-effecting steps are never replayed: the recorded
    /// idempotency keys make re-reservation and re-initiation no-ops.
    /// Returns the number of sagas visited.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self) -> Result<usize> {
        let ids = self.store.incomplete().await?;
        let count = ids.len();
        for order_id in ids {
            if let Err(e) = self.resume_one(order_id).await {
                tracing::warn!(%order_id, error = %e, "resume pass finished with error");
            }
        }
        if count > 0 {
            tracing::info!(count, "saga resumption pass complete");
        }
        Ok(count)
    }

    async fn resume_one(&self, order_id: OrderId) -> Result<()> {
        let _guard = self.locks.acquire(order_id).await;
        let Some((mut order, mut saga)) = self.store.load(order_id).await? else {
            return Ok(());
        };
        tracing::info!(%order_id, status = %order.status(), step = %saga.step, "resuming saga");

        match order.status() {
            OrderStatus::Created | OrderStatus::Reserving => {
                self.drive(&mut order, &mut saga).await
            }
            OrderStatus::Reserved => self.run_payment(&mut order, &mut saga).await.map(|_| ()),
            OrderStatus::PaymentPending => self.resume_payment(&mut order, &mut saga).await,
            OrderStatus::Compensating => {
                self.finish_compensation(&mut order, &mut saga, "resumed compensation")
                    .await
            }
            OrderStatus::Refunding => self.finish_refund(&mut order, &mut saga).await,
            _ => Ok(()),
        }
    }

    /// The forward path: reservation, then payment.
    async fn drive(&self, order: &mut Order, saga: &mut SagaInstance) -> Result<()> {
        if matches!(
            order.status(),
            OrderStatus::Created | OrderStatus::Reserving
        ) {
            self.run_reservation(order, saga).await?;
        }
        if order.status() == OrderStatus::Reserved {
            self.run_payment(order, saga).await?;
        }
        Ok(())
    }

    async fn run_reservation(&self, order: &mut Order, saga: &mut SagaInstance) -> Result<()> {
        let order_id = order.id();

        if order.status() == OrderStatus::Created {
            order.transition(OrderStatus::Reserving)?;
            self.store.persist(order, saga, vec![]).await?;
        }
        saga.reserve_attempts += 1;

        let lines: Vec<ReservationLine> = order
            .items()
            .iter()
            .map(|item| ReservationLine {
                key: VariantKey {
                    product_id: item.product_id.clone(),
                    variant_id: item.variant_id.clone(),
                },
                quantity: item.quantity,
            })
            .collect();
        let key = saga.reserve_key.clone();

        match with_retry(self.config.retry, "inventory.reserve", || {
            self.inventory.reserve(order_id, lines.clone(), &key)
        })
        .await
        {
            Ok(reservation_id) => {
                saga.record_reservation(reservation_id);
                saga.advance(SagaStep::Pay);
                order.transition(OrderStatus::Reserved)?;
                self.store.persist(order, saga, vec![]).await?;
                Ok(())
            }
            Err(RetryError::Permanent(InventoryError::InsufficientStock { key })) => {
                saga.note_error(format!("insufficient stock for {key}"));
                saga.advance(SagaStep::Finished);
                order.transition(OrderStatus::Failed)?;
                self.store.persist(order, saga, vec![]).await?;
                metrics::counter!("checkout_insufficient_stock").increment(1);
                tracing::info!(%order_id, %key, "checkout rejected: insufficient stock");
                Err(CheckoutError::InsufficientStock { order_id, key })
            }
            Err(RetryError::Permanent(e)) => {
                saga.note_error(&e);
                saga.advance(SagaStep::Finished);
                order.transition(OrderStatus::Failed)?;
                self.store.persist(order, saga, vec![]).await?;
                Err(CheckoutError::Inventory(e))
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                // Nothing was reserved as far as we know; if a response was
                // lost, the expiry sweeper reclaims the orphaned hold.
                saga.note_error(format!("reserve gave up after {attempts} attempts"));
                saga.advance(SagaStep::Finished);
                order.transition(OrderStatus::Failed)?;
                self.store.persist(order, saga, vec![]).await?;
                metrics::counter!("checkout_reserve_exhausted").increment(1);
                Err(CheckoutError::Inventory(last.unwrap_or_else(|| {
                    InventoryError::Unavailable("reserve retry budget exhausted".to_string())
                })))
            }
        }
    }

    /// Initiates payment. Returns true when the outcome settled inline.
    async fn run_payment(&self, order: &mut Order, saga: &mut SagaInstance) -> Result<bool> {
        let order_id = order.id();
        saga.payment_attempts += 1;

        let key = saga.payment_key.clone();
        let amount = order.total();
        let currency = order.currency();
        let method = order.payment_method();

        match with_retry(self.config.retry, "payment.initiate", || {
            self.payments.initiate(order_id, amount, currency, method, &key)
        })
        .await
        {
            Ok(result) => {
                saga.record_intent(result.intent.id);
                order.transition(OrderStatus::PaymentPending)?;
                self.store.persist(order, saga, vec![]).await?;

                match result.outcome {
                    Some(outcome) => {
                        self.apply_payment_outcome(order, saga, result.intent.id, outcome)
                            .await?;
                        Ok(true)
                    }
                    None => {
                        tracing::info!(%order_id, intent_id = %result.intent.id, "awaiting gateway webhook");
                        Ok(false)
                    }
                }
            }
            Err(RetryError::Permanent(e)) => {
                saga.note_error(&e);
                self.compensate(order, saga, "payment initiation failed")
                    .await?;
                Err(CheckoutError::Payment(e))
            }
            Err(e @ RetryError::Exhausted { .. }) => {
                saga.note_error(&e);
                metrics::counter!("checkout_payment_timeouts").increment(1);
                self.compensate(order, saga, "payment timed out").await?;
                Err(CheckoutError::PaymentTimeout { order_id })
            }
        }
    }

    /// The single transition function for payment outcomes.
    async fn apply_payment_outcome(
        &self,
        order: &mut Order,
        saga: &mut SagaInstance,
        intent_id: PaymentIntentId,
        outcome: PaymentOutcome,
    ) -> Result<()> {
        let order_id = order.id();

        if order.status() != OrderStatus::PaymentPending {
            // Duplicate delivery, or a late outcome for an order that
            // already moved on: acknowledge without re-applying. A charge
            // that settled after we compensated is money we must hand back.
            if outcome.is_success()
                && matches!(
                    order.status(),
                    OrderStatus::Compensating | OrderStatus::Cancelled
                )
                && order.payment_status() != PaymentStatus::Refunded
            {
                tracing::warn!(%order_id, %intent_id, "charge settled after cancellation, refunding");
                match self.payments.refund(intent_id).await {
                    Ok(()) => {
                        order.set_payment_status(PaymentStatus::Refunded);
                        self.store.persist(order, saga, vec![]).await?;
                    }
                    Err(e) => {
                        tracing::error!(%order_id, %intent_id, error = %e, "late refund failed");
                    }
                }
                return Ok(());
            }

            tracing::info!(%order_id, status = %order.status(), "payment outcome acknowledged as no-op");
            return Ok(());
        }

        let settled = match outcome {
            PaymentOutcome::Failed => {
                order.set_payment_status(PaymentStatus::Failed);
                saga.note_error("payment failed");
                metrics::counter!("checkout_payments_failed").increment(1);
                tracing::info!(%order_id, %intent_id, "payment failed, compensating");
                return self.compensate(order, saga, "payment failed").await;
            }
            PaymentOutcome::Authorized => PaymentStatus::Authorized,
            PaymentOutcome::Captured => PaymentStatus::Captured,
        };
        order.set_payment_status(settled);

        let Some(reservation_id) = saga.reservation_id else {
            return Err(CheckoutError::InvalidState {
                order_id,
                status: order.status(),
                action: "confirm without a reservation",
            });
        };

        match with_retry(self.config.retry, "inventory.commit", || {
            self.inventory.commit(reservation_id)
        })
        .await
        {
            Ok(()) => {
                order.transition(OrderStatus::Confirmed)?;
                saga.advance(SagaStep::Finished);

                let confirmed = OutboxEvent::new(
                    EventKind::OrderConfirmed,
                    &OrderConfirmedPayload {
                        order_id,
                        user_id: order.user_id(),
                        payment_intent_id: intent_id,
                    },
                )?;
                let paid = OutboxEvent::new(
                    EventKind::PaymentCompleted,
                    &PaymentCompletedPayload {
                        order_id,
                        payment_intent_id: intent_id,
                        amount: order.total(),
                    },
                )?;
                self.store.persist(order, saga, vec![confirmed, paid]).await?;

                metrics::counter!("checkout_confirmed").increment(1);
                tracing::info!(%order_id, "order confirmed");
                Ok(())
            }
            Err(e) => {
                // The hold expired (or the engine stayed down): the charge
                // went through but the stock is gone. Compensation refunds.
                saga.note_error(&e);
                tracing::warn!(%order_id, %reservation_id, error = %e, "commit failed, compensating with refund");
                self.compensate(order, saga, "reservation commit failed")
                    .await
            }
        }
    }

    /// Enters compensation from a forward state and finishes it.
    async fn compensate(
        &self,
        order: &mut Order,
        saga: &mut SagaInstance,
        reason: &str,
    ) -> Result<()> {
        order.transition(OrderStatus::Compensating)?;
        saga.advance(SagaStep::Compensate);
        self.store.persist(order, saga, vec![]).await?;
        tracing::info!(order_id = %order.id(), reason, "compensating");

        self.finish_compensation(order, saga, reason).await
    }

    /// The compensation body; also the resume entry point for orders found
    /// mid-compensation. Every action here is idempotent.
    async fn finish_compensation(
        &self,
        order: &mut Order,
        saga: &mut SagaInstance,
        reason: &str,
    ) -> Result<()> {
        let order_id = order.id();
        let mut events = Vec::new();

        // Money first: a settled charge on a cancelled order goes back.
        if let Some(intent_id) = saga.payment_intent_id
            && order.payment_status().is_settled()
        {
            match with_retry(self.config.retry, "payment.refund", || {
                self.payments.refund(intent_id)
            })
            .await
            {
                Ok(()) => order.set_payment_status(PaymentStatus::Refunded),
                Err(e) => {
                    // Compensation continues; resume retries the refund
                    // because the order stays observable in Compensating.
                    saga.note_error(format!("refund failed: {e}"));
                    self.store.persist(order, saga, vec![]).await?;
                    tracing::error!(%order_id, %intent_id, error = %e, "refund failed during compensation");
                    return Err(CheckoutError::PaymentTimeout { order_id });
                }
            }
        }

        if let Some(reservation_id) = saga.reservation_id {
            match with_retry(self.config.retry, "inventory.release", || {
                self.inventory.release(reservation_id)
            })
            .await
            {
                Ok(()) => {
                    events.push(OutboxEvent::new(
                        EventKind::InventoryReleased,
                        &InventoryReleasedPayload {
                            order_id,
                            reservation_id,
                        },
                    )?);
                }
                Err(e) => {
                    // The expiry sweeper reclaims the hold if this keeps
                    // failing; still drive the order terminal.
                    saga.note_error(format!("release failed: {e}"));
                    tracing::error!(%order_id, %reservation_id, error = %e, "release failed during compensation");
                }
            }
        }

        order.transition(OrderStatus::Cancelled)?;
        saga.advance(SagaStep::Finished);
        events.push(OutboxEvent::new(
            EventKind::OrderCancelled,
            &OrderCancelledPayload {
                order_id,
                user_id: order.user_id(),
                reason: reason.to_string(),
            },
        )?);
        self.store.persist(order, saga, events).await?;

        metrics::counter!("checkout_cancelled").increment(1);
        tracing::info!(%order_id, reason, "order cancelled");
        Ok(())
    }

    /// The refund body; also the resume entry point for orders found
    /// mid-refund.
    async fn finish_refund(&self, order: &mut Order, saga: &mut SagaInstance) -> Result<()> {
        let order_id = order.id();
        let Some(intent_id) = saga.payment_intent_id else {
            return Err(CheckoutError::InvalidState {
                order_id,
                status: order.status(),
                action: "refund without a payment intent",
            });
        };

        match with_retry(self.config.retry, "payment.refund", || {
            self.payments.refund(intent_id)
        })
        .await
        {
            Ok(()) => {
                order.set_payment_status(PaymentStatus::Refunded);
                order.transition(OrderStatus::Refunded)?;
                saga.advance(SagaStep::Finished);

                let event = OutboxEvent::new(
                    EventKind::OrderRefunded,
                    &OrderRefundedPayload {
                        order_id,
                        user_id: order.user_id(),
                        payment_intent_id: intent_id,
                        amount: order.total(),
                    },
                )?;
                self.store.persist(order, saga, vec![event]).await?;

                metrics::counter!("checkout_refunded").increment(1);
                tracing::info!(%order_id, "order refunded");
                Ok(())
            }
            Err(e) => {
                // Stays Refunding: observable, and resume retries it.
                saga.note_error(&e);
                self.store.persist(order, saga, vec![]).await?;
                Err(match e {
                    RetryError::Permanent(err) => CheckoutError::Payment(err),
                    RetryError::Exhausted { .. } => CheckoutError::PaymentTimeout { order_id },
                })
            }
        }
    }

    /// Resume path for PaymentPending orders: re-present the idempotency
    /// key. A settled intent yields its outcome immediately; a Pending one
    /// is resubmitted (the gateway deduplicates on the intent id).
    async fn resume_payment(&self, order: &mut Order, saga: &mut SagaInstance) -> Result<()> {
        let order_id = order.id();
        let key = saga.payment_key.clone();
        let amount = order.total();
        let currency = order.currency();
        let method = order.payment_method();

        match with_retry(self.config.retry, "payment.initiate", || {
            self.payments.initiate(order_id, amount, currency, method, &key)
        })
        .await
        {
            Ok(result) => match result.outcome {
                Some(outcome) => {
                    self.apply_payment_outcome(order, saga, result.intent.id, outcome)
                        .await
                }
                None => {
                    tracing::info!(%order_id, "still awaiting gateway webhook");
                    Ok(())
                }
            },
            Err(e) => {
                // Stay PaymentPending; the next resume pass or the webhook
                // will move this order.
                saga.note_error(&e);
                self.store.persist(order, saga, vec![]).await?;
                tracing::warn!(%order_id, error = %e, "payment resume attempt failed");
                Ok(())
            }
        }
    }
}
