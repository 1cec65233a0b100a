//! Domain events and their subscribers.
//!
//! The lifecycle publishes an `ExpenseEvent` for every committed transition.
//! Subscribers run in detached tasks; a failing or lagging subscriber never
//! affects the transition that produced the event.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A new expense was submitted.
    Submitted,
    /// A founder approved without completing quorum.
    ApprovalRecorded,
    /// The expense reached approval quorum.
    Approved,
    /// A founder rejected the expense.
    Rejected,
    /// The owner asked for the funds.
    WithdrawalRequested,
    /// A founder countersigned the withdrawal without completing quorum.
    WithdrawalApprovalRecorded,
    /// The withdrawal reached quorum.
    WithdrawalApproved,
    /// A founder rejected the withdrawal.
    WithdrawalRejected,
    /// The owner confirmed the funds arrived.
    Received,
    /// The owner reminded pending founders.
    Nudged,
}

impl EventKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::ApprovalRecorded => "APPROVAL_RECORDED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::WithdrawalRequested => "WITHDRAWAL_REQUESTED",
            Self::WithdrawalApprovalRecorded => "WITHDRAWAL_APPROVAL_RECORDED",
            Self::WithdrawalApproved => "WITHDRAWAL_APPROVED",
            Self::WithdrawalRejected => "WITHDRAWAL_REJECTED",
            Self::Received => "RECEIVED",
            Self::Nudged => "NUDGED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseEvent {
    /// What happened.
    pub kind: EventKind,
    /// The affected expense.
    pub expense_id: Uuid,
    /// The expense's company.
    pub company_id: Uuid,
    /// Who triggered it.
    pub actor_id: Uuid,
    /// When the transition committed.
    pub occurred_at: DateTime<Utc>,
}

/// In-process broadcast bus for `ExpenseEvent`s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExpenseEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event. Having no subscriber is not an error.
    pub fn publish(&self, event: ExpenseEvent) {
        if self.sender.send(event).is_err() {
            debug!("no event subscribers");
        }
    }

    /// Publishes every event in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = ExpenseEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Opens a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExpenseEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Failure reported by a notification channel.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers notifications about lifecycle events.
///
/// Delivery is best-effort. Errors are logged by the dispatcher task and
/// never retried.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Delivers one event.
    async fn dispatch(&self, event: &ExpenseEvent) -> Result<(), NotifyError>;
}

/// Dispatcher that only logs what it would have sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationDispatcher for LoggingNotifier {
    async fn dispatch(&self, event: &ExpenseEvent) -> Result<(), NotifyError> {
        info!(
            kind = %event.kind,
            expense_id = %event.expense_id,
            company_id = %event.company_id,
            "notification sent"
        );
        Ok(())
    }
}

/// Spawns a task feeding every bus event to `dispatcher`.
pub fn spawn_dispatcher(
    bus: &EventBus,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = dispatcher.dispatch(&event).await {
                        warn!(
                            error = %e,
                            kind = %event.kind,
                            expense_id = %event.expense_id,
                            "notification dispatch failed"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification dispatcher lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Spawns a task writing every bus event to the audit log.
pub fn spawn_audit_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(
                    target: "cofound::audit",
                    kind = %event.kind,
                    expense_id = %event.expense_id,
                    company_id = %event.company_id,
                    actor_id = %event.actor_id,
                    occurred_at = %event.occurred_at,
                    "expense event"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "cofound::audit", skipped, "audit logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(kind: EventKind) -> ExpenseEvent {
        ExpenseEvent {
            kind,
            expense_id: Uuid::from_u128(1),
            company_id: Uuid::from_u128(2),
            actor_id: Uuid::from_u128(3),
            occurred_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl NotificationDispatcher for Recording {
        async fn dispatch(&self, event: &ExpenseEvent) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(event.kind);
            if event.kind == EventKind::Rejected {
                return Err(NotifyError("smtp down".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        bus.publish(event(EventKind::Submitted));
    }

    #[tokio::test]
    async fn test_subscribers_see_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish_all([event(EventKind::Submitted), event(EventKind::Approved)]);

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Submitted);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Approved);
    }

    #[tokio::test]
    async fn test_dispatcher_failure_does_not_stop_delivery() {
        let bus = EventBus::new(8);
        let recording = Arc::new(Recording::default());
        let handle = spawn_dispatcher(&bus, recording.clone());

        bus.publish(event(EventKind::Rejected));
        bus.publish(event(EventKind::Received));
        drop(bus);

        handle.await.unwrap();
        assert_eq!(
            *recording.seen.lock().unwrap(),
            vec![EventKind::Rejected, EventKind::Received]
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            EventKind::WithdrawalApprovalRecorded.to_string(),
            "WITHDRAWAL_APPROVAL_RECORDED"
        );
    }
}
