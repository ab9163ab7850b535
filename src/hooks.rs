//! Pre/post mutation hooks. Spec section 4.6/9: model the host platform's
//! event bus as two observer lists the ledger owns rather than a
//! volatile-field delegate. No teacher precedent (the `accounts` service has
//! no subscriber model); grounded on `mail::MailProvider`'s `Arc<dyn Trait>`
//! registration pattern, generalized from a single provider to a list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::models::TransactionType;

/// The full change tuple offered to subscribers around every mutation.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub player_name: String,
    pub player_uuid: String,
    pub currency_identifier: String,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub operator: String,
    pub occurred_at: DateTime<Utc>,
}

/// Cancellable pre-change notification. A single subscriber setting
/// `cancel` aborts the mutation; the ledger reads it only after every
/// subscriber has been offered the event (spec section 9).
pub struct PreHookEvent {
    pub change: ChangeEvent,
    cancelled: std::sync::atomic::AtomicBool,
}

impl PreHookEvent {
    fn new(change: ChangeEvent) -> Self {
        Self {
            change,
            cancelled: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Non-cancellable post-change notification.
pub struct PostHookEvent {
    pub change: ChangeEvent,
}

pub type PreHookFn = Arc<dyn Fn(&PreHookEvent) + Send + Sync>;
pub type PostHookFn = Arc<dyn Fn(&PostHookEvent) + Send + Sync>;

/// Owns the subscriber lists. A failing subscriber (one that panics) is
/// isolated via `catch_unwind` so it cannot break the mutation for every
/// other subscriber.
#[derive(Default)]
pub struct HookDispatcher {
    pre_hooks: Mutex<Vec<PreHookFn>>,
    post_hooks: Mutex<Vec<PostHookFn>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_pre(&self, hook: PreHookFn) {
        self.pre_hooks.lock().push(hook);
    }

    pub fn subscribe_post(&self, hook: PostHookFn) {
        self.post_hooks.lock().push(hook);
    }

    /// Dispatch the pre-hook to every subscriber. Must not hold any cache or
    /// registry lock while this runs (spec section 5).
    pub fn dispatch_pre(&self, change: ChangeEvent) -> bool {
        let event = PreHookEvent::new(change);
        let hooks: Vec<_> = self.pre_hooks.lock().clone();
        for hook in hooks {
            let event_ref = &event;
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(event_ref)));
        }
        event.is_cancelled()
    }

    pub fn dispatch_post(&self, change: ChangeEvent) {
        let event = PostHookEvent { change };
        let hooks: Vec<_> = self.post_hooks.lock().clone();
        for hook in hooks {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&event)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn sample_change() -> ChangeEvent {
        ChangeEvent {
            player_name: "alice".to_string(),
            player_uuid: String::new(),
            currency_identifier: "coin".to_string(),
            kind: TransactionType::Deposit,
            amount: dec!(10),
            balance_before: dec!(0),
            balance_after: dec!(10),
            reason: "test".to_string(),
            operator: "TEST".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn uncancelled_pre_hook_allows_mutation() {
        let dispatcher = HookDispatcher::new();
        let called = Arc::new(AtomicBool::new(false));
        let c = called.clone();
        dispatcher.subscribe_pre(Arc::new(move |_event| {
            c.store(true, Ordering::SeqCst);
        }));

        let cancelled = dispatcher.dispatch_pre(sample_change());
        assert!(!cancelled);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn any_subscriber_cancelling_aborts_mutation() {
        let dispatcher = HookDispatcher::new();
        dispatcher.subscribe_pre(Arc::new(|_event| {}));
        dispatcher.subscribe_pre(Arc::new(|event: &PreHookEvent| event.cancel()));

        let cancelled = dispatcher.dispatch_pre(sample_change());
        assert!(cancelled);
    }

    #[test]
    fn one_failing_subscriber_does_not_break_others() {
        let dispatcher = HookDispatcher::new();
        let calls = Arc::new(AtomicU32::new(0));
        dispatcher.subscribe_pre(Arc::new(|_event| panic!("boom")));
        let c = calls.clone();
        dispatcher.subscribe_pre(Arc::new(move |_event| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let _ = dispatcher.dispatch_pre(sample_change());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
