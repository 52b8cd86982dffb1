//! Standing subscriptions owned by a view.

use std::fmt;

use crate::scheduler::LiveToken;
use crate::scope::Subscription;

/// Handle to one active binding. Cancelling it unsubscribes from the scope,
/// drops every write it has queued and runs its teardown, exactly once.
/// Dropping a `Binding` cancels it.
#[must_use = "dropping a Binding cancels it"]
pub struct Binding {
    token: LiveToken,
    subscription: Option<Subscription>,
    teardown: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("live", &self.token.is_live())
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}

impl Binding {
    /// A binding with nothing to cancel (static text).
    pub fn inert() -> Self {
        Self::with_token(LiveToken::new(), None)
    }

    pub(crate) fn with_token(token: LiveToken, subscription: Option<Subscription>) -> Self {
        Self {
            token,
            subscription,
            teardown: None,
        }
    }

    /// A binding whose cancellation runs `teardown`. Used by directives that
    /// manage their own resources.
    pub fn from_fn(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            token: LiveToken::new(),
            subscription: None,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Run `teardown` in addition to whatever cancellation already does.
    pub fn on_cancel(mut self, teardown: impl FnOnce() + 'static) -> Self {
        let previous = self.teardown.take();
        self.teardown = Some(Box::new(move || {
            if let Some(previous) = previous {
                previous();
            }
            teardown();
        }));
        self
    }

    pub fn token(&self) -> LiveToken {
        self.token.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        !self.token.is_live()
    }

    /// Safe to call more than once.
    pub fn cancel(&mut self) {
        self.token.kill();
        self.subscription.take();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.cancel();
    }
}
