/// Single-assignment completion signal
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use super::reject::Rejection;
use crate::state::State;

/// How a transition ends: the state it reached, or why not
pub type TransitionOutcome = Result<State, Rejection>;

/// Settles once; later settles are ignored. Any number of waiters.
pub struct Deferred {
    sender: Mutex<Option<oneshot::Sender<TransitionOutcome>>>,
    value: Mutex<Option<TransitionOutcome>>,
    receiver: Shared<BoxFuture<'static, TransitionOutcome>>,
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("settled", &self.is_settled()).finish()
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let receiver = receiver
            .map(|received| received.unwrap_or_else(|_| Err(Rejection::aborted("Transition was dropped"))))
            .boxed()
            .shared();
        Self {
            sender: Mutex::new(Some(sender)),
            value: Mutex::new(None),
            receiver,
        }
    }

    /// Returns false when already settled
    pub fn settle(&self, outcome: TransitionOutcome) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            return false;
        };
        *self.value.lock() = Some(outcome.clone());
        // Nobody waiting is fine; the value is kept above.
        let _ = sender.send(outcome);
        true
    }

    pub fn is_settled(&self) -> bool {
        self.value.lock().is_some()
    }

    pub fn value(&self) -> Option<TransitionOutcome> {
        self.value.lock().clone()
    }

    pub fn wait(&self) -> Shared<BoxFuture<'static, TransitionOutcome>> {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::RejectType;

    #[tokio::test]
    async fn test_settles_once() {
        let deferred = Deferred::new();
        let waiter = deferred.wait();

        assert!(deferred.settle(Err(Rejection::aborted("first"))));
        assert!(!deferred.settle(Err(Rejection::superseded())));

        let outcome = waiter.await;
        assert_eq!(outcome.unwrap_err().kind(), RejectType::Aborted);
        assert!(deferred.is_settled());
        assert_eq!(deferred.wait().await.unwrap_err().kind(), RejectType::Aborted);
    }
}
