//! Settle-once handles and the futures that observe them.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::try_join_all;

use crate::{Disconnected, ListenerError};

type Settlement<T> = Result<T, ListenerError>;

/// A handle that can be resolved with a value or rejected with an error, exactly once.
///
/// Settling consumes the handle, so the "exactly once" guarantee is enforced by the type system.
/// Dropping a deferred without settling it makes the matching [`Promise`] complete with a
/// [`Disconnected`] error.
///
/// # Example
///
/// ```
/// use futures::executor::block_on;
/// use listeners::Deferred;
///
/// let (deferred, promise) = Deferred::<u32>::new();
///
/// deferred.resolve(5);
///
/// assert_eq!(block_on(promise).unwrap(), 5);
/// ```
pub struct Deferred<T> {
    sender: oneshot::Sender<Settlement<T>>,
}

impl<T> Deferred<T> {
    /// Creates a deferred together with the promise that observes it.
    #[must_use]
    pub fn new() -> (Self, Promise<T>) {
        let (sender, receiver) = oneshot::channel();

        (
            Self { sender },
            Promise {
                state: PromiseState::Pending(receiver),
            },
        )
    }

    /// Resolves the deferred, completing the promise with `value`.
    ///
    /// If the promise has already been dropped, the value is discarded.
    pub fn resolve(self, value: T) {
        // Nobody is listening any more if this fails, which is not our concern.
        drop(self.sender.send(Ok(value)));
    }

    /// Rejects the deferred, completing the promise with `error`.
    ///
    /// If the promise has already been dropped, the error is discarded.
    pub fn reject(self, error: impl Into<ListenerError>) {
        drop(self.sender.send(Err(error.into())));
    }

    /// Whether the matching promise has been dropped, making any settlement pointless.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_canceled()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("value_type", &format_args!("{}", type_name::<T>()))
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// A future that completes when its [`Deferred`] is settled.
///
/// Yields `Ok(value)` on resolution and `Err(error)` on rejection. If the deferred is dropped
/// without being settled, yields a [`Disconnected`] error.
pub struct Promise<T> {
    state: PromiseState<T>,
}

enum PromiseState<T> {
    Pending(oneshot::Receiver<Settlement<T>>),
    Settled(Option<Settlement<T>>),
}

impl<T> Promise<T> {
    /// Creates a promise that is already resolved with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self {
            state: PromiseState::Settled(Some(Ok(value))),
        }
    }

    /// Creates a promise that is already rejected with `error`.
    #[must_use]
    pub fn rejected(error: impl Into<ListenerError>) -> Self {
        Self {
            state: PromiseState::Settled(Some(Err(error.into()))),
        }
    }

    /// Checks whether the deferred has been settled (or dropped), without waiting.
    ///
    /// Once this returns `true`, awaiting the promise completes immediately.
    pub fn is_settled(&mut self) -> bool {
        let PromiseState::Pending(receiver) = &mut self.state else {
            return true;
        };

        let settlement = match receiver.try_recv() {
            Ok(None) => return false,
            Ok(Some(settlement)) => settlement,
            Err(oneshot::Canceled) => Err(disconnected()),
        };

        self.state = PromiseState::Settled(Some(settlement));
        true
    }
}

// We never pin-project into the fields, so the promise can move freely.
impl<T> Unpin for Promise<T> {}

impl<T> Future for Promise<T> {
    type Output = Settlement<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PromiseState::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|oneshot::Canceled| Err(disconnected()))),
            PromiseState::Settled(settlement) => Poll::Ready(
                settlement
                    .take()
                    .expect("promise polled again after it already completed"),
            ),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PromiseState::Pending(_) => "pending",
            PromiseState::Settled(Some(Ok(_))) => "resolved",
            PromiseState::Settled(Some(Err(_))) => "rejected",
            PromiseState::Settled(None) => "consumed",
        };

        f.debug_struct("Promise")
            .field("value_type", &format_args!("{}", type_name::<T>()))
            .field("state", &state)
            .finish()
    }
}

/// Waits for every promise and yields their values in input order.
///
/// Completes with the first rejection observed, without waiting for the remaining promises.
///
/// # Example
///
/// ```
/// use futures::executor::block_on;
/// use listeners::{Promise, when_all};
///
/// let values = block_on(when_all([Promise::resolved(1), Promise::resolved(2)])).unwrap();
///
/// assert_eq!(values, vec![1, 2]);
/// ```
pub async fn when_all<T>(
    promises: impl IntoIterator<Item = Promise<T>>,
) -> Result<Vec<T>, ListenerError> {
    try_join_all(promises).await
}

fn disconnected() -> ListenerError {
    Box::new(Disconnected::new())
}
