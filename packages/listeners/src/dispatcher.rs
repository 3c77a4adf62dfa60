use std::rc::Rc;

use crate::{Error, ListenerId};

/// Invoked with one result per listener after a fire pass completes without failure.
///
/// Results are in invocation order, which is the reverse of registration order.
pub type SuccessCallback<R> = Rc<dyn Fn(Vec<R>)>;

/// Invoked with the failure that halted a fire pass.
pub type FailureCallback = Rc<dyn Fn(Error)>;

/// Invoked when a listener is added to or removed from a list.
pub type ListenerCallback = Rc<dyn Fn(ListenerId)>;

/// Replaces the success callback for a single fire pass and receives the fired event back.
pub type DoneCallback<E> = Box<dyn FnOnce(E)>;

/// The capabilities shared by [`ListenerList`][1] and [`AsyncListenerList`][2].
///
/// Wrappers such as [`EventQueue`][3] and [`SingularEventHandler`][4] are generic over this trait
/// so they work with both synchronous and deferred dispatch.
///
/// [1]: crate::ListenerList
/// [2]: crate::AsyncListenerList
/// [3]: crate::EventQueue
/// [4]: crate::SingularEventHandler
pub trait Dispatcher<E> {
    /// The (typically unsized) listener type stored by the dispatcher.
    type Listener: ?Sized;

    /// The per-listener result delivered to the success callback.
    type Output;

    /// Registers a shared listener without a call limit.
    fn add_shared_listener(&self, listener: Rc<Self::Listener>) -> ListenerId;

    /// Registers a shared listener that is removed after `calls` invocations,
    /// with `-1` meaning unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `calls` is neither `-1` nor positive.
    fn add_shared_n_time_listener(
        &self,
        listener: Rc<Self::Listener>,
        calls: i32,
    ) -> crate::Result<ListenerId>;

    /// Removes a registration. Returns `false` if it was not present.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Invokes one listener with `event` outside of any fire pass, using the same calling
    /// convention as a fire pass. The listener does not need to be registered.
    ///
    /// # Errors
    ///
    /// Returns the listener failure if it is not routed to a failure callback.
    fn invoke_listener(&self, listener: &Self::Listener, event: &E) -> crate::Result<()>;

    /// Dispatches `event` to all registered listeners.
    ///
    /// # Errors
    ///
    /// Returns the failure that halted the fire pass if no failure callback is registered.
    fn fire_event(&self, event: E) -> crate::Result<()>;

    /// Replaces the callback invoked when a fire pass completes without failure.
    fn set_on_fire_success(&self, callback: Option<SuccessCallback<Self::Output>>);

    /// Replaces the callback invoked when a fire pass fails.
    fn set_on_fire_failure(&self, callback: Option<FailureCallback>);

    /// The number of registered listeners.
    fn listener_count(&self) -> usize;

    /// Removes all listeners and clears all callbacks.
    fn reset(&self);
}
