//! Listener lists whose listeners complete asynchronously through deferreds.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::mem;
use std::rc::Rc;

use futures::task::{LocalSpawn, LocalSpawnExt};
use tracing::error;

use crate::{
    CallBudget, Deferred, Dispatcher, Error, FailureCallback, ListenerCallback, ListenerError,
    ListenerId, ListenerList, ListenerListBuilder, SuccessCallback, when_all,
};

/// A listener that receives a [`Deferred`] to settle once its work is done, plus the event.
///
/// Returning an error fails the fire pass synchronously, exactly like a failing
/// [`Listener`][crate::Listener]. Rejecting the deferred fails it asynchronously.
pub type AsyncListener<E, R = ()> = dyn Fn(Deferred<R>, &E) -> Result<(), ListenerError>;

/// A [`ListenerList`] whose listeners complete asynchronously.
///
/// Every listener is handed a fresh [`Deferred`] when an event fires. Firing returns as soon as
/// all listeners have been invoked; a task on the configured executor then waits for every
/// deferred. When all of them resolve, the success callback receives the resolved values in
/// firing order. When any of them is rejected (or dropped without being settled), the failure
/// callback receives the first rejection observed as [`Error::AsyncDispatch`].
///
/// Ordering, call budgets and synchronous failure handling are those of [`ListenerList`].
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use futures::executor::LocalPool;
/// use listeners::{AsyncListenerList, Deferred};
///
/// let mut pool = LocalPool::new();
/// let pending: Rc<RefCell<Option<Deferred<()>>>> = Rc::default();
///
/// let list = AsyncListenerList::<u32>::builder(pool.spawner())
///     .on_fire_success(|_| println!("all listeners finished"))
///     .build();
///
/// list.add_listener({
///     let pending = Rc::clone(&pending);
///     move |deferred, _event: &u32| {
///         // Finish the work later.
///         *pending.borrow_mut() = Some(deferred);
///         Ok(())
///     }
/// });
///
/// list.fire_event(1).unwrap();
/// pool.run_until_stalled();
///
/// pending.borrow_mut().take().unwrap().resolve(());
/// pool.run_until_stalled();
/// ```
pub struct AsyncListenerList<E, R = ()> {
    list: ListenerList<E, (), AsyncListener<E, R>>,
    callbacks: Rc<RefCell<AsyncCallbacks<R>>>,
    spawner: Rc<dyn LocalSpawn>,
}

struct AsyncCallbacks<R> {
    on_fire_success: Option<SuccessCallback<R>>,
    on_fire_failure: Option<FailureCallback>,
}

impl<R> Default for AsyncCallbacks<R> {
    fn default() -> Self {
        Self {
            on_fire_success: None,
            on_fire_failure: None,
        }
    }
}

impl<E: 'static, R: 'static> AsyncListenerList<E, R> {
    /// Creates an empty list that awaits deferreds on `spawner`.
    #[must_use]
    pub fn new(spawner: impl LocalSpawn + 'static) -> Self {
        Self::builder(spawner).build()
    }

    /// Starts building a list that awaits deferreds on `spawner`.
    pub fn builder(spawner: impl LocalSpawn + 'static) -> AsyncListenerListBuilder<E, R> {
        AsyncListenerListBuilder {
            list: ListenerList::builder(),
            callbacks: AsyncCallbacks::default(),
            spawner: Rc::new(spawner),
        }
    }

    /// Registers a listener without a call limit.
    pub fn add_listener(
        &self,
        listener: impl Fn(Deferred<R>, &E) -> Result<(), ListenerError> + 'static,
    ) -> ListenerId {
        self.list.add_shared_listener(Rc::new(listener))
    }

    /// Registers a listener that is removed after its first invocation.
    pub fn add_one_time_listener(
        &self,
        listener: impl Fn(Deferred<R>, &E) -> Result<(), ListenerError> + 'static,
    ) -> ListenerId {
        self.list.add_shared_one_time_listener(Rc::new(listener))
    }

    /// Registers a listener that is removed after `calls` invocations,
    /// with `-1` meaning unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `calls` is neither `-1` nor positive.
    pub fn add_n_time_listener(
        &self,
        listener: impl Fn(Deferred<R>, &E) -> Result<(), ListenerError> + 'static,
        calls: i32,
    ) -> crate::Result<ListenerId> {
        self.list.add_shared_n_time_listener(Rc::new(listener), calls)
    }

    /// Registers a shared listener without a call limit.
    pub fn add_shared_listener(&self, listener: Rc<AsyncListener<E, R>>) -> ListenerId {
        self.list.add_shared_listener(listener)
    }

    /// Registers a shared listener that is removed after `calls` invocations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `calls` is neither `-1` nor positive.
    pub fn add_shared_n_time_listener(
        &self,
        listener: Rc<AsyncListener<E, R>>,
        calls: i32,
    ) -> crate::Result<ListenerId> {
        self.list.add_shared_n_time_listener(listener, calls)
    }

    /// Removes a registration. Returns `false` if it was not present.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.list.remove_listener(id)
    }

    /// Removes the registration at `index` (in registration order) and returns its identifier.
    pub fn remove_listener_at(&self, index: usize) -> Option<ListenerId> {
        self.list.remove_listener_at(index)
    }

    /// The identifiers of all registrations, in registration order.
    #[must_use]
    pub fn listeners(&self) -> Vec<ListenerId> {
        self.list.listeners()
    }

    /// Whether the registration is present in the list.
    #[must_use]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.list.contains(id)
    }

    /// The remaining call budget of a registration, or `None` if it is not present.
    #[must_use]
    pub fn remaining_calls(&self, id: ListenerId) -> Option<CallBudget> {
        self.list.remaining_calls(id)
    }

    /// The number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Replaces the callback invoked with the resolved values once every deferred resolves.
    pub fn set_on_fire_success(&self, callback: Option<SuccessCallback<R>>) {
        self.callbacks.borrow_mut().on_fire_success = callback;
    }

    /// Replaces the callback that receives synchronous and asynchronous fire pass failures.
    pub fn set_on_fire_failure(&self, callback: Option<FailureCallback>) {
        self.callbacks.borrow_mut().on_fire_failure = callback;
    }

    /// Replaces the callback invoked after a listener is added.
    pub fn set_on_listener_added(&self, callback: Option<ListenerCallback>) {
        self.list.set_on_listener_added(callback);
    }

    /// Replaces the callback invoked after a listener is removed.
    pub fn set_on_listener_removed(&self, callback: Option<ListenerCallback>) {
        self.list.set_on_listener_removed(callback);
    }

    /// Removes all listeners and clears all callbacks.
    ///
    /// Aggregations already in progress still complete. They invoke whichever callbacks are
    /// registered at the moment they settle.
    pub fn reset(&self) {
        self.list.reset();

        let cleared = mem::take(&mut *self.callbacks.borrow_mut());
        drop(cleared);
    }

    /// Fires `event`, handing every listener a fresh deferred.
    ///
    /// Returns once all listeners have been invoked. The outcome of the deferreds is delivered
    /// to the callbacks by a task spawned on the executor. If no failure callback is registered
    /// when a deferred is rejected, the failure is logged because no caller is left to receive it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] if a listener fails synchronously and no failure callback is
    /// registered, or [`Error::Spawn`] if the executor refuses the aggregation task.
    pub fn fire_event(&self, event: E) -> crate::Result<()> {
        let Some(aggregate) = self.start(event)? else {
            return Ok(());
        };

        self.spawner.spawn_local(async move {
            if let Err(error) = aggregate.await {
                error!(
                    ?error,
                    "asynchronous fire pass failed with no failure callback registered"
                );
            }
        })?;

        Ok(())
    }

    /// Fires `event` and returns a future that completes once every deferred has settled.
    ///
    /// Listeners are invoked immediately, before the returned future is first polled. The future
    /// invokes the callbacks exactly like the aggregation task of [`fire_event()`][1] would.
    ///
    /// The future yields an error only if the fire pass failed and no failure callback is
    /// registered.
    ///
    /// [1]: Self::fire_event
    pub fn fire_event_async(
        &self,
        event: E,
    ) -> impl Future<Output = crate::Result<()>> + use<E, R> {
        let started = self.start(event);

        async move {
            match started? {
                Some(aggregate) => aggregate.await,
                None => Ok(()),
            }
        }
    }

    /// Invokes all listeners and returns the future that aggregates their deferreds.
    ///
    /// Returns `None` if a listener failed synchronously and the failure was routed to
    /// the failure callback.
    fn start(
        &self,
        event: E,
    ) -> crate::Result<Option<impl Future<Output = crate::Result<()>> + use<E, R>>> {
        let mut promises = Vec::with_capacity(self.list.len());

        let dispatched = self.list.fire_event_with(
            event,
            |listener, event, _, _| {
                let (deferred, promise) = Deferred::new();
                promises.push(promise);
                listener(deferred, event)
            },
            None,
        );

        if let Err(error) = dispatched {
            return route_failure(&self.callbacks, error).map(|()| None);
        }

        let callbacks = Rc::clone(&self.callbacks);

        Ok(Some(async move {
            match when_all(promises).await {
                Ok(values) => {
                    let on_success = callbacks.borrow().on_fire_success.clone();

                    if let Some(on_success) = on_success {
                        on_success(values);
                    }

                    Ok(())
                }
                Err(reason) => route_failure(&callbacks, Error::AsyncDispatch(reason)),
            }
        }))
    }
}

fn route_failure<R>(callbacks: &RefCell<AsyncCallbacks<R>>, error: Error) -> crate::Result<()> {
    let on_failure = callbacks.borrow().on_fire_failure.clone();

    match on_failure {
        Some(on_failure) => {
            on_failure(error);
            Ok(())
        }
        None => Err(error),
    }
}

impl<E: 'static, R: 'static> Dispatcher<E> for AsyncListenerList<E, R> {
    type Listener = AsyncListener<E, R>;
    type Output = R;

    fn add_shared_listener(&self, listener: Rc<Self::Listener>) -> ListenerId {
        Self::add_shared_listener(self, listener)
    }

    fn add_shared_n_time_listener(
        &self,
        listener: Rc<Self::Listener>,
        calls: i32,
    ) -> crate::Result<ListenerId> {
        Self::add_shared_n_time_listener(self, listener, calls)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        Self::remove_listener(self, id)
    }

    fn invoke_listener(&self, listener: &Self::Listener, event: &E) -> crate::Result<()> {
        let (deferred, promise) = Deferred::new();

        if let Err(source) = listener(deferred, event) {
            return route_failure(&self.callbacks, Error::Dispatch(source));
        }

        let callbacks = Rc::clone(&self.callbacks);

        self.spawner.spawn_local(async move {
            let Err(reason) = promise.await else {
                return;
            };

            if let Err(error) = route_failure(&callbacks, Error::AsyncDispatch(reason)) {
                error!(
                    ?error,
                    "asynchronous listener failed with no failure callback registered"
                );
            }
        })?;

        Ok(())
    }

    fn fire_event(&self, event: E) -> crate::Result<()> {
        Self::fire_event(self, event)
    }

    fn set_on_fire_success(&self, callback: Option<SuccessCallback<R>>) {
        Self::set_on_fire_success(self, callback);
    }

    fn set_on_fire_failure(&self, callback: Option<FailureCallback>) {
        Self::set_on_fire_failure(self, callback);
    }

    fn listener_count(&self) -> usize {
        self.len()
    }

    fn reset(&self) {
        Self::reset(self);
    }
}

impl<E, R> Clone for AsyncListenerList<E, R> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            callbacks: Rc::clone(&self.callbacks),
            spawner: Rc::clone(&self.spawner),
        }
    }
}

impl<E, R> fmt::Debug for AsyncListenerList<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

/// Builder for creating an instance of [`AsyncListenerList`] with callbacks.
#[must_use]
pub struct AsyncListenerListBuilder<E, R = ()> {
    list: ListenerListBuilder<E, (), AsyncListener<E, R>>,
    callbacks: AsyncCallbacks<R>,
    spawner: Rc<dyn LocalSpawn>,
}

impl<E, R> AsyncListenerListBuilder<E, R> {
    /// Sets the callback invoked with the resolved values once every deferred resolves.
    pub fn on_fire_success(mut self, callback: impl Fn(Vec<R>) + 'static) -> Self {
        self.callbacks.on_fire_success = Some(Rc::new(callback));
        self
    }

    /// Sets the callback that receives synchronous and asynchronous fire pass failures.
    pub fn on_fire_failure(mut self, callback: impl Fn(Error) + 'static) -> Self {
        self.callbacks.on_fire_failure = Some(Rc::new(callback));
        self
    }

    /// Sets the callback invoked after a listener is added.
    pub fn on_listener_added(mut self, callback: impl Fn(ListenerId) + 'static) -> Self {
        self.list = self.list.on_listener_added(callback);
        self
    }

    /// Sets the callback invoked after a listener is removed.
    pub fn on_listener_removed(mut self, callback: impl Fn(ListenerId) + 'static) -> Self {
        self.list = self.list.on_listener_removed(callback);
        self
    }

    /// Builds the list with the configured callbacks.
    #[must_use]
    pub fn build(self) -> AsyncListenerList<E, R> {
        AsyncListenerList {
            list: self.list.build(),
            callbacks: Rc::new(RefCell::new(self.callbacks)),
            spawner: self.spawner,
        }
    }
}

impl<E, R> fmt::Debug for AsyncListenerListBuilder<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("list", &self.list)
            .field("on_fire_success", &self.callbacks.on_fire_success.is_some())
            .field("on_fire_failure", &self.callbacks.on_fire_failure.is_some())
            .finish_non_exhaustive()
    }
}
