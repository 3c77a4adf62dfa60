//! Ordered listener lists with per-listener call budgets.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{
    CallBudget, DoneCallback, Dispatcher, Error, FailureCallback, ListenerCallback, ListenerError,
    ListenerId, SuccessCallback,
};

/// The default listener type: receives the event and returns a result or a failure.
pub type Listener<E, R = ()> = dyn Fn(&E) -> Result<R, ListenerError>;

/// An ordered list of listeners that are invoked when an event is fired.
///
/// Listeners are kept in registration order and fired in reverse registration order, so the
/// most recently added listener is invoked first. Each listener has a [`CallBudget`]; a listener
/// whose budget runs out is removed right after the call that exhausted it.
///
/// The list is a cheap handle to shared state: cloning it yields another handle to the same
/// listeners. Listeners may add or remove listeners (including themselves) and fire nested
/// events while a fire pass is in progress. A fire pass invokes each registration present when
/// it started at most once:
///
/// * Listeners added during a pass are not invoked by it; they wait for the next pass.
/// * Listeners removed during a pass before their turn came are skipped.
/// * A listener whose budget ran out is not invoked again by nested passes, even before it is
///   removed.
///
/// `F` is the stored listener type. The default [`Listener<E, R>`] supports [`fire_event()`][1];
/// other listener types are fired via [`fire_event_with()`][2] and a custom caller.
///
/// # Callbacks
///
/// * `on_fire_success` - receives one result per invoked listener after a fire pass.
/// * `on_fire_failure` - receives the failure that halted a fire pass. If this is not set,
///   the failure is returned to the caller of the fire method instead.
/// * `on_listener_added` / `on_listener_removed` - observe the membership of the list.
///
/// # Example
///
/// ```
/// use listeners::ListenerList;
///
/// let list = ListenerList::<u32, u32>::builder()
///     .on_fire_success(|results| assert_eq!(results, vec![20, 10]))
///     .build();
///
/// list.add_listener(|value: &u32| Ok(value * 10));
/// list.add_listener(|value: &u32| Ok(value * 20));
///
/// list.fire_event(1).unwrap();
/// ```
///
/// [1]: ListenerList::fire_event
/// [2]: ListenerList::fire_event_with
pub struct ListenerList<E, R = (), F: ?Sized = Listener<E, R>> {
    state: Rc<RefCell<ListState<R, F>>>,

    _event: PhantomData<fn(&E)>,
}

struct ListState<R, F: ?Sized> {
    entries: Vec<Entry<F>>,
    callbacks: Callbacks<R>,
}

struct Entry<F: ?Sized> {
    id: ListenerId,
    listener: Rc<F>,
    budget: CallBudget,

    // Set once the budget is exhausted. The entry is removed after the exhausting call returns
    // and must not be invoked by any nested fire pass in the meantime.
    spent: bool,
}

pub(crate) struct Callbacks<R> {
    pub(crate) on_fire_success: Option<SuccessCallback<R>>,
    pub(crate) on_fire_failure: Option<FailureCallback>,
    pub(crate) on_listener_added: Option<ListenerCallback>,
    pub(crate) on_listener_removed: Option<ListenerCallback>,
}

impl<R> Default for Callbacks<R> {
    fn default() -> Self {
        Self {
            on_fire_success: None,
            on_fire_failure: None,
            on_listener_added: None,
            on_listener_removed: None,
        }
    }
}

impl<E, R, F: ?Sized> ListenerList<E, R, F> {
    /// Creates an empty list without any callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::from_callbacks(Callbacks::default())
    }

    /// Starts building a list with callbacks configured up front.
    pub fn builder() -> ListenerListBuilder<E, R, F> {
        ListenerListBuilder::new()
    }

    fn from_callbacks(callbacks: Callbacks<R>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ListState {
                entries: Vec::new(),
                callbacks,
            })),
            _event: PhantomData,
        }
    }

    /// Registers a shared listener without a call limit.
    pub fn add_shared_listener(&self, listener: Rc<F>) -> ListenerId {
        self.push(listener, CallBudget::Unlimited)
    }

    /// Registers a shared listener that is removed after its first invocation.
    pub fn add_shared_one_time_listener(&self, listener: Rc<F>) -> ListenerId {
        self.push(listener, CallBudget::ONCE)
    }

    /// Registers a shared listener that is removed after `calls` invocations,
    /// with `-1` meaning unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `calls` is neither `-1` nor positive.
    pub fn add_shared_n_time_listener(
        &self,
        listener: Rc<F>,
        calls: i32,
    ) -> crate::Result<ListenerId> {
        let budget = CallBudget::from_calls(calls)?;
        Ok(self.push(listener, budget))
    }

    fn push(&self, listener: Rc<F>, budget: CallBudget) -> ListenerId {
        let id = ListenerId::next();

        let on_added = {
            let mut state = self.state.borrow_mut();
            state.entries.push(Entry {
                id,
                listener,
                budget,
                spent: false,
            });
            state.callbacks.on_listener_added.clone()
        };

        if let Some(on_added) = on_added {
            on_added(id);
        }

        id
    }

    /// Removes a registration. Returns `false` (without invoking any callback) if the
    /// registration is not present.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let index = self
            .state
            .borrow()
            .entries
            .iter()
            .position(|entry| entry.id == id);

        index.and_then(|index| self.remove_listener_at(index)).is_some()
    }

    /// Removes the registration at `index` (in registration order) and returns its identifier.
    ///
    /// Returns `None` (without invoking any callback) if `index` is out of bounds.
    pub fn remove_listener_at(&self, index: usize) -> Option<ListenerId> {
        let (entry, on_removed) = {
            let mut state = self.state.borrow_mut();

            if index >= state.entries.len() {
                return None;
            }

            (
                state.entries.remove(index),
                state.callbacks.on_listener_removed.clone(),
            )
        };

        let id = entry.id;
        drop(entry);

        if let Some(on_removed) = on_removed {
            on_removed(id);
        }

        Some(id)
    }

    /// The identifiers of all registrations, in registration order.
    #[must_use]
    pub fn listeners(&self) -> Vec<ListenerId> {
        self.state
            .borrow()
            .entries
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    /// Whether the registration is present in the list.
    #[must_use]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.state
            .borrow()
            .entries
            .iter()
            .any(|entry| entry.id == id)
    }

    /// The remaining call budget of a registration, or `None` if it is not present.
    #[must_use]
    pub fn remaining_calls(&self, id: ListenerId) -> Option<CallBudget> {
        self.state
            .borrow()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.budget)
    }

    /// The number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    /// Whether no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    /// Replaces the callback invoked with the listener results after a successful fire pass.
    pub fn set_on_fire_success(&self, callback: Option<SuccessCallback<R>>) {
        self.state.borrow_mut().callbacks.on_fire_success = callback;
    }

    /// Replaces the callback that receives fire pass failures.
    pub fn set_on_fire_failure(&self, callback: Option<FailureCallback>) {
        self.state.borrow_mut().callbacks.on_fire_failure = callback;
    }

    /// Replaces the callback invoked after a listener is added.
    pub fn set_on_listener_added(&self, callback: Option<ListenerCallback>) {
        self.state.borrow_mut().callbacks.on_listener_added = callback;
    }

    /// Replaces the callback invoked after a listener is removed.
    pub fn set_on_listener_removed(&self, callback: Option<ListenerCallback>) {
        self.state.borrow_mut().callbacks.on_listener_removed = callback;
    }

    /// Removes all listeners and clears all four callbacks.
    ///
    /// The removal callback is not invoked for the cleared listeners.
    pub fn reset(&self) {
        // Dropping listeners may run arbitrary code, so do it outside the borrow.
        let cleared = {
            let mut state = self.state.borrow_mut();
            let entries = mem::take(&mut state.entries);
            let callbacks = mem::take(&mut state.callbacks);
            (entries, callbacks)
        };

        drop(cleared);
    }

    /// Fires `event` using a custom calling convention.
    ///
    /// For every listener registered when the pass starts, in reverse registration order, `caller`
    /// is invoked with the listener, the event, the index of the listener at the start of the pass
    /// and the number of listeners at the start of the pass.
    /// The call budget of the listener is consumed before the call and a listener whose budget is
    /// exhausted is removed after the call, whether or not the call succeeded.
    ///
    /// If `caller` fails, the pass halts immediately and the failure is wrapped in
    /// [`Error::Dispatch`]. After a successful pass, `done` receives the event back if supplied;
    /// otherwise the success callback receives the collected results.
    ///
    /// # Errors
    ///
    /// Returns the dispatch failure if no failure callback is registered.
    pub fn fire_event_with<C>(
        &self,
        event: E,
        mut caller: C,
        done: Option<DoneCallback<E>>,
    ) -> crate::Result<()>
    where
        C: FnMut(&F, &E, usize, usize) -> Result<R, ListenerError>,
    {
        // The pass visits the registrations present when it starts. Listeners may reshape the
        // list during the pass, so each registration is looked up by identifier when its turn
        // comes and skipped if it is gone by then.
        let snapshot = self.listeners();
        let total = snapshot.len();
        trace!(listeners = total, "firing event");

        let mut results = Vec::with_capacity(total);

        for (index, &id) in snapshot.iter().enumerate().rev() {
            let Some((listener, exhausted)) = self.begin_call(id) else {
                continue;
            };

            let outcome = caller(&*listener, &event, index, total);

            if exhausted {
                debug!(%id, "removing listener with exhausted call budget");
                self.remove_listener(id);
            }

            match outcome {
                Ok(result) => results.push(result),
                Err(source) => return self.fail(Error::Dispatch(source)),
            }
        }

        if let Some(done) = done {
            done(event);
        } else {
            let on_success = self.state.borrow().callbacks.on_fire_success.clone();

            if let Some(on_success) = on_success {
                on_success(results);
            }
        }

        Ok(())
    }

    /// Consumes one call from the budget of the registration `id`, if it is still present and
    /// callable.
    fn begin_call(&self, id: ListenerId) -> Option<(Rc<F>, bool)> {
        let mut state = self.state.borrow_mut();
        let entry = state.entries.iter_mut().find(|entry| entry.id == id)?;

        if entry.spent {
            return None;
        }

        let exhausted = entry.budget.consume();
        entry.spent = exhausted;

        Some((Rc::clone(&entry.listener), exhausted))
    }

    /// Routes a failure to the failure callback, or hands it back if there is none.
    pub(crate) fn fail(&self, error: Error) -> crate::Result<()> {
        let on_failure = self.state.borrow().callbacks.on_fire_failure.clone();

        match on_failure {
            Some(on_failure) => {
                on_failure(error);
                Ok(())
            }
            None => Err(error),
        }
    }
}

impl<E: 'static, R: 'static> ListenerList<E, R> {
    /// Registers a listener without a call limit.
    pub fn add_listener(
        &self,
        listener: impl Fn(&E) -> Result<R, ListenerError> + 'static,
    ) -> ListenerId {
        self.add_shared_listener(Rc::new(listener))
    }

    /// Registers a listener that is removed after its first invocation.
    pub fn add_one_time_listener(
        &self,
        listener: impl Fn(&E) -> Result<R, ListenerError> + 'static,
    ) -> ListenerId {
        self.add_shared_one_time_listener(Rc::new(listener))
    }

    /// Registers a listener that is removed after `calls` invocations,
    /// with `-1` meaning unlimited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `calls` is neither `-1` nor positive.
    pub fn add_n_time_listener(
        &self,
        listener: impl Fn(&E) -> Result<R, ListenerError> + 'static,
        calls: i32,
    ) -> crate::Result<ListenerId> {
        self.add_shared_n_time_listener(Rc::new(listener), calls)
    }

    /// Fires `event`, invoking every listener with a reference to it.
    ///
    /// See [`fire_event_with()`][Self::fire_event_with] for ordering, budget and failure rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] if a listener fails and no failure callback is registered.
    pub fn fire_event(&self, event: E) -> crate::Result<()> {
        self.fire_event_with(event, |listener, event, _, _| listener(event), None)
    }
}

impl<E: 'static, R: 'static> Dispatcher<E> for ListenerList<E, R> {
    type Listener = Listener<E, R>;
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
        match listener(event) {
            Ok(_) => Ok(()),
            Err(source) => self.fail(Error::Dispatch(source)),
        }
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

impl<E, R, F: ?Sized> Clone for ListenerList<E, R, F> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            _event: PhantomData,
        }
    }
}

impl<E, R, F: ?Sized> Default for ListenerList<E, R, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R, F: ?Sized> fmt::Debug for ListenerList<E, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.try_listener_count();

        f.debug_struct(type_name::<Self>())
            .field("listeners", &listeners)
            .finish_non_exhaustive()
    }
}

impl<E, R, F: ?Sized> ListenerList<E, R, F> {
    // Debug output must not panic if a listener formats the list mid-mutation.
    fn try_listener_count(&self) -> Option<usize> {
        self.state.try_borrow().ok().map(|state| state.entries.len())
    }
}

/// Builder for creating an instance of [`ListenerList`] with callbacks.
///
/// # Example
///
/// ```
/// use listeners::ListenerList;
///
/// let list = ListenerList::<String>::builder()
///     .on_fire_failure(|error| eprintln!("listener failed: {error}"))
///     .build();
/// ```
#[must_use]
pub struct ListenerListBuilder<E, R = (), F: ?Sized = Listener<E, R>> {
    callbacks: Callbacks<R>,

    _list: PhantomData<fn() -> ListenerList<E, R, F>>,
}

impl<E, R, F: ?Sized> ListenerListBuilder<E, R, F> {
    fn new() -> Self {
        Self {
            callbacks: Callbacks::default(),
            _list: PhantomData,
        }
    }

    /// Sets the callback invoked with the listener results after a successful fire pass.
    pub fn on_fire_success(mut self, callback: impl Fn(Vec<R>) + 'static) -> Self {
        self.callbacks.on_fire_success = Some(Rc::new(callback));
        self
    }

    /// Sets the callback that receives fire pass failures instead of the caller.
    pub fn on_fire_failure(mut self, callback: impl Fn(Error) + 'static) -> Self {
        self.callbacks.on_fire_failure = Some(Rc::new(callback));
        self
    }

    /// Sets the callback invoked after a listener is added.
    pub fn on_listener_added(mut self, callback: impl Fn(ListenerId) + 'static) -> Self {
        self.callbacks.on_listener_added = Some(Rc::new(callback));
        self
    }

    /// Sets the callback invoked after a listener is removed.
    pub fn on_listener_removed(mut self, callback: impl Fn(ListenerId) + 'static) -> Self {
        self.callbacks.on_listener_removed = Some(Rc::new(callback));
        self
    }

    /// Builds the list with the configured callbacks.
    #[must_use]
    pub fn build(self) -> ListenerList<E, R, F> {
        ListenerList::from_callbacks(self.callbacks)
    }
}

impl<E, R, F: ?Sized> fmt::Debug for ListenerListBuilder<E, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("on_fire_success", &self.callbacks.on_fire_success.is_some())
            .field("on_fire_failure", &self.callbacks.on_fire_failure.is_some())
            .field("on_listener_added", &self.callbacks.on_listener_added.is_some())
            .field(
                "on_listener_removed",
                &self.callbacks.on_listener_removed.is_some(),
            )
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(ListenerList<u32>: Send, Sync);

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn named(
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn(&u32) -> Result<(), ListenerError> + 'static {
        let log = Rc::clone(log);
        move |_| {
            log.borrow_mut().push(name);
            Ok(())
        }
    }

    #[test]
    fn fires_in_reverse_registration_order() {
        let log = recorder();
        let list = ListenerList::<u32>::new();

        list.add_listener(named(&log, "a"));
        list.add_listener(named(&log, "b"));
        list.add_listener(named(&log, "c"));

        list.fire_event(0).unwrap();

        assert_eq!(*log.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn one_time_listener_fires_once() {
        let calls = Rc::new(Cell::new(0));
        let list = ListenerList::<u32>::new();

        list.add_one_time_listener({
            let calls = Rc::clone(&calls);
            move |value| {
                assert_eq!(*value, 42);
                calls.set(calls.get() + 1);
                Ok(())
            }
        });

        list.fire_event(42).unwrap();
        list.fire_event(42).unwrap();

        assert_eq!(calls.get(), 1);
        assert!(list.listeners().is_empty());
    }

    #[test]
    fn n_time_listener_fires_n_times() {
        for n in 1..=5 {
            let calls = Rc::new(Cell::new(0));
            let list = ListenerList::<u32>::new();

            let id = list
                .add_n_time_listener(
                    {
                        let calls = Rc::clone(&calls);
                        move |_| {
                            calls.set(calls.get() + 1);
                            Ok(())
                        }
                    },
                    n,
                )
                .unwrap();

            for _ in 0..n {
                assert!(list.contains(id));
                list.fire_event(1).unwrap();
            }

            assert_eq!(calls.get(), n);
            assert!(!list.contains(id));

            list.fire_event(1).unwrap();
            assert_eq!(calls.get(), n);
        }
    }

    #[test]
    fn remaining_calls_count_down() {
        let list = ListenerList::<u32>::new();
        let id = list.add_n_time_listener(|_| Ok(()), 3).unwrap();

        assert_eq!(list.remaining_calls(id).map(CallBudget::as_calls), Some(3));
        list.fire_event(0).unwrap();
        assert_eq!(list.remaining_calls(id).map(CallBudget::as_calls), Some(2));
    }

    #[test]
    fn invalid_call_count_is_rejected() {
        let list = ListenerList::<u32>::new();

        let result = list.add_n_time_listener(|_| Ok(()), 0);

        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        assert!(list.is_empty());
    }

    #[test]
    fn add_then_remove_restores_listeners() {
        let list = ListenerList::<u32>::new();
        list.add_listener(|_| Ok(()));
        let before = list.listeners();

        let id = list.add_listener(|_| Ok(()));
        assert!(list.remove_listener(id));

        assert_eq!(list.listeners(), before);
    }

    #[test]
    fn removing_missing_listener_is_noop() {
        let removed = Rc::new(Cell::new(0));
        let list = ListenerList::<u32>::builder()
            .on_listener_removed({
                let removed = Rc::clone(&removed);
                move |_| removed.set(removed.get() + 1)
            })
            .build();

        let id = list.add_listener(|_| Ok(()));
        assert!(list.remove_listener(id));
        assert_eq!(removed.get(), 1);

        assert!(!list.remove_listener(id));
        assert_eq!(list.remove_listener_at(0), None);
        assert_eq!(list.remove_listener_at(100), None);
        assert_eq!(removed.get(), 1);
    }

    #[test]
    fn remove_at_reports_removed_listener() {
        let list = ListenerList::<u32>::new();
        let first = list.add_listener(|_| Ok(()));
        let second = list.add_listener(|_| Ok(()));

        assert_eq!(list.remove_listener_at(0), Some(first));
        assert_eq!(list.listeners(), vec![second]);
    }

    #[test]
    fn same_shared_listener_registers_twice() {
        let calls = Rc::new(Cell::new(0));
        let shared: Rc<Listener<u32>> = Rc::new({
            let calls = Rc::clone(&calls);
            move |_: &u32| {
                calls.set(calls.get() + 1);
                Ok(())
            }
        });

        let list = ListenerList::<u32>::new();
        let first = list.add_shared_listener(Rc::clone(&shared));
        let second = list.add_shared_listener(shared);
        assert_ne!(first, second);

        list.fire_event(0).unwrap();
        assert_eq!(calls.get(), 2);

        assert!(list.remove_listener(first));
        list.fire_event(0).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn added_callback_sees_identifier() {
        let added = Rc::new(RefCell::new(Vec::new()));
        let list = ListenerList::<u32>::builder()
            .on_listener_added({
                let added = Rc::clone(&added);
                move |id| added.borrow_mut().push(id)
            })
            .build();

        let id = list.add_listener(|_| Ok(()));

        assert_eq!(*added.borrow(), vec![id]);
    }

    #[test]
    fn success_callback_receives_results_in_firing_order() {
        let results = Rc::new(RefCell::new(Vec::new()));
        let list = ListenerList::<u32, u32>::builder()
            .on_fire_success({
                let results = Rc::clone(&results);
                move |values| results.borrow_mut().extend(values)
            })
            .build();

        list.add_listener(|value| Ok(value + 1));
        list.add_listener(|value| Ok(value + 2));

        list.fire_event(10).unwrap();

        assert_eq!(*results.borrow(), vec![12, 11]);
    }

    #[test]
    fn success_callback_fires_without_listeners() {
        let fired = Rc::new(Cell::new(false));
        let list = ListenerList::<u32>::builder()
            .on_fire_success({
                let fired = Rc::clone(&fired);
                move |results| {
                    assert!(results.is_empty());
                    fired.set(true);
                }
            })
            .build();

        list.fire_event(0).unwrap();

        assert!(fired.get());
    }

    #[test]
    fn failure_without_callback_is_returned_and_halts_pass() {
        let log = recorder();
        let list = ListenerList::<u32>::new();

        list.add_listener(named(&log, "a"));
        list.add_listener(|_| Err("boom".into()));
        list.add_listener(named(&log, "c"));

        let result = list.fire_event(0);

        assert!(matches!(result, Err(Error::Dispatch(_))));
        // "a" was registered before the failing listener so it never ran.
        assert_eq!(*log.borrow(), vec!["c"]);
    }

    #[test]
    fn failure_with_callback_is_routed() {
        let failures = Rc::new(RefCell::new(Vec::new()));
        let succeeded = Rc::new(Cell::new(false));

        let list = ListenerList::<u32>::builder()
            .on_fire_failure({
                let failures = Rc::clone(&failures);
                move |error| failures.borrow_mut().push(error.to_string())
            })
            .on_fire_success({
                let succeeded = Rc::clone(&succeeded);
                move |_| succeeded.set(true)
            })
            .build();

        list.add_listener(|_| Err("boom".into()));

        list.fire_event(0).unwrap();

        assert_eq!(failures.borrow().len(), 1);
        assert!(!succeeded.get());
    }

    #[test]
    fn failing_listener_budget_is_consumed() {
        let list = ListenerList::<u32>::builder().on_fire_failure(|_| {}).build();

        list.add_one_time_listener(|_| Err("boom".into()));

        list.fire_event(0).unwrap();

        assert!(list.is_empty());
    }

    #[test]
    fn listener_can_remove_itself() {
        let log = recorder();
        let list = ListenerList::<u32>::new();
        let own_id = Rc::new(Cell::new(None));

        list.add_listener(named(&log, "a"));
        let id = list.add_listener({
            let list = list.clone();
            let own_id = Rc::clone(&own_id);
            let log = Rc::clone(&log);
            move |_| {
                log.borrow_mut().push("b");
                list.remove_listener(own_id.get().unwrap());
                Ok(())
            }
        });
        own_id.set(Some(id));
        list.add_listener(named(&log, "c"));

        list.fire_event(0).unwrap();
        list.fire_event(0).unwrap();

        assert_eq!(*log.borrow(), vec!["c", "b", "a", "c", "a"]);
        list.reset();
    }

    #[test]
    fn listener_added_during_pass_waits_for_next_pass() {
        let log = recorder();
        let list = ListenerList::<u32>::new();

        list.add_one_time_listener({
            let list = list.clone();
            let log = Rc::clone(&log);
            move |_| {
                log.borrow_mut().push("adder");
                list.add_listener(named(&log, "late"));
                Ok(())
            }
        });

        list.fire_event(0).unwrap();
        assert_eq!(*log.borrow(), vec!["adder"]);

        list.fire_event(0).unwrap();
        assert_eq!(*log.borrow(), vec!["adder", "late"]);
        list.reset();
    }

    #[test]
    fn nested_fire_does_not_reinvoke_exhausted_listener() {
        let calls = Rc::new(Cell::new(0));
        let list = ListenerList::<u32>::new();

        list.add_one_time_listener({
            let list = list.clone();
            let calls = Rc::clone(&calls);
            move |depth| {
                calls.set(calls.get() + 1);
                if *depth == 0 {
                    list.fire_event(1)?;
                }
                Ok(())
            }
        });

        list.fire_event(0).unwrap();

        assert_eq!(calls.get(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn nested_fire_removing_listener_does_not_repeat_outer_listener() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let list = ListenerList::<u32>::new();

        list.add_one_time_listener({
            let log = Rc::clone(&log);
            move |event| {
                log.borrow_mut().push(format!("once:{event}"));
                Ok(())
            }
        });
        list.add_listener({
            let list = list.clone();
            let log = Rc::clone(&log);
            move |event| {
                log.borrow_mut().push(format!("outer:{event}"));
                if *event == 0 {
                    list.fire_event(1)?;
                }
                Ok(())
            }
        });

        list.fire_event(0).unwrap();

        // The nested pass used up the one-time listener, so the outer pass skips it.
        assert_eq!(*log.borrow(), vec!["outer:0", "outer:1", "once:1"]);
        assert_eq!(list.len(), 1);
        list.reset();
    }

    #[test]
    fn listener_removed_before_its_turn_is_skipped() {
        let log = recorder();
        let list = ListenerList::<u32>::new();

        let a = list.add_listener(named(&log, "a"));
        list.add_listener({
            let list = list.clone();
            let log = Rc::clone(&log);
            move |_| {
                log.borrow_mut().push("b");
                list.remove_listener(a);
                Ok(())
            }
        });

        list.fire_event(0).unwrap();

        assert_eq!(*log.borrow(), vec!["b"]);
        assert!(!list.contains(a));
        list.reset();
    }

    #[test]
    fn custom_caller_receives_index_and_total() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let list = ListenerList::<u32>::new();
        list.add_listener(|_| Ok(()));
        list.add_listener(|_| Ok(()));

        list.fire_event_with(
            5,
            |listener, event, index, total| {
                seen.borrow_mut().push((index, total));
                listener(event)
            },
            None,
        )
        .unwrap();

        assert_eq!(*seen.borrow(), vec![(1, 2), (0, 2)]);
    }

    #[test]
    fn done_callback_replaces_success_callback() {
        let succeeded = Rc::new(Cell::new(false));
        let done_with = Rc::new(Cell::new(None));

        let list = ListenerList::<u32>::builder()
            .on_fire_success({
                let succeeded = Rc::clone(&succeeded);
                move |_| succeeded.set(true)
            })
            .build();
        list.add_listener(|_| Ok(()));

        list.fire_event_with(
            7,
            |listener, event, _, _| listener(event),
            Some(Box::new({
                let done_with = Rc::clone(&done_with);
                move |event: u32| done_with.set(Some(event))
            })),
        )
        .unwrap();

        assert_eq!(done_with.get(), Some(7));
        assert!(!succeeded.get());
    }

    #[test]
    fn reset_clears_listeners_and_callbacks() {
        let fired = Rc::new(Cell::new(false));
        let list = ListenerList::<u32>::builder()
            .on_fire_success({
                let fired = Rc::clone(&fired);
                move |_| fired.set(true)
            })
            .build();
        list.add_listener(|_| Err("boom".into()));

        list.reset();
        assert!(list.is_empty());

        list.fire_event(0).unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn clones_share_listeners() {
        let list = ListenerList::<u32>::new();
        let other = list.clone();

        other.add_listener(|_| Ok(()));

        assert_eq!(list.len(), 1);
    }

    #[test]
    fn dispatcher_invoke_routes_failure() {
        let failed = Rc::new(Cell::new(false));
        let list = ListenerList::<u32>::new();
        let listener: Rc<Listener<u32>> = Rc::new(|_: &u32| Err("boom".into()));

        assert!(matches!(
            <ListenerList<u32> as Dispatcher<u32>>::invoke_listener(&list, &*listener, &0),
            Err(Error::Dispatch(_))
        ));

        list.set_on_fire_failure(Some(Rc::new({
            let failed = Rc::clone(&failed);
            move |_: Error| failed.set(true)
        })));

        <ListenerList<u32> as Dispatcher<u32>>::invoke_listener(&list, &*listener, &0).unwrap();
        assert!(failed.get());
    }
}
