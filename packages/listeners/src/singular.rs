use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{Dispatcher, Error, ListenerId};

/// An event that fires at most once.
///
/// Before the event fires, listeners are registered with the dispatcher as usual. Firing caches
/// the event and dispatches it to those listeners. From then on, the handler is resolved: firing
/// again fails with [`Error::IllegalState`] and any listener added later is invoked immediately
/// with the cached event instead of being registered.
///
/// [`reset()`][Self::reset] returns the handler to the unresolved state.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use listeners::{Listener, ListenerList, SingularEventHandler};
///
/// let handler = SingularEventHandler::new(ListenerList::<String>::new());
/// handler.fire_event("ready".to_string()).unwrap();
///
/// let received = Rc::new(RefCell::new(None));
/// let late: Rc<Listener<String>> = Rc::new({
///     let received = Rc::clone(&received);
///     move |event: &String| {
///         *received.borrow_mut() = Some(event.clone());
///         Ok(())
///     }
/// });
///
/// // Invoked on the spot and never registered.
/// assert_eq!(handler.add_listener(late).unwrap(), None);
/// assert_eq!(received.borrow().as_deref(), Some("ready"));
/// assert!(handler.dispatcher().is_empty());
/// ```
pub struct SingularEventHandler<E, D> {
    dispatcher: D,
    resolved_with: RefCell<Option<E>>,
}

impl<E: Clone, D: Dispatcher<E>> SingularEventHandler<E, D> {
    /// Creates an unresolved handler in front of `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            resolved_with: RefCell::new(None),
        }
    }

    /// The dispatcher that holds the listeners registered before the event fired.
    #[must_use]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Registers a listener for the event, or invokes it right away if the event already fired.
    ///
    /// Returns the registration identifier, or `None` if the listener was invoked immediately.
    ///
    /// # Errors
    ///
    /// Returns the failure of an immediately invoked listener if the dispatcher has no failure
    /// callback to route it to.
    pub fn add_listener(&self, listener: Rc<D::Listener>) -> crate::Result<Option<ListenerId>> {
        // Cloned so that the listener may use the handler, including resetting it.
        let resolved_with = self.resolved_with.borrow().clone();

        match resolved_with {
            Some(event) => {
                self.dispatcher.invoke_listener(&*listener, &event)?;
                Ok(None)
            }
            None => Ok(Some(self.dispatcher.add_shared_listener(listener))),
        }
    }

    /// Removes a listener registered before the event fired. Returns `false` if not present.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    /// Resolves the handler with `event` and dispatches it to the registered listeners.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the handler is already resolved, or the dispatch
    /// failure if the dispatcher has no failure callback to route it to. The handler stays
    /// resolved even if dispatch fails.
    pub fn fire_event(&self, event: E) -> crate::Result<()> {
        {
            let mut resolved_with = self.resolved_with.borrow_mut();

            if resolved_with.is_some() {
                return Err(Error::IllegalState {
                    message: "cannot resolve more than once",
                });
            }

            *resolved_with = Some(event.clone());
        }

        self.dispatcher.fire_event(event)
    }

    /// Whether the event has fired.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_with.borrow().is_some()
    }

    /// The event the handler was resolved with, if it has fired.
    #[must_use]
    pub fn resolved_event(&self) -> Option<E> {
        self.resolved_with.borrow().clone()
    }

    /// Returns to the unresolved state, forgetting the cached event and resetting the dispatcher.
    pub fn reset(&self) {
        let forgotten = self.resolved_with.borrow_mut().take();
        drop(forgotten);

        self.dispatcher.reset();
    }
}

impl<E, D: fmt::Debug> fmt::Debug for SingularEventHandler<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = self
            .resolved_with
            .try_borrow()
            .ok()
            .map(|resolved_with| resolved_with.is_some());

        f.debug_struct(type_name::<Self>())
            .field("dispatcher", &self.dispatcher)
            .field("resolved", &resolved)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use futures::executor::LocalPool;
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::{AsyncListener, AsyncListenerList, Deferred, Listener, ListenerList};

    assert_not_impl_any!(SingularEventHandler<u32, ListenerList<u32>>: Send, Sync);

    fn counting_listener(calls: &Rc<RefCell<Vec<String>>>) -> Rc<Listener<String>> {
        let calls = Rc::clone(calls);
        Rc::new(move |event: &String| {
            calls.borrow_mut().push(event.clone());
            Ok(())
        })
    }

    #[test]
    fn early_listeners_receive_event() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let handler = SingularEventHandler::new(ListenerList::<String>::new());

        let id = handler.add_listener(counting_listener(&calls)).unwrap();
        assert!(id.is_some());
        assert!(!handler.is_resolved());

        handler.fire_event("x".to_string()).unwrap();

        assert_eq!(*calls.borrow(), vec!["x"]);
        assert!(handler.is_resolved());
        assert_eq!(handler.resolved_event().as_deref(), Some("x"));
    }

    #[test]
    fn second_fire_is_illegal() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let handler = SingularEventHandler::new(ListenerList::<String>::new());
        handler.add_listener(counting_listener(&calls)).unwrap();

        handler.fire_event("first".to_string()).unwrap();
        let result = handler.fire_event("second".to_string());

        assert!(matches!(result, Err(Error::IllegalState { .. })));
        assert_eq!(*calls.borrow(), vec!["first"]);
        assert_eq!(handler.resolved_event().as_deref(), Some("first"));
    }

    #[test]
    fn late_listener_is_invoked_once_and_not_registered() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let list = ListenerList::<String>::new();
        let handler = SingularEventHandler::new(list.clone());

        handler.fire_event("x".to_string()).unwrap();
        let id = handler.add_listener(counting_listener(&calls)).unwrap();

        assert_eq!(id, None);
        assert_eq!(*calls.borrow(), vec!["x"]);
        assert!(list.is_empty());

        // Nothing can fire again, so the late listener is never called a second time.
        assert!(handler.fire_event("y".to_string()).is_err());
        assert_eq!(*calls.borrow(), vec!["x"]);
    }

    #[test]
    fn late_listener_failure_is_returned() {
        let handler = SingularEventHandler::new(ListenerList::<String>::new());
        handler.fire_event("x".to_string()).unwrap();

        let failing: Rc<Listener<String>> = Rc::new(|_: &String| Err("late failure".into()));
        let result = handler.add_listener(failing);

        assert!(matches!(result, Err(Error::Dispatch(_))));
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let handler = SingularEventHandler::new(ListenerList::<String>::new());

        let id = handler
            .add_listener(counting_listener(&calls))
            .unwrap()
            .unwrap();
        assert!(handler.remove_listener(id));

        handler.fire_event("x".to_string()).unwrap();

        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn reset_allows_firing_again() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let handler = SingularEventHandler::new(ListenerList::<String>::new());
        handler.add_listener(counting_listener(&calls)).unwrap();

        handler.fire_event("first".to_string()).unwrap();
        handler.reset();

        assert!(!handler.is_resolved());
        assert_eq!(handler.resolved_event(), None);
        assert!(handler.dispatcher().is_empty());

        handler.add_listener(counting_listener(&calls)).unwrap();
        handler.fire_event("second".to_string()).unwrap();

        assert_eq!(*calls.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn works_with_async_dispatch() {
        let mut pool = LocalPool::new();
        let resolved = Rc::new(Cell::new(0));
        let list = AsyncListenerList::<u32, u32>::builder(pool.spawner())
            .on_fire_success({
                let resolved = Rc::clone(&resolved);
                move |values| resolved.set(resolved.get() + values.len())
            })
            .build();
        let handler = SingularEventHandler::new(list);

        let early: Rc<AsyncListener<u32, u32>> = Rc::new(|deferred: Deferred<u32>, event: &u32| {
            deferred.resolve(*event);
            Ok(())
        });
        handler.add_listener(Rc::clone(&early)).unwrap();

        handler.fire_event(5).unwrap();
        pool.run_until_stalled();
        assert_eq!(resolved.get(), 1);

        // The late listener is invoked immediately; it is not part of any fire pass.
        let late_called = Rc::new(Cell::new(false));
        let late: Rc<AsyncListener<u32, u32>> = Rc::new({
            let late_called = Rc::clone(&late_called);
            move |deferred: Deferred<u32>, event: &u32| {
                assert_eq!(*event, 5);
                late_called.set(true);
                deferred.resolve(*event);
                Ok(())
            }
        });
        assert_eq!(handler.add_listener(late).unwrap(), None);
        assert!(late_called.get());

        pool.run_until_stalled();
        assert_eq!(resolved.get(), 1);
    }
}
