//! Buffered dispatch: events are queued first and fired on demand.

use std::any::type_name;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::{Dispatcher, Error, ListenerError};

/// Checks a queued event, rejecting it by returning an error.
pub type Validator<E> = Rc<dyn Fn(&E) -> Result<(), ListenerError>>;

/// A FIFO buffer of events in front of a [`Dispatcher`].
///
/// Queuing an event does not dispatch it. Events are dispatched one fire pass at a time, in the
/// order they were queued, when [`fire_existing_events()`][1] is called. Completion callbacks
/// handed to the flush are invoked once the buffer is empty and every dispatched event has
/// completed, which with an [`AsyncListenerList`][2] means after all deferreds have settled.
///
/// The queue takes over the success and failure callbacks of its dispatcher to track completion.
/// A failing event does not stop the flush; the failure is logged and the event counts as
/// completed.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use listeners::{EventQueue, ListenerList};
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let queue = EventQueue::new(ListenerList::<u32>::new());
/// queue.dispatcher().add_listener({
///     let seen = Rc::clone(&seen);
///     move |event: &u32| {
///         seen.borrow_mut().push(*event);
///         Ok(())
///     }
/// });
///
/// queue.queue_change_event(1).unwrap();
/// queue.queue_change_event(2).unwrap();
/// assert!(seen.borrow().is_empty());
///
/// queue.fire_existing_events().unwrap();
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// ```
///
/// [1]: EventQueue::fire_existing_events
/// [2]: crate::AsyncListenerList
pub struct EventQueue<E, D> {
    dispatcher: D,
    state: Rc<RefCell<QueueState<E>>>,
}

struct QueueState<E> {
    events: VecDeque<E>,

    // Events taken off the buffer whose fire pass has not yet reported completion.
    pending: usize,

    // Whether a drain loop is running further up the stack.
    draining: bool,

    // Completion callbacks waiting for the current flush to finish.
    waiting: Vec<Box<dyn FnOnce()>>,

    validator: Option<Validator<E>>,
}

impl<E: 'static, D: Dispatcher<E>> EventQueue<E, D> {
    /// Creates an empty queue in front of `dispatcher`, without a validator.
    #[must_use]
    pub fn new(dispatcher: D) -> Self {
        Self::builder(dispatcher).build()
    }

    /// Starts building a queue in front of `dispatcher`.
    pub fn builder(dispatcher: D) -> EventQueueBuilder<E, D> {
        EventQueueBuilder {
            dispatcher,
            validator: None,
        }
    }

    fn from_parts(dispatcher: D, validator: Option<Validator<E>>) -> Self {
        let queue = Self {
            dispatcher,
            state: Rc::new(RefCell::new(QueueState {
                events: VecDeque::new(),
                pending: 0,
                draining: false,
                waiting: Vec::new(),
                validator,
            })),
        };

        queue.install_completion_tracking();
        queue
    }

    fn install_completion_tracking(&self) {
        self.dispatcher.set_on_fire_success(Some(Rc::new({
            let state = Rc::clone(&self.state);
            move |_: Vec<D::Output>| complete_one(&state)
        })));

        self.dispatcher.set_on_fire_failure(Some(Rc::new({
            let state = Rc::clone(&self.state);
            move |error: Error| {
                warn!(?error, "queued event failed to dispatch");
                complete_one(&state);
            }
        })));
    }

    /// The dispatcher that receives the queued events, for registering listeners.
    #[must_use]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Appends `event` to the buffer without dispatching it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the validator rejects the event.
    pub fn queue_change_event(&self, event: E) -> crate::Result<()> {
        let validator = self.state.borrow().validator.clone();

        if let Some(validator) = validator {
            validator(&event)
                .map_err(|problem| Error::invalid_argument("event", problem.to_string()))?;
        }

        self.state.borrow_mut().events.push_back(event);
        Ok(())
    }

    /// Dispatches buffered events, one fire pass each, until the buffer is empty.
    ///
    /// Events queued by listeners during the flush are dispatched by the same flush. If a flush is
    /// already in progress further up the stack, this returns immediately and leaves the draining
    /// to it.
    ///
    /// # Errors
    ///
    /// Returns the error of a fire pass that could not report its outcome through the callbacks
    /// (for example [`Error::Spawn`]). Remaining events stay queued.
    pub fn fire_existing_events(&self) -> crate::Result<()> {
        self.flush(None)
    }

    /// Like [`fire_existing_events()`][Self::fire_existing_events], invoking `done` exactly once
    /// after the buffer is empty and every dispatched event has completed.
    ///
    /// If the buffer is already empty and nothing is in flight, `done` is invoked immediately.
    ///
    /// # Errors
    ///
    /// See [`fire_existing_events()`][Self::fire_existing_events]. On error, `done` is kept and
    /// invoked by a later flush that completes.
    pub fn fire_existing_events_then(&self, done: impl FnOnce() + 'static) -> crate::Result<()> {
        self.flush(Some(Box::new(done)))
    }

    /// Queues `event` and flushes the queue.
    ///
    /// # Errors
    ///
    /// Returns the error of [`queue_change_event()`][1] or [`fire_existing_events()`][2].
    ///
    /// [1]: Self::queue_change_event
    /// [2]: Self::fire_existing_events
    pub fn queue_and_fire_change_event(&self, event: E) -> crate::Result<()> {
        self.queue_change_event(event)?;
        self.fire_existing_events()
    }

    /// Queues `event` and flushes the queue, invoking `done` once the flush completes.
    ///
    /// # Errors
    ///
    /// Returns the error of [`queue_change_event()`][1] (in which case `done` is dropped
    /// without being invoked) or [`fire_existing_events_then()`][2].
    ///
    /// [1]: Self::queue_change_event
    /// [2]: Self::fire_existing_events_then
    pub fn queue_and_fire_change_event_then(
        &self,
        event: E,
        done: impl FnOnce() + 'static,
    ) -> crate::Result<()> {
        self.queue_change_event(event)?;
        self.fire_existing_events_then(done)
    }

    fn flush(&self, done: Option<Box<dyn FnOnce()>>) -> crate::Result<()> {
        {
            let mut state = self.state.borrow_mut();

            state.waiting.extend(done);

            if state.draining {
                return Ok(());
            }

            state.draining = true;
            trace!(queued = state.events.len(), "flushing event queue");
        }

        // The buffer length is re-checked on every iteration so that events queued by listeners
        // during this flush are drained too.
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let event = state.events.pop_front();

                if event.is_some() {
                    state.pending = state.pending.saturating_add(1);
                }

                event
            };

            let Some(event) = next else {
                break;
            };

            if let Err(error) = self.dispatcher.fire_event(event) {
                // The fire pass did not reach either callback, so account for it here.
                let mut state = self.state.borrow_mut();
                state.pending = state.pending.saturating_sub(1);
                state.draining = false;
                return Err(error);
            }
        }

        self.state.borrow_mut().draining = false;
        trace!("event queue drained");

        notify_if_idle(&self.state);
        Ok(())
    }

    /// Whether any events are waiting to be dispatched.
    #[must_use]
    pub fn has_queued_events(&self) -> bool {
        !self.state.borrow().events.is_empty()
    }

    /// The number of events waiting to be dispatched.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.state.borrow().events.len()
    }

    /// Discards queued events and waiting completion callbacks and resets the dispatcher.
    ///
    /// Queued events are not dispatched. Resetting with queued events is allowed but logged,
    /// since those events are lost.
    ///
    /// Events that were already dispatched but have not completed (such as asynchronous passes
    /// still waiting for deferreds) stay in flight. Completion callbacks handed to later flushes
    /// are not invoked before those passes complete too.
    pub fn reset(&self) {
        let discarded = {
            let mut state = self.state.borrow_mut();

            if !state.events.is_empty() {
                warn!(
                    undispatched = state.events.len(),
                    "resetting event queue that still has undispatched events"
                );
            }

            // In-flight passes still report to the reinstalled callbacks, so they keep their
            // share of the pending count.
            (mem::take(&mut state.events), mem::take(&mut state.waiting))
        };

        drop(discarded);

        self.dispatcher.reset();

        // The dispatcher reset cleared our callbacks as well.
        self.install_completion_tracking();
    }
}

/// Records completion of one fire pass and notifies waiters if that was the last one.
fn complete_one<E>(state: &RefCell<QueueState<E>>) {
    {
        let mut state = state.borrow_mut();
        state.pending = state.pending.saturating_sub(1);
    }

    notify_if_idle(state);
}

fn notify_if_idle<E>(state: &RefCell<QueueState<E>>) {
    let waiting = {
        let mut state = state.borrow_mut();

        if state.draining || state.pending != 0 || !state.events.is_empty() {
            return;
        }

        mem::take(&mut state.waiting)
    };

    for done in waiting {
        done();
    }
}

impl<E, D: Clone> Clone for EventQueue<E, D> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<E, D: fmt::Debug> fmt::Debug for EventQueue<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(type_name::<Self>());
        debug.field("dispatcher", &self.dispatcher);

        // A listener may format the queue while the state is borrowed.
        if let Ok(state) = self.state.try_borrow() {
            debug
                .field("queued", &state.events.len())
                .field("pending", &state.pending)
                .field("draining", &state.draining)
                .field("has_validator", &state.validator.is_some());
        }

        debug.finish_non_exhaustive()
    }
}

/// Builder for creating an instance of [`EventQueue`].
///
/// # Example
///
/// ```
/// use listeners::{Error, EventQueue, ListenerList};
///
/// let queue = EventQueue::builder(ListenerList::<i64>::new())
///     .validator(|event: &i64| {
///         if *event < 0 {
///             return Err("negative events are not allowed".into());
///         }
///         Ok(())
///     })
///     .build();
///
/// assert!(queue.queue_change_event(1).is_ok());
/// assert!(matches!(
///     queue.queue_change_event(-1),
///     Err(Error::InvalidArgument { .. })
/// ));
/// ```
#[must_use]
pub struct EventQueueBuilder<E, D> {
    dispatcher: D,
    validator: Option<Validator<E>>,
}

impl<E: 'static, D: Dispatcher<E>> EventQueueBuilder<E, D> {
    /// Sets a validator that every event must pass before it is queued.
    pub fn validator(
        mut self,
        validator: impl Fn(&E) -> Result<(), ListenerError> + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Builds the queue, taking over the success and failure callbacks of the dispatcher.
    #[must_use]
    pub fn build(self) -> EventQueue<E, D> {
        EventQueue::from_parts(self.dispatcher, self.validator)
    }
}

impl<E, D: fmt::Debug> fmt::Debug for EventQueueBuilder<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("dispatcher", &self.dispatcher)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}
