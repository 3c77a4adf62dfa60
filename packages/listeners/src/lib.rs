#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Single-threaded listener lists, event queues and resolve-once events.
//!
//! This crate provides a small observer-pattern toolkit for code that runs on one thread and
//! coordinates through callbacks:
//!
//! * [`ListenerList`] - an ordered list of listeners with per-listener call budgets. Firing an
//!   event invokes the listeners synchronously, most recently registered first.
//! * [`AsyncListenerList`] - the same list, but every listener receives a [`Deferred`] that it
//!   settles whenever its work is done. The list reports success once every deferred resolves.
//! * [`EventQueue`] - buffers events and dispatches them only when explicitly flushed.
//! * [`SingularEventHandler`] - an event that can fire at most once. Listeners that arrive late
//!   are invoked immediately with the cached event.
//!
//! [`EventQueue`] and [`SingularEventHandler`] work with either list flavor through the
//! [`Dispatcher`] trait.
//!
//! Listeners return a [`Result`][std::result::Result] instead of panicking to signal failure.
//! The first failing listener halts the current fire pass and the failure is routed to the
//! failure callback of the list, if one is registered, or returned to the caller otherwise.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use listeners::ListenerList;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let list = ListenerList::<i32>::new();
//!
//! list.add_one_time_listener({
//!     let seen = Rc::clone(&seen);
//!     move |value: &i32| {
//!         seen.borrow_mut().push(*value);
//!         Ok(())
//!     }
//! });
//!
//! list.fire_event(42).unwrap();
//! list.fire_event(43).unwrap();
//!
//! // The one-time listener was removed after its first call.
//! assert_eq!(*seen.borrow(), vec![42]);
//! assert!(list.is_empty());
//! ```
//!
//! # Asynchronous listeners
//!
//! ```
//! use futures::executor::LocalPool;
//! use listeners::AsyncListenerList;
//!
//! let mut pool = LocalPool::new();
//!
//! let list = AsyncListenerList::<&str, usize>::builder(pool.spawner())
//!     .on_fire_success(|lengths| assert_eq!(lengths, vec![5]))
//!     .build();
//!
//! list.add_listener(|deferred, word: &&str| {
//!     deferred.resolve(word.len());
//!     Ok(())
//! });
//!
//! list.fire_event("hello").unwrap();
//!
//! // Aggregation happens on the executor.
//! pool.run_until_stalled();
//! ```

mod async_listener_list;
mod budget;
mod deferred;
mod disconnected;
mod dispatcher;
mod error;
mod event_queue;
mod listener_id;
mod listener_list;
mod singular;

pub use async_listener_list::*;
pub use budget::*;
pub use deferred::*;
pub use disconnected::*;
pub use dispatcher::*;
pub use error::*;
pub use event_queue::*;
pub use listener_id::*;
pub use listener_list::*;
pub use singular::*;
