//! Basic example of the listener lists, the event queue and the singular event handler.
//!
//! This example registers listeners with different call budgets, buffers events in a queue
//! that is flushed on demand, and shows a resolve-once event serving a listener that arrives
//! after the event has already fired.

use std::rc::Rc;

use futures::executor::LocalPool;
use listeners::{AsyncListenerList, EventQueue, Listener, ListenerList, SingularEventHandler};

fn main() {
    println!("=== Listener List ===");
    listener_list_example();

    println!("\n=== Event Queue ===");
    event_queue_example();

    println!("\n=== Singular Event ===");
    singular_example();

    println!("\n=== Asynchronous Listeners ===");
    async_example();
}

fn listener_list_example() {
    let list = ListenerList::<String>::new();

    list.add_listener(|event: &String| {
        println!("Registered first, called last: {event}");
        Ok(())
    });

    list.add_n_time_listener(
        |event: &String| {
            println!("Called twice at most: {event}");
            Ok(())
        },
        2,
    )
    .expect("2 is a valid call count");

    for round in 1..=3 {
        list.fire_event(format!("round {round}"))
            .expect("listeners in this example do not fail");
    }

    println!("Listeners left after three rounds: {}", list.len());
}

fn event_queue_example() {
    let queue = EventQueue::new(ListenerList::<u32>::new());

    queue.dispatcher().add_listener(|event: &u32| {
        println!("Dispatched event {event}");
        Ok(())
    });

    for event in 1..=3 {
        queue.queue_change_event(event).expect("no validator is installed");
    }

    println!("Queued {} events, flushing...", queue.queued_len());

    queue
        .fire_existing_events_then(|| println!("All queued events have completed"))
        .expect("listeners in this example do not fail");
}

fn singular_example() {
    let handler = SingularEventHandler::new(ListenerList::<String>::new());

    handler
        .fire_event("initialized".to_string())
        .expect("the handler has not fired yet");

    let late: Rc<Listener<String>> = Rc::new(|event: &String| {
        println!("Late listener received cached event: {event}");
        Ok(())
    });

    handler
        .add_listener(late)
        .expect("the late listener does not fail");

    if let Err(error) = handler.fire_event("again".to_string()) {
        println!("Firing twice is refused: {error}");
    }
}

fn async_example() {
    let mut pool = LocalPool::new();

    let list = AsyncListenerList::<u32, u32>::builder(pool.spawner())
        .on_fire_success(|values| println!("All deferreds resolved with {values:?}"))
        .on_fire_failure(|error| println!("Asynchronous dispatch failed: {error}"))
        .build();

    list.add_listener(|deferred, event: &u32| {
        deferred.resolve(event * 2);
        Ok(())
    });

    list.add_listener(|deferred, event: &u32| {
        deferred.resolve(event + 1);
        Ok(())
    });

    list.fire_event(20).expect("the executor is running");

    pool.run_until_stalled();
}
