//! # Runnel: Go-flavored channels and select on top of tokio
//!
//! #### Background: communicating instead of sharing
//!
//! Go's concurrency story is built on three pieces: cheap concurrent tasks,
//! first-class channels connecting them, and a `select` statement that waits
//! on several channels at once. Tokio supplies the first piece for Rust, and
//! its `sync` module supplies plenty of channels, but the channels are
//! split into sender/receiver halves and specialized per topology, and there
//! is no channel object one can hand around, inspect, close from either
//! side, and multiplex dynamically over a runtime-sized set.
//!
//! Runnel fills in that shape. A [`Channel`] is a single shared object that
//! any number of tasks send into and receive from, in one of three
//! flavors:
//!
//! - a **rendezvous** channel, where a send resolves only once a receiver
//!   has taken the value ([`Channel::rendezvous`]);
//! - a **bounded** channel, a strict-FIFO buffer of fixed capacity
//!   ([`Channel::bounded`]);
//! - a **timeout** channel, a one-shot channel that yields a distinguished
//!   [`Received::Timeout`] sentinel once its duration elapses
//!   ([`Channel::timeout`]).
//!
//! [`select`] receives from whichever channel of a set is ready, choosing
//! uniformly at random among the ready ones so none can starve the others,
//! with one refinement: channels can be marked *preferred*
//! ([`Channel::prefer`]), and a ready preferred channel always beats every
//! non-preferred one. Timeout channels are born preferred, so a deadline
//! competing with a firehose of data is still noticed the moment it fires.
//!
//! ```no_run
//! use runnel::{select, Channel, Received};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let work = Channel::bounded(8);
//!     let deadline = Channel::timeout(Duration::from_millis(500));
//!
//!     let tx = work.clone();
//!     runnel::spawn(async move {
//!         tx.send("job").await.unwrap();
//!     });
//!
//!     match select(&[&work, &deadline]).await {
//!         Some(Received::Value(job)) => println!("got {job}"),
//!         Some(Received::Timeout) => println!("gave up"),
//!         None => println!("all channels closed"),
//!     }
//! }
//! ```
//!
//! #### Select variants
//!
//! - [`select`] waits until some channel is ready.
//! - [`select_timeout`] gives up with `None` after a limit.
//! - [`try_select`] is a single readiness pass with no waiting.
//! - [`Selector`] pairs each channel with a handler and returns the chosen
//!   handler's result, optionally with a non-blocking default arm.
//!
//! #### Tasks
//!
//! [`spawn`] starts a task and records it in a process-wide inventory;
//! [`stop_all`] cancels everything recorded in one sweep and [`shutdown`]
//! additionally waits for the cancelled tasks to wind down. [`spawn_logged`]
//! is the flavor for long-running loops: panics are logged through
//! `tracing` and cancellation is treated as a normal way to end.
//! [`with_timeout`] runs a body as a task and cancels it if it overruns a
//! deadline. Cancellation lands at the task's next suspension point; values
//! a channel has already accepted are never lost to it.

#[macro_use]
extern crate tracing;

mod channel;
mod select;
mod task;

pub use crate::channel::{
    Channel, ClearError, Received, RecvFut, SendError, SendErrorReason, SendFut, TryIter,
    TrySendError, TrySendErrorReason,
};
pub use crate::select::{select, select_timeout, try_select, Selector};
pub use crate::task::{spawn, spawn_detached, spawn_logged, stop_all, shutdown, with_timeout};
