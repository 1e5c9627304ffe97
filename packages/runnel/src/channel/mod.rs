//! Runnel's channels: ordered mpmc conduits in three variants
//!
//! A channel is created by one of three constructors on [`Channel`]:
//!
//! - [`Channel::rendezvous`] creates a channel with no buffer at all. A send
//!   resolves only once a receiver has actually taken the value, so producer
//!   and consumer meet in time, like an unbuffered Go channel.
//! - [`Channel::bounded`] creates a channel backed by a fixed-capacity FIFO.
//!   Sends resolve immediately while there is space and wait for space
//!   otherwise; receives wait for a value. Ordering is strict FIFO across
//!   all producers and consumers.
//! - [`Channel::timeout`] creates a one-shot deadline channel. Nothing can be
//!   sent into it; after the configured duration it holds exactly one
//!   [`Received::Timeout`] sentinel and is closed. Deadline channels are
//!   born preferred so that a deadline multiplexed together with busy data
//!   channels does not have to win a coin toss to be noticed.
//!
//! A `Channel` handle is cheap to clone and every clone refers to the same
//! channel, so any number of tasks can send and receive concurrently. There
//! is no sender/receiver split: the channel itself is the shared object, and
//! it lives until the last handle is dropped.
//!
//! Everything drawn out of a channel is a [`Received`], which keeps a
//! delivered value distinguishable from the deadline sentinel, and `Option`
//! around it keeps "nothing available" distinguishable from both even when
//! `T` itself has a none-like value.
//!
//! Closing is monotonic and idempotent. Sending into a closed channel fails
//! with a [`SendErrorReason::Closed`] error carrying the value back, but
//! values that were already accepted stay receivable until the channel is
//! drained, after which receives resolve to `None`.
//!
//! The send and receive futures are fully cancel-safe. Pending operations on
//! a channel form a queue per direction, so sends take effect in the order
//! the futures were created; dropping a pending future gives up its place in
//! line without disturbing the channel. Dropping a pending send future that
//! never resolved means the value was not delivered; use
//! [`SendFut::rescind`] to take the value back explicitly.

mod inner;
mod ring;

use self::inner::{Core, Kind};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;

/// A value drawn out of a channel
///
/// Receives yield `Value` for anything a producer sent, and `Timeout` for
/// the sentinel a deadline channel deposits when its duration elapses. The
/// sentinel is its own variant rather than a value of `T`, so no legally
/// transportable value can be mistaken for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Received<T> {
    /// A value delivered by a producer
    Value(T),
    /// The sentinel of a deadline channel whose duration elapsed
    Timeout,
}

impl<T> Received<T> {
    /// The delivered value, unless this is the deadline sentinel
    pub fn value(self) -> Option<T> {
        match self {
            Received::Value(v) => Some(v),
            Received::Timeout => None,
        }
    }

    /// Whether this is the deadline sentinel
    pub fn is_timeout(&self) -> bool {
        matches!(self, Received::Timeout)
    }
}

/// Error for sending a value into a channel
///
/// Carries the value that could not be sent back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError<T> {
    /// The value that could not be sent
    pub value: T,
    /// The reason the value could not be sent
    pub reason: SendErrorReason,
}

/// Reason for a [`SendError`] occurring
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendErrorReason {
    /// The channel is closed
    #[error("sending into a closed channel")]
    Closed,
    /// The channel is a deadline channel, which nothing can be sent into
    #[error("deadline channels do not support sending")]
    Unsupported,
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// Error for sending a value into a channel immediately or within a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrySendError<T> {
    /// The value that could not be sent
    pub value: T,
    /// The reason the value could not be sent
    pub reason: TrySendErrorReason,
}

/// Reason for a [`TrySendError`] occurring
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrySendErrorReason {
    /// The send could not complete immediately or by the deadline. For a
    /// bounded channel the buffer stayed full; for a rendezvous channel no
    /// consumer arrived.
    #[error("send not completable in time")]
    NotReady,
    /// The channel is closed
    #[error("sending into a closed channel")]
    Closed,
    /// The channel is a deadline channel, which nothing can be sent into
    #[error("deadline channels do not support sending")]
    Unsupported,
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

impl<T> From<SendError<T>> for TrySendError<T> {
    fn from(e: SendError<T>) -> Self {
        let reason = match e.reason {
            SendErrorReason::Closed => TrySendErrorReason::Closed,
            SendErrorReason::Unsupported => TrySendErrorReason::Unsupported,
        };
        TrySendError { value: e.value, reason }
    }
}

/// Error for clearing a channel that does not support it
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClearError {
    /// Deadline channels cannot be cleared; their sentinel is their whole
    /// point
    #[error("deadline channels do not support clearing")]
    Unsupported,
}

/// An ordered mpmc conduit for values between concurrent tasks
///
/// See the [module docs](self) for the three variants and their semantics.
pub struct Channel<T> {
    core: Core<T>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel { core: self.core.clone() }
    }
}

impl<T> Channel<T> {
    /// Create a rendezvous channel: no buffer, producer and consumer meet
    ///
    /// A send resolves only once a receiver has taken the value. The channel
    /// reports a length of zero at all times, but a parked producer's value
    /// is visible to [`peek`](Self::peek) and to readiness scans, so a
    /// rendezvous channel with a waiting producer counts as ready for
    /// select.
    pub fn rendezvous() -> Self {
        Channel { core: Core::new(Kind::Rendezvous, false) }
    }

    /// Create a bounded channel with a fixed-capacity FIFO buffer
    ///
    /// Sends wait while the buffer is full; receives wait while it is empty.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Use [`rendezvous`](Self::rendezvous)
    /// for a channel without buffering.
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded channel capacity must be positive");
        Channel { core: Core::new(Kind::Bounded(capacity), false) }
    }

    /// Create a deadline channel that yields [`Received::Timeout`] once
    ///
    /// Schedules a background timer task on the current tokio runtime. After
    /// `after` elapses the channel holds exactly one sentinel and is closed;
    /// the first receive past the deadline yields the sentinel and later
    /// ones resolve to `None`. Sending and clearing are unsupported.
    ///
    /// Deadline channels are born preferred.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a tokio runtime.
    pub fn timeout(after: Duration) -> Self
    where
        T: Send + 'static,
    {
        let channel = Channel {
            core: Core::new(Kind::Deadline { fired: false, taken: false }, true),
        };
        let core = channel.core.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            core.fire_deadline();
        });
        channel
    }

    /// Send a value, waiting until the channel accepts it
    ///
    /// See the API of [`SendFut`]; dropping the future before it resolves
    /// withdraws the send.
    pub fn send(&self, value: T) -> SendFut<T> {
        let (ticket, value) = self.core.register_send(value);
        SendFut { core: self.core.clone(), ticket, value, terminated: false }
    }

    /// Send a value only if the channel can accept it without waiting
    ///
    /// On a rendezvous channel this succeeds only if a consumer is already
    /// parked waiting, in which case the value is handed straight to it.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.core.try_send(value)
    }

    /// Send a value, waiting at most `limit`
    ///
    /// On expiry the value comes back inside the error.
    pub async fn send_timeout(&self, value: T, limit: Duration) -> Result<(), TrySendError<T>> {
        let mut fut = self.send(value);
        match tokio::time::timeout(limit, &mut fut).await {
            Ok(result) => result.map_err(TrySendError::from),
            Err(_elapsed) => match fut.rescind() {
                Some(value) => {
                    Err(TrySendError { value, reason: TrySendErrorReason::NotReady })
                }
                // a consumer claimed the value between the last poll and the
                // withdrawal, so the send did complete
                None => Ok(()),
            },
        }
    }

    /// Receive the oldest value, waiting until one is available
    ///
    /// Resolves to `None` once the channel is closed and drained. See the
    /// API of [`RecvFut`]; dropping the future before it resolves withdraws
    /// the receive.
    pub fn recv(&self) -> RecvFut<T> {
        let ticket = self.core.register_recv();
        RecvFut { core: self.core.clone(), ticket, terminated: false }
    }

    /// Receive the oldest value, waiting at most `limit`
    ///
    /// Resolves to `None` on expiry, and also once the channel is closed and
    /// drained.
    pub async fn recv_timeout(&self, limit: Duration) -> Option<Received<T>> {
        match tokio::time::timeout(limit, self.recv()).await {
            Ok(received) => received,
            Err(_elapsed) => None,
        }
    }

    /// Remove and return the oldest value if one is immediately available
    pub fn try_recv(&self) -> Option<Received<T>> {
        self.core.try_recv()
    }

    /// The oldest value without removing it, if one is immediately available
    pub fn peek(&self) -> Option<Received<T>>
    where
        T: Clone,
    {
        self.core.peek()
    }

    /// Whether a receive would succeed without waiting
    ///
    /// This is [`peek`](Self::peek) reduced to a readiness bit; it is what
    /// select's readiness scan uses.
    pub fn is_ready(&self) -> bool {
        self.core.is_ready()
    }

    /// Number of buffered values
    ///
    /// Always zero for rendezvous channels; a deadline channel reports one
    /// while its sentinel is pending.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Whether no values are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all buffered values
    ///
    /// Rendezvous producers that are parked waiting keep waiting; only
    /// values the channel has accepted are discarded.
    pub fn clear(&self) -> Result<(), ClearError> {
        self.core.clear()
    }

    /// Close the channel
    ///
    /// Idempotent. Later sends fail; values already accepted stay
    /// receivable until drained.
    pub fn close(&self) {
        self.core.close();
    }

    /// Whether the channel is closed
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Whether select gives this channel first-tier priority
    pub fn is_preferred(&self) -> bool {
        self.core.is_preferred()
    }

    /// Give this channel first-tier priority in select
    pub fn prefer(&self) {
        self.core.set_preferred(true);
    }

    /// Drop this channel back to regular priority in select
    pub fn unprefer(&self) {
        self.core.set_preferred(false);
    }

    /// A non-removing copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<Received<T>>
    where
        T: Clone,
    {
        self.core.snapshot()
    }

    /// Atomically remove and return everything currently available, oldest
    /// first
    ///
    /// On a rendezvous channel this claims the values of parked producers,
    /// resolving their sends.
    pub fn drain(&self) -> Vec<Received<T>> {
        self.core.drain()
    }

    /// Iterate values by repeatedly calling [`try_recv`](Self::try_recv)
    /// until nothing is immediately available
    ///
    /// The iterator is race-permissive: concurrent producers may extend it
    /// and concurrent consumers may cut it short.
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter { channel: self }
    }

    /// Whether two handles refer to the same channel
    pub fn same_channel(&self, other: &Self) -> bool {
        self.core.same(&other.core)
    }
}

impl<T: fmt::Debug> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.fmt_contents(f)
    }
}

/// Future for sending a value into a channel
///
/// Resolves once the channel accepts the value: immediately for a bounded
/// channel with space, once space frees up for a full one, and once a
/// consumer takes the value for a rendezvous channel. Pending sends on the
/// same channel resolve in the order their futures were created.
///
/// Dropping the future before it resolves withdraws the send;
/// [`rescind`](Self::rescind) does the same but hands the value back.
pub struct SendFut<T> {
    core: Core<T>,
    ticket: u64,
    /// the value, for channels that take it at resolution time. rendezvous
    /// channels park the value in the waiter node instead.
    value: Option<T>,
    terminated: bool,
}

impl<T> Unpin for SendFut<T> {}

impl<T> SendFut<T> {
    /// Withdraw this send if it has not already resolved, and take the value
    /// back
    ///
    /// Returns `None` if the future already resolved or rescinded, or if a
    /// consumer claimed the value concurrently (in which case the value was
    /// delivered). Polling after rescinding panics.
    pub fn rescind(&mut self) -> Option<T> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        let reclaimed = self.core.cancel_send(self.ticket);
        self.value.take().or(reclaimed)
    }
}

impl<T> Future for SendFut<T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.terminated, "SendFut polled after already resolved or rescinded");
        let poll = this.core.poll_send(this.ticket, &mut this.value, cx);
        if poll.is_ready() {
            this.terminated = true;
        }
        poll
    }
}

impl<T> Drop for SendFut<T> {
    fn drop(&mut self) {
        if !self.terminated {
            self.core.cancel_send(self.ticket);
        }
    }
}

/// Future for receiving a value from a channel
///
/// Resolves to `None` once the channel is closed and drained. Pending
/// receives on the same channel resolve in the order their futures were
/// created. Dropping the future before it resolves withdraws the receive.
pub struct RecvFut<T> {
    core: Core<T>,
    ticket: u64,
    terminated: bool,
}

impl<T> Unpin for RecvFut<T> {}

impl<T> RecvFut<T> {
    /// Withdraw this receive if it has not already resolved
    ///
    /// Returns whether it was still pending. Polling after cancelling
    /// panics.
    pub fn cancel(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        self.core.cancel_recv(self.ticket);
        true
    }
}

impl<T> Future for RecvFut<T> {
    type Output = Option<Received<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.terminated, "RecvFut polled after already resolved or cancelled");
        let poll = this.core.poll_recv(this.ticket, cx);
        if poll.is_ready() {
            this.terminated = true;
        }
        poll
    }
}

impl<T> Drop for RecvFut<T> {
    fn drop(&mut self) {
        if !self.terminated {
            self.core.cancel_recv(self.ticket);
        }
    }
}

/// Iterator returned by [`Channel::try_iter`]
pub struct TryIter<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Iterator for TryIter<'_, T> {
    type Item = Received<T>;

    fn next(&mut self) -> Option<Received<T>> {
        self.channel.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn rendezvous_delivers_in_order() {
        let c = Channel::rendezvous();
        let tx = c.clone();
        tokio::spawn(async move {
            tx.send("a").await.unwrap();
            tx.send("b").await.unwrap();
        });
        assert_eq!(c.recv().await, Some(Received::Value("a")));
        assert_eq!(c.recv().await, Some(Received::Value("b")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rendezvous_send_resolves_only_after_receive() {
        let c = Channel::rendezvous();
        let sent = Arc::new(AtomicBool::new(false));

        let tx = c.clone();
        let sent2 = Arc::clone(&sent);
        let producer = tokio::spawn(async move {
            tx.send(1).await.unwrap();
            sent2.store(true, Relaxed);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sent.load(Relaxed));
        assert_eq!(c.len(), 0);
        assert!(c.is_ready());

        assert_eq!(c.recv().await, Some(Received::Value(1)));
        producer.await.unwrap();
        assert!(sent.load(Relaxed));
    }

    #[tokio::test]
    async fn bounded_blocks_at_capacity() {
        let c = Channel::bounded(2);
        c.try_send(1).unwrap();
        c.try_send(2).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(
            c.try_send(3).unwrap_err().reason,
            TrySendErrorReason::NotReady,
        );

        let tx = c.clone();
        let parked = tokio::spawn(async move { tx.send(3).await });
        tokio::task::yield_now().await;

        assert_eq!(c.recv().await, Some(Received::Value(1)));
        assert_eq!(c.recv().await, Some(Received::Value(2)));
        assert_eq!(c.recv().await, Some(Received::Value(3)));
        parked.await.unwrap().unwrap();
        assert!(c.len() <= 2);
    }

    #[tokio::test]
    async fn bounded_fifo_across_many_values() {
        let c = Channel::bounded(4);
        let tx = c.clone();
        let producer = tokio::spawn(async move {
            for i in 0..100 {
                tx.send(i).await.unwrap();
            }
        });
        for i in 0..100 {
            assert_eq!(c.recv().await, Some(Received::Value(i)));
        }
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn close_is_monotonic_and_leaves_values_receivable() {
        let c = Channel::bounded(4);
        c.try_send("a").unwrap();
        c.try_send("b").unwrap();
        c.close();
        c.close();
        assert!(c.is_closed());

        assert_eq!(c.try_send("c").unwrap_err().reason, TrySendErrorReason::Closed);
        let err = c.send("d").await.unwrap_err();
        assert_eq!(err.reason, SendErrorReason::Closed);
        assert_eq!(err.value, "d");

        assert_eq!(c.recv().await, Some(Received::Value("a")));
        assert_eq!(c.recv().await, Some(Received::Value("b")));
        assert_eq!(c.recv().await, None);
        assert_eq!(c.try_recv(), None);
    }

    #[tokio::test]
    async fn close_fails_parked_senders() {
        let c = Channel::bounded(1);
        c.try_send(1).unwrap();
        let tx = c.clone();
        let parked = tokio::spawn(async move { tx.send(2).await });
        tokio::task::yield_now().await;

        c.close();
        let err = parked.await.unwrap().unwrap_err();
        assert_eq!(err.reason, SendErrorReason::Closed);
        assert_eq!(err.value, 2);
    }

    #[tokio::test]
    async fn deadline_channel_yields_sentinel_after_duration() {
        let c = Channel::<&str>::timeout(Duration::from_millis(50));
        assert_eq!(c.len(), 0);
        assert!(!c.is_ready());
        assert!(c.is_preferred());

        let start = Instant::now();
        assert_eq!(c.recv().await, Some(Received::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(45));

        assert!(c.is_closed());
        assert_eq!(c.recv().await, None);
    }

    #[tokio::test]
    async fn deadline_channel_rejects_send_and_clear() {
        let c = Channel::timeout(Duration::from_millis(10));
        assert_eq!(
            c.try_send(1).unwrap_err().reason,
            TrySendErrorReason::Unsupported,
        );
        let err = c.send(2).await.unwrap_err();
        assert_eq!(err.reason, SendErrorReason::Unsupported);
        assert_eq!(err.value, 2);
        assert_eq!(c.clear(), Err(ClearError::Unsupported));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(c.len(), 1);
        assert_eq!(c.peek(), Some(Received::Timeout));
        assert_eq!(c.snapshot(), vec![Received::Timeout]);
        assert_eq!(c.try_recv(), Some(Received::Timeout));
        assert_eq!(c.len(), 0);
    }

    #[tokio::test]
    async fn peek_and_snapshot_do_not_remove() {
        let c = Channel::bounded(4);
        c.try_send(1).unwrap();
        c.try_send(2).unwrap();
        assert_eq!(c.peek(), Some(Received::Value(1)));
        assert_eq!(c.peek(), Some(Received::Value(1)));
        assert_eq!(c.snapshot(), vec![Received::Value(1), Received::Value(2)]);
        assert_eq!(c.len(), 2);
    }

    #[tokio::test]
    async fn drain_and_try_iter_empty_the_channel() {
        let c = Channel::bounded(4);
        for i in 0..4 {
            c.try_send(i).unwrap();
        }
        assert_eq!(
            c.drain(),
            vec![
                Received::Value(0),
                Received::Value(1),
                Received::Value(2),
                Received::Value(3),
            ],
        );
        assert!(c.is_empty());

        c.try_send(7).unwrap();
        c.try_send(8).unwrap();
        let collected: Vec<_> = c.try_iter().collect();
        assert_eq!(collected, vec![Received::Value(7), Received::Value(8)]);
        assert_eq!(c.try_recv(), None);
    }

    #[tokio::test]
    async fn clear_discards_buffered_values() {
        let c = Channel::bounded(2);
        c.try_send(1).unwrap();
        c.try_send(2).unwrap();
        c.clear().unwrap();
        assert!(c.is_empty());
        assert_eq!(c.try_recv(), None);
        c.try_send(3).unwrap();
        assert_eq!(c.try_recv(), Some(Received::Value(3)));
    }

    #[tokio::test]
    async fn rendezvous_try_send_needs_a_parked_consumer() {
        let c = Channel::rendezvous();
        assert_eq!(c.try_send(1).unwrap_err().reason, TrySendErrorReason::NotReady);

        let rx = c.clone();
        let consumer = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        c.try_send(1).unwrap();
        assert_eq!(consumer.await.unwrap(), Some(Received::Value(1)));
    }

    #[tokio::test]
    async fn rendezvous_drain_claims_parked_offers() {
        let c = Channel::rendezvous();
        let tx = c.clone();
        let producer = tokio::spawn(async move { tx.send(5).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(c.drain(), vec![Received::Value(5)]);
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_timeout_returns_the_value_on_expiry() {
        let c = Channel::bounded(1);
        c.try_send(1).unwrap();
        let err = c.send_timeout(2, Duration::from_millis(30)).await.unwrap_err();
        assert_eq!(err.reason, TrySendErrorReason::NotReady);
        assert_eq!(err.value, 2);
        // the withdrawn send must not have left residue
        assert_eq!(c.try_recv(), Some(Received::Value(1)));
        assert_eq!(c.try_recv(), None);
    }

    #[tokio::test]
    async fn recv_timeout_returns_none_on_expiry() {
        let c = Channel::<i32>::bounded(1);
        let start = Instant::now();
        assert_eq!(c.recv_timeout(Duration::from_millis(30)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(25));

        c.try_send(9).unwrap();
        assert_eq!(
            c.recv_timeout(Duration::from_millis(30)).await,
            Some(Received::Value(9)),
        );
    }

    #[tokio::test]
    async fn rescind_takes_the_value_back() {
        let c = Channel::bounded(1);
        c.try_send(1).unwrap();
        let mut fut = c.send(2);
        assert_eq!(fut.rescind(), Some(2));
        assert_eq!(fut.rescind(), None);

        let r = Channel::rendezvous();
        let mut fut = r.send(3);
        assert_eq!(fut.rescind(), Some(3));
    }

    #[tokio::test]
    async fn dropped_recv_future_passes_the_baton() {
        let c = Channel::bounded(1);
        let first = c.recv();
        let second = c.recv();
        drop(first);
        c.try_send(1).unwrap();
        assert_eq!(second.await, Some(Received::Value(1)));
    }

    #[tokio::test]
    async fn preference_flag_toggles() {
        let c = Channel::<i32>::bounded(1);
        assert!(!c.is_preferred());
        c.prefer();
        assert!(c.is_preferred());
        c.unprefer();
        assert!(!c.is_preferred());
    }

    #[tokio::test]
    async fn debug_renders_contents() {
        let c = Channel::bounded(4);
        c.try_send(1).unwrap();
        c.try_send(2).unwrap();
        assert_eq!(format!("{c:?}"), "<=[ 1 2 ]");
        c.close();
        assert_eq!(format!("{c:?}"), ":closed <=[ 1 2 ]");
    }

    #[tokio::test]
    async fn same_channel_tracks_identity() {
        let a = Channel::<i32>::bounded(1);
        let b = a.clone();
        let c = Channel::<i32>::bounded(1);
        assert!(a.same_channel(&b));
        assert!(!a.same_channel(&c));
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_is_invalid() {
        let _ = Channel::<i32>::bounded(0);
    }
}
