//! Inner concurrency structure for channels
//!
//! The architecture: channel handles wrap `Arc<Shared<T>>`. `Shared` keeps
//! the two status flags as atomics next to a mutex around everything else:
//! the element storage plus two FIFO waiter queues, one for pending sends and
//! one for pending receives.
//!
//! A pending operation owns a ticket into its waiter queue. Ordering and
//! fairness come from the queues: an operation only completes while its
//! ticket is at the front, and whenever a ticket leaves the front for any
//! reason (resolved, rescinded, dropped) the ticket behind it is woken so it
//! can re-check. Cross-queue wakes happen at the points where one side makes
//! the other side's progress possible: an element pushed wakes the front
//! receiver, an element popped wakes the front sender, close wakes everyone.
//!
//! Rendezvous channels have no storage. A producer parks its value ("offer")
//! inside its own waiter node, where readiness scans and consumers can see it
//! under the lock; the producer resolves only once a consumer has claimed the
//! offer, which is what makes the handoff a true rendezvous.

use super::ring::Ring;
use super::{
    ClearError, Received, SendError, SendErrorReason, TrySendError, TrySendErrorReason,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

/// the three variants of the channel family
pub(super) enum Kind {
    /// no storage; producers park offers in their waiter nodes
    Rendezvous,
    /// fixed-capacity FIFO
    Bounded(usize),
    /// one-shot deadline channel. `fired` is set by the background timer,
    /// `taken` once the sentinel has been consumed.
    Deadline { fired: bool, taken: bool },
}

/// shared handle to channel state
pub(super) struct Core<T>(Arc<Shared<T>>);

struct Shared<T> {
    /// monotonic: once true, never false again. written under the lock so
    /// that close linearizes against in-flight sends; read lock-free.
    closed: AtomicBool,
    /// select's readiness scan reads this without the lock
    preferred: AtomicBool,
    /// lockable subset of state
    lockable: Mutex<Lockable<T>>,
}

struct Lockable<T> {
    kind: Kind,
    /// buffered elements; capacity is zero except for bounded channels
    queue: Ring<T>,
    /// values whose parked consumer withdrew after a direct handoff landed
    /// in its slot, with no other consumer to pass them to. they stay
    /// receivable here instead of being lost. only rendezvous channels can
    /// populate this.
    orphans: VecDeque<Received<T>>,
    senders: VecDeque<SendWaiter<T>>,
    receivers: VecDeque<RecvWaiter<T>>,
    next_ticket: u64,
}

struct SendWaiter<T> {
    ticket: u64,
    /// the last-polled-with waker for this waiter
    waker: Option<Waker>,
    /// rendezvous only: the value offered by this producer
    offer: Option<T>,
    /// rendezvous only: set once a consumer has claimed the offer
    claimed: bool,
}

struct RecvWaiter<T> {
    ticket: u64,
    waker: Option<Waker>,
    /// rendezvous only: a value handed directly to this parked consumer by a
    /// non-blocking send
    slot: Option<Received<T>>,
}

impl<T> Core<T> {
    pub(super) fn new(kind: Kind, preferred: bool) -> Self {
        let capacity = match kind {
            Kind::Bounded(capacity) => capacity,
            Kind::Rendezvous | Kind::Deadline { .. } => 0,
        };
        Core(Arc::new(Shared {
            closed: AtomicBool::new(false),
            preferred: AtomicBool::new(preferred),
            lockable: Mutex::new(Lockable {
                kind,
                queue: Ring::new(capacity),
                orphans: VecDeque::new(),
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
                next_ticket: 0,
            }),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.0.lockable.lock().unwrap()
    }

    /// whether two handles refer to the same channel
    pub(super) fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(super) fn is_closed(&self) -> bool {
        self.0.closed.load(Relaxed)
    }

    pub(super) fn is_preferred(&self) -> bool {
        self.0.preferred.load(Relaxed)
    }

    pub(super) fn set_preferred(&self, preferred: bool) {
        self.0.preferred.store(preferred, Relaxed);
    }

    /// mark closed and wake every waiter so it can observe the closure
    pub(super) fn close(&self) {
        let mut lock = self.lock();
        self.0.closed.store(true, Relaxed);
        wake_all(&mut lock);
    }

    /// deposit the deadline sentinel and close. called by the timer task of a
    /// deadline channel, exactly once.
    pub(super) fn fire_deadline(&self) {
        let mut lock = self.lock();
        if let Kind::Deadline { fired, .. } = &mut lock.kind {
            *fired = true;
        }
        self.0.closed.store(true, Relaxed);
        wake_all(&mut lock);
    }

    pub(super) fn len(&self) -> usize {
        let lock = self.lock();
        match lock.kind {
            // offers in flight are not buffered elements
            Kind::Rendezvous => 0,
            Kind::Bounded(_) => lock.queue.len(),
            Kind::Deadline { fired, taken } => (fired && !taken) as usize,
        }
    }

    /// whether a receive would succeed without waiting
    pub(super) fn is_ready(&self) -> bool {
        let lock = self.lock();
        if !lock.orphans.is_empty() || !lock.queue.is_empty() {
            return true;
        }
        match lock.kind {
            Kind::Deadline { fired, taken } => fired && !taken,
            Kind::Rendezvous => lock.senders.iter().any(|w| w.offer.is_some()),
            Kind::Bounded(_) => false,
        }
    }

    pub(super) fn peek(&self) -> Option<Received<T>>
    where
        T: Clone,
    {
        let lock = self.lock();
        if let Some(v) = lock.orphans.front() {
            return Some(v.clone());
        }
        if let Some(v) = lock.queue.front() {
            return Some(Received::Value(v.clone()));
        }
        match &lock.kind {
            Kind::Deadline { fired: true, taken: false } => Some(Received::Timeout),
            Kind::Deadline { .. } | Kind::Bounded(_) => None,
            Kind::Rendezvous => {
                lock.senders.iter().find_map(|w| w.offer.clone()).map(Received::Value)
            }
        }
    }

    pub(super) fn snapshot(&self) -> Vec<Received<T>>
    where
        T: Clone,
    {
        let lock = self.lock();
        let mut out: Vec<Received<T>> = lock.orphans.iter().cloned().collect();
        out.extend(lock.queue.iter().cloned().map(Received::Value));
        match &lock.kind {
            Kind::Deadline { fired: true, taken: false } => out.push(Received::Timeout),
            Kind::Rendezvous => out.extend(
                lock.senders.iter().filter_map(|w| w.offer.clone()).map(Received::Value),
            ),
            _ => {}
        }
        out
    }

    /// take one value if immediately available
    pub(super) fn try_recv(&self) -> Option<Received<T>> {
        let mut lock = self.lock();
        consume(&mut lock)
    }

    /// take every value that is immediately available, in order
    pub(super) fn drain(&self) -> Vec<Received<T>> {
        let mut lock = self.lock();
        let mut out = Vec::new();
        while let Some(v) = consume(&mut lock) {
            out.push(v);
        }
        out
    }

    pub(super) fn clear(&self) -> Result<(), ClearError> {
        let mut lock = self.lock();
        if matches!(lock.kind, Kind::Deadline { .. }) {
            return Err(ClearError::Unsupported);
        }
        let had_elems = !lock.queue.is_empty();
        lock.orphans.clear();
        lock.queue.clear();
        if had_elems {
            wake_front_sender(&mut lock);
        }
        Ok(())
    }

    pub(super) fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut lock = self.lock();
        if matches!(lock.kind, Kind::Deadline { .. }) {
            return Err(TrySendError { value, reason: TrySendErrorReason::Unsupported });
        }
        if self.is_closed() {
            return Err(TrySendError { value, reason: TrySendErrorReason::Closed });
        }
        match lock.kind {
            Kind::Bounded(capacity) => {
                // parked producers go first
                if lock.senders.is_empty() && lock.queue.len() < capacity {
                    lock.queue.push(value);
                    if lock.queue.len() == 1 {
                        wake_front_receiver(&mut lock);
                    }
                    Ok(())
                } else {
                    Err(TrySendError { value, reason: TrySendErrorReason::NotReady })
                }
            }
            Kind::Rendezvous => {
                // a handoff without waiting needs a parked consumer
                match lock.receivers.iter_mut().find(|w| w.slot.is_none()) {
                    Some(w) => {
                        w.slot = Some(Received::Value(value));
                        if let Some(waker) = w.waker.take() {
                            waker.wake();
                        }
                        Ok(())
                    }
                    None => {
                        Err(TrySendError { value, reason: TrySendErrorReason::NotReady })
                    }
                }
            }
            Kind::Deadline { .. } => unreachable!(),
        }
    }

    /// enqueue a send waiter. rendezvous channels park the value as the
    /// waiter's offer; the caller keeps it otherwise, and gets it back here.
    pub(super) fn register_send(&self, value: T) -> (u64, Option<T>) {
        let mut lock = self.lock();
        let ticket = lock.next_ticket;
        lock.next_ticket += 1;
        let (offer, kept) = if matches!(lock.kind, Kind::Rendezvous) && !self.is_closed() {
            (Some(value), None)
        } else {
            (None, Some(value))
        };
        let parked_offer = offer.is_some();
        lock.senders.push_back(SendWaiter { ticket, waker: None, offer, claimed: false });
        if parked_offer {
            wake_front_receiver(&mut lock);
        }
        (ticket, kept)
    }

    /// enqueue a recv waiter
    pub(super) fn register_recv(&self) -> u64 {
        let mut lock = self.lock();
        let ticket = lock.next_ticket;
        lock.next_ticket += 1;
        lock.receivers.push_back(RecvWaiter { ticket, waker: None, slot: None });
        ticket
    }

    /// poll backing a send future. `value` holds the element for non
    /// rendezvous channels and is empty once resolved.
    pub(super) fn poll_send(
        &self,
        ticket: u64,
        value: &mut Option<T>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), SendError<T>>> {
        let mut lock = self.lock();

        if matches!(lock.kind, Kind::Deadline { .. }) {
            unlink_sender(&mut lock, ticket);
            let value = value.take().expect("send future polled after completion");
            return Poll::Ready(Err(SendError { value, reason: SendErrorReason::Unsupported }));
        }

        // an offer claimed between polls means the value was delivered
        if sender_mut(&mut lock, ticket).expect("send ticket missing").claimed {
            unlink_sender(&mut lock, ticket);
            return Poll::Ready(Ok(()));
        }

        if self.is_closed() {
            let reclaimed =
                sender_mut(&mut lock, ticket).and_then(|w| w.offer.take());
            unlink_sender(&mut lock, ticket);
            let value = value
                .take()
                .or(reclaimed)
                .expect("send future polled after completion");
            return Poll::Ready(Err(SendError { value, reason: SendErrorReason::Closed }));
        }

        match lock.kind {
            Kind::Bounded(capacity) => {
                if is_front_sender(&lock, ticket) && lock.queue.len() < capacity {
                    let v = value.take().expect("send future polled after completion");
                    lock.queue.push(v);
                    unlink_sender(&mut lock, ticket);
                    if lock.queue.len() == 1 {
                        wake_front_receiver(&mut lock);
                    }
                    Poll::Ready(Ok(()))
                } else {
                    set_sender_waker(&mut lock, ticket, cx);
                    Poll::Pending
                }
            }
            Kind::Rendezvous => {
                // the offer is parked in the node; wait for a claim
                set_sender_waker(&mut lock, ticket, cx);
                Poll::Pending
            }
            Kind::Deadline { .. } => unreachable!(),
        }
    }

    /// poll backing a recv future
    pub(super) fn poll_recv(
        &self,
        ticket: u64,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Received<T>>> {
        let mut lock = self.lock();

        // a direct handoff may have landed in our slot while parked
        if let Some(v) =
            receiver_mut(&mut lock, ticket).expect("recv ticket missing").slot.take()
        {
            unlink_receiver(&mut lock, ticket);
            return Poll::Ready(Some(v));
        }

        if is_front_receiver(&lock, ticket) {
            if let Some(v) = consume(&mut lock) {
                unlink_receiver(&mut lock, ticket);
                return Poll::Ready(Some(v));
            }
            if self.is_closed() {
                unlink_receiver(&mut lock, ticket);
                return Poll::Ready(None);
            }
        }

        set_receiver_waker(&mut lock, ticket, cx);
        Poll::Pending
    }

    /// withdraw a pending send. returns the parked offer if it was not yet
    /// claimed by a consumer.
    pub(super) fn cancel_send(&self, ticket: u64) -> Option<T> {
        let mut lock = self.lock();
        let reclaimed = sender_mut(&mut lock, ticket).and_then(|w| w.offer.take());
        unlink_sender(&mut lock, ticket);
        reclaimed
    }

    /// withdraw a pending recv. a value already handed to this consumer's
    /// slot is passed on to another parked consumer if one exists.
    pub(super) fn cancel_recv(&self, ticket: u64) {
        let mut lock = self.lock();
        let orphan = receiver_mut(&mut lock, ticket).and_then(|w| w.slot.take());
        unlink_receiver(&mut lock, ticket);
        if let Some(v) = orphan {
            match lock.receivers.iter_mut().find(|w| w.slot.is_none()) {
                Some(w) => {
                    w.slot = Some(v);
                    if let Some(waker) = w.waker.take() {
                        waker.wake();
                    }
                }
                // nobody waiting: the value stays receivable from the channel
                None => lock.orphans.push_back(v),
            }
        }
    }

    /// diagnostic rendering of the channel contents
    pub(super) fn fmt_contents(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        T: fmt::Debug,
    {
        let lock = self.lock();
        if self.is_closed() {
            write!(f, ":closed ")?;
        }
        write!(f, "<=[ ")?;
        for v in &lock.orphans {
            match v {
                Received::Value(v) => write!(f, "{v:?} ")?,
                Received::Timeout => write!(f, "timeout ")?,
            }
        }
        for v in lock.queue.iter() {
            write!(f, "{v:?} ")?;
        }
        match &lock.kind {
            Kind::Deadline { fired: true, taken: false } => write!(f, "timeout ")?,
            Kind::Rendezvous => {
                for w in &lock.senders {
                    if let Some(v) = &w.offer {
                        write!(f, "{v:?} ")?;
                    }
                }
            }
            _ => {}
        }
        write!(f, "]")
    }
}

impl<T> Clone for Core<T> {
    fn clone(&self) -> Self {
        Core(Arc::clone(&self.0))
    }
}

/// take one value if immediately available. buffered elements go first, then
/// the deadline sentinel or the front-most parked rendezvous offer.
fn consume<T>(lock: &mut Lockable<T>) -> Option<Received<T>> {
    if let Some(v) = lock.orphans.pop_front() {
        return Some(v);
    }
    if let Some(v) = lock.queue.pop() {
        // space opened up for the front producer
        wake_front_sender(lock);
        return Some(Received::Value(v));
    }
    match &mut lock.kind {
        Kind::Deadline { fired: true, taken } if !*taken => {
            *taken = true;
            Some(Received::Timeout)
        }
        Kind::Rendezvous => {
            let w = lock.senders.iter_mut().find(|w| w.offer.is_some())?;
            let v = w.offer.take().expect("offer vanished under lock");
            w.claimed = true;
            if let Some(waker) = w.waker.take() {
                waker.wake();
            }
            Some(Received::Value(v))
        }
        _ => None,
    }
}

fn sender_mut<'a, T>(
    lock: &'a mut Lockable<T>,
    ticket: u64,
) -> Option<&'a mut SendWaiter<T>> {
    lock.senders.iter_mut().find(|w| w.ticket == ticket)
}

fn receiver_mut<'a, T>(
    lock: &'a mut Lockable<T>,
    ticket: u64,
) -> Option<&'a mut RecvWaiter<T>> {
    lock.receivers.iter_mut().find(|w| w.ticket == ticket)
}

fn is_front_sender<T>(lock: &Lockable<T>, ticket: u64) -> bool {
    lock.senders.front().map(|w| w.ticket) == Some(ticket)
}

fn is_front_receiver<T>(lock: &Lockable<T>, ticket: u64) -> bool {
    lock.receivers.front().map(|w| w.ticket) == Some(ticket)
}

fn set_sender_waker<T>(lock: &mut Lockable<T>, ticket: u64, cx: &mut Context<'_>) {
    if let Some(w) = sender_mut(lock, ticket) {
        w.waker = Some(cx.waker().clone());
    }
}

fn set_receiver_waker<T>(lock: &mut Lockable<T>, ticket: u64, cx: &mut Context<'_>) {
    if let Some(w) = receiver_mut(lock, ticket) {
        w.waker = Some(cx.waker().clone());
    }
}

/// remove a send waiter. if it was at the front, the baton passes to the
/// waiter behind it.
fn unlink_sender<T>(lock: &mut Lockable<T>, ticket: u64) {
    let was_front = is_front_sender(lock, ticket);
    if let Some(idx) = lock.senders.iter().position(|w| w.ticket == ticket) {
        lock.senders.remove(idx);
    }
    if was_front {
        wake_front_sender(lock);
    }
}

/// remove a recv waiter. if it was at the front, the baton passes to the
/// waiter behind it.
fn unlink_receiver<T>(lock: &mut Lockable<T>, ticket: u64) {
    let was_front = is_front_receiver(lock, ticket);
    if let Some(idx) = lock.receivers.iter().position(|w| w.ticket == ticket) {
        lock.receivers.remove(idx);
    }
    if was_front {
        wake_front_receiver(lock);
    }
}

fn wake_front_sender<T>(lock: &mut Lockable<T>) {
    if let Some(w) = lock.senders.front_mut() {
        if let Some(waker) = w.waker.take() {
            waker.wake();
        }
    }
}

fn wake_front_receiver<T>(lock: &mut Lockable<T>) {
    if let Some(w) = lock.receivers.front_mut() {
        if let Some(waker) = w.waker.take() {
            waker.wake();
        }
    }
}

fn wake_all<T>(lock: &mut Lockable<T>) {
    for w in lock.senders.iter_mut() {
        if let Some(waker) = w.waker.take() {
            waker.wake();
        }
    }
    for w in lock.receivers.iter_mut() {
        if let Some(waker) = w.waker.take() {
            waker.wake();
        }
    }
}
