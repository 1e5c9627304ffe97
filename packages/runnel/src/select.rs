//! Multi-way receive across a set of channels
//!
//! A select reads one value from exactly one of its input channels. Choice
//! is two-tiered: if any preferred channel is ready, the pick is made among
//! the ready preferred channels only; otherwise among the ready regular
//! ones. Within a tier the pick is uniformly random, so no ready channel can
//! starve another, but no ordering among them is promised.
//!
//! Readiness is observed with [`Channel::is_ready`] and the value is then
//! taken with [`Channel::try_recv`]. Peeking and then taking is deliberate:
//! taking is the only step that can lose a race against another consumer,
//! and when it does the scan just runs again. The blocking forms wait
//! between scans with a short sleep that grows additively up to a small
//! ceiling, which keeps the idle cost low without adding noticeable latency
//! to wakeups.

use crate::channel::{Channel, Received};
use rand::prelude::*;
use std::cmp::min;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// first sleep of the wait loop
const BACKOFF_FLOOR: Duration = Duration::from_micros(200);
/// added to the sleep after every idle scan
const BACKOFF_STEP: Duration = Duration::from_micros(25);
/// the sleep never grows beyond this
const BACKOFF_CEILING: Duration = Duration::from_micros(1500);

/// One pass of the choice procedure: partition the ready channels into
/// tiers, pick uniformly at random within the winning tier, and take. A
/// take lost to a racing consumer re-runs the pass; the pass only gives up
/// once nothing is ready.
fn try_choose<T>(channels: &[&Channel<T>]) -> Option<(usize, Received<T>)> {
    let mut rng = thread_rng();
    loop {
        let mut preferred = Vec::new();
        let mut regular = Vec::new();
        for (index, channel) in channels.iter().enumerate() {
            if channel.is_ready() {
                if channel.is_preferred() {
                    preferred.push(index);
                } else {
                    regular.push(index);
                }
            }
        }
        let tier = if preferred.is_empty() { &regular } else { &preferred };
        if tier.is_empty() {
            return None;
        }
        let index = tier[rng.gen_range(0..tier.len())];
        if let Some(received) = channels[index].try_recv() {
            return Some((index, received));
        }
        // another consumer won the race; scan again
    }
}

/// the wait loop behind the blocking select forms
async fn drive<T>(
    channels: &[&Channel<T>],
    deadline: Option<Instant>,
) -> Option<(usize, Received<T>)> {
    let mut backoff = BACKOFF_FLOOR;
    loop {
        if let Some(hit) = try_choose(channels) {
            return Some(hit);
        }
        // a closed and drained set can never become ready again
        if channels.iter().all(|c| c.is_closed()) && try_choose(channels).is_none() {
            return None;
        }
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                sleep(min(backoff, remaining)).await;
            }
            None => sleep(backoff).await,
        }
        backoff = min(backoff + BACKOFF_STEP, BACKOFF_CEILING);
    }
}

/// Receive one value from exactly one of the channels, waiting until some
/// channel is ready
///
/// Preferred channels form a strict first tier; within a tier the choice is
/// uniformly random. Returns `None` only if every input channel is closed
/// and drained, since no value could ever arrive then.
pub async fn select<T>(channels: &[&Channel<T>]) -> Option<Received<T>> {
    drive(channels, None).await.map(|(_, received)| received)
}

/// Receive one value from exactly one of the channels, waiting at most
/// `limit`
///
/// Returns `None` once `limit` elapses with no selection (or if every input
/// channel is closed and drained). A zero `limit` performs exactly one
/// readiness probe.
pub async fn select_timeout<T>(
    limit: Duration,
    channels: &[&Channel<T>],
) -> Option<Received<T>> {
    drive(channels, Some(Instant::now() + limit))
        .await
        .map(|(_, received)| received)
}

/// Receive one value from exactly one of the channels if some channel is
/// ready right now
///
/// One pass of the choice procedure, no waiting. A fallback other than
/// `None` is spelled `try_select(..).unwrap_or(..)` at the call site.
pub fn try_select<T>(channels: &[&Channel<T>]) -> Option<Received<T>> {
    try_choose(channels).map(|(_, received)| received)
}

struct Arm<'a, T, R> {
    channel: &'a Channel<T>,
    handler: Box<dyn FnOnce(Received<T>) -> R + 'a>,
}

/// Dispatching select: pair each channel with a handler for its value
///
/// ```no_run
/// # async fn demo() {
/// use runnel::{Channel, Selector};
///
/// let data = Channel::bounded(8);
/// let quit = Channel::bounded(1);
/// data.try_send(21).unwrap();
///
/// let outcome = Selector::new()
///     .recv(&data, |r| r.value().unwrap() * 2)
///     .recv(&quit, |_| -1)
///     .wait()
///     .await;
/// assert_eq!(outcome, 42);
/// # }
/// ```
///
/// [`wait`](Self::wait) reads one value the way [`select`] does, then calls
/// the handler paired with the chosen channel and returns its result. With a
/// [`default`](Self::default) handler the wait becomes a single readiness
/// pass, and the default runs if no channel is ready. Handlers run in the
/// caller's context; a panicking handler propagates to the caller.
///
/// Adding a second arm for the same channel replaces its handler.
pub struct Selector<'a, T, R> {
    arms: Vec<Arm<'a, T, R>>,
    fallback: Option<Box<dyn FnOnce() -> R + 'a>>,
}

impl<'a, T, R> Selector<'a, T, R> {
    /// A selector with no arms
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Selector { arms: Vec::new(), fallback: None }
    }

    /// Add a receive arm: if `channel` is chosen, its value is passed to
    /// `handler`
    ///
    /// Arms are keyed by channel identity; a later arm for the same channel
    /// replaces the earlier handler.
    pub fn recv(
        mut self,
        channel: &'a Channel<T>,
        handler: impl FnOnce(Received<T>) -> R + 'a,
    ) -> Self {
        match self.arms.iter_mut().find(|arm| arm.channel.same_channel(channel)) {
            Some(arm) => arm.handler = Box::new(handler),
            None => self.arms.push(Arm { channel, handler: Box::new(handler) }),
        }
        self
    }

    /// Add a default handler, which also makes [`wait`](Self::wait)
    /// non-blocking
    ///
    /// The default runs, with no value, only if no channel is ready at the
    /// single readiness pass.
    pub fn default(mut self, handler: impl FnOnce() -> R + 'a) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }

    /// Read one value and dispatch it to the matching handler
    ///
    /// # Panics
    ///
    /// Panics if the selector has no arms and no default, and if a blocking
    /// wait is left with nothing but closed, drained channels.
    pub async fn wait(self) -> R {
        let Selector { arms, fallback } = self;
        let channels: Vec<&Channel<T>> = arms.iter().map(|arm| arm.channel).collect();
        if let Some(fallback) = fallback {
            return match try_choose(&channels) {
                Some((index, received)) => {
                    (arms.into_iter().nth(index).expect("arm index in range").handler)(received)
                }
                None => fallback(),
            };
        }
        assert!(!arms.is_empty(), "selector without a default needs at least one arm");
        match drive(&channels, None).await {
            Some((index, received)) => {
                (arms.into_iter().nth(index).expect("arm index in range").handler)(received)
            }
            None => panic!("every selector channel is closed and drained"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;

    #[tokio::test]
    async fn select_takes_the_one_ready_channel() {
        let a = Channel::bounded(1);
        let b = Channel::bounded(1);
        b.try_send("b").unwrap();
        assert_eq!(select(&[&a, &b]).await, Some(Received::Value("b")));
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn select_waits_for_a_late_value() {
        let a = Channel::bounded(1);
        let tx = a.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send("late").await.unwrap();
        });
        assert_eq!(select(&[&a]).await, Some(Received::Value("late")));
    }

    #[tokio::test]
    async fn select_sees_a_parked_rendezvous_producer() {
        let r = Channel::rendezvous();
        let tx = r.clone();
        let producer = tokio::spawn(async move { tx.send("x").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(select(&[&r]).await, Some(Received::Value("x")));
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn select_returns_none_on_a_dead_set() {
        let a = Channel::<i32>::bounded(1);
        let b = Channel::<i32>::bounded(1);
        b.try_send(1).unwrap();
        a.close();
        b.close();
        assert_eq!(select(&[&a, &b]).await, Some(Received::Value(1)));
        assert_eq!(select(&[&a, &b]).await, None);
    }

    #[tokio::test]
    async fn deadline_wins_an_empty_select() {
        let b = Channel::<&str>::bounded(1);
        let t = Channel::<&str>::timeout(Duration::from_millis(50));
        let start = Instant::now();
        assert_eq!(select(&[&b, &t]).await, Some(Received::Timeout));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(45));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn data_beats_an_unfired_deadline() {
        let b = Channel::bounded(1);
        let t = Channel::timeout(Duration::from_millis(500));
        b.try_send("x").unwrap();
        assert_eq!(select(&[&b, &t]).await, Some(Received::Value("x")));
    }

    #[tokio::test]
    async fn preferred_channels_dominate() {
        let a = Channel::bounded(1);
        let b = Channel::bounded(1);
        a.prefer();

        for _ in 0..500 {
            a.try_send("A").unwrap();
            b.try_send("B").ok();
            let got = select(&[&a, &b]).await.unwrap();
            assert_eq!(got, Received::Value("A"));
        }

        // with the preferred channel empty, the regular one is taken
        while b.try_recv().is_some() {}
        b.try_send("B").unwrap();
        assert_eq!(try_select(&[&a, &b]), Some(Received::Value("B")));
    }

    #[tokio::test]
    async fn choice_within_a_tier_is_roughly_uniform() {
        let a = Channel::bounded(1);
        let b = Channel::bounded(1);
        let mut counts: HashMap<&str, u32> = HashMap::new();

        for _ in 0..10_000 {
            a.try_send("a").ok();
            b.try_send("b").ok();
            let got = select(&[&a, &b]).await.unwrap().value().unwrap();
            *counts.entry(got).or_default() += 1;
        }

        let a_count = counts["a"];
        let b_count = counts["b"];
        assert_eq!(a_count + b_count, 10_000);
        // 50/50 up to very generous statistical slack
        assert!(a_count > 4_000 && a_count < 6_000, "skewed counts: {counts:?}");
        assert!(b_count > 4_000 && b_count < 6_000, "skewed counts: {counts:?}");
    }

    #[tokio::test]
    async fn try_select_reports_only_immediate_readiness() {
        let c = Channel::bounded(1);
        assert_eq!(try_select(&[&c]), None);
        assert_eq!(try_select(&[&c]).unwrap_or(Received::Value("none")), Received::Value("none"));

        c.try_send("v").unwrap();
        assert_eq!(try_select(&[&c]), Some(Received::Value("v")));
    }

    #[tokio::test]
    async fn select_timeout_expires_with_none() {
        let c = Channel::<i32>::bounded(1);
        let start = Instant::now();
        assert_eq!(select_timeout(Duration::from_millis(40), &[&c]).await, None);
        assert!(start.elapsed() >= Duration::from_millis(35));

        c.try_send(3).unwrap();
        assert_eq!(
            select_timeout(Duration::from_millis(40), &[&c]).await,
            Some(Received::Value(3)),
        );
    }

    #[tokio::test]
    async fn zero_timeout_is_a_single_probe() {
        let c = Channel::<i32>::bounded(1);
        assert_eq!(select_timeout(Duration::ZERO, &[&c]).await, None);
        c.try_send(1).unwrap();
        assert_eq!(
            select_timeout(Duration::ZERO, &[&c]).await,
            Some(Received::Value(1)),
        );
    }

    #[tokio::test]
    async fn selector_dispatches_to_the_chosen_arm() {
        let c = Channel::bounded(1);

        let missed = Selector::new()
            .recv(&c, |r| r.value().unwrap() * 2)
            .default(|| -1)
            .wait()
            .await;
        assert_eq!(missed, -1);

        c.try_send(21).unwrap();
        let hit = Selector::new()
            .recv(&c, |r| r.value().unwrap() * 2)
            .default(|| -1)
            .wait()
            .await;
        assert_eq!(hit, 42);
    }

    #[tokio::test]
    async fn selector_blocks_without_a_default() {
        let c = Channel::bounded(1);
        let tx = c.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(5).await.unwrap();
        });
        let got = Selector::new().recv(&c, |r| r.value().unwrap() + 1).wait().await;
        assert_eq!(got, 6);
    }

    #[tokio::test]
    async fn duplicate_arms_collapse_to_the_last_handler() {
        let c = Channel::bounded(1);
        let d = c.clone();
        c.try_send(1).unwrap();
        let got = Selector::new()
            .recv(&c, |_| "first")
            .recv(&d, |_| "second")
            .wait()
            .await;
        assert_eq!(got, "second");
    }
}
