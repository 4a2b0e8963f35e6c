//! Delayed continuations.
//!
//! A session never sleeps. When it wants something to happen later (the
//! computer's reply, the reset after a finished line) it mints a [`Ticket`],
//! announces it through [`Event::Scheduled`](crate::session::Event), and
//! waits for the host to hand the ticket back via `resume`. Only the most
//! recent ticket is honoured, so anything scheduled before a `stop`, `start`
//! or position reset can never act on the game that followed.

use crate::session::Event;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continuation {
    /// The computer plays the pinned branch's next move.
    ComputerReply,
    /// The computer opens a fresh line for a learner playing second.
    OpeningMove,
    /// Back to the start position for the next line.
    NextLine,
}

/// Holds the single continuation a session may have outstanding.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    next: u64,
    pending: Option<(Ticket, Continuation)>,
}

impl Slot {
    /// Replaces whatever was pending. Returns the new ticket and the one it
    /// displaced, if any.
    pub(crate) fn schedule(&mut self, continuation: Continuation) -> (Ticket, Option<Ticket>) {
        self.next += 1;
        let ticket = Ticket(self.next);
        let replaced = self.pending.replace((ticket, continuation)).map(|(old, _)| old);
        (ticket, replaced)
    }

    pub(crate) fn cancel(&mut self) -> Option<Ticket> {
        self.pending.take().map(|(ticket, _)| ticket)
    }

    /// Claims the continuation for `ticket`, or `None` if the ticket is stale.
    pub(crate) fn take(&mut self, ticket: Ticket) -> Option<Continuation> {
        match self.pending {
            Some((current, continuation)) if current == ticket => {
                self.pending = None;
                Some(continuation)
            }
            _ => None,
        }
    }

    pub(crate) fn pending(&self) -> Option<(Ticket, Continuation)> {
        self.pending
    }
}

/// Virtual clock for hosts without a timer of their own, and for tests.
///
/// Feed it the session's events with [`TimerQueue::observe`], move time with
/// [`TimerQueue::advance`], and resume the session with the tickets that
/// came due.
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    timers: Vec<(Duration, Ticket)>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, ticket: Ticket, delay: Duration) {
        self.timers.push((self.now + delay, ticket));
    }

    pub fn cancel(&mut self, ticket: Ticket) -> bool {
        let before = self.timers.len();
        self.timers.retain(|(_, t)| *t != ticket);
        self.timers.len() != before
    }

    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::Scheduled { ticket, delay } => self.schedule(*ticket, *delay),
            Event::Cancelled { ticket } => {
                self.cancel(*ticket);
            }
            _ => {}
        }
    }

    /// Moves the clock forward and returns the tickets that fell due, earliest
    /// deadline first.
    pub fn advance(&mut self, by: Duration) -> Vec<Ticket> {
        self.now += by;
        let now = self.now;

        let mut due: Vec<(Duration, Ticket)> =
            self.timers.iter().copied().filter(|(at, _)| *at <= now).collect();
        self.timers.retain(|(at, _)| *at > now);
        due.sort();
        due.into_iter().map(|(_, ticket)| ticket).collect()
    }

    /// Time left until the earliest timer fires.
    pub fn next_due(&self) -> Option<Duration> {
        self.timers.iter().map(|(at, _)| at.saturating_sub(self.now)).min()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_only_honours_latest_ticket() {
        let mut slot = Slot::default();
        let (first, replaced) = slot.schedule(Continuation::ComputerReply);
        assert!(replaced.is_none());

        let (second, replaced) = slot.schedule(Continuation::NextLine);
        assert_eq!(replaced, Some(first));
        assert!(slot.take(first).is_none());
        assert_eq!(slot.take(second), Some(Continuation::NextLine));
        assert!(slot.take(second).is_none());

        let (third, _) = slot.schedule(Continuation::OpeningMove);
        assert_eq!(slot.cancel(), Some(third));
        assert!(slot.take(third).is_none());
        assert!(slot.pending().is_none());
    }

    #[test]
    fn queue_fires_in_deadline_order() {
        let mut slot = Slot::default();
        let (a, _) = slot.schedule(Continuation::ComputerReply);
        let (b, _) = slot.schedule(Continuation::ComputerReply);
        let (c, _) = slot.schedule(Continuation::ComputerReply);

        let mut queue = TimerQueue::new();
        queue.schedule(a, Duration::from_millis(300));
        queue.schedule(b, Duration::from_millis(100));
        queue.schedule(c, Duration::from_millis(200));
        assert_eq!(queue.next_due(), Some(Duration::from_millis(100)));

        assert!(queue.advance(Duration::from_millis(50)).is_empty());
        assert!(queue.cancel(c));
        assert!(!queue.cancel(c));
        assert_eq!(queue.advance(Duration::from_millis(500)), [b, a]);
        assert!(queue.is_empty());
        assert_eq!(queue.next_due(), None);
    }
}
