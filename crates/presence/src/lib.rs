//! Presence Tracker
//!
//! Follows whether a face is in frame. The first face-less frame starts an
//! absence: a one-shot deadline that ends the session and a 1 Hz tick for
//! the "you've been away" display. Both timers belong to the tracker, and
//! every transition cancels whatever it held before scheduling anything
//! new. Timer tasks report back over a channel; each event carries the
//! epoch it was scheduled in, so an event that raced a cancellation is
//! recognised as stale and ignored.

mod tracker;

pub use tracker::{
    PresenceChange, PresenceConfig, PresenceSignal, PresenceState, PresenceTracker, TimerEvent,
    TimerKind,
};
