//! Bounded Ring Buffer
//!
//! Keeps the most recent N items. Pushing into a full ring evicts the
//! oldest item; iteration and indexing are newest-first.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
