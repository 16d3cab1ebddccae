//! # procon-events
//!
//! Change notifications delivered by resource stores.
//!
//! ## Design Principles
//!
//! - A watch is a lazy, unbounded sequence of events for one resource kind;
//!   restarting it after a disconnect is the store's concern
//! - Every event carries the full object as observed after the change (or
//!   the last known state for deletions)
//! - Consumers only need the key to schedule work, so the envelope exposes
//!   it without touching the payload
//!
//! ## Event Types
//!
//! - `Added`: the object was created
//! - `Modified`: spec, metadata or status changed
//! - `Deleted`: the object was removed

mod envelope;

pub use envelope::*;
