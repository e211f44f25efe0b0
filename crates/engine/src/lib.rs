//! Ordered-collection mutation engine.
//!
//! Applies [`Action`](roster_proto::Action)s to either the authoritative
//! [`OrderedCollection`] or a client's [`WindowSet`] mirror, keeping positions
//! dense and every mutation all-or-nothing.
//!
//! # Invariants
//!
//! - After any successful action the records of a collection of size N hold
//!   exactly the positions `0..N`, each once.
//! - Failed actions, and batches containing one, mutate nothing.
//! - A windowed move keeps every window's length; records crossing a boundary
//!   are borrowed from the adjacent window in the direction of the shift.
#![warn(missing_docs)]

pub mod collection;
pub mod error;
pub mod reorder;
pub mod window;

pub use collection::OrderedCollection;
pub use error::{CascadeDirection, ReadError, ReorderError};
pub use reorder::{Reorder, footprint, invert, invert_batch, overlaps};
pub use window::{Coverage, Window, WindowSet};
