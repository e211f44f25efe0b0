//! Authoritative roster collection service.
//!
//! The [`service::CollectionService`] actor owns the ordered collection and the
//! [`crate::core::ChangeBroker`]; [`ipc::serve`] exposes it over TCP.
#![warn(missing_docs)]

pub mod core;
pub mod ipc;
pub mod service;

pub use crate::core::{BrokerConfig, ChangeBroker, NotifyReport};
pub use service::{CollectionHandle, CollectionService};
