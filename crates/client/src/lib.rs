//! Optimistic client synchronisation for the roster collection service.
//!
//! A [`SyncController`] keeps a windowed mirror of the shared collection.
//! Edits apply to the mirror at once and are sent in debounced batches; a
//! failed batch is rolled back, and batches committed by other clients arrive
//! through a background long-poll loop.
//!
//! ```no_run
//! # async fn demo() -> Result<(), roster_client::SyncError> {
//! use std::sync::Arc;
//!
//! use roster_client::{SyncConfig, SyncController, TcpTransport};
//! use roster_proto::WindowRange;
//!
//! let transport = Arc::new(TcpTransport::new("127.0.0.1:4000".parse().unwrap()));
//! let sync = SyncController::start(transport, SyncConfig::default());
//! sync.mount_window(WindowRange::new(0, 20)).await?;
//! sync.move_record(7, 2).await?;
//! println!("{}", sync.status());
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
mod poller;
pub mod session;
pub mod status;
pub mod transport;

pub use config::SyncConfig;
pub use controller::{SyncController, SyncHandle};
pub use error::{SyncError, TransportError};
pub use session::SyncSession;
pub use status::SyncStatus;
pub use transport::{TcpTransport, Transport};
