//! Roster collection server binary.
//!
//! Holds one in-memory ordered collection, applies submitted action batches
//! and notifies long-polling clients of each other's changes.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use roster_broker::{BrokerConfig, CollectionService};
use roster_engine::OrderedCollection;
use roster_proto::{Record, RecordId};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "roster-server")]
#[command(about = "Shared ordered collection with long-poll change notification")]
struct Args {
	/// Address to listen on
	#[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:4000")]
	listen: SocketAddr,

	/// Number of placeholder records to seed
	#[arg(short, long, default_value_t = 1000)]
	records: u64,

	/// Grace period before an idle subscription is evicted, in milliseconds
	#[arg(long, default_value_t = 5000)]
	grace_ms: u64,

	/// Longest time a poll is held open, in seconds
	#[arg(long, default_value_t = 60)]
	hold_secs: u64,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.finish();

	tracing::subscriber::set_global_default(subscriber)?;

	info!(records = args.records, "starting roster-server");

	let collection = OrderedCollection::new(seed(args.records));
	let config = BrokerConfig {
		eviction_grace: Duration::from_millis(args.grace_ms),
		poll_hold: Duration::from_secs(args.hold_secs),
	};
	let handle = CollectionService::start(collection, config);

	let listener = TcpListener::bind(args.listen).await?;
	let shutdown = CancellationToken::new();

	let ctrl_c = shutdown.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				info!("interrupt received");
				ctrl_c.cancel();
			}
			Err(e) => tracing::warn!(error = %e, "cannot listen for interrupt"),
		}
	});

	roster_broker::ipc::serve(listener, handle, shutdown).await?;

	Ok(())
}

/// Placeholder records; real display data comes from an external source.
fn seed(count: u64) -> impl Iterator<Item = Record> {
	(1..=count).map(|id| {
		Record::new(RecordId(id), 0).with_fields(serde_json::json!({
			"name": format!("Record {id}"),
		}))
	})
}
