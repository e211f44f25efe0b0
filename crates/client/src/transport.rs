//! Server transport abstraction.

use std::net::SocketAddr;

use async_trait::async_trait;
use roster_proto::{
	Action, ClientId, Record, Request, Response, ResponsePayload, WindowRange, read_frame,
	write_frame,
};
use tokio::net::TcpStream;

use crate::error::TransportError;

/// Requests a [`SyncController`](crate::SyncController) makes of the server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Submits a batch for authoritative application.
	async fn submit(&self, client: ClientId, actions: Vec<Action>) -> Result<(), TransportError>;

	/// Long-polls for actions committed by other clients. Empty on hold timeout.
	async fn poll(&self, client: ClientId) -> Result<Vec<Action>, TransportError>;

	/// Reads the records currently at `range`.
	async fn read_window(&self, range: WindowRange) -> Result<Vec<Record>, TransportError>;
}

/// [`Transport`] over the TCP frame protocol, one connection per request.
#[derive(Debug, Clone)]
pub struct TcpTransport {
	addr: SocketAddr,
}

impl TcpTransport {
	/// Creates a transport talking to the server at `addr`.
	pub fn new(addr: SocketAddr) -> Self {
		Self { addr }
	}

	async fn exchange(&self, request: &Request) -> Result<ResponsePayload, TransportError> {
		let mut stream = TcpStream::connect(self.addr)
			.await
			.map_err(TransportError::Connect)?;
		write_frame(&mut stream, request).await?;
		let response: Response = read_frame(&mut stream).await?;
		response.map_err(TransportError::Remote)
	}
}

#[async_trait]
impl Transport for TcpTransport {
	async fn submit(&self, client: ClientId, actions: Vec<Action>) -> Result<(), TransportError> {
		let request = Request::Submit {
			client_id: client,
			actions,
		};
		match self.exchange(&request).await? {
			ResponsePayload::Submitted => Ok(()),
			_ => Err(TransportError::UnexpectedResponse),
		}
	}

	async fn poll(&self, client: ClientId) -> Result<Vec<Action>, TransportError> {
		match self.exchange(&Request::Poll { client_id: client }).await? {
			ResponsePayload::Notified { actions } => Ok(actions),
			_ => Err(TransportError::UnexpectedResponse),
		}
	}

	async fn read_window(&self, range: WindowRange) -> Result<Vec<Record>, TransportError> {
		let request = Request::Read {
			range: Some(range),
			search: None,
		};
		match self.exchange(&request).await? {
			ResponsePayload::Window { records } => Ok(records),
			_ => Err(TransportError::UnexpectedResponse),
		}
	}
}
