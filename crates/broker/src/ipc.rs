//! TCP front end for the collection service.
//!
//! Each connection carries exactly one request frame and one response frame.
//! While a request is pending the read half is watched; if the client hangs
//! up the request future is dropped, which closes an abandoned long poll.

use roster_proto::{
	ErrorCode, FrameError, Request, Response, ResponsePayload, read_frame, write_frame,
};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::service::CollectionHandle;

/// Serves collection requests on `listener` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(
	listener: TcpListener,
	handle: CollectionHandle,
	shutdown: CancellationToken,
) -> std::io::Result<()> {
	tracing::info!(addr = %listener.local_addr()?, "collection server listening");

	loop {
		tokio::select! {
			_ = shutdown.cancelled() => {
				tracing::info!("collection server shutting down");
				break;
			}
			res = listener.accept() => {
				match res {
					Ok((stream, peer)) => {
						tracing::debug!(%peer, "connection accepted");
						tokio::spawn(handle_connection(stream, handle.clone()));
					}
					Err(e) => {
						tracing::error!(error = %e, "failed to accept connection");
					}
				}
			}
		}
	}

	Ok(())
}

/// Handles one request/response exchange.
pub(crate) async fn handle_connection(stream: TcpStream, handle: CollectionHandle) {
	let (mut reader, mut writer) = stream.into_split();

	let request: Request = match read_frame(&mut reader).await {
		Ok(request) => request,
		Err(e) if e.is_eof() => return,
		Err(e) => {
			tracing::debug!(error = %e, "unreadable request");
			let code = match e {
				FrameError::Io(_) => return,
				FrameError::TooLarge(_) | FrameError::Json(_) => ErrorCode::InvalidRequest,
			};
			let response: Response = Err(code);
			let _ = write_frame(&mut writer, &response).await;
			return;
		}
	};

	let response = tokio::select! {
		response = dispatch(&handle, request) => response,
		_ = wait_for_hangup(&mut reader) => {
			tracing::debug!("client hung up before the response");
			return;
		}
	};

	if let Err(e) = write_frame(&mut writer, &response).await {
		tracing::debug!(error = %e, "failed to write response");
	}
}

async fn dispatch(handle: &CollectionHandle, request: Request) -> Response {
	match request {
		Request::Poll { client_id } => handle
			.poll(client_id)
			.await
			.map(|actions| ResponsePayload::Notified { actions }),
		Request::Submit { client_id, actions } => handle
			.submit(client_id, actions)
			.await
			.map(|()| ResponsePayload::Submitted),
		Request::Read { range, search } => handle
			.read(range, search)
			.await
			.map(|records| ResponsePayload::Window { records }),
	}
}

/// Resolves once the peer closes its write side or the socket fails.
async fn wait_for_hangup(reader: &mut OwnedReadHalf) {
	let mut buf = [0u8; 64];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) | Err(_) => return,
			Ok(_) => continue,
		}
	}
}
