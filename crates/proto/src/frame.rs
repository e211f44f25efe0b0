//! Length-prefixed JSON frame codec.
//!
//! Each frame is a little-endian `u32` body length followed by that many bytes
//! of JSON. Frames larger than [`MAX_FRAME_LEN`] are refused on both sides.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body in bytes.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
	/// Underlying stream failed or closed mid-frame.
	#[error("frame i/o: {0}")]
	Io(#[from] std::io::Error),
	/// Declared or encoded body exceeds [`MAX_FRAME_LEN`].
	#[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
	TooLarge(usize),
	/// Body is not valid JSON for the expected type.
	#[error("malformed frame body: {0}")]
	Json(#[from] serde_json::Error),
}

impl FrameError {
	/// Returns true when the peer closed the stream before a frame header arrived.
	#[must_use]
	pub fn is_eof(&self) -> bool {
		matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
	}
}

/// Encodes `value` and writes it as one frame, then flushes.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] without writing anything if the encoded
/// body exceeds [`MAX_FRAME_LEN`], or an I/O error from the writer.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
	W: AsyncWrite + Unpin,
	T: Serialize + ?Sized,
{
	let body = serde_json::to_vec(value)?;
	if body.len() > MAX_FRAME_LEN {
		return Err(FrameError::TooLarge(body.len()));
	}
	let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len()))?;
	writer.write_u32_le(len).await?;
	writer.write_all(&body).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads one frame and decodes its body.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] before allocating if the header declares an
/// oversized body, an I/O error if the stream ends early, or a JSON error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
	R: AsyncRead + Unpin,
	T: DeserializeOwned,
{
	let len = reader.read_u32_le().await? as usize;
	if len > MAX_FRAME_LEN {
		return Err(FrameError::TooLarge(len));
	}
	let mut body = vec![0u8; len];
	reader.read_exact(&mut body).await?;
	Ok(serde_json::from_slice(&body)?)
}
