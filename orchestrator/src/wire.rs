//! # Wire Framing
//!
//! Length-prefixed frame I/O shared by two transports: the Supervisor's
//! client-facing socket and the Supervisor-to-worker
//! process transport, which reuses the identical `HEADER_SIZE`-byte
//! big-endian length prefix + UTF-8 JSON body framing over the worker's
//! stdio pipes instead of a TCP socket. One framing implementation, two
//! call sites — the shape the protocol module's doc comment anticipates.

use orchestrator_domain::protocol::HEADER_SIZE;
use orchestrator_domain::OrchestratorError;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes one length-prefixed JSON frame.
pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, value: &T) -> Result<(), OrchestratorError> {
    let body = serde_json::to_vec(value)?;
    if body.len() > u32::MAX as usize {
        return Err(OrchestratorError::invalid_payload("frame body too large"));
    }
    let len = (body.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed JSON frame. Returns `Ok(None)` on a clean
/// EOF before any bytes of the next frame arrive (peer closed).
pub async fn read_frame<R: AsyncRead + Unpin, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, OrchestratorError> {
    let mut len_buf = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let value = serde_json::from_slice(&body)?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::value_objects::RequestId;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        request_id: RequestId,
        payload: String,
    }

    #[tokio::test]
    async fn test_write_then_read_frame_roundtrips() {
        let sample = Sample { request_id: RequestId::new(), payload: "hello".to_string() };
        let mut buf = Vec::new();
        write_frame(&mut buf, &sample).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let back: Sample = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(back, sample);
    }

    #[tokio::test]
    async fn test_read_frame_returns_none_on_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result: Option<Sample> = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }
}
