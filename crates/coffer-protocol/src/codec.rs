//! Length-prefixed framing over an async byte stream.
//!
//! Each frame is a u32 little-endian body length followed by the body
//! (an encoded [`Command`](crate::Command) or [`Reply`](crate::Reply)).
//! The length is bounded so a corrupt or hostile peer can't make us
//! allocate unbounded memory.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body. Documents are capped well below this by the
/// boundary layer; the limit here is a transport guard, not a product limit.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit", body.len()),
        ));
    }
    writer.write_u32_le(body.len() as u32).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

/// Reads one frame body. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, b"hello").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();

        let first = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(&first[..], b"hello");
        let second = read_frame(&mut server).await.unwrap().unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn clean_close_reads_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // hand-write a length header beyond the limit
        client.write_u32_le((MAX_FRAME_SIZE + 1) as u32).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32_le(10).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        assert!(read_frame(&mut server).await.is_err());
    }
}
