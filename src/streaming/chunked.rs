//! HTTP/1.1 chunked transfer framing.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Final chunk closing a chunked body.
pub const TERMINATOR: &[u8] = b"0\r\n\r\n";

/// Write one chunk: hex length, CRLF, payload, CRLF.
///
/// Empty payloads are skipped, since a zero-length chunk ends the body.
pub async fn write_chunk<W>(sink: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if data.is_empty() {
        return Ok(());
    }
    let header = format!("{:x}\r\n", data.len());
    sink.write_all(header.as_bytes()).await?;
    sink.write_all(data).await?;
    sink.write_all(b"\r\n").await
}

/// Write the terminating chunk and flush.
pub async fn write_terminator<W>(sink: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    sink.write_all(TERMINATOR).await?;
    sink.flush().await
}

/// Bytes on the wire for a chunk carrying `len` payload bytes.
pub fn framed_len(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    format!("{len:x}").len() + len + 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_payload_with_hex_length() {
        let mut out: Vec<u8> = Vec::new();
        write_chunk(&mut out, &[b'x'; 26]).await.unwrap();
        let mut expected = b"1a\r\n".to_vec();
        expected.extend_from_slice(&[b'x'; 26]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(out, expected);
        assert_eq!(framed_len(26), out.len());
    }

    #[tokio::test]
    async fn empty_payload_writes_nothing() {
        let mut out: Vec<u8> = Vec::new();
        write_chunk(&mut out, b"").await.unwrap();
        assert!(out.is_empty());
        assert_eq!(framed_len(0), 0);
    }

    #[tokio::test]
    async fn terminator_closes_body() {
        let mut out: Vec<u8> = Vec::new();
        write_chunk(&mut out, b"hello").await.unwrap();
        write_terminator(&mut out).await.unwrap();
        assert_eq!(out, b"5\r\nhello\r\n0\r\n\r\n");
    }
}
