//! Write helpers for the fake server.
//!
//! Every write is flushed at once so a client blocked on a literal or
//! a tagged completion sees it immediately.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
#[cfg(test)]
use tokio::io::{AsyncReadExt, DuplexStream};

/// Send protocol text.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    write_bytes(stream, line.as_bytes()).await
}

/// Send literal bytes, e.g. a message body after `{len}`.
pub async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    let inner = stream.get_mut();
    inner.write_all(data).await?;
    inner.flush().await
}

/// An in-memory connection for handler tests: the server half a
/// handler writes into, and the client half to read it back from.
/// The buffer holds a whole response, so handlers never block.
#[cfg(test)]
pub fn pipe() -> (BufReader<DuplexStream>, DuplexStream) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (BufReader::new(server), client)
}

/// Everything the client received, once the server half is dropped.
#[cfg(test)]
pub async fn received(mut client: DuplexStream) -> String {
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}
