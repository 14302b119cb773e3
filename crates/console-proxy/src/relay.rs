//! Bidirectional byte relay between a WebSocket and the console socket.
//!
//! Each direction runs as its own task. The first direction to stop ends the
//! session: the other task is aborted and both halves are closed.
//!
//! The client read deadline is an idle timeout. It restarts with every
//! client message instead of bounding the session as a whole.

use std::io;
use std::time::Duration;

use futures::Sink;
use futures::SinkExt;
use futures::Stream;
use futures::StreamExt;
use poem::web::websocket::Message;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinError;
use tracing::trace;

/// Largest chunk read from the console socket per WebSocket message.
pub const CHUNK_SIZE: usize = 8192;

/// Why one direction of a session stopped.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("console socket closed")]
    SocketClosed,
    #[error("console socket read failed: {0}")]
    SocketRead(#[source] io::Error),
    #[error("console socket write failed: {0}")]
    SocketWrite(#[source] io::Error),
    #[error("websocket closed by client")]
    StreamClosed,
    #[error("websocket receive failed: {0}")]
    StreamRead(#[source] io::Error),
    #[error("websocket send failed: {0}")]
    StreamWrite(#[source] io::Error),
    #[error("no client input for {0:?}")]
    IdleTimeout(Duration),
    #[error("relay task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Direction {
    #[display("socket->websocket")]
    SocketToStream,
    #[display("websocket->socket")]
    StreamToSocket,
}

/// Forward console output to the client as binary messages until either
/// side fails, then close the sink.
pub async fn socket_to_stream<R, Si>(mut reader: R, mut sink: Si) -> RelayError
where
    R: AsyncRead + Unpin,
    Si: Sink<Message, Error = io::Error> + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let reason = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break RelayError::SocketClosed,
            Ok(n) => {
                trace!(bytes = n, "console -> client");
                if let Err(e) = sink.send(Message::Binary(buf[..n].to_vec())).await {
                    break RelayError::StreamWrite(e);
                }
            }
            Err(e) => break RelayError::SocketRead(e),
        }
    };
    let _ = sink.close().await;
    reason
}

/// Write the payload of every binary client message to the console socket.
///
/// Text and control frames carry no console input and are dropped. Each wait
/// for the next message is bounded by `idle_timeout`.
pub async fn stream_to_socket<St, W>(mut stream: St, mut writer: W, idle_timeout: Duration) -> RelayError
where
    St: Stream<Item = io::Result<Message>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let reason = loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            break RelayError::IdleTimeout(idle_timeout);
        };
        match next {
            None | Some(Ok(Message::Close(_))) => break RelayError::StreamClosed,
            Some(Err(e)) => break RelayError::StreamRead(e),
            Some(Ok(Message::Binary(data))) => {
                trace!(bytes = data.len(), "client -> console");
                if let Err(e) = writer.write_all(&data).await {
                    break RelayError::SocketWrite(e);
                }
            }
            Some(Ok(other)) => trace!(?other, "dropping non-binary message"),
        }
    };
    let _ = writer.shutdown().await;
    reason
}

/// Run both directions until the first one stops.
///
/// Returns the direction that stopped first together with its reason. The
/// other direction has been aborted and awaited by the time this returns.
pub async fn relay<Si, St, S>(
    sink: Si,
    stream: St,
    socket: S,
    idle_timeout: Duration,
) -> (Direction, RelayError)
where
    Si: Sink<Message, Error = io::Error> + Send + Unpin + 'static,
    St: Stream<Item = io::Result<Message>> + Send + Unpin + 'static,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(socket);
    let mut upstream = tokio::spawn(socket_to_stream(reader, sink));
    let mut downstream = tokio::spawn(stream_to_socket(stream, writer, idle_timeout));

    tokio::select! {
        result = &mut upstream => {
            downstream.abort();
            let _ = downstream.await;
            (Direction::SocketToStream, result.unwrap_or_else(RelayError::from))
        }
        result = &mut downstream => {
            upstream.abort();
            let _ = upstream.await;
            (Direction::StreamToSocket, result.unwrap_or_else(RelayError::from))
        }
    }
}
