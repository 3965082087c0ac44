//! Newline-delimited JSON framing over byte streams
//!
//! Used when the worker lives in another process: each message is one JSON
//! document on its own line. Malformed lines are logged and dropped; the
//! stream keeps going.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::channel::{Endpoint, Outbox};
use super::Message;

/// Background tasks pumping a framed transport
pub struct FramedTransport {
    pub reader: JoinHandle<()>,
    pub writer: JoinHandle<()>,
    cancel: CancellationToken,
}

impl FramedTransport {
    /// Stop both pumps. Messages already queued for writing may be lost.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Wrap a reader/writer pair as an [`Endpoint`].
///
/// Incoming lines are decoded into the endpoint's inbox; messages sent on the
/// endpoint's outbox are encoded and written in order. The inbox closes when
/// the reader hits EOF or the transport is cancelled.
pub fn connect<R, W>(reader: R, writer: W, cancel: CancellationToken) -> (Endpoint, FramedTransport)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(read_loop(reader, inbound_tx, cancel.clone()));
    let writer = tokio::spawn(write_loop(writer, outbound_rx, cancel.clone()));

    let endpoint = Endpoint {
        outbox: Outbox::new(outbound_tx),
        inbox: inbound_rx,
    };

    (
        endpoint,
        FramedTransport {
            reader,
            writer,
            cancel,
        },
    )
}

async fn read_loop<R>(reader: R, inbound: mpsc::UnboundedSender<Message>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Message::decode(&line) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            debug!("inbox dropped, stopping reader");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding malformed frame"),
                }
            }
            Ok(None) => {
                debug!("transport reached EOF");
                break;
            }
            Err(e) => {
                warn!(error = %e, "transport read failed");
                break;
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = outbound.recv() => message,
        };

        let Some(message) = message else {
            break;
        };

        let mut line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, name = message.name(), "failed to encode message");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "transport write failed");
            break;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "transport flush failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handle;

    #[tokio::test]
    async fn test_messages_cross_a_duplex_pipe() {
        let (a, b) = tokio::io::duplex(1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);

        let (left, _left_io) = connect(a_read, a_write, CancellationToken::new());
        let (mut right, _right_io) = connect(b_read, b_write, CancellationToken::new());

        left.outbox.send(Message::bind(Handle(2), "notes")).unwrap();
        left.outbox.send(Message::output(Handle(2), b"ok")).unwrap();

        assert_eq!(
            right.inbox.recv().await.unwrap(),
            Message::bind(Handle(2), "notes")
        );
        assert_eq!(
            right.inbox.recv().await.unwrap(),
            Message::output(Handle(2), b"ok")
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (mut raw, peer) = tokio::io::duplex(1024);
        let (peer_read, peer_write) = tokio::io::split(peer);
        let (mut endpoint, _io) = connect(peer_read, peer_write, CancellationToken::new());

        raw.write_all(b"not json\n\n{\"name\":\"run\",\"payload\":\"done\"}\n")
            .await
            .unwrap();

        assert_eq!(
            endpoint.inbox.recv().await.unwrap(),
            Message::Run(Some("done".to_string()))
        );
    }

    #[tokio::test]
    async fn test_eof_closes_inbox() {
        let (raw, peer) = tokio::io::duplex(64);
        let (peer_read, peer_write) = tokio::io::split(peer);
        let (mut endpoint, _io) = connect(peer_read, peer_write, CancellationToken::new());

        drop(raw);
        assert!(endpoint.inbox.recv().await.is_none());
    }
}
