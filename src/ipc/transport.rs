//! Byte-stream and in-memory transports for [`MessageChannel`].
//!
//! Control traffic between the orchestrator and its workers is one JSON
//! envelope per line over the child's stdin/stdout.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::ChannelError;
use crate::ipc::channel::{Envelope, MessageChannel};

/// Build a channel whose envelopes are written to `writer` as JSON lines.
pub fn line_channel<M, W>(writer: W) -> MessageChannel<M>
where
    M: Serialize + Clone + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);
        while let Some(line) = rx.recv().await {
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            };
            if let Err(e) = written.await {
                error!("Control pipe write failed: {}", e);
                break;
            }
        }
    });

    MessageChannel::new(move |envelope: Envelope<M>| {
        let line = serde_json::to_string(&envelope).map_err(|e| ChannelError::Encode(e.to_string()))?;
        tx.send(line).map_err(|_| ChannelError::Disconnected)
    })
}

/// Read JSON lines from `reader` into `channel` until end of stream.
pub async fn pump_lines<M, R>(reader: R, channel: &MessageChannel<M>) -> std::io::Result<()>
where
    M: DeserializeOwned + Clone + Send + 'static,
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope<M>>(&line) {
            Ok(envelope) => channel.receive(envelope),
            Err(e) => warn!("Dropping malformed control message: {}", e),
        }
    }
    Ok(())
}

/// Two channels wired back to back in memory.
pub fn duplex_pair<M>() -> (MessageChannel<M>, MessageChannel<M>)
where
    M: Clone + Send + 'static,
{
    let (a_tx, a_rx) = mpsc::unbounded_channel::<Envelope<M>>();
    let (b_tx, b_rx) = mpsc::unbounded_channel::<Envelope<M>>();

    let a = MessageChannel::new(move |env| a_tx.send(env).map_err(|_| ChannelError::Disconnected));
    let b = MessageChannel::new(move |env| b_tx.send(env).map_err(|_| ChannelError::Disconnected));

    tokio::spawn(deliver(a_rx, b.clone()));
    tokio::spawn(deliver(b_rx, a.clone()));
    (a, b)
}

async fn deliver<M>(mut rx: mpsc::UnboundedReceiver<Envelope<M>>, to: MessageChannel<M>)
where
    M: Clone + Send + 'static,
{
    while let Some(envelope) = rx.recv().await {
        to.receive(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloseRoomReply, CloseRoomRequest, ControlMessage, WorkerStarted};
    use std::time::Duration;

    #[tokio::test]
    async fn request_round_trips_over_a_pipe() {
        let (orchestrator_end, worker_end) = tokio::io::duplex(4096);
        let (orchestrator_read, orchestrator_write) = tokio::io::split(orchestrator_end);
        let (worker_read, worker_write) = tokio::io::split(worker_end);

        let orchestrator: MessageChannel<ControlMessage> = line_channel(orchestrator_write);
        let worker: MessageChannel<ControlMessage> = line_channel(worker_write);

        {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { pump_lines(orchestrator_read, &orchestrator).await });
        }
        {
            let worker = worker.clone();
            tokio::spawn(async move { pump_lines(worker_read, &worker).await });
        }

        let mut requests = worker.subscribe();
        let mut events = orchestrator.subscribe();
        tokio::spawn(async move {
            while let Some(env) = requests.recv().await {
                if let (Some(id), ControlMessage::CloseRoomRequest(_)) = (env.id, &env.message) {
                    worker
                        .respond(ControlMessage::CloseRoomReply(CloseRoomReply { success: true }), id)
                        .unwrap();
                    worker.notify(ControlMessage::WorkerStarted(WorkerStarted {})).unwrap();
                }
            }
        });

        let reply = orchestrator
            .request(
                ControlMessage::CloseRoomRequest(CloseRoomRequest { doc_id: "d".to_string() }),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(reply, Some(ControlMessage::CloseRoomReply(CloseRoomReply { success: true })));

        let event = events.recv().await.unwrap();
        assert_eq!(event, Envelope::new(ControlMessage::WorkerStarted(WorkerStarted {})));
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let input: &[u8] = b"not json\n\n{\"message\":{\"type\":\"workerStarted\"}}\n";
        let channel: MessageChannel<ControlMessage> = MessageChannel::new(|_| Ok(()));
        let mut events = channel.subscribe();

        pump_lines(input, &channel).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.message, ControlMessage::WorkerStarted(WorkerStarted {}));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplex_pair_correlates_replies() {
        let (a, b) = duplex_pair::<ControlMessage>();
        let mut incoming = b.subscribe();
        tokio::spawn(async move {
            let env = incoming.recv().await.unwrap();
            b.respond(ControlMessage::CloseRoomReply(CloseRoomReply { success: false }), env.id.unwrap())
                .unwrap();
        });

        let reply = a
            .request(
                ControlMessage::CloseRoomRequest(CloseRoomRequest { doc_id: "x".to_string() }),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply, Some(ControlMessage::CloseRoomReply(CloseRoomReply { success: false })));
    }
}
