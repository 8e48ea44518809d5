use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ipc::Envelope;
use crate::models::{CloseRoomReply, ControlMessage, OpenRoomReply};
use crate::worker::DocumentWorker;

/// Answer orchestrator requests until the control channel goes away.
pub async fn serve_control(worker: Arc<DocumentWorker>, mut requests: mpsc::UnboundedReceiver<Envelope<ControlMessage>>) {
    while let Some(envelope) = requests.recv().await {
        let worker = worker.clone();
        tokio::spawn(async move { handle_control(&worker, envelope).await });
    }
    debug!("Control channel of worker {} closed", worker.id());
}

async fn handle_control(worker: &DocumentWorker, envelope: Envelope<ControlMessage>) {
    let reply = match envelope.message {
        ControlMessage::OpenRoomRequest(request) => match worker.open_room(&request.doc_id).await {
            Ok(placement) => ControlMessage::OpenRoomReply(OpenRoomReply {
                success: true,
                placement: Some(placement),
            }),
            Err(e) => {
                warn!("Worker {} could not open {}: {}", worker.id(), request.doc_id, e);
                ControlMessage::OpenRoomReply(OpenRoomReply {
                    success: false,
                    placement: None,
                })
            }
        },
        ControlMessage::CloseRoomRequest(request) => ControlMessage::CloseRoomReply(CloseRoomReply {
            success: worker.close_room(&request.doc_id).await,
        }),
        other => {
            debug!("Worker {} ignoring control message {:?}", worker.id(), other);
            return;
        }
    };

    let Some(id) = envelope.id else {
        return;
    };
    if let Err(e) = worker.control().respond(reply, id) {
        warn!("Worker {} failed to reply to request {}: {}", worker.id(), id, e);
    }
}
