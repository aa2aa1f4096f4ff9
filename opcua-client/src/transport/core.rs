use std::{collections::HashMap, sync::Arc};

use opcua_core::{
    comms::{
        buffer::SendBuffer,
        chunker::Chunker,
        message_chunk::{MessageChunk, MessageIsFinalType},
        secure_channel::SecureChannel,
        tcp_codec::Message,
    },
    sync::RwLock,
    trace_read_lock, trace_write_lock, RequestMessage, ResponseMessage,
};
use opcua_types::StatusCode;

/// Outcome of a single poll of a [`super::connect::Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPollResult {
    /// An outgoing message was handed to the send buffer, but nothing was written yet.
    OutgoingMessage,
    /// Bytes from the send buffer were written to the socket.
    OutgoingMessageSent,
    /// A complete incoming message was processed.
    IncomingMessage,
    /// A single outgoing request failed without bringing down the transport.
    RecoverableError(StatusCode),
    /// The transport is finished; no further polling should happen.
    Closed(StatusCode),
}

/// A request queued to be sent over the wire, paired with the channel its response (if any)
/// should be delivered on.
pub(crate) struct OutgoingMessage {
    pub request: RequestMessage,
    pub response_tx: tokio::sync::oneshot::Sender<Result<ResponseMessage, StatusCode>>,
}

struct PendingRequest {
    response_tx: tokio::sync::oneshot::Sender<Result<ResponseMessage, StatusCode>>,
    chunks: Vec<MessageChunk>,
}

/// Routes outgoing requests into the send buffer and reassembles incoming chunks into
/// responses, matching them back up with the request that's waiting for them.
pub(crate) struct TransportState {
    pub(crate) secure_channel: Arc<RwLock<SecureChannel>>,
    outgoing_recv: tokio::sync::mpsc::Receiver<OutgoingMessage>,
    pending: HashMap<u32, PendingRequest>,
    max_pending_incoming: usize,
    next_request_id: u32,
}

impl TransportState {
    pub(crate) fn new(
        secure_channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: tokio::sync::mpsc::Receiver<OutgoingMessage>,
        max_pending_incoming: usize,
        _recv_buffer_size: usize,
    ) -> Self {
        Self {
            secure_channel,
            outgoing_recv,
            pending: HashMap::new(),
            max_pending_incoming,
            next_request_id: 1,
        }
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Wait for the next outgoing request, encode it into the send buffer, and register it
    /// as pending a response. Returns the request (so the caller can detect e.g.
    /// `CloseSecureChannel`) and the request id it was assigned, or an encoding error if the
    /// message could not be placed in the send buffer.
    pub(crate) async fn wait_for_outgoing_message(
        &mut self,
        send_buffer: &mut SendBuffer,
    ) -> Option<Result<(RequestMessage, u32), StatusCode>> {
        let outgoing = self.outgoing_recv.recv().await?;
        let request_id = self.next_request_id();

        let secure_channel = trace_read_lock!(self.secure_channel);
        if let Err(e) = send_buffer.write(request_id, outgoing.request.clone(), &secure_channel) {
            let _ = outgoing.response_tx.send(Err(e.status));
            return Some(Err(e.status));
        }

        self.pending.insert(
            request_id,
            PendingRequest {
                response_tx: outgoing.response_tx,
                chunks: Vec::new(),
            },
        );

        Some(Ok((outgoing.request, request_id)))
    }

    /// Handle a message decoded off the wire by the TCP codec.
    pub(crate) fn handle_incoming_message(&mut self, message: Message) -> Result<(), StatusCode> {
        let chunk = match message {
            Message::Chunk(chunk) => chunk,
            Message::Acknowledge(_) => {
                return Err(StatusCode::BadTcpMessageTypeInvalid);
            }
            Message::Error(err) => {
                return Err(StatusCode(err.error));
            }
        };

        let decrypted = {
            let mut secure_channel = trace_write_lock!(self.secure_channel);
            secure_channel
                .verify_and_remove_security(&chunk.data)
                .map_err(|e| e.status)?
        };

        let (request_id, is_final) = {
            let secure_channel = trace_write_lock!(self.secure_channel);
            let info = decrypted
                .chunk_info(&secure_channel)
                .map_err(|e| e.status)?;
            (
                info.sequence_header.request_id,
                info.message_header.is_final,
            )
        };

        let Some(pending) = self.pending.get_mut(&request_id) else {
            // Response to a request we're no longer tracking (e.g. already timed out).
            return Ok(());
        };

        if self.max_pending_incoming > 0 && pending.chunks.len() >= self.max_pending_incoming {
            let pending = self.pending.remove(&request_id).unwrap();
            let _ = pending
                .response_tx
                .send(Err(StatusCode::BadResponseTooLarge));
            return Err(StatusCode::BadResponseTooLarge);
        }

        pending.chunks.push(decrypted);

        if is_final == MessageIsFinalType::Final {
            let pending = self.pending.remove(&request_id).unwrap();
            let secure_channel = trace_write_lock!(self.secure_channel);
            let result = Chunker::validate_chunks(0, &secure_channel, &pending.chunks)
                .and_then(|_| Chunker::decode::<ResponseMessage>(&pending.chunks, &secure_channel, None))
                .map_err(|e| e.status);
            let _ = pending.response_tx.send(result);
        }

        Ok(())
    }

    /// Close the transport, flushing any remaining work. There's nothing stateful left to
    /// flush once the socket closes, so this just resolves every pending request with the
    /// final status.
    pub(crate) async fn close(&mut self, status: StatusCode) -> StatusCode {
        for (_, pending) in self.pending.drain() {
            let _ = pending.response_tx.send(Err(status));
        }
        status
    }
}
