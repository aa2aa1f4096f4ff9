// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Client-side outgoing message buffer: turns whole request messages into wire-ready chunks
//! and serves them to the transport a chunk at a time, respecting the server-negotiated
//! buffer and chunk limits.

use std::collections::VecDeque;
use std::io::Cursor;

use opcua_types::{Error, SimpleBinaryEncodable};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{
    message_chunk::MessageChunk,
    secure_channel::SecureChannel,
    chunker::Chunker,
};

use crate::RequestMessage;

/// Builds and serves wire chunks for outgoing requests, up to the buffer and chunk-count
/// limits negotiated with the server during the HELLO/ACKNOWLEDGE handshake.
pub struct SendBuffer {
    /// Maximum number of bytes the server will accept in one chunk.
    send_buffer_size: usize,
    /// Maximum total byte length of an encoded message, or 0 for no limit.
    max_message_size: usize,
    /// Maximum number of chunks in one message, or 0 for no limit.
    max_chunk_count: usize,
    /// Chunks queued for serialization, not yet written to the byte buffer.
    pending_chunks: VecDeque<MessageChunk>,
    /// Serialized bytes ready to be written to the socket.
    chunk_buffer: Vec<u8>,
    /// Read cursor into `chunk_buffer`.
    pos: usize,
    next_sequence_number: u32,
}

impl SendBuffer {
    pub fn new(send_buffer_size: usize, max_message_size: usize, max_chunk_count: usize) -> Self {
        Self {
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            pending_chunks: VecDeque::new(),
            chunk_buffer: Vec::new(),
            pos: 0,
            next_sequence_number: 1,
        }
    }

    /// Revise the limits after receiving the server's `AcknowledgeMessage`.
    pub fn revise(&mut self, send_buffer_size: usize, max_message_size: usize, max_chunk_count: usize) {
        self.send_buffer_size = send_buffer_size;
        self.max_message_size = max_message_size;
        self.max_chunk_count = max_chunk_count;
    }

    fn next_sequence_number(&mut self) -> u32 {
        let n = self.next_sequence_number;
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1).max(1);
        n
    }

    /// Encode `message` into chunks and queue them for sending.
    pub fn write(
        &mut self,
        request_id: u32,
        message: impl Into<RequestMessage>,
        secure_channel: &SecureChannel,
    ) -> Result<(), Error> {
        let message = message.into();
        let chunks = Chunker::encode(
            self.next_sequence_number(),
            request_id,
            self.max_message_size,
            self.send_buffer_size,
            secure_channel,
            &message,
        )?;
        if self.max_chunk_count > 0 && chunks.len() > self.max_chunk_count {
            return Err(Error::new(
                opcua_types::StatusCode::BadRequestTooLarge,
                format!(
                    "Message requires {} chunks, more than the {} allowed",
                    chunks.len(),
                    self.max_chunk_count
                ),
            ));
        }
        self.pending_chunks.extend(chunks);
        Ok(())
    }

    /// True if there are queued chunks not yet serialized into the byte buffer.
    pub fn should_encode_chunks(&self) -> bool {
        !self.pending_chunks.is_empty()
    }

    /// Serialize the next queued chunk into the byte buffer.
    pub fn encode_next_chunk(&mut self, _secure_channel: &SecureChannel) -> Result<(), Error> {
        if let Some(chunk) = self.pending_chunks.pop_front() {
            let mut cursor = Cursor::new(Vec::with_capacity(chunk.data.len()));
            chunk.encode(&mut cursor)?;
            self.chunk_buffer.extend(cursor.into_inner());
        }
        Ok(())
    }

    /// True if there are serialized bytes ready to write to the socket.
    pub fn can_read(&self) -> bool {
        self.pos < self.chunk_buffer.len()
    }

    /// Write as much of the buffered bytes as possible to `writer`, advancing the read cursor.
    /// When fully drained, clears the buffer so it can be reused.
    pub async fn read_into_async<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
    ) -> std::io::Result<()> {
        writer.write_all(&self.chunk_buffer[self.pos..]).await?;
        self.pos = self.chunk_buffer.len();
        if self.pos == self.chunk_buffer.len() {
            self.chunk_buffer.clear();
            self.pos = 0;
        }
        Ok(())
    }
}
