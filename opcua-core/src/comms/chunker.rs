// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Splits an outgoing message into a series of signed/encrypted [`MessageChunk`]s bounded by
//! the negotiated chunk size, and reassembles an incoming series of chunks back into a typed
//! message.

use std::io::{Read, Write};

use crate::{
    comms::{
        message_chunk::{MessageChunk, MessageIsFinalType},
        secure_channel::SecureChannel,
    },
    Message,
};

use log::{debug, error, trace};
use opcua_crypto::SecurityPolicy;
use opcua_types::{
    encoding::BinaryEncodable, node_id::NodeId, status_code::StatusCode, BinaryDecodable,
    EncodingResult, Error, ObjectId,
};

use super::message_chunk::MessageChunkType;

/// A `Read` adapter over a run of chunks, yielding their concatenated body bytes. Steps to the
/// next chunk once the current one's body is exhausted, checking along the way that only the
/// last chunk in the run is marked final.
struct ChunkBodyReader<'a, T> {
    current: &'a [u8],
    offset: usize,
    remaining: T,
    count: usize,
    consumed: usize,
    channel: &'a SecureChannel,
}

impl<'a, T: Iterator<Item = &'a MessageChunk>> ChunkBodyReader<'a, T> {
    fn new(channel: &'a SecureChannel, mut remaining: T, count: usize) -> Result<Self, Error> {
        let Some(chunk) = remaining.next() else {
            return Err(Error::new(
                StatusCode::BadUnexpectedError,
                "Stream contained no chunks",
            ));
        };
        let current = Self::checked_body(channel, chunk, 0, count)?;
        Ok(Self {
            current,
            offset: 0,
            remaining,
            count,
            consumed: 0,
            channel,
        })
    }

    /// Extract the body slice of `chunk`, rejecting it if its `is_final` flag doesn't match
    /// its position (`index`) within a run of `count` chunks.
    fn checked_body(
        channel: &SecureChannel,
        chunk: &'a MessageChunk,
        index: usize,
        count: usize,
    ) -> Result<&'a [u8], Error> {
        let info = chunk.chunk_info(channel)?;
        let expected = if index + 1 == count {
            MessageIsFinalType::Final
        } else {
            MessageIsFinalType::Intermediate
        };
        if info.message_header.is_final != expected {
            return Err(Error::new(
                StatusCode::BadDecodingError,
                "Last chunk not marked as final",
            ));
        }
        let start = info.body_offset;
        Ok(&chunk.data[start..start + info.body_length])
    }
}

impl<'a, T: Iterator<Item = &'a MessageChunk>> Read for ChunkBodyReader<'a, T> {
    fn read(&mut self, mut buf: &mut [u8]) -> std::io::Result<usize> {
        if self.current.len() == self.offset {
            let Some(chunk) = self.remaining.next() else {
                return Ok(0);
            };
            self.consumed += 1;
            self.current = Self::checked_body(self.channel, chunk, self.consumed, self.count)?;
            self.offset = 0;
        }
        let written = buf.write(&self.current[self.offset..])?;
        self.offset += written;
        Ok(written)
    }
}

/// A `Write` adapter that slices an outgoing byte stream into fixed-size chunk bodies,
/// wrapping, signing and encrypting each one via [`MessageChunk::new`] as it fills.
struct ChunkWriter<'a> {
    secure_channel: &'a SecureChannel,
    chunks: Vec<MessageChunk>,
    total_chunks: usize,
    body_capacity: usize,
    pending_body: Vec<u8>,
    filled: usize,
    done: bool,
    sequence_number: u32,
    request_id: u32,
    bytes_remaining: usize,
    message_type: MessageChunkType,
}

impl<'a> ChunkWriter<'a> {
    fn new(
        message_type: MessageChunkType,
        secure_channel: &'a SecureChannel,
        max_chunk_size: usize,
        message_size: usize,
        request_id: u32,
        request_handle: u32,
        sequence_number: u32,
    ) -> Result<Self, Error> {
        let (total_chunks, body_capacity) = if max_chunk_size > 0 {
            let body_capacity = MessageChunk::body_size_from_message_size(
                message_type,
                secure_channel,
                max_chunk_size,
            )
            .map_err(|_| {
                Error::new(
                    StatusCode::BadTcpInternalError,
                    format!(
                        "body_size_from_message_size error for max_chunk_size = {}",
                        max_chunk_size
                    ),
                )
                .with_context(
                    Some(request_id),
                    if request_handle > 0 {
                        Some(request_handle)
                    } else {
                        None
                    },
                )
            })?;
            (message_size / body_capacity + 1, body_capacity)
        } else {
            (1, 0)
        };

        let first_body_size = if total_chunks == 1 {
            message_size
        } else {
            body_capacity
        };

        Ok(Self {
            secure_channel,
            chunks: Vec::with_capacity(total_chunks),
            total_chunks,
            body_capacity,
            pending_body: vec![0; first_body_size],
            filled: 0,
            done: false,
            sequence_number,
            request_id,
            message_type,
            bytes_remaining: message_size,
        })
    }

    fn seal_current_chunk(&mut self) -> EncodingResult<()> {
        if self.done {
            return Ok(());
        }

        let body = std::mem::take(&mut self.pending_body);
        self.bytes_remaining = self.bytes_remaining.saturating_sub(body.len());
        let is_final = if self.chunks.len() + 1 == self.total_chunks {
            self.done = true;
            MessageIsFinalType::Final
        } else {
            MessageIsFinalType::Intermediate
        };

        let chunk = MessageChunk::new(
            self.sequence_number + self.chunks.len() as u32,
            self.request_id,
            self.message_type,
            is_final,
            self.secure_channel,
            &body,
        )?;
        self.chunks.push(chunk);

        if !self.done {
            let next_body_size = if self.chunks.len() + 1 == self.total_chunks {
                self.bytes_remaining
            } else {
                self.body_capacity
            };
            self.pending_body = vec![0; next_body_size];
            self.filled = 0;
        }

        Ok(())
    }

    fn into_chunks(self) -> EncodingResult<Vec<MessageChunk>> {
        if !self.done {
            return Err(Error::encoding(
                "Message did not encode to the expected size",
            ));
        }
        Ok(self.chunks)
    }
}

impl Write for ChunkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.done {
            return Ok(0);
        }

        let to_copy = buf.len().min(self.pending_body.len() - self.filled);
        self.pending_body[self.filled..self.filled + to_copy].copy_from_slice(&buf[..to_copy]);
        self.filled += to_copy;
        if self.filled == self.pending_body.len() {
            self.seal_current_chunk()?;
        }

        Ok(to_copy)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.seal_current_chunk()?;
        Ok(())
    }
}

/// Encodes messages to chunks and decodes chunks back to messages.
pub struct Chunker;

impl Chunker {
    /// Checks that `chunks` have a consistent secure channel id and strictly increasing
    /// sequence numbers starting above `starting_sequence_number`, and that every chunk after
    /// the first shares the first chunk's request id.
    ///
    /// Returns the last sequence number in the series on success.
    pub fn validate_chunks(
        starting_sequence_number: u32,
        secure_channel: &SecureChannel,
        chunks: &[MessageChunk],
    ) -> Result<u32, Error> {
        let first_sequence_number = chunks[0].chunk_info(secure_channel)?.sequence_header.sequence_number;
        trace!(
            "Received chunk with sequence number {}",
            first_sequence_number
        );
        if first_sequence_number < starting_sequence_number {
            return Err(Error::new(
                StatusCode::BadSequenceNumberInvalid,
                format!(
                    "First sequence number of {} is less than last value {}",
                    first_sequence_number, starting_sequence_number
                ),
            ));
        }

        let secure_channel_id = secure_channel.secure_channel_id();
        let mut expected_request_id: u32 = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(secure_channel)?;

            if secure_channel_id != 0
                && chunk_info.message_header.secure_channel_id != secure_channel_id
            {
                return Err(Error::new(
                    StatusCode::BadSecureChannelIdInvalid,
                    format!(
                        "Secure channel id {} does not match expected id {}",
                        chunk_info.message_header.secure_channel_id, secure_channel_id
                    ),
                ));
            }

            let sequence_number = chunk_info.sequence_header.sequence_number;
            let expected_sequence_number = first_sequence_number + i as u32;
            if sequence_number != expected_sequence_number {
                return Err(Error::new(
                    StatusCode::BadSequenceNumberInvalid,
                    format!(
                        "Chunk sequence number of {} is not the expected value of {}, idx {}",
                        sequence_number, expected_sequence_number, i
                    ),
                ));
            }

            if i == 0 {
                expected_request_id = chunk_info.sequence_header.request_id;
            } else if chunk_info.sequence_header.request_id != expected_request_id {
                return Err(Error::new(StatusCode::BadSequenceNumberInvalid, format!(
                    "Chunk sequence number of {} has a request id {} which is not the expected value of {}, idx {}",
                    sequence_number, chunk_info.sequence_header.request_id, expected_request_id, i
                )));
            }
        }
        Ok(first_sequence_number + chunks.len() as u32 - 1)
    }

    /// Checks `message_size` against `max_message_size` (0 = unbounded), returning the status
    /// code appropriate to the channel's role on overflow.
    fn check_message_size_limit(
        secure_channel: &SecureChannel,
        message_size: usize,
        max_message_size: usize,
        ctx_id: Option<u32>,
        ctx_handle: Option<u32>,
    ) -> Result<(), Error> {
        if max_message_size == 0 || message_size <= max_message_size {
            return Ok(());
        }
        error!(
            "Max message size is {} and message {} exceeds that",
            max_message_size, message_size
        );
        let status = if secure_channel.is_client_role() {
            StatusCode::BadRequestTooLarge
        } else {
            StatusCode::BadResponseTooLarge
        };
        Err(Error::new(
            status,
            format!(
                "Max message size is {} and message {} exceeds that",
                max_message_size, message_size
            ),
        )
        .with_context(ctx_id, ctx_handle))
    }

    /// Encodes `supported_message` with the given sequence/request id into one or more
    /// signed/encrypted chunks, splitting at `max_chunk_size` bytes per chunk (0 = unbounded)
    /// and rejecting the message up front if it would exceed `max_message_size` (0 = unbounded).
    pub fn encode(
        sequence_number: u32,
        request_id: u32,
        max_message_size: usize,
        max_chunk_size: usize,
        secure_channel: &SecureChannel,
        supported_message: &impl Message,
    ) -> std::result::Result<Vec<MessageChunk>, Error> {
        let security_policy = secure_channel.security_policy();
        if security_policy == SecurityPolicy::Unknown {
            panic!("Security policy cannot be unknown");
        }

        let ctx_id = Some(request_id);
        let handle = supported_message.request_handle();
        let ctx_handle = if handle > 0 { Some(handle) } else { None };

        let ctx_r = secure_channel.context();
        let ctx = ctx_r.context();
        let mut message_size = supported_message.byte_len(&ctx);
        Self::check_message_size_limit(
            secure_channel,
            message_size,
            max_message_size,
            ctx_id,
            ctx_handle,
        )?;

        let node_id = supported_message.type_id();
        message_size += node_id.byte_len(&ctx);

        let message_type = supported_message.message_type();

        let mut stream = ChunkWriter::new(
            message_type,
            secure_channel,
            max_chunk_size,
            message_size,
            request_id,
            handle,
            sequence_number,
        )?;

        node_id.encode(&mut stream, &ctx)?;
        supported_message
            .encode(&mut stream, &ctx)
            .map_err(|e| e.with_context(ctx_id, ctx_handle))?;

        stream.flush()?;

        stream.into_chunks()
    }

    /// Reassembles `chunks` (all but the last must be marked intermediate, the last final)
    /// into a single typed message. `expected_node_id`, if given, must match the wire type id.
    pub fn decode<T: Message>(
        chunks: &[MessageChunk],
        secure_channel: &SecureChannel,
        expected_node_id: Option<NodeId>,
    ) -> std::result::Result<T, Error> {
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(secure_channel)?;
            let expected_is_final = if i == chunks.len() - 1 {
                MessageIsFinalType::Final
            } else {
                MessageIsFinalType::Intermediate
            };
            if chunk_info.message_header.is_final != expected_is_final {
                return Err(Error::decoding(
                    "Last message in sequence is not marked as final",
                ));
            }
        }

        let mut stream = ChunkBodyReader::new(secure_channel, chunks.iter(), chunks.len())?;

        let ctx_r = secure_channel.context();
        let ctx = ctx_r.context();

        // The extension object prefix on the wire is just the node id, nothing more.
        let node_id = NodeId::decode(&mut stream, &ctx)?;
        let object_id = Self::object_id_from_node_id(node_id, expected_node_id)?;

        match T::decode_by_object_id(&mut stream, object_id, &ctx) {
            Ok(decoded_message) => Ok(decoded_message),
            Err(err) => {
                debug!("Cannot decode message {:?}, err = {:?}", object_id, err);
                Err(err)
            }
        }
    }

    fn object_id_from_node_id(
        node_id: NodeId,
        expected_node_id: Option<NodeId>,
    ) -> Result<ObjectId, Error> {
        if let Some(id) = expected_node_id {
            if node_id != id {
                return Err(Error::decoding(format!(
                    "The message ID {node_id} is not the expected value {id}"
                )));
            }
        }
        node_id
            .as_object_id()
            .map_err(|_| Error::decoding(format!("The message id {node_id} is not an object id")))
    }
}
