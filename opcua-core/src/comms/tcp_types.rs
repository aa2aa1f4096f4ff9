// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The handshake messages exchanged before a secure channel exists: `Hello`, `Acknowledge`
//! and `Error`, as defined by OPC UA Part 6 chapter 7.1.

use std::io::{Read, Write};

use opcua_types::{
    process_encode_io_result, read_u32, status_code::StatusCode, write_u32, DecodingOptions,
    EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable, UAString,
};

/// Message type code for `Hello`.
pub const HELLO_MESSAGE: &[u8] = b"HEL";
/// Message type code for `Acknowledge`.
pub const ACKNOWLEDGE_MESSAGE: &[u8] = b"ACK";
/// Message type code for `Error`.
pub const ERROR_MESSAGE: &[u8] = b"ERR";
/// Trailing chunk marker shared by all handshake messages; they are never split.
pub const HANDSHAKE_CHUNK_FINAL: u8 = b'F';

/// Sent by the client immediately after opening the TCP connection, to propose buffer and
/// message size limits and name the endpoint it intends to talk to.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: UAString,
}

impl HelloMessage {
    pub fn new(
        endpoint_url: &str,
        send_buffer_size: usize,
        receive_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> Self {
        Self {
            protocol_version: 0,
            receive_buffer_size: receive_buffer_size as u32,
            send_buffer_size: send_buffer_size as u32,
            max_message_size: max_message_size as u32,
            max_chunk_count: max_chunk_count as u32,
            endpoint_url: UAString::from(endpoint_url),
        }
    }
}

/// Sent by the server in response to a `HelloMessage`, with the limits it is actually willing
/// to honor.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

/// Sent by either side to report a handshake-level failure and then close the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub error: u32,
    pub reason: UAString,
}

impl ErrorMessage {
    pub fn from_status_code(status_code: StatusCode) -> Self {
        Self {
            error: status_code.0,
            reason: UAString::from(status_code.to_string()),
        }
    }
}

fn body_len(body: usize) -> u32 {
    (8 + body) as u32
}

impl SimpleBinaryEncodable for HelloMessage {
    fn byte_len(&self) -> usize {
        8 + 4 + 4 + 4 + 4 + 4 + self.endpoint_url.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let size = body_len(16 + self.endpoint_url.byte_len());
        process_encode_io_result(stream.write_all(HELLO_MESSAGE))?;
        process_encode_io_result(stream.write_all(&[HANDSHAKE_CHUNK_FINAL]))?;
        write_u32(stream, size)?;
        write_u32(stream, self.protocol_version)?;
        write_u32(stream, self.receive_buffer_size)?;
        write_u32(stream, self.send_buffer_size)?;
        write_u32(stream, self.max_message_size)?;
        write_u32(stream, self.max_chunk_count)?;
        self.endpoint_url.encode(stream)
    }
}

impl SimpleBinaryEncodable for AcknowledgeMessage {
    fn byte_len(&self) -> usize {
        8 + 4 + 4 + 4 + 4 + 4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let size = body_len(20);
        process_encode_io_result(stream.write_all(ACKNOWLEDGE_MESSAGE))?;
        process_encode_io_result(stream.write_all(&[HANDSHAKE_CHUNK_FINAL]))?;
        write_u32(stream, size)?;
        write_u32(stream, self.protocol_version)?;
        write_u32(stream, self.receive_buffer_size)?;
        write_u32(stream, self.send_buffer_size)?;
        write_u32(stream, self.max_message_size)?;
        write_u32(stream, self.max_chunk_count)
    }
}

impl SimpleBinaryDecodable for AcknowledgeMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let protocol_version = read_u32(stream)?;
        let receive_buffer_size = read_u32(stream)?;
        let send_buffer_size = read_u32(stream)?;
        let max_message_size = read_u32(stream)?;
        let max_chunk_count = read_u32(stream)?;
        Ok(Self {
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
        })
    }
}

impl SimpleBinaryEncodable for ErrorMessage {
    fn byte_len(&self) -> usize {
        8 + 4 + self.reason.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let size = body_len(4 + self.reason.byte_len());
        process_encode_io_result(stream.write_all(ERROR_MESSAGE))?;
        process_encode_io_result(stream.write_all(&[HANDSHAKE_CHUNK_FINAL]))?;
        write_u32(stream, size)?;
        write_u32(stream, self.error)?;
        self.reason.encode(stream)
    }
}

impl SimpleBinaryDecodable for ErrorMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let error = read_u32(stream)?;
        let reason = UAString::decode(stream, decoding_options)?;
        Ok(Self { error, reason })
    }
}

