// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A [`tokio_util::codec::Decoder`] that frames the OPC UA TCP stream into whole messages:
//! handshake messages (`Hello`/`Acknowledge`/`Error`) and secure channel message chunks.

use bytes::{Buf, BytesMut};
use opcua_types::{DecodingOptions, SimpleBinaryDecodable};
use tokio_util::codec::Decoder;

use super::{
    message_chunk::MessageChunk,
    tcp_types::{AcknowledgeMessage, ErrorMessage, ACKNOWLEDGE_MESSAGE, ERROR_MESSAGE},
};

/// A single framed message read from the wire.
#[derive(Debug)]
pub enum Message {
    Acknowledge(AcknowledgeMessage),
    Error(ErrorMessage),
    Chunk(MessageChunk),
}

/// Decodes messages out of the raw TCP byte stream using the shared 8-byte
/// `[type(3) final(1) size(4)]` header that every OPC UA TCP message starts with.
pub struct TcpCodec {
    decoding_options: DecodingOptions,
}

impl TcpCodec {
    pub fn new(decoding_options: DecodingOptions) -> Self {
        Self { decoding_options }
    }
}

impl Decoder for TcpCodec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Self::Error> {
        if src.len() < 8 {
            return Ok(None);
        }
        let message_type = [src[0], src[1], src[2]];
        let message_size = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if message_size < 8 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message size in header is smaller than the header itself",
            ));
        }
        if self.decoding_options.max_message_size > 0
            && message_size > self.decoding_options.max_message_size
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message size in header exceeds the configured maximum",
            ));
        }
        if src.len() < message_size {
            src.reserve(message_size - src.len());
            return Ok(None);
        }

        let mut body = src.split_to(message_size);

        let message = if &message_type[..] == ACKNOWLEDGE_MESSAGE {
            body.advance(8);
            let ack = AcknowledgeMessage::decode(&mut body.reader(), &self.decoding_options)
                .map_err(std::io::Error::other)?;
            Message::Acknowledge(ack)
        } else if &message_type[..] == ERROR_MESSAGE {
            body.advance(8);
            let err = ErrorMessage::decode(&mut body.reader(), &self.decoding_options)
                .map_err(std::io::Error::other)?;
            Message::Error(err)
        } else {
            let chunk = MessageChunk::decode(&mut body.reader(), &self.decoding_options)
                .map_err(std::io::Error::other)?;
            Message::Chunk(chunk)
        };

        Ok(Some(message))
    }
}
