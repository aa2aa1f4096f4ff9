// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OpenSecureChannel and CloseSecureChannel services (Part 4, 5.5): establishing and
//! tearing down the secure channel that every other service runs over.

use crate::{ByteString, DateTime};

use super::enums::{MessageSecurityMode, SecurityTokenRequestType};
use super::macros::{message_type, struct_type};
use crate::RequestHeader;
use crate::ResponseHeader;

struct_type! {
    /// Identifies the symmetric key material currently in use on a secure channel, and when
    /// it expires.
    pub struct ChannelSecurityToken {
        /// Secure channel this token belongs to.
        pub channel_id: u32,
        /// Identifies this specific token; a channel rotates through several over its life.
        pub token_id: u32,
        /// When the server issued or renewed this token.
        pub created_at: DateTime,
        /// How long the token remains valid, in milliseconds, from `created_at`.
        pub revised_lifetime: u32,
    }
}

message_type! {
    /// Opens a new secure channel, or renews the token on an existing one.
    pub struct OpenSecureChannelRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Revision of the OPC UA TCP protocol the client implements.
        pub client_protocol_version: u32,
        /// Whether this opens a new channel or renews one.
        pub request_type: SecurityTokenRequestType,
        /// Security mode to apply to subsequent messages on this channel.
        pub security_mode: MessageSecurityMode,
        /// Random bytes used, together with the server's nonce, to derive symmetric keys.
        /// Empty when `security_mode` is `None`.
        pub client_nonce: ByteString,
        /// Requested lifetime of the token in milliseconds.
        pub requested_lifetime: u32,
    }
    encoding_id: OpenSecureChannelRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to an `OpenSecureChannelRequest`.
    pub struct OpenSecureChannelResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Revision of the OPC UA TCP protocol the server implements.
        pub server_protocol_version: u32,
        /// The new or renewed token.
        pub security_token: ChannelSecurityToken,
        /// Random bytes used, together with the client's nonce, to derive symmetric keys.
        pub server_nonce: ByteString,
    }
    encoding_id: OpenSecureChannelResponse_Encoding_DefaultBinary
}

message_type! {
    /// Closes a secure channel. The server does not send a response; the client closes the
    /// underlying socket immediately after sending this.
    pub struct CloseSecureChannelRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
    }
    encoding_id: CloseSecureChannelRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CloseSecureChannelRequest`, included for completeness; servers are not
    /// required to send it.
    pub struct CloseSecureChannelResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
    }
    encoding_id: CloseSecureChannelResponse_Encoding_DefaultBinary
}
