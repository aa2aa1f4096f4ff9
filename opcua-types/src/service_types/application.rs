// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Application and endpoint description, as returned by `GetEndpoints` and carried in
//! `CreateSessionResponse`.

use crate::{ByteString, LocalizedText, UAString};

use super::enums::{ApplicationType, MessageSecurityMode};
use super::identity_tokens::UserTokenPolicy;
use super::macros::struct_type;

struct_type! {
    /// Describes an application instance: a client, a server, or a discovery server.
    pub struct ApplicationDescription {
        /// Globally unique identifier for the application instance.
        pub application_uri: UAString,
        /// Globally unique identifier for the product.
        pub product_uri: UAString,
        /// Human readable name of the application.
        pub application_name: LocalizedText,
        /// The kind of application.
        pub application_type: ApplicationType,
        /// URI of the gateway server, if this description is for a server accessed through one.
        pub gateway_server_uri: UAString,
        /// URI of the discovery profile supported, for discovery servers.
        pub discovery_profile_uri: UAString,
        /// URLs at which the application's discovery endpoint can be reached.
        pub discovery_urls: Option<Vec<UAString>>,
    }
}

struct_type! {
    /// One of the endpoints a server offers, returned by `GetEndpoints` and selected by the
    /// client before opening a secure channel.
    pub struct EndpointDescription {
        /// URL the client should connect to.
        pub endpoint_url: UAString,
        /// Description of the server exposing the endpoint.
        pub server: ApplicationDescription,
        /// DER-encoded certificate of the server.
        pub server_certificate: ByteString,
        /// Security mode required on this endpoint.
        pub security_mode: MessageSecurityMode,
        /// URI of the security policy required on this endpoint.
        pub security_policy_uri: UAString,
        /// User identity token types accepted on this endpoint.
        pub user_identity_tokens: Option<Vec<UserTokenPolicy>>,
        /// URI of the transport profile used by this endpoint.
        pub transport_profile_uri: UAString,
        /// Relative level of security of this endpoint, 0 meaning least secure.
        pub security_level: u8,
    }
}
