// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The session management services (Part 4, 5.6): discovering endpoints, creating and
//! activating a session, and closing or cancelling it.

use crate::{ByteString, DiagnosticInfo, ExtensionObject, NodeId, StatusCode, UAString};

use super::application::{ApplicationDescription, EndpointDescription};
use super::identity_tokens::SignatureData;
use super::macros::{message_type, struct_type};
use crate::RequestHeader;
use crate::ResponseHeader;

struct_type! {
    /// A vendor-signed certificate proving a software component is certified to work with
    /// OPC UA. Rarely used in practice; carried verbatim, never inspected.
    pub struct SignedSoftwareCertificate {
        /// DER-encoded certificate.
        pub certificate_data: ByteString,
        /// Signature over `certificate_data`.
        pub signature: ByteString,
    }
}

message_type! {
    /// Discovers the endpoints a server exposes, without needing a session.
    pub struct GetEndpointsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// URL of the endpoint being queried; servers behind a gateway use this to decide
        /// which endpoints to return.
        pub endpoint_url: UAString,
        /// Only return endpoints supporting one of these locales.
        pub locale_ids: Option<Vec<UAString>>,
        /// Only return endpoints matching one of these transport profile URIs.
        pub profile_uris: Option<Vec<UAString>>,
    }
    encoding_id: GetEndpointsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `GetEndpointsRequest`.
    pub struct GetEndpointsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// The matching endpoints.
        pub endpoints: Option<Vec<EndpointDescription>>,
    }
    encoding_id: GetEndpointsResponse_Encoding_DefaultBinary
}

message_type! {
    /// Creates a session. The session is not usable until `ActivateSession` succeeds.
    pub struct CreateSessionRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Description of the connecting client application.
        pub client_description: ApplicationDescription,
        /// URI of the server to connect to, as advertised in its `ApplicationDescription`.
        pub server_uri: UAString,
        /// URL of the endpoint used to send this request.
        pub endpoint_url: UAString,
        /// Human readable name for the session, for use in server diagnostics.
        pub session_name: UAString,
        /// Random bytes the server includes in the data it signs with `server_signature`.
        pub client_nonce: ByteString,
        /// DER-encoded client certificate, required unless the channel's security mode is `None`.
        pub client_certificate: ByteString,
        /// Requested session timeout in milliseconds.
        pub requested_session_timeout: f64,
        /// Maximum size in bytes of a response message the client will accept, or 0 for no limit.
        pub max_response_message_size: u32,
    }
    encoding_id: CreateSessionRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CreateSessionRequest`.
    pub struct CreateSessionResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Identifies the session for subsequent service calls.
        pub session_id: NodeId,
        /// Secret token that must accompany every further request on this session.
        pub authentication_token: NodeId,
        /// Session timeout actually granted by the server, in milliseconds.
        pub revised_session_timeout: f64,
        /// Random bytes the client must sign as proof of possession in `ActivateSessionRequest`.
        pub server_nonce: ByteString,
        /// DER-encoded server certificate.
        pub server_certificate: ByteString,
        /// Endpoints the server offers; may differ from `GetEndpoints` if the request came in
        /// over a translated or gateway URL.
        pub server_endpoints: Option<Vec<EndpointDescription>>,
        /// Vendor certificates for the server's software, rarely used.
        pub server_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
        /// Signature over the client's certificate and nonce, proving the server holds the
        /// private key for `server_certificate`.
        pub server_signature: SignatureData,
        /// Maximum size in bytes of a request message the server will accept.
        pub max_request_message_size: u32,
    }
    encoding_id: CreateSessionResponse_Encoding_DefaultBinary
}

message_type! {
    /// Activates a session, attaching a user identity and (on first activation) proving
    /// possession of the client certificate used to create it.
    pub struct ActivateSessionRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Signature over the server's certificate and nonce from `CreateSessionResponse`.
        pub client_signature: SignatureData,
        /// Vendor certificates for the client's software, rarely used.
        pub client_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
        /// Locales the client prefers for translated text in responses.
        pub locale_ids: Option<Vec<UAString>>,
        /// The user identity to activate the session under, one of `AnonymousIdentityToken`,
        /// `UserNameIdentityToken`, or `X509IdentityToken`.
        pub user_identity_token: ExtensionObject,
        /// Required only when `user_identity_token` is an `X509IdentityToken`: a signature
        /// proving possession of the certificate's private key.
        pub user_token_signature: SignatureData,
    }
    encoding_id: ActivateSessionRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to an `ActivateSessionRequest`.
    pub struct ActivateSessionResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Fresh random bytes to sign in the next `ActivateSessionRequest` on this session.
        pub server_nonce: ByteString,
        /// One status per entry of the request's `client_software_certificates`.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: ActivateSessionResponse_Encoding_DefaultBinary
}

message_type! {
    /// Closes a session, implicitly releasing its subscriptions unless told not to.
    pub struct CloseSessionRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// If true, the server also deletes the session's subscriptions. If false, they are
        /// kept alive to be transferred to another session.
        pub delete_subscriptions: bool,
    }
    encoding_id: CloseSessionRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CloseSessionRequest`.
    pub struct CloseSessionResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
    }
    encoding_id: CloseSessionResponse_Encoding_DefaultBinary
}

message_type! {
    /// Asks the server to cancel all outstanding requests sharing a request handle.
    pub struct CancelRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Request handle shared by the requests to cancel.
        pub request_handle: u32,
    }
    encoding_id: CancelRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CancelRequest`.
    pub struct CancelResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Number of requests actually cancelled.
        pub cancel_count: u32,
    }
    encoding_id: CancelResponse_Encoding_DefaultBinary
}
