// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

#![warn(missing_docs)]

//! An OPC UA binary-transport client: establishes and maintains a secure channel and
//! session with a server, and exposes the service-set requests (attribute read/write,
//! subscriptions, method calls, view/browse) as async methods on [`Session`].
//!
//! A typical program builds a [`Client`] with [`ClientBuilder`], looks up the server's
//! endpoints, then uses [`SessionBuilder`] (via [`Client::session_builder`]) to connect:
//!
//! ```no_run
//! # async fn run() -> Result<(), opcua_types::StatusCode> {
//! use opcua_client::ClientBuilder;
//!
//! let client = ClientBuilder::new()
//!     .application_name("example client")
//!     .application_uri("urn:example:client")
//!     .client()
//!     .unwrap();
//!
//! let endpoints = client
//!     .get_server_endpoints_from_url("opc.tcp://localhost:4840")
//!     .await?;
//!
//! let (session, event_loop) = client
//!     .session_builder()
//!     .with_endpoints(endpoints)
//!     .connect_to_best_endpoint(false)
//!     .map_err(|_| opcua_types::StatusCode::BadTcpEndpointUrlInvalid)?
//!     .build(client.certificate_store().clone());
//!
//! tokio::spawn(event_loop.run());
//! session.wait_for_connection().await;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod builder;
/// Client configuration, loaded from disk or built programmatically with [`ClientBuilder`].
pub mod config;
/// Exponential backoff for secure channel and session reconnects.
pub mod retry;
mod session;
/// Recursively discover nodes on a server.
pub mod browser;
/// Transport-level plumbing: the TCP connection, secure channel, and message framing.
pub mod transport;

pub use builder::ClientBuilder;
pub use config::{ClientConfig, ClientEndpoint, ClientUserToken, ANONYMOUS_USER_TOKEN_ID};
pub use retry::{ExponentialBackoff, SessionRetryPolicy};
pub use session::{
    ActivateSession, Browse, BrowseNext, Call, Cancel, Client, CloseSession, CreateMonitoredItems,
    CreateSession, CreateSubscription, DataChangeCallback, DefaultRetryPolicy,
    DeleteMonitoredItems, DeleteSubscriptions, EventCallback, HistoryRead, HistoryReadAction,
    HistoryUpdate, HistoryUpdateAction, ModifyMonitoredItems, ModifySubscription, MonitoredItem,
    OnSubscriptionNotification, Read, RegisterNodes, RequestRetryPolicy, Session,
    SessionActivity, SessionBuilder, SessionConnectMode, SessionEventLoop, SessionInfo,
    SessionPollResult,
    SetMonitoringMode, SetPublishingMode, SetTriggering, Subscription, SubscriptionActivity,
    SubscriptionCallbacks, TransferSubscriptions, TranslateBrowsePaths, UARequest,
    UnregisterNodes, Write,
};
pub use transport::{AsyncSecureChannel, Connector, SecureChannelEventLoop, TransportPollResult};

/// The credential a session presents to the server during `ActivateSession`.
///
/// Passwords and certificate/key paths are held as owned data; loading from disk happens
/// lazily when the identity token is turned into an `ExtensionObject` at activation time, so
/// a missing or invalid file only fails the activation it's used for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// No user credentials; the session is activated anonymously.
    Anonymous,
    /// Username/password credentials.
    UserName(String, String),
    /// An X.509 certificate and private key, used to sign the session's nonce.
    X509(PathBuf, PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_token_variants_are_distinguishable() {
        assert_ne!(IdentityToken::Anonymous, IdentityToken::UserName("a".into(), "b".into()));
        assert_eq!(
            IdentityToken::UserName("a".into(), "b".into()),
            IdentityToken::UserName("a".into(), "b".into())
        );
        assert_ne!(
            IdentityToken::X509(PathBuf::from("cert.der"), PathBuf::from("key.pem")),
            IdentityToken::X509(PathBuf::from("other.der"), PathBuf::from("key.pem"))
        );
    }
}
