use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use opcua_core::{
    comms::secure_channel::SecureChannel, handle::AtomicHandle, sync::RwLock, trace_read_lock,
    trace_write_lock, RequestMessage, ResponseMessage,
};
use opcua_types::{
    DateTime, DiagnosticBits, IntegerId, NodeId, OpenSecureChannelRequest, RequestHeader,
    SecurityTokenRequestType, StatusCode,
};

use super::core::OutgoingMessage;

/// A cloneable handle for queueing outgoing requests onto the transport's send channel.
#[derive(Clone)]
pub(crate) struct RequestSend {
    sender: tokio::sync::mpsc::Sender<OutgoingMessage>,
}

impl RequestSend {
    pub(crate) fn new(sender: tokio::sync::mpsc::Sender<OutgoingMessage>) -> Self {
        Self { sender }
    }
}

/// A single queued request, awaiting either its response or nothing at all.
pub(crate) struct Request {
    request: RequestMessage,
    send: RequestSend,
    timeout: Duration,
}

impl Request {
    pub(crate) fn new(
        request: impl Into<RequestMessage>,
        send: RequestSend,
        timeout: Duration,
    ) -> Self {
        Self {
            request: request.into(),
            send,
            timeout,
        }
    }

    /// Queue the request and wait for its response, or for the transport to time out.
    pub(crate) async fn send(self) -> Result<ResponseMessage, StatusCode> {
        let (response_tx, response_rx) = tokio::sync::oneshot::channel();
        self.send
            .sender
            .send(OutgoingMessage {
                request: self.request,
                response_tx,
            })
            .await
            .map_err(|_| StatusCode::BadNotConnected)?;

        match tokio::time::timeout(self.timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StatusCode::BadConnectionClosed),
            Err(_) => Err(StatusCode::BadTimeout),
        }
    }

    /// Queue the request without waiting for a response.
    pub(crate) async fn send_no_response(self) -> Result<(), StatusCode> {
        let (response_tx, _response_rx) = tokio::sync::oneshot::channel();
        self.send
            .sender
            .send(OutgoingMessage {
                request: self.request,
                response_tx,
            })
            .await
            .map_err(|_| StatusCode::BadNotConnected)
    }
}

/// Tracks the request handle counter and the authentication token used to stamp outgoing
/// request headers, and drives the OpenSecureChannel issue/renew handshake.
pub(crate) struct SecureChannelState {
    ignore_clock_skew: bool,
    secure_channel: Arc<RwLock<SecureChannel>>,
    auth_token: Arc<ArcSwap<NodeId>>,
    request_handle: AtomicHandle,
}

impl SecureChannelState {
    pub(crate) fn new(
        ignore_clock_skew: bool,
        secure_channel: Arc<RwLock<SecureChannel>>,
        auth_token: Arc<ArcSwap<NodeId>>,
    ) -> Self {
        Self {
            ignore_clock_skew,
            secure_channel,
            auth_token,
            request_handle: AtomicHandle::new(1),
        }
    }

    pub(crate) fn request_handle(&self) -> IntegerId {
        self.request_handle.next()
    }

    pub(crate) fn make_request_header(&self, timeout: Duration) -> RequestHeader {
        RequestHeader {
            authentication_token: (**self.auth_token.load()).clone(),
            timestamp: DateTime::now(),
            request_handle: self.request_handle(),
            return_diagnostics: DiagnosticBits::empty(),
            timeout_hint: timeout.as_millis().min(u32::MAX as u128) as u32,
            ..Default::default()
        }
    }

    /// Build the OpenSecureChannel request to issue or renew the secure channel, without
    /// sending it yet.
    pub(crate) fn begin_issue_or_renew_secure_channel(
        &self,
        request_type: SecurityTokenRequestType,
        channel_lifetime: u32,
        timeout: Duration,
        send: RequestSend,
    ) -> Request {
        let security_mode = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            secure_channel.security_mode()
        };
        let client_nonce = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            secure_channel.local_nonce_as_byte_string()
        };

        let request = OpenSecureChannelRequest {
            request_header: self.make_request_header(timeout),
            client_protocol_version: 0,
            request_type,
            security_mode,
            client_nonce,
            requested_lifetime: channel_lifetime,
        };

        Request::new(request, send, timeout)
    }

    /// Validate the OpenSecureChannelResponse and apply the new security token to the
    /// secure channel.
    pub(crate) fn end_issue_or_renew_secure_channel(
        &self,
        response: ResponseMessage,
    ) -> Result<(), StatusCode> {
        let ResponseMessage::OpenSecureChannel(response) = response else {
            return Err(StatusCode::BadUnexpectedError);
        };
        response.response_header.service_result.check()?;

        let mut secure_channel = trace_write_lock!(self.secure_channel);
        if !self.ignore_clock_skew {
            let now = DateTime::now();
            let elapsed = now
                .as_chrono()
                .signed_duration_since(response.response_header.timestamp.as_chrono())
                .num_seconds()
                .abs();
            if elapsed > 30 {
                return Err(StatusCode::BadInvalidTimestamp);
            }
        }
        secure_channel.set_security_token(response.security_token);
        secure_channel.set_remote_nonce_from_byte_string(&response.server_nonce)?;
        Ok(())
    }
}
