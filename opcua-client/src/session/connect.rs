use std::sync::Arc;

use opcua_types::StatusCode;

use crate::transport::SecureChannelEventLoop;

use super::Session;

/// How a session came to be connected: whether a brand new session was created on the
/// server, or whether an existing one was reactivated after a transport-level disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionConnectMode {
    /// A new session was created and activated on the server.
    Fresh,
    /// An existing session was reactivated without creating a new one.
    Reconnected,
}

/// Drives the connect/reconnect sequence for a session: establish the secure channel,
/// then either resume the existing server session or create a fresh one.
pub(crate) struct SessionConnector {
    session: Arc<Session>,
}

impl SessionConnector {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub(crate) async fn try_connect(
        self,
    ) -> Result<(SecureChannelEventLoop, SessionConnectMode), StatusCode> {
        let event_loop = self.session.channel.connect().await?;

        let had_session = !self.session.server_session_id().is_null();
        if had_session && self.session.activate_session().await.is_ok() {
            return Ok((event_loop, SessionConnectMode::Reconnected));
        }

        self.session.reset();
        self.session.create_session().await?;
        self.session.activate_session().await?;

        if had_session && self.session.recreate_subscriptions {
            self.session.transfer_subscriptions_from_old_session().await;
        }

        Ok((event_loop, SessionConnectMode::Fresh))
    }
}
