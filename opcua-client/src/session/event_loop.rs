use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

use futures::{future::BoxFuture, stream::BoxStream, FutureExt, Stream, StreamExt, TryStreamExt};
use log::warn;

use crate::{
    retry::{ExponentialBackoff, SessionRetryPolicy},
    session::{session_error, session_warn},
    transport::{SecureChannelEventLoop, TransportPollResult},
};
use opcua_types::{
    AttributeId, QualifiedName, ReadValueId, StatusCode, TimestampsToReturn, VariableId,
};

use super::{
    connect::{SessionConnectMode, SessionConnector},
    services::subscriptions::event_loop::{SubscriptionActivity, SubscriptionEventLoop},
    Session, SessionState,
};

/// Events surfaced while polling a session: transport traffic, keep-alive and subscription
/// activity, and connection lifecycle changes. Callers driving [`SessionEventLoop::enter`]
/// directly can match on these to react to state changes as they happen.
#[derive(Debug)]
#[non_exhaustive]
pub enum SessionPollResult {
    /// A message was sent to or received from the server.
    Transport(TransportPollResult),
    /// Connection was lost with the inner [`StatusCode`].
    ConnectionLost(StatusCode),
    /// Reconnecting to the server failed with the inner [`StatusCode`].
    ReconnectFailed(StatusCode),
    /// Session was reconnected, the mode is given by the innner [`SessionConnectMode`]
    Reconnected(SessionConnectMode),
    /// The session performed some periodic activity.
    SessionActivity(SessionActivity),
    /// The session performed some subscription-related activity.
    Subscription(SubscriptionActivity),
    /// The session begins (re)connecting to the server.
    BeginConnect,
    /// Disconnect due to a keep alive terminated.
    FinishedDisconnect,
}

struct LiveConnection {
    channel: SecureChannelEventLoop,
    keep_alive: BoxStream<'static, SessionActivity>,
    subscriptions: BoxStream<'static, SubscriptionActivity>,
    failed_keep_alive_streak: u64,
    closing: bool,
    disconnect_fut: BoxFuture<'static, Result<(), StatusCode>>,
}

enum LoopState {
    Connected(LiveConnection),
    Connecting(SessionConnector, ExponentialBackoff, Instant),
    Disconnected,
}

/// Drives a [`Session`]: connects, reconnects on transport failure, and pumps keep-alive and
/// subscription traffic. Nothing happens to a session until its event loop is polled, either
/// via [`run`](Self::run)/[`spawn`](Self::spawn) or by consuming the [`Stream`] from
/// [`enter`](Self::enter) directly.
#[must_use = "The session event loop must be started for the session to work"]
pub struct SessionEventLoop {
    inner: Arc<Session>,
    trigger_publish_recv: tokio::sync::watch::Receiver<Instant>,
    retry: SessionRetryPolicy,
    keep_alive_interval: Duration,
    max_failed_keep_alive_count: u64,
}

impl SessionEventLoop {
    pub(crate) fn new(
        inner: Arc<Session>,
        retry: SessionRetryPolicy,
        trigger_publish_recv: tokio::sync::watch::Receiver<Instant>,
        keep_alive_interval: Duration,
        max_failed_keep_alive_count: u64,
    ) -> Self {
        Self {
            inner,
            retry,
            trigger_publish_recv,
            keep_alive_interval,
            max_failed_keep_alive_count,
        }
    }

    /// Runs the event loop to completion, returning once the session is closed manually or
    /// fails to reconnect.
    pub async fn run(self) -> StatusCode {
        let stream = self.enter();
        tokio::pin!(stream);
        loop {
            match stream.try_next().await {
                Ok(None) => break StatusCode::Good,
                Err(e) => break e,
                Ok(Some(_)) => (),
            }
        }
    }

    /// Spawns [`run`](Self::run) on a tokio task, returning its join handle.
    pub fn spawn(self) -> tokio::task::JoinHandle<StatusCode> {
        tokio::task::spawn(self.run())
    }

    /// Starts the event loop as a stream that must be polled to make progress. Yields `None`
    /// once the transport is closed manually, or `Some(Err(StatusCode))` once reconnection
    /// after a connection loss gives up.
    pub fn enter(self) -> impl Stream<Item = Result<SessionPollResult, StatusCode>> {
        futures::stream::try_unfold((self, LoopState::Disconnected), |(slf, state)| async move {
            let next = match state {
                LoopState::Connected(conn) => slf.poll_connected(conn).await?,
                LoopState::Disconnected => Some(slf.begin_connecting()),
                LoopState::Connecting(connector, backoff, next_try) => {
                    Some(slf.poll_connecting(connector, backoff, next_try).await?)
                }
            };

            Ok(next.map(|(res, state)| (res, (slf, state))))
        })
    }

    fn begin_connecting(&self) -> (SessionPollResult, LoopState) {
        let connector = SessionConnector::new(self.inner.clone());
        let _ = self.inner.state_watch_tx.send(SessionState::Connecting);
        (
            SessionPollResult::BeginConnect,
            LoopState::Connecting(connector, self.retry.new_backoff(), Instant::now()),
        )
    }

    async fn poll_connecting(
        &self,
        connector: SessionConnector,
        mut backoff: ExponentialBackoff,
        next_try: Instant,
    ) -> Result<(SessionPollResult, LoopState), StatusCode> {
        tokio::time::sleep_until(next_try.into()).await;

        match connector.try_connect().await {
            Ok((channel, result)) => {
                let _ = self.inner.state_watch_tx.send(SessionState::Connected);
                Ok((
                    SessionPollResult::Reconnected(result),
                    LoopState::Connected(LiveConnection {
                        channel,
                        keep_alive: KeepAliveLoop::new(self.inner.clone(), self.keep_alive_interval)
                            .run()
                            .boxed(),
                        subscriptions: SubscriptionEventLoop::new(
                            self.inner.clone(),
                            self.trigger_publish_recv.clone(),
                        )
                        .run()
                        .boxed(),
                        failed_keep_alive_streak: 0,
                        closing: false,
                        disconnect_fut: futures::future::pending().boxed(),
                    }),
                ))
            }
            Err(e) => {
                warn!("Failed to connect to server, status code: {e}");
                match backoff.next() {
                    Some(delay) => Ok((
                        SessionPollResult::ReconnectFailed(e),
                        LoopState::Connecting(connector, backoff, Instant::now() + delay),
                    )),
                    None => Err(e),
                }
            }
        }
    }

    /// Polls a live connection for the next event. Returns `Ok(None)` when the transport has
    /// closed and the session is not configured to reconnect, ending the event loop stream.
    async fn poll_connected(
        &self,
        mut conn: LiveConnection,
    ) -> Result<Option<(SessionPollResult, LoopState)>, StatusCode> {
        tokio::select! {
            r = conn.channel.poll() => {
                if let TransportPollResult::Closed(code) = r {
                    session_warn!(self.inner, "Transport disconnected: {code}");
                    let _ = self.inner.state_watch_tx.send(SessionState::Disconnected);

                    if !self.inner.should_reconnect.load(Ordering::Relaxed) {
                        return Ok(None);
                    }

                    Ok(Some((SessionPollResult::ConnectionLost(code), LoopState::Disconnected)))
                } else {
                    Ok(Some((SessionPollResult::Transport(r), LoopState::Connected(conn))))
                }
            }
            r = conn.keep_alive.next() => {
                let Some(activity) = r else {
                    session_error!(self.inner, "Session activity loop ended unexpectedly");
                    return Err(StatusCode::BadUnexpectedError);
                };
                self.apply_keep_alive_result(&mut conn, &activity);
                Ok(Some((SessionPollResult::SessionActivity(activity), LoopState::Connected(conn))))
            }
            r = conn.subscriptions.next() => {
                let Some(activity) = r else {
                    session_error!(self.inner, "Subscription event loop ended unexpectedly");
                    return Err(StatusCode::BadUnexpectedError);
                };
                Ok(Some((SessionPollResult::Subscription(activity), LoopState::Connected(conn))))
            }
            _ = &mut conn.disconnect_fut => {
                // We will shortly transition to Disconnected once the transport notices.
                Ok(Some((SessionPollResult::FinishedDisconnect, LoopState::Connected(conn))))
            }
        }
    }

    fn apply_keep_alive_result(&self, conn: &mut LiveConnection, activity: &SessionActivity) {
        match activity {
            SessionActivity::KeepAliveSucceeded => conn.failed_keep_alive_streak = 0,
            SessionActivity::KeepAliveFailed(status_code) => {
                session_warn!(self.inner, "Keep alive failed: {status_code}");
                conn.failed_keep_alive_streak += 1;
                if !conn.closing
                    && self.max_failed_keep_alive_count != 0
                    && conn.failed_keep_alive_streak >= self.max_failed_keep_alive_count
                {
                    session_error!(
                        self.inner,
                        "Maximum number of failed keep-alives exceed limit, session will be closed."
                    );
                    conn.closing = true;
                    let s = self.inner.clone();
                    conn.disconnect_fut = async move { s.disconnect_inner(false, false).await }.boxed();
                }
            }
        }
    }
}

/// Periodic activity performed by the session.
#[derive(Debug, Clone)]
pub enum SessionActivity {
    /// A keep alive request was sent to the server and a response was received with a successful state.
    KeepAliveSucceeded,
    /// A keep alive request was sent to the server, but it failed or the server was in an invalid state.
    KeepAliveFailed(StatusCode),
}

/// Reads `Server_ServerStatus_State` on an interval and turns the result into a
/// [`SessionActivity`], detecting a dead or unhealthy server before a request actually times
/// out.
struct KeepAliveLoop {
    inner: Arc<Session>,
    interval: tokio::time::Interval,
}

impl KeepAliveLoop {
    fn new(inner: Arc<Session>, keep_alive_interval: Duration) -> Self {
        let mut interval = tokio::time::interval(keep_alive_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { inner, interval }
    }

    fn run(self) -> impl Stream<Item = SessionActivity> {
        futures::stream::unfold(self, |mut slf| async move {
            slf.interval.tick().await;
            let activity = slf.check_server_status().await;
            Some((activity, slf))
        })
    }

    async fn check_server_status(&self) -> SessionActivity {
        let started = Instant::now();
        let result = self
            .inner
            .read(
                &[ReadValueId {
                    node_id: VariableId::Server_ServerStatus_State.into(),
                    attribute_id: AttributeId::Value as u32,
                    index_range: Default::default(),
                    data_encoding: QualifiedName::null(),
                }],
                TimestampsToReturn::Server,
                1f64,
            )
            .await;
        let elapsed = started.elapsed();

        let data_value = match result.map(|r| r.into_iter().next()) {
            Ok(Some(data_value)) => {
                // Only record round trip time on success, so a timeout doesn't skew it.
                self.inner
                    .publish_limits_watch_tx
                    .send_modify(|limits| limits.update_message_roundtrip(elapsed));
                data_value
            }
            Ok(None) => return SessionActivity::KeepAliveFailed(StatusCode::BadUnknownResponse),
            Err(e) => return SessionActivity::KeepAliveFailed(e),
        };

        match data_value.value.and_then(|v| v.try_cast_to().ok()) {
            Some(0) => SessionActivity::KeepAliveSucceeded,
            Some(s) => {
                warn!("Keep alive failed, non-running status code {s}");
                SessionActivity::KeepAliveFailed(StatusCode::BadServerHalted)
            }
            None => SessionActivity::KeepAliveFailed(StatusCode::BadUnknownResponse),
        }
    }
}
