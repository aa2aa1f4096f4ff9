use std::sync::Arc;

use futures::Stream;
use log::warn;
use opcua_types::StatusCode;

use crate::Session;

/// Activity performed by the background publish loop driving a session's subscriptions.
#[derive(Debug, Clone)]
pub enum SubscriptionActivity {
    /// A publish request was sent and a response was received successfully.
    PublishSucceeded,
    /// A publish request failed with the inner [`StatusCode`].
    PublishFailed(StatusCode),
}

/// Drives the client-side publish loop: periodically sends Publish requests for as long as
/// the session has subscriptions registered, scheduled by [`Session::next_publish_time`].
pub(crate) struct SubscriptionEventLoop {
    session: Arc<Session>,
    trigger_publish_recv: tokio::sync::watch::Receiver<std::time::Instant>,
}

impl SubscriptionEventLoop {
    pub(crate) fn new(
        session: Arc<Session>,
        trigger_publish_recv: tokio::sync::watch::Receiver<std::time::Instant>,
    ) -> Self {
        Self {
            session,
            trigger_publish_recv,
        }
    }

    pub(crate) fn run(self) -> impl Stream<Item = SubscriptionActivity> {
        futures::stream::unfold(self, |mut slf| async move {
            loop {
                let next_publish = slf.session.next_publish_time(false);

                match next_publish {
                    Some(next) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(next.into()) => {}
                            _ = slf.trigger_publish_recv.changed() => {}
                        }
                    }
                    None => {
                        // No subscriptions registered yet, wait until one is created.
                        if slf.trigger_publish_recv.changed().await.is_err() {
                            return None;
                        }
                    }
                }

                if slf.session.next_publish_time(false).is_none() {
                    continue;
                }

                let result = slf.session.publish().await;
                let (activity, should_publish_again) = match result {
                    Ok(more) => (SubscriptionActivity::PublishSucceeded, more),
                    Err(e) => {
                        warn!("Publish request failed: {e}");
                        (SubscriptionActivity::PublishFailed(e), false)
                    }
                };

                if should_publish_again {
                    slf.session.trigger_publish_now();
                }

                return Some((activity, slf));
            }
        })
    }
}
