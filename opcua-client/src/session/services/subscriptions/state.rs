use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use opcua_types::{MonitoringMode, NotificationMessage, SubscriptionAcknowledgement};

use super::{ModifyMonitoredItem, PublishLimits, Subscription};

/// Tracks the client-side view of every subscription registered on a session: the
/// subscriptions and monitored items themselves, pending acknowledgements owed to the
/// server, and the publish scheduling state shared with the publish loop.
pub struct SubscriptionState {
    subscriptions: HashMap<u32, Subscription>,
    min_publish_interval: Duration,
    last_publish: Option<Instant>,
    pending_acknowledgements: VecDeque<SubscriptionAcknowledgement>,
    publish_limits_watch_tx: tokio::sync::watch::Sender<PublishLimits>,
}

impl SubscriptionState {
    pub(crate) fn new(
        min_publish_interval: Duration,
        publish_limits_watch_tx: tokio::sync::watch::Sender<PublishLimits>,
    ) -> Self {
        Self {
            subscriptions: HashMap::new(),
            min_publish_interval,
            last_publish: None,
            pending_acknowledgements: VecDeque::new(),
            publish_limits_watch_tx,
        }
    }

    fn update_publish_limits(&self) {
        let shortest = self
            .subscriptions
            .values()
            .map(|s| s.publishing_interval())
            .min()
            .unwrap_or(Duration::ZERO);
        self.publish_limits_watch_tx.send_modify(|limits| {
            limits.update_subscriptions(self.subscriptions.len(), shortest);
        });
    }

    pub(crate) fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions
            .insert(subscription.subscription_id(), subscription);
        self.update_publish_limits();
    }

    pub(crate) fn subscription_exists(&self, subscription_id: u32) -> bool {
        self.subscriptions.contains_key(&subscription_id)
    }

    pub(crate) fn subscription_ids(&self) -> Option<Vec<u32>> {
        if self.subscriptions.is_empty() {
            None
        } else {
            Some(self.subscriptions.keys().copied().collect())
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn modify_subscription(
        &mut self,
        subscription_id: u32,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
    ) {
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            subscription.set_publishing_interval(publishing_interval);
            subscription.set_lifetime_count(lifetime_count);
            subscription.set_max_keep_alive_count(max_keep_alive_count);
            subscription.set_max_notifications_per_publish(max_notifications_per_publish);
            subscription.set_priority(priority);
        }
        self.update_publish_limits();
    }

    pub(crate) fn set_publishing_mode(&mut self, subscription_ids: &[u32], publishing_enabled: bool) {
        for id in subscription_ids {
            if let Some(subscription) = self.subscriptions.get_mut(id) {
                subscription.set_publishing_enabled(publishing_enabled);
            }
        }
    }

    pub(crate) fn delete_subscription(&mut self, subscription_id: u32) -> Option<Subscription> {
        let removed = self.subscriptions.remove(&subscription_id);
        if removed.is_some() {
            self.update_publish_limits();
        }
        removed
    }

    pub(crate) fn insert_monitored_items(
        &mut self,
        subscription_id: u32,
        items: Vec<super::CreateMonitoredItem>,
    ) {
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            subscription.insert_monitored_items(items);
        }
    }

    pub(crate) fn modify_monitored_items(
        &mut self,
        subscription_id: u32,
        items: &[ModifyMonitoredItem],
    ) {
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            subscription.modify_monitored_items(items);
        }
    }

    pub(crate) fn delete_monitored_items(&mut self, subscription_id: u32, ids: &[u32]) {
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            subscription.delete_monitored_items(ids);
        }
    }

    pub(crate) fn set_monitoring_mode(
        &mut self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
        monitoring_mode: MonitoringMode,
    ) {
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            for id in monitored_item_ids {
                if let Some(item) = subscription.monitored_items.get_mut(id) {
                    item.set_monitoring_mode(monitoring_mode);
                }
            }
        }
    }

    pub(crate) fn set_triggering(
        &mut self,
        subscription_id: u32,
        triggering_item_id: u32,
        links_to_add: &[u32],
        links_to_remove: &[u32],
    ) {
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            subscription.set_triggering(triggering_item_id, links_to_add, links_to_remove);
        }
    }

    pub(crate) fn set_last_publish(&mut self) {
        self.last_publish = Some(Instant::now());
    }

    /// When the next publish request should be sent, given the minimum publish interval
    /// configured and the shortest publishing interval across all active subscriptions.
    pub(crate) fn next_publish_time(&self) -> Option<Instant> {
        let shortest = self
            .subscriptions
            .values()
            .map(|s| s.publishing_interval())
            .min()?;
        let interval = shortest.max(self.min_publish_interval);
        Some(self.last_publish.map_or_else(Instant::now, |t| t + interval))
    }

    pub(crate) fn take_acknowledgements(&mut self) -> Vec<SubscriptionAcknowledgement> {
        self.pending_acknowledgements.drain(..).collect()
    }

    pub(crate) fn re_queue_acknowledgements(&mut self, acks: Vec<SubscriptionAcknowledgement>) {
        for ack in acks {
            self.pending_acknowledgements.push_back(ack);
        }
    }

    pub(crate) fn add_acknowledgement(&mut self, subscription_id: u32, sequence_number: u32) {
        self.pending_acknowledgements
            .push_back(SubscriptionAcknowledgement {
                subscription_id,
                sequence_number,
            });
    }

    pub(crate) fn handle_notification(
        &mut self,
        subscription_id: u32,
        notification: NotificationMessage,
    ) {
        let sequence_number = notification.sequence_number;
        if let Some(subscription) = self.subscriptions.get_mut(&subscription_id) {
            subscription.on_notification(notification);
            self.add_acknowledgement(subscription_id, sequence_number);
        }
    }
}
