use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use crate::{
    session::{
        process_service_result, process_unexpected_response,
        request_builder::{builder_base, builder_debug, builder_error, RequestHeaderBuilder},
        services::subscriptions::{CreateMonitoredItem, ModifyMonitoredItem, Subscription},
        session_debug, session_error, session_warn,
    },
    Session, UARequest,
};
use log::{debug, log_enabled};
use opcua_core::{handle::AtomicHandle, sync::Mutex, trace_lock, ResponseMessage};
use opcua_types::{
    AttributeId, CreateMonitoredItemsRequest, CreateMonitoredItemsResponse,
    CreateSubscriptionRequest, CreateSubscriptionResponse, DeleteMonitoredItemsRequest,
    DeleteMonitoredItemsResponse, DeleteSubscriptionsRequest, DeleteSubscriptionsResponse,
    IntegerId, ModifyMonitoredItemsRequest, ModifyMonitoredItemsResponse,
    ModifySubscriptionRequest, ModifySubscriptionResponse, MonitoredItemCreateRequest,
    MonitoredItemCreateResult, MonitoredItemModifyRequest, MonitoredItemModifyResult,
    MonitoringMode, MonitoringParameters, NodeId, NotificationMessage, PublishRequest, ReadValueId,
    RepublishRequest, SetMonitoringModeRequest, SetMonitoringModeResponse,
    SetPublishingModeRequest, SetPublishingModeResponse, SetTriggeringRequest,
    SetTriggeringResponse, StatusCode, TimestampsToReturn, TransferResult,
    TransferSubscriptionsRequest, TransferSubscriptionsResponse,
};

use super::{state::SubscriptionState, OnSubscriptionNotification};

/// Rejects a zero subscription id, which is never valid on the wire.
fn require_nonzero_subscription_id(id: u32) -> Result<(), StatusCode> {
    if id == 0 {
        Err(StatusCode::BadInvalidArgument)
    } else {
        Ok(())
    }
}

/// Looks up `id` in the shared subscription table, failing with `BadSubscriptionIdInvalid` if
/// the client has no record of it.
fn require_subscription_exists(
    subscriptions: &Mutex<SubscriptionState>,
    id: u32,
) -> Result<(), StatusCode> {
    let state = trace_lock!(subscriptions);
    if state.subscription_exists(id) {
        Ok(())
    } else {
        Err(StatusCode::BadSubscriptionIdInvalid)
    }
}

/// Builds a `CreateSubscriptionRequest` (Part 4 §5.13.2): asks the server to start a new
/// subscription at the requested publishing rate, keep-alive count and lifetime.
pub struct CreateSubscription<'a> {
    subscriptions: &'a Mutex<SubscriptionState>,
    callback: Box<dyn OnSubscriptionNotification>,

    publishing_interval: Duration,
    lifetime_count: u32,
    keep_alive_count: u32,
    max_notifications_per_publish: u32,
    publishing_enabled: bool,
    priority: u8,

    header: RequestHeaderBuilder,
}

builder_base!(CreateSubscription<'a>);

impl<'a> CreateSubscription<'a> {
    /// Construct a new call to the `CreateSubscription` service.
    pub fn new(session: &'a Session, callback: Box<dyn OnSubscriptionNotification>) -> Self {
        Self {
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            keep_alive_count: 20,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
            callback,
        }
    }

    /// Construct a new call to the `CreateSubscription` service, setting header parameters manually.
    pub fn new_manual(
        subscriptions: &'a Mutex<SubscriptionState>,
        callback: Box<dyn OnSubscriptionNotification>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscriptions,
            callback,
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            keep_alive_count: 20,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Cyclic rate, in milliseconds, at which the server publishes notifications. A value
    /// of 0 or less asks the server to revise with its fastest supported rate.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// Number of missed publishing cycles before the server deletes the subscription. Must
    /// be at least three times `max_keep_alive_count`.
    pub fn max_lifetime_count(mut self, lifetime_count: u32) -> Self {
        self.lifetime_count = lifetime_count;
        self
    }

    /// Number of publishing cycles with nothing to report before the server sends a
    /// keep-alive. 0 asks the server to revise with its smallest supported count.
    pub fn max_keep_alive_count(mut self, keep_alive_count: u32) -> Self {
        self.keep_alive_count = keep_alive_count;
        self
    }

    /// Cap on notifications per publish response; 0 means unlimited.
    pub fn max_notifications_per_publish(mut self, max_notifications_per_publish: u32) -> Self {
        self.max_notifications_per_publish = max_notifications_per_publish;
        self
    }

    /// Relative priority used by the server to order publish responses when several
    /// subscriptions are due at once. Leave at 0 unless ordering matters.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the subscription starts out publishing notifications.
    pub fn publishing_enabled(mut self, publishing_enabled: bool) -> Self {
        self.publishing_enabled = publishing_enabled;
        self
    }
}

impl UARequest for CreateSubscription<'_> {
    type Out = CreateSubscriptionResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        let request = CreateSubscriptionRequest {
            request_header: self.header.header,
            requested_publishing_interval: self.publishing_interval.as_millis() as f64,
            requested_lifetime_count: self.lifetime_count,
            requested_max_keep_alive_count: self.keep_alive_count,
            max_notifications_per_publish: self.max_notifications_per_publish,
            publishing_enabled: self.publishing_enabled,
            priority: self.priority,
        };

        let response = channel.send(request, self.header.timeout).await?;

        if let ResponseMessage::CreateSubscription(response) = response {
            process_service_result(&response.response_header)?;
            let subscription = Subscription::new(
                response.subscription_id,
                Duration::from_millis(response.revised_publishing_interval.max(0.0).floor() as u64),
                response.revised_lifetime_count,
                response.revised_max_keep_alive_count,
                self.max_notifications_per_publish,
                self.priority,
                self.publishing_enabled,
                self.callback,
            );
            trace_lock!(self.subscriptions).add_subscription(subscription);
            builder_debug!(
                self,
                "create_subscription, created a subscription with id {}",
                response.subscription_id
            );
            Ok(*response)
        } else {
            builder_error!(self, "create_subscription failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

/// Builds a `ModifySubscriptionRequest` (Part 4 §5.13.3): revises the publishing parameters of
/// an existing subscription.
#[derive(Clone)]
pub struct ModifySubscription<'a> {
    subscriptions: &'a Mutex<SubscriptionState>,
    subscription_id: u32,
    publishing_interval: Duration,
    lifetime_count: u32,
    keep_alive_count: u32,
    max_notifications_per_publish: u32,
    priority: u8,

    header: RequestHeaderBuilder,
}

builder_base!(ModifySubscription<'a>);

impl<'a> ModifySubscription<'a> {
    /// Construct a new call to the `ModifySubscription` service.
    pub fn new(subscription_id: u32, session: &'a Session) -> Self {
        Self {
            subscription_id,
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            keep_alive_count: 20,
            max_notifications_per_publish: 0,
            priority: 0,
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `ModifySubscription` service, setting header parameters manually.
    pub fn new_manual(
        subscription_id: u32,
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_id,
            subscriptions,
            publishing_interval: Duration::from_millis(500),
            lifetime_count: 60,
            keep_alive_count: 20,
            max_notifications_per_publish: 0,
            priority: 0,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// See [`CreateSubscription::publishing_interval`].
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// See [`CreateSubscription::max_lifetime_count`].
    pub fn max_lifetime_count(mut self, lifetime_count: u32) -> Self {
        self.lifetime_count = lifetime_count;
        self
    }

    /// See [`CreateSubscription::max_keep_alive_count`].
    pub fn max_keep_alive_count(mut self, keep_alive_count: u32) -> Self {
        self.keep_alive_count = keep_alive_count;
        self
    }

    /// See [`CreateSubscription::max_notifications_per_publish`].
    pub fn max_notifications_per_publish(mut self, max_notifications_per_publish: u32) -> Self {
        self.max_notifications_per_publish = max_notifications_per_publish;
        self
    }

    /// See [`CreateSubscription::priority`].
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

impl UARequest for ModifySubscription<'_> {
    type Out = ModifySubscriptionResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        if let Err(e) = require_nonzero_subscription_id(self.subscription_id) {
            builder_error!(
                self,
                "modify_subscription, subscription id must be non-zero"
            );
            return Err(e);
        }

        let request = ModifySubscriptionRequest {
            request_header: self.header.header,
            subscription_id: self.subscription_id,
            requested_publishing_interval: self.publishing_interval.as_millis() as f64,
            requested_lifetime_count: self.lifetime_count,
            requested_max_keep_alive_count: self.keep_alive_count,
            max_notifications_per_publish: self.max_notifications_per_publish,
            priority: self.priority,
        };

        let response = channel.send(request, self.header.timeout).await?;

        if let ResponseMessage::ModifySubscription(response) = response {
            process_service_result(&response.response_header)?;
            trace_lock!(self.subscriptions).modify_subscription(
                self.subscription_id,
                Duration::from_millis(response.revised_publishing_interval.max(0.0).floor() as u64),
                response.revised_lifetime_count,
                response.revised_max_keep_alive_count,
                self.max_notifications_per_publish,
                self.priority,
            );
            builder_debug!(
                self,
                "modify_subscription success for {}",
                self.subscription_id
            );
            Ok(*response)
        } else {
            builder_debug!(self, "modify_subscription failed");
            Err(process_unexpected_response(response))
        }
    }
}

/// Builds a `SetPublishingModeRequest` (Part 4 §5.13.4): enables or disables notification
/// publishing for one or more subscriptions without deleting them.
#[derive(Clone)]
pub struct SetPublishingMode<'a> {
    subscriptions: &'a Mutex<SubscriptionState>,
    subscription_ids: Vec<u32>,
    publishing_enabled: bool,

    header: RequestHeaderBuilder,
}

builder_base!(SetPublishingMode<'a>);

impl<'a> SetPublishingMode<'a> {
    /// Construct a new call to the `SetPublishingMode` service.
    pub fn new(publishing_enabled: bool, session: &'a Session) -> Self {
        Self {
            subscription_ids: Vec::new(),
            publishing_enabled,
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `SetPublishingMode` service, setting header parameters manually.
    pub fn new_manual(
        publishing_enabled: bool,
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_ids: Vec::new(),
            publishing_enabled,
            subscriptions,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Set the subscription IDs to update, overwriting any that were added previously.
    pub fn subscription_ids(mut self, subscription_ids: Vec<u32>) -> Self {
        self.subscription_ids = subscription_ids;
        self
    }

    /// Add a subscription ID to update.
    pub fn subscription(mut self, subscription_id: u32) -> Self {
        self.subscription_ids.push(subscription_id);
        self
    }
}

impl UARequest for SetPublishingMode<'_> {
    type Out = SetPublishingModeResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        builder_debug!(
            self,
            "set_publishing_mode, for subscriptions {:?}, publishing enabled {}",
            self.subscription_ids,
            self.publishing_enabled
        );
        if self.subscription_ids.is_empty() {
            builder_error!(
                self,
                "set_publishing_mode, no subscription ids were provided"
            );
            return Err(StatusCode::BadNothingToDo);
        }

        let request = SetPublishingModeRequest {
            request_header: self.header.header,
            publishing_enabled: self.publishing_enabled,
            subscription_ids: Some(self.subscription_ids.clone()),
        };
        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::SetPublishingMode(response) = response {
            process_service_result(&response.response_header)?;
            let num_results = response
                .results
                .as_ref()
                .map(|l| l.len())
                .unwrap_or_default();

            if num_results != self.subscription_ids.len() {
                builder_error!(
                    self,
                    "set_publishing_mode returned an incorrect number of results. Expected {}, got {}",
                    self.subscription_ids.len(),
                    num_results
                );
                return Err(StatusCode::BadUnexpectedError);
            }

            let updated_ids = self
                .subscription_ids
                .iter()
                .zip(response.results.iter().flat_map(|f| f.iter()))
                .filter(|(_, s)| s.is_good())
                .map(|(v, _)| *v)
                .collect::<Vec<_>>();
            trace_lock!(self.subscriptions).set_publishing_mode(&updated_ids, self.publishing_enabled);

            builder_debug!(self, "set_publishing_mode success");
            Ok(*response)
        } else {
            builder_error!(self, "set_publishing_mode failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `TransferSubscriptionsRequest` (Part 4 §5.13.7): moves subscriptions created under
/// a different session onto this one, e.g. after reconnecting with a fresh session.
///
/// Transferring does not re-register the subscription with [`Session::subscription_state`] on
/// its own; call that separately if you need notification callbacks to keep firing.
pub struct TransferSubscriptions {
    subscription_ids: Vec<u32>,
    send_initial_values: bool,

    header: RequestHeaderBuilder,
}

builder_base!(TransferSubscriptions);

impl TransferSubscriptions {
    /// Construct a new call to the `TransferSubscriptions` service.
    pub fn new(session: &Session) -> Self {
        Self {
            subscription_ids: Vec::new(),
            send_initial_values: false,
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `TransferSubscriptions` service, setting header parameters manually.
    pub fn new_manual(
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_ids: Vec::new(),
            send_initial_values: false,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// If true, the next publish response after transfer carries full current values instead
    /// of just changes since the last response.
    pub fn send_initial_values(mut self, send_initial_values: bool) -> Self {
        self.send_initial_values = send_initial_values;
        self
    }

    /// Set the subscription IDs to transfer, overwriting any that were added previously.
    pub fn subscription_ids(mut self, subscription_ids: Vec<u32>) -> Self {
        self.subscription_ids = subscription_ids;
        self
    }

    /// Add a subscription ID to transfer.
    pub fn subscription(mut self, subscription_id: u32) -> Self {
        self.subscription_ids.push(subscription_id);
        self
    }
}

impl UARequest for TransferSubscriptions {
    type Out = TransferSubscriptionsResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        if self.subscription_ids.is_empty() {
            builder_error!(
                self,
                "transfer_subscriptions, no subscription ids were provided"
            );
            return Err(StatusCode::BadNothingToDo);
        }
        let request = TransferSubscriptionsRequest {
            request_header: self.header.header,
            subscription_ids: Some(self.subscription_ids),
            send_initial_values: self.send_initial_values,
        };
        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::TransferSubscriptions(response) = response {
            process_service_result(&response.response_header)?;
            builder_debug!(self, "transfer_subscriptions success");
            Ok(*response)
        } else {
            builder_error!(self, "transfer_subscriptions failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `DeleteSubscriptionsRequest` (Part 4 §5.13.8): removes subscriptions and their
/// monitored items from the server.
pub struct DeleteSubscriptions<'a> {
    subscription_ids: Vec<u32>,
    subscriptions: &'a Mutex<SubscriptionState>,

    header: RequestHeaderBuilder,
}

builder_base!(DeleteSubscriptions<'a>);

impl<'a> DeleteSubscriptions<'a> {
    /// Construct a new call to the `DeleteSubscriptions` service.
    pub fn new(session: &'a Session) -> Self {
        Self {
            subscription_ids: Vec::new(),
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `DeleteSubscriptions` service, setting header parameters manually.
    pub fn new_manual(
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_ids: Vec::new(),
            subscriptions,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Set the subscription IDs to delete, overwriting any that were added previously.
    pub fn subscription_ids(mut self, subscription_ids: Vec<u32>) -> Self {
        self.subscription_ids = subscription_ids;
        self
    }

    /// Add a subscription ID to delete.
    pub fn subscription(mut self, subscription_id: u32) -> Self {
        self.subscription_ids.push(subscription_id);
        self
    }
}

impl UARequest for DeleteSubscriptions<'_> {
    type Out = DeleteSubscriptionsResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        if self.subscription_ids.is_empty() {
            builder_error!(self, "delete_subscriptions called with no subscription IDs");
            return Err(StatusCode::BadNothingToDo);
        }
        let request = DeleteSubscriptionsRequest {
            request_header: self.header.header,
            subscription_ids: Some(self.subscription_ids.clone()),
        };
        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::DeleteSubscriptions(response) = response {
            process_service_result(&response.response_header)?;
            {
                let mut subscription_state = trace_lock!(self.subscriptions);
                for id in self.subscription_ids {
                    subscription_state.delete_subscription(id);
                }
            }
            builder_debug!(self, "delete_subscriptions success");
            Ok(*response)
        } else {
            builder_error!(self, "delete_subscriptions failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `CreateMonitoredItemsRequest` (Part 4 §5.12.2): attaches one or more monitored
/// items, each watching a single node attribute, to an existing subscription.
pub struct CreateMonitoredItems<'a> {
    subscription_id: u32,
    timestamps_to_return: TimestampsToReturn,
    items_to_create: Vec<MonitoredItemCreateRequest>,
    subscriptions: &'a Mutex<SubscriptionState>,
    handle: &'a AtomicHandle,

    header: RequestHeaderBuilder,
}

builder_base!(CreateMonitoredItems<'a>);

impl<'a> CreateMonitoredItems<'a> {
    /// Construct a new call to the `CreateMonitoredItems` service.
    pub fn new(subscription_id: u32, session: &'a Session) -> Self {
        Self {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Neither,
            items_to_create: Vec::new(),
            subscriptions: session.subscription_state(),
            handle: &session.monitored_item_handle,
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `CreateMonitoredItems` service, setting header parameters manually.
    pub fn new_manual(
        subscription_id: u32,
        subscriptions: &'a Mutex<SubscriptionState>,
        monitored_item_handle: &'a AtomicHandle,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Neither,
            items_to_create: Vec::new(),
            subscriptions,
            handle: monitored_item_handle,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Which timestamps the server should attach to each reported value.
    pub fn timestamps_to_return(mut self, timestamps_to_return: TimestampsToReturn) -> Self {
        self.timestamps_to_return = timestamps_to_return;
        self
    }

    /// Set the monitored items to create, overwriting any that were added previously.
    pub fn items_to_create(mut self, items_to_create: Vec<MonitoredItemCreateRequest>) -> Self {
        self.items_to_create = items_to_create;
        self
    }

    /// Add a monitored item to create.
    pub fn item(mut self, item: MonitoredItemCreateRequest) -> Self {
        self.items_to_create.push(item);
        self
    }

    /// Add a monitored item watching the `Value` attribute of `node_id`.
    pub fn value(mut self, node_id: NodeId, sampling_interval: f64, queue_size: u32) -> Self {
        self.items_to_create.push(MonitoredItemCreateRequest {
            item_to_monitor: ReadValueId {
                node_id,
                attribute_id: AttributeId::Value as u32,
                ..Default::default()
            },
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle: self.handle.next(),
                sampling_interval,
                queue_size,
                discard_oldest: true,
                ..Default::default()
            },
        });
        self
    }
}

impl UARequest for CreateMonitoredItems<'_> {
    type Out = CreateMonitoredItemsResponse;

    async fn send<'a>(
        mut self,
        channel: &'a crate::AsyncSecureChannel,
    ) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        builder_debug!(
            self,
            "create_monitored_items, for subscription {}, {} items",
            self.subscription_id,
            self.items_to_create.len()
        );
        if let Err(e) = require_nonzero_subscription_id(self.subscription_id) {
            builder_error!(self, "create_monitored_items, subscription id 0 is invalid");
            return Err(e);
        }
        if let Err(e) = require_subscription_exists(self.subscriptions, self.subscription_id) {
            builder_error!(
                self,
                "create_monitored_items, subscription id {} does not exist",
                self.subscription_id
            );
            return Err(e);
        }
        if self.items_to_create.is_empty() {
            builder_error!(
                self,
                "create_monitored_items, called with no items to create"
            );
            return Err(StatusCode::BadNothingToDo);
        }
        for item in &mut self.items_to_create {
            if item.requested_parameters.client_handle == 0 {
                item.requested_parameters.client_handle = self.handle.next();
            }
        }

        let request = CreateMonitoredItemsRequest {
            request_header: self.header.header,
            subscription_id: self.subscription_id,
            timestamps_to_return: self.timestamps_to_return,
            items_to_create: Some(self.items_to_create.clone()),
        };

        let response = channel.send(request, self.header.timeout).await?;

        if let ResponseMessage::CreateMonitoredItems(response) = response {
            process_service_result(&response.response_header)?;
            let Some(ref results) = response.results else {
                builder_error!(
                    self,
                    "create_monitored_items, success but no monitored items were created"
                );
                return Err(StatusCode::BadUnexpectedError);
            };
            if results.len() != self.items_to_create.len() {
                builder_error!(
                    self,
                    "create_monitored_items, unexpected number of results. Got {}, expected {}",
                    results.len(),
                    self.items_to_create.len()
                );
                return Err(StatusCode::BadUnexpectedError);
            }
            builder_debug!(
                self,
                "create_monitored_items, {} items created",
                self.items_to_create.len()
            );
            let items_to_create = self
                .items_to_create
                .into_iter()
                .zip(results)
                .map(|(i, r)| CreateMonitoredItem {
                    id: r.monitored_item_id,
                    client_handle: i.requested_parameters.client_handle,
                    discard_oldest: i.requested_parameters.discard_oldest,
                    item_to_monitor: i.item_to_monitor.clone(),
                    monitoring_mode: i.monitoring_mode,
                    queue_size: r.revised_queue_size,
                    sampling_interval: r.revised_sampling_interval,
                    filter: i.requested_parameters.filter,
                })
                .collect::<Vec<CreateMonitoredItem>>();
            trace_lock!(self.subscriptions)
                .insert_monitored_items(self.subscription_id, items_to_create);
            Ok(*response)
        } else {
            builder_error!(self, "create_monitored_items failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `ModifyMonitoredItemsRequest` (Part 4 §5.12.3): changes the sampling interval,
/// queue size or filter of monitored items already attached to a subscription.
pub struct ModifyMonitoredItems<'a> {
    subscription_id: u32,
    timestamps_to_return: TimestampsToReturn,
    items_to_modify: Vec<MonitoredItemModifyRequest>,
    subscriptions: &'a Mutex<SubscriptionState>,

    header: RequestHeaderBuilder,
}

builder_base!(ModifyMonitoredItems<'a>);

impl<'a> ModifyMonitoredItems<'a> {
    /// Construct a new call to the `ModifyMonitoredItems` service.
    pub fn new(subscription_id: u32, session: &'a Session) -> Self {
        Self {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Neither,
            items_to_modify: Vec::new(),
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `ModifyMonitoredItems` service, setting header parameters manually.
    pub fn new_manual(
        subscription_id: u32,
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Neither,
            items_to_modify: Vec::new(),
            subscriptions,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Which timestamps the server should attach to each reported value.
    pub fn timestamps_to_return(mut self, timestamps_to_return: TimestampsToReturn) -> Self {
        self.timestamps_to_return = timestamps_to_return;
        self
    }

    /// Set the monitored items to modify, overwriting any that were added previously.
    pub fn items_to_modify(mut self, items_to_modify: Vec<MonitoredItemModifyRequest>) -> Self {
        self.items_to_modify = items_to_modify;
        self
    }

    /// Add a monitored item to modify.
    pub fn item(mut self, item: MonitoredItemModifyRequest) -> Self {
        self.items_to_modify.push(item);
        self
    }
}

impl UARequest for ModifyMonitoredItems<'_> {
    type Out = ModifyMonitoredItemsResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        builder_debug!(
            self,
            "modify_monitored_items, for subscription {}, {} items",
            self.subscription_id,
            self.items_to_modify.len()
        );
        if let Err(e) = require_nonzero_subscription_id(self.subscription_id) {
            builder_error!(self, "modify_monitored_items, subscription id 0 is invalid");
            return Err(e);
        }
        if let Err(e) = require_subscription_exists(self.subscriptions, self.subscription_id) {
            builder_error!(
                self,
                "modify_monitored_items, subscription id {} does not exist",
                self.subscription_id
            );
            return Err(e);
        }
        if self.items_to_modify.is_empty() {
            builder_error!(
                self,
                "modify_monitored_items, called with no items to modify"
            );
            return Err(StatusCode::BadNothingToDo);
        }
        let ids = self
            .items_to_modify
            .iter()
            .map(|i| i.monitored_item_id)
            .collect::<Vec<_>>();
        let request = ModifyMonitoredItemsRequest {
            request_header: self.header.header,
            subscription_id: self.subscription_id,
            timestamps_to_return: self.timestamps_to_return,
            items_to_modify: Some(self.items_to_modify),
        };
        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::ModifyMonitoredItems(response) = response {
            process_service_result(&response.response_header)?;
            let Some(results) = &response.results else {
                builder_error!(self, "modify_monitored_items, got empty response");
                return Err(StatusCode::BadUnexpectedError);
            };
            if results.len() != ids.len() {
                builder_error!(
                    self,
                    "modify_monitored_items, unexpected number of results. Expected {}, got {}",
                    ids.len(),
                    results.len()
                );
                return Err(StatusCode::BadUnexpectedError);
            }
            let items_to_modify = ids
                .iter()
                .zip(results.iter())
                .map(|(id, r)| ModifyMonitoredItem {
                    id: *id,
                    queue_size: r.revised_queue_size,
                    sampling_interval: r.revised_sampling_interval,
                })
                .collect::<Vec<ModifyMonitoredItem>>();
            trace_lock!(self.subscriptions)
                .modify_monitored_items(self.subscription_id, &items_to_modify);
            builder_debug!(self, "modify_monitored_items, success");
            Ok(*response)
        } else {
            builder_error!(self, "modify_monitored_items failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `SetMonitoringModeRequest` (Part 4 §5.12.4): switches monitored items between
/// `Disabled`, `Sampling` and `Reporting`.
pub struct SetMonitoringMode<'a> {
    subscription_id: u32,
    monitoring_mode: MonitoringMode,
    monitored_item_ids: Vec<u32>,
    subscriptions: &'a Mutex<SubscriptionState>,

    header: RequestHeaderBuilder,
}

builder_base!(SetMonitoringMode<'a>);

impl<'a> SetMonitoringMode<'a> {
    /// Construct a new call to the `SetMonitoringMode` service.
    pub fn new(
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        session: &'a Session,
    ) -> Self {
        Self {
            subscription_id,
            monitored_item_ids: Vec::new(),
            monitoring_mode,
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `SetMonitoringMode` service, setting header parameters manually.
    pub fn new_manual(
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_id,
            monitored_item_ids: Vec::new(),
            monitoring_mode,
            subscriptions,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Set the monitored items to modify, overwriting any that were added previously.
    pub fn monitored_item_ids(mut self, monitored_item_ids: Vec<u32>) -> Self {
        self.monitored_item_ids = monitored_item_ids;
        self
    }

    /// Add a monitored item to modify.
    pub fn item(mut self, item: u32) -> Self {
        self.monitored_item_ids.push(item);
        self
    }
}

impl UARequest for SetMonitoringMode<'_> {
    type Out = SetMonitoringModeResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        builder_debug!(
            self,
            "set_monitoring_mode, for subscription {}, {} items",
            self.subscription_id,
            self.monitored_item_ids.len()
        );
        if let Err(e) = require_nonzero_subscription_id(self.subscription_id) {
            builder_error!(self, "set_monitoring_mode, subscription id 0 is invalid");
            return Err(e);
        }
        if let Err(e) = require_subscription_exists(self.subscriptions, self.subscription_id) {
            builder_error!(
                self,
                "set_monitoring_mode, subscription id {} does not exist",
                self.subscription_id
            );
            return Err(e);
        }
        if self.monitored_item_ids.is_empty() {
            builder_error!(self, "set_monitoring_mode, called with no items to modify");
            return Err(StatusCode::BadNothingToDo);
        }

        let request = SetMonitoringModeRequest {
            request_header: self.header.header,
            subscription_id: self.subscription_id,
            monitoring_mode: self.monitoring_mode,
            monitored_item_ids: Some(self.monitored_item_ids.clone()),
        };
        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::SetMonitoringMode(response) = response {
            let Some(results) = &response.results else {
                builder_error!(self, "set_monitoring_mode, got empty response");
                return Err(StatusCode::BadUnexpectedError);
            };
            if results.len() != self.monitored_item_ids.len() {
                builder_error!(
                    self,
                    "set_monitoring_mode, unexpected number of results. Expected {}, got {}",
                    self.monitored_item_ids.len(),
                    results.len()
                );
                return Err(StatusCode::BadUnexpectedError);
            }
            let ok_ids: Vec<_> = self
                .monitored_item_ids
                .iter()
                .zip(results.iter())
                .filter(|(_, s)| s.is_good())
                .map(|(v, _)| *v)
                .collect();
            trace_lock!(self.subscriptions).set_monitoring_mode(
                self.subscription_id,
                &ok_ids,
                self.monitoring_mode,
            );

            Ok(*response)
        } else {
            builder_error!(self, "set_monitoring_mode failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `SetTriggeringRequest` (Part 4 §5.12.5): makes one monitored item, when it fires,
/// also force other monitored items to report in the same publish response. Removals apply
/// before additions.
pub struct SetTriggering<'a> {
    subscription_id: u32,
    triggering_item_id: u32,
    links_to_add: Vec<u32>,
    links_to_remove: Vec<u32>,
    subscriptions: &'a Mutex<SubscriptionState>,

    header: RequestHeaderBuilder,
}

builder_base!(SetTriggering<'a>);

impl<'a> SetTriggering<'a> {
    /// Construct a new call to the `SetTriggering` service.
    pub fn new(subscription_id: u32, triggering_item_id: u32, session: &'a Session) -> Self {
        Self {
            subscription_id,
            triggering_item_id,
            links_to_add: Vec::new(),
            links_to_remove: Vec::new(),
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `SetTriggering` service, setting header parameters manually.
    pub fn new_manual(
        subscription_id: u32,
        triggering_item_id: u32,
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_id,
            triggering_item_id,
            links_to_add: Vec::new(),
            links_to_remove: Vec::new(),
            subscriptions,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Set the links to add, overwriting any that were added previously.
    pub fn links_to_add(mut self, links_to_add: Vec<u32>) -> Self {
        self.links_to_add = links_to_add;
        self
    }

    /// Add a new trigger target.
    pub fn add_link(mut self, item: u32) -> Self {
        self.links_to_add.push(item);
        self
    }

    /// Set the links to remove, overwriting any that were added previously.
    pub fn links_to_remove(mut self, links_to_remove: Vec<u32>) -> Self {
        self.links_to_remove = links_to_remove;
        self
    }

    /// Add a new trigger to remove.
    pub fn remove_link(mut self, item: u32) -> Self {
        self.links_to_remove.push(item);
        self
    }
}

impl UARequest for SetTriggering<'_> {
    type Out = SetTriggeringResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        builder_debug!(
            self,
            "set_triggering, for subscription {}, {} links to add, {} links to remove",
            self.subscription_id,
            self.links_to_add.len(),
            self.links_to_remove.len()
        );
        if let Err(e) = require_nonzero_subscription_id(self.subscription_id) {
            builder_error!(self, "set_triggering, subscription id 0 is invalid");
            return Err(e);
        }
        if let Err(e) = require_subscription_exists(self.subscriptions, self.subscription_id) {
            builder_error!(
                self,
                "set_triggering, subscription id {} does not exist",
                self.subscription_id
            );
            return Err(e);
        }
        if self.links_to_add.is_empty() && self.links_to_remove.is_empty() {
            builder_error!(self, "set_triggering, called with nothing to add or remove");
            return Err(StatusCode::BadNothingToDo);
        }
        let request = SetTriggeringRequest {
            request_header: self.header.header,
            subscription_id: self.subscription_id,
            triggering_item_id: self.triggering_item_id,
            links_to_add: if self.links_to_add.is_empty() {
                None
            } else {
                Some(self.links_to_add.clone())
            },
            links_to_remove: if self.links_to_remove.is_empty() {
                None
            } else {
                Some(self.links_to_remove.clone())
            },
        };

        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::SetTriggering(response) = response {
            let to_add_res = response.add_results.as_deref().unwrap_or(&[]);
            let to_remove_res = response.remove_results.as_deref().unwrap_or(&[]);
            if to_add_res.len() != self.links_to_add.len() {
                builder_error!(
                    self,
                    "set_triggering, got unexpected number of add results: {}, expected {}",
                    to_add_res.len(),
                    self.links_to_add.len()
                );
                return Err(StatusCode::BadUnexpectedError);
            }
            if to_remove_res.len() != self.links_to_remove.len() {
                builder_error!(
                    self,
                    "set_triggering, got unexpected number of remove results: {}, expected {}",
                    to_remove_res.len(),
                    self.links_to_add.len()
                );
                return Err(StatusCode::BadUnexpectedError);
            }
            let ok_adds = to_add_res
                .iter()
                .zip(self.links_to_add)
                .filter(|(s, _)| s.is_good())
                .map(|(_, v)| v)
                .collect::<Vec<_>>();
            let ok_removes = to_remove_res
                .iter()
                .zip(self.links_to_remove)
                .filter(|(s, _)| s.is_good())
                .map(|(_, v)| v)
                .collect::<Vec<_>>();

            trace_lock!(self.subscriptions).set_triggering(
                self.subscription_id,
                self.triggering_item_id,
                &ok_adds,
                &ok_removes,
            );
            Ok(*response)
        } else {
            builder_error!(self, "set_triggering failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

#[derive(Clone)]
/// Builds a `DeleteMonitoredItemsRequest` (Part 4 §5.12.6): detaches monitored items from a
/// subscription.
pub struct DeleteMonitoredItems<'a> {
    subscription_id: u32,
    items_to_delete: Vec<u32>,
    subscriptions: &'a Mutex<SubscriptionState>,

    header: RequestHeaderBuilder,
}

builder_base!(DeleteMonitoredItems<'a>);

impl<'a> DeleteMonitoredItems<'a> {
    /// Construct a new call to the `DeleteMonitoredItems` service.
    pub fn new(subscription_id: u32, session: &'a Session) -> Self {
        Self {
            subscription_id,
            items_to_delete: Vec::new(),
            subscriptions: session.subscription_state(),
            header: RequestHeaderBuilder::new_from_session(session),
        }
    }

    /// Construct a new call to the `DeleteMonitoredItems` service, setting header parameters manually.
    pub fn new_manual(
        subscription_id: u32,
        subscriptions: &'a Mutex<SubscriptionState>,
        session_id: u32,
        timeout: Duration,
        auth_token: NodeId,
        request_handle: IntegerId,
    ) -> Self {
        Self {
            subscription_id,
            items_to_delete: Vec::new(),
            subscriptions,
            header: RequestHeaderBuilder::new(session_id, timeout, auth_token, request_handle),
        }
    }

    /// Set the items to delete, overwriting any that were added previously.
    pub fn items_to_delete(mut self, items_to_delete: Vec<u32>) -> Self {
        self.items_to_delete = items_to_delete;
        self
    }

    /// Add a new item to delete.
    pub fn item(mut self, item: u32) -> Self {
        self.items_to_delete.push(item);
        self
    }
}

impl UARequest for DeleteMonitoredItems<'_> {
    type Out = DeleteMonitoredItemsResponse;

    async fn send<'a>(self, channel: &'a crate::AsyncSecureChannel) -> Result<Self::Out, StatusCode>
    where
        Self: 'a,
    {
        builder_debug!(
            self,
            "delete_monitored_items, subscription {} for {} items",
            self.subscription_id,
            self.items_to_delete.len(),
        );
        if let Err(e) = require_nonzero_subscription_id(self.subscription_id) {
            builder_error!(self, "delete_monitored_items, subscription id 0 is invalid");
            return Err(e);
        }
        if let Err(e) = require_subscription_exists(self.subscriptions, self.subscription_id) {
            builder_error!(
                self,
                "delete_monitored_items, subscription id {} does not exist",
                self.subscription_id
            );
            return Err(e);
        }
        if self.items_to_delete.is_empty() {
            builder_error!(
                self,
                "delete_monitored_items, called with no items to delete"
            );
            return Err(StatusCode::BadNothingToDo);
        }

        let request = DeleteMonitoredItemsRequest {
            request_header: self.header.header,
            subscription_id: self.subscription_id,
            monitored_item_ids: Some(self.items_to_delete.clone()),
        };
        let response = channel.send(request, self.header.timeout).await?;
        if let ResponseMessage::DeleteMonitoredItems(response) = response {
            process_service_result(&response.response_header)?;
            if response.results.is_some() {
                trace_lock!(self.subscriptions)
                    .delete_monitored_items(self.subscription_id, &self.items_to_delete);
            }
            builder_debug!(self, "delete_monitored_items, success");
            Ok(*response)
        } else {
            builder_error!(self, "delete_monitored_items failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }
}

impl Session {
    /// Get the internal state of subscriptions registered on the session.
    pub fn subscription_state(&self) -> &Mutex<SubscriptionState> {
        &self.subscription_state
    }

    /// Trigger a publish to fire immediately.
    pub fn trigger_publish_now(&self) {
        let _ = self.trigger_publish_tx.send(Instant::now());
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_subscription_inner(
        &self,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        publishing_enabled: bool,
        priority: u8,
        callback: Box<dyn OnSubscriptionNotification>,
    ) -> Result<u32, StatusCode> {
        let response = CreateSubscription::new(self, callback)
            .publishing_interval(publishing_interval)
            .max_lifetime_count(lifetime_count)
            .max_keep_alive_count(max_keep_alive_count)
            .max_notifications_per_publish(max_notifications_per_publish)
            .publishing_enabled(publishing_enabled)
            .priority(priority)
            .send(&self.channel)
            .await?;

        self.trigger_publish_now();

        Ok(response.subscription_id)
    }

    /// Creates a subscription, the server-side object that paces notification delivery for a
    /// group of monitored items. See [`CreateSubscription`] for the long-form parameter
    /// semantics (Part 4 §5.13.2).
    ///
    /// Returns the server-assigned subscription id on success.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_subscription(
        &self,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
        publishing_enabled: bool,
        callback: impl OnSubscriptionNotification + 'static,
    ) -> Result<u32, StatusCode> {
        self.create_subscription_inner(
            publishing_interval,
            lifetime_count,
            max_keep_alive_count,
            max_notifications_per_publish,
            publishing_enabled,
            priority,
            Box::new(callback),
        )
        .await
    }

    fn subscription_exists(&self, subscription_id: u32) -> bool {
        require_subscription_exists(&self.subscription_state, subscription_id).is_ok()
    }

    /// Revises the publishing parameters of an existing subscription. See
    /// [`ModifySubscription`] for the long-form parameter semantics (Part 4 §5.13.3).
    pub async fn modify_subscription(
        &self,
        subscription_id: u32,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
    ) -> Result<(), StatusCode> {
        if !self.subscription_exists(subscription_id) {
            session_error!(self, "modify_subscription, subscription id does not exist");
            return Err(StatusCode::BadInvalidArgument);
        }

        ModifySubscription::new(subscription_id, self)
            .publishing_interval(publishing_interval)
            .max_lifetime_count(lifetime_count)
            .max_keep_alive_count(max_keep_alive_count)
            .max_notifications_per_publish(max_notifications_per_publish)
            .priority(priority)
            .send(&self.channel)
            .await?;

        Ok(())
    }

    /// Enables or disables publishing on one or more subscriptions without deleting them.
    /// See [`SetPublishingMode`] (Part 4 §5.13.4). Returns the per-id result, `Good` or
    /// `BadSubscriptionIdInvalid`, matching the order of `subscription_ids`.
    pub async fn set_publishing_mode(
        &self,
        subscription_ids: &[u32],
        publishing_enabled: bool,
    ) -> Result<Vec<StatusCode>, StatusCode> {
        let r = SetPublishingMode::new(publishing_enabled, self)
            .subscription_ids(subscription_ids.to_vec())
            .send(&self.channel)
            .await?
            .results
            .unwrap_or_default();
        if publishing_enabled {
            self.trigger_publish_now();
        }
        Ok(r)
    }

    /// Moves subscriptions created under a different session onto this one. See
    /// [`TransferSubscriptions`] (Part 4 §5.13.7). Returns a [`TransferResult`] per id,
    /// matching the order of `subscription_ids`.
    ///
    /// Subscriptions transferred this way still need registering with
    /// [`Session::subscription_state`] to receive notification callbacks.
    pub async fn transfer_subscriptions(
        &self,
        subscription_ids: &[u32],
        send_initial_values: bool,
    ) -> Result<Vec<TransferResult>, StatusCode> {
        let r = TransferSubscriptions::new(self)
            .send_initial_values(send_initial_values)
            .subscription_ids(subscription_ids.to_vec())
            .send(&self.channel)
            .await?
            .results
            .unwrap_or_default();

        self.trigger_publish_now();

        Ok(r)
    }

    /// Deletes a single subscription. See [`delete_subscriptions`](Self::delete_subscriptions)
    /// (Part 4 §5.13.8).
    pub async fn delete_subscription(
        &self,
        subscription_id: u32,
    ) -> Result<StatusCode, StatusCode> {
        if subscription_id == 0 {
            session_error!(self, "delete_subscription, subscription id 0 is invalid");
            Err(StatusCode::BadInvalidArgument)
        } else if !self.subscription_exists(subscription_id) {
            session_error!(
                self,
                "delete_subscription, subscription id {} does not exist",
                subscription_id
            );
            Err(StatusCode::BadInvalidArgument)
        } else {
            let result = self.delete_subscriptions(&[subscription_id]).await?;
            Ok(result[0])
        }
    }

    /// Deletes subscriptions and their monitored items from the server. See
    /// [`DeleteSubscriptions`] (Part 4 §5.13.8). Returns the per-id result, matching the order
    /// of `subscription_ids`.
    pub async fn delete_subscriptions(
        &self,
        subscription_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        Ok(DeleteSubscriptions::new(self)
            .subscription_ids(subscription_ids.to_vec())
            .send(&self.channel)
            .await?
            .results
            .unwrap_or_default())
    }

    /// Attaches monitored items to a subscription. See [`CreateMonitoredItems`] (Part 4
    /// §5.12.2). Returns a [`MonitoredItemCreateResult`] per item, matching the order of
    /// `items_to_create`.
    pub async fn create_monitored_items(
        &self,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items_to_create: Vec<MonitoredItemCreateRequest>,
    ) -> Result<Vec<MonitoredItemCreateResult>, StatusCode> {
        Ok(CreateMonitoredItems::new(subscription_id, self)
            .items_to_create(items_to_create)
            .timestamps_to_return(timestamps_to_return)
            .send(&self.channel)
            .await?
            .results
            .unwrap_or_default())
    }

    /// Changes the sampling interval, queue size or filter of monitored items. See
    /// [`ModifyMonitoredItems`] (Part 4 §5.12.3). Returns a [`MonitoredItemModifyResult`] per
    /// item, matching the order of `items_to_modify`.
    pub async fn modify_monitored_items(
        &self,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items_to_modify: &[MonitoredItemModifyRequest],
    ) -> Result<Vec<MonitoredItemModifyResult>, StatusCode> {
        Ok(ModifyMonitoredItems::new(subscription_id, self)
            .timestamps_to_return(timestamps_to_return)
            .items_to_modify(items_to_modify.to_vec())
            .send(&self.channel)
            .await?
            .results
            .unwrap_or_default())
    }

    /// Switches monitored items between `Disabled`, `Sampling` and `Reporting`. See
    /// [`SetMonitoringMode`] (Part 4 §5.12.4). Returns a per-item result, matching the order of
    /// `monitored_item_ids`.
    pub async fn set_monitoring_mode(
        &self,
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        monitored_item_ids: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        Ok(
            SetMonitoringMode::new(subscription_id, monitoring_mode, self)
                .monitored_item_ids(monitored_item_ids.to_vec())
                .send(&self.channel)
                .await?
                .results
                .unwrap_or_default(),
        )
    }

    /// Makes `triggering_item_id` force other monitored items to report in the same publish
    /// response when it fires. See [`SetTriggering`] (Part 4 §5.12.5); removals apply before
    /// additions. Returns the add and remove result lists, each matching the order of the
    /// corresponding input list.
    pub async fn set_triggering(
        &self,
        subscription_id: u32,
        triggering_item_id: u32,
        links_to_add: &[u32],
        links_to_remove: &[u32],
    ) -> Result<(Option<Vec<StatusCode>>, Option<Vec<StatusCode>>), StatusCode> {
        let response = SetTriggering::new(subscription_id, triggering_item_id, self)
            .links_to_add(links_to_add.to_vec())
            .links_to_remove(links_to_remove.to_vec())
            .send(&self.channel)
            .await?;
        Ok((response.add_results, response.remove_results))
    }

    /// Detaches monitored items from a subscription. See [`DeleteMonitoredItems`] (Part 4
    /// §5.12.6). Returns a per-item result, matching the order of `items_to_delete`.
    pub async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        items_to_delete: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        Ok(DeleteMonitoredItems::new(subscription_id, self)
            .items_to_delete(items_to_delete.to_vec())
            .send(&self.channel)
            .await?
            .results
            .unwrap_or_default())
    }

    pub(crate) fn next_publish_time(&self, set_last_publish: bool) -> Option<Instant> {
        let mut subscription_state = trace_lock!(self.subscription_state);
        if set_last_publish {
            subscription_state.set_last_publish();
        }
        subscription_state.next_publish_time()
    }

    /// Send a publish request, returning `true` if the session should send a new request
    /// immediately.
    pub(crate) async fn publish(&self) -> Result<bool, StatusCode> {
        let acks = {
            let mut subscription_state = trace_lock!(self.subscription_state);
            let acks = subscription_state.take_acknowledgements();
            if acks.is_empty() {
                None
            } else {
                Some(acks)
            }
        };

        if log_enabled!(log::Level::Debug) {
            let sequence_nrs: Vec<u32> = acks
                .iter()
                .flatten()
                .map(|ack| ack.sequence_number)
                .collect();
            debug!(
                "publish is acknowledging subscription acknowledgements with sequence nrs {:?}",
                sequence_nrs
            );
        }

        let request = PublishRequest {
            request_header: self.channel.make_request_header(self.publish_timeout),
            subscription_acknowledgements: acks.clone(),
        };

        let response = self.channel.send(request, self.publish_timeout).await;

        let err_status = match response {
            Ok(ResponseMessage::Publish(r)) => {
                session_debug!(self, "PublishResponse");
                trace_lock!(self.subscription_state)
                    .handle_notification(r.subscription_id, r.notification_message);
                return Ok(r.more_notifications);
            }
            Err(e) => e,
            Ok(r) => {
                session_error!(self, "publish failed {:?}", r);
                process_unexpected_response(r)
            }
        };

        if let Some(acks) = acks {
            trace_lock!(self.subscription_state).re_queue_acknowledgements(acks);
        }

        Err(err_status)
    }

    /// Re-requests an unacknowledged notification message by sequence number. On success the
    /// session automatically acknowledges it in the next publish request. See [`RepublishRequest`]
    /// (Part 4 §5.14.3).
    pub async fn republish(
        &self,
        subscription_id: u32,
        sequence_number: u32,
    ) -> Result<NotificationMessage, StatusCode> {
        let request = RepublishRequest {
            request_header: self.channel.make_request_header(self.request_timeout),
            subscription_id,
            retransmit_sequence_number: sequence_number,
        };

        let response = self.channel.send(request, self.request_timeout).await?;

        if let ResponseMessage::Republish(response) = response {
            process_service_result(&response.response_header)?;
            session_debug!(self, "republish, success");
            trace_lock!(self.subscription_state)
                .add_acknowledgement(subscription_id, sequence_number);
            Ok(response.notification_message)
        } else {
            session_error!(self, "republish failed {:?}", response);
            Err(process_unexpected_response(response))
        }
    }

    /// Attempts to carry the subscriptions created under a previous session over to this one:
    /// first via `TransferSubscriptions`, then by recreating from scratch whatever didn't
    /// transfer.
    pub(crate) async fn transfer_subscriptions_from_old_session(&self) {
        let subscription_ids = {
            let subscription_state = trace_lock!(self.subscription_state);
            subscription_state.subscription_ids()
        };

        let Some(subscription_ids) = subscription_ids else {
            return;
        };

        let mut ids_to_recreate = subscription_ids.iter().copied().collect::<HashSet<u32>>();
        if let Ok(transfer_results) = self.transfer_subscriptions(&subscription_ids, true).await {
            session_debug!(self, "transfer_results = {:?}", transfer_results);
            for (id, result) in subscription_ids.iter().zip(transfer_results.iter()) {
                if result.status_code.is_good() {
                    ids_to_recreate.remove(id);
                }
            }
        }

        if !ids_to_recreate.is_empty() {
            session_warn!(self, "Some or all of the existing subscriptions could not be transferred and must be created manually");
        }

        for subscription_id in ids_to_recreate {
            self.recreate_subscription_from_scratch(subscription_id)
                .await;
        }
    }

    /// Recreates one previously-transferred subscription and its monitored items from the
    /// client-side record kept in `subscription_state`, in chunks of
    /// `recreate_monitored_items_chunk` items at a time.
    async fn recreate_subscription_from_scratch(&self, old_subscription_id: u32) {
        session_debug!(self, "Recreating subscription {}", old_subscription_id);

        let deleted_subscription = {
            let mut subscription_state = trace_lock!(self.subscription_state);
            subscription_state.delete_subscription(old_subscription_id)
        };

        let Some(subscription) = deleted_subscription else {
            session_warn!(
                self,
                "Subscription removed from session while transfer in progress"
            );
            return;
        };

        let Ok(new_subscription_id) = self
            .create_subscription_inner(
                subscription.publishing_interval,
                subscription.lifetime_count,
                subscription.max_keep_alive_count,
                subscription.max_notifications_per_publish,
                subscription.publishing_enabled,
                subscription.priority,
                subscription.callback,
            )
            .await
        else {
            session_warn!(
                self,
                "Could not create a subscription from the existing subscription {}",
                old_subscription_id
            );
            return;
        };

        let items_to_create = subscription
            .monitored_items
            .values()
            .map(|item| MonitoredItemCreateRequest {
                item_to_monitor: item.item_to_monitor().clone(),
                monitoring_mode: item.monitoring_mode,
                requested_parameters: MonitoringParameters {
                    client_handle: item.client_handle(),
                    sampling_interval: item.sampling_interval(),
                    filter: item.filter.clone(),
                    queue_size: item.queue_size() as u32,
                    discard_oldest: item.discard_oldest(),
                },
            })
            .collect::<Vec<MonitoredItemCreateRequest>>();

        let mut remaining = items_to_create.into_iter();
        loop {
            let chunk = (&mut remaining)
                .take(self.recreate_monitored_items_chunk)
                .collect::<Vec<_>>();
            if chunk.is_empty() {
                break;
            }
            let _ = self
                .create_monitored_items(new_subscription_id, TimestampsToReturn::Both, chunk)
                .await;
        }

        for item in subscription.monitored_items.values() {
            let triggered_items = item.triggered_items();
            if !triggered_items.is_empty() {
                let links_to_add = triggered_items.iter().copied().collect::<Vec<u32>>();
                let _ = self
                    .set_triggering(new_subscription_id, item.id(), &links_to_add, &[])
                    .await;
            }
        }
    }
}
