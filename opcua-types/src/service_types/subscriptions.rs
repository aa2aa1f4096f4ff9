// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Subscriptions, monitored items, and the Publish/Republish exchange (Part 4, 5.12-5.14).
//!
//! Event monitoring is out of scope: `MonitoringParameters::filter` only ever carries a
//! `DataChangeFilter`, never an `EventFilter`. `EventNotificationList` is still modeled
//! because a `NotificationData` that happens to carry one must still decode cleanly.

use crate::{DateTime, DiagnosticInfo, ExtensionObject, StatusCode, Variant};

use super::attribute_service::ReadValueId;
use super::enums::{DataChangeTrigger, MonitoringMode, TimestampsToReturn};
use super::macros::{message_type, struct_type};
use crate::RequestHeader;
use crate::ResponseHeader;

struct_type! {
    /// Selects, and filters, what a monitored item reports.
    pub struct DataChangeFilter {
        /// What counts as a change worth reporting.
        pub trigger: DataChangeTrigger,
        /// Deadband algorithm, from the `DeadbandType` enum.
        pub deadband_type: u32,
        /// Deadband threshold; meaning depends on `deadband_type`.
        pub deadband_value: f64,
    }
}

impl crate::MessageInfo for DataChangeFilter {
    fn type_id(&self) -> crate::ObjectId {
        crate::ObjectId::DataChangeFilter_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> crate::DataTypeId {
        crate::DataTypeId::BaseDataType
    }
}

struct_type! {
    /// Requested behavior of a single monitored item.
    pub struct MonitoringParameters {
        /// Echoed back on every notification for this item, to let the client match it up
        /// without needing to track server-assigned monitored item IDs.
        pub client_handle: u32,
        /// Requested sampling interval in milliseconds; 0 samples as fast as possible,
        /// -1 uses the subscription's publishing interval.
        pub sampling_interval: f64,
        /// A `DataChangeFilter`, wrapped in an `ExtensionObject`. Null uses the server default.
        pub filter: ExtensionObject,
        /// Number of notifications to queue before the oldest/newest is discarded.
        pub queue_size: u32,
        /// If true, discard the oldest queued notification when the queue is full; otherwise
        /// discard the newest.
        pub discard_oldest: bool,
    }
}

struct_type! {
    /// A single item to begin monitoring.
    pub struct MonitoredItemCreateRequest {
        /// Node attribute to monitor.
        pub item_to_monitor: ReadValueId,
        /// Whether to suppress, queue, or report notifications.
        pub monitoring_mode: MonitoringMode,
        /// Requested sampling and queueing behavior.
        pub requested_parameters: MonitoringParameters,
    }
}

struct_type! {
    /// Result of creating a single monitored item.
    pub struct MonitoredItemCreateResult {
        /// `Good` unless monitoring could not be started.
        pub status_code: StatusCode,
        /// Server-assigned ID for this monitored item, used to modify or delete it later.
        pub monitored_item_id: u32,
        /// Sampling interval actually applied.
        pub revised_sampling_interval: f64,
        /// Queue size actually applied.
        pub revised_queue_size: u32,
        /// Result of validating `requested_parameters.filter`, if one was given.
        pub filter_result: ExtensionObject,
    }
}

message_type! {
    /// Begins monitoring one or more node attributes under a subscription.
    pub struct CreateMonitoredItemsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscription the items are added to.
        pub subscription_id: u32,
        /// Which timestamps to include on each notification.
        pub timestamps_to_return: TimestampsToReturn,
        /// The items to monitor.
        pub items_to_create: Option<Vec<MonitoredItemCreateRequest>>,
    }
    encoding_id: CreateMonitoredItemsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CreateMonitoredItemsRequest`.
    pub struct CreateMonitoredItemsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `items_to_create`, in the same order.
        pub results: Option<Vec<MonitoredItemCreateResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: CreateMonitoredItemsResponse_Encoding_DefaultBinary
}

struct_type! {
    /// Requested change to an existing monitored item.
    pub struct MonitoredItemModifyRequest {
        /// Server-assigned ID returned by `CreateMonitoredItemsResponse`.
        pub monitored_item_id: u32,
        /// New sampling and queueing behavior.
        pub requested_parameters: MonitoringParameters,
    }
}

struct_type! {
    /// Result of modifying a single monitored item.
    pub struct MonitoredItemModifyResult {
        /// `Good` unless the modification failed.
        pub status_code: StatusCode,
        /// Sampling interval actually applied.
        pub revised_sampling_interval: f64,
        /// Queue size actually applied.
        pub revised_queue_size: u32,
        /// Result of validating the new filter, if one was given.
        pub filter_result: ExtensionObject,
    }
}

message_type! {
    /// Changes the sampling interval, queue size, or filter of existing monitored items.
    pub struct ModifyMonitoredItemsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscription the items belong to.
        pub subscription_id: u32,
        /// Which timestamps to include on each notification.
        pub timestamps_to_return: TimestampsToReturn,
        /// The changes to apply.
        pub items_to_modify: Option<Vec<MonitoredItemModifyRequest>>,
    }
    encoding_id: ModifyMonitoredItemsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `ModifyMonitoredItemsRequest`.
    pub struct ModifyMonitoredItemsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `items_to_modify`, in the same order.
        pub results: Option<Vec<MonitoredItemModifyResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: ModifyMonitoredItemsResponse_Encoding_DefaultBinary
}

message_type! {
    /// Switches monitored items between disabled, sampling, and reporting.
    pub struct SetMonitoringModeRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscription the items belong to.
        pub subscription_id: u32,
        /// Mode to apply to every listed item.
        pub monitoring_mode: MonitoringMode,
        /// Items to update.
        pub monitored_item_ids: Option<Vec<u32>>,
    }
    encoding_id: SetMonitoringModeRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `SetMonitoringModeRequest`.
    pub struct SetMonitoringModeResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `monitored_item_ids`, in the same order.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: SetMonitoringModeResponse_Encoding_DefaultBinary
}

message_type! {
    /// Stops monitoring one or more items.
    pub struct DeleteMonitoredItemsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscription the items belong to.
        pub subscription_id: u32,
        /// Items to stop monitoring.
        pub monitored_item_ids: Option<Vec<u32>>,
    }
    encoding_id: DeleteMonitoredItemsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `DeleteMonitoredItemsRequest`.
    pub struct DeleteMonitoredItemsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `monitored_item_ids`, in the same order.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: DeleteMonitoredItemsResponse_Encoding_DefaultBinary
}

message_type! {
    /// Creates a subscription, the container that groups monitored items and carries their
    /// notifications to the client over `Publish`.
    pub struct CreateSubscriptionRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Requested interval between publishes, in milliseconds.
        pub requested_publishing_interval: f64,
        /// Number of missed publishing cycles before the subscription expires.
        pub requested_lifetime_count: u32,
        /// Number of publishing cycles with nothing to report before a keep-alive is sent.
        pub requested_max_keep_alive_count: u32,
        /// Maximum notifications in a single publish; 0 for no limit.
        pub max_notifications_per_publish: u32,
        /// Whether the subscription starts publishing immediately.
        pub publishing_enabled: bool,
        /// Relative priority used to order competing publishes; 0 is lowest.
        pub priority: u8,
    }
    encoding_id: CreateSubscriptionRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CreateSubscriptionRequest`.
    pub struct CreateSubscriptionResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Server-assigned ID for the new subscription.
        pub subscription_id: u32,
        /// Publishing interval actually applied.
        pub revised_publishing_interval: f64,
        /// Lifetime count actually applied.
        pub revised_lifetime_count: u32,
        /// Keep-alive count actually applied.
        pub revised_max_keep_alive_count: u32,
    }
    encoding_id: CreateSubscriptionResponse_Encoding_DefaultBinary
}

message_type! {
    /// Changes the publishing interval, lifetime, or priority of an existing subscription.
    pub struct ModifySubscriptionRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscription to modify.
        pub subscription_id: u32,
        /// Requested interval between publishes, in milliseconds.
        pub requested_publishing_interval: f64,
        /// Number of missed publishing cycles before the subscription expires.
        pub requested_lifetime_count: u32,
        /// Number of publishing cycles with nothing to report before a keep-alive is sent.
        pub requested_max_keep_alive_count: u32,
        /// Maximum notifications in a single publish; 0 for no limit.
        pub max_notifications_per_publish: u32,
        /// Relative priority used to order competing publishes; 0 is lowest.
        pub priority: u8,
    }
    encoding_id: ModifySubscriptionRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `ModifySubscriptionRequest`.
    pub struct ModifySubscriptionResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Publishing interval actually applied.
        pub revised_publishing_interval: f64,
        /// Lifetime count actually applied.
        pub revised_lifetime_count: u32,
        /// Keep-alive count actually applied.
        pub revised_max_keep_alive_count: u32,
    }
    encoding_id: ModifySubscriptionResponse_Encoding_DefaultBinary
}

message_type! {
    /// Starts or stops publishing for one or more subscriptions.
    pub struct SetPublishingModeRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Whether to enable or disable publishing.
        pub publishing_enabled: bool,
        /// Subscriptions to update.
        pub subscription_ids: Option<Vec<u32>>,
    }
    encoding_id: SetPublishingModeRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `SetPublishingModeRequest`.
    pub struct SetPublishingModeResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `subscription_ids`, in the same order.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: SetPublishingModeResponse_Encoding_DefaultBinary
}

message_type! {
    /// Deletes one or more subscriptions, along with their monitored items.
    pub struct DeleteSubscriptionsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscriptions to delete.
        pub subscription_ids: Option<Vec<u32>>,
    }
    encoding_id: DeleteSubscriptionsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `DeleteSubscriptionsRequest`.
    pub struct DeleteSubscriptionsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `subscription_ids`, in the same order.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: DeleteSubscriptionsResponse_Encoding_DefaultBinary
}

struct_type! {
    /// Result of transferring a single subscription to a new session.
    pub struct TransferResult {
        /// `Good` unless the transfer failed.
        pub status_code: StatusCode,
        /// Sequence numbers of notifications still available for `Republish` on the
        /// transferred subscription.
        pub available_sequence_numbers: Option<Vec<u32>>,
    }
}

message_type! {
    /// Moves subscriptions created on one session onto the session sending this request,
    /// used to survive a client reconnect without losing server-side subscription state.
    pub struct TransferSubscriptionsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscriptions to transfer.
        pub subscription_ids: Option<Vec<u32>>,
        /// If true, the server immediately reports the current value of every monitored item.
        pub send_initial_values: bool,
    }
    encoding_id: TransferSubscriptionsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `TransferSubscriptionsRequest`.
    pub struct TransferSubscriptionsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `subscription_ids`, in the same order.
        pub results: Option<Vec<TransferResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: TransferSubscriptionsResponse_Encoding_DefaultBinary
}

struct_type! {
    /// Acknowledges receipt of a notification message, letting the server release it.
    pub struct SubscriptionAcknowledgement {
        /// Subscription the acknowledged notification belongs to.
        pub subscription_id: u32,
        /// Sequence number being acknowledged.
        pub sequence_number: u32,
    }
}

message_type! {
    /// Requests the server's next batch of notifications across all of the session's
    /// subscriptions, and acknowledges previously received ones.
    pub struct PublishRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Notifications from previous publishes being acknowledged.
        pub subscription_acknowledgements: Option<Vec<SubscriptionAcknowledgement>>,
    }
    encoding_id: PublishRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `PublishRequest`, carrying notifications for a single subscription.
    pub struct PublishResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// Subscription this batch of notifications belongs to.
        pub subscription_id: u32,
        /// Sequence numbers still held by the server for `Republish`, including this message's.
        pub available_sequence_numbers: Option<Vec<u32>>,
        /// True if the server has more notifications ready to send immediately.
        pub more_notifications: bool,
        /// The notifications themselves.
        pub notification_message: NotificationMessage,
        /// One result per entry of `subscription_acknowledgements`, in the same order.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics for the acknowledgements, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: PublishResponse_Encoding_DefaultBinary
}

message_type! {
    /// Re-requests a notification message the client failed to process the first time.
    pub struct RepublishRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Subscription the message belongs to.
        pub subscription_id: u32,
        /// Sequence number of the message to resend.
        pub retransmit_sequence_number: u32,
    }
    encoding_id: RepublishRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `RepublishRequest`.
    pub struct RepublishResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// The resent notification message.
        pub notification_message: NotificationMessage,
    }
    encoding_id: RepublishResponse_Encoding_DefaultBinary
}

struct_type! {
    /// One batch of notifications delivered by `Publish` or `Republish`.
    pub struct NotificationMessage {
        /// Monotonically increasing per-subscription sequence number.
        pub sequence_number: u32,
        /// When the server generated this message.
        pub publish_time: DateTime,
        /// The notifications, each a `DataChangeNotification`, `EventNotificationList`, or
        /// `StatusChangeNotification` wrapped in an `ExtensionObject`.
        pub notification_data: Option<Vec<ExtensionObject>>,
    }
}

struct_type! {
    /// One monitored item's new value, as carried by a `DataChangeNotification`.
    pub struct MonitoredItemNotification {
        /// `client_handle` from the item's `MonitoringParameters`.
        pub client_handle: u32,
        /// The value, quality, and timestamps.
        pub value: crate::DataValue,
    }
}

message_type! {
    /// Notification that one or more monitored items' values have changed.
    pub struct DataChangeNotification {
        /// The changed items.
        pub monitored_items: Option<Vec<MonitoredItemNotification>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: DataChangeNotification_Encoding_DefaultBinary
}

struct_type! {
    /// One event occurrence's requested fields, as carried by an `EventNotificationList`.
    pub struct EventFieldList {
        /// `client_handle` from the item's `MonitoringParameters`.
        pub client_handle: u32,
        /// Values of the fields the item's event filter selected, in the order requested.
        pub event_fields: Option<Vec<Variant>>,
    }
}

message_type! {
    /// Notification that one or more event-monitored items produced new events.
    pub struct EventNotificationList {
        /// The events.
        pub events: Option<Vec<EventFieldList>>,
    }
    encoding_id: EventNotificationList_Encoding_DefaultBinary
}

message_type! {
    /// Notification that a subscription's status changed, most commonly that the server is
    /// about to delete it (`BadTimeout`) or has deleted it (`BadSubscriptionIdInvalid`).
    pub struct StatusChangeNotification {
        /// Reason for the status change.
        pub status: StatusCode,
        /// Diagnostics, only populated if requested.
        pub diagnostic_info: DiagnosticInfo,
    }
    encoding_id: StatusChangeNotification_Encoding_DefaultBinary
}
