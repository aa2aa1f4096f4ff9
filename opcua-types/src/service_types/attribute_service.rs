// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The Read and Write services (Part 4, 5.10): reading and writing node attributes.

use crate::{DataValue, NodeId, QualifiedName, UAString};

use super::enums::TimestampsToReturn;
use super::macros::{message_type, struct_type};
use crate::RequestHeader;
use crate::ResponseHeader;

struct_type! {
    /// Identifies a single node attribute to read, optionally narrowed to a sub-range of an
    /// array or string value.
    pub struct ReadValueId {
        /// Node to read from.
        pub node_id: NodeId,
        /// Attribute to read, from the `AttributeId` enum.
        pub attribute_id: u32,
        /// Sub-range of the value to read, in `IndexRange` grammar. Empty reads the whole value.
        pub index_range: UAString,
        /// Requests a specific data encoding of the value; usually left null.
        pub data_encoding: QualifiedName,
    }
}

message_type! {
    /// Reads one or more attributes of one or more nodes.
    pub struct ReadRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Maximum age in milliseconds of values the server may return from its cache.
        pub max_age: f64,
        /// Which timestamps to include with each returned value.
        pub timestamps_to_return: TimestampsToReturn,
        /// The attributes to read.
        pub nodes_to_read: Option<Vec<ReadValueId>>,
    }
    encoding_id: ReadRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `ReadRequest`.
    pub struct ReadResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `nodes_to_read`, in the same order.
        pub results: Option<Vec<DataValue>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<crate::DiagnosticInfo>>,
    }
    encoding_id: ReadResponse_Encoding_DefaultBinary
}

struct_type! {
    /// A single attribute value to write.
    pub struct WriteValue {
        /// Node to write to.
        pub node_id: NodeId,
        /// Attribute to write, from the `AttributeId` enum.
        pub attribute_id: u32,
        /// Sub-range of the value to write, in `IndexRange` grammar. Empty writes the whole value.
        pub index_range: UAString,
        /// The value to write. Only the `value` field is meaningful; timestamps are ignored.
        pub value: DataValue,
    }
}

message_type! {
    /// Writes one or more attributes of one or more nodes.
    pub struct WriteRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// The attributes to write.
        pub nodes_to_write: Option<Vec<WriteValue>>,
    }
    encoding_id: WriteRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `WriteRequest`.
    pub struct WriteResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One status code per entry of `nodes_to_write`, in the same order.
        pub results: Option<Vec<crate::StatusCode>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<crate::DiagnosticInfo>>,
    }
    encoding_id: WriteResponse_Encoding_DefaultBinary
}
