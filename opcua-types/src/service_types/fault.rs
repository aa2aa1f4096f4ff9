// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! `ServiceFault`, returned in place of a normal response when a service fails outright.

use super::macros::{message_type, struct_type};
use crate::ResponseHeader;

message_type! {
    /// Sent instead of a service's normal response when the request could not be processed
    /// at all; `response_header.service_result` carries the reason.
    pub struct ServiceFault {
        /// Common response parameters, including the failure's status code.
        pub response_header: ResponseHeader,
    }
    encoding_id: ServiceFault_Encoding_DefaultBinary
}

struct_type! {
    /// Running totals of successes and failures for one kind of service call, used in
    /// server diagnostics.
    pub struct ServiceCounterDataType {
        /// Total number of calls, successful or not.
        pub total_count: u32,
        /// Number of calls that failed.
        pub error_count: u32,
    }
}
