// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The Call service (Part 4, 5.11): invoking methods on the server.

use crate::{DiagnosticInfo, NodeId, StatusCode, Variant};

use super::macros::{message_type, struct_type};
use crate::RequestHeader;
use crate::ResponseHeader;

struct_type! {
    /// Invokes a single method.
    pub struct CallMethodRequest {
        /// Object (or object type) the method is defined on.
        pub object_id: NodeId,
        /// Method to invoke.
        pub method_id: NodeId,
        /// Arguments to pass, in the order defined by the method's `InputArguments` property.
        pub input_arguments: Option<Vec<Variant>>,
    }
}

struct_type! {
    /// Result of invoking a single method.
    pub struct CallMethodResult {
        /// `Good` unless the call itself failed; individual argument errors use
        /// `input_argument_results`.
        pub status_code: StatusCode,
        /// One status per entry of the request's `input_arguments`, in the same order.
        pub input_argument_results: Option<Vec<StatusCode>>,
        /// Diagnostics for each input argument, only populated if requested.
        pub input_argument_diagnostic_infos: Option<Vec<DiagnosticInfo>>,
        /// Values returned by the method, in the order defined by its `OutputArguments` property.
        pub output_arguments: Option<Vec<Variant>>,
    }
}

message_type! {
    /// Invokes one or more methods.
    pub struct CallRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// The methods to invoke.
        pub methods_to_call: Option<Vec<CallMethodRequest>>,
    }
    encoding_id: CallRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `CallRequest`.
    pub struct CallResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `methods_to_call`, in the same order.
        pub results: Option<Vec<CallMethodResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
    encoding_id: CallResponse_Encoding_DefaultBinary
}
