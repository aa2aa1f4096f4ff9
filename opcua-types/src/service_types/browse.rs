// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The Browse and TranslateBrowsePathsToNodeIds services (Part 4, 5.8): walking references
//! in the address space.

use crate::{ByteString, DateTime, LocalizedText, NodeId, QualifiedName, StatusCode};

use super::enums::{BrowseDirection, NodeClass};
use super::macros::{message_type, struct_type};
use crate::RequestHeader;
use crate::ResponseHeader;

struct_type! {
    /// Restricts a browse to a particular view of the address space. A null `view_id`
    /// selects the entire address space.
    pub struct ViewDescription {
        /// Node ID of the view to browse, or null for the entire address space.
        pub view_id: NodeId,
        /// Browse the state of the view at this time, or null for the current state.
        pub timestamp: DateTime,
        /// Browse a specific version of the view, or 0 for the current version.
        pub view_version: u32,
    }
}

struct_type! {
    /// Describes what references to return from a single starting node.
    pub struct BrowseDescription {
        /// Node to browse from.
        pub node_id: NodeId,
        /// Which direction of references to follow.
        pub browse_direction: BrowseDirection,
        /// Only follow references of this type, and its subtypes. Null means any reference type.
        pub reference_type_id: NodeId,
        /// Whether to also follow subtypes of `reference_type_id`.
        pub include_subtypes: bool,
        /// Bitmask of `NodeClass` values the target node must match. 0 means any class.
        pub node_class_mask: u32,
        /// Bitmask of `BrowseResultMask` fields to populate on each result.
        pub result_mask: u32,
    }
}

struct_type! {
    /// One reference found while browsing.
    pub struct ReferenceDescription {
        /// Type of the reference.
        pub reference_type_id: NodeId,
        /// True if `node_id` is the target, false if it is the source, of the reference.
        pub is_forward: bool,
        /// The node at the other end of the reference.
        pub node_id: crate::ExpandedNodeId,
        /// Browse name of the target node.
        pub browse_name: QualifiedName,
        /// Display name of the target node.
        pub display_name: LocalizedText,
        /// Node class of the target node, if requested.
        pub node_class: NodeClass,
        /// Type definition of the target node, if it is an object or variable.
        pub type_definition: crate::ExpandedNodeId,
    }
}

struct_type! {
    /// Result of browsing from a single starting node.
    pub struct BrowseResult {
        /// `Good` unless browsing failed outright.
        pub status_code: StatusCode,
        /// Opaque token used to fetch further results with `BrowseNext`, if the server
        /// could not return every reference in one response.
        pub continuation_point: ByteString,
        /// References found from the starting node.
        pub references: Option<Vec<ReferenceDescription>>,
    }
}

message_type! {
    /// Returns references from one or more starting nodes.
    pub struct BrowseRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// Restricts the browse to a particular view, or the whole address space.
        pub view: ViewDescription,
        /// Maximum number of references to return per node, or 0 for no limit.
        pub requested_max_references_per_node: u32,
        /// The nodes to browse from.
        pub nodes_to_browse: Option<Vec<BrowseDescription>>,
    }
    encoding_id: BrowseRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `BrowseRequest`.
    pub struct BrowseResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `nodes_to_browse`, in the same order.
        pub results: Option<Vec<BrowseResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<crate::DiagnosticInfo>>,
    }
    encoding_id: BrowseResponse_Encoding_DefaultBinary
}

message_type! {
    /// Continues a browse that could not return all references in one response.
    pub struct BrowseNextRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// If true, releases the continuation points instead of continuing the browse.
        pub release_continuation_points: bool,
        /// Continuation points previously returned by `Browse` or `BrowseNext`.
        pub continuation_points: Option<Vec<ByteString>>,
    }
    encoding_id: BrowseNextRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `BrowseNextRequest`.
    pub struct BrowseNextResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `continuation_points`, in the same order.
        pub results: Option<Vec<BrowseResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<crate::DiagnosticInfo>>,
    }
    encoding_id: BrowseNextResponse_Encoding_DefaultBinary
}

struct_type! {
    /// One hop of a browse path: follow a reference type to a node with a given browse name.
    pub struct RelativePathElement {
        /// Reference type to follow. Null means any reference type.
        pub reference_type_id: NodeId,
        /// Whether to also follow subtypes of `reference_type_id`.
        pub include_subtypes: bool,
        /// If false, the reference is followed in the inverse direction.
        pub is_inverse: bool,
        /// Browse name the target node must have.
        pub target_name: QualifiedName,
    }
}

struct_type! {
    /// A sequence of browse path elements describing a path through the address space.
    pub struct RelativePath {
        /// The hops making up the path.
        pub elements: Option<Vec<RelativePathElement>>,
    }
}

struct_type! {
    /// A starting node and a relative path to resolve from it.
    pub struct BrowsePath {
        /// Node the path starts from.
        pub starting_node: NodeId,
        /// Path to follow from `starting_node`.
        pub relative_path: RelativePath,
    }
}

struct_type! {
    /// One node reached by following a `BrowsePath`.
    pub struct BrowsePathTarget {
        /// The node reached.
        pub target_id: crate::ExpandedNodeId,
        /// Number of unresolved elements remaining if the path left the server's address space,
        /// or `u32::MAX` if the path was fully resolved.
        pub remaining_path_index: u32,
    }
}

struct_type! {
    /// Result of resolving a single `BrowsePath`.
    pub struct BrowsePathResult {
        /// `Good` unless the path failed to resolve.
        pub status_code: StatusCode,
        /// Nodes reached by the path. More than one if the path was ambiguous.
        pub targets: Option<Vec<BrowsePathTarget>>,
    }
}

message_type! {
    /// Resolves one or more browse paths to node IDs.
    pub struct TranslateBrowsePathsToNodeIdsRequest {
        /// Common request parameters.
        pub request_header: RequestHeader,
        /// The browse paths to resolve.
        pub browse_paths: Option<Vec<BrowsePath>>,
    }
    encoding_id: TranslateBrowsePathsToNodeIdsRequest_Encoding_DefaultBinary
}

message_type! {
    /// Response to a `TranslateBrowsePathsToNodeIdsRequest`.
    pub struct TranslateBrowsePathsToNodeIdsResponse {
        /// Common response parameters.
        pub response_header: ResponseHeader,
        /// One result per entry of `browse_paths`, in the same order.
        pub results: Option<Vec<BrowsePathResult>>,
        /// Diagnostics, only populated if requested.
        pub diagnostic_infos: Option<Vec<crate::DiagnosticInfo>>,
    }
    encoding_id: TranslateBrowsePathsToNodeIdsResponse_Encoding_DefaultBinary
}
