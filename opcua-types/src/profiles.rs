// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Well-known user token policy identifiers.

/// Policy id used for the anonymous user token policy.
pub const SECURITY_USER_TOKEN_POLICY_ANONYMOUS: &str = "anonymous";

/// Policy id used for the username/password user token policy.
pub const SECURITY_USER_TOKEN_POLICY_USERPASS: &str = "userpass";

/// Policy id used for the X.509 certificate user token policy.
pub const SECURITY_USER_TOKEN_POLICY_X509: &str = "x509";
