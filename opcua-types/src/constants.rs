// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Well-known constant strings used throughout the OPC UA binary protocol.

/// Security policy URI signifying no security is applied.
pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

/// Security policy URI for Basic256Sha256.
pub const SECURITY_POLICY_BASIC256SHA256_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";

/// Security policy URI for Aes128Sha256RsaOaep.
pub const SECURITY_POLICY_AES128SHA256RSAOAEP_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep";

/// Security policy URI for Aes256Sha256RsaPss.
pub const SECURITY_POLICY_AES256SHA256RSAPSS_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss";

/// The default TCP port used by OPC UA servers.
pub const DEFAULT_OPC_UA_SERVER_PORT: u16 = 4840;

/// Default application uri used when none is configured.
pub const DEFAULT_APPLICATION_URI: &str = "urn:opcua-rs:client";
