// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! User identity tokens carried by `ActivateSessionRequest`, and the policies a server
//! advertises for them in an `EndpointDescription`.

use crate::{ByteString, UAString};

use super::enums::UserTokenType;
use super::macros::{message_type, struct_type};

message_type! {
    /// Anonymous identity, no credentials attached.
    pub struct AnonymousIdentityToken {
        /// Must match the `policy_id` of one of the endpoint's `UserTokenPolicy` entries.
        pub policy_id: UAString,
    }
    encoding_id: Anonymous_Encoding_DefaultBinary
}

message_type! {
    /// A username/password identity token.
    pub struct UserNameIdentityToken {
        /// Must match the `policy_id` of one of the endpoint's `UserTokenPolicy` entries.
        pub policy_id: UAString,
        /// The user name.
        pub user_name: UAString,
        /// The (possibly encrypted) password.
        pub password: ByteString,
        /// Non-empty when `password` is encrypted, naming the algorithm used.
        pub encryption_algorithm: UAString,
    }
    encoding_id: UserNameIdentityToken_Encoding_DefaultBinary
}

message_type! {
    /// An X.509 certificate identity token.
    pub struct X509IdentityToken {
        /// Must match the `policy_id` of one of the endpoint's `UserTokenPolicy` entries.
        pub policy_id: UAString,
        /// DER-encoded certificate identifying the user.
        pub certificate_data: ByteString,
    }
    encoding_id: X509IdentityToken_Encoding_DefaultBinary
}

struct_type! {
    /// A signature proving possession of the private key behind an identity token.
    pub struct SignatureData {
        /// URI of the algorithm used to compute `signature`.
        pub algorithm: UAString,
        /// The signature bytes.
        pub signature: ByteString,
    }
}

struct_type! {
    /// One identity mechanism a server endpoint accepts.
    pub struct UserTokenPolicy {
        /// Identifier that requests referencing this policy must echo back.
        pub policy_id: UAString,
        /// Kind of identity token this policy describes.
        pub token_type: UserTokenType,
        /// Only used by `IssuedToken` policies: the type of the issued token.
        pub issued_token_type: UAString,
        /// Only used by `IssuedToken` policies: the URI of the issuer.
        pub issuer_endpoint_url: UAString,
        /// Security policy to use to encrypt the token, or empty to use the channel's.
        pub security_policy_uri: UAString,
    }
}
