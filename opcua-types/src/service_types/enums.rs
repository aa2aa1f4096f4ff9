// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Simple enumerations used by the request/response messages, encoded on the wire as `i32`.

use std::io::{Read, Write};

use crate::{
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    write_i32, Error, UaEnum, UaNullable,
};

macro_rules! simple_enum {
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(#[$first_vmeta:meta])* $first_variant:ident = $first_value:expr,
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $(#[$first_vmeta])*
            #[default]
            $first_variant = $first_value,
            $( $(#[$vmeta])* $variant = $value, )*
        }

        impl UaEnum for $name {
            type Repr = i32;

            fn from_repr(repr: i32) -> Result<Self, Error> {
                match repr {
                    $first_value => Ok(Self::$first_variant),
                    $( $value => Ok(Self::$variant), )*
                    other => Err(Error::decoding(format!(
                        concat!(stringify!($name), " has no variant numbered {}"), other))),
                }
            }

            fn into_repr(self) -> i32 {
                self as i32
            }

            fn as_str(&self) -> &'static str {
                match self {
                    Self::$first_variant => stringify!($first_variant),
                    $( Self::$variant => stringify!($variant), )*
                }
            }

            fn from_str(val: &str) -> Result<Self, Error> {
                match val {
                    stringify!($first_variant) => Ok(Self::$first_variant),
                    $( stringify!($variant) => Ok(Self::$variant), )*
                    other => Err(Error::decoding(format!(
                        concat!(stringify!($name), " has no variant named {}"), other))),
                }
            }
        }

        impl UaNullable for $name {}

        impl BinaryEncodable for $name {
            fn byte_len(&self, _ctx: &crate::Context<'_>) -> usize {
                4
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S, _ctx: &crate::Context<'_>) -> EncodingResult<()> {
                write_i32(stream, self.into_repr())
            }
        }

        impl BinaryDecodable for $name {
            fn decode<S: Read + ?Sized>(stream: &mut S, _ctx: &crate::Context<'_>) -> EncodingResult<Self> {
                Self::from_repr(i32::decode(stream, _ctx)?)
            }
        }
    };
}

simple_enum! {
    /// Identifies the kind of application described by an `ApplicationDescription`.
    pub enum ApplicationType {
        /// A server.
        Server = 0,
        /// A client.
        Client = 1,
        /// Both client and server.
        ClientAndServer = 2,
        /// A discovery server.
        DiscoveryServer = 3,
    }
}

simple_enum! {
    /// Security level applied to the messages sent over a secure channel.
    pub enum MessageSecurityMode {
        /// Invalid, should never be sent on the wire.
        Invalid = 0,
        /// No security is applied.
        None = 1,
        /// Messages are signed but not encrypted.
        Sign = 2,
        /// Messages are signed and encrypted.
        SignAndEncrypt = 3,
    }
}

simple_enum! {
    /// Identifies the kind of user identity token carried by a `CreateSessionRequest`'s
    /// endpoint description or an `ActivateSessionRequest`'s identity token.
    pub enum UserTokenType {
        /// No token is required.
        Anonymous = 0,
        /// A username/password token.
        UserName = 1,
        /// An X.509 certificate token.
        Certificate = 2,
        /// An OAuth2/WS-SecureConversation issued token.
        IssuedToken = 3,
    }
}

simple_enum! {
    /// Whether an `OpenSecureChannelRequest` issues a new token or renews an existing one.
    pub enum SecurityTokenRequestType {
        /// Issue a new security token.
        Issue = 0,
        /// Renew an existing security token.
        Renew = 1,
    }
}

simple_enum! {
    /// Direction of references to follow in a `BrowseDescription`.
    pub enum BrowseDirection {
        /// Forward references only.
        Forward = 0,
        /// Inverse references only.
        Inverse = 1,
        /// Both directions.
        Both = 2,
        /// Invalid, should never be sent on the wire.
        Invalid = 3,
    }
}

simple_enum! {
    /// The class of a node in the address space.
    pub enum NodeClass {
        /// No node class specified; matches any class in a browse mask.
        Unspecified = 0,
        /// An Object node.
        Object = 1,
        /// A Variable node.
        Variable = 2,
        /// A Method node.
        Method = 4,
        /// An ObjectType node.
        ObjectType = 8,
        /// A VariableType node.
        VariableType = 16,
        /// A ReferenceType node.
        ReferenceType = 32,
        /// A DataType node.
        DataType = 64,
        /// A View node.
        View = 128,
    }
}

simple_enum! {
    /// Which timestamps the server should return alongside a value.
    pub enum TimestampsToReturn {
        /// Only the source timestamp.
        Source = 0,
        /// Only the server timestamp.
        Server = 1,
        /// Both timestamps.
        Both = 2,
        /// Neither timestamp.
        Neither = 3,
        /// Invalid, should never be sent on the wire.
        Invalid = 4,
    }
}

simple_enum! {
    /// Whether a monitored item reports only sampled values, or also notifies of every change.
    pub enum MonitoringMode {
        /// The item is sampled but notifications are suppressed.
        Disabled = 0,
        /// The item is sampled and queued, but not reported.
        Sampling = 1,
        /// The item is sampled, queued and reported.
        Reporting = 2,
    }
}

simple_enum! {
    /// What must change for a data change notification to be sent.
    pub enum DataChangeTrigger {
        /// Only the status changing triggers a notification.
        Status = 0,
        /// The status or the value changing triggers a notification.
        StatusValue = 1,
        /// The status, value, or either timestamp changing triggers a notification.
        StatusValueTimestamp = 2,
    }
}

simple_enum! {
    /// Algorithm used to suppress reports of small value changes on a monitored item.
    pub enum DeadbandType {
        /// No deadband filtering.
        None = 0,
        /// Absolute value deadband.
        Absolute = 1,
        /// Percent-of-EURange deadband.
        Percent = 2,
    }
}
