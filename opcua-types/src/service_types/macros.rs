// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Declarative helpers for defining the plain structured DataTypes that make up the
//! request/response messages this crate knows how to send and receive.
//!
//! A hand-written, field-by-field `BinaryEncodable`/`BinaryDecodable` impl for every one of
//! these structs would be almost entirely boilerplate, so it's generated here instead of
//! repeated per type.

/// Defines a structured DataType: a plain struct with positional binary encode/decode,
/// `Default`, and a blanket `UaNullable` (these types have no meaningful null state of
/// their own, the way `RequestHeader` does not either).
macro_rules! struct_type {
    (
        $(#[$outer:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl crate::UaNullable for $name {}

        impl crate::encoding::BinaryEncodable for $name {
            fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
                let mut size = 0usize;
                $( size += self.$field.byte_len(ctx); )*
                size
            }

            fn encode<S: std::io::Write + ?Sized>(
                &self,
                stream: &mut S,
                ctx: &crate::Context<'_>,
            ) -> crate::encoding::EncodingResult<()> {
                $( self.$field.encode(stream, ctx)?; )*
                Ok(())
            }
        }

        impl crate::encoding::BinaryDecodable for $name {
            fn decode<S: std::io::Read + ?Sized>(
                stream: &mut S,
                ctx: &crate::Context<'_>,
            ) -> crate::encoding::EncodingResult<Self> {
                Ok(Self {
                    $( $field: crate::encoding::BinaryDecodable::decode(stream, ctx)?, )*
                })
            }
        }
    };
}

/// Like [`struct_type`], but also carries a `MessageInfo` impl so the struct can ride inside
/// an `ExtensionObject` (request/response bodies, and notification payloads).
macro_rules! message_type {
    (
        $(#[$outer:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty ),* $(,)?
        }
        encoding_id: $object_id:ident
    ) => {
        struct_type! {
            $(#[$outer])*
            pub struct $name {
                $( $(#[$fmeta])* pub $field : $ty, )*
            }
        }

        impl crate::MessageInfo for $name {
            fn type_id(&self) -> crate::ObjectId {
                crate::ObjectId::$object_id
            }

            fn data_type_id(&self) -> crate::DataTypeId {
                crate::DataTypeId::BaseDataType
            }
        }
    };
}

pub(crate) use message_type;
pub(crate) use struct_type;
