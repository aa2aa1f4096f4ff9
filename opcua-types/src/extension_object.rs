// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `ExtensionObject`.

use std::{
    any::{Any, TypeId},
    fmt,
    io::{Cursor, Read, Write},
};

use crate::{write_i32, write_u8, Error, ExpandedNodeId, MessageInfo, UaNullable};

use super::{
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    node_id::NodeId,
    ObjectId,
};

#[derive(Debug)]
/// Error returned when working with extension objects.
pub struct ExtensionObjectError;

impl fmt::Display for ExtensionObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionObjectError")
    }
}

impl std::error::Error for ExtensionObjectError {}

/// Trait for an OPC-UA struct that can be stored dynamically inside an [ExtensionObject]
/// and encoded back to binary without the caller needing to know its concrete type.
///
/// This is automatically implemented for anything that implements [BinaryEncodable],
/// [MessageInfo], [Send], [Sync], [Clone], [std::fmt::Debug] and [PartialEq].
pub trait DynEncodable: Any + Send + Sync + std::fmt::Debug {
    /// Encode the struct using OPC-UA binary encoding.
    fn encode_binary(
        &self,
        stream: &mut dyn std::io::Write,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()>;

    /// Get the binary byte length of this struct.
    fn byte_len_dyn(&self, ctx: &crate::Context<'_>) -> usize;

    /// Get the binary encoding node id of this struct.
    fn binary_type_id(&self) -> ObjectId;

    /// Method to cast this to a dyn Any box, required for downcasting.
    fn as_dyn_any(self: Box<Self>) -> Box<dyn Any + Send + Sync + 'static>;

    /// Method to cast this to a dyn Any trait object, required for downcasting by reference.
    fn as_dyn_any_ref(&self) -> &(dyn Any + Send + Sync);

    /// Clone this to a dyn box. Required in order to implement Clone for ExtensionObject.
    fn clone_box(&self) -> Box<dyn DynEncodable>;

    /// Compare this with dynamic object. Invokes the PartialEq implementation of self and other,
    /// if other has type `Self`.
    fn dyn_eq(&self, other: &dyn DynEncodable) -> bool;

    /// Get the type name of the type, by calling `std::any::type_name` on `Self`.
    fn type_name(&self) -> &'static str;
}

impl<T> DynEncodable for T
where
    T: BinaryEncodable + MessageInfo + Any + std::fmt::Debug + Send + Sync + Clone + PartialEq,
{
    fn encode_binary(&self, stream: &mut dyn std::io::Write, ctx: &crate::Context<'_>) -> EncodingResult<()> {
        BinaryEncodable::encode(self, stream, ctx)
    }

    fn byte_len_dyn(&self, ctx: &crate::Context<'_>) -> usize {
        BinaryEncodable::byte_len(self, ctx)
    }

    fn binary_type_id(&self) -> ObjectId {
        MessageInfo::type_id(self)
    }

    fn as_dyn_any(self: Box<Self>) -> Box<dyn Any + Send + Sync + 'static> {
        self
    }

    fn as_dyn_any_ref(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn clone_box(&self) -> Box<dyn DynEncodable> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn DynEncodable) -> bool {
        if let Some(o) = other.as_dyn_any_ref().downcast_ref::<Self>() {
            o == self
        } else {
            false
        }
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl PartialEq for dyn DynEncodable {
    fn eq(&self, other: &dyn DynEncodable) -> bool {
        self.dyn_eq(other)
    }
}

impl UaNullable for ExtensionObject {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

/// The body carried by an [ExtensionObject].
#[derive(Debug)]
enum Body {
    /// No body at all.
    None,
    /// A body of a type known to this crate, ready to be encoded without
    /// needing to know the concrete type again.
    Known(Box<dyn DynEncodable>),
    /// A body decoded off the wire whose node id did not match any type
    /// this crate understands. The raw bytes are kept so the extension
    /// object can be re-encoded byte-for-byte without loss.
    Unknown { node_id: NodeId, bytes: Vec<u8> },
}

impl Clone for Body {
    fn clone(&self) -> Self {
        match self {
            Body::None => Body::None,
            Body::Known(b) => Body::Known(b.clone_box()),
            Body::Unknown { node_id, bytes } => Body::Unknown {
                node_id: node_id.clone(),
                bytes: bytes.clone(),
            },
        }
    }
}

impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Body::None, Body::None) => true,
            (Body::Known(a), Body::Known(b)) => a.as_ref() == b.as_ref(),
            (
                Body::Unknown {
                    node_id: a_id,
                    bytes: a_bytes,
                },
                Body::Unknown {
                    node_id: b_id,
                    bytes: b_bytes,
                },
            ) => a_id == b_id && a_bytes == b_bytes,
            _ => false,
        }
    }
}

/// An extension object holds an OPC-UA structure whose concrete type is only known
/// at the point of use. Types known to this crate decode eagerly into a
/// [DynEncodable] trait object; anything else is kept as opaque bytes alongside
/// its node id so it can be forwarded or re-encoded without loss.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionObject {
    body: Body,
}

impl Default for ExtensionObject {
    fn default() -> Self {
        Self::null()
    }
}

impl BinaryEncodable for ExtensionObject {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        match &self.body {
            Body::None => NodeId::null().byte_len(ctx) + 1,
            Body::Known(b) => {
                let id = NodeId::from(b.binary_type_id());
                id.byte_len(ctx) + 5 + b.byte_len_dyn(ctx)
            }
            Body::Unknown { node_id, bytes } => node_id.byte_len(ctx) + 5 + bytes.len(),
        }
    }

    fn encode<S: Write + ?Sized>(
        &self,
        mut stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        match &self.body {
            Body::None => {
                NodeId::null().encode(stream, ctx)?;
                write_u8(stream, 0x0)
            }
            Body::Known(b) => {
                let id = NodeId::from(b.binary_type_id());
                id.encode(stream, ctx)?;
                write_u8(stream, 0x1)?;
                write_i32(stream, b.byte_len_dyn(ctx) as i32)?;
                b.encode_binary(&mut stream as &mut dyn Write, ctx)
            }
            Body::Unknown { node_id, bytes } => {
                node_id.encode(stream, ctx)?;
                write_u8(stream, 0x1)?;
                write_i32(stream, bytes.len() as i32)?;
                stream
                    .write_all(bytes)
                    .map_err(|e| Error::encoding(e.to_string()))
            }
        }
    }
}

impl BinaryDecodable for ExtensionObject {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        // Extension object is depth checked to prevent deep recursion.
        let _depth_lock = ctx.options().depth_lock()?;
        let node_id = NodeId::decode(stream, ctx)?;
        let encoding_type = u8::decode(stream, ctx)?;
        match encoding_type {
            0x0 => Ok(ExtensionObject::null()),
            0x1 => {
                let size = i32::decode(stream, ctx)?;
                if size <= 0 {
                    return Ok(ExtensionObject::null());
                }
                let mut bytes = vec![0u8; size as usize];
                stream
                    .read_exact(&mut bytes)
                    .map_err(|e| Error::decoding(e.to_string()))?;
                Ok(ExtensionObject {
                    body: Body::Unknown { node_id, bytes },
                })
            }
            other => Err(Error::decoding(format!(
                "Invalid extension object encoding type {other} in stream"
            ))),
        }
    }
}

impl ExtensionObject {
    /// Create an extension object from a structure known to this crate.
    pub fn from_message<T>(encodable: T) -> ExtensionObject
    where
        T: DynEncodable,
    {
        Self {
            body: Body::Known(Box::new(encodable)),
        }
    }

    /// Create an extension object from a structure known to this crate.
    pub fn new<T>(encodable: T) -> ExtensionObject
    where
        T: DynEncodable,
    {
        Self::from_message(encodable)
    }

    /// Creates a null extension object, i.e. one with no value or payload.
    pub fn null() -> ExtensionObject {
        ExtensionObject { body: Body::None }
    }

    /// Tests for an empty extension object.
    pub fn is_null(&self) -> bool {
        matches!(self.body, Body::None)
    }

    /// Get the object id of the thing this extension object contains, assuming the
    /// node id can be recognised from the known type set.
    pub fn object_id(&self) -> Result<ObjectId, ExtensionObjectError> {
        match &self.body {
            Body::Known(b) => Ok(b.binary_type_id()),
            Body::Unknown { node_id, .. } => node_id.as_object_id().map_err(|_| ExtensionObjectError),
            Body::None => Err(ExtensionObjectError),
        }
    }

    /// Consume the extension object and return the inner value downcast to `T`,
    /// if the inner type is a known type and is an instance of `T`.
    pub fn into_inner_as<T: Send + Sync + 'static>(self) -> Option<Box<T>> {
        match self.body {
            Body::Known(b) => b.as_dyn_any().downcast().ok(),
            _ => None,
        }
    }

    /// Return the inner value by reference downcast to `T`,
    /// if the inner type is a known type and is an instance of `T`.
    pub fn inner_as<T: Send + Sync + 'static>(&self) -> Option<&T> {
        match &self.body {
            Body::Known(b) => b.as_dyn_any_ref().downcast_ref(),
            _ => None,
        }
    }

    /// Decode the extension object's raw bytes into `T`, regardless of whether the
    /// node id was recognised when the extension object was decoded. Use this when
    /// the expected type is known from context (e.g. a response field that only
    /// ever carries one kind of extension object).
    pub fn decode_inner<T: BinaryDecodable>(&self, ctx: &crate::Context<'_>) -> EncodingResult<T> {
        match &self.body {
            Body::Unknown { bytes, .. } => {
                let mut cursor = Cursor::new(bytes.as_slice());
                T::decode(&mut cursor, ctx)
            }
            Body::Known(_) => Err(Error::decoding(
                "Cannot decode a known extension object body by node id; use inner_as instead",
            )),
            Body::None => Err(Error::decoding("Extension object is null")),
        }
    }

    /// Get the rust [std::any::TypeId] of the inner type, if it is a known type.
    pub fn type_id(&self) -> Option<TypeId> {
        match &self.body {
            Body::Known(b) => Some((**b).type_id()),
            _ => None,
        }
    }

    /// Return `true` if the inner value is a known type and an instance of `T`.
    pub fn inner_is<T: 'static>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    /// Get the name of the Rust type stored in the extension object, if known.
    pub fn type_name(&self) -> Option<&'static str> {
        match &self.body {
            Body::Known(b) => Some(b.type_name()),
            _ => None,
        }
    }

    /// Get the node id identifying the type of the inner body, if there is one.
    pub fn node_id(&self) -> Option<NodeId> {
        match &self.body {
            Body::Known(b) => Some(NodeId::from(b.binary_type_id())),
            Body::Unknown { node_id, .. } => Some(node_id.clone()),
            Body::None => None,
        }
    }

    /// Get the full data type ID of the inner type, if known.
    pub fn data_type(&self) -> Option<ExpandedNodeId> {
        self.node_id().map(ExpandedNodeId::from)
    }
}

/// Macro for consuming an extension object and taking different actions depending on the
/// inner type, like a match over types.
#[macro_export]
macro_rules! match_extension_object_owned {
    (_final { $($nom:tt)* }) => {
        $($nom)*
    };
    (_inner $obj:ident, { $($nom:tt)* }, _ => $t:expr $(,)?) => {
        match_extension_object_owned!(_final {
            $($nom)*
            else {
                $t
            }
        })
    };
    (_inner $obj:ident, { $($nom:tt)* }, $tok:ident: $typ:ty => $t:expr $(,)?) => {
        match_extension_object_owned!(_final {
            $($nom)*
            else if $obj.inner_is::<$typ>() {
                let $tok: $typ = *$obj.into_inner_as::<$typ>().unwrap();
                $t
            }
        })
    };
    (_inner $obj:ident, { $($nom:tt)* }, $tok:ident: $typ:ty => $t:expr, $($r:tt)*) => {
        match_extension_object_owned!(_inner $obj, {
            $($nom)*
            else if $obj.inner_is::<$typ>() {
                let $tok: $typ = *$obj.into_inner_as::<$typ>().unwrap();
                $t
            }
        }, $($r)*)
    };
    ($obj:ident, $tok:ident: $typ:ty => $t:expr, $($r:tt)*) => {
        match_extension_object_owned!(_inner $obj, {
            if $obj.inner_is::<$typ>() {
                let $tok: $typ = *$obj.into_inner_as::<$typ>().unwrap();
                $t
            }
        }, $($r)*)
    };
}

pub use match_extension_object_owned;

/// Macro for inspecting an extension object by reference and taking different actions depending
/// on the inner type, like a match over types.
#[macro_export]
macro_rules! match_extension_object {
    (_final { $($nom:tt)* }) => {
        $($nom)*
    };
    (_inner $obj:ident, { $($nom:tt)* }, _ => $t:expr $(,)?) => {
        match_extension_object!(_final {
            $($nom)*
            else {
                $t
            }
        })
    };
    (_inner $obj:ident, { $($nom:tt)* }, $tok:ident: $typ:ty => $t:expr $(,)?) => {
        match_extension_object!(_final {
            $($nom)*
            else if let Some($tok) = $obj.inner_as::<$typ>() {
                $t
            }
        })
    };
    (_inner $obj:ident, { $($nom:tt)* }, $tok:ident: $typ:ty => $t:expr, $($r:tt)*) => {
        match_extension_object!(_inner $obj, {
            $($nom)*
            else if let Some($tok) = $obj.inner_as::<$typ>() {
                $t
            }
        }, $($r)*)
    };
    ($obj:ident, $tok:ident: $typ:ty => $t:expr, $($r:tt)*) => {
        match_extension_object!(_inner $obj, {
            if let Some($tok) = $obj.inner_as::<$typ>() {
                $t
            }
        }, $($r)*)
    };
}

pub use match_extension_object;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, ContextOwned, DecodingOptions, NamespaceMap};

    fn ctx_owned() -> ContextOwned {
        ContextOwned::new_default(NamespaceMap::new(), DecodingOptions::default())
    }

    #[test]
    fn null_round_trips() {
        let owned = ctx_owned();
        let ctx = owned.context();
        let obj = ExtensionObject::null();
        let mut buf = Vec::new();
        obj.encode(&mut buf, &ctx).unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = ExtensionObject::decode(&mut cursor, &ctx).unwrap();
        assert!(decoded.is_null());
    }

    #[test]
    fn unknown_body_round_trips_opaque() {
        let owned = ctx_owned();
        let ctx = owned.context();
        let obj = ExtensionObject {
            body: Body::Unknown {
                node_id: NodeId::new(0, 9999u32),
                bytes: vec![1, 2, 3, 4],
            },
        };
        let mut buf = Vec::new();
        obj.encode(&mut buf, &ctx).unwrap();
        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = ExtensionObject::decode(&mut cursor, &ctx).unwrap();
        assert_eq!(decoded, obj);
    }
}
