// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Core binary encode/decode traits and primitive read/write helpers.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::{status_code::StatusCode, NamespaceMap};

/// Error produced by an encode or decode operation. Carries the `StatusCode`
/// that should be surfaced to the caller alongside a human-readable context.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status}: {message}")]
pub struct Error {
    /// The status code describing the failure.
    pub status: StatusCode,
    /// Human readable context for the failure.
    pub message: String,
}

impl Error {
    /// Build a new encoding/decoding error.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a generic `BadDecodingError`.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadDecodingError, message)
    }

    /// Shorthand for a generic `BadEncodingError`.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadEncodingError, message)
    }

    /// Annotate this error with the request id and/or request handle it occurred while
    /// processing, for easier correlation in logs.
    pub fn with_context(mut self, request_id: Option<u32>, request_handle: Option<u32>) -> Self {
        if let Some(request_id) = request_id {
            self.message = format!("{} (request id {})", self.message, request_id);
        }
        if let Some(request_handle) = request_handle {
            self.message = format!("{} (request handle {})", self.message, request_handle);
        }
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(StatusCode::BadEncodingError, e.to_string())
    }
}

impl From<Error> for StatusCode {
    fn from(e: Error) -> Self {
        e.status
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::new(status, status.to_string())
    }
}

/// Result of an encode or decode operation.
pub type EncodingResult<T> = Result<T, Error>;

/// Limits enforced while decoding, negotiated during the Hello/Acknowledge
/// handshake and otherwise defaulted conservatively.
#[derive(Debug, Clone)]
pub struct DecodingOptions {
    /// Maximum permitted length, in bytes, of a decoded string or byte string.
    pub max_string_length: usize,
    /// Maximum permitted element count of a decoded array.
    pub max_array_length: usize,
    /// Maximum permitted size, in bytes, of an encoded message body.
    pub max_message_size: usize,
    /// Maximum permitted chunk count for a single message.
    pub max_chunk_count: usize,
    /// Clock offset applied when interpreting the server's clock relative to ours.
    pub client_offset: chrono::Duration,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            max_string_length: 65536,
            max_array_length: 65536,
            max_message_size: 16 * 1024 * 1024,
            max_chunk_count: 4096,
            client_offset: chrono::Duration::zero(),
        }
    }
}

/// Recursion depth guard shared by a decode call tree. `Variant` and
/// `ExtensionObject` decoding recurse into each other; this bounds the
/// nesting so a malicious or corrupt stream cannot blow the stack.
#[derive(Debug, Clone)]
pub struct DepthGauge {
    current: Arc<std::sync::atomic::AtomicUsize>,
    max: usize,
}

impl Default for DepthGauge {
    fn default() -> Self {
        Self {
            current: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            max: 100,
        }
    }
}

impl DepthGauge {
    /// Enter one level of recursion, returning a guard that exits it on drop.
    pub fn enter(&self) -> EncodingResult<DepthLock> {
        let prev = self
            .current
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if prev >= self.max {
            self.current
                .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            return Err(Error::new(
                StatusCode::BadDecodingError,
                "Maximum recursion depth exceeded while decoding",
            ));
        }
        Ok(DepthLock {
            current: self.current.clone(),
        })
    }
}

/// RAII guard returned by [`DepthGauge::enter`].
pub struct DepthLock {
    current: Arc<std::sync::atomic::AtomicUsize>,
}

impl Drop for DepthLock {
    fn drop(&mut self) {
        self.current
            .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Decoding/encoding context threaded through every codec call that may
/// recurse into an `ExtensionObject` body: the active `DecodingOptions`, the
/// server's namespace table (needed to resolve `ExpandedNodeId`), and the
/// shared recursion gauge.
#[derive(Debug, Clone, Default)]
pub struct Context<'a> {
    options: DecodingOptions,
    namespaces: std::borrow::Cow<'a, NamespaceMap>,
    depth: DepthGauge,
}

impl<'a> Context<'a> {
    /// Build a new context from owned parts.
    pub fn new(options: DecodingOptions, namespaces: NamespaceMap) -> Self {
        Self {
            options,
            namespaces: std::borrow::Cow::Owned(namespaces),
            depth: DepthGauge::default(),
        }
    }

    /// Get the active decoding options.
    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// Get the active namespace table.
    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }

    /// Get the shared recursion gauge.
    pub fn depth_gauge(&self) -> &DepthGauge {
        &self.depth
    }
}

/// An owned `Context`, held by a secure channel for as long as it lives.
#[derive(Debug, Clone, Default)]
pub struct ContextOwned {
    options: DecodingOptions,
    namespaces: NamespaceMap,
}

impl ContextOwned {
    /// Create a context from an explicit namespace table and decoding options.
    pub fn new_default(namespaces: NamespaceMap, options: DecodingOptions) -> Self {
        Self { options, namespaces }
    }

    /// Borrow this as a [`Context`].
    pub fn context(&self) -> Context<'_> {
        Context {
            options: self.options.clone(),
            namespaces: std::borrow::Cow::Borrowed(&self.namespaces),
            depth: DepthGauge::default(),
        }
    }

    /// Get a mutable reference to the decoding options.
    pub fn options_mut(&mut self) -> &mut DecodingOptions {
        &mut self.options
    }

    /// Get the decoding options.
    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// Get a mutable reference to the namespace table.
    pub fn namespaces_mut(&mut self) -> &mut NamespaceMap {
        &mut self.namespaces
    }

    /// Get the namespace table.
    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }
}

/// Implemented by every OPC UA type that can be binary-encoded.
///
/// Types whose encoding never needs to inspect the [`Context`] (no nested
/// `ExtensionObject`/`Variant`) should implement [`SimpleBinaryEncodable`]
/// instead; a blanket impl bridges it into this trait.
pub trait BinaryEncodable {
    /// Compute the exact encoded length in bytes.
    fn byte_len(&self, ctx: &Context<'_>) -> usize;
    /// Write the binary encoding of `self` to `stream`.
    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()>;
}

/// Implemented by every OPC UA type that can be binary-decoded.
pub trait BinaryDecodable: Sized {
    /// Read the binary encoding of `Self` from `stream`.
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self>;
}

/// Implemented by types whose encoding does not depend on the decoding
/// context — primitives, strings, and plain structures with no
/// `ExtensionObject`/`Variant` fields.
pub trait SimpleBinaryEncodable {
    /// Compute the exact encoded length in bytes.
    fn byte_len(&self) -> usize;
    /// Write the binary encoding of `self` to `stream`.
    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()>;
}

/// Context-free counterpart to [`BinaryDecodable`].
pub trait SimpleBinaryDecodable: Sized {
    /// Read the binary encoding of `Self` from `stream`.
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self>;
}

impl<T: SimpleBinaryEncodable> BinaryEncodable for T {
    fn byte_len(&self, _ctx: &Context<'_>) -> usize {
        SimpleBinaryEncodable::byte_len(self)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, _ctx: &Context<'_>) -> EncodingResult<()> {
        SimpleBinaryEncodable::encode(self, stream)
    }
}

impl<T: SimpleBinaryDecodable> BinaryDecodable for T {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self> {
        SimpleBinaryDecodable::decode(stream, ctx.options())
    }
}

macro_rules! impl_primitive {
    ($t:ty, $len:expr, $write:ident, $read:ident) => {
        impl SimpleBinaryEncodable for $t {
            fn byte_len(&self) -> usize {
                $len
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
                $write(stream, *self)
            }
        }

        impl SimpleBinaryDecodable for $t {
            fn decode<S: Read + ?Sized>(
                stream: &mut S,
                _decoding_options: &DecodingOptions,
            ) -> EncodingResult<Self> {
                $read(stream)
            }
        }
    };
}

/// Marker error for a substring request outside the bounds of the source.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OutOfRange;

impl std::fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "index out of range")
    }
}

impl std::error::Error for OutOfRange {}

/// Implemented by types with a distinguished "null" value, used by array and
/// variant encoding to decide whether an element may be omitted.
pub trait UaNullable {
    /// `true` if this value is the null representation of its type.
    fn is_ua_null(&self) -> bool {
        false
    }
}

/// Map an I/O error from a decode operation into an [`Error`].
pub fn process_decode_io_result<T>(result: std::io::Result<T>) -> EncodingResult<T> {
    result.map_err(Error::from)
}

/// Map an I/O error from an encode operation into an [`Error`].
pub fn process_encode_io_result<T>(result: std::io::Result<T>) -> EncodingResult<T> {
    result.map_err(Error::from)
}

/// Write a single byte.
pub fn write_u8<S: Write + ?Sized>(stream: &mut S, value: u8) -> EncodingResult<()> {
    stream.write_all(&[value])?;
    Ok(())
}

/// Write `count` repetitions of `value`.
pub fn write_bytes<S: Write + ?Sized>(
    stream: &mut S,
    value: u8,
    count: usize,
) -> EncodingResult<usize> {
    let buf = vec![value; count];
    stream.write_all(&buf)?;
    Ok(count)
}

fn write_bool<S: Write + ?Sized>(stream: &mut S, value: bool) -> EncodingResult<()> {
    write_u8(stream, if value { 1 } else { 0 })
}
fn read_bool<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<bool> {
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf)?;
    Ok(buf[0] != 0)
}
fn read_u8<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<u8> {
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf)?;
    Ok(buf[0])
}
fn read_i8<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<i8> {
    Ok(read_u8(stream)? as i8)
}
fn write_i8<S: Write + ?Sized>(stream: &mut S, value: i8) -> EncodingResult<()> {
    write_u8(stream, value as u8)
}

macro_rules! impl_numeric {
    ($t:ty, $write:ident, $read:ident) => {
        /// Write a little-endian
        #[doc = concat!("`", stringify!($t), "`.")]
        pub fn $write<S: Write + ?Sized>(stream: &mut S, value: $t) -> EncodingResult<()> {
            stream.write_all(&value.to_le_bytes())?;
            Ok(())
        }
        /// Read a little-endian
        #[doc = concat!("`", stringify!($t), "`.")]
        pub fn $read<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<$t> {
            let mut buf = [0u8; std::mem::size_of::<$t>()];
            stream.read_exact(&mut buf)?;
            Ok(<$t>::from_le_bytes(buf))
        }
    };
}

impl_numeric!(u16, write_u16, read_u16);
impl_numeric!(i16, write_i16, read_i16);
impl_numeric!(u32, write_u32, read_u32);
impl_numeric!(i32, write_i32, read_i32);
impl_numeric!(u64, write_u64, read_u64);
impl_numeric!(i64, write_i64, read_i64);
impl_numeric!(f32, write_f32, read_f32);
impl_numeric!(f64, write_f64, read_f64);

impl_primitive!(bool, 1, write_bool, read_bool);
impl_primitive!(u8, 1, write_u8, read_u8);
impl_primitive!(i8, 1, write_i8, read_i8);
impl_primitive!(u16, 2, write_u16, read_u16);
impl_primitive!(i16, 2, write_i16, read_i16);
impl_primitive!(u32, 4, write_u32, read_u32);
impl_primitive!(i32, 4, write_i32, read_i32);
impl_primitive!(u64, 8, write_u64, read_u64);
impl_primitive!(i64, 8, write_i64, read_i64);
impl_primitive!(f32, 4, write_f32, read_f32);
impl_primitive!(f64, 8, write_f64, read_f64);

/// Write the `i32` length prefix used by strings, byte strings, and arrays.
/// `None` encodes as `-1`.
pub fn write_array_len<S: Write + ?Sized>(
    stream: &mut S,
    len: Option<usize>,
) -> EncodingResult<()> {
    match len {
        Some(len) => write_i32(stream, len as i32),
        None => write_i32(stream, -1),
    }
}

/// Read an `i32` length prefix, returning `None` for `-1` (null) and
/// rejecting other negative values and lengths over `max`.
pub fn read_array_len<S: Read + ?Sized>(
    stream: &mut S,
    max: usize,
) -> EncodingResult<Option<usize>> {
    let len = read_i32(stream)?;
    if len == -1 {
        Ok(None)
    } else if len < -1 {
        Err(Error::decoding(format!(
            "Negative array/string length {len}"
        )))
    } else if len as usize > max {
        Err(Error::new(
            StatusCode::BadEncodingLimitsExceeded,
            format!("Array/string length {len} exceeds limit {max}"),
        ))
    } else {
        Ok(Some(len as usize))
    }
}

impl<T: BinaryEncodable> BinaryEncodable for Option<Vec<T>> {
    fn byte_len(&self, ctx: &Context<'_>) -> usize {
        match self {
            Some(v) => 4 + v.iter().map(|x| x.byte_len(ctx)).sum::<usize>(),
            None => 4,
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()> {
        match self {
            Some(v) => {
                write_array_len(stream, Some(v.len()))?;
                for item in v {
                    item.encode(stream, ctx)?;
                }
                Ok(())
            }
            None => write_array_len(stream, None),
        }
    }
}

impl<T: BinaryDecodable> BinaryDecodable for Option<Vec<T>> {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self> {
        let Some(len) = read_array_len(stream, ctx.options().max_array_length)? else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(T::decode(stream, ctx)?);
        }
        Ok(Some(out))
    }
}

