// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DataValue`.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    read_u16, read_u8, status_code::StatusCode, write_u16, write_u8, UaNullable, Variant,
};

use bitflags::bitflags;

bitflags! {
    /// Mask for fields present in DataValue.
    #[derive(Copy, Clone, Debug, PartialEq, Default)]
    struct DataValueEncodingMask: u8 {
        /// Value is present.
        const VALUE = 0x01;
        /// Status is present.
        const STATUS = 0x02;
        /// Source timestamp is present.
        const SOURCE_TIMESTAMP = 0x04;
        /// Server timestamp is present.
        const SERVER_TIMESTAMP = 0x08;
        /// Source picoseconds is present.
        const SOURCE_PICOSECONDS = 0x10;
        /// Server picoseconds is present.
        const SERVER_PICOSECONDS = 0x20;
    }
}

/// Carries a value together with its quality and the timestamps assigned by the source and
/// the server, as described by OPC-UA Part 6. Every field is optional; the wire encoding mask
/// records which fields are actually present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The attribute's value, if present.
    pub value: Option<Variant>,
    /// Status code of the attribute, if present. Assumed `Good` when absent.
    pub status: Option<StatusCode>,
    /// Timestamp assigned by the source, if present.
    pub source_timestamp: Option<DateTime>,
    /// Additional resolution beyond `source_timestamp`'s 100ns granularity, in picoseconds.
    pub source_picoseconds: Option<u16>,
    /// Timestamp assigned by the server, if present.
    pub server_timestamp: Option<DateTime>,
    /// Additional resolution beyond `server_timestamp`'s 100ns granularity, in picoseconds.
    pub server_picoseconds: Option<u16>,
}

impl UaNullable for DataValue {
    fn is_ua_null(&self) -> bool {
        self.value.is_none()
            && self.status.is_none()
            && self.source_timestamp.is_none()
            && self.server_timestamp.is_none()
    }
}

impl DataValue {
    /// Creates a `DataValue` from a value, with a `Good` status and no timestamps set.
    pub fn new_now<T>(value: T) -> Self
    where
        T: Into<Variant>,
    {
        let now = DateTime::now();
        DataValue {
            value: Some(value.into()),
            status: Some(StatusCode::Good),
            source_timestamp: Some(now),
            server_timestamp: Some(now),
            ..Default::default()
        }
    }

    /// Creates a `DataValue` from a value with no status or timestamps.
    pub fn value_only<T>(value: T) -> Self
    where
        T: Into<Variant>,
    {
        DataValue {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Creates a `DataValue` holding a bad status code and no value.
    pub fn from_status(status: StatusCode) -> Self {
        DataValue {
            status: Some(status),
            ..Default::default()
        }
    }

    fn encoding_mask(&self) -> DataValueEncodingMask {
        let mut mask = DataValueEncodingMask::empty();
        if self.value.is_some() {
            mask |= DataValueEncodingMask::VALUE;
        }
        if self.status.is_some() {
            mask |= DataValueEncodingMask::STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= DataValueEncodingMask::SOURCE_TIMESTAMP;
        }
        if self.server_timestamp.is_some() {
            mask |= DataValueEncodingMask::SERVER_TIMESTAMP;
        }
        if self.source_picoseconds.is_some() {
            mask |= DataValueEncodingMask::SOURCE_PICOSECONDS;
        }
        if self.server_picoseconds.is_some() {
            mask |= DataValueEncodingMask::SERVER_PICOSECONDS;
        }
        mask
    }
}

impl BinaryEncodable for DataValue {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size = 1;
        if let Some(ref value) = self.value {
            size += value.byte_len(ctx);
        }
        if self.status.is_some() {
            size += 4;
        }
        if self.source_timestamp.is_some() {
            size += 8;
        }
        if self.source_picoseconds.is_some() {
            size += 2;
        }
        if self.server_timestamp.is_some() {
            size += 8;
        }
        if self.server_picoseconds.is_some() {
            size += 2;
        }
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        let mask = self.encoding_mask();
        write_u8(stream, mask.bits())?;
        if let Some(ref value) = self.value {
            value.encode(stream, ctx)?;
        }
        if let Some(status) = self.status {
            status.encode(stream, ctx)?;
        }
        if let Some(source_timestamp) = self.source_timestamp {
            source_timestamp.encode(stream, ctx)?;
        }
        if let Some(source_picoseconds) = self.source_picoseconds {
            write_u16(stream, source_picoseconds)?;
        }
        if let Some(server_timestamp) = self.server_timestamp {
            server_timestamp.encode(stream, ctx)?;
        }
        if let Some(server_picoseconds) = self.server_picoseconds {
            write_u16(stream, server_picoseconds)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for DataValue {
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let mask = DataValueEncodingMask::from_bits_truncate(read_u8(stream)?);
        let value = if mask.contains(DataValueEncodingMask::VALUE) {
            Some(Variant::decode(stream, ctx)?)
        } else {
            None
        };
        let status = if mask.contains(DataValueEncodingMask::STATUS) {
            Some(StatusCode::decode(stream, ctx)?)
        } else {
            None
        };
        let source_timestamp = if mask.contains(DataValueEncodingMask::SOURCE_TIMESTAMP) {
            Some(DateTime::decode(stream, ctx)?)
        } else {
            None
        };
        let source_picoseconds = if mask.contains(DataValueEncodingMask::SOURCE_PICOSECONDS) {
            Some(read_u16(stream)?)
        } else {
            None
        };
        let server_timestamp = if mask.contains(DataValueEncodingMask::SERVER_TIMESTAMP) {
            Some(DateTime::decode(stream, ctx)?)
        } else {
            None
        };
        let server_picoseconds = if mask.contains(DataValueEncodingMask::SERVER_PICOSECONDS) {
            Some(read_u16(stream)?)
        } else {
            None
        };
        Ok(DataValue {
            value,
            status,
            source_timestamp,
            source_picoseconds,
            server_timestamp,
            server_picoseconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_data_value_has_no_fields_set() {
        let dv = DataValue::default();
        assert!(dv.is_ua_null());
    }

    #[test]
    fn value_only_sets_only_value() {
        let dv = DataValue::value_only(42i32);
        assert!(dv.value.is_some());
        assert!(dv.status.is_none());
        assert!(dv.source_timestamp.is_none());
    }
}
