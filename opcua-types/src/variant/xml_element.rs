// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2025 Einar Omang

use crate::{BinaryDecodable, BinaryEncodable, UAString, UaNullable};

/// XML element, represented as a string.
///
/// Note that this is deprecated, according to the OPC-UA standard,
/// it is kept in the library for backwards compatibility.
///
/// Constructors are not checked, so the contents are not guaranteed to
/// be valid XML, or really XML at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement(UAString);

impl XmlElement {
    /// Create a new null XmlElement.
    pub fn null() -> Self {
        Self(UAString::null())
    }
}

impl std::fmt::Display for XmlElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for XmlElement {
    fn from(value: String) -> Self {
        Self(UAString::from(value))
    }
}

impl From<&str> for XmlElement {
    fn from(value: &str) -> Self {
        Self(UAString::from(value))
    }
}

impl From<UAString> for XmlElement {
    fn from(value: UAString) -> Self {
        Self(value)
    }
}

impl BinaryEncodable for XmlElement {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.0.byte_len(ctx)
    }

    fn encode<S: std::io::Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> crate::EncodingResult<()> {
        self.0.encode(stream, ctx)
    }
}

impl BinaryDecodable for XmlElement {
    fn decode<S: std::io::Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> crate::EncodingResult<Self> {
        Ok(XmlElement(UAString::decode(stream, ctx)?))
    }
}

impl UaNullable for XmlElement {
    fn is_ua_null(&self) -> bool {
        self.0.is_null()
    }
}
