// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DateTime`.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use chrono::{TimeZone, Utc};

use crate::{
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    read_i64, write_i64, UaNullable,
};

/// Alias for the chrono type used to convert to and from [`DateTime`].
pub type DateTimeUtc = chrono::DateTime<Utc>;

/// Number of 100ns ticks between the OPC-UA epoch (1601-01-01) and the Unix epoch (1970-01-01).
const OFFSET_TICKS: i64 = 116_444_736_000_000_000;

/// The number of ticks (100ns units) in a second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Values that exceed this are considered to represent "end of time", OPC-UA Part 6 5.2.2.5.
const ENDTIMES_TICKS: i64 = i64::MAX;

/// A date/time value, encoded on the wire as the number of 100 nanosecond intervals since
/// January 1, 1601 (UTC).
#[derive(Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct DateTime {
    ticks: i64,
}

impl Default for DateTime {
    fn default() -> Self {
        DateTime { ticks: 0 }
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_chrono().to_rfc3339())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_chrono().to_rfc3339())
    }
}

impl UaNullable for DateTime {
    fn is_ua_null(&self) -> bool {
        self.ticks == 0
    }
}

impl BinaryEncodable for DateTime {
    fn byte_len(&self, _ctx: &crate::Context<'_>) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        _ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        write_i64(stream, self.ticks)
    }
}

impl BinaryDecodable for DateTime {
    fn decode<S: Read + ?Sized>(stream: &mut S, _ctx: &crate::Context<'_>) -> EncodingResult<Self> {
        let ticks = read_i64(stream)?;
        Ok(DateTime { ticks })
    }
}

impl From<DateTimeUtc> for DateTime {
    fn from(value: DateTimeUtc) -> Self {
        let unix_ticks = value.timestamp() * TICKS_PER_SECOND
            + (value.timestamp_subsec_nanos() / 100) as i64;
        DateTime::from_ticks(unix_ticks.saturating_add(OFFSET_TICKS))
    }
}

impl FromStr for DateTime {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DateTimeUtc::parse_from_rfc3339(s)?.with_timezone(&Utc).into())
    }
}

impl DateTime {
    /// Construct a `DateTime` from raw 100ns ticks since the OPC-UA epoch, clamping to the
    /// valid range as required by Part 6 5.2.2.5.
    pub fn from_ticks(ticks: i64) -> Self {
        DateTime {
            ticks: ticks.max(0),
        }
    }

    /// The current time.
    pub fn now() -> DateTime {
        Utc::now().into()
    }

    /// Returns the raw number of 100ns ticks since the OPC-UA epoch.
    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Returns true if this datetime is at or beyond the "end of time" sentinel value.
    pub fn is_endtimes(&self) -> bool {
        self.ticks >= ENDTIMES_TICKS
    }

    /// Convert to a chrono UTC datetime. Values before the Unix epoch or beyond what chrono can
    /// represent saturate to `DateTime::<Utc>::MIN_UTC` / `MAX_UTC`.
    pub fn as_chrono(&self) -> DateTimeUtc {
        let unix_ticks = self.ticks - OFFSET_TICKS;
        let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
        let subsec_ticks = unix_ticks.rem_euclid(TICKS_PER_SECOND);
        Utc.timestamp_opt(secs, (subsec_ticks * 100) as u32)
            .single()
            .unwrap_or(DateTimeUtc::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_datetime_round_trips() {
        let dt = DateTime::default();
        assert!(dt.is_ua_null());
    }

    #[test]
    fn ticks_round_trip_through_chrono() {
        let dt = DateTime::now();
        let chrono_dt = dt.as_chrono();
        let back: DateTime = chrono_dt.into();
        // Sub-100ns precision is lost twice, but ticks should match exactly.
        assert_eq!(dt.ticks(), back.ticks());
    }
}
