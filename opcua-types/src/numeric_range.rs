// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! [`NumericRange`], used to address a sub-range of an array or string value
//! through the `IndexRange` parameter of Read/Write/MonitoredItem requests.
//!
//! Grammar, from OPC UA Part 4 7.22:
//!
//! ```text
//! numeric-range  = dimension ["," dimension]
//! dimension      = index | range
//! index          = digit+
//! range          = index ":" index
//! ```

use std::str::FromStr;

use crate::status_code::StatusCode;

/// A parsed `IndexRange` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NumericRange {
    /// No range was specified, the whole value applies.
    #[default]
    None,
    /// A single index into an array or string.
    Index(u32),
    /// An inclusive range `min..=max` into an array or string.
    Range(u32, u32),
    /// A list of ranges, used to address sub-ranges of a matrix.
    MultipleRanges(Vec<NumericRange>),
}

impl NumericRange {
    fn parse_dimension(s: &str) -> Result<NumericRange, StatusCode> {
        if let Some((min, max)) = s.split_once(':') {
            let min: u32 = min.parse().map_err(|_| StatusCode::BadIndexRangeInvalid)?;
            let max: u32 = max.parse().map_err(|_| StatusCode::BadIndexRangeInvalid)?;
            if min >= max {
                return Err(StatusCode::BadIndexRangeInvalid);
            }
            Ok(NumericRange::Range(min, max))
        } else {
            let idx: u32 = s.parse().map_err(|_| StatusCode::BadIndexRangeInvalid)?;
            Ok(NumericRange::Index(idx))
        }
    }
}

impl FromStr for NumericRange {
    type Err = StatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(NumericRange::None);
        }
        if let Some((first, rest)) = s.split_once(',') {
            let mut ranges = vec![Self::parse_dimension(first)?];
            for part in rest.split(',') {
                ranges.push(Self::parse_dimension(part)?);
            }
            Ok(NumericRange::MultipleRanges(ranges))
        } else {
            Self::parse_dimension(s)
        }
    }
}

impl std::fmt::Display for NumericRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericRange::None => Ok(()),
            NumericRange::Index(idx) => write!(f, "{idx}"),
            NumericRange::Range(min, max) => write!(f, "{min}:{max}"),
            NumericRange::MultipleRanges(ranges) => {
                let strs: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", strs.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index() {
        assert_eq!(NumericRange::from_str("5").unwrap(), NumericRange::Index(5));
    }

    #[test]
    fn parses_range() {
        assert_eq!(
            NumericRange::from_str("1:3").unwrap(),
            NumericRange::Range(1, 3)
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(NumericRange::from_str("3:1").is_err());
    }

    #[test]
    fn parses_multiple_ranges() {
        assert_eq!(
            NumericRange::from_str("1:2,4").unwrap(),
            NumericRange::MultipleRanges(vec![NumericRange::Range(1, 2), NumericRange::Index(4)])
        );
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(NumericRange::from_str("").unwrap(), NumericRange::None);
    }
}
