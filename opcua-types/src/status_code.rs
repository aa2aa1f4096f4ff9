// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! [`StatusCode`], the 32-bit severity-tagged result code that accompanies
//! every OPC UA value and service result.

use std::fmt;
use std::io::{Read, Write};

use crate::{DecodingOptions, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable};

/// Severity is encoded in the top two bits of the code.
const SEVERITY_MASK: u32 = 0xC000_0000;
const SEVERITY_GOOD: u32 = 0x0000_0000;
const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
const SEVERITY_BAD: u32 = 0x8000_0000;

macro_rules! status_codes {
    ($( $name:ident = $value:expr ),* $(,)?) => {
        impl StatusCode {
            $(
                #[allow(missing_docs)]
                pub const $name: StatusCode = StatusCode($value);
            )*

            /// Get the symbolic name of this status code, if known.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $( $value => Some(stringify!($name)), )*
                    _ => None,
                }
            }
        }
    };
}

/// A 32-bit status code. The top two bits carry severity (Good / Uncertain /
/// Bad); the remainder identifies the specific condition.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub u32);

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl StatusCode {
    /// `true` if the severity bits indicate success.
    pub fn is_good(self) -> bool {
        self.0 & SEVERITY_MASK == SEVERITY_GOOD
    }

    /// `true` if the severity bits indicate an uncertain result.
    pub fn is_uncertain(self) -> bool {
        self.0 & SEVERITY_MASK == SEVERITY_UNCERTAIN
    }

    /// `true` if the severity bits indicate failure. This is the bit test
    /// referenced throughout the error handling design: codes with the top
    /// bit set are bad.
    pub fn is_bad(self) -> bool {
        self.0 & SEVERITY_BAD == SEVERITY_BAD
    }

    /// Strip the subcode bits, leaving only the severity + main code.
    pub fn code(self) -> StatusCode {
        StatusCode(self.0 & 0xFFFF_0000)
    }

    /// Return `Ok(())` if good, `Err(self)` otherwise.
    pub fn check(self) -> Result<(), StatusCode> {
        if self.is_bad() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl SimpleBinaryEncodable for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.0.encode(stream)
    }
}

impl SimpleBinaryDecodable for StatusCode {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(StatusCode(u32::decode(stream, decoding_options)?))
    }
}

// Only the subset of codes this crate raises or consumes across the
// transport, codec, session and subscription layers are named here; an
// unrecognized code simply prints its raw hex value.
status_codes! {
    Good = 0x0000_0000,
    Uncertain = 0x4000_0000,
    BadUnexpectedError = 0x8000_0000,
    BadInternalError = 0x8000_1000,
    BadOutOfMemory = 0x8000_2000,
    BadTimeout = 0x800A_0000,
    BadRequestTimeout = 0x800B_0000,
    BadCommunicationError = 0x8050_0000,
    BadEncodingError = 0x8007_0000,
    BadDecodingError = 0x8008_0000,
    BadEncodingLimitsExceeded = 0x8009_0000,
    BadRequestTooLarge = 0x80B8_0000,
    BadResponseTooLarge = 0x80B9_0000,
    BadUnknownResponse = 0x8001_0000,
    BadInvalidArgument = 0x8002_0000,
    BadConnectionRejected = 0x8003_0000,
    BadDisconnect = 0x8004_0000,
    BadConnectionClosed = 0x8005_0000,
    BadInvalidState = 0x8006_0000,
    BadNotConnected = 0x8028_0000,
    BadDeviceFailure = 0x8029_0000,
    BadTcpServerTooBusy = 0x807B_0000,
    BadTcpMessageTypeInvalid = 0x807C_0000,
    BadTcpSecureChannelUnknown = 0x807D_0000,
    BadTcpMessageTooLarge = 0x807E_0000,
    BadTcpNotEnoughResources = 0x807F_0000,
    BadTcpInternalError = 0x8080_0000,
    BadTcpEndpointUrlInvalid = 0x8081_0000,
    BadRequestInterrupted = 0x8082_0000,
    BadRequestTimeoutOut = 0x8083_0000,
    BadSecureChannelClosed = 0x8086_0000,
    BadSecureChannelTokenUnknown = 0x8087_0000,
    BadSequenceNumberInvalid = 0x8088_0000,
    BadSequenceNumberUnknown = 0x80C8_0000,
    BadProtocolVersionUnsupported = 0x80BE_0000,
    BadConfigurationError = 0x8092_0000,
    BadNotImplemented = 0x8010_0000,
    BadServiceUnsupported = 0x800D_0000,
    BadShutdown = 0x800E_0000,
    BadServerNotConnected = 0x800F_0000,
    BadServerHalted = 0x8011_0000,
    BadNothingToDo = 0x8012_0000,
    BadTooManyOperations = 0x8013_0000,
    BadDataTypeIdUnknown = 0x8014_0000,
    BadCertificateInvalid = 0x8015_0000,
    BadSecurityChecksFailed = 0x8016_0000,
    BadCertificateTimeInvalid = 0x8017_0000,
    BadCertificateIssuerTimeInvalid = 0x8018_0000,
    BadCertificateHostNameInvalid = 0x8019_0000,
    BadCertificateUriInvalid = 0x801A_0000,
    BadCertificateUseNotAllowed = 0x801B_0000,
    BadCertificateIssuerUseNotAllowed = 0x801C_0000,
    BadCertificateUntrusted = 0x801D_0000,
    BadCertificateRevocationUnknown = 0x801E_0000,
    BadCertificateIssuerRevocationUnknown = 0x801F_0000,
    BadCertificateRevoked = 0x8020_0000,
    BadCertificateIssuerRevoked = 0x8021_0000,
    BadUserAccessDenied = 0x8022_0000,
    BadIdentityTokenInvalid = 0x8023_0000,
    BadIdentityTokenRejected = 0x8024_0000,
    BadSecureChannelIdInvalid = 0x8025_0000,
    BadInvalidTimestamp = 0x8026_0000,
    BadNonceInvalid = 0x8027_0000,
    BadSessionIdInvalid = 0x8030_0000,
    BadSessionClosed = 0x8031_0000,
    BadSessionNotActivated = 0x8032_0000,
    BadSubscriptionIdInvalid = 0x8033_0000,
    BadRequestHeaderInvalid = 0x802A_0000,
    BadTimestampsToReturnInvalid = 0x802B_0000,
    BadRequestCancelledByClient = 0x802C_0000,
    BadTooManyArguments = 0x80E5_0000,
    BadNoSubscription = 0x8065_0000,
    BadMessageNotAvailable = 0x807C_0001,
    BadTooManySubscriptions = 0x80E2_0000,
    BadTooManyPublishRequests = 0x80E3_0000,
    BadNoValidCertificates = 0x8089_0000,
    BadSecurityPolicyRejected = 0x80E6_0000,
    BadNodeIdInvalid = 0x8033_0000,
    BadNodeIdUnknown = 0x8034_0000,
    BadAttributeIdInvalid = 0x8035_0000,
    BadIndexRangeInvalid = 0x8036_0000,
    BadIndexRangeNoData = 0x8037_0000,
    BadIndexRangeDataMismatch = 0x80E5_0000,
    BadDataEncodingInvalid = 0x8038_0000,
    BadDataEncodingUnsupported = 0x8039_0000,
    BadNotReadable = 0x803A_0000,
    BadNotWritable = 0x803B_0000,
    BadWriteNotSupported = 0x803C_0000,
    BadOutOfRange = 0x803D_0000,
    BadNotSupported = 0x803E_0000,
    BadNotFound = 0x803F_0000,
    BadObjectDeleted = 0x8040_0000,
    BadNotImplementedDeleted = 0x8041_0000,
    BadMethodInvalid = 0x8042_0000,
    BadArgumentsMissing = 0x8043_0000,
    BadNotExecutable = 0x81BD_0000,
    BadTooManySessions = 0x8045_0000,
    BadContinuationPointInvalid = 0x8057_0000,
    BadNoContinuationPoints = 0x8058_0000,
    BadFilterNotAllowed = 0x8045_0001,
    BadFilterOperandInvalid = 0x8096_0000,
    BadMonitoredItemIdInvalid = 0x808E_0000,
    BadMonitoredItemFilterInvalid = 0x8097_0000,
    BadMonitoringModeInvalid = 0x8093_0000,
    BadApplicationSignatureInvalid = 0x80E4_0000,
    BadUserSignatureInvalid = 0x80EB_0000,
    GoodSubscriptionTransferred = 0x002D_0000,
}
