//! OPC-UA status codes used by the bench.

use std::fmt;
use std::str::FromStr;

/// A 32-bit OPC-UA status code.
///
/// The top two bits carry the severity: `00` good, `01` uncertain, `10` bad.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);

    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    pub const BAD_ENCODING_ERROR: StatusCode = StatusCode(0x8006_0000);
    pub const BAD_DECODING_ERROR: StatusCode = StatusCode(0x8007_0000);
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    pub const BAD_SERVICE_UNSUPPORTED: StatusCode = StatusCode(0x800B_0000);
    pub const BAD_SERVER_HALTED: StatusCode = StatusCode(0x800E_0000);
    pub const BAD_SECURE_CHANNEL_ID_INVALID: StatusCode = StatusCode(0x8022_0000);
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    pub const BAD_SUBSCRIPTION_ID_INVALID: StatusCode = StatusCode(0x8028_0000);
    pub const BAD_METHOD_INVALID: StatusCode = StatusCode(0x8075_0000);
    pub const BAD_ARGUMENTS_MISSING: StatusCode = StatusCode(0x8076_0000);
    pub const BAD_TCP_SERVER_TOO_BUSY: StatusCode = StatusCode(0x807D_0000);
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: StatusCode = StatusCode(0x807E_0000);
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: StatusCode = StatusCode(0x807F_0000);
    pub const BAD_TCP_MESSAGE_TOO_LARGE: StatusCode = StatusCode(0x8080_0000);
    pub const BAD_TCP_NOT_ENOUGH_RESOURCES: StatusCode = StatusCode(0x8081_0000);
    pub const BAD_TCP_INTERNAL_ERROR: StatusCode = StatusCode(0x8082_0000);
    pub const BAD_TCP_ENDPOINT_URL_INVALID: StatusCode = StatusCode(0x8083_0000);
    pub const BAD_REQUEST_INTERRUPTED: StatusCode = StatusCode(0x8084_0000);
    pub const BAD_SECURE_CHANNEL_CLOSED: StatusCode = StatusCode(0x8086_0000);
    pub const BAD_INVALID_ARGUMENT: StatusCode = StatusCode(0x80AB_0000);
    pub const BAD_PROTOCOL_VERSION_UNSUPPORTED: StatusCode = StatusCode(0x80BE_0000);
    pub const BAD_TOO_MANY_ARGUMENTS: StatusCode = StatusCode(0x80E5_0000);

    const NAMES: &'static [(StatusCode, &'static str)] = &[
        (Self::GOOD, "Good"),
        (Self::BAD_INTERNAL_ERROR, "BadInternalError"),
        (Self::BAD_COMMUNICATION_ERROR, "BadCommunicationError"),
        (Self::BAD_ENCODING_ERROR, "BadEncodingError"),
        (Self::BAD_DECODING_ERROR, "BadDecodingError"),
        (Self::BAD_TIMEOUT, "BadTimeout"),
        (Self::BAD_SERVICE_UNSUPPORTED, "BadServiceUnsupported"),
        (Self::BAD_SERVER_HALTED, "BadServerHalted"),
        (Self::BAD_SECURE_CHANNEL_ID_INVALID, "BadSecureChannelIdInvalid"),
        (Self::BAD_SESSION_ID_INVALID, "BadSessionIdInvalid"),
        (Self::BAD_SUBSCRIPTION_ID_INVALID, "BadSubscriptionIdInvalid"),
        (Self::BAD_METHOD_INVALID, "BadMethodInvalid"),
        (Self::BAD_ARGUMENTS_MISSING, "BadArgumentsMissing"),
        (Self::BAD_TCP_SERVER_TOO_BUSY, "BadTcpServerTooBusy"),
        (Self::BAD_TCP_MESSAGE_TYPE_INVALID, "BadTcpMessageTypeInvalid"),
        (Self::BAD_TCP_SECURE_CHANNEL_UNKNOWN, "BadTcpSecureChannelUnknown"),
        (Self::BAD_TCP_MESSAGE_TOO_LARGE, "BadTcpMessageTooLarge"),
        (Self::BAD_TCP_NOT_ENOUGH_RESOURCES, "BadTcpNotEnoughResources"),
        (Self::BAD_TCP_INTERNAL_ERROR, "BadTcpInternalError"),
        (Self::BAD_TCP_ENDPOINT_URL_INVALID, "BadTcpEndpointUrlInvalid"),
        (Self::BAD_REQUEST_INTERRUPTED, "BadRequestInterrupted"),
        (Self::BAD_SECURE_CHANNEL_CLOSED, "BadSecureChannelClosed"),
        (Self::BAD_INVALID_ARGUMENT, "BadInvalidArgument"),
        (Self::BAD_PROTOCOL_VERSION_UNSUPPORTED, "BadProtocolVersionUnsupported"),
        (Self::BAD_TOO_MANY_ARGUMENTS, "BadTooManyArguments"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_good(self) -> bool {
        self.0 >> 30 == 0b00
    }

    pub fn is_uncertain(self) -> bool {
        self.0 >> 30 == 0b01
    }

    pub fn is_bad(self) -> bool {
        self.0 >> 30 == 0b10
    }

    /// Symbolic name, if the code is one the bench knows.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, name)| *name)
    }

    /// Look up a code by symbolic name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(code, _)| *code)
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        StatusCode(value)
    }
}

impl From<StatusCode> for u32 {
    fn from(value: StatusCode) -> Self {
        value.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode({self})")
    }
}

/// Error returned when a status code string is neither a known name nor hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status code '{0}'")]
pub struct ParseStatusCodeError(pub String);

impl FromStr for StatusCode {
    type Err = ParseStatusCodeError;

    /// Accepts symbolic names (`BadSessionIdInvalid`) or hex (`0x80250000`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(code) = Self::from_name(trimmed) {
            return Ok(code);
        }
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ParseStatusCodeError(s.to_string()))?;
        u32::from_str_radix(hex, 16)
            .map(StatusCode)
            .map_err(|_| ParseStatusCodeError(s.to_string()))
    }
}
