//! Protocol status codes
//!
//! Carried as the final argument of `error` and `ack` instructions. The
//! high byte groups codes by origin: 0x00 success, 0x01 unsupported,
//! 0x02 server side, 0x03 client side.

use std::fmt;

/// Numeric status reported to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ProtocolStatus {
    /// The operation succeeded
    Success = 0x0000,
    /// The requested operation is unsupported
    Unsupported = 0x0100,
    /// Internal error, the operation could not be performed
    ServerError = 0x0200,
    /// The server is busy and cannot take more work
    ServerBusy = 0x0201,
    /// The upstream server did not respond in time
    UpstreamTimeout = 0x0202,
    /// The upstream server returned an error
    UpstreamError = 0x0203,
    /// The requested resource does not exist
    ResourceNotFound = 0x0204,
    /// The requested resource is already in use
    ResourceConflict = 0x0205,
    /// The requested resource is closed
    ResourceClosed = 0x0206,
    /// The upstream server does not appear to exist
    UpstreamNotFound = 0x0207,
    /// The upstream server refuses to service connections
    UpstreamUnavailable = 0x0208,
    /// The session conflicted with another session
    SessionConflict = 0x0209,
    /// The session appeared to be inactive
    SessionTimeout = 0x020A,
    /// The session was forcibly terminated
    SessionClosed = 0x020B,
    /// The parameters of the request are illegal
    ClientBadRequest = 0x0300,
    /// Permission was denied because the user is not logged in
    ClientUnauthorized = 0x0301,
    /// Permission was denied and logging in will not help
    ClientForbidden = 0x0303,
    /// The client took too long to respond
    ClientTimeout = 0x0308,
    /// The client sent too much data
    ClientOverrun = 0x030D,
    /// The client sent data of an unsupported type
    ClientBadType = 0x030F,
    /// The client is already using too many resources
    ClientTooMany = 0x031D,
}

impl ProtocolStatus {
    /// Numeric wire value
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a status by its wire value
    pub fn from_code(code: u16) -> Option<Self> {
        let status = match code {
            0x0000 => Self::Success,
            0x0100 => Self::Unsupported,
            0x0200 => Self::ServerError,
            0x0201 => Self::ServerBusy,
            0x0202 => Self::UpstreamTimeout,
            0x0203 => Self::UpstreamError,
            0x0204 => Self::ResourceNotFound,
            0x0205 => Self::ResourceConflict,
            0x0206 => Self::ResourceClosed,
            0x0207 => Self::UpstreamNotFound,
            0x0208 => Self::UpstreamUnavailable,
            0x0209 => Self::SessionConflict,
            0x020A => Self::SessionTimeout,
            0x020B => Self::SessionClosed,
            0x0300 => Self::ClientBadRequest,
            0x0301 => Self::ClientUnauthorized,
            0x0303 => Self::ClientForbidden,
            0x0308 => Self::ClientTimeout,
            0x030D => Self::ClientOverrun,
            0x030F => Self::ClientBadType,
            0x031D => Self::ClientTooMany,
            _ => return None,
        };
        Some(status)
    }

    /// Whether this status reports an error
    pub fn is_error(self) -> bool {
        self != Self::Success
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
