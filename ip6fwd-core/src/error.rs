//! Forwarding error taxonomy. Every variant means the frame was dropped.

/// Why a frame could not be forwarded. The frame is always consumed when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("destination not routable")]
    RouteNotFound,
    #[error("unsupported transport protocol: {0}")]
    UnsupportedProtocol(u8),
    #[error("no free I/O buffers")]
    BufferExhausted,
    #[error("forwarding path not supported")]
    UnsupportedForwardingPath,
    #[error("frame shorter than its headers")]
    Truncated,
}

const ENOMEM: i32 = 12;
const EINVAL: i32 = 22;
const ENOSYS: i32 = 38;
const EPROTONOSUPPORT: i32 = 93;
const ENETUNREACH: i32 = 101;

impl ForwardError {
    /// Negated errno for C callers.
    pub fn errno(&self) -> i32 {
        match self {
            ForwardError::RouteNotFound => -ENETUNREACH,
            ForwardError::UnsupportedProtocol(_) => -EPROTONOSUPPORT,
            ForwardError::BufferExhausted => -ENOMEM,
            ForwardError::UnsupportedForwardingPath => -ENOSYS,
            ForwardError::Truncated => -EINVAL,
        }
    }
}
