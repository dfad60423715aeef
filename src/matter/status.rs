//! Attribute access errors and their Interaction Model status codes.

use super::types::{AttrId, ClusterId, EndptId};
use std::fmt;
use thiserror::Error as ThisError;

/// Interaction Model status codes surfaced by the attribute layer.
pub mod im_status {
    pub const SUCCESS: u8 = 0x00;
    pub const FAILURE: u8 = 0x01;
    pub const UNSUPPORTED_ENDPOINT: u8 = 0x7F;
    pub const UNSUPPORTED_ATTRIBUTE: u8 = 0x86;
    pub const CONSTRAINT_ERROR: u8 = 0x87;
    pub const UNSUPPORTED_WRITE: u8 = 0x88;
    pub const UNSUPPORTED_READ: u8 = 0x8F;
    pub const RESOURCE_EXHAUSTED: u8 = 0x89;
    pub const BUSY: u8 = 0x9C;
    pub const UNSUPPORTED_CLUSTER: u8 = 0xC3;
}

/// Why a device refused a protocol-originated write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The external device cannot be reached right now.
    Unreachable,
    /// The device does not accept this value.
    InvalidValue,
    /// The device is busy and may accept the write later.
    Busy,
    /// No device hook is attached to the cluster.
    NoDevice,
    Other(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Unreachable => f.write_str("device unreachable"),
            RejectReason::InvalidValue => f.write_str("invalid value"),
            RejectReason::Busy => f.write_str("device busy"),
            RejectReason::NoDevice => f.write_str("no device attached"),
            RejectReason::Other(reason) => f.write_str(reason),
        }
    }
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("attribute 0x{0:04X} is read-only")]
    ReadOnly(AttrId),

    #[error("attribute 0x{0:04X} is write-only")]
    UnsupportedRead(AttrId),

    #[error("unsupported attribute 0x{0:04X}")]
    UnsupportedAttribute(AttrId),

    #[error("unsupported cluster 0x{0:04X}")]
    UnsupportedCluster(ClusterId),

    #[error("unsupported endpoint {0}")]
    UnsupportedEndpoint(EndptId),

    #[error("value violates attribute constraints: {0}")]
    ConstraintError(String),

    #[error("attribute 0x{0:04X} declared twice")]
    DuplicateAttribute(AttrId),

    #[error("write rejected by device: {0}")]
    WriteRejected(RejectReason),
}

impl AttributeError {
    /// Interaction Model status code to return to the peer.
    pub fn status(&self) -> u8 {
        match self {
            AttributeError::SizeMismatch { .. } | AttributeError::ConstraintError(_) => {
                im_status::CONSTRAINT_ERROR
            }
            AttributeError::BufferTooSmall { .. } => im_status::RESOURCE_EXHAUSTED,
            AttributeError::ReadOnly(_) => im_status::UNSUPPORTED_WRITE,
            AttributeError::UnsupportedRead(_) => im_status::UNSUPPORTED_READ,
            AttributeError::UnsupportedAttribute(_) => im_status::UNSUPPORTED_ATTRIBUTE,
            AttributeError::UnsupportedCluster(_) => im_status::UNSUPPORTED_CLUSTER,
            AttributeError::UnsupportedEndpoint(_) => im_status::UNSUPPORTED_ENDPOINT,
            AttributeError::WriteRejected(RejectReason::InvalidValue) => {
                im_status::CONSTRAINT_ERROR
            }
            AttributeError::WriteRejected(RejectReason::Busy) => im_status::BUSY,
            AttributeError::WriteRejected(_) | AttributeError::DuplicateAttribute(_) => {
                im_status::FAILURE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AttributeError::ReadOnly(0).status(), im_status::UNSUPPORTED_WRITE);
        assert_eq!(
            AttributeError::BufferTooSmall {
                needed: 4,
                available: 2
            }
            .status(),
            im_status::RESOURCE_EXHAUSTED
        );
        assert_eq!(
            AttributeError::WriteRejected(RejectReason::Busy).status(),
            im_status::BUSY
        );
        assert_eq!(
            AttributeError::WriteRejected(RejectReason::Unreachable).status(),
            im_status::FAILURE
        );
    }

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(RejectReason::Unreachable.to_string(), "device unreachable");
        assert_eq!(
            RejectReason::Other("motor jammed".into()).to_string(),
            "motor jammed"
        );
    }
}
