//! Identifier types, access masks and well-known cluster/attribute ids.
//!
//! The bridge only needs a handful of clusters. Ids follow the Matter
//! Application Cluster Specification.

use bitflags::bitflags;
use std::fmt;

/// Endpoint identifier.
pub type EndptId = u16;
/// Cluster identifier.
pub type ClusterId = u32;
/// Attribute identifier.
pub type AttrId = u32;

/// Sentinel endpoint id meaning "not bound to any endpoint".
pub const INVALID_ENDPOINT: EndptId = 0xFFFF;

/// Root node endpoint (always fixed).
pub const ROOT_ENDPOINT: EndptId = 0;

bitflags! {
    /// Access mask for a single attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const REPORT = 0x04;

        /// Readable and reportable.
        const RV = Self::READ.bits() | Self::REPORT.bits();
        /// Readable, writable and reportable.
        const RWV = Self::READ.bits() | Self::WRITE.bits() | Self::REPORT.bits();
    }
}

impl Access {
    pub const fn is_readable(self) -> bool {
        self.contains(Access::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Access::WRITE)
    }

    pub const fn is_reportable(self) -> bool {
        self.contains(Access::REPORT)
    }
}

/// Storage type of an attribute value, passed along with change reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum AttributeType {
    Boolean,
    Int8u,
    Int16u,
    Int32u,
    Int64u,
    Int8s,
    Int16s,
    Int32s,
    Int64s,
    CharString,
    OctetString,
}

/// Fully qualified attribute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributePath {
    pub endpoint: EndptId,
    pub cluster: ClusterId,
    pub attribute: AttrId,
}

impl AttributePath {
    pub const fn new(endpoint: EndptId, cluster: ClusterId, attribute: AttrId) -> Self {
        Self {
            endpoint,
            cluster,
            attribute,
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:04X}/0x{:04X}",
            self.endpoint, self.cluster, self.attribute
        )
    }
}

/// Global attributes present on every cluster.
pub mod global {
    use super::AttrId;

    pub const FEATURE_MAP: AttrId = 0xFFFC;
    pub const CLUSTER_REVISION: AttrId = 0xFFFD;
}

/// Identify cluster (0x0003).
pub mod identify {
    use super::{AttrId, ClusterId};

    pub const ID: ClusterId = 0x0003;
    pub const REVISION: u16 = 4;

    pub const IDENTIFY_TIME: AttrId = 0x0000;
    pub const IDENTIFY_TYPE: AttrId = 0x0001;
}

/// On/Off cluster (0x0006).
pub mod on_off {
    use super::{AttrId, ClusterId};

    pub const ID: ClusterId = 0x0006;
    pub const REVISION: u16 = 6;

    pub const ON_OFF: AttrId = 0x0000;
}

/// Power Source cluster (0x002F).
pub mod power_source {
    use super::{AttrId, ClusterId};

    pub const ID: ClusterId = 0x002F;
    pub const REVISION: u16 = 2;
    /// Battery feature bit.
    pub const FEATURE_BATTERY: u32 = 0x02;

    pub const STATUS: AttrId = 0x0000;
    pub const ORDER: AttrId = 0x0001;
    pub const DESCRIPTION: AttrId = 0x0002;
    pub const BAT_PERCENT_REMAINING: AttrId = 0x000C;

    /// PowerSourceStatusEnum::Active
    pub const STATUS_ACTIVE: u8 = 1;
}

/// Bridged Device Basic Information cluster (0x0039).
pub mod bridged_device_basic {
    use super::{AttrId, ClusterId};

    pub const ID: ClusterId = 0x0039;
    pub const REVISION: u16 = 4;

    pub const NODE_LABEL: AttrId = 0x0005;
    pub const REACHABLE: AttrId = 0x0011;
}

/// Fixed Label cluster (0x0040).
pub mod fixed_label {
    use super::{AttrId, ClusterId};

    pub const ID: ClusterId = 0x0040;

    pub const LABEL_LIST: AttrId = 0x0000;
}

/// Temperature Measurement cluster (0x0402).
///
/// Values are centidegrees Celsius (21.5°C is 2150).
pub mod temperature_measurement {
    use super::{AttrId, ClusterId};

    pub const ID: ClusterId = 0x0402;
    pub const REVISION: u16 = 4;

    pub const MEASURED_VALUE: AttrId = 0x0000;
    pub const MIN_MEASURED_VALUE: AttrId = 0x0001;
    pub const MAX_MEASURED_VALUE: AttrId = 0x0002;
}
