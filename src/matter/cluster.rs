//! Cluster instances backed by attribute cells.
//!
//! A [`ClusterInstance`] is the single entry and exit point for attribute
//! traffic between the protocol engine and a bridged device:
//!
//! - `read` serves protocol reads straight from the cells.
//! - `write_from_matter` never commits a protocol write itself. It hands the
//!   value to the device's [`WriteInterceptor`], and only an accepted value
//!   gets stored.
//! - `write_from_bridge` is the device-side commit path. A changed value
//!   bumps the data version and, once the cluster is bound to an endpoint,
//!   schedules a change report.

use super::attribute::{Attribute, AttributeCell, Primitive};
use super::reporting::{AttributeChangedEvent, ReportScheduler};
use super::status::{AttributeError, RejectReason};
use super::types::{AttrId, AttributePath, ClusterId, EndptId, INVALID_ENDPOINT, global};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Per-cluster data version, bumped on every committed change.
#[derive(Debug)]
pub struct DataVersion(AtomicU32);

impl DataVersion {
    pub fn new(initial: u32) -> Self {
        Self(AtomicU32::new(initial))
    }

    /// Start from a random version so controllers never match a stale cache.
    pub fn new_rand() -> Self {
        Self::new(rand::random())
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Bump the version, returning the new value.
    pub fn changed(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}

/// A protocol write waiting for the device's verdict.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: AttributePath,
    /// Byte image proposed by the peer, already validated against the cell.
    pub value: &'a [u8],
}

/// Device verdict on a protocol write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Commit this byte image (possibly transformed from the request).
    Accepted(Vec<u8>),
    Rejected(RejectReason),
}

/// Device-side hook that decides whether protocol writes become visible.
///
/// Called with the cluster locked: implementations must not call back into
/// the same cluster.
pub trait WriteInterceptor: Send + Sync {
    fn intercept(&self, request: &WriteRequest<'_>) -> WriteOutcome;
}

/// Attribute storage for one cluster on one endpoint.
#[derive(Debug)]
pub struct ClusterInstance {
    id: ClusterId,
    revision: u16,
    feature_map: u32,
    endpoint: EndptId,
    attributes: Vec<Attribute>,
    data_version: DataVersion,
    interceptor: Option<Weak<dyn WriteInterceptor>>,
    reporter: Option<ReportScheduler>,
}

impl ClusterInstance {
    pub fn new(id: ClusterId, revision: u16) -> Self {
        Self {
            id,
            revision,
            feature_map: 0,
            endpoint: INVALID_ENDPOINT,
            attributes: Vec::new(),
            data_version: DataVersion::new_rand(),
            interceptor: None,
            reporter: None,
        }
    }

    pub fn with_feature_map(mut self, feature_map: u32) -> Self {
        self.feature_map = feature_map;
        self
    }

    /// Declare an attribute. Ids must be unique within the cluster.
    pub fn with_attribute(mut self, attribute: Attribute) -> Result<Self, AttributeError> {
        if self.position(attribute.id()).is_some() {
            return Err(AttributeError::DuplicateAttribute(attribute.id()));
        }
        self.attributes.push(attribute);
        Ok(self)
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn endpoint(&self) -> EndptId {
        self.endpoint
    }

    pub fn data_version(&self) -> u32 {
        self.data_version.get()
    }

    /// Whether the cluster is bound to an endpoint.
    pub fn active(&self) -> bool {
        self.endpoint != INVALID_ENDPOINT
    }

    /// Declared attribute ids in declaration order.
    pub fn attribute_ids(&self) -> impl Iterator<Item = AttrId> + '_ {
        self.attributes.iter().map(Attribute::id)
    }

    pub fn set_interceptor(&mut self, interceptor: &Arc<dyn WriteInterceptor>) {
        self.interceptor = Some(Arc::downgrade(interceptor));
    }

    /// Bind to an endpoint; changes are reported through `reporter` from now on.
    pub fn bind(&mut self, endpoint: EndptId, reporter: ReportScheduler) {
        self.endpoint = endpoint;
        self.reporter = Some(reporter);
    }

    pub fn unbind(&mut self) {
        self.endpoint = INVALID_ENDPOINT;
        self.reporter = None;
    }

    /// Copy an attribute's byte image into `buf`.
    pub fn read(&self, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
        let Some(index) = self.position(attr_id) else {
            return self.read_global(attr_id, buf);
        };
        let attribute = &self.attributes[index];
        if !attribute.access().is_readable() {
            return Err(AttributeError::UnsupportedRead(attr_id));
        }
        attribute.cell().read(buf)
    }

    /// Current byte image of an attribute.
    pub fn value(&self, attr_id: AttrId) -> Result<Vec<u8>, AttributeError> {
        let index = self
            .position(attr_id)
            .ok_or(AttributeError::UnsupportedAttribute(attr_id))?;
        self.attributes[index].cell().to_bytes()
    }

    /// Protocol-originated write.
    ///
    /// Succeeds without side effects if the value is unchanged. Otherwise the
    /// device interceptor decides, and only an accepted value is committed.
    pub fn write_from_matter(&mut self, attr_id: AttrId, buf: &[u8]) -> Result<(), AttributeError> {
        let index = self
            .position(attr_id)
            .ok_or(AttributeError::UnsupportedAttribute(attr_id))?;
        let attribute = &self.attributes[index];
        if !attribute.access().is_writable() {
            warn!(
                "Rejected write to read-only attribute {}",
                self.path(attr_id)
            );
            return Err(AttributeError::ReadOnly(attr_id));
        }
        attribute.cell().validate(buf)?;
        if attribute.cell().matches(buf) {
            return Ok(());
        }

        let Some(interceptor) = self.interceptor.as_ref().and_then(Weak::upgrade) else {
            warn!("No device hook for write to {}", self.path(attr_id));
            return Err(AttributeError::WriteRejected(RejectReason::NoDevice));
        };
        let request = WriteRequest {
            path: self.path(attr_id),
            value: buf,
        };
        match interceptor.intercept(&request) {
            WriteOutcome::Accepted(value) => {
                self.write_from_bridge(attr_id, &value)?;
                Ok(())
            }
            WriteOutcome::Rejected(reason) => {
                info!("Device rejected write to {}: {}", request.path, reason);
                Err(AttributeError::WriteRejected(reason))
            }
        }
    }

    /// Device-originated write. Returns `true` if the stored value changed.
    pub fn write_from_bridge(&mut self, attr_id: AttrId, buf: &[u8]) -> Result<bool, AttributeError> {
        let index = self
            .position(attr_id)
            .ok_or(AttributeError::UnsupportedAttribute(attr_id))?;
        let changed = self.attributes[index].cell_mut().try_write(buf)?;
        if changed {
            self.data_version.changed();
            self.on_changed(index);
        }
        Ok(changed)
    }

    fn on_changed(&self, index: usize) {
        let attribute = &self.attributes[index];
        let path = self.path(attribute.id());
        if !self.active() {
            debug!("Cluster 0x{:04X} not bound, skipping report", self.id);
            return;
        }
        if !attribute.access().is_reportable() {
            return;
        }
        if let Some(reporter) = &self.reporter {
            let cell = attribute.cell();
            let event = match cell.to_bytes() {
                Ok(bytes) => AttributeChangedEvent::with_value(path, cell.attr_type(), bytes),
                Err(e) => {
                    warn!("Reporting {} without value: {}", path, e);
                    AttributeChangedEvent::new(path)
                }
            };
            reporter.schedule(event);
        }
    }

    fn read_global(&self, attr_id: AttrId, buf: &mut [u8]) -> Result<usize, AttributeError> {
        match attr_id {
            global::CLUSTER_REVISION => Primitive::new(self.revision).read(buf),
            global::FEATURE_MAP => Primitive::new(self.feature_map).read(buf),
            _ => Err(AttributeError::UnsupportedAttribute(attr_id)),
        }
    }

    fn position(&self, attr_id: AttrId) -> Option<usize> {
        self.attributes.iter().position(|a| a.id() == attr_id)
    }

    fn path(&self, attr_id: AttrId) -> AttributePath {
        AttributePath::new(self.endpoint, self.id, attr_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::attribute::OctetString;
    use crate::matter::status::im_status;
    use crate::matter::types::{Access, identify};
    use parking_lot::Mutex;

    const LABEL: AttrId = 0x0010;

    fn test_cluster() -> ClusterInstance {
        ClusterInstance::new(identify::ID, identify::REVISION)
            .with_attribute(Attribute::new(
                identify::IDENTIFY_TIME,
                Access::RWV,
                Primitive::new(0u16),
            ))
            .unwrap()
            .with_attribute(Attribute::new(
                identify::IDENTIFY_TYPE,
                Access::RV,
                Primitive::new(2u8),
            ))
            .unwrap()
            .with_attribute(Attribute::new(
                LABEL,
                Access::RWV,
                OctetString::<8>::char_string("a").unwrap(),
            ))
            .unwrap()
    }

    /// Records every request and answers with a fixed verdict.
    struct Recorder {
        outcome: Option<WriteOutcome>,
        seen: Mutex<Vec<AttributePath>>,
    }

    impl Recorder {
        fn new(outcome: Option<WriteOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl WriteInterceptor for Recorder {
        fn intercept(&self, request: &WriteRequest<'_>) -> WriteOutcome {
            self.seen.lock().push(request.path);
            self.outcome
                .clone()
                .unwrap_or_else(|| WriteOutcome::Accepted(request.value.to_vec()))
        }
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let result = ClusterInstance::new(identify::ID, 4)
            .with_attribute(Attribute::new(1, Access::RV, Primitive::new(0u8)))
            .unwrap()
            .with_attribute(Attribute::new(1, Access::RV, Primitive::new(0u8)));
        assert_eq!(result.unwrap_err(), AttributeError::DuplicateAttribute(1));
    }

    #[test]
    fn test_unbound_cluster_is_inactive() {
        let cluster = test_cluster();
        assert!(!cluster.active());
        assert_eq!(cluster.endpoint(), INVALID_ENDPOINT);
    }

    #[test]
    fn test_read_unknown_attribute() {
        let cluster = test_cluster();
        let mut buf = [0u8; 2];
        assert_eq!(
            cluster.read(0x7777, &mut buf),
            Err(AttributeError::UnsupportedAttribute(0x7777))
        );
    }

    #[test]
    fn test_read_requires_read_access() {
        let cluster = ClusterInstance::new(identify::ID, identify::REVISION)
            .with_attribute(Attribute::new(LABEL, Access::WRITE, Primitive::new(9u8)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = cluster.read(LABEL, &mut buf).unwrap_err();
        assert_eq!(err, AttributeError::UnsupportedRead(LABEL));
        assert_eq!(err.status(), im_status::UNSUPPORTED_READ);
        assert_eq!(buf, [0]);
    }

    #[test]
    fn test_read_global_attributes() {
        let cluster = test_cluster().with_feature_map(0x5);
        let mut rev = [0u8; 2];
        cluster.read(global::CLUSTER_REVISION, &mut rev).unwrap();
        assert_eq!(u16::from_ne_bytes(rev), identify::REVISION);
        let mut fm = [0u8; 4];
        cluster.read(global::FEATURE_MAP, &mut fm).unwrap();
        assert_eq!(u32::from_ne_bytes(fm), 0x5);
    }

    #[test]
    fn test_write_from_matter_read_only() {
        let mut cluster = test_cluster();
        let recorder = Recorder::new(None);
        let hook: Arc<dyn WriteInterceptor> = recorder.clone();
        cluster.set_interceptor(&hook);

        assert_eq!(
            cluster.write_from_matter(identify::IDENTIFY_TYPE, &[5]),
            Err(AttributeError::ReadOnly(identify::IDENTIFY_TYPE))
        );
        assert_eq!(cluster.value(identify::IDENTIFY_TYPE).unwrap(), vec![2]);
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_write_from_matter_same_value_skips_device() {
        let mut cluster = test_cluster();
        let recorder = Recorder::new(None);
        let hook: Arc<dyn WriteInterceptor> = recorder.clone();
        cluster.set_interceptor(&hook);

        let version = cluster.data_version();
        cluster
            .write_from_matter(identify::IDENTIFY_TIME, &0u16.to_ne_bytes())
            .unwrap();
        assert!(recorder.seen.lock().is_empty());
        assert_eq!(cluster.data_version(), version);
    }

    #[test]
    fn test_write_from_matter_goes_through_device() {
        let mut cluster = test_cluster();
        let recorder = Recorder::new(None);
        let hook: Arc<dyn WriteInterceptor> = recorder.clone();
        cluster.set_interceptor(&hook);

        let version = cluster.data_version();
        cluster
            .write_from_matter(identify::IDENTIFY_TIME, &30u16.to_ne_bytes())
            .unwrap();
        assert_eq!(recorder.seen.lock().len(), 1);
        assert_eq!(
            cluster.value(identify::IDENTIFY_TIME).unwrap(),
            30u16.to_ne_bytes().to_vec()
        );
        assert_eq!(cluster.data_version(), version.wrapping_add(1));
    }

    #[test]
    fn test_device_can_transform_write() {
        let mut cluster = test_cluster();
        let clamp = Recorder::new(Some(WriteOutcome::Accepted(10u16.to_ne_bytes().to_vec())));
        let hook: Arc<dyn WriteInterceptor> = clamp;
        cluster.set_interceptor(&hook);

        cluster
            .write_from_matter(identify::IDENTIFY_TIME, &600u16.to_ne_bytes())
            .unwrap();
        assert_eq!(
            cluster.value(identify::IDENTIFY_TIME).unwrap(),
            10u16.to_ne_bytes().to_vec()
        );
    }

    #[test]
    fn test_rejected_write_leaves_value() {
        let mut cluster = test_cluster();
        let hook: Arc<dyn WriteInterceptor> =
            Recorder::new(Some(WriteOutcome::Rejected(RejectReason::Unreachable)));
        cluster.set_interceptor(&hook);

        assert_eq!(
            cluster.write_from_matter(identify::IDENTIFY_TIME, &5u16.to_ne_bytes()),
            Err(AttributeError::WriteRejected(RejectReason::Unreachable))
        );
        assert_eq!(
            cluster.value(identify::IDENTIFY_TIME).unwrap(),
            0u16.to_ne_bytes().to_vec()
        );
    }

    #[test]
    fn test_write_without_device_is_rejected() {
        let mut cluster = test_cluster();
        assert_eq!(
            cluster.write_from_matter(identify::IDENTIFY_TIME, &5u16.to_ne_bytes()),
            Err(AttributeError::WriteRejected(RejectReason::NoDevice))
        );

        // A dropped device behaves the same.
        let hook: Arc<dyn WriteInterceptor> = Recorder::new(None);
        cluster.set_interceptor(&hook);
        drop(hook);
        assert!(
            cluster
                .write_from_matter(identify::IDENTIFY_TIME, &5u16.to_ne_bytes())
                .is_err()
        );
    }

    #[test]
    fn test_write_from_matter_validates_size_first() {
        let mut cluster = test_cluster();
        let recorder = Recorder::new(None);
        let hook: Arc<dyn WriteInterceptor> = recorder.clone();
        cluster.set_interceptor(&hook);

        assert!(matches!(
            cluster.write_from_matter(identify::IDENTIFY_TIME, &[1]),
            Err(AttributeError::SizeMismatch { .. })
        ));
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_write_from_bridge_reports_only_when_bound() {
        let (scheduler, mut queue) = ReportScheduler::channel(8);
        let mut cluster = test_cluster();

        assert_eq!(
            cluster.write_from_bridge(identify::IDENTIFY_TIME, &3u16.to_ne_bytes()),
            Ok(true)
        );
        assert!(queue.try_next().is_none());

        cluster.bind(9, scheduler);
        assert!(cluster.active());
        assert_eq!(
            cluster.write_from_bridge(identify::IDENTIFY_TIME, &4u16.to_ne_bytes()),
            Ok(true)
        );
        let event = queue.try_next().unwrap();
        assert_eq!(
            event.path,
            AttributePath::new(9, identify::ID, identify::IDENTIFY_TIME)
        );
        let value = event.value.unwrap();
        assert_eq!(value.bytes, 4u16.to_ne_bytes().to_vec());

        // Same value again: no report.
        assert_eq!(
            cluster.write_from_bridge(identify::IDENTIFY_TIME, &4u16.to_ne_bytes()),
            Ok(false)
        );
        assert!(queue.try_next().is_none());

        cluster.unbind();
        cluster
            .write_from_bridge(identify::IDENTIFY_TIME, &5u16.to_ne_bytes())
            .unwrap();
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn test_string_attribute_through_cluster() {
        let mut cluster = test_cluster();
        let image = OctetString::<8>::encode(b"hall").unwrap();
        assert_eq!(cluster.write_from_bridge(LABEL, &image), Ok(true));
        let mut buf = [0u8; 9];
        let len = cluster.read(LABEL, &mut buf).unwrap();
        assert_eq!(&buf[..len], image.as_slice());
    }
}
