//! Attribute change reporting.
//!
//! Device code may change state from any thread, but the protocol engine's
//! reporting entry point must only run on the stack thread. The hand-off is
//! a bounded queue of [`AttributeChangedEvent`]s:
//!
//! - [`ReportScheduler`] is the cloneable producer side. `schedule` never
//!   blocks; if the queue is full the notification is dropped. The stored
//!   attribute value is already correct, so a dropped report only delays
//!   convergence until the next read.
//! - [`ReportQueue`] is consumed on the stack thread and feeds every event to
//!   an [`AttributeChangeSink`].

use super::engine::{AttributeChangeSink, EndpointDescriptor};
use super::types::{AttrId, AttributePath, AttributeType, ClusterId, EndptId, INVALID_ENDPOINT};
use super::types::{bridged_device_basic, fixed_label, on_off};
use crate::device::{ChangeKind, ChangedMask, DeviceChangeObserver, SubDevice};
use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Value snapshot carried with a change report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedValue {
    pub attr_type: AttributeType,
    pub bytes: Vec<u8>,
}

/// "This attribute changed" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChangedEvent {
    pub path: AttributePath,
    /// Present when the producer had the new byte image at hand.
    pub value: Option<ReportedValue>,
}

impl AttributeChangedEvent {
    pub fn new(path: AttributePath) -> Self {
        Self { path, value: None }
    }

    pub fn with_value(path: AttributePath, attr_type: AttributeType, bytes: Vec<u8>) -> Self {
        Self {
            path,
            value: Some(ReportedValue { attr_type, bytes }),
        }
    }
}

/// Attribute reported for each kind of sub-device change.
pub fn reported_attribute(kind: ChangeKind) -> (ClusterId, AttrId) {
    match kind {
        ChangeKind::Reachable => (bridged_device_basic::ID, bridged_device_basic::REACHABLE),
        ChangeKind::State => (on_off::ID, on_off::ON_OFF),
        ChangeKind::Location => (fixed_label::ID, fixed_label::LABEL_LIST),
        ChangeKind::Name => (bridged_device_basic::ID, bridged_device_basic::NODE_LABEL),
    }
}

/// Change kinds whose reported attribute is served by `descriptor`.
pub fn served_changes(descriptor: &EndpointDescriptor) -> ChangedMask {
    ChangedMask::all()
        .kinds()
        .filter(|kind| {
            let (cluster, attribute) = reported_attribute(*kind);
            descriptor.serves(cluster, attribute)
        })
        .fold(ChangedMask::empty(), |mask, kind| mask | kind.flag())
}

/// Producer handle for the stack's report queue.
#[derive(Debug, Clone)]
pub struct ReportScheduler {
    tx: mpsc::Sender<AttributeChangedEvent>,
}

impl ReportScheduler {
    /// Create a queue holding at most `depth` pending reports.
    pub fn channel(depth: usize) -> (ReportScheduler, ReportQueue) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (ReportScheduler { tx }, ReportQueue { rx })
    }

    /// Queue an event for the stack thread. Returns `false` if it was dropped.
    pub fn schedule(&self, event: AttributeChangedEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Report queue full, dropping report for {}", event.path);
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!("Stack stopped, dropping report for {}", event.path);
                false
            }
        }
    }

    pub fn schedule_reporting(&self, endpoint: EndptId, cluster: ClusterId, attribute: AttrId) -> bool {
        self.schedule(AttributeChangedEvent::new(AttributePath::new(
            endpoint, cluster, attribute,
        )))
    }

    /// Schedule one report per kind set in `changed`. Returns the number queued.
    pub fn handle_device_status_changed(&self, endpoint: EndptId, changed: ChangedMask) -> usize {
        let mut queued = 0;
        for kind in changed.kinds() {
            let (cluster, attribute) = reported_attribute(kind);
            if self.schedule_reporting(endpoint, cluster, attribute) {
                queued += 1;
            }
        }
        queued
    }
}

/// Consumer side of the report queue; lives on the stack thread.
#[derive(Debug)]
pub struct ReportQueue {
    rx: mpsc::Receiver<AttributeChangedEvent>,
}

impl ReportQueue {
    /// Deliver events to `sink` until cancelled or every scheduler is dropped.
    pub async fn run(mut self, sink: &dyn AttributeChangeSink, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Report queue cancelled");
                    break;
                }
                event = self.rx.recv() => match event {
                    Some(event) => sink.report_attribute_change(&event),
                    None => break,
                },
            }
        }
        // Flush what was queued before shutdown.
        self.drain(sink);
    }

    /// Deliver every queued event without waiting. Returns the count.
    pub fn drain(&mut self, sink: &dyn AttributeChangeSink) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.try_next() {
            sink.report_attribute_change(&event);
            delivered += 1;
        }
        delivered
    }

    pub fn try_next(&mut self) -> Option<AttributeChangedEvent> {
        self.rx.try_recv().ok()
    }
}

/// Turns sub-device notifications into scheduled attribute reports.
///
/// Only the kinds in `served` are reported; a temperature sensor has no
/// On/Off attribute to report a state change on.
#[derive(Debug, Clone)]
pub struct DeviceStatusReporter {
    scheduler: ReportScheduler,
    served: ChangedMask,
}

impl DeviceStatusReporter {
    pub fn new(scheduler: ReportScheduler, served: ChangedMask) -> Self {
        Self { scheduler, served }
    }

    /// Reporter for an endpoint exposing the clusters in `descriptor`.
    pub fn for_endpoint(scheduler: ReportScheduler, descriptor: &EndpointDescriptor) -> Self {
        Self::new(scheduler, served_changes(descriptor))
    }
}

impl DeviceChangeObserver for DeviceStatusReporter {
    fn notify(&self, device: &SubDevice, changed: ChangedMask) {
        let endpoint = device.endpoint();
        if endpoint == INVALID_ENDPOINT {
            debug!("{} not bound, skipping {:?}", device.name(), changed);
            return;
        }
        let reported = changed & self.served;
        if reported.is_empty() {
            debug!("{} has no attribute for {:?}", device.name(), changed);
            return;
        }
        self.scheduler.handle_device_status_changed(endpoint, reported);
    }
}
