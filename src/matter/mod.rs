mod stack;

pub mod attribute;
pub mod cluster;
pub mod device_types;
pub mod engine;
pub mod reporting;
pub mod status;
pub mod types;

pub use stack::{SharedRegistry, StackHandle, run_bridge_stack};

pub use attribute::{Attribute, AttributeCell, OctetString, Primitive};
pub use cluster::{ClusterInstance, WriteInterceptor, WriteOutcome, WriteRequest};
pub use engine::{AttributeChangeSink, EndpointRegistrar, InMemoryEngine};
pub use reporting::{AttributeChangedEvent, ReportQueue, ReportScheduler};
pub use status::{AttributeError, RejectReason};
