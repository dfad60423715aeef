//! The protocol stack thread.
//!
//! The engine's reporting entry point and the endpoint registry are only
//! touched from one place at a time. Reports are drained on a dedicated
//! "matter-stack" thread running its own single-threaded runtime; registry
//! access from anywhere else goes through the [`SharedRegistry`] mutex,
//! which plays the role of the stack lock.

use super::engine::AttributeChangeSink;
use super::reporting::ReportQueue;
use crate::bridge::DynamicEndpointRegistry;
use log::{error, info};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Registry shared between the stack and device drivers.
pub type SharedRegistry<E> = Arc<Mutex<DynamicEndpointRegistry<E>>>;

const STACK_THREAD_NAME: &str = "matter-stack";
const STACK_SIZE: usize = 256 * 1024;

/// Handle to a running stack thread.
#[derive(Debug)]
pub struct StackHandle {
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

impl StackHandle {
    /// Stop the stack after it flushed queued reports, and wait for it.
    pub fn shutdown(self) {
        self.cancel.cancel();
        if self.thread.join().is_err() {
            error!("Stack thread panicked");
        }
    }
}

/// Start the stack thread delivering queued reports to `sink` until `cancel`
/// fires.
pub fn run_bridge_stack(
    queue: ReportQueue,
    sink: Arc<dyn AttributeChangeSink>,
    cancel: CancellationToken,
) -> io::Result<StackHandle> {
    let token = cancel.clone();
    let thread = std::thread::Builder::new()
        .name(STACK_THREAD_NAME.into())
        .stack_size(STACK_SIZE)
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start stack runtime: {}", e);
                    return;
                }
            };
            info!("Stack thread running");
            runtime.block_on(queue.run(&*sink, token));
            info!("Stack thread stopped");
        })?;

    Ok(StackHandle { cancel, thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::engine::RecordingSink;
    use crate::matter::reporting::ReportScheduler;
    use crate::matter::types::on_off;
    use std::time::{Duration, Instant};

    #[test]
    fn test_stack_thread_delivers_reports() {
        let (scheduler, queue) = ReportScheduler::channel(16);
        let sink = Arc::new(RecordingSink::default());
        let handle = run_bridge_stack(queue, sink.clone(), CancellationToken::new()).unwrap();

        scheduler.schedule_reporting(3, on_off::ID, on_off::ON_OFF);
        scheduler.schedule_reporting(4, on_off::ID, on_off::ON_OFF);

        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.reports().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.shutdown();

        let endpoints: Vec<_> = sink.reports().iter().map(|e| e.path.endpoint).collect();
        assert_eq!(endpoints, vec![3, 4]);
    }

    #[test]
    fn test_shutdown_stops_thread() {
        let (_scheduler, queue) = ReportScheduler::channel(4);
        let sink: Arc<dyn AttributeChangeSink> = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let handle = run_bridge_stack(queue, sink, cancel.clone()).unwrap();
        assert!(!cancel.is_cancelled());
        handle.shutdown();
        assert!(cancel.is_cancelled());
    }
}
