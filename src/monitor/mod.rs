//! Service monitor - tracks requests in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::ReportingRequest;

/// Process-wide request lifecycle tracker.
///
/// `start` and `stop` for different requests may interleave arbitrarily.
pub trait ServiceMonitor: Send + Sync {
    fn start(&self, request_id: Uuid, request: &ReportingRequest);
    fn stop(&self, request_id: Uuid, request: &ReportingRequest);
}

#[derive(Debug)]
struct InFlight {
    cube: String,
    started: Instant,
}

/// Counters reported by [`InFlightMonitor::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorStats {
    pub in_flight: usize,
    pub started: u64,
    pub stopped: u64,
    /// Stops for requests that were never started or already stopped.
    pub unmatched_stops: u64,
}

/// Concurrent in-flight request table.
#[derive(Debug, Default)]
pub struct InFlightMonitor {
    in_flight: DashMap<Uuid, InFlight>,
    started: AtomicU64,
    stopped: AtomicU64,
    unmatched_stops: AtomicU64,
}

impl InFlightMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            in_flight: self.in_flight.len(),
            started: self.started.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            unmatched_stops: self.unmatched_stops.load(Ordering::Relaxed),
        }
    }

    /// Requests running longer than `threshold`, as (id, cube, elapsed).
    pub fn long_running(&self, threshold: Duration) -> Vec<(Uuid, String, Duration)> {
        self.in_flight
            .iter()
            .filter_map(|entry| {
                let elapsed = entry.started.elapsed();
                (elapsed >= threshold).then(|| (*entry.key(), entry.cube.clone(), elapsed))
            })
            .collect()
    }
}

impl ServiceMonitor for InFlightMonitor {
    fn start(&self, request_id: Uuid, request: &ReportingRequest) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.in_flight.insert(
            request_id,
            InFlight {
                cube: request.cube.clone(),
                started: Instant::now(),
            },
        );
        debug!(%request_id, cube = %request.cube, "Request started");
    }

    fn stop(&self, request_id: Uuid, request: &ReportingRequest) {
        match self.in_flight.remove(&request_id) {
            Some((_, in_flight)) => {
                self.stopped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    %request_id,
                    cube = %in_flight.cube,
                    elapsed_ms = in_flight.started.elapsed().as_millis() as u64,
                    "Request stopped"
                );
            }
            None => {
                self.unmatched_stops.fetch_add(1, Ordering::Relaxed);
                warn!(%request_id, cube = %request.cube, "Stop for request not in flight");
            }
        }
    }
}
