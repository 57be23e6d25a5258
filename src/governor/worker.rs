//! Background thread for the O(n²) charge computation.
//!
//! The main loop posts node positions over a bounded channel and picks up
//! the velocity deltas on a later tick. Messages carry a schema version so a
//! mismatched peer is ignored instead of misread. Results are advisory: the
//! simulation computes charge inline whenever no fresh response is ready.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use tracing::{debug, warn};

use crate::simulation::forces::compute_charge_deltas;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRequest {
    pub version: u32,
    pub request_id: u64,
    pub positions: Vec<[f32; 2]>,
    pub strength: f32,
    pub distance_max: f32,
    pub alpha: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResponse {
    pub version: u32,
    pub request_id: u64,
    pub deltas: Vec<[f32; 2]>,
}

enum WorkerMessage {
    Compute(WorkerRequest),
    Shutdown,
}

/// Handle to the force worker thread.
pub struct ForceWorker {
    requests: Sender<WorkerMessage>,
    responses: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
    next_request: u64,
    /// Id and node count of the request awaiting a response.
    in_flight: Option<(u64, usize)>,
}

impl ForceWorker {
    /// Start the worker thread. Fails where threads are unavailable
    /// (`wasm32-unknown-unknown`) or the OS refuses the spawn.
    pub fn spawn() -> std::io::Result<Self> {
        let (request_tx, request_rx) = bounded::<WorkerMessage>(1);
        let (response_tx, response_rx) = bounded::<WorkerResponse>(1);

        let handle = thread::Builder::new()
            .name("taskgraph-force-worker".into())
            .spawn(move || run(request_rx, response_tx))?;

        debug!("force worker started");
        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            handle: Some(handle),
            next_request: 0,
            in_flight: None,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Post positions for a charge computation. Returns `false` if a request
    /// is still outstanding or the worker is gone.
    pub fn submit(&mut self, positions: Vec<[f32; 2]>, strength: f32, distance_max: f32, alpha: f32) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.next_request += 1;
        let count = positions.len();
        let request = WorkerRequest {
            version: SCHEMA_VERSION,
            request_id: self.next_request,
            positions,
            strength,
            distance_max,
            alpha,
        };
        match self.requests.try_send(WorkerMessage::Compute(request)) {
            Ok(()) => {
                self.in_flight = Some((self.next_request, count));
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                warn!("force worker disconnected");
                false
            }
        }
    }

    /// Take the response to the outstanding request, if it has arrived and
    /// still matches `node_count`.
    pub fn poll(&mut self, node_count: usize) -> Option<Vec<[f32; 2]>> {
        let (expected, count) = self.in_flight?;
        match self.responses.try_recv() {
            Ok(response) => {
                self.in_flight = None;
                let valid = response.version == SCHEMA_VERSION
                    && response.request_id == expected
                    && count == node_count
                    && response.deltas.len() == node_count;
                if !valid {
                    debug!(request_id = response.request_id, "discarding stale worker response");
                    return None;
                }
                Some(response.deltas)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = None;
                None
            }
        }
    }

    /// Block until the outstanding response arrives. Test helper for
    /// deterministic offload runs.
    #[cfg(test)]
    pub fn wait(&mut self, node_count: usize) -> Option<Vec<[f32; 2]>> {
        let (expected, _) = self.in_flight?;
        let response = self.responses.recv().ok()?;
        self.in_flight = None;
        (response.request_id == expected && response.deltas.len() == node_count).then_some(response.deltas)
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // drain a pending response so the worker is not blocked on send
        let _ = self.responses.try_recv();
        let _ = self.requests.send(WorkerMessage::Shutdown);
        if handle.join().is_err() {
            warn!("force worker panicked");
        }
        self.in_flight = None;
        debug!("force worker stopped");
    }
}

impl Drop for ForceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(requests: Receiver<WorkerMessage>, responses: Sender<WorkerResponse>) {
    while let Ok(message) = requests.recv() {
        let request = match message {
            WorkerMessage::Compute(request) => request,
            WorkerMessage::Shutdown => break,
        };
        if request.version != SCHEMA_VERSION {
            continue;
        }
        let deltas = compute_charge_deltas(&request.positions, request.strength, request.distance_max, request.alpha);
        let response = WorkerResponse {
            version: SCHEMA_VERSION,
            request_id: request.request_id,
            deltas,
        };
        if responses.send(response).is_err() {
            break;
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn test_worker_matches_inline_charge() {
        let mut worker = ForceWorker::spawn().unwrap();
        let positions = vec![[0.0, 0.0], [30.0, 0.0], [0.0, 40.0]];
        assert!(worker.submit(positions.clone(), -800.0, 1200.0, 0.5));
        assert!(worker.is_busy());
        // only one request in flight
        assert!(!worker.submit(positions.clone(), -800.0, 1200.0, 0.5));

        let deltas = worker.wait(3).unwrap();
        assert_eq!(deltas, compute_charge_deltas(&positions, -800.0, 1200.0, 0.5));
        assert!(!worker.is_busy());
        worker.shutdown();
    }

    #[test]
    fn test_response_for_other_node_count_is_dropped() {
        let mut worker = ForceWorker::spawn().unwrap();
        assert!(worker.submit(vec![[0.0, 0.0], [1.0, 1.0]], -10.0, 100.0, 1.0));
        // give the worker time to answer, then poll with a changed node count
        let mut result = None;
        for _ in 0..1000 {
            if !worker.is_busy() {
                break;
            }
            result = worker.poll(5);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(result.is_none());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut worker = ForceWorker::spawn().unwrap();
        worker.shutdown();
        worker.shutdown();
        assert!(!worker.submit(vec![[0.0, 0.0]], -10.0, 100.0, 1.0));
    }
}
