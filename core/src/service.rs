//! Single-threaded estimator update loop
//!
//! Sensor adapters push typed [`SensorEvent`]s into a bounded channel; one update thread owns
//! the [`KalmanEstimator`] and applies events in arrival order. The loop waits at most
//! `select_timeout_ms` for the next event so it notices a shutdown request even when no sensor
//! is talking. Pose consumers read the shared [`PoseHistory`] directly and never wait on the
//! loop; reporting consumers read the latest [`EstimatorSnapshot`], which is republished after
//! every event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, Result};
use crate::history::PoseHistory;
use crate::kalman::{EstimatorSnapshot, KalmanEstimator};
use crate::{AttitudeSample, GeodeticOrigin, PositionFix};

/// Poll interval while shutdown waits for queued events.
const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Everything a sensor adapter can hand the estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorEvent {
    /// AHRS/FOG attitude sample; drives the predictor
    Attitude(AttitudeSample),
    /// GPS position/velocity fix; drives the corrector
    Fix(PositionFix),
    /// New geodetic basepoint for the NED frame
    Origin(GeodeticOrigin),
    /// Zero the state and restore the configured covariance
    Reset,
}
impl SensorEvent {
    pub fn timestamp_ns(&self) -> Option<u64> {
        match self {
            SensorEvent::Attitude(sample) => Some(sample.timestamp_ns),
            SensorEvent::Fix(fix) => Some(fix.timestamp_ns),
            SensorEvent::Origin(_) | SensorEvent::Reset => None,
        }
    }
}

/// Apply one event to the estimator.
pub fn apply_event(estimator: &mut KalmanEstimator, event: &SensorEvent) -> Result<()> {
    match event {
        SensorEvent::Attitude(sample) => estimator.predictor(sample),
        SensorEvent::Fix(fix) => estimator.corrector(fix),
        SensorEvent::Origin(origin) => estimator.set_origin(*origin),
        SensorEvent::Reset => {
            estimator.reset();
            Ok(())
        }
    }
}

/// Drain `events` into `estimator` until the channel disconnects or `stop` is raised.
///
/// Rejected events are logged by the estimator and skipped. After each event the latest
/// snapshot is stored in `snapshot`. Returns the number of events that were applied.
pub fn run(
    estimator: &mut KalmanEstimator,
    events: &Receiver<SensorEvent>,
    snapshot: &Mutex<Option<EstimatorSnapshot>>,
    stop: &AtomicBool,
    timeout: Duration,
) -> usize {
    let mut applied = 0;
    while !stop.load(Ordering::Acquire) {
        match events.recv_timeout(timeout) {
            Ok(event) => {
                match apply_event(estimator, &event) {
                    Ok(()) => applied += 1,
                    Err(err) => debug!("event {event:?} skipped: {err}"),
                }
                let latest = estimator.snapshot();
                *snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(latest);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    applied
}

/// Owns the update thread and the producer side of its channel.
pub struct EstimatorService {
    sender: Option<Sender<SensorEvent>>,
    history: Arc<PoseHistory>,
    snapshot: Arc<Mutex<Option<EstimatorSnapshot>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<KalmanEstimator>>,
}
impl EstimatorService {
    /// Build an estimator from `config` and start its update thread.
    pub fn spawn(config: EstimatorConfig) -> Result<Self> {
        let estimator = KalmanEstimator::new(config)?;
        Self::spawn_with(estimator)
    }

    /// Start the update thread around an existing estimator.
    pub fn spawn_with(mut estimator: KalmanEstimator) -> Result<Self> {
        let timeout = Duration::from_millis(estimator.config().select_timeout_ms);
        let (sender, receiver) = channel::bounded(estimator.config().channel_capacity);
        let history = estimator.history();
        let snapshot = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let snapshot = Arc::clone(&snapshot);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("gpsins-estimator".to_string())
                .spawn(move || {
                    info!("estimator loop started");
                    let applied = run(&mut estimator, &receiver, &snapshot, &stop, timeout);
                    info!("estimator loop stopped after {applied} events");
                    estimator
                })
                .map_err(EstimatorError::Io)?
        };

        Ok(EstimatorService {
            sender: Some(sender),
            history,
            snapshot,
            stop,
            handle: Some(handle),
        })
    }

    /// A producer handle for a sensor adapter.
    pub fn sender(&self) -> Option<Sender<SensorEvent>> {
        self.sender.clone()
    }

    /// Queue an event, blocking while the channel is full. Returns `false` once the loop has
    /// shut down.
    pub fn send(&self, event: SensorEvent) -> bool {
        match &self.sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    pub fn history(&self) -> Arc<PoseHistory> {
        Arc::clone(&self.history)
    }

    /// Latest published snapshot, if any event has been processed.
    pub fn snapshot(&self) -> Option<EstimatorSnapshot> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Let the loop drain what is already queued, stop it and hand back the estimator.
    ///
    /// Producer handles obtained from [`EstimatorService::sender`] that are still alive do not
    /// keep the loop running past the next timeout.
    pub fn shutdown(mut self) -> Option<KalmanEstimator> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Option<KalmanEstimator> {
        let sender = self.sender.take()?;
        // Wait for the queue to drain before raising the flag.
        while !sender.is_empty() {
            if self.handle.as_ref().is_none_or(|h| h.is_finished()) {
                break;
            }
            thread::sleep(DRAIN_POLL);
        }
        drop(sender);
        self.stop.store(true, Ordering::Release);
        match self.handle.take()?.join() {
            Ok(estimator) => Some(estimator),
            Err(_) => {
                warn!("estimator thread panicked");
                None
            }
        }
    }
}
impl Drop for EstimatorService {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
