//! Tracker Task Implementation
//!
//! The tracker is the single consumer of the ingest queue. For every line
//! it decodes the measurement, normalizes the timestamp, runs the
//! configured estimator, bounds the displacement against the motion
//! limit, and appends the resulting position to the trajectory sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use ranloc_common::{AnchorRegistry, Error, EstimateQuality, Measurement, PositionEstimate};
use ranloc_position::{MotionLimiter, PositionEstimator};

use crate::ingest::{codec, IngestQueue};
use crate::sink::TrajectorySink;
use crate::tasks::{EngineTaskBase, Task, TaskMessage, TrackerMessage, TrackerStats};
use crate::tracker::state::{build_estimator, EntityState, TimestampNormalizer};

/// Queue poll timeout; bounds shutdown latency.
const QUEUE_POLL_TIMEOUT_MS: u64 = 100;

/// Emit a status line every this many processed measurements.
const STATUS_INTERVAL: u64 = 50;

/// Tracker task consuming measurement lines and producing trajectories.
pub struct TrackerTask {
    /// Bounded line queue shared with the ingest task
    queue: Arc<IngestQueue>,
    /// Trajectory output, flushed periodically and on shutdown
    sink: TrajectorySink,
    /// Configured estimator
    estimator: Box<dyn PositionEstimator>,
    /// Known deployment anchors; empty disables the unknown-anchor check
    registry: AnchorRegistry,
    /// Timestamp normalization shared by all entities
    normalizer: TimestampNormalizer,
    /// Motion-constrained smoother
    limiter: MotionLimiter,
    /// Per-entity state keyed by entity id
    entities: HashMap<u64, EntityState>,
    /// Counters reported via `GetStats`
    stats: TrackerStats,
    /// Task start time, for the processing-rate status line
    started: Instant,
    /// Processed count at the last status line
    last_status: u64,
}

impl TrackerTask {
    /// Creates a new tracker task. Fails when the configured estimator
    /// cannot be constructed (e.g. an unreadable category-map file).
    pub fn new(
        task_base: &EngineTaskBase,
        queue: Arc<IngestQueue>,
        sink: TrajectorySink,
    ) -> Result<Self, Error> {
        let estimator = build_estimator(&task_base.config)?;
        Ok(Self {
            queue,
            sink,
            estimator,
            registry: AnchorRegistry::from_anchors(&task_base.config.anchors),
            normalizer: TimestampNormalizer::new(&task_base.config.timestamps),
            limiter: MotionLimiter::new(&task_base.config.motion),
            entities: HashMap::new(),
            stats: TrackerStats::default(),
            started: Instant::now(),
            last_status: 0,
        })
    }

    /// Processes one raw line end to end. Only a sink failure is fatal;
    /// anything else is counted and skipped.
    fn handle_line(&mut self, line: &str) -> Result<(), Error> {
        self.stats.received += 1;

        let measurement = match codec::decode(line) {
            Ok(measurement) => measurement,
            Err(e) => {
                self.stats.parse_errors += 1;
                warn!("Skipping malformed line: {}", e);
                return Ok(());
            }
        };
        self.stats.processed += 1;
        self.note_unknown_anchors(&measurement);

        let normalized_ts = self.normalizer.normalize(measurement.timestamp_ms);
        let entry = self.entities.entry(measurement.entity_id).or_default();

        let Some(features) =
            self.estimator
                .extract_features(&measurement, normalized_ts, &mut entry.context)
        else {
            debug!("Entity {}: no features yet", measurement.entity_id);
            return Ok(());
        };
        let Some(output) = self.estimator.predict(&features) else {
            debug!("Entity {}: predictor declined", measurement.entity_id);
            return Ok(());
        };

        match output.quality {
            EstimateQuality::DistanceFallback => self.stats.inversion_fallbacks += 1,
            EstimateQuality::SolverFallback => self.stats.solver_fallbacks += 1,
            EstimateQuality::Converged => {}
        }

        let (position, limited) = self.limiter.limit(output.position, entry.last_position);
        if limited {
            self.stats.motion_limited += 1;
            debug!(
                "Entity {}: displacement clamped to the motion bound",
                measurement.entity_id
            );
        }
        let estimate = PositionEstimate {
            timestamp_ms: measurement.timestamp_ms,
            entity_id: measurement.entity_id,
            x: position.x,
            y: position.y,
            quality: output.quality,
        };
        // The stored last-position is always the persisted output.
        entry.last_position = Some(estimate.position());
        entry.estimates += 1;

        self.sink.write_row(&estimate)?;
        self.stats.estimated += 1;
        Ok(())
    }

    /// Counts observations naming anchors outside the configured
    /// deployment. Advisory only; the estimate still proceeds.
    fn note_unknown_anchors(&mut self, measurement: &Measurement) {
        if self.registry.is_empty() {
            return;
        }
        for observation in measurement.observations() {
            if let Some(id) = observation.anchor_id {
                if !self.registry.contains(id) {
                    self.stats.unknown_anchors += 1;
                    debug!("Observation names unknown anchor {}", id);
                }
            }
        }
    }

    fn maybe_log_status(&mut self) {
        if self.stats.processed < self.last_status + STATUS_INTERVAL {
            return;
        }
        self.last_status = self.stats.processed;

        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.stats.processed as f64 / elapsed
        } else {
            0.0
        };
        let success = 100.0 * self.stats.estimated as f64 / self.stats.processed as f64;
        let ready_windows = self
            .entities
            .values()
            .filter(|e| e.context.window_ready())
            .count();
        info!(
            "Processed {} measurements ({:.1}/s), estimated {} ({:.1}%), {} entities ({} ready windows), {} parse errors, {} queue drops",
            self.stats.processed,
            rate,
            self.stats.estimated,
            success,
            self.entities.len(),
            ready_windows,
            self.stats.parse_errors,
            self.queue.stats().dropped
        );
    }
}

#[async_trait::async_trait]
impl Task for TrackerTask {
    type Message = TrackerMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!(
            "Tracker task starting: {} estimator, {} configured anchors",
            self.estimator.name(),
            self.registry.len()
        );

        let queue = Arc::clone(&self.queue);
        let poll = Duration::from_millis(QUEUE_POLL_TIMEOUT_MS);
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    match msg {
                        TaskMessage::Message(TrackerMessage::GetStats { response_tx }) => {
                            let _ = response_tx.send(self.stats);
                        }
                        TaskMessage::Shutdown => {
                            info!("Tracker task received shutdown signal");
                            break;
                        }
                    }
                }

                line = queue.pop_timeout(poll) => {
                    if let Some(line) = line {
                        if let Err(e) = self.handle_line(&line) {
                            error!("Tracker stopping on sink failure: {}", e);
                            break;
                        }
                        self.maybe_log_status();
                    }
                }
            }
        }

        if let Err(e) = self.sink.close() {
            error!("Failed to flush trajectory sink: {}", e);
        }
        info!(
            "Tracker task stopped: {} received, {} processed, {} estimated, {} entities",
            self.stats.received,
            self.stats.processed,
            self.stats.estimated,
            self.entities.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::DEFAULT_CHANNEL_CAPACITY;
    use ranloc_common::{Anchor, EngineConfig, EstimatorKind, Point2};

    /// Four anchors on a 100 m square, all SINRs below the decodable
    /// range: every inversion falls back to the default distance and the
    /// solve lands on the square's center (50, 50).
    const CENTER_LINE: &str = "0,1,10,0,0,-85,11,100,0,-70,12,0,100,-70,13,100,100,-90";

    fn tracker_in(dir: &tempfile::TempDir, mut config: EngineConfig) -> TrackerTask {
        config.sink.path = dir.path().join("out.csv");
        let queue = Arc::new(IngestQueue::new(config.ingest.queue_capacity));
        let sink = TrajectorySink::create(&config.sink).unwrap();
        let (task_base, _ingest_rx, _tracker_rx) =
            EngineTaskBase::new(config, DEFAULT_CHANNEL_CAPACITY);
        TrackerTask::new(&task_base, queue, sink).unwrap()
    }

    #[test]
    fn test_line_flows_to_estimate_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_in(&dir, EngineConfig::default());

        tracker.handle_line(CENTER_LINE).unwrap();

        assert_eq!(tracker.stats.received, 1);
        assert_eq!(tracker.stats.processed, 1);
        assert_eq!(tracker.stats.estimated, 1);
        assert_eq!(tracker.stats.inversion_fallbacks, 1);
        assert_eq!(tracker.stats.solver_fallbacks, 0);
        assert_eq!(tracker.stats.motion_limited, 0);
        assert_eq!(tracker.sink.rows_written(), 1);

        let position = tracker.entities[&1].last_position.unwrap();
        assert!(position.distance_to(&Point2::new(50.0, 50.0)) < 1e-6);
    }

    #[test]
    fn test_malformed_lines_are_counted_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_in(&dir, EngineConfig::default());

        tracker.handle_line("not,a,measurement").unwrap();
        tracker.handle_line("").unwrap();

        assert_eq!(tracker.stats.received, 2);
        assert_eq!(tracker.stats.parse_errors, 2);
        assert_eq!(tracker.stats.processed, 0);
        assert_eq!(tracker.stats.estimated, 0);
        assert_eq!(tracker.sink.rows_written(), 0);
        assert!(tracker.entities.is_empty());
    }

    #[test]
    fn test_unknown_anchors_counted_but_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.anchors = vec![Anchor::new(2, 800.0, 800.0), Anchor::new(3, 1300.0, 800.0)];
        let mut tracker = tracker_in(&dir, config);

        tracker.handle_line(CENTER_LINE).unwrap();

        // All four observation ids (10-13) fall outside the registry.
        assert_eq!(tracker.stats.unknown_anchors, 4);
        assert_eq!(tracker.stats.estimated, 1);
    }

    #[test]
    fn test_motion_bound_clamps_consecutive_estimates() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = tracker_in(&dir, EngineConfig::default());

        tracker.handle_line(CENTER_LINE).unwrap();
        // Same shape translated to (1000, 1000): the raw estimate jumps
        // ~1414 m while the default bound allows 5 m/s * 0.1 s = 0.5 m.
        tracker
            .handle_line("100,1,20,1000,1000,-85,21,1100,1000,-70,22,1000,1100,-70,23,1100,1100,-90")
            .unwrap();

        assert_eq!(tracker.stats.motion_limited, 1);
        assert_eq!(tracker.stats.estimated, 2);

        let position = tracker.entities[&1].last_position.unwrap();
        let step = position.distance_to(&Point2::new(50.0, 50.0));
        assert!((step - 0.5).abs() < 1e-9);
        // Clamping preserves direction: equal x and y displacement here.
        assert!((position.x - position.y).abs() < 1e-9);
    }

    #[test]
    fn test_sequence_estimator_holds_until_window_fills() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.estimator.kind = EstimatorKind::SequenceModel;
        config.estimator.window.lookback = 3;
        let mut tracker = tracker_in(&dir, config);

        tracker.handle_line("0,1,800,800,25,20,18,15").unwrap();
        tracker.handle_line("100,1,800,800,25,20,18,15").unwrap();
        assert_eq!(tracker.stats.estimated, 0);

        tracker.handle_line("200,1,800,800,25,20,18,15").unwrap();
        assert_eq!(tracker.stats.processed, 3);
        assert_eq!(tracker.stats.estimated, 1);

        let position = tracker.entities[&1].last_position.unwrap();
        assert!(position.distance_to(&Point2::new(800.0, 800.0)) < 1e-9);
    }

    #[tokio::test]
    async fn test_run_loop_reports_stats_and_flushes_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.sink.path = dir.path().join("out.csv");
        let sink_path = config.sink.path.clone();
        let queue = Arc::new(IngestQueue::new(16));
        let sink = TrajectorySink::create(&config.sink).unwrap();
        let (task_base, _ingest_rx, tracker_rx) =
            EngineTaskBase::new(config, DEFAULT_CHANNEL_CAPACITY);
        let mut task = TrackerTask::new(&task_base, queue.clone(), sink).unwrap();
        let handle = tokio::spawn(async move { task.run(tracker_rx).await });

        queue.push(CENTER_LINE.to_string());

        let mut processed = 0;
        for _ in 0..100 {
            let (stats_tx, stats_rx) = tokio::sync::oneshot::channel();
            task_base
                .tracker_tx
                .send(TrackerMessage::GetStats {
                    response_tx: stats_tx,
                })
                .await
                .unwrap();
            processed = stats_rx.await.unwrap().processed;
            if processed >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(processed, 1);

        task_base.tracker_tx.shutdown().await.unwrap();
        handle.await.unwrap();

        let contents = std::fs::read_to_string(sink_path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("timestamp,imsi,x,y"));
        assert_eq!(lines.next(), Some("0,1,50.000000,50.000000"));
        assert_eq!(lines.next(), None);
    }
}
