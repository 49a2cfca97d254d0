//! Capture cadence.
//!
//! `Pacer` keeps an absolute deadline on the monotonic clock and advances it by
//! one period per tick, so sleep jitter does not accumulate. When a tick
//! overruns, the next one starts straight away and the deadline is re-anchored
//! to "now": missed ticks are neither skipped nor made up.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ingest::{CameraStats, FrameSource};
use crate::recorder::{Recorder, RecorderStats, RecorderStatus};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline-based tick pacing.
#[derive(Clone, Debug)]
pub struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    pub fn from_fps(fps: u32, now: Instant) -> Result<Self> {
        if fps == 0 {
            return Err(anyhow!("frames per second must be > 0"));
        }
        Ok(Self::new(Duration::from_secs(1) / fps, now))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// How long to sleep before the next tick, given the current time. Moves
    /// the deadline forward for the tick after that.
    pub fn delay_until_next(&mut self, now: Instant) -> Duration {
        let delay = self.next.saturating_duration_since(now);
        if delay.is_zero() {
            // Overrun: start immediately, schedule from here.
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }
        delay
    }

    /// Sleep until the next deadline.
    pub fn wait(&mut self) {
        let delay = self.delay_until_next(Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// What the periodic health log reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureHealth {
    pub status: RecorderStatus,
    pub stats: RecorderStats,
    pub camera: Option<CameraStats>,
}

/// The capture loop: waits for each deadline and runs one recorder tick.
pub struct CaptureScheduler {
    recorder: Arc<Recorder>,
    source: Box<dyn FrameSource>,
    pacer: Pacer,
    stop: Arc<AtomicBool>,
}

impl CaptureScheduler {
    pub fn new(
        recorder: Arc<Recorder>,
        source: Box<dyn FrameSource>,
        fps: u32,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        Ok(Self {
            recorder,
            source,
            pacer: Pacer::from_fps(fps, Instant::now())?,
            stop,
        })
    }

    /// Run until the stop flag is raised. Returns the number of ticks run.
    pub fn run(&mut self) -> u64 {
        log::info!("capture loop running every {:?}", self.pacer.period());
        let mut ticks = 0u64;
        let mut last_health_log = Instant::now();

        while !self.stop.load(Ordering::Relaxed) {
            self.pacer.wait();
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            self.recorder.tick(self.source.as_mut());
            ticks += 1;

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health_log = Instant::now();
            }
        }

        log::info!("capture loop stopped after {} ticks", ticks);
        ticks
    }

    pub fn health(&self) -> CaptureHealth {
        CaptureHealth {
            status: self.recorder.status(),
            stats: self.recorder.stats(),
            camera: self.source.stats(),
        }
    }

    fn log_health(&self) {
        let CaptureHealth {
            status,
            stats,
            camera,
        } = self.health();
        log::info!(
            "capture health: ticks={} misses={} rolling={} (timer={}) singles={} dumps queued={} dropped={}",
            stats.ticks,
            stats.misses,
            stats.rolling_persists,
            status.save_timer,
            stats.single_saves,
            stats.dumps_queued,
            stats.dumps_dropped
        );
        log::debug!(
            "ring: {}/{} slots, ~{} KB, cursor={}",
            status.occupied,
            status.capacity,
            status.memory_bytes / 1024,
            status.cursor
        );
        if let Some(camera) = camera {
            if camera.healthy {
                log::info!(
                    "camera {}: {} frames captured",
                    camera.device,
                    camera.frames_captured
                );
            } else {
                log::warn!(
                    "camera {} unhealthy after {} frames",
                    camera.device,
                    camera.frames_captured
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryWorker;
    use crate::persist::{FrameCodec, OutputTemplate, Persister};
    use crate::recorder::RecorderConfig;
    use crate::transport::LogNotifier;
    use std::path::Path;

    #[test]
    fn pacer_rejects_zero_fps() {
        assert!(Pacer::from_fps(0, Instant::now()).is_err());
        let pacer = Pacer::from_fps(4, Instant::now()).unwrap();
        assert_eq!(pacer.period(), Duration::from_millis(250));
    }

    #[test]
    fn pacer_sleeps_only_the_remainder() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let mut pacer = Pacer::new(period, start);

        // Tick work took 30ms.
        let delay = pacer.delay_until_next(start + Duration::from_millis(30));
        assert_eq!(delay, Duration::from_millis(70));
        // Deadlines stay on the original grid.
        let delay = pacer.delay_until_next(start + Duration::from_millis(110));
        assert_eq!(delay, Duration::from_millis(90));
    }

    #[test]
    fn pacer_reanchors_after_overrun() {
        let start = Instant::now();
        let period = Duration::from_millis(100);
        let mut pacer = Pacer::new(period, start);

        // A tick ran 250ms late: no sleep, and no burst of catch-up ticks.
        let overrun = start + Duration::from_millis(350);
        assert_eq!(pacer.delay_until_next(overrun), Duration::ZERO);
        let delay = pacer.delay_until_next(overrun + Duration::from_millis(10));
        assert_eq!(delay, Duration::from_millis(90));
    }

    struct NullCodec;

    impl FrameCodec for NullCodec {
        fn write(&self, _bytes: &[u8], _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    /// Raises the stop flag after a fixed number of frames.
    struct CountingSource {
        remaining: u32,
        delivered: u64,
        stop: Arc<AtomicBool>,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.stop.store(true, Ordering::Relaxed);
            }
            self.delivered += 1;
            Ok(Some(vec![7; 32]))
        }

        fn stats(&self) -> Option<CameraStats> {
            Some(CameraStats {
                frames_captured: self.delivered,
                device: "stub://counting".to_string(),
                healthy: true,
            })
        }
    }

    #[test]
    fn scheduler_runs_until_stopped() {
        let persister = Persister::new(
            OutputTemplate::new("/tmp/sched/{ms}.jpg").unwrap(),
            Arc::new(NullCodec),
            8,
        );
        let history = HistoryWorker::spawn(persister.clone(), Duration::ZERO).unwrap();
        let recorder = Arc::new(
            Recorder::new(
                RecorderConfig {
                    history_size: 3,
                    save_period: 2,
                },
                persister,
                Arc::new(LogNotifier),
                history,
            )
            .unwrap(),
        );
        let stop = Arc::new(AtomicBool::new(false));
        let source = CountingSource {
            remaining: 5,
            delivered: 0,
            stop: stop.clone(),
        };

        let mut scheduler =
            CaptureScheduler::new(recorder.clone(), Box::new(source), 200, stop).unwrap();
        let ticks = scheduler.run();

        assert_eq!(ticks, 5);
        let health = scheduler.health();
        assert_eq!(health.status.cursor, 5 % 3);
        assert_eq!(health.stats.ticks, 5);
        let camera = health.camera.expect("camera stats");
        assert_eq!(camera.frames_captured, 5);
        assert!(camera.healthy);
    }
}
