//! Shared capture context.
//!
//! `Recorder` is the one place the ring, the write cursor and the rolling-save
//! state live. All three sit behind a single mutex:
//!
//! - the capture scheduler calls [`Recorder::tick`] once per period;
//! - trigger handlers call [`Recorder::start_or_extend_rolling`] and
//!   [`Recorder::save_most_recent`] from their own threads;
//! - the history worker only ever receives copies taken under the lock.
//!
//! The device read happens before the lock is taken, so a slow camera never
//! stalls a trigger handler. Per-tick and single-frame writes happen while the
//! lock is held, so one encode+write can delay a tick. Bulk dumps never hold
//! it. Notifications are published after the lock is released.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::frame::{Frame, SnapshotRing};
use crate::history::{DumpReport, DumpTicket, HistoryWorker};
use crate::ingest::FrameSource;
use crate::persist::Persister;
use crate::transport::{Notification, Notifier, Trigger};
use crate::CaptureTime;

/// Ring capacity and rolling window length, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecorderConfig {
    pub history_size: usize,
    pub save_period: u32,
}

struct RecorderState {
    ring: SnapshotRing,
    cursor: usize,
    /// Remaining per-tick persists. Zero means idle.
    save_timer: u32,
    window_start: Option<CaptureTime>,
    pending_dump: Option<DumpTicket>,
}

/// What a rolling trigger did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollingTrigger {
    /// The recorder was idle: a window opened and a history dump was queued
    /// (`dump_queued` is false only if the history worker has stopped).
    Opened {
        window_start: CaptureTime,
        dump_queued: bool,
    },
    /// A window was already running; only its countdown was reset.
    Extended { window_start: CaptureTime },
}

/// What one capture tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Slot the frame (or absent marker) was written to.
    pub index: usize,
    pub captured_at: Option<CaptureTime>,
    pub rolling_persisted: bool,
    pub completed: Option<Notification>,
}

/// Point-in-time view of the shared state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecorderStatus {
    pub cursor: usize,
    pub capacity: usize,
    pub occupied: usize,
    pub memory_bytes: usize,
    pub save_timer: u32,
    pub window_start: Option<CaptureTime>,
}

impl RecorderStatus {
    pub fn is_rolling(&self) -> bool {
        self.save_timer > 0
    }
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    misses: AtomicU64,
    rolling_persists: AtomicU64,
    single_saves: AtomicU64,
    windows_opened: AtomicU64,
    windows_extended: AtomicU64,
    windows_completed: AtomicU64,
    dumps_queued: AtomicU64,
    dumps_dropped: AtomicU64,
}

/// Counter snapshot for health logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub ticks: u64,
    pub misses: u64,
    pub rolling_persists: u64,
    pub single_saves: u64,
    pub windows_opened: u64,
    pub windows_extended: u64,
    pub windows_completed: u64,
    pub dumps_queued: u64,
    pub dumps_dropped: u64,
}

pub struct Recorder {
    state: Mutex<RecorderState>,
    save_period: u32,
    persister: Persister,
    notifier: Arc<dyn Notifier>,
    history: HistoryWorker,
    counters: Counters,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        persister: Persister,
        notifier: Arc<dyn Notifier>,
        history: HistoryWorker,
    ) -> Result<Self> {
        if config.save_period == 0 {
            anyhow::bail!("save period must be > 0");
        }
        let ring = SnapshotRing::new(config.history_size)?;
        Ok(Self {
            state: Mutex::new(RecorderState {
                ring,
                cursor: 0,
                save_timer: 0,
                window_start: None,
                pending_dump: None,
            }),
            save_period: config.save_period,
            persister,
            notifier,
            history,
            counters: Counters::default(),
        })
    }

    // A panic in another holder leaves the ring consistent (every write is a
    // single slot assignment), so a poisoned lock is still usable.
    fn lock_state(&self) -> MutexGuard<'_, RecorderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One capture tick: pull a frame, store it at the cursor, run the rolling
    /// window step, advance the cursor.
    ///
    /// Only the capture scheduler calls this, so reading the device outside
    /// the lock cannot reorder frames.
    pub fn tick(&self, source: &mut dyn FrameSource) -> TickReport {
        let frame = match source.next_frame() {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(Frame::new(bytes, CaptureTime::now())),
            Ok(Some(_)) => {
                log::warn!("capture miss: device returned an empty frame");
                None
            }
            Ok(None) => {
                log::warn!("capture miss: device returned no frame");
                None
            }
            Err(e) => {
                log::warn!("capture miss: {:#}", e);
                None
            }
        };

        let (report, completed) = {
            let mut state = self.lock_state();
            let index = state.cursor;
            let captured_at = frame.as_ref().map(|f| f.captured_at);
            if frame.is_none() {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            state.ring.put(index, frame);

            let (rolling_persisted, completed) = self.rolling_step(&mut state);

            let size = state.ring.size();
            state.cursor = (index + 1) % size;
            self.counters.ticks.fetch_add(1, Ordering::Relaxed);

            (
                TickReport {
                    index,
                    captured_at,
                    rolling_persisted,
                    completed: completed.clone(),
                },
                completed,
            )
        };

        if let Some(notification) = completed {
            self.publish(&notification);
        }
        report
    }

    /// Per-tick save coordinator step. Runs with the state lock held, after the
    /// new frame is in place and before the cursor moves.
    fn rolling_step(&self, state: &mut RecorderState) -> (bool, Option<Notification>) {
        if state.save_timer == 0 {
            return (false, None);
        }

        log::debug!("rolling save: {} ticks left", state.save_timer);
        let index = state.cursor;
        let persisted_at = self.persister.persist(state.ring.get(index));
        state.save_timer -= 1;
        self.counters.rolling_persists.fetch_add(1, Ordering::Relaxed);

        if state.save_timer > 0 {
            return (true, None);
        }

        let window_start = state.window_start.take().unwrap_or(persisted_at);
        self.counters.windows_completed.fetch_add(1, Ordering::Relaxed);

        // The completion signal follows the countdown alone. Say so when the
        // bulk dump behind this window has not reported yet.
        if let Some(mut ticket) = state.pending_dump.take() {
            if ticket.poll().is_none() {
                log::warn!(
                    "rolling window {} closed before its history dump finished",
                    window_start
                );
            }
        }

        log::info!("rolling window {} -> {} complete", window_start, persisted_at);
        (
            true,
            Some(Notification::RollingComplete {
                window_start,
                window_end: persisted_at,
            }),
        )
    }

    /// Open a rolling window, or extend the running one.
    ///
    /// Opening stamps the window start and hands a copy of the whole ring to
    /// the history worker. Extending only resets the countdown.
    pub fn start_or_extend_rolling(&self) -> RollingTrigger {
        let mut state = self.lock_state();

        if state.save_timer > 0 {
            state.save_timer = self.save_period;
            self.counters.windows_extended.fetch_add(1, Ordering::Relaxed);
            let window_start = state.window_start.unwrap_or_else(CaptureTime::now);
            log::info!(
                "rolling window {} extended ({} ticks)",
                window_start,
                self.save_period
            );
            return RollingTrigger::Extended { window_start };
        }

        let size = state.ring.size();
        let latest = (state.cursor + size - 1) % size;
        let window_start = state
            .ring
            .get(latest)
            .map(|f| f.captured_at)
            .unwrap_or_else(CaptureTime::now);
        state.window_start = Some(window_start);
        state.save_timer = self.save_period;
        self.counters.windows_opened.fetch_add(1, Ordering::Relaxed);

        let snapshot = state.ring.snapshot_from(state.cursor);
        let ticket = self.history.submit(snapshot, window_start);
        let dump_queued = ticket.is_some();
        if dump_queued {
            self.counters.dumps_queued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.dumps_dropped.fetch_add(1, Ordering::Relaxed);
        }
        state.pending_dump = ticket;

        log::info!(
            "rolling window {} opened ({} ticks, history dump {})",
            window_start,
            self.save_period,
            if dump_queued { "queued" } else { "dropped" }
        );
        RollingTrigger::Opened {
            window_start,
            dump_queued,
        }
    }

    /// Persist the most recently captured frame and announce it. Rolling
    /// state is left untouched.
    pub fn save_most_recent(&self) -> Notification {
        let notification = {
            let state = self.lock_state();
            let size = state.ring.size();
            let index = (state.cursor + size - 1) % size;
            log::info!("saving single picture from slot {}", index);
            let timestamp = self.persister.persist(state.ring.get(index));
            Notification::Picture {
                path: self.persister.template().render(timestamp),
                timestamp,
            }
        };
        self.counters.single_saves.fetch_add(1, Ordering::Relaxed);
        self.publish(&notification);
        notification
    }

    /// Entry point for bus triggers.
    pub fn handle(&self, trigger: Trigger) {
        match trigger {
            Trigger::Rolling => {
                self.start_or_extend_rolling();
            }
            Trigger::Capture => {
                self.save_most_recent();
            }
        }
    }

    /// Wait up to `timeout` for the dump of the current or last window.
    /// Returns `None` if there is none or it did not finish in time.
    pub fn wait_for_history(&self, timeout: Duration) -> Option<DumpReport> {
        let ticket = self.lock_state().pending_dump.take()?;
        ticket.wait(timeout)
    }

    pub fn status(&self) -> RecorderStatus {
        let state = self.lock_state();
        RecorderStatus {
            cursor: state.cursor,
            capacity: state.ring.size(),
            occupied: state.ring.occupied(),
            memory_bytes: state.ring.memory_bytes(),
            save_timer: state.save_timer,
            window_start: state.window_start,
        }
    }

    /// Copy of one slot, for inspection.
    pub fn frame_at(&self, index: usize) -> Option<Frame> {
        self.lock_state().ring.get(index).cloned()
    }

    pub fn stats(&self) -> RecorderStats {
        let c = &self.counters;
        RecorderStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            rolling_persists: c.rolling_persists.load(Ordering::Relaxed),
            single_saves: c.single_saves.load(Ordering::Relaxed),
            windows_opened: c.windows_opened.load(Ordering::Relaxed),
            windows_extended: c.windows_extended.load(Ordering::Relaxed),
            windows_completed: c.windows_completed.load(Ordering::Relaxed),
            dumps_queued: c.dumps_queued.load(Ordering::Relaxed),
            dumps_dropped: c.dumps_dropped.load(Ordering::Relaxed),
        }
    }

    fn publish(&self, notification: &Notification) {
        if let Err(e) = self.notifier.notify(notification) {
            log::warn!("failed to publish {}: {:#}", notification, e);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{FrameCodec, OutputTemplate};
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Condvar;

    #[derive(Default)]
    struct RecordingCodec {
        written: Mutex<Vec<PathBuf>>,
    }

    impl FrameCodec for RecordingCodec {
        fn write(&self, _bytes: &[u8], path: &Path) -> Result<()> {
            self.written.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    /// Hands out scripted results, then a steady stream of 64-byte frames.
    struct ScriptedSource {
        script: VecDeque<Result<Option<Vec<u8>>>>,
        counter: u8,
    }

    impl ScriptedSource {
        fn steady() -> Self {
            Self::scripted(Vec::new())
        }

        fn scripted(script: Vec<Result<Option<Vec<u8>>>>) -> Self {
            Self {
                script: script.into(),
                counter: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
            if let Some(next) = self.script.pop_front() {
                return next;
            }
            self.counter = self.counter.wrapping_add(1);
            Ok(Some(vec![self.counter; 64]))
        }
    }

    /// Holds every write made on the history worker thread until released.
    /// Per-tick and single-frame writes pass straight through.
    #[derive(Default)]
    struct DumpGate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl DumpGate {
        fn release(&self) {
            *self.open.lock().unwrap() = true;
            self.cv.notify_all();
        }
    }

    impl FrameCodec for DumpGate {
        fn write(&self, _bytes: &[u8], _path: &Path) -> Result<()> {
            if std::thread::current().name() == Some("history-dump") {
                let mut open = self.open.lock().unwrap();
                while !*open {
                    open = self.cv.wait(open).unwrap();
                }
            }
            Ok(())
        }
    }

    fn gated(
        history_size: usize,
        save_period: u32,
    ) -> (Recorder, Arc<DumpGate>, Arc<RecordingNotifier>) {
        let gate = Arc::new(DumpGate::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let persister = Persister::new(
            OutputTemplate::new("/tmp/sill/gated{ms}.jpg").unwrap(),
            gate.clone(),
            16,
        );
        let history = HistoryWorker::spawn(persister.clone(), Duration::ZERO).unwrap();
        let recorder = Recorder::new(
            RecorderConfig {
                history_size,
                save_period,
            },
            persister,
            notifier.clone(),
            history,
        )
        .unwrap();
        (recorder, gate, notifier)
    }

    struct Harness {
        recorder: Recorder,
        codec: Arc<RecordingCodec>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(history_size: usize, save_period: u32) -> Harness {
        let codec = Arc::new(RecordingCodec::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let persister = Persister::new(
            OutputTemplate::new("/tmp/sill/capture{ms}.jpg").unwrap(),
            codec.clone(),
            16,
        );
        let history = HistoryWorker::spawn(persister.clone(), Duration::ZERO).unwrap();
        let recorder = Recorder::new(
            RecorderConfig {
                history_size,
                save_period,
            },
            persister,
            notifier.clone(),
            history,
        )
        .unwrap();
        Harness {
            recorder,
            codec,
            notifier,
        }
    }

    fn written(codec: &RecordingCodec) -> usize {
        codec.written.lock().unwrap().len()
    }

    #[test]
    fn recorder_rejects_zero_sizes() {
        let codec: Arc<dyn FrameCodec> = Arc::new(RecordingCodec::default());
        let persister = Persister::new(OutputTemplate::new("{ms}.jpg").unwrap(), codec, 1);
        for (history_size, save_period) in [(0, 5), (5, 0)] {
            let history = HistoryWorker::spawn(persister.clone(), Duration::ZERO).unwrap();
            let recorder = Recorder::new(
                RecorderConfig {
                    history_size,
                    save_period,
                },
                persister.clone(),
                Arc::new(RecordingNotifier::default()),
                history,
            );
            assert!(recorder.is_err());
        }
    }

    #[test]
    fn cursor_wraps_modulo_capacity() {
        let h = harness(4, 3);
        let mut source = ScriptedSource::steady();
        for _ in 0..11 {
            h.recorder.tick(&mut source);
        }
        let status = h.recorder.status();
        assert_eq!(status.cursor, 11 % 4);
        assert_eq!(status.occupied, 4);
        assert_eq!(h.recorder.stats().ticks, 11);
    }

    #[test]
    fn capture_misses_leave_absent_slots() {
        let h = harness(4, 3);
        let mut source = ScriptedSource::scripted(vec![
            Ok(None),
            Ok(Some(Vec::new())),
            Err(anyhow!("VIDIOC_DQBUF timed out")),
        ]);
        for _ in 0..4 {
            h.recorder.tick(&mut source);
        }
        assert!(h.recorder.frame_at(0).is_none());
        assert!(h.recorder.frame_at(1).is_none());
        assert!(h.recorder.frame_at(2).is_none());
        assert!(h.recorder.frame_at(3).is_some());
        assert_eq!(h.recorder.stats().misses, 3);
    }

    #[test]
    fn extend_resets_countdown_without_second_dump() {
        let h = harness(5, 4);
        let mut source = ScriptedSource::steady();
        for _ in 0..5 {
            h.recorder.tick(&mut source);
        }

        let opened = h.recorder.start_or_extend_rolling();
        let RollingTrigger::Opened {
            window_start,
            dump_queued: true,
        } = opened
        else {
            panic!("expected a fresh window, got {:?}", opened);
        };
        let report = h
            .recorder
            .wait_for_history(Duration::from_secs(10))
            .expect("dump report");
        assert_eq!(report.written, 5);

        h.recorder.tick(&mut source);
        h.recorder.tick(&mut source);
        assert_eq!(h.recorder.status().save_timer, 2);

        let extended = h.recorder.start_or_extend_rolling();
        assert_eq!(extended, RollingTrigger::Extended { window_start });
        let status = h.recorder.status();
        assert_eq!(status.save_timer, 4);
        assert_eq!(status.window_start, Some(window_start));
        assert_eq!(h.recorder.stats().dumps_queued, 1);
        assert!(h.recorder.wait_for_history(Duration::ZERO).is_none());
        // 5 from the dump, 2 rolling ticks.
        assert_eq!(written(&h.codec), 7);
    }

    #[test]
    fn countdown_completes_after_save_period_ticks() {
        let h = harness(3, 4);
        let mut source = ScriptedSource::steady();
        h.recorder.tick(&mut source);
        h.recorder.start_or_extend_rolling();
        h.recorder.wait_for_history(Duration::from_secs(10));
        let after_dump = written(&h.codec);

        for remaining in (1..4).rev() {
            let report = h.recorder.tick(&mut source);
            assert!(report.rolling_persisted);
            assert!(report.completed.is_none());
            assert_eq!(h.recorder.status().save_timer, remaining);
        }
        let last = h.recorder.tick(&mut source);
        assert!(last.rolling_persisted);
        assert!(matches!(
            last.completed,
            Some(Notification::RollingComplete { window_end, .. })
                if Some(window_end) == last.captured_at
        ));
        assert_eq!(written(&h.codec) - after_dump, 4);

        // Idle again: further ticks persist nothing.
        let idle = h.recorder.tick(&mut source);
        assert!(!idle.rolling_persisted);
        assert_eq!(written(&h.codec) - after_dump, 4);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn single_save_targets_previous_slot_during_rolling() {
        let h = harness(4, 10);
        let mut source = ScriptedSource::steady();
        for _ in 0..6 {
            h.recorder.tick(&mut source);
        }
        h.recorder.start_or_extend_rolling();
        h.recorder.wait_for_history(Duration::from_secs(10));
        h.recorder.tick(&mut source);

        let cursor = h.recorder.status().cursor;
        let expected = h.recorder.frame_at((cursor + 3) % 4).expect("latest frame");
        let timer_before = h.recorder.status().save_timer;

        let notification = h.recorder.save_most_recent();
        assert_eq!(
            notification,
            Notification::Picture {
                path: PathBuf::from(format!(
                    "/tmp/sill/capture{}.jpg",
                    expected.captured_at.as_millis()
                )),
                timestamp: expected.captured_at,
            }
        );
        assert_eq!(h.recorder.status().save_timer, timer_before);
        assert_eq!(h.notifier.sent.lock().unwrap().last(), Some(&notification));
    }

    #[test]
    fn single_save_on_empty_ring_still_notifies() {
        let h = harness(3, 2);
        let before = CaptureTime::now();
        let notification = h.recorder.save_most_recent();
        let Notification::Picture { timestamp, .. } = notification else {
            panic!("expected picture notification");
        };
        assert!(timestamp >= before);
        assert_eq!(written(&h.codec), 0);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn handle_routes_triggers() {
        let h = harness(2, 2);
        let mut source = ScriptedSource::steady();
        h.recorder.tick(&mut source);
        h.recorder.handle(Trigger::Capture);
        h.recorder.handle(Trigger::Rolling);
        let stats = h.recorder.stats();
        assert_eq!(stats.single_saves, 1);
        assert_eq!(stats.windows_opened, 1);
        assert!(h.recorder.status().is_rolling());
    }

    #[test]
    fn ticks_continue_while_history_dump_is_blocked() {
        let (recorder, gate, _notifier) = gated(4, 6);
        let mut source = ScriptedSource::steady();
        for _ in 0..4 {
            recorder.tick(&mut source);
        }
        assert!(matches!(
            recorder.start_or_extend_rolling(),
            RollingTrigger::Opened {
                dump_queued: true,
                ..
            }
        ));

        for _ in 0..3 {
            let report = recorder.tick(&mut source);
            assert!(report.rolling_persisted);
        }
        let status = recorder.status();
        assert_eq!(status.save_timer, 3);
        assert_eq!(status.cursor, (4 + 3) % 4);
        assert_eq!(recorder.stats().rolling_persists, 3);

        gate.release();
        let report = recorder
            .wait_for_history(Duration::from_secs(10))
            .expect("dump report");
        assert_eq!(report.written, 4);
    }

    #[test]
    fn completion_is_published_while_dump_still_runs() {
        let (recorder, gate, notifier) = gated(3, 2);
        let mut source = ScriptedSource::steady();
        recorder.tick(&mut source);
        recorder.start_or_extend_rolling();

        recorder.tick(&mut source);
        let last = recorder.tick(&mut source);
        assert!(matches!(
            last.completed,
            Some(Notification::RollingComplete { .. })
        ));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        let status = recorder.status();
        assert!(!status.is_rolling());
        assert_eq!(status.window_start, None);
        // The closed window no longer tracks its dump.
        assert!(recorder.wait_for_history(Duration::ZERO).is_none());

        gate.release();
    }

    #[test]
    fn every_fresh_window_gets_its_dump() {
        let (recorder, gate, _notifier) = gated(3, 1);
        let mut source = ScriptedSource::steady();
        recorder.tick(&mut source);

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(recorder.start_or_extend_rolling());
            // One tick closes a one-tick window.
            recorder.tick(&mut source);
        }
        for outcome in &outcomes {
            assert!(
                matches!(
                    outcome,
                    RollingTrigger::Opened {
                        dump_queued: true,
                        ..
                    }
                ),
                "{:?}",
                outcome
            );
        }
        let stats = recorder.stats();
        assert_eq!(stats.dumps_queued, 3);
        assert_eq!(stats.dumps_dropped, 0);
        assert_eq!(stats.windows_completed, 3);

        gate.release();
    }

    /// Fires a single-frame save from another thread while the device read
    /// is in progress.
    struct TriggeringSource {
        recorder: Arc<Recorder>,
        served: Option<bool>,
    }

    impl FrameSource for TriggeringSource {
        fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
            let recorder = Arc::clone(&self.recorder);
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                recorder.save_most_recent();
                let _ = tx.send(());
            });
            self.served = Some(rx.recv_timeout(Duration::from_secs(5)).is_ok());
            Ok(Some(vec![9; 64]))
        }
    }

    #[test]
    fn triggers_are_served_while_the_device_read_blocks() {
        let Harness {
            recorder, notifier, ..
        } = harness(3, 2);
        let recorder = Arc::new(recorder);
        let mut source = TriggeringSource {
            recorder: Arc::clone(&recorder),
            served: None,
        };

        let report = recorder.tick(&mut source);

        assert_eq!(source.served, Some(true));
        assert!(report.captured_at.is_some());
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(recorder.stats().single_saves, 1);
    }
}
