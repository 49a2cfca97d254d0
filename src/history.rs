//! Background history dump.
//!
//! `HistoryWorker` owns one long-lived, low-priority thread. Each job is a ring
//! snapshot moved in by value; the worker writes every present frame in order
//! with a short pause between writes and reports back over a one-shot channel.
//! Dumps run one at a time; later snapshots queue behind the running one. A
//! queued snapshot only holds shared references to frame bytes.
//! The worker never sees the recorder's lock or its live ring.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError};
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::persist::{PersistFailure, Persister};
use crate::CaptureTime;

/// Outcome of one history dump.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpReport {
    pub written: usize,
    pub skipped: usize,
    pub absent: usize,
    pub elapsed: Duration,
}

struct HistoryJob {
    snapshot: Vec<Option<Frame>>,
    window_start: CaptureTime,
    done: SyncSender<DumpReport>,
}

/// Completion handle for a submitted dump.
pub struct DumpTicket {
    rx: Receiver<DumpReport>,
    report: Option<DumpReport>,
}

impl DumpTicket {
    /// Non-blocking check; the report is kept once it arrives.
    pub fn poll(&mut self) -> Option<&DumpReport> {
        if self.report.is_none() {
            match self.rx.try_recv() {
                Ok(report) => self.report = Some(report),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        self.report.as_ref()
    }

    /// Block up to `timeout` for the report.
    pub fn wait(mut self, timeout: Duration) -> Option<DumpReport> {
        if let Some(report) = self.report.take() {
            return Some(report);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

pub struct HistoryWorker {
    jobs: Sender<HistoryJob>,
}

impl HistoryWorker {
    /// Start the worker thread. `throttle` is the pause between two writes.
    pub fn spawn(persister: Persister, throttle: Duration) -> Result<Self> {
        let (jobs, queue) = mpsc::channel::<HistoryJob>();
        std::thread::Builder::new()
            .name("history-dump".to_string())
            .spawn(move || {
                lower_thread_priority();
                for job in queue {
                    let report = dump(&persister, &job.snapshot, throttle);
                    log::info!(
                        "history dump for window {} finished: {} written, {} skipped, {} empty slots in {:?}",
                        job.window_start,
                        report.written,
                        report.skipped,
                        report.absent,
                        report.elapsed
                    );
                    // The recorder may have dropped its ticket already.
                    let _ = job.done.send(report);
                }
                log::debug!("history worker stopped");
            })
            .context("spawn history worker thread")?;
        Ok(Self { jobs })
    }

    /// Queue a snapshot for writing. Returns `None` only when the worker
    /// thread is gone.
    pub fn submit(
        &self,
        snapshot: Vec<Option<Frame>>,
        window_start: CaptureTime,
    ) -> Option<DumpTicket> {
        let (done, rx) = mpsc::sync_channel(1);
        let job = HistoryJob {
            snapshot,
            window_start,
            done,
        };
        match self.jobs.send(job) {
            Ok(()) => Some(DumpTicket { rx, report: None }),
            Err(_) => {
                log::error!("history worker is gone; dropping snapshot for window {}", window_start);
                None
            }
        }
    }
}

fn dump(persister: &Persister, snapshot: &[Option<Frame>], throttle: Duration) -> DumpReport {
    let started = Instant::now();
    let mut report = DumpReport::default();
    let mut first = true;

    for slot in snapshot {
        let Some(frame) = slot else {
            report.absent += 1;
            continue;
        };
        if !first && !throttle.is_zero() {
            std::thread::sleep(throttle);
        }
        first = false;

        match persister.try_persist(Some(frame)) {
            Ok(persisted) => {
                log::debug!("history: wrote {}", persisted.path.display());
                report.written += 1;
            }
            Err(PersistFailure::Absent) => report.absent += 1,
            Err(e) => {
                log::warn!("history: skipped frame {}: {}", frame.captured_at, e);
                report.skipped += 1;
            }
        }
    }

    report.elapsed = started.elapsed();
    report
}

#[cfg(target_os = "linux")]
fn lower_thread_priority() {
    // SAFETY: setpriority with who = 0 only adjusts the nice value of the
    // calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, 19) };
    if rc != 0 {
        log::debug!(
            "history worker: could not lower priority: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_thread_priority() {}
