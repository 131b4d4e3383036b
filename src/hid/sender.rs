//! Ordered report delivery
//!
//! One [`ReportSender`] per sink. Reports are enqueued without blocking onto an
//! unbounded channel and drained by a single worker task, which writes each
//! report followed by its release report. Writes run on the blocking pool so
//! at most one write per sink is in flight.
//!
//! The channel receiver belongs to the sender, not the worker: stopping the
//! worker hands the receiver back, so queued reports survive a stop/start.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::report::Report;
use super::sink::DeviceSink;
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Receives the outcome of every report
pub trait SendObserver: Send + Sync {
    /// Report and release were both written
    fn on_success(&self, device: &str);

    /// A write failed; the sender continues with the next report
    fn on_failure(&self, device: &str, error: &AppError);
}

/// Observer that ignores everything
pub struct NoopObserver;

impl SendObserver for NoopObserver {
    fn on_success(&self, _device: &str) {}
    fn on_failure(&self, _device: &str, _error: &AppError) {}
}

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderState {
    /// Created, worker never started
    Idle,
    Running,
    Stopped,
    /// The worker died on a panicking write
    Faulted,
}

type SinkSlot = ArcSwap<Box<dyn DeviceSink>>;
type ReceiverSlot = Mutex<Option<mpsc::UnboundedReceiver<Report>>>;

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Shared between the sender handle and its worker task
struct Shared {
    label: String,
    sink: SinkSlot,
    receiver: ReceiverSlot,
    state: Mutex<SenderState>,
    observer: Arc<dyn SendObserver>,
    throttler: LogThrottler,
}

/// Ordered, single-consumer report pipeline for one sink
pub struct ReportSender {
    tx: mpsc::UnboundedSender<Report>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ReportSender {
    pub fn new(
        label: impl Into<String>,
        sink: Box<dyn DeviceSink>,
        observer: Arc<dyn SendObserver>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            shared: Arc::new(Shared {
                label: label.into(),
                sink: ArcSwap::from_pointee(sink),
                receiver: Mutex::new(Some(rx)),
                state: Mutex::new(SenderState::Idle),
                observer,
                throttler: LogThrottler::with_secs(5),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn state(&self) -> SenderState {
        *self.shared.state.lock()
    }

    /// Name of the sink currently written to
    pub fn sink_name(&self) -> String {
        self.shared.sink.load().name().to_string()
    }

    /// Queue a report; never blocks
    pub fn enqueue(&self, report: Report) {
        if self.tx.send(report).is_err() {
            // Only possible once a faulted worker took the receiver down with it
            warn_throttled!(
                self.shared.throttler,
                "enqueue",
                "{} sender has no receiver, report dropped",
                self.shared.label
            );
        }
    }

    /// Point the sender at a different sink; applies from the next report
    pub fn set_sink(&self, sink: Box<dyn DeviceSink>) {
        info!(
            "{} sender now writing to {}",
            self.shared.label,
            sink.name()
        );
        self.shared.sink.store(Arc::new(sink));
        self.shared.throttler.clear(&self.shared.label);
    }

    /// Start the worker; a no-op when it is already running
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let rx = self.shared.receiver.lock().take().ok_or_else(|| {
            AppError::Internal(format!("{} sender lost its queue", self.shared.label))
        })?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(self.shared.clone(), rx, cancel.clone()));
        *self.shared.state.lock() = SenderState::Running;
        *worker = Some(Worker { cancel, handle });

        debug!("{} sender started", self.shared.label);
        Ok(())
    }

    /// Stop the worker between reports; queued reports stay queued
    ///
    /// Waits for an in-flight write to finish. Calling it again is harmless.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            let mut state = self.shared.state.lock();
            if *state != SenderState::Faulted {
                *state = SenderState::Stopped;
            }
            return;
        };

        worker.cancel.cancel();
        if let Err(e) = worker.handle.await {
            error!("{} sender worker ended abnormally: {}", self.shared.label, e);
            *self.shared.state.lock() = SenderState::Faulted;
            return;
        }

        let mut state = self.shared.state.lock();
        if *state != SenderState::Faulted {
            *state = SenderState::Stopped;
        }
        debug!("{} sender stopped", self.shared.label);
    }
}

impl Drop for ReportSender {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Report>,
    cancel: CancellationToken,
) {
    loop {
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(report) => report,
                None => break,
            },
        };

        if !deliver(&shared, report).await {
            *shared.state.lock() = SenderState::Faulted;
            break;
        }
    }

    // Hand the queue back for the next start
    *shared.receiver.lock() = Some(rx);
}

/// Write one report and its release; returns false if the write task panicked
async fn deliver(shared: &Shared, report: Report) -> bool {
    let sink = shared.sink.load_full();
    let release = report.release();
    trace!("{} report: {:02x?}", shared.label, report.as_bytes());

    let task_sink = sink.clone();
    let result = tokio::task::spawn_blocking(move || {
        task_sink.write(report.as_bytes())?;
        task_sink.write(release.as_bytes())
    })
    .await;

    match result {
        Ok(Ok(())) => {
            shared.throttler.clear(&shared.label);
            shared.observer.on_success(sink.name());
            true
        }
        Ok(Err(e)) => {
            warn_throttled!(
                shared.throttler,
                &shared.label,
                "{} write to {} failed: {}",
                shared.label,
                sink.name(),
                e
            );
            shared.observer.on_failure(sink.name(), &e);
            true
        }
        Err(e) => {
            error!("{} write task panicked: {}", shared.label, e);
            let err = AppError::Internal(format!("write task failed: {}", e));
            shared.observer.on_failure(sink.name(), &err);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::HidErrorKind;

    /// Counts outcomes
    #[derive(Default)]
    pub struct RecordingObserver {
        pub successes: Mutex<Vec<String>>,
        pub failures: Mutex<Vec<HidErrorKind>>,
    }

    impl RecordingObserver {
        pub fn total(&self) -> usize {
            self.successes.lock().len() + self.failures.lock().len()
        }

        /// Poll until `n` outcomes were recorded
        pub async fn wait_for(&self, n: usize) {
            for _ in 0..200 {
                if self.total() >= n {
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            panic!("timed out waiting for {} outcomes, got {}", n, self.total());
        }
    }

    impl SendObserver for RecordingObserver {
        fn on_success(&self, device: &str) {
            self.successes.lock().push(device.to_string());
        }

        fn on_failure(&self, _device: &str, error: &AppError) {
            self.failures.lock().push(error.kind());
        }
    }
}
