//! Live recognition polling.
//!
//! A spawned task captures a still every period, sends it to the backend
//! and feeds the result through a [`RecognitionSession`]. Ticks run one at
//! a time inside the task, so a slow request delays the next tick rather
//! than overlapping it. Stopping aborts any in-flight request and hands the
//! session back to the caller.

use crate::api::RecognitionBackend;
use crate::error::ClientError;
use crate::source::FrameSource;
use facemark_core::session::SUCCESS_FLASH;
use facemark_core::{ClassSession, Observation, RecognitionResult, RecognitionSession, Tolerance};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Shown when a tick fails without a backend detail message.
pub const RECOGNITION_FAILED: &str =
    "An error occurred during face recognition. Please check if the backend is running.";

#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub tolerance: Tolerance,
    pub interval: Duration,
    pub class: ClassSession,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            interval: POLL_INTERVAL,
            class: ClassSession::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Streaming,
    Recognizing,
}

/// Notifications emitted by the poller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerEvent {
    /// Every result the backend returned, matched or not.
    Observed(RecognitionResult),
    /// First confirmation of a student in this session. The confirmation
    /// stays up until `flash_until`.
    AttendanceMarked {
        result: RecognitionResult,
        message: String,
        flash_until: Instant,
    },
    /// One failed tick. The loop keeps running.
    Error { message: String },
}

/// Handle to a running poller. Dropping it aborts the task.
pub struct PollerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<RecognitionSession>>,
    state: watch::Receiver<PollerState>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Stop polling, abandoning any in-flight request, and return the
    /// session with everything recognized so far.
    pub async fn stop(mut self) -> Result<RecognitionSession, ClientError> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let task = self.task.take().ok_or(ClientError::TaskExited)?;
        task.await.map_err(|_| ClientError::TaskExited)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::debug!("poller handle dropped; aborting task");
            task.abort();
        }
    }
}

pub struct RecognitionPoller;

impl RecognitionPoller {
    /// Idle → Streaming. Starts a fresh session with an empty recognized-set.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S, B>(
        source: S,
        backend: B,
        options: PollerOptions,
        events: mpsc::Sender<PollerEvent>,
    ) -> PollerHandle
    where
        S: FrameSource,
        B: RecognitionBackend,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(PollerState::Streaming);

        if !options.class.is_selected() {
            tracing::warn!("starting recognition with no subject selected");
        }
        tracing::info!(
            tolerance = %options.tolerance,
            interval_ms = options.interval.as_millis() as u64,
            subject = options.class.subject_code(),
            "recognition started"
        );

        let task = tokio::spawn(run(source, backend, options, events, stop_rx, state_tx));

        PollerHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            state: state_rx,
        }
    }
}

async fn run<S, B>(
    mut source: S,
    backend: B,
    options: PollerOptions,
    events: mpsc::Sender<PollerEvent>,
    mut stop_rx: oneshot::Receiver<()>,
    state_tx: watch::Sender<PollerState>,
) -> RecognitionSession
where
    S: FrameSource,
    B: RecognitionBackend,
{
    let mut session = RecognitionSession::new(options.class.clone());
    let period = options.interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        state_tx.send_replace(PollerState::Recognizing);
        let outcome = tokio::select! {
            _ = &mut stop_rx => {
                tracing::info!("stop requested; abandoning in-flight recognition");
                break;
            }
            r = tick(&mut source, &backend, options.tolerance) => r,
        };
        state_tx.send_replace(PollerState::Streaming);

        let mut stopped = false;
        for event in handle_outcome(&mut session, outcome) {
            tokio::select! {
                _ = &mut stop_rx => {
                    stopped = true;
                    break;
                }
                // A dropped receiver just means nobody is listening.
                _ = events.send(event) => {}
            }
        }
        if stopped {
            tracing::info!("stop requested while delivering events");
            break;
        }
    }

    state_tx.send_replace(PollerState::Idle);
    tracing::info!(
        ticks = session.ticks(),
        marked = session.marked().len(),
        errors = session.errors(),
        "recognition stopped"
    );
    session
}

async fn tick<S, B>(
    source: &mut S,
    backend: &B,
    tolerance: Tolerance,
) -> Result<RecognitionResult, ClientError>
where
    S: FrameSource,
    B: RecognitionBackend,
{
    let image = source.capture().await?;
    backend.recognize(&image, tolerance).await
}

fn handle_outcome(
    session: &mut RecognitionSession,
    outcome: Result<RecognitionResult, ClientError>,
) -> Vec<PollerEvent> {
    match outcome {
        Ok(result) => {
            let mut events = vec![PollerEvent::Observed(result.clone())];
            let now = Instant::now();
            if let Observation::Marked(result) = session.observe(result, now) {
                let message = session.marked_message(&result);
                let flash_until = session.flash_until().unwrap_or(now + SUCCESS_FLASH);
                tracing::info!(id = %result.id, name = %result.name, "attendance marked");
                events.push(PollerEvent::AttendanceMarked {
                    result,
                    message,
                    flash_until,
                });
            }
            events
        }
        Err(e) => {
            session.record_error();
            tracing::warn!(error = %e, "recognition tick failed");
            vec![PollerEvent::Error {
                message: e.user_message(RECOGNITION_FAILED),
            }]
        }
    }
}

/// Single-shot recognition: one capture, one call, same result handling.
pub async fn recognize_once<S, B>(
    source: &mut S,
    backend: &B,
    session: &mut RecognitionSession,
    tolerance: Tolerance,
) -> Result<(RecognitionResult, Observation), ClientError>
where
    S: FrameSource,
    B: RecognitionBackend,
{
    let result = tick(source, backend, tolerance).await?;
    let observation = session.observe(result.clone(), Instant::now());
    Ok((result, observation))
}
