//! facemark-client: Everything that talks to the recognition backend.
//!
//! `ApiClient` wraps the REST routes; the roster, attendance log and
//! dataset panel sit on top of it, and `recognition` drives the live
//! webcam polling loop.

pub mod api;
pub mod attendance;
pub mod config;
pub mod dataset;
pub mod error;
pub mod recognition;
pub mod roster;
pub mod source;

#[cfg(test)]
mod testing;

pub use api::{Ack, ApiClient, NewStudent, RecognitionBackend, ServerQuery, StudentUpdate};
pub use attendance::AttendanceLog;
pub use config::Config;
pub use dataset::DatasetPanel;
pub use error::ClientError;
pub use recognition::{PollerEvent, PollerHandle, PollerOptions, PollerState, RecognitionPoller};
pub use roster::{DeleteOutcome, Roster};
pub use source::{FrameSource, StillImage, WebcamSource};
