//! Background work executed by the task runner
//!
//! - [`DownloadJob`]: fetch a remote video into the records directory,
//!   streaming `downloading` events
//! - [`VideoProcessor`]: validate, upload, transcribe and persist a local
//!   video; [`ProcessJob`] runs it in the background with `processing`
//!   stage events

pub mod download;
pub mod process;

pub use download::DownloadJob;
pub use process::{ProcessError, ProcessJob, ProcessOutcome, ProcessRequest, VideoProcessor};
