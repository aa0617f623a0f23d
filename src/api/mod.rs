//! HTTP surface: uploads, downloads, transcription, progress streams and
//! history browsing.

mod error;
pub mod models;
pub mod progress;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;
mod validation;

pub use error::ApiError;
pub use server::{router, run};
pub use state::{AppState, Services};
