//! Local media helpers: file naming, ffprobe metadata and stale-file sweeping

pub mod cleanup;
pub mod naming;
pub mod probe;

pub use cleanup::{CleanupStats, clean_old_files};
pub use naming::{
    create_unique_file, extract_url, is_plain_filename, object_key, sanitize_filename,
    secure_filename,
};
pub use probe::{FfprobeProber, MediaProber, ProbeError, VideoMetadata};
