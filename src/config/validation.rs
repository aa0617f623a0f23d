use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Storage provider is S3 but no endpoint or region is configured")]
    MissingS3Location,

    #[error("Worker pool must have at least one {field}")]
    EmptyWorkerPool { field: &'static str },

    #[error("No allowed video extensions configured")]
    NoAllowedExtensions,

    #[error("Limit must be positive: {field}")]
    ZeroLimit { field: &'static str },

    #[error(
        "worker.stream_idle_timeout_secs ({idle}) must be greater than worker.heartbeat_secs ({heartbeat})"
    )]
    IdleTimeoutTooShort { idle: u64, heartbeat: u64 },

    #[error("Invalid transcription base url '{url}', expected http:// or https://")]
    InvalidTranscriptionUrl { url: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_limits(config)?;
    validate_worker(config)?;
    validate_storage(config)?;
    validate_transcription(config)?;
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.limits.allowed_extensions.is_empty() {
        return Err(ValidationError::NoAllowedExtensions);
    }

    if config.limits.max_video_size.as_u64() == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "limits.max_video_size",
        });
    }

    if config.limits.max_video_duration_secs == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "limits.max_video_duration_secs",
        });
    }

    if config.fetcher.title_max_chars == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "fetcher.title_max_chars",
        });
    }

    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.workers == 0 {
        return Err(ValidationError::EmptyWorkerPool { field: "worker" });
    }

    if config.worker.queue_capacity == 0 {
        return Err(ValidationError::EmptyWorkerPool {
            field: "queue slot",
        });
    }

    if config.worker.stream_idle_timeout_secs == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "worker.stream_idle_timeout_secs",
        });
    }

    if config.worker.heartbeat_secs == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "worker.heartbeat_secs",
        });
    }

    // quiet tasks must get a heartbeat in before their stream gives up
    if config.worker.stream_idle_timeout_secs <= config.worker.heartbeat_secs {
        return Err(ValidationError::IdleTimeoutTooShort {
            idle: config.worker.stream_idle_timeout_secs,
            heartbeat: config.worker.heartbeat_secs,
        });
    }

    Ok(())
}

/// Validate storage credentials when provider is S3
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3 {
        if config.storage.access_key.is_none() || config.storage.secret_key.is_none() {
            return Err(ValidationError::MissingS3Credentials);
        }
        if config.storage.endpoint.is_none() && config.storage.region.is_none() {
            return Err(ValidationError::MissingS3Location);
        }
    }

    if config.storage.sign_ttl_secs == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "storage.sign_ttl_secs",
        });
    }

    Ok(())
}

fn validate_transcription(config: &Config) -> Result<(), ValidationError> {
    let url = &config.transcription.base_url;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::InvalidTranscriptionUrl { url: url.clone() });
    }

    if config.transcription.poll_interval_ms == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "transcription.poll_interval_ms",
        });
    }

    Ok(())
}
