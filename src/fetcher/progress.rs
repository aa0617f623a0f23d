//! Parsing of the machine-readable progress lines printed by yt-dlp
//!
//! The fetcher asks yt-dlp for one line per tick via `--progress-template`:
//!
//! ```text
//! vidscribe-progress|<downloaded>|<total>|<total estimate>|<speed>|<eta>
//! ```
//!
//! Fields yt-dlp does not know are printed as `NA`.

use super::DownloadProgress;

pub(crate) const PROGRESS_PREFIX: &str = "vidscribe-progress";

/// Template handed to `--progress-template`
pub(crate) fn progress_template() -> String {
    format!(
        "download:{PROGRESS_PREFIX}|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s"
    )
}

/// Parses one stdout line; `None` for anything that is not a progress line.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let mut fields = line.trim().split('|');
    if fields.next()? != PROGRESS_PREFIX {
        return None;
    }

    let downloaded = number(fields.next()?)?;
    let total = number(fields.next()?);
    let estimate = number(fields.next()?);
    let speed = number(fields.next()?);
    let eta = number(fields.next()?);

    Some(DownloadProgress {
        downloaded_bytes: downloaded as u64,
        total_bytes: total.or(estimate).map(|v| v as u64),
        speed,
        eta_secs: eta.map(|v| v as u64),
    })
}

fn number(field: &str) -> Option<f64> {
    match field.trim() {
        "" | "NA" | "None" => None,
        value => value.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0),
    }
}
