use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs::{File, OpenOptions};
use uuid::Uuid;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid URL pattern"));

static TITLE_DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s\x{4e00}-\x{9fff}-]").expect("valid title pattern")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Finds the first http(s) URL in free text, e.g. a pasted share message.
///
/// Trailing `?`, `.` and `#` are stripped since they usually belong to the
/// surrounding sentence.
pub fn extract_url(text: &str) -> Option<String> {
    let found = URL_RE.find(text)?;
    let url = found.as_str().trim_end_matches(['?', '.', '#']);

    if url.ends_with("://") {
        return None;
    }
    Some(url.to_string())
}

/// Turns a video title into a safe, readable `.mp4` file name.
///
/// Keeps the first `max_chars` characters, drops anything that is not a
/// word character, whitespace, CJK or `-`, joins words with `_` and appends
/// a `_YYYYmmdd_HHMMSS` timestamp.
pub fn sanitize_filename(title: &str, max_chars: usize, now: NaiveDateTime) -> String {
    let head: String = title.chars().take(max_chars).collect();
    let cleaned = TITLE_DISALLOWED_RE.replace_all(head.trim(), "");
    let joined = WHITESPACE_RE.replace_all(cleaned.trim(), "_");

    let stem = if joined.is_empty() { "video" } else { &joined };
    format!("{stem}_{}.mp4", now.format("%Y%m%d_%H%M%S"))
}

/// Reduces a client supplied file name to ASCII letters, digits, `.`, `_`
/// and `-`, with no directory components.
///
/// Returns `None` when nothing usable is left.
pub fn secure_filename(name: &str) -> Option<String> {
    let flattened: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Creates `name`, or `stem_N.ext` with the smallest free N, inside `dir`.
///
/// Each candidate is opened with `create_new`, so concurrent callers asking
/// for the same name always end up with different files. Returns the chosen
/// name and the open, empty file.
pub async fn create_unique_file(dir: &Path, name: &str) -> std::io::Result<(String, File)> {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let mut counter = 0u32;
    loop {
        let candidate = match (counter, ext) {
            (0, _) => name.to_string(),
            (n, Some(ext)) => format!("{stem}_{n}.{ext}"),
            (n, None) => format!("{stem}_{n}"),
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Fresh storage key for an uploaded copy of a local video
pub fn object_key(prefix: &str, filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "mp4".to_string());

    format!("{prefix}{}.{ext}", Uuid::new_v4())
}

/// True when `name` is a bare file name that cannot escape its directory
pub fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.starts_with("..")
}
