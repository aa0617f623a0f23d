/// Key layout for the history keyspace
///
/// Partition structure:
/// - `records`: rec:{id} -> HistoryRecord (JSON)
/// - `lookup`: find:{source}:{title} -> id (string)
/// - `lookup`: path:{source}:{video_path} -> id (string)
///
/// Record ids are UUIDv7 strings, so key order is creation order.
use super::models::VideoSource;

const RECORD_PREFIX: &str = "rec:";

/// Encode a record key: rec:{id}
pub fn encode_record_key(id: &str) -> Vec<u8> {
    format!("{RECORD_PREFIX}{id}").into_bytes()
}

/// Prefix covering every record key
pub fn record_prefix() -> &'static [u8] {
    RECORD_PREFIX.as_bytes()
}

/// Encode a lookup key: find:{source}:{title}
///
/// The source comes first and never contains `:`, so titles with colons
/// stay unambiguous.
pub fn encode_lookup_key(source: VideoSource, title: &str) -> Vec<u8> {
    format!("find:{}:{}", source.as_str(), title).into_bytes()
}

/// Encode a file lookup key: path:{source}:{video_path}
pub fn encode_path_key(source: VideoSource, video_path: &str) -> Vec<u8> {
    format!("path:{}:{}", source.as_str(), video_path).into_bytes()
}
