use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::LazyLock;

/// Emotion and event tags such as `<|HAPPY|>` or `<|Speech|>`
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|]*\|>").expect("valid markup pattern"));

/// One recognized sentence; times are milliseconds from the start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(default)]
    pub begin_time: u64,
    #[serde(default)]
    pub end_time: u64,
    #[serde(default)]
    pub text: String,
}

/// Removes `<|...|>` tokens and surrounding whitespace.
pub fn strip_markup(text: &str) -> String {
    MARKUP_RE.replace_all(text, "").trim().to_string()
}

/// Strips markup from every sentence and drops the ones left empty.
pub fn clean_sentences(sentences: Vec<Sentence>) -> Vec<Sentence> {
    sentences
        .into_iter()
        .filter_map(|s| {
            let text = strip_markup(&s.text);
            (!text.is_empty()).then_some(Sentence { text, ..s })
        })
        .collect()
}

/// Sentence texts joined by single spaces
pub fn render_plain(sentences: &[Sentence]) -> String {
    sentences
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One `[MM:SS - MM:SS] text` line per sentence
pub fn render_timestamped(sentences: &[Sentence]) -> String {
    let mut out = String::new();
    for (i, sentence) in sentences.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "[{} - {}] {}",
            clock(sentence.begin_time),
            clock(sentence.end_time),
            sentence.text
        );
    }
    out
}

fn clock(millis: u64) -> String {
    let secs = millis / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
