use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

const MAX_FILENAME_CHARS: usize = 80;
const FALLBACK_FILENAME: &str = "douyin_video";

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://\S+").expect("valid regex")
});

// checked in order, first match wins
static CONTENT_ID_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
  [r"video/(\d+)", r"note/(\d+)", r"modal_id=(\d+)", r"[?&]vid=(\d+)"]
    .into_iter()
    .map(|re| Regex::new(re).expect("valid regex"))
    .collect()
});

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\n\r\t]"#).expect("valid regex"));

/// Finds the first URL in free-form share text.
pub fn extract_url(share_text: &str) -> Result<&str> {
  URL_REGEX
    .find(share_text)
    .map(|m| m.as_str())
    .ok_or(Error::NoUrlFound)
}

/// Pulls the numeric content id out of a resolved share page URL.
pub fn extract_content_id(url: &str) -> Result<&str> {
  CONTENT_ID_REGEXES
    .iter()
    .find_map(|re| re.captures(url))
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str())
    .ok_or_else(|| Error::NoContentId(url.to_owned()))
}

pub fn sanitize_filename(name: &str) -> String {
  let name = UNSAFE_FILENAME_CHARS.replace_all(name, "_");
  let name: String = name
    .trim_matches(|c| c == '.' || c == ' ')
    .chars()
    .take(MAX_FILENAME_CHARS)
    .collect();

  if name.is_empty() {
    FALLBACK_FILENAME.to_owned()
  } else {
    name
  }
}
