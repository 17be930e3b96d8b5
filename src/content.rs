use std::path::PathBuf;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::PLAY_ENDPOINT, share::sanitize_filename, Error, Result};

pub const UNKNOWN_TITLE: &str = "unknown title";
pub const UNKNOWN_AUTHOR: &str = "unknown author";

// highest quality first; `default` is the best encoding served without login
pub const QUALITY_TIERS: [&str; 3] = ["default", "1080p", "720p"];

// compared numerically, so `2.0` counts too
const GALLERY_TYPE: f64 = 2.0;
const WATERMARKED_PATH: &str = "/playwm/";
const CLEAN_PATH: &str = "/play/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
  #[serde(rename = "video")]
  Video,
  #[serde(rename = "images")]
  ImageGallery,
}

/// Everything known about one post. Produced once per request and only
/// read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDescriptor {
  #[serde(rename = "aweme_id")]
  pub content_id: String,
  pub title: String,
  #[serde(rename = "author")]
  pub author_name: String,
  #[serde(rename = "type")]
  pub kind: ContentKind,
  /// Unique, watermark free video candidates, best first.
  #[serde(rename = "video_urls")]
  pub media_urls: Vec<String>,
  pub image_urls: Vec<String>,
  pub cover_url: String,
  #[serde(rename = "duration")]
  pub duration_seconds: u64,
}

/// A descriptor together with the files it was saved to.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
  #[serde(flatten)]
  pub content: ContentDescriptor,
  #[serde(rename = "save_paths")]
  pub saved_paths: Vec<PathBuf>,
  #[serde(rename = "downloaded")]
  pub succeeded: bool,
}

// The subset of the platform's detail record that is read. Every field is
// optional upstream.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Detail {
  aweme_id: Option<Value>,
  desc: Option<String>,
  aweme_type: Option<Value>,
  author: Option<Author>,
  images: Option<Vec<UrlList>>,
  video: Option<Video>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Author {
  nickname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlList {
  url_list: Option<Vec<String>>,
}

impl UrlList {
  fn first(&self) -> Option<&String> {
    self.url_list.as_ref().and_then(|urls| urls.first())
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Video {
  play_addr: Option<PlayAddr>,
  cover: Option<UrlList>,
  duration: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlayAddr {
  // an opaque video token, not a url
  uri: Option<String>,
  url_list: Option<Vec<String>>,
}

impl ContentDescriptor {
  /// Derives the descriptor from a raw detail record.
  pub fn from_detail(detail: &Value) -> Result<Self> {
    let detail = Detail::deserialize(detail)
      .map_err(|e| Error::MalformedData(format!("detail record: {e}")))?;

    let content_id = match &detail.aweme_id {
      None | Some(Value::Null) => String::new(),
      Some(Value::String(id)) => id.clone(),
      Some(other) => other.to_string(),
    };
    let title = detail.desc.clone().unwrap_or_else(|| UNKNOWN_TITLE.into());
    let author_name = detail
      .author
      .as_ref()
      .and_then(|a| a.nickname.clone())
      .unwrap_or_else(|| UNKNOWN_AUTHOR.into());

    let is_gallery = detail
      .aweme_type
      .as_ref()
      .and_then(Value::as_f64)
      .map_or(false, |t| t == GALLERY_TYPE);

    let content = if is_gallery {
      let image_urls: Vec<String> = detail
        .images
        .iter()
        .flatten()
        .filter_map(UrlList::first)
        .cloned()
        .collect();

      Self {
        content_id,
        title,
        author_name,
        kind: ContentKind::ImageGallery,
        media_urls: vec![],
        cover_url: image_urls.first().cloned().unwrap_or_default(),
        image_urls,
        duration_seconds: 0,
      }
    } else {
      let video = detail.video.unwrap_or_default();

      Self {
        content_id,
        title,
        author_name,
        kind: ContentKind::Video,
        media_urls: video_urls(video.play_addr.as_ref()),
        image_urls: vec![],
        cover_url: video
          .cover
          .as_ref()
          .and_then(UrlList::first)
          .cloned()
          .unwrap_or_default(),
        duration_seconds: video
          .duration
          .as_ref()
          .map_or(0, |d| normalize_duration(raw_duration(d))),
      }
    };

    Ok(content)
  }

  /// Base name for saved files, `<author>_<title>` made filesystem safe.
  pub fn file_stem(&self) -> String {
    sanitize_filename(&format!("{}_{}", self.author_name, self.title))
  }
}

pub fn play_url(token: &str, tier: &str) -> String {
  format!("{PLAY_ENDPOINT}?video_id={token}&ratio={tier}&line=0")
}

fn video_urls(play_addr: Option<&PlayAddr>) -> Vec<String> {
  let Some(play_addr) = play_addr else {
    return vec![];
  };

  let synthesized = play_addr
    .uri
    .iter()
    .filter(|token| !token.is_empty())
    .flat_map(|token| {
      QUALITY_TIERS.iter().map(move |tier| play_url(token, tier))
    });

  let fallback = play_addr
    .url_list
    .iter()
    .flatten()
    .map(|url| url.replace(WATERMARKED_PATH, CLEAN_PATH));

  synthesized.chain(fallback).unique().collect()
}

fn raw_duration(value: &Value) -> u64 {
  value
    .as_u64()
    .or_else(|| value.as_f64().map(|d| d.max(0.0).floor() as u64))
    .unwrap_or(0)
}

/// Upstream durations are usually milliseconds, but degraded records carry
/// seconds. Values above 1000 are taken as milliseconds.
pub fn normalize_duration(raw: u64) -> u64 {
  if raw > 1000 {
    raw / 1000
  } else {
    raw
  }
}
