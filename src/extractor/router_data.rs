use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{Error, Result, W};

// the share page assigns its server-rendered state to this global
static ROUTER_DATA_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?s)window\._ROUTER_DATA\s*=\s*(\{.*?\})\s*;?\s*</script>")
    .expect("valid regex")
});

const LOADER_DATA_KEY: &str = "loaderData";
const VIDEO_INFO_KEY: &str = "videoInfoRes";
const ITEM_LIST_KEY: &str = "item_list";

/// The raw JSON text assigned to `window._ROUTER_DATA`, if the page has one.
pub fn embedded_json(html: &str) -> Option<&str> {
  ROUTER_DATA_REGEX
    .captures(html)
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str())
}

pub fn parse(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| Error::MalformedData(e.to_string()))
}

/// First entry of the video info item list.
///
/// Route keys under `loaderData` embed the post id (e.g. `video_(id)/page`),
/// so the payloads are scanned in document order and the first one holding
/// a non-empty video info object is used. Later matches are ignored.
pub fn first_item(router_data: &Value) -> Result<Value> {
  let loader_data = router_data
    .get(LOADER_DATA_KEY)
    .and_then(Value::as_object)
    .ok_or(Error::DetailNotFound)?;

  let video_info = W(loader_data)
    .payload_with(VIDEO_INFO_KEY)
    .ok_or(Error::DetailNotFound)?;

  video_info
    .get(ITEM_LIST_KEY)
    .and_then(Value::as_array)
    .and_then(|items| items.first())
    .cloned()
    .ok_or(Error::EmptyContentList)
}

impl<'a> W<&'a Map<String, Value>> {
  fn payload_with(&self, key: &str) -> Option<&'a Value> {
    self
      .0
      .values()
      .filter_map(Value::as_object)
      .filter_map(|payload| payload.get(key))
      .find(|value| value.as_object().map_or(false, |info| !info.is_empty()))
  }
}
