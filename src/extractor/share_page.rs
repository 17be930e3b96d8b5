use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::{config::SHARE_PAGE_BASE, fetcher::send_get, Error, Result};

use super::{router_data, Extractor};

// slide shows are rendered client side and never embed the router data
static SLIDES_PATH_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"/share/slides/(\d+)").expect("valid regex"));

/// Reads post details from the server-rendered mobile share page.
pub struct SharePage {
  client: Client,
  base: String,
}

impl SharePage {
  pub fn new(client: Client) -> Self {
    Self::with_base(client, SHARE_PAGE_BASE)
  }

  pub fn with_base(client: Client, base: impl Into<String>) -> Self {
    let base = base.into().trim_end_matches('/').to_owned();
    Self { client, base }
  }

  /// Follows the redirects of a short link and returns where it lands.
  pub async fn resolve(&self, url: &str) -> Result<String> {
    let resp = send_get(&self.client, url).await?;
    Ok(resp.url().to_string())
  }

  fn video_page_url(&self, id: &str) -> String {
    format!("{}/share/video/{id}/", self.base)
  }
}

fn slides_id(url: &str) -> Option<&str> {
  SLIDES_PATH_REGEX
    .captures(url)
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str())
}

#[async_trait]
impl Extractor for SharePage {
  async fn extract(&self, share_url: &str) -> Result<Value> {
    let resp = send_get(&self.client, share_url).await?;
    let mut page_url = resp.url().to_string();
    debug!(%share_url, resolved = %page_url, "resolved share link");

    let resp = match slides_id(&page_url) {
      Some(id) => {
        let video_url = self.video_page_url(id);
        debug!(%video_url, "slide show page, loading video page instead");
        let resp = send_get(&self.client, &video_url).await?;
        page_url = video_url;
        resp
      }
      None => resp,
    };

    let html = resp
      .text()
      .await
      .map_err(|e| Error::network(page_url.clone(), e))?;

    let raw = router_data::embedded_json(&html)
      .ok_or_else(|| Error::NoEmbeddedData(page_url.clone()))?;
    let router_data = router_data::parse(raw)?;
    router_data::first_item(&router_data)
  }
}

#[cfg(test)]
mod test {
  use std::sync::{Arc, Mutex};

  use axum::{
    extract::Path, http::HeaderMap, response::Redirect, routing::get, Router,
  };
  use reqwest::{header, StatusCode};
  use serde_json::json;

  use super::*;
  use crate::{
    config::{Config, MOBILE_USER_AGENT},
    test_util::{self, sample_detail},
  };

  fn share_html(detail: &Value) -> String {
    let data = json!({
      "loaderData": {
        "video_(id)/page": { "videoInfoRes": { "item_list": [detail] } }
      }
    });
    format!("<html><body><script>window._ROUTER_DATA = {data}</script></body></html>")
  }

  struct Upstream {
    base: String,
    user_agents: Arc<Mutex<Vec<String>>>,
  }

  async fn upstream() -> Upstream {
    let user_agents = Arc::new(Mutex::new(Vec::new()));
    let seen = user_agents.clone();
    let video_html = share_html(&sample_detail());

    let app = Router::new()
      .route(
        "/s/video",
        get(|| async { Redirect::temporary("/share/video/7345678901234567890/") }),
      )
      .route(
        "/s/slides",
        get(|| async { Redirect::temporary("/share/slides/7345678901234567890/") }),
      )
      .route(
        "/s/broken",
        get(|| async { Redirect::temporary("/share/note/1/") }),
      )
      .route(
        "/share/video/:id/",
        get(move |Path(id): Path<String>, headers: HeaderMap| {
          let ua = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
          seen.lock().unwrap().push(ua);
          let html = video_html.clone();
          async move {
            if id == "7345678901234567890" {
              Ok(axum::response::Html(html))
            } else {
              Err(StatusCode::NOT_FOUND)
            }
          }
        }),
      )
      .route(
        "/share/slides/:id/",
        get(|| async { axum::response::Html("<html><div id=root></div></html>") }),
      )
      .route(
        "/share/note/:id/",
        get(|| async { axum::response::Html("<html>nothing here</html>") }),
      )
      .route("/s/gone", get(|| async { StatusCode::NOT_FOUND }));

    let base = test_util::spawn_upstream(app).await;
    Upstream { base, user_agents }
  }

  fn share_page(base: &str) -> SharePage {
    let client = Config::default().page_client().unwrap();
    SharePage::with_base(client, base)
  }

  #[tokio::test]
  async fn test_resolve_follows_redirects() {
    let upstream = upstream().await;
    let page = share_page(&upstream.base);

    let resolved = page
      .resolve(&format!("{}/s/video", upstream.base))
      .await
      .unwrap();

    assert_eq!(
      resolved,
      format!("{}/share/video/7345678901234567890/", upstream.base)
    );
    assert_eq!(
      crate::share::extract_content_id(&resolved).unwrap(),
      "7345678901234567890"
    );
    assert_eq!(*upstream.user_agents.lock().unwrap(), vec![MOBILE_USER_AGENT]);
  }

  #[tokio::test]
  async fn test_resolve_non_2xx_is_network_error() {
    let upstream = upstream().await;
    let page = share_page(&upstream.base);

    let err = page
      .resolve(&format!("{}/s/gone", upstream.base))
      .await
      .unwrap_err();

    assert!(matches!(err, Error::Network { .. }));
    assert_eq!(err.upstream_status(), Some(StatusCode::NOT_FOUND));
  }

  #[tokio::test]
  async fn test_extract_video_page() {
    let upstream = upstream().await;
    let page = share_page(&upstream.base);

    let detail = page
      .extract(&format!("{}/s/video", upstream.base))
      .await
      .unwrap();

    assert_eq!(detail, sample_detail());
  }

  #[tokio::test]
  async fn test_extract_slides_falls_back_to_video_page() {
    let upstream = upstream().await;
    let page = share_page(&upstream.base);

    let detail = page
      .extract(&format!("{}/s/slides", upstream.base))
      .await
      .unwrap();

    assert_eq!(detail["aweme_id"], "7345678901234567890");
    assert_eq!(upstream.user_agents.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_extract_page_without_data() {
    let upstream = upstream().await;
    let page = share_page(&upstream.base);

    let err = page
      .extract(&format!("{}/s/broken", upstream.base))
      .await
      .unwrap_err();

    assert!(matches!(err, Error::NoEmbeddedData(_)));
  }

  #[tokio::test]
  async fn test_extract_unreachable_host() {
    let page = share_page("http://127.0.0.1:1");

    let err = page.extract("http://127.0.0.1:1/s/video").await.unwrap_err();

    assert!(matches!(err, Error::Network { .. }));
  }

  #[test]
  fn test_slides_id() {
    assert_eq!(
      slides_id("https://www.iesdouyin.com/share/slides/7603777432471298643/?x=1"),
      Some("7603777432471298643")
    );
    assert_eq!(slides_id("https://www.iesdouyin.com/share/video/1/"), None);
  }
}
