use std::{
  collections::HashMap,
  io,
  net::SocketAddr,
  path::Path,
  sync::{Arc, Mutex},
  time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};

use crate::{
  config::Config,
  extractor::Extractor,
  fetcher::Fetcher,
  server::AppState,
  Error, Result,
};

/// Serves `app` on an ephemeral local port and returns its base url.
pub async fn spawn_upstream(app: Router) -> String {
  let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
  let server = axum::Server::bind(&addr).serve(app.into_make_service());
  let addr = server.local_addr();
  tokio::spawn(server);

  format!("http://{addr}")
}

pub fn state(
  config: Config,
  extractor: FakeExtractor,
  fetcher: FakeFetcher,
) -> AppState {
  let proxy_client = config.proxy_client().unwrap();
  AppState {
    config: Arc::new(config),
    extractor: Arc::new(extractor),
    fetcher: Arc::new(fetcher),
    proxy_client,
  }
}

pub fn sample_detail() -> Value {
  json!({
    "aweme_id": "7345678901234567890",
    "desc": "测试视频标题",
    "author": { "nickname": "TestAuthor" },
    "video": {
      "play_addr": {
        "uri": "v0200fg10000abc123def456",
        "url_list": [
          "https://www.douyin.com/aweme/v1/playwm/?video_id=v0200fg10000abc123def456&line=0",
          "https://www.douyin.com/aweme/v1/playwm/?video_id=v0200fg10000abc123def456&line=1"
        ]
      },
      "cover": {
        "url_list": ["https://p3-sign.douyinpic.com/tos-cn-i/cover.jpeg"]
      },
      "duration": 15000
    }
  })
}

pub fn sample_image_detail() -> Value {
  json!({
    "aweme_id": "7603777432471298643",
    "desc": "测试图文标题",
    "aweme_type": 2,
    "author": { "nickname": "TestImageAuthor" },
    "images": [
      {
        "url_list": [
          "https://p3-sign.douyinpic.com/tos-cn-i/img1.webp",
          "https://p3-sign.douyinpic.com/tos-cn-i/img1_backup.webp"
        ]
      },
      { "url_list": ["https://p3-sign.douyinpic.com/tos-cn-i/img2.webp"] }
    ],
    "video": {
      "play_addr": {
        "uri": "https://sf5-hl-cdn-tos.douyinstatic.com/obj/ies-music/bgm.mp3",
        "url_list": []
      },
      "duration": 0
    }
  })
}

/// Extractor answering from a fixed table of share urls. Unknown urls fail
/// like a deleted post.
#[derive(Default)]
pub struct FakeExtractor {
  details: HashMap<String, Value>,
  requested: Mutex<Vec<String>>,
}

impl FakeExtractor {
  pub fn with(mut self, url: &str, detail: Value) -> Self {
    self.details.insert(url.to_owned(), detail);
    self
  }

  pub fn requested(&self) -> Vec<String> {
    self.requested.lock().unwrap().clone()
  }
}

#[async_trait]
impl Extractor for FakeExtractor {
  async fn extract(&self, share_url: &str) -> Result<Value> {
    self.requested.lock().unwrap().push(share_url.to_owned());
    self
      .details
      .get(share_url)
      .cloned()
      .ok_or(Error::EmptyContentList)
  }
}

/// Fetcher writing canned bytes. Urls that are unknown or marked failing
/// return an error naming the url.
#[derive(Default)]
pub struct FakeFetcher {
  bodies: HashMap<String, Vec<u8>>,
  failing: Vec<String>,
  delay: Option<Duration>,
  requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
  pub fn serving(mut self, url: &str, body: &[u8]) -> Self {
    self.bodies.insert(url.to_owned(), body.to_vec());
    self
  }

  pub fn failing(mut self, url: &str) -> Self {
    self.failing.push(url.to_owned());
    self
  }

  pub fn with_delay(self, delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..self
    }
  }

  pub fn requested(&self) -> Vec<String> {
    self.requested.lock().unwrap().clone()
  }
}

#[async_trait]
impl Fetcher for FakeFetcher {
  async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
    self.requested.lock().unwrap().push(url.to_owned());
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let body = match self.bodies.get(url) {
      Some(body) if !self.failing.iter().any(|u| u == url) => body,
      _ => {
        return Err(Error::IO(io::Error::new(
          io::ErrorKind::Other,
          format!("failed {url}"),
        )))
      }
    };

    tokio::fs::write(dest, body).await?;
    Ok(body.len() as u64)
  }
}
