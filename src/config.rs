use std::{path::PathBuf, time::Duration};

use reqwest::{
  header::{self, HeaderMap, HeaderValue},
  redirect, Client,
};

use crate::{proxy::AllowList, Error, Result};

// iesdouyin only server-renders share pages for mobile clients
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";
pub const ACCEPT: &str =
  "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";
// CDNs reject media requests without it
pub const REFERER: &str = "https://www.douyin.com/";

pub const SHARE_PAGE_BASE: &str = "https://www.iesdouyin.com";
pub const PLAY_ENDPOINT: &str = "https://aweme.snssdk.com/aweme/v1/play/";

pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
  "douyin.com",
  "iesdouyin.com",
  "douyinvod.com",
  "douyinpic.com",
  "douyincdn.com",
  "douyinstatic.com",
  "snssdk.com",
  "amemv.com",
  "zjcdn.com",
];

const MAX_REDIRECTS: usize = 10;

/// Process-wide settings. Built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct Config {
  pub page_timeout: Duration,
  pub media_timeout: Duration,
  pub preflight_timeout: Duration,
  pub scratch_root: PathBuf,
  pub allow_list: AllowList,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      page_timeout: Duration::from_secs(15),
      media_timeout: Duration::from_secs(120),
      preflight_timeout: Duration::from_secs(30),
      scratch_root: std::env::temp_dir().join("douyin_downloads"),
      allow_list: AllowList::new(DEFAULT_ALLOWED_DOMAINS.iter().copied()),
    }
  }
}

impl Config {
  /// Defaults, overridden by `DOUYIN_SCRATCH_DIR` and extended by the
  /// comma separated domains in `DOUYIN_PROXY_ALLOW`.
  pub fn from_env() -> Self {
    let mut config = Self::default();

    if let Ok(dir) = std::env::var("DOUYIN_SCRATCH_DIR") {
      config.scratch_root = PathBuf::from(dir);
    }

    if let Ok(extra) = std::env::var("DOUYIN_PROXY_ALLOW") {
      let domains = DEFAULT_ALLOWED_DOMAINS
        .iter()
        .copied()
        .chain(extra.split(',').map(str::trim).filter(|s| !s.is_empty()));
      config.allow_list = AllowList::new(domains);
    }

    config
  }

  /// Client for share pages: browser-like accept headers, redirects
  /// followed.
  pub fn page_client(&self) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(
      header::ACCEPT_LANGUAGE,
      HeaderValue::from_static(ACCEPT_LANGUAGE),
    );

    Client::builder()
      .user_agent(MOBILE_USER_AGENT)
      .default_headers(headers)
      .timeout(self.page_timeout)
      .redirect(redirect::Policy::limited(MAX_REDIRECTS))
      .build()
      .map_err(Error::HttpClient)
  }

  /// Client for media transfers.
  pub fn media_client(&self) -> Result<Client> {
    Client::builder()
      .user_agent(MOBILE_USER_AGENT)
      .default_headers(media_headers())
      // transfers may run long, stalls are caught per chunk instead
      .connect_timeout(self.media_timeout)
      .redirect(redirect::Policy::limited(MAX_REDIRECTS))
      .build()
      .map_err(Error::HttpClient)
  }

  /// Like [`Config::media_client`], but every redirect hop has to stay
  /// inside the allow-list.
  pub fn proxy_client(&self) -> Result<Client> {
    let allow_list = self.allow_list.clone();
    let policy = redirect::Policy::custom(move |attempt| {
      if attempt.previous().len() >= MAX_REDIRECTS {
        attempt.error("too many redirects")
      } else if let Err(e) = allow_list.validate(attempt.url().as_str()) {
        attempt.error(e)
      } else {
        attempt.follow()
      }
    });

    Client::builder()
      .user_agent(MOBILE_USER_AGENT)
      .default_headers(media_headers())
      .connect_timeout(self.media_timeout)
      .redirect(policy)
      .build()
      .map_err(Error::HttpClient)
  }
}

fn media_headers() -> HeaderMap {
  let mut headers = HeaderMap::new();
  headers.insert(header::REFERER, HeaderValue::from_static(REFERER));
  headers
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.page_timeout, Duration::from_secs(15));
    assert_eq!(config.media_timeout, Duration::from_secs(120));
    assert_eq!(config.preflight_timeout, Duration::from_secs(30));
    assert!(config.allow_list.permits_host("v3-dy.douyinvod.com"));
    assert!(!config.allow_list.permits_host("example.com"));
  }

  #[test]
  fn test_clients_build() {
    let config = Config::default();
    assert!(config.page_client().is_ok());
    assert!(config.media_client().is_ok());
    assert!(config.proxy_client().is_ok());
  }
}
