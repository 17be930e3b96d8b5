use axum::{
  body::StreamBody,
  extract::{Query, State},
  response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{server::AppState, util::attachment, ByteStream, Error, Result};

const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Hosts the proxy may forward to. A host is allowed when it equals one of
/// the domains or is a subdomain of one.
#[derive(Debug, Clone)]
pub struct AllowList {
  domains: Vec<String>,
}

impl AllowList {
  pub fn new<S: AsRef<str>>(domains: impl IntoIterator<Item = S>) -> Self {
    let domains = domains
      .into_iter()
      .map(|d| d.as_ref().trim_start_matches('.').to_ascii_lowercase())
      .filter(|d| !d.is_empty())
      .collect();
    Self { domains }
  }

  pub fn permits_host(&self, host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    self.domains.iter().any(|domain| {
      host == *domain
        || host
          .strip_suffix(domain.as_str())
          .map_or(false, |rest| rest.ends_with('.'))
    })
  }

  /// Checks scheme and host of `raw` without touching the network.
  pub fn validate(&self, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
      .map_err(|e| Error::ForbiddenDestination(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
      return Err(Error::ForbiddenDestination(format!(
        "scheme {} is not allowed",
        url.scheme()
      )));
    }

    let host = url.host_str().ok_or_else(|| {
      Error::ForbiddenDestination(format!("{raw} has no host"))
    })?;

    if !self.permits_host(host) {
      return Err(Error::ForbiddenDestination(format!(
        "host {host} is not allowed"
      )));
    }

    Ok(url)
  }
}

#[derive(Deserialize)]
pub struct ProxyReq {
  url: String,
  filename: Option<String>,
}

pub async fn proxy_media(
  State(state): State<AppState>,
  Query(req): Query<ProxyReq>,
) -> Result<Response> {
  let url = state.config.allow_list.validate(&req.url)?;
  info!(%url, "proxying media");

  let send = state.proxy_client.get(url.clone()).send();
  let resp = tokio::time::timeout(state.config.preflight_timeout, send)
    .await
    .map_err(|_| Error::Gateway {
      status: StatusCode::GATEWAY_TIMEOUT,
      message: format!("{url} did not respond in time"),
    })?
    .map_err(|e| gateway_error(&url, e))?;

  let status = resp.status();
  if !status.is_success() {
    return Err(Error::Gateway {
      status,
      message: format!("{url} responded with {status}"),
    });
  }

  let content_type = resp
    .headers()
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or(DEFAULT_CONTENT_TYPE)
    .to_owned();
  let content_length = resp.content_length();
  debug!(%content_type, ?content_length, "upstream responded");

  let mut response_headers = vec![(header::CONTENT_TYPE, content_type)];
  if let Some(len) = content_length {
    response_headers.push((header::CONTENT_LENGTH, len.to_string()));
  }
  if let Some(filename) = req.filename.as_deref().filter(|f| !f.is_empty()) {
    response_headers.push((header::CONTENT_DISPOSITION, attachment(filename)));
  }

  let upstream_url = url.to_string();
  let stream = resp
    .bytes_stream()
    .map_err(move |e| Error::network(upstream_url.clone(), e));
  let body = StreamBody::new(
    ByteStream::new(Box::pin(stream)).idle_timeout(state.config.media_timeout),
  );

  let mut response = body.into_response();
  for (name, value) in response_headers {
    let value = value.parse().map_err(|_| Error::Gateway {
      status: StatusCode::BAD_GATEWAY,
      message: format!("invalid {name} header from {url}"),
    })?;
    response.headers_mut().insert(name, value);
  }

  Ok(response)
}

fn gateway_error(url: &Url, err: reqwest::Error) -> Error {
  if err.is_redirect() {
    return Error::ForbiddenDestination(format!("{url} redirected: {err}"));
  }

  let status = if err.is_timeout() {
    StatusCode::GATEWAY_TIMEOUT
  } else {
    StatusCode::BAD_GATEWAY
  };
  Error::Gateway {
    status,
    message: format!("{url}: {err}"),
  }
}
