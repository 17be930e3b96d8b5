use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response};
use tokio::{
  fs::File,
  io::{AsyncWriteExt, BufWriter},
};
use tracing::debug;

use crate::{
  util::{Progress, ProgressFn},
  ByteStream, Error, Result,
};

pub const CHUNK_SIZE: usize = 64 * 1024;

/// GET `url`, failing on transport errors and non-2xx statuses.
pub async fn send_get(client: &Client, url: &str) -> Result<Response> {
  client
    .get(url)
    .send()
    .await
    .and_then(Response::error_for_status)
    .map_err(|e| Error::network(url, e))
}

/// Writes one remote resource to a local file.
///
/// A failed fetch may leave `dest` partially written. There is no retry
/// here, callers move on to another candidate instead.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64>;
}

pub struct HttpFetcher {
  client: Client,
  // longest wait for headers or for the next chunk, not for the whole body
  idle_timeout: Duration,
  progress: Option<ProgressFn>,
}

impl HttpFetcher {
  pub fn new(client: Client, idle_timeout: Duration) -> Self {
    Self {
      client,
      idle_timeout,
      progress: None,
    }
  }

  pub fn with_progress(
    self,
    progress: impl Fn(Progress) + Send + Sync + 'static,
  ) -> Self {
    Self {
      progress: Some(Arc::new(progress)),
      ..self
    }
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
    let resp = tokio::time::timeout(self.idle_timeout, send_get(&self.client, url))
      .await
      .map_err(|_| Error::Stalled(self.idle_timeout))??;
    let total = resp.content_length();
    debug!(%url, ?total, dest = %dest.display(), "downloading");

    let owned_url = url.to_owned();
    let stream = resp
      .bytes_stream()
      .map_err(move |e| Error::network(owned_url.clone(), e))
      .boxed();
    let mut stream = ByteStream::new(stream)
      .total_bytes(total)
      .idle_timeout(self.idle_timeout)
      .on_progress(self.progress.clone());

    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, File::create(dest).await?);
    while let Some(chunk) = stream.try_next().await? {
      writer.write_all(&chunk).await?;
    }
    writer.flush().await?;

    debug!(%url, bytes = stream.transferred(), "download finished");
    Ok(stream.transferred())
  }
}
