mod router_data;
mod share_page;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::{content::ContentDescriptor, share, Result};

pub use share_page::SharePage;

/// Turns a share URL into the raw, platform-shaped detail record of one
/// post.
#[async_trait]
pub trait Extractor: Send + Sync {
  async fn extract(&self, share_url: &str) -> Result<Value>;
}

/// Runs the whole parse pipeline for a piece of share text.
pub async fn describe(
  extractor: &dyn Extractor,
  share_text: &str,
) -> Result<ContentDescriptor> {
  let url = share::extract_url(share_text)?;
  info!(%url, "extracted share link");

  let detail = extractor.extract(url).await?;
  let content = ContentDescriptor::from_detail(&detail)?;
  info!(
    id = %content.content_id,
    kind = ?content.kind,
    title = %content.title,
    author = %content.author_name,
    videos = content.media_urls.len(),
    images = content.image_urls.len(),
    "parsed content"
  );

  Ok(content)
}
