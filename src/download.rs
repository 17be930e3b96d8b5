use std::{
  fs::File,
  io,
  path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{
  content::{ContentDescriptor, ContentKind, DownloadResult},
  fetcher::Fetcher,
  util::first_ok_in_order,
  Error, Result,
};

const VIDEO_EXT: &str = "mp4";
const IMAGE_EXT: &str = "webp";

/// Directory owned by a single request. Everything under it is removed when
/// the handle is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct ScratchDir(TempDir);

impl ScratchDir {
  pub async fn allocate(root: &Path) -> Result<Self> {
    tokio::fs::create_dir_all(root).await?;
    let parent = root.to_owned();
    let dir = tokio::task::spawn_blocking(move || {
      tempfile::Builder::new().prefix("req-").tempdir_in(parent)
    })
    .await
    .map_err(io::Error::from)??;
    debug!(path = %dir.path().display(), "allocated scratch dir");
    Ok(Self(dir))
  }

  pub fn path(&self) -> &Path {
    self.0.path()
  }
}

impl Drop for ScratchDir {
  fn drop(&mut self) {
    debug!(path = %self.path().display(), "releasing scratch dir");
  }
}

/// A single file ready to hand to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub path: PathBuf,
  pub file_name: String,
  pub mime_type: &'static str,
}

/// Downloads the media of `content` into `dir`.
///
/// Videos try their candidates in order and stop at the first complete
/// transfer. Gallery images are independent: failures are skipped and the
/// download succeeds if at least one image was saved.
pub async fn download_content(
  fetcher: &dyn Fetcher,
  content: ContentDescriptor,
  dir: &Path,
) -> Result<DownloadResult> {
  let saved_paths = match content.kind {
    ContentKind::Video => vec![download_video(fetcher, &content, dir).await?],
    ContentKind::ImageGallery => {
      download_images(fetcher, &content, dir).await?
    }
  };

  Ok(DownloadResult {
    content,
    saved_paths,
    succeeded: true,
  })
}

async fn download_video(
  fetcher: &dyn Fetcher,
  content: &ContentDescriptor,
  dir: &Path,
) -> Result<PathBuf> {
  if content.media_urls.is_empty() {
    return Err(Error::NoDownloadableMedia);
  }

  let dest = dir.join(format!("{}.{VIDEO_EXT}", content.file_stem()));
  let attempts = content.media_urls.len();
  info!(dest = %dest.display(), candidates = attempts, "downloading video");

  let target = dest.as_path();
  let res = first_ok_in_order(&content.media_urls, |url| async move {
    fetcher.fetch_to(url, target).await.map_err(|e| {
      warn!(%url, error = %e, "candidate failed, trying next");
      e
    })
  })
  .await;

  match res {
    Some(Ok(bytes)) => {
      info!(dest = %dest.display(), bytes, "video saved");
      Ok(dest)
    }
    Some(Err(last)) => {
      // whatever is left is a partial transfer
      tokio::fs::remove_file(&dest).await.ok();
      Err(Error::AllCandidatesFailed {
        attempts,
        last: Box::new(last),
      })
    }
    None => Err(Error::NoDownloadableMedia),
  }
}

async fn download_images(
  fetcher: &dyn Fetcher,
  content: &ContentDescriptor,
  dir: &Path,
) -> Result<Vec<PathBuf>> {
  if content.image_urls.is_empty() {
    return Err(Error::NoDownloadableMedia);
  }

  let stem = content.file_stem();
  let total = content.image_urls.len();
  let mut saved = Vec::with_capacity(total);
  let mut last_err = None;

  for (i, url) in content.image_urls.iter().enumerate() {
    let dest = dir.join(format!("{stem}_{}.{IMAGE_EXT}", i + 1));
    info!(image = i + 1, total, dest = %dest.display(), "downloading image");

    match fetcher.fetch_to(url, &dest).await {
      Ok(_) => saved.push(dest),
      Err(e) => {
        warn!(image = i + 1, %url, error = %e, "image failed, skipping");
        tokio::fs::remove_file(&dest).await.ok();
        last_err = Some(e);
      }
    }
  }

  match last_err {
    Some(last) if saved.is_empty() => Err(Error::AllCandidatesFailed {
      attempts: total,
      last: Box::new(last),
    }),
    _ => {
      info!(saved = saved.len(), total, "images saved");
      Ok(saved)
    }
  }
}

/// Turns a download into one file: a single saved file is returned as is,
/// several are zipped into `dir`.
pub async fn package(result: &DownloadResult, dir: &Path) -> Result<Artifact> {
  match result.saved_paths.as_slice() {
    [] => Err(Error::NoDownloadableMedia),
    [path] => Ok(Artifact {
      path: path.clone(),
      file_name: file_name(path),
      mime_type: match result.content.kind {
        ContentKind::Video => "video/mp4",
        ContentKind::ImageGallery => "image/webp",
      },
    }),
    paths => {
      let file_name = format!("{}.zip", result.content.file_stem());
      let archive = dir.join(&file_name);
      let files = paths.to_vec();
      let dest = archive.clone();

      tokio::task::spawn_blocking(move || write_archive(&files, &dest))
        .await
        .map_err(io::Error::from)??;

      Ok(Artifact {
        path: archive,
        file_name,
        mime_type: "application/zip",
      })
    }
  }
}

fn write_archive(files: &[PathBuf], dest: &Path) -> Result<()> {
  let mut zip = ZipWriter::new(File::create(dest)?);
  let options =
    FileOptions::default().compression_method(CompressionMethod::Deflated);

  for path in files {
    zip.start_file(file_name(path), options)?;
    io::copy(&mut File::open(path)?, &mut zip)?;
  }
  zip.finish()?;

  debug!(dest = %dest.display(), entries = files.len(), "archive written");
  Ok(())
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default()
}
