use std::{
  fmt::Write as _,
  io::Write as _,
  net::{IpAddr, SocketAddr},
  path::PathBuf,
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

use crate::{
  config::Config,
  content::{ContentDescriptor, ContentKind, DownloadResult},
  download::download_content,
  extractor::{describe, SharePage},
  fetcher::HttpFetcher,
  server::{self, AppState},
  share,
  util::Progress,
  Error, Result,
};

/// Watermark-free video and image downloader for Douyin share links
#[derive(Parser, Debug)]
#[command(name = "douyin-fetch", version)]
pub struct Cli {
  /// More logging, repeat for more
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  pub verbose: u8,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Print what a share link points to without downloading it
  Parse {
    /// Share text copied from the app, or a bare link
    share_text: String,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
  },
  /// Download the video or images behind a share link
  Download {
    share_text: String,
    /// Directory to save into
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
    #[arg(long)]
    json: bool,
  },
  /// Follow a short link and print where it lands
  Resolve { url: String },
  /// Run the web service
  Serve {
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,
    #[arg(long, default_value_t = 8000)]
    port: u16,
  },
}

impl Cli {
  pub fn log_level(&self) -> Level {
    match self.verbose {
      0 => Level::INFO,
      1 => Level::DEBUG,
      _ => Level::TRACE,
    }
  }
}

impl Command {
  /// Commands that run until interrupted instead of finishing on their own.
  pub fn is_long_running(&self) -> bool {
    matches!(self, Command::Serve { .. })
  }

  pub async fn run(self, config: Config) -> Result<()> {
    match self {
      Command::Parse { share_text, json } => {
        let page = SharePage::new(config.page_client()?);
        let content = describe(&page, &share_text).await?;
        if json {
          print_json(&content)?;
        } else {
          print!("{}", content_text(&content));
        }
      }
      Command::Download {
        share_text,
        output,
        json,
      } => {
        let page = SharePage::new(config.page_client()?);
        let content = describe(&page, &share_text).await?;

        tokio::fs::create_dir_all(&output).await?;
        let fetcher =
          HttpFetcher::new(config.media_client()?, config.media_timeout)
            .with_progress(render_progress);
        let result = download_content(&fetcher, content, &output).await;
        // finish the progress line
        eprintln!();

        let result = result?;
        if json {
          print_json(&result)?;
        } else {
          print!("{}", download_text(&result));
        }
      }
      Command::Resolve { url } => {
        let page = SharePage::new(config.page_client()?);
        let resolved = page.resolve(&url).await?;
        println!("{resolved}");
        match share::extract_content_id(&resolved) {
          Ok(id) => println!("content id: {id}"),
          Err(e) => eprintln!("{e}"),
        }
      }
      Command::Serve { host, port } => {
        let state = AppState::new(config)?;
        server::serve(SocketAddr::new(host, port), state).await?;
      }
    }

    Ok(())
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value)
    .map_err(|e| Error::MalformedData(e.to_string()))?;
  println!("{json}");
  Ok(())
}

fn render_progress(progress: Progress) {
  let mb = progress.transferred as f64 / 1024.0 / 1024.0;
  let line = match progress.percent() {
    Some(percent) => format!("\rdownloading: {percent:5.1}% ({mb:.1} MB)"),
    None => format!("\rdownloading: {mb:.1} MB"),
  };

  let mut stderr = std::io::stderr().lock();
  stderr.write_all(line.as_bytes()).ok();
  stderr.flush().ok();
}

pub fn content_text(content: &ContentDescriptor) -> String {
  let mut out = String::new();
  let kind = match content.kind {
    ContentKind::Video => "video",
    ContentKind::ImageGallery => "image post",
  };

  writeln!(out, "title:    {}", content.title).ok();
  writeln!(out, "author:   {}", content.author_name).ok();
  writeln!(out, "id:       {}", content.content_id).ok();
  writeln!(out, "type:     {kind}").ok();
  if content.kind == ContentKind::Video {
    writeln!(out, "duration: {}s", content.duration_seconds).ok();
  }
  writeln!(out, "cover:    {}", content.cover_url).ok();

  let (label, urls) = match content.kind {
    ContentKind::Video => ("video urls", &content.media_urls),
    ContentKind::ImageGallery => ("image urls", &content.image_urls),
  };
  writeln!(out, "{label}:").ok();
  for (i, url) in urls.iter().enumerate() {
    writeln!(out, "  [{}] {url}", i + 1).ok();
  }

  out
}

pub fn download_text(result: &DownloadResult) -> String {
  let mut out = String::new();
  writeln!(
    out,
    "saved {} file(s) for {}",
    result.saved_paths.len(),
    result.content.title
  )
  .ok();
  for path in &result.saved_paths {
    writeln!(out, "  {}", path.display()).ok();
  }
  out
}
