use std::{net::SocketAddr, sync::Arc};

use axum::{
  body::StreamBody,
  extract::State,
  headers::ContentType,
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router, TypedHeader,
};
use futures::TryStreamExt;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::{
  config::Config,
  download::{download_content, package, ScratchDir},
  extractor::{describe, Extractor, SharePage},
  fetcher::{Fetcher, HttpFetcher, CHUNK_SIZE},
  proxy::proxy_media,
  util::attachment,
  ByteStream, Error, Result,
};

pub const HOMEPAGE_HTML: &str = include_str!("../html/homepage.html");

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<Config>,
  pub extractor: Arc<dyn Extractor>,
  pub fetcher: Arc<dyn Fetcher>,
  pub proxy_client: reqwest::Client,
}

impl AppState {
  pub fn new(config: Config) -> Result<Self> {
    let extractor = SharePage::new(config.page_client()?);
    let fetcher = HttpFetcher::new(config.media_client()?, config.media_timeout);
    let proxy_client = config.proxy_client()?;

    Ok(Self {
      config: Arc::new(config),
      extractor: Arc::new(extractor),
      fetcher: Arc::new(fetcher),
      proxy_client,
    })
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", get(homepage))
    .route("/health", get(health))
    .route("/api/parse", post(parse))
    .route("/api/download", post(download))
    .route("/api/proxy", get(proxy_media))
    .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
  let app = router(state);

  info!("listening on http://{addr}");
  axum::Server::try_bind(&addr)
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, e))?
    .serve(app.into_make_service())
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
      info!("shutting down");
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

  Ok(())
}

async fn homepage() -> impl IntoResponse {
  (TypedHeader(ContentType::html()), HOMEPAGE_HTML)
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}

#[derive(Deserialize)]
pub struct ShareReq {
  share_text: String,
}

async fn parse(
  State(state): State<AppState>,
  Json(req): Json<ShareReq>,
) -> Result<impl IntoResponse> {
  let content = describe(&*state.extractor, &req.share_text).await?;
  Ok(Json(json!({ "success": true, "data": content })))
}

async fn download(
  State(state): State<AppState>,
  Json(req): Json<ShareReq>,
) -> Result<Response> {
  let content = describe(&*state.extractor, &req.share_text).await?;

  // dropped on every exit path, taking the files with it
  let scratch = ScratchDir::allocate(&state.config.scratch_root).await?;
  let result =
    download_content(&*state.fetcher, content, scratch.path()).await?;
  let artifact = package(&result, scratch.path()).await?;

  let file = File::open(&artifact.path).await?;
  let len = file.metadata().await?.len();
  info!(file = %artifact.file_name, bytes = len, "sending download");

  let stream = ReaderStream::with_capacity(file, CHUNK_SIZE).map_err(Error::from);
  let body = ByteStream::new(stream).total_bytes(Some(len)).keep_alive(scratch);

  let headers = [
    (header::CONTENT_TYPE, artifact.mime_type.to_owned()),
    (header::CONTENT_LENGTH, len.to_string()),
    (header::CONTENT_DISPOSITION, attachment(&artifact.file_name)),
  ];
  Ok((headers, StreamBody::new(body)).into_response())
}
