use axum::{
  response::{IntoResponse, Response},
  Json,
};
use reqwest::StatusCode;
use serde_json::json;
use tracing::warn;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Process exit codes of the command line surface.
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("no url found in share text")]
  NoUrlFound,
  // transport failures, timeouts and non-2xx responses
  #[error("request to {url} failed: {source}")]
  Network {
    url: String,
    #[source]
    source: reqwest::Error,
  },
  #[error(
    "no embedded data found on {0}, the page layout may have changed or the link is invalid"
  )]
  NoEmbeddedData(String),
  #[error("failed to parse embedded data: {0}")]
  MalformedData(String),
  #[error("no video detail found in embedded data")]
  DetailNotFound,
  #[error("content list is empty, the post may be deleted or unavailable")]
  EmptyContentList,
  #[error("no data received for {0:?}, transfer stalled")]
  Stalled(std::time::Duration),
  #[error("no downloadable media found")]
  NoDownloadableMedia,
  #[error("all {attempts} candidates failed, last error: {last}")]
  AllCandidatesFailed {
    attempts: usize,
    #[source]
    last: Box<Error>,
  },
  #[error("destination not allowed: {0}")]
  ForbiddenDestination(String),
  #[error("proxy request failed: {message}")]
  Gateway { status: StatusCode, message: String },
  #[error("cannot extract content id from {0}")]
  NoContentId(String),
  #[error("failed to build http client: {0}")]
  HttpClient(#[source] reqwest::Error),
  #[error(transparent)]
  IO(#[from] std::io::Error),
  #[error("failed to write archive: {0}")]
  Archive(#[from] zip::result::ZipError),
}

impl Error {
  pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
    Error::Network {
      url: url.into(),
      source,
    }
  }

  /// Status code returned by the upstream, if the failure was a non-2xx
  /// response.
  pub fn upstream_status(&self) -> Option<StatusCode> {
    match self {
      Error::Network { source, .. } => source.status(),
      Error::Gateway { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn status_code(&self) -> StatusCode {
    match self {
      Error::NoUrlFound | Error::NoContentId(_) => StatusCode::BAD_REQUEST,
      Error::EmptyContentList | Error::NoDownloadableMedia => {
        StatusCode::NOT_FOUND
      }
      Error::ForbiddenDestination(_) => StatusCode::FORBIDDEN,
      Error::Gateway { status, .. } => *status,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      warn!(error = %self, "request failed");
    }

    let body = json!({ "success": false, "detail": self.to_string() });
    (status, Json(body)).into_response()
  }
}
