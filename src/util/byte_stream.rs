use std::{
  future::Future,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
  time::Duration,
};

use bytes::Bytes;
use futures::Stream;
use tokio::time::{Instant, Sleep};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
  pub transferred: u64,
  // known only when the upstream sent a content length
  pub total: Option<u64>,
}

impl Progress {
  pub fn percent(&self) -> Option<f64> {
    match self.total {
      Some(total) if total > 0 => {
        Some(self.transferred as f64 / total as f64 * 100.0)
      }
      _ => None,
    }
  }
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Byte stream that counts what passes through it.
///
/// The stream is consumed once. A guard handed to [`ByteStream::keep_alive`]
/// lives exactly as long as the stream, which is how response bodies keep
/// their backing scratch files around until the last chunk is sent.
///
/// With [`ByteStream::idle_timeout`] set, the stream fails with
/// [`Error::Stalled`] once no chunk arrived for that long. The limit restarts
/// with every chunk, so a slow but steady transfer never trips it.
pub struct ByteStream<T> {
  stream: T,
  transferred: u64,
  total: Option<u64>,
  progress: Option<ProgressFn>,
  idle_timeout: Option<Duration>,
  // armed lazily on the first pending poll, needs a tokio runtime
  idle_deadline: Option<Pin<Box<Sleep>>>,
  _guard: Option<Box<dyn Send + Sync>>,
}

impl<T> ByteStream<T> {
  pub fn new(stream: T) -> Self {
    ByteStream {
      stream,
      transferred: 0,
      total: None,
      progress: None,
      idle_timeout: None,
      idle_deadline: None,
      _guard: None,
    }
  }

  pub fn total_bytes(self, total: Option<u64>) -> Self {
    ByteStream { total, ..self }
  }

  pub fn on_progress(self, progress: Option<ProgressFn>) -> Self {
    ByteStream { progress, ..self }
  }

  pub fn idle_timeout(self, limit: Duration) -> Self {
    ByteStream {
      idle_timeout: Some(limit),
      idle_deadline: None,
      ..self
    }
  }

  pub fn keep_alive(self, guard: impl Send + Sync + 'static) -> Self {
    ByteStream {
      _guard: Some(Box::new(guard)),
      ..self
    }
  }

  pub fn transferred(&self) -> u64 {
    self.transferred
  }
}

impl<T> Stream for ByteStream<T>
where
  T: Stream<Item = Result<Bytes>> + Unpin,
{
  type Item = Result<Bytes>;

  fn poll_next(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Option<Self::Item>> {
    let this = &mut *self;
    let poll = Pin::new(&mut this.stream).poll_next(cx);
    match poll {
      Poll::Ready(Some(Ok(bytes))) => {
        if let (Some(limit), Some(deadline)) =
          (this.idle_timeout, this.idle_deadline.as_mut())
        {
          deadline.as_mut().reset(Instant::now() + limit);
        }
        this.transferred += bytes.len() as u64;
        if let Some(progress) = &this.progress {
          progress(Progress {
            transferred: this.transferred,
            total: this.total,
          });
        }
        Poll::Ready(Some(Ok(bytes)))
      }
      Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
      Poll::Ready(None) => Poll::Ready(None),
      Poll::Pending => {
        let Some(limit) = this.idle_timeout else {
          return Poll::Pending;
        };
        let deadline = this
          .idle_deadline
          .get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
        match deadline.as_mut().poll(cx) {
          Poll::Ready(()) => Poll::Ready(Some(Err(Error::Stalled(limit)))),
          Poll::Pending => Poll::Pending,
        }
      }
    }
  }
}
