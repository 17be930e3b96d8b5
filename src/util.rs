use futures::Future;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

mod byte_stream;

pub use byte_stream::{ByteStream, Progress, ProgressFn};

#[derive(Default)]
pub struct W<T>(pub T);

// Runs `f` over the items one at a time, in order, and returns the first
// `Ok` result. Items after the first success are never attempted.
//
// Returns `None` when `items` is empty, otherwise the first `Ok`, or the
// last encountered `Err` if every attempt failed.
pub async fn first_ok_in_order<T, A, E, F, Fut>(
  items: impl IntoIterator<Item = T>,
  mut f: F,
) -> Option<Result<A, E>>
where
  F: FnMut(T) -> Fut,
  Fut: Future<Output = Result<A, E>>,
{
  let mut last_err = None;
  for item in items {
    match f(item).await {
      Ok(res) => return Some(Ok(res)),
      Err(e) => {
        last_err = Some(e);
      }
    }
  }

  last_err.map(Err)
}

// RFC 3986 unreserved characters stay as-is
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'.')
  .remove(b'_')
  .remove(b'~');

/// `Content-Disposition` value for a download named `filename`.
pub fn attachment(filename: &str) -> String {
  let encoded = utf8_percent_encode(filename, FILENAME_ENCODE_SET);
  format!("attachment; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod test {
  use std::sync::Mutex;
  use std::time::Duration;

  async fn sleep_and_return<A>(dur: Duration, res: A) -> A {
    tokio::time::sleep(dur).await;
    res
  }

  #[tokio::test]
  async fn test_first_ok_in_order() {
    let attempted = Mutex::new(Vec::new());
    let items = vec![
      // failed one should not be returned
      (1, Duration::from_millis(30), Err(1)),
      // the first successful one should be returned
      (2, Duration::from_millis(40), Ok(2)),
      // a fast successful one at a later position is never attempted
      (3, Duration::from_millis(1), Ok(3)),
    ];

    let res = super::first_ok_in_order(items, |(id, dur, res)| {
      attempted.lock().unwrap().push(id);
      sleep_and_return(dur, res)
    })
    .await;

    assert_eq!(res, Some(Ok(2)));
    assert_eq!(*attempted.lock().unwrap(), vec![1, 2]);
  }

  #[tokio::test]
  async fn test_first_ok_in_order_returns_last_error() {
    let res = super::first_ok_in_order(vec![1, 2, 3], |i| async move {
      Err::<(), _>(i * 10)
    })
    .await;
    assert_eq!(res, Some(Err(30)));

    let res = super::first_ok_in_order(Vec::<i32>::new(), |_| async {
      Ok::<_, ()>(())
    })
    .await;
    assert_eq!(res, None);
  }

  #[test]
  fn test_attachment() {
    assert_eq!(
      super::attachment("测试.mp4"),
      "attachment; filename*=UTF-8''%E6%B5%8B%E8%AF%95.mp4"
    );
    assert_eq!(
      super::attachment("a b_c.webp"),
      "attachment; filename*=UTF-8''a%20b_c.webp"
    );
  }
}
