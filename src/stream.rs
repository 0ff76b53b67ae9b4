//! Streaming JSON responses.
//!
//! Some services answer with consecutive JSON objects written back to back on
//! one connection (`{...}{...}` or one object per line). [`JsonStream`] cuts
//! the byte stream wherever a closing brace is immediately followed by an
//! opening one, optionally with a line break in between, and yields each
//! object as it completes.
//!
//! The cut is purely lexical: a string value containing `}{` is split too and
//! both halves then fail to parse.

use crate::transport::ByteStream;
use crate::{Error, Result};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Accumulates bytes and hands back every complete object segment.
#[derive(Debug, Default)]
pub(crate) struct JsonSplitter {
    buffer: Vec<u8>,
    scanned: usize,
}

impl JsonSplitter {
    /// Appends a chunk and returns the segments it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut segments = Vec::new();
        let mut start = 0;
        let mut i = self.scanned;
        while i < self.buffer.len() {
            if self.buffer[i] == b'}' {
                if let Some(next) = next_object_start(&self.buffer, i + 1) {
                    segments.push(self.buffer[start..=i].to_vec());
                    start = next;
                    i = next;
                    continue;
                }
            }
            i += 1;
        }

        self.buffer.drain(..start);
        // a trailing `}`, `}\r` or `}\r\n` may still be completed by the next chunk
        self.scanned = self.buffer.len().saturating_sub(3);
        segments
    }

    /// Returns whatever is left once the input has ended.
    pub(crate) fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(rest)
        }
    }
}

fn next_object_start(buffer: &[u8], mut position: usize) -> Option<usize> {
    if buffer.get(position) == Some(&b'\r') {
        position += 1;
    }
    if buffer.get(position) == Some(&b'\n') {
        position += 1;
    }
    (buffer.get(position) == Some(&b'{')).then_some(position)
}

/// A stream of JSON objects decoded from a response body.
///
/// Each item is one object, or [`Error::BodyParserFail`] for a segment that
/// is not valid JSON for `T`. A read error from the underlying body is
/// yielded once and ends the stream.
///
/// # Examples
///
/// ```no_run
/// use duplex::{Client, RestRequest};
/// use futures_util::StreamExt;
///
/// # async fn example() -> Result<(), duplex::Error> {
/// let client = Client::rest().base_url("https://api.example.com").build()?;
/// let response = client
///     .stream_request::<serde_json::Value>(RestRequest::get("/events"))
///     .await?;
///
/// let mut events = response.body;
/// while let Some(event) = events.next().await {
///     println!("event: {}", event?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct JsonStream<T> {
    inner: ByteStream,
    splitter: JsonSplitter,
    pending: VecDeque<Vec<u8>>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStream<T> {
    /// Wraps a raw body stream.
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            splitter: JsonSplitter::default(),
            pending: VecDeque::new(),
            finished: false,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for JsonStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStream")
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl<T: DeserializeOwned> Stream for JsonStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(segment) = this.pending.pop_front() {
                let item = serde_json::from_slice(&segment).map_err(|e| {
                    tracing::error!(error = %e, "Failed to parse streamed JSON object");
                    Error::BodyParserFail(Box::new(e))
                });
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    let segments = this.splitter.push(&chunk);
                    this.pending.extend(segments);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if let Some(rest) = this.splitter.finish() {
                        this.pending.push_back(rest);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use serde_json::{json, Value};

    fn body(chunks: &[&'static str]) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        stream::iter(chunks).boxed()
    }

    async fn collect(chunks: &[&'static str]) -> Vec<Result<Value>> {
        JsonStream::<Value>::new(body(chunks)).collect().await
    }

    #[test]
    fn test_splitter_back_to_back_objects() {
        let mut splitter = JsonSplitter::default();
        let segments = splitter.push(br#"{"a":1}{"b":2}{"c":3}"#);
        assert_eq!(segments, vec![br#"{"a":1}"#.to_vec(), br#"{"b":2}"#.to_vec()]);
        assert_eq!(splitter.finish(), Some(br#"{"c":3}"#.to_vec()));
    }

    #[test]
    fn test_splitter_line_breaks() {
        let mut splitter = JsonSplitter::default();
        let segments = splitter.push(b"{\"a\":1}\n{\"b\":2}\r\n{\"c\":3}\n");
        assert_eq!(segments.len(), 2);
        assert_eq!(splitter.finish(), Some(b"{\"c\":3}\n".to_vec()));
    }

    #[test]
    fn test_splitter_boundary_across_chunks() {
        let mut splitter = JsonSplitter::default();
        assert!(splitter.push(br#"{"a":{"n":1}"#).is_empty());
        assert!(splitter.push(b"}\r").is_empty());
        let segments = splitter.push(b"\n{\"b\":2}");
        assert_eq!(segments, vec![br#"{"a":{"n":1}}"#.to_vec()]);
        assert_eq!(splitter.finish(), Some(br#"{"b":2}"#.to_vec()));
    }

    #[test]
    fn test_splitter_ignores_trailing_whitespace() {
        let mut splitter = JsonSplitter::default();
        assert!(splitter.push(b"  \n").is_empty());
        assert_eq!(splitter.finish(), None);
    }

    #[tokio::test]
    async fn test_stream_emits_each_object() {
        let items = collect(&[r#"{"id":1}{"id""#, r#":2}"#, "\n", r#"{"id":3}"#]).await;
        let ids: Vec<Value> = items.into_iter().map(|item| item.unwrap()["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_stream_reports_parse_failures() {
        let items = collect(&[r#"{"id":1}{"id":}"#]).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::BodyParserFail(_))));
    }

    #[tokio::test]
    async fn test_brace_pair_inside_string_is_split() {
        let items = collect(&[r#"{"text":"a}{b"}"#]).await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| matches!(item, Err(Error::BodyParserFail(_)))));
    }

    #[tokio::test]
    async fn test_stream_ends_after_read_error() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(br#"{"id":1}{"#)),
            Err(Error::NotImplemented("connection reset".to_string())),
            Ok(Bytes::from_static(br#""id":2}"#)),
        ];
        let items: Vec<Result<Value>> =
            JsonStream::new(stream::iter(chunks).boxed()).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap()["id"], 1);
        assert!(items[1].is_err());
    }
}
