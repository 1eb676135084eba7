use crate::bounded::{BoxError, BoxStream};

use std::error::Error as StdError;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::{fmt, mem};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;

/// Respresents the body of an HTTP message.
pub struct Body {
    kind: BodyKind,
}

enum BodyKind {
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
    Once(Bytes),
    Empty,
}

impl Body {
    /// Create a `Body` from a stream of bytes.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
    {
        pin_project_lite::pin_project! {
            struct MapErr<S> {
                #[pin]
                inner: S,
            }
        }

        impl<T, E, S> Stream for MapErr<S>
        where
            E: StdError + Send + Sync + 'static,
            S: Stream<Item = Result<T, E>>,
        {
            type Item = Result<T, BoxError>;

            fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
                self.project()
                    .inner
                    .poll_next(cx)
                    .map(|chunk| chunk.map(|chunk| chunk.map_err(|err| Box::new(err) as _)))
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.inner.size_hint()
            }
        }

        Body {
            kind: BodyKind::Stream(Box::pin(MapErr { inner: stream })),
        }
    }

    /// Create a body directly from bytes.
    pub fn once(bytes: impl Into<Bytes>) -> Self {
        Body {
            kind: BodyKind::Once(bytes.into()),
        }
    }

    /// Create an empty `Body`.
    pub fn empty() -> Self {
        Body {
            kind: BodyKind::Empty,
        }
    }

    /// Returns `true` if the body is known to hold no more data.
    pub fn is_end_stream(&self) -> bool {
        matches!(self.kind, BodyKind::Empty)
    }

    /// Attempt to clone the body.
    ///
    /// Returns `None` if the body is a stream, which cannot be cloned.
    pub fn try_clone(&self) -> Option<Body> {
        let kind = match self.kind {
            BodyKind::Stream(_) => return None,
            BodyKind::Once(ref bytes) => BodyKind::Once(bytes.clone()),
            BodyKind::Empty => BodyKind::Empty,
        };

        Some(Body { kind })
    }

    /// Read the next chunk of the body.
    pub async fn chunk(&mut self) -> Option<Result<Bytes, BodyError>> {
        poll_fn(|cx| Pin::new(&mut *self).poll_next(cx))
            .await
            .map(|chunk| chunk.map_err(BodyError))
    }

    /// Read the entire body into memory.
    pub async fn collect(mut self) -> Result<Bytes, BodyError> {
        if let BodyKind::Once(ref mut bytes) = self.kind {
            return Ok(mem::take(bytes));
        }

        let first = match self.chunk().await {
            Some(chunk) => chunk?,
            None => return Ok(Bytes::new()),
        };

        let second = match self.chunk().await {
            Some(chunk) => chunk?,
            None => return Ok(first),
        };

        let cap = first.len() + second.len() + self.size_hint().0;
        let mut bytes = BytesMut::with_capacity(cap);

        bytes.extend_from_slice(&first);
        bytes.extend_from_slice(&second);

        while let Some(chunk) = self.chunk().await {
            bytes.extend_from_slice(&chunk?);
        }

        Ok(bytes.freeze())
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BodyKind::Stream(_) => "Stream",
            BodyKind::Once(_) => "Once",
            BodyKind::Empty => "Empty",
        };

        f.debug_struct("Body").field("kind", &kind).finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::once(bytes)
    }
}

impl From<String> for Body {
    fn from(string: String) -> Self {
        Body::once(string)
    }
}

impl From<&'static str> for Body {
    fn from(string: &'static str) -> Self {
        Body::once(string)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::once(bytes)
    }
}

impl Stream for Body {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.kind {
            BodyKind::Stream(stream) => stream.as_mut().poll_next(cx),
            BodyKind::Once(bytes) => {
                let bytes = mem::take(bytes);
                self.kind = BodyKind::Empty;
                Some(Ok(bytes)).into()
            }
            BodyKind::Empty => None.into(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.kind {
            BodyKind::Stream(stream) => stream.size_hint(),
            BodyKind::Once(bytes) => (bytes.len(), Some(bytes.len())),
            BodyKind::Empty => (0, Some(0)),
        }
    }
}

/// An error that occurred while reading a body stream.
#[derive(Debug, thiserror::Error)]
#[error("failed to read body: {0}")]
pub struct BodyError(#[source] pub BoxError);

#[cfg(test)]
mod tests {
    use super::*;

    struct Chunks(Vec<Result<Bytes, std::io::Error>>);

    impl Stream for Chunks {
        type Item = Result<Bytes, std::io::Error>;

        fn poll_next(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            if self.0.is_empty() {
                Poll::Ready(None)
            } else {
                Poll::Ready(Some(self.0.remove(0)))
            }
        }
    }

    #[tokio::test]
    async fn collect_stream() {
        let body = Body::stream(Chunks(vec![
            Ok(Bytes::from_static(b"hel")),
            Ok(Bytes::from_static(b"lo ")),
            Ok(Bytes::from_static(b"world")),
        ]));

        assert_eq!(body.collect().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn collect_error() {
        let body = Body::stream(Chunks(vec![
            Ok(Bytes::from_static(b"hel")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset")),
        ]));

        let err = body.collect().await.unwrap_err();
        assert_eq!(err.to_string(), "failed to read body: reset");
    }

    #[tokio::test]
    async fn once_yields_single_chunk() {
        let mut body = Body::once("abc");
        assert!(body.try_clone().is_some());
        assert_eq!(body.chunk().await.unwrap().unwrap(), "abc");
        assert!(body.chunk().await.is_none());
        assert!(body.is_end_stream());
    }
}
