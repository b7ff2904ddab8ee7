use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Reads a body to the end, discarding the data and counting its bytes.
    pub struct DrainCountFuture<B: Body> {
        #[pin]
        body: B,
        received: u64,
    }
}

impl<B> DrainCountFuture<B>
where
    B: Body,
{
    #[inline]
    #[must_use]
    pub fn new(body: B) -> Self {
        Self { body, received: 0 }
    }
}

impl<B> Future for DrainCountFuture<B>
where
    B: Body,
{
    type Output = Result<u64, anyhow::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            let Some(next_res) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(*slf.received));
            };
            let frame = match next_res {
                Ok(frame) => frame,
                Err(_e) => {
                    return Poll::Ready(Err(anyhow::anyhow!("Failed to poll next frame")));
                }
            };
            // Trailers carry no payload bytes
            if let Some(data) = frame.data_ref() {
                *slf.received += data.remaining() as u64;
            }
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(*slf.received));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte_body, empty_body};

    #[tokio::test]
    async fn counts_full_body() {
        let body = byte_body(vec![7u8; 1536]);
        let received = DrainCountFuture::new(body).await.unwrap();
        assert_eq!(received, 1536);
    }

    #[tokio::test]
    async fn empty_body_counts_zero() {
        let received = DrainCountFuture::new(empty_body()).await.unwrap();
        assert_eq!(received, 0);
    }
}
