//! A fixed-response HTTP target to point a load generator at.

use crate::{byte_body, HitCounter};
use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How the target answers every request, whatever the path or method.
#[derive(Debug, Copy, Clone)]
pub struct TargetBehavior {
    pub delay: Duration,
    pub body_len: usize,
    pub status: StatusCode,
}

impl Default for TargetBehavior {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            body_len: 0,
            status: StatusCode::OK,
        }
    }
}

/// Accepts connections forever, answering each request with `behavior`.
pub async fn serve(
    listener: TcpListener,
    behavior: TargetBehavior,
    counter: HitCounter,
) -> anyhow::Result<()> {
    let body = Bytes::from(vec![b'x'; behavior.body_len]);
    loop {
        let (tcp, _peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        let tcp = TokioIo::new(tcp);
        let counter = counter.clone();
        let body = body.clone();
        tokio::task::spawn(
            hyper::server::conn::http1::Builder::new().serve_connection(
                tcp,
                service_fn(move |req| respond(req, behavior, body.clone(), counter.clone())),
            ),
        );
    }
}

async fn respond<B: Body>(
    _incoming: Request<B>,
    behavior: TargetBehavior,
    body: Bytes,
    counter: HitCounter,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let _in_flight = counter.enter();
    if !behavior.delay.is_zero() {
        tokio::time::sleep(behavior.delay).await;
    }
    let mut resp = Response::new(byte_body(body));
    *resp.status_mut() = behavior.status;
    Ok(resp)
}

/// An in-process target bound to an ephemeral loopback port, stopped on drop.
pub struct TargetHandle {
    addr: SocketAddr,
    counter: HitCounter,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TargetHandle {
    pub async fn spawn(behavior: TargetBehavior) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind target listener")?;
        let addr = listener
            .local_addr()
            .context("Failed to read target address")?;
        let counter = HitCounter::new();
        let task = tokio::spawn(serve(listener, behavior, counter.clone()));
        Ok(Self {
            addr,
            counter,
            task,
        })
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    #[inline]
    #[must_use]
    pub fn counter(&self) -> &HitCounter {
        &self.counter
    }
}

impl Drop for TargetHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
