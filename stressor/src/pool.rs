use crate::error::StressError;
use bytes::Bytes;
use http_body_util::Full;
use http_test_util::empty_body;
use hyper::{Method, Request, Uri};
use tokio::sync::mpsc;

/// Upper bound on pregenerated requests unless configured otherwise.
pub const MAX_POOL_SIZE: usize = 1 << 15;
/// Throughput assumed when sizing the pool for a timed run.
pub const ESTIMATED_RPS: u64 = 1 << 12;

pub type PooledRequest = Request<Full<Bytes>>;

/// The validated GET every pooled request is built from.
#[derive(Debug, Clone)]
pub struct RequestPrototype {
    uri: Uri,
}

impl RequestPrototype {
    pub fn new(url: &str) -> Result<Self, StressError> {
        let uri: Uri = url.parse().map_err(|source| StressError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(StressError::UnsupportedScheme(other.to_string())),
            None => return Err(StressError::MissingScheme(url.to_string())),
        }
        if uri.host().map_or(true, str::is_empty) {
            return Err(StressError::MissingHost(url.to_string()));
        }
        Ok(Self { uri })
    }

    #[inline]
    pub fn build(&self) -> Result<PooledRequest, StressError> {
        Ok(Request::builder()
            .method(Method::GET)
            .uri(self.uri.clone())
            .body(empty_body())?)
    }
}

#[inline]
#[must_use]
pub fn pool_capacity(estimate: u64, max_pool_size: usize) -> usize {
    let max = max_pool_size.max(1) as u64;
    estimate.clamp(1, max) as usize
}

/// Consuming end of the pool, owned by the dispatcher.
pub struct RequestPool {
    requests: mpsc::Receiver<PooledRequest>,
    capacity: usize,
}

/// Producing end of the pool, owned by the run controller.
#[derive(Clone)]
pub struct PoolReplenisher {
    prototype: RequestPrototype,
    requests: mpsc::Sender<PooledRequest>,
}

impl RequestPool {
    /// Creates a pool of `capacity` slots and fills every one of them.
    pub fn fill(
        prototype: RequestPrototype,
        capacity: usize,
    ) -> Result<(Self, PoolReplenisher), StressError> {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        for _ in 0..capacity {
            let request = prototype.build()?;
            if tx.try_send(request).is_err() {
                break;
            }
        }
        let pool = Self {
            requests: rx,
            capacity,
        };
        let replenisher = PoolReplenisher {
            prototype,
            requests: tx,
        };
        Ok((pool, replenisher))
    }

    /// Waits for a pregenerated request.
    pub async fn acquire(&mut self) -> Result<PooledRequest, StressError> {
        self.requests.recv().await.ok_or(StressError::PoolClosed)
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.requests.len()
    }
}

impl PoolReplenisher {
    #[inline]
    #[must_use]
    pub fn prototype(&self) -> &RequestPrototype {
        &self.prototype
    }

    /// Inserts one request, waiting while the pool is full.
    pub async fn replenish(&self, request: PooledRequest) -> Result<(), StressError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| StressError::PoolClosed)
    }

    /// Waits for a free slot, then builds a fresh request into it.
    /// Cancel safe: no request is built until a slot is held.
    pub async fn replenish_one(&self) -> Result<(), StressError> {
        let slot = self
            .requests
            .reserve()
            .await
            .map_err(|_| StressError::PoolClosed)?;
        slot.send(self.prototype.build()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            RequestPrototype::new("not a url"),
            Err(StressError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RequestPrototype::new("https://example.com/"),
            Err(StressError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            RequestPrototype::new("/just/a/path"),
            Err(StressError::MissingScheme(_))
        ));
        assert!(RequestPrototype::new("http://127.0.0.1:8080/index.html").is_ok());
    }

    #[test]
    fn builds_get_without_body() {
        let proto = RequestPrototype::new("http://localhost:9000/a?b=c").unwrap();
        let req = proto.build().unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri(), "http://localhost:9000/a?b=c");
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(pool_capacity(0, 100), 1);
        assert_eq!(pool_capacity(50, 100), 50);
        assert_eq!(pool_capacity(5000, 100), 100);
        assert_eq!(pool_capacity(5000, 0), 1);
    }

    #[tokio::test]
    async fn fill_then_acquire_and_replenish() {
        let proto = RequestPrototype::new("http://localhost/").unwrap();
        let (mut pool, replenisher) = RequestPool::fill(proto, 3).unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.available(), 3);

        for _ in 0..3 {
            pool.acquire().await.unwrap();
        }
        assert_eq!(pool.available(), 0);

        replenisher.replenish_one().await.unwrap();
        let request = replenisher.prototype().build().unwrap();
        replenisher.replenish(request).await.unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn replenish_blocks_when_full() {
        let proto = RequestPrototype::new("http://localhost/").unwrap();
        let (mut pool, replenisher) = RequestPool::fill(proto, 2).unwrap();

        let blocked = timeout(Duration::from_millis(50), replenisher.replenish_one()).await;
        assert!(blocked.is_err(), "replenish should wait for a free slot");

        pool.acquire().await.unwrap();
        timeout(Duration::from_millis(50), replenisher.replenish_one())
            .await
            .expect("a slot is free")
            .unwrap();
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn acquire_fails_once_replenishers_are_gone() {
        let proto = RequestPrototype::new("http://localhost/").unwrap();
        let (mut pool, replenisher) = RequestPool::fill(proto, 1).unwrap();
        drop(replenisher);
        pool.acquire().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(StressError::PoolClosed)));
    }
}
