pub mod drain;
pub mod target;

use std::sync::{Arc};
use std::sync::atomic::{AtomicUsize, Ordering};
use bytes::Bytes;
use http_body_util::Full;

#[inline]
pub fn empty_body() -> Full<Bytes> {
    Full::new(Bytes::new())
}

#[inline]
pub fn byte_body<B: Into<Bytes>>(bytes: B) -> Full<Bytes> {
    Full::new(bytes.into())
}

/// Server-side request accounting, shared between connections.
#[derive(Clone, Default)]
pub struct HitCounter {
    served: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl HitCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a request as started; it stays in flight until the guard drops.
    #[inline]
    #[must_use]
    pub fn enter(&self) -> InFlightGuard {
        self.served.fetch_add(1, Ordering::AcqRel);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub fn served(&self) -> usize {
        self.served.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_in_flight() {
        let counter = HitCounter::new();
        let a = counter.enter();
        let b = counter.enter();
        assert_eq!(counter.in_flight(), 2);
        drop(a);
        let _c = counter.enter();
        drop(b);
        assert_eq!(counter.served(), 3);
        assert_eq!(counter.in_flight(), 1);
        assert_eq!(counter.max_in_flight(), 2);
    }
}
