use std::time::Duration;

/// Outcome of one dispatched request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestResult {
    pub success: bool,
    pub elapsed: Duration,
    pub bytes_received: u64,
}

impl RequestResult {
    #[inline]
    #[must_use]
    pub fn succeeded(elapsed: Duration, bytes_received: u64) -> Self {
        Self {
            success: true,
            elapsed,
            bytes_received,
        }
    }

    #[inline]
    #[must_use]
    pub fn failed(elapsed: Duration) -> Self {
        Self {
            success: false,
            elapsed,
            bytes_received: 0,
        }
    }
}

/// Running totals over every folded result.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub request_count: u64,
    pub error_count: u64,
    pub total_bytes: u64,
    pub total_latency: Duration,
    pub slowest: Duration,
    pub fastest: Duration,
}

impl Stats {
    #[inline]
    pub fn fold(&mut self, result: &RequestResult) {
        if self.request_count == 0 {
            self.slowest = result.elapsed;
            self.fastest = result.elapsed;
        } else {
            update_extremes(result.elapsed, &mut self.fastest, &mut self.slowest);
        }
        self.request_count += 1;
        self.total_latency += result.elapsed;
        self.total_bytes += result.bytes_received;
        if !result.success {
            self.error_count += 1;
        }
    }
}

fn update_extremes(cur: Duration, min: &mut Duration, max: &mut Duration) {
    if cur < *min {
        *min = cur;
    }
    if cur > *max {
        *max = cur;
    }
}
