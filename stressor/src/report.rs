use crate::config::OutputFormat;
use crate::statistics::Stats;
use serde::{Serialize, Serializer};
use std::fmt::Write;
use std::time::Duration;
use tracing::warn;

/// Final figures of a run, derived once from the drained stats.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub requests: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub errors: u64,
    #[serde(rename = "received_bytes", skip_serializing_if = "is_zero")]
    pub received_bytes: u64,
    #[serde(rename = "requests/sec")]
    pub requests_per_second: f64,
    #[serde(rename = "Bytes/sec")]
    pub bytes_per_second: f64,
    #[serde(serialize_with = "as_nanos")]
    pub avg_latency: Duration,
    #[serde(rename = "latencies", serialize_with = "as_nanos")]
    pub total_latency: Duration,
    #[serde(serialize_with = "as_nanos")]
    pub slowest: Duration,
    #[serde(serialize_with = "as_nanos")]
    pub fastest: Duration,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn as_nanos<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

impl Report {
    /// Throughput is extrapolated from the mean latency and the concurrency.
    /// An empty run reports zeros rather than dividing by zero.
    #[must_use]
    pub fn from_stats(stats: &Stats, concurrency: usize) -> Self {
        let requests = stats.request_count as f64;
        let avg_latency_secs = if stats.request_count > 0 {
            stats.total_latency.as_secs_f64() / requests
        } else {
            0.0
        };
        let requests_per_second = if avg_latency_secs > 0.0 {
            (1.0 / avg_latency_secs) * concurrency as f64
        } else {
            requests
        };
        let bytes_per_second = if stats.request_count > 0 {
            (stats.total_bytes as f64 / requests) * requests_per_second
        } else {
            0.0
        };
        Self {
            requests: stats.request_count,
            errors: stats.error_count,
            received_bytes: stats.total_bytes,
            requests_per_second,
            bytes_per_second,
            avg_latency: Duration::from_secs_f64(avg_latency_secs),
            total_latency: stats.total_latency,
            slowest: stats.slowest,
            fastest: stats.fastest,
        }
    }

    /// Tab-indented JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::with_capacity(256);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = format!("\nRequests: {}\n", self.requests);
        if self.errors > 0 {
            let _ = writeln!(out, "Errors: {}", self.errors);
        }
        let _ = write!(
            out,
            "BytesReceived: {}\nRequests/sec: {:.2}\nTransfer/sec: {}\nAvgLatency: {:?}\nLatencies: {:?}\nFastest: {:?}\nSlowest: {:?}\n\n",
            format_bytes(self.received_bytes),
            self.requests_per_second,
            format_bytes(self.bytes_per_second as u64),
            self.avg_latency,
            self.total_latency,
            self.fastest,
            self.slowest,
        );
        out
    }

    /// Renders in `format`, falling back to text if JSON encoding fails.
    #[must_use]
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.to_text(),
            OutputFormat::Json => match self.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to encode report as JSON, printing text");
                    self.to_text()
                }
            },
        }
    }
}

/// Binary-scaled size with two decimals, e.g. `1.50 KB`; plain bytes below 1 KB.
#[must_use]
pub fn format_bytes(b: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * KB;
    const GB: u64 = MB * KB;
    const TB: u64 = GB * KB;
    const PB: u64 = TB * KB;
    const EB: u64 = PB * KB;
    const UNITS: [(u64, &str); 6] = [
        (EB, "EB"),
        (PB, "PB"),
        (TB, "TB"),
        (GB, "GB"),
        (MB, "MB"),
        (KB, "KB"),
    ];
    for (size, suffix) in UNITS {
        if b >= size {
            return format!("{:.2} {suffix}", b as f64 / size as f64);
        }
    }
    format!("{b} Bytes")
}
