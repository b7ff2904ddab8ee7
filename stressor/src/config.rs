use crate::error::StressError;
use crate::pool::{pool_capacity, ESTIMATED_RPS, MAX_POOL_SIZE};
use clap::Parser;
use std::ffi::OsString;
use std::time::Duration;

pub const NAME: &str = "stressor";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_VCPUS: usize = 1;
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const LICENSE: &str = "
Copyright (c) the stressor authors

 Permission to use, copy, modify, and distribute this software for any
 purpose with or without fee is hereby granted, provided that the above
 copyright notice and this permission notice appear in all copies.

 THE SOFTWARE IS PROVIDED \"AS IS\" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
";

/// Raw command line, before normalization.
#[derive(Parser, Debug, Clone)]
#[command(
    name = NAME,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct CliArgs {
    /// Number of concurrent requests
    #[arg(short = 'c', default_value_t = DEFAULT_CONCURRENCY as i64, allow_negative_numbers = true)]
    pub concurrency: i64,

    /// How long to run, e.g. 30s, 5m, 1h
    #[arg(short = 'd', default_value = "1m", value_parser = parse_duration)]
    pub duration: Duration,

    /// Total number of requests, takes precedence over -d when > 0
    #[arg(short = 'n', default_value_t = 0, allow_negative_numbers = true)]
    pub requests: i64,

    /// Count received bytes
    #[arg(short = 'b')]
    pub count_bytes: bool,

    /// Print the report as JSON
    #[arg(short = 'j')]
    pub json: bool,

    /// Maximum number of pregenerated requests
    #[arg(short = 'x', default_value_t = MAX_POOL_SIZE)]
    pub max_pool_size: usize,

    /// Number of runtime worker threads
    #[arg(short = 'v', default_value_t = DEFAULT_VCPUS as i64, allow_negative_numbers = true)]
    pub vcpus: i64,

    /// How long to wait for in-flight requests once the run stops
    #[arg(long = "grace", default_value = "5s", value_parser = parse_duration)]
    pub grace: Duration,

    #[arg(short = 'h', long = "help")]
    pub help: bool,

    #[arg(short = 'l')]
    pub license: bool,

    #[arg(long = "version")]
    pub version: bool,

    /// The URL to stress
    pub url: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Keep dispatching until the timer fires.
    Duration(Duration),
    /// Dispatch exactly this many requests.
    Count(u64),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub url: String,
    pub concurrency: usize,
    pub mode: RunMode,
    pub count_bytes: bool,
    pub output: OutputFormat,
    pub max_pool_size: usize,
    pub vcpus: usize,
    pub grace: Duration,
}

impl RunConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, mode: RunMode) -> Self {
        Self {
            url: url.into(),
            concurrency: DEFAULT_CONCURRENCY,
            mode,
            count_bytes: false,
            output: OutputFormat::Text,
            max_pool_size: MAX_POOL_SIZE,
            vcpus: DEFAULT_VCPUS,
            grace: DEFAULT_GRACE,
        }
    }

    /// Number of requests to pregenerate before the run starts.
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        let estimate = match self.mode {
            RunMode::Count(n) => n,
            RunMode::Duration(d) => (d.as_secs_f64() * ESTIMATED_RPS as f64) as u64,
        };
        pool_capacity(estimate, self.max_pool_size)
    }
}

impl CliArgs {
    /// Applies the fallbacks for out-of-range values and picks the run mode.
    pub fn into_run_config(self, available_cpus: usize) -> Result<RunConfig, StressError> {
        let url = self.url.ok_or(StressError::MissingUrl)?;
        let concurrency = if self.concurrency < 1 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency as usize
        };
        let vcpus = if self.vcpus < 1 || self.vcpus as usize > available_cpus {
            DEFAULT_VCPUS
        } else {
            self.vcpus as usize
        };
        let mode = if self.requests > 0 {
            RunMode::Count(self.requests as u64)
        } else {
            RunMode::Duration(self.duration)
        };
        Ok(RunConfig {
            url,
            concurrency,
            mode,
            count_bytes: self.count_bytes,
            output: if self.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            max_pool_size: self.max_pool_size,
            vcpus,
            grace: self.grace,
        })
    }
}

/// Rewrites the single-dash long flags `-help` and `-version` to their
/// double-dash spelling so clap accepts them.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg = arg.into();
            match arg.to_str() {
                Some("-help") => OsString::from("--help"),
                Some("-version") => OsString::from("--version"),
                _ => arg,
            }
        })
        .collect()
}

/// Parses durations written as a sequence of number and unit pairs:
/// `500ms`, `30s`, `5m`, `1h`, `1m30s`. Units are ns, us, ms, s, m and h.
pub fn parse_duration(raw: &str) -> Result<Duration, StressError> {
    let invalid = || StressError::InvalidDuration(raw.to_string());
    let s = raw.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        let tail = &rest[number_len..];
        let unit_len = tail.find(is_number).unwrap_or(tail.len());
        let nanos_per_unit: u64 = match &tail[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return Err(invalid()),
        };
        let nanos = (value * nanos_per_unit as f64).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(invalid());
        }
        total = total
            .checked_add(Duration::from_nanos(nanos as u64))
            .ok_or_else(invalid)?;
        rest = &tail[unit_len..];
    }
    Ok(total)
}

#[must_use]
pub fn version() -> String {
    format!("{NAME} v{}", env!("CARGO_PKG_VERSION"))
}

#[must_use]
pub fn license() -> String {
    format!("\n{}\n{LICENSE}", version())
}

#[must_use]
pub fn usage(program: &str, available_cpus: usize) -> String {
    format!(
        "\
{version}

Usage: {program} [-l | -version] [(-d duration | -n total)] [-c concurrent] [-v vcpus] [-j] [-b] URL

FLAGS:
 -version
    Show version and exit.
 -l
    Show license and exit.
 -h | -help
    Show help and exit.
 -j
    Print the report as JSON (default: false)
 -b
    Count the received bytes (default: false)

OPTIONS:
 -d duration
    Run for a duration of time: a number followed by a unit, one of s, m or h
    (default: 1m)
 -n total
    Total number of requests to perform; overrides -d when given (default: 0)
 -c concurrent
    Number of concurrent requests (default: {concurrency})
 -v vcpus
    Number of runtime worker threads, max of {available_cpus} (default: {vcpus})
 -x size
    Maximum number of pregenerated requests (default: {max_pool})
    Pregenerated requests are held in memory; large pools need a lot of RAM.
 --grace duration
    How long to wait for in-flight requests once the run stops (default: 5s)

ARGUMENTS:
 URL
    The http:// URL to stress
",
        version = version(),
        concurrency = DEFAULT_CONCURRENCY,
        vcpus = DEFAULT_VCPUS,
        max_pool = MAX_POOL_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(normalize_args(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&["stressor", "http://127.0.0.1:8080/"])
            .into_run_config(8)
            .unwrap();
        assert_eq!(cfg.concurrency, 10);
        assert_eq!(cfg.mode, RunMode::Duration(Duration::from_secs(60)));
        assert!(!cfg.count_bytes);
        assert_eq!(cfg.output, OutputFormat::Text);
        assert_eq!(cfg.max_pool_size, 32768);
        assert_eq!(cfg.vcpus, 1);
        assert_eq!(cfg.grace, DEFAULT_GRACE);
    }

    #[test]
    fn count_takes_precedence_over_duration() {
        let cfg = parse(&["stressor", "-d", "10s", "-n", "50", "http://localhost/"])
            .into_run_config(8)
            .unwrap();
        assert_eq!(cfg.mode, RunMode::Count(50));
    }

    #[test]
    fn out_of_range_values_fall_back() {
        let cfg = parse(&["stressor", "-c", "0", "-n", "-3", "-v", "64", "http://localhost/"])
            .into_run_config(8)
            .unwrap();
        assert_eq!(cfg.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cfg.mode, RunMode::Duration(Duration::from_secs(60)));
        assert_eq!(cfg.vcpus, DEFAULT_VCPUS);

        let cfg = parse(&["stressor", "-v", "4", "-c", "3", "-b", "-j", "http://localhost/"])
            .into_run_config(8)
            .unwrap();
        assert_eq!(cfg.vcpus, 4);
        assert_eq!(cfg.concurrency, 3);
        assert!(cfg.count_bytes);
        assert_eq!(cfg.output, OutputFormat::Json);
    }

    #[test]
    fn single_dash_long_flags() {
        assert!(parse(&["stressor", "-version"]).version);
        assert!(parse(&["stressor", "-help"]).help);
        assert!(parse(&["stressor", "-h"]).help);
        assert!(parse(&["stressor", "-l"]).license);
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = parse(&["stressor", "-c", "4"]).into_run_config(8).unwrap_err();
        assert!(matches!(err, StressError::MissingUrl));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        for bad in ["", "10", "s", "10x", "m5", "1.2.3s", "-1s"] {
            assert!(parse_duration(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn pool_capacity_is_estimated_then_capped() {
        let mut cfg = RunConfig::new("http://localhost/", RunMode::Count(50));
        assert_eq!(cfg.pool_capacity(), 50);
        cfg.mode = RunMode::Duration(Duration::from_secs(1));
        assert_eq!(cfg.pool_capacity(), ESTIMATED_RPS as usize);
        cfg.mode = RunMode::Duration(Duration::from_secs(60));
        assert_eq!(cfg.pool_capacity(), MAX_POOL_SIZE);
        cfg.mode = RunMode::Duration(Duration::ZERO);
        assert_eq!(cfg.pool_capacity(), 1);
        cfg.max_pool_size = 0;
        cfg.mode = RunMode::Count(10);
        assert_eq!(cfg.pool_capacity(), 1);
    }

    #[test]
    fn usage_mentions_every_flag() {
        let text = usage("stressor", 8);
        for flag in ["-version", "-l", "-help", "-j", "-b", "-d", "-n", "-c", "-v", "-x", "--grace"] {
            assert!(text.contains(flag), "usage is missing {flag}");
        }
        assert!(license().contains(&version()));
    }
}
