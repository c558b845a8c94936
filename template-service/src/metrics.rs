//! In-process request metrics with Prometheus text exposition
//!
//! Two families, keyed by the matched route template rather than the raw
//! path so ids do not explode the label space:
//!
//! - `template_service_requests_total{method,path,status}`
//! - `template_service_request_duration_seconds_{sum,count}{method,path}`

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Duration;

const REQUESTS_TOTAL: &str = "template_service_requests_total";
const REQUEST_DURATION: &str = "template_service_request_duration_seconds";

#[derive(Debug, Default, Clone, Copy)]
struct DurationStats {
    sum: f64,
    count: u64,
}

#[derive(Debug, Default)]
struct Families {
    requests: BTreeMap<(String, String, u16), u64>,
    durations: BTreeMap<(String, String), DurationStats>,
}

/// Request counters shared by every request
#[derive(Debug, Default)]
pub struct Metrics {
    families: Mutex<Families>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished request.
    pub fn observe(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let Ok(mut families) = self.families.lock() else {
            tracing::warn!("Metrics registry poisoned, dropping observation");
            return;
        };

        *families
            .requests
            .entry((method.to_string(), path.to_string(), status))
            .or_default() += 1;

        let stats = families
            .durations
            .entry((method.to_string(), path.to_string()))
            .or_default();
        stats.sum += elapsed.as_secs_f64();
        stats.count += 1;
    }

    /// Total requests recorded for a method/path/status triple.
    pub fn request_count(&self, method: &str, path: &str, status: u16) -> u64 {
        self.families
            .lock()
            .ok()
            .and_then(|f| {
                f.requests
                    .get(&(method.to_string(), path.to_string(), status))
                    .copied()
            })
            .unwrap_or(0)
    }

    /// Render every family in the Prometheus text format (version 0.0.4).
    pub fn render(&self) -> String {
        let mut out = String::new();
        let Ok(families) = self.families.lock() else {
            return out;
        };

        let _ = writeln!(out, "# HELP {} Total HTTP requests handled.", REQUESTS_TOTAL);
        let _ = writeln!(out, "# TYPE {} counter", REQUESTS_TOTAL);
        for ((method, path, status), count) in &families.requests {
            let _ = writeln!(
                out,
                "{}{{method=\"{}\",path=\"{}\",status=\"{}\"}} {}",
                REQUESTS_TOTAL,
                escape_label(method),
                escape_label(path),
                status,
                count
            );
        }

        let _ = writeln!(out, "# HELP {} HTTP request latency in seconds.", REQUEST_DURATION);
        let _ = writeln!(out, "# TYPE {} summary", REQUEST_DURATION);
        for ((method, path), stats) in &families.durations {
            let labels = format!(
                "method=\"{}\",path=\"{}\"",
                escape_label(method),
                escape_label(path)
            );
            let _ = writeln!(out, "{}_sum{{{}}} {}", REQUEST_DURATION, labels, stats.sum);
            let _ = writeln!(out, "{}_count{{{}}} {}", REQUEST_DURATION, labels, stats.count);
        }

        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
