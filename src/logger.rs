//! Terminal logging of passthrough requests at configurable verbosity.
//!
//! - Minimal: one line
//! - Compact: request line and response line
//! - Verbose: boxed block with every detail

use crate::config::LogVerbosity;

const SEPARATOR: &str = "────────────────────────────────────────";

/// One request forwarded to the proxy, as seen by the management server.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    pub method: String,
    pub path: String,
    pub model: Option<String>,
    pub provider: String,
    /// Zero when the proxy could not be reached.
    pub status: u16,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ProxiedRequest {
    pub fn succeeded(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("unknown")
    }

    fn status_text(&self) -> &'static str {
        if self.succeeded() {
            "OK"
        } else {
            "ERROR"
        }
    }
}

/// Format duration in human-readable form.
fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

pub fn format_request(req: &ProxiedRequest, verbosity: LogVerbosity) -> String {
    match verbosity {
        LogVerbosity::Minimal => format_minimal(req),
        LogVerbosity::Compact => format_compact(req),
        LogVerbosity::Verbose => format_verbose(req),
    }
}

fn format_minimal(req: &ProxiedRequest) -> String {
    format!(
        "{} {} {} {} {}",
        req.method,
        req.path,
        req.status,
        format_duration(req.latency_ms),
        req.model()
    )
}

fn format_compact(req: &ProxiedRequest) -> String {
    let request_line = format!("→ {} {} [{}] via {}", req.method, req.path, req.model(), req.provider);
    let response_line = match &req.error {
        Some(err) => format!("← failed ({}): {}", format_duration(req.latency_ms), err),
        None => format!(
            "← {} {} ({})",
            req.status,
            req.status_text(),
            format_duration(req.latency_ms)
        ),
    };
    format!("{}\n{}", request_line, response_line)
}

fn format_verbose(req: &ProxiedRequest) -> String {
    let error = req
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", e))
        .unwrap_or_default();

    format!(
        "{separator}\n\
         {method} {path}\n\
         Model: {model}\n\
         Provider: {provider}\n\
         Status: {status} {status_text}\n\
         Timing: {duration} total{error}\n\
         {separator}",
        separator = SEPARATOR,
        method = req.method,
        path = req.path,
        model = req.model(),
        provider = req.provider,
        status = req.status,
        status_text = req.status_text(),
        duration = format_duration(req.latency_ms),
        error = error,
    )
}

/// Emit a formatted record through tracing.
pub fn log_request(req: &ProxiedRequest, verbosity: LogVerbosity) {
    let line = format_request(req, verbosity);
    if req.succeeded() {
        tracing::info!(target: "proxyctl::proxy", "{}", line);
    } else {
        tracing::warn!(target: "proxyctl::proxy", "{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ProxiedRequest {
        ProxiedRequest {
            method: "POST".to_string(),
            path: "/v1/chat/completions".to_string(),
            model: Some("gemini-2.5-pro".to_string()),
            provider: "gemini".to_string(),
            status: 200,
            latency_ms: 1200,
            error: None,
        }
    }

    #[test]
    fn minimal_format_is_single_line() {
        let output = format_request(&sample_request(), LogVerbosity::Minimal);

        assert!(!output.contains('\n'));
        assert_eq!(output, "POST /v1/chat/completions 200 1.2s gemini-2.5-pro");
    }

    #[test]
    fn compact_format_is_two_lines() {
        let output = format_request(&sample_request(), LogVerbosity::Compact);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("→ POST"));
        assert!(lines[0].contains("via gemini"));
        assert_eq!(lines[1], "← 200 OK (1.2s)");
    }

    #[test]
    fn compact_format_shows_transport_error() {
        let mut req = sample_request();
        req.status = 0;
        req.latency_ms = 35;
        req.error = Some("connection refused".to_string());

        let output = format_request(&req, LogVerbosity::Compact);
        assert!(output.ends_with("← failed (35ms): connection refused"));
    }

    #[test]
    fn verbose_format_is_boxed() {
        let mut req = sample_request();
        req.status = 429;

        let output = format_request(&req, LogVerbosity::Verbose);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.first(), Some(&SEPARATOR));
        assert_eq!(lines.last(), Some(&SEPARATOR));
        assert!(output.contains("Provider: gemini"));
        assert!(output.contains("Status: 429 ERROR"));
    }

    #[test]
    fn missing_model_is_reported_as_unknown() {
        let mut req = sample_request();
        req.model = None;

        assert!(format_request(&req, LogVerbosity::Minimal).ends_with("unknown"));
    }
}
