//! Logging capability handed to the renderer

/// Sink for renderer log lines
///
/// `mark` is the informational level used for per-render summaries.
pub trait RenderLog: Send + Sync {
    fn debug(&self, msg: &str);
    fn mark(&self, msg: &str);
    fn error(&self, msg: &str);

    /// Highlight a fragment (timings) inside a log line
    fn green(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Forwards to the `log` crate facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl RenderLog for LogFacade {
    fn debug(&self, msg: &str) {
        log::debug!(target: "rfshot", "{}", msg);
    }

    fn mark(&self, msg: &str) {
        log::info!(target: "rfshot", "{}", msg);
    }

    fn error(&self, msg: &str) {
        log::error!(target: "rfshot", "{}", msg);
    }

    fn green(&self, text: &str) -> String {
        console::style(text).green().to_string()
    }
}

/// Formats a byte count the way render summaries print it (`12.34kb`)
pub fn kb(len: usize) -> String {
    format!("{:.2}kb", len as f64 / 1024.0)
}
