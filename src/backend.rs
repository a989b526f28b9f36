//! Browser seam used by the renderer
//!
//! The renderer never talks to a browser library directly. It drives these
//! synchronous traits from blocking tasks (`tokio::task::spawn_blocking`).

use crate::{RendererConfig, Result, ScreenshotOptions};
use std::sync::Arc;

/// Measured size of a DOM element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentBox {
    pub width: f64,
    pub height: f64,
}

/// Starts browser processes
pub trait Launcher: Send + Sync {
    /// Launch the engine selected by `config.browser_type`
    fn launch(&self, config: &RendererConfig) -> Result<Arc<dyn BrowserHandle>>;
}

/// A running browser process
pub trait BrowserHandle: Send + Sync {
    /// Open a fresh page (tab)
    fn new_page(&self) -> Result<Arc<dyn PageHandle>>;

    /// Whether the process is still reachable. A `false` here makes the
    /// renderer discard the handle and launch a new process.
    fn is_connected(&self) -> bool;

    /// Terminate the process
    fn close(&self) -> Result<()>;
}

/// A single page inside a browser
pub trait PageHandle: Send + Sync {
    /// Navigate to `url` and wait for the load to settle
    fn goto(&self, url: &str) -> Result<()>;

    /// Bounding box of the first element matching `selector`, if any
    fn query(&self, selector: &str) -> Result<Option<ContentBox>>;

    /// Resize the visible area
    fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Scroll the viewport down by `dy` pixels
    fn scroll_by(&self, dy: u32) -> Result<()>;

    /// Capture the element matching `selector`
    fn screenshot_element(&self, selector: &str, options: &ScreenshotOptions) -> Result<Vec<u8>>;

    /// Capture the current viewport
    fn screenshot_page(&self, options: &ScreenshotOptions) -> Result<Vec<u8>>;

    fn close(&self) -> Result<()>;
}
