//! RFox Screenshot Renderer
//!
//! Renders HTML templates to images with a headless browser. A render call
//! substitutes job data into a template, writes the result under
//! `<workDir>/temp/html/<name>/`, loads it in a browser page and captures the
//! content as one image or as a stack of fixed-height pages.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Template cache**: Template text is cached per path and evicted when the file changes
//! - **Browser recycling**: The browser process is restarted every `restartNum` renders
//!
//! # Example
//!
//! ```no_run
//! use rfshot::{RendererConfig, RenderOutput};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let plugin = rfshot::renderer(RendererConfig::default())?;
//! let data = json!({ "tplFile": "./resources/help.html", "title": "Help" });
//! if let Some(RenderOutput::Single(img)) = plugin.render("help", data).await {
//!     std::fs::write("help.jpg", img)?;
//! }
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub mod error;
pub use error::{Error, Result};

pub mod backend;
pub use backend::{BrowserHandle, ContentBox, Launcher, PageHandle};

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod job;
pub use job::{ImageType, RenderJob, RenderOutput, ScreenshotOptions};

pub mod logging;
pub use logging::{LogFacade, RenderLog};

pub mod pagination;
pub mod renderer;
pub use renderer::Renderer;

pub mod template;
pub use template::TemplateStore;

/// Browser engine selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserType::Chromium => "chromium",
            BrowserType::Firefox => "firefox",
            BrowserType::Webkit => "webkit",
        }
    }
}

/// Configuration for the renderer
///
/// Supplied once at construction and never changed afterwards. Keys use the
/// camelCase names of the host framework's `config.yaml`.
///
/// # Examples
///
/// ```
/// let cfg = rfshot::RendererConfig::default();
/// assert!(cfg.headless);
/// assert_eq!(cfg.restart_num, 100);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RendererConfig {
    /// Browser engine to launch
    pub browser_type: BrowserType,
    /// Run without a visible window
    pub headless: bool,
    /// Extra command line arguments for the browser process
    pub args: Vec<String>,
    /// Override the browser binary
    pub executable_path: Option<PathBuf>,
    /// Recycle the browser after this many captures (0 disables recycling)
    pub restart_num: u64,
    /// Root for `temp/html` output and `resources/`; defaults to the process working directory
    pub work_dir: Option<PathBuf>,
    /// Seconds the CDP connection may stay idle before the browser is considered gone
    pub idle_timeout_secs: u64,
    /// Initial window size as `[width, height]`
    pub window_size: (u32, u32),
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::default(),
            headless: true,
            args: Vec::new(),
            executable_path: None,
            restart_num: 100,
            work_dir: None,
            idle_timeout_secs: 24 * 60 * 60,
            window_size: (1280, 720),
        }
    }
}

impl RendererConfig {
    /// Parse a YAML document into a config. Missing keys take their defaults.
    pub fn from_yaml_str(src: &str) -> Result<Self> {
        if src.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(src).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load a config from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&src)
    }

    /// Absolute root directory that output paths and `file://` URLs are built from
    pub fn resolve_work_dir(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(match &self.work_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }
}

/// Renderer entry point handed to the host plugin framework
#[derive(Clone)]
pub struct RendererPlugin {
    renderer: std::sync::Arc<Renderer>,
}

impl RendererPlugin {
    pub const ID: &'static str = "rfshot";
    pub const KIND: &'static str = "image";

    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer: std::sync::Arc::new(renderer),
        }
    }

    /// Renderer identifier, matched against the host's renderer selection
    pub fn id(&self) -> &'static str {
        Self::ID
    }

    /// Output kind; only images are produced
    pub fn kind(&self) -> &'static str {
        Self::KIND
    }

    /// Render `data.tplFile` to one image, or to several when `data.multiPage` is set.
    /// Failures are logged and yield `None`.
    pub async fn render(&self, name: &str, data: serde_json::Value) -> Option<RenderOutput> {
        self.renderer.screenshot(name, data).await
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
}

/// Create the plugin with the headless Chrome backend and the `log` facade.
#[cfg(feature = "cdp")]
pub fn renderer(config: RendererConfig) -> Result<RendererPlugin> {
    let renderer = Renderer::new(
        config,
        std::sync::Arc::new(cdp::CdpLauncher),
        std::sync::Arc::new(LogFacade),
    )?;
    Ok(RendererPlugin::new(renderer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.browser_type, BrowserType::Chromium);
        assert!(config.headless);
        assert!(config.args.is_empty());
        assert!(config.executable_path.is_none());
        assert_eq!(config.restart_num, 100);
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
browserType: chromium
headless: false
args:
  - --no-sandbox
  - --disable-gpu
executablePath: /usr/bin/chromium
restartNum: 20
"#;
        let config = RendererConfig::from_yaml_str(yaml).unwrap();
        assert!(!config.headless);
        assert_eq!(config.args, vec!["--no-sandbox", "--disable-gpu"]);
        assert_eq!(config.executable_path, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(config.restart_num, 20);
        assert_eq!(config.window_size, (1280, 720));
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = RendererConfig::from_yaml_str("").unwrap();
        assert!(config.headless);
        assert_eq!(config.browser_type.as_str(), "chromium");
    }

    #[test]
    fn test_unknown_browser_type_rejected() {
        let err = RendererConfig::from_yaml_str("browserType: netscape").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_relative_work_dir_is_resolved() {
        let config = RendererConfig {
            work_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        let dir = config.resolve_work_dir().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("data"));
    }
}
