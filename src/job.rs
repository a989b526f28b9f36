//! Render job data: what to render and how to capture it

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default page height used when `multiPage` is set without `multiPageHeight`
pub const DEFAULT_PAGE_HEIGHT: u32 = 4000;

/// Default jpeg quality
pub const DEFAULT_QUALITY: u32 = 90;

/// Image encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl ImageType {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
        }
    }
}

/// Options passed to the backend for each capture
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotOptions {
    pub image_type: ImageType,
    /// Drop the default white background (transparent where the page has none)
    pub omit_background: bool,
    /// Jpeg quality 0-100; `None` for png
    pub quality: Option<u32>,
    /// Also write the capture to this file
    pub path: Option<PathBuf>,
}

/// Job fields read from the render data object.
///
/// The whole data object is also the template context, so unknown keys are
/// kept there and ignored here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    /// Template file on disk
    pub tpl_file: PathBuf,
    /// Output file stem; the render name when absent
    #[serde(default)]
    pub save_id: Option<String>,
    #[serde(default)]
    pub img_type: Option<ImageType>,
    #[serde(default)]
    pub quality: Option<u32>,
    #[serde(default)]
    pub omit_background: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub multi_page: bool,
    #[serde(default)]
    pub multi_page_height: Option<u32>,
}

impl RenderJob {
    pub fn from_value(data: &serde_json::Value) -> Result<Self> {
        if !data.is_object() {
            return Err(Error::ConfigError("render data must be an object".into()));
        }
        serde_json::from_value(data.clone())
            .map_err(|e| Error::ConfigError(format!("Invalid render data: {}", e)))
    }

    pub fn save_id<'a>(&'a self, name: &'a str) -> &'a str {
        match self.save_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => name,
        }
    }

    /// Page height for paginated captures. Zero counts as unset.
    pub fn page_height(&self) -> u32 {
        match self.multi_page_height {
            Some(h) if h > 0 => h,
            _ => DEFAULT_PAGE_HEIGHT,
        }
    }

    /// Capture options for this job. Paginated jobs always produce jpeg;
    /// a png request still drops the quality setting. `omitBackground` only
    /// takes effect on png captures, jpeg has no alpha channel.
    pub fn screenshot_options(&self) -> ScreenshotOptions {
        let requested = self.img_type.unwrap_or_default();
        let image_type = if self.multi_page { ImageType::Jpeg } else { requested };
        let quality = match requested {
            ImageType::Png => None,
            ImageType::Jpeg => Some(match self.quality {
                Some(q) if q > 0 => q.min(100),
                _ => DEFAULT_QUALITY,
            }),
        };
        ScreenshotOptions {
            image_type,
            omit_background: self.omit_background && image_type == ImageType::Png,
            quality,
            path: self.path.clone().filter(|p| !p.as_os_str().is_empty()),
        }
    }
}

/// Rendered image data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    Single(Vec<u8>),
    Pages(Vec<Vec<u8>>),
}

impl RenderOutput {
    /// All captured buffers in page order
    pub fn buffers(&self) -> Vec<&[u8]> {
        match self {
            RenderOutput::Single(buf) => vec![buf.as_slice()],
            RenderOutput::Pages(pages) => pages.iter().map(Vec::as_slice).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RenderOutput::Single(_) => 1,
            RenderOutput::Pages(pages) => pages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_pages(self) -> Vec<Vec<u8>> {
        match self {
            RenderOutput::Single(buf) => vec![buf],
            RenderOutput::Pages(pages) => pages,
        }
    }
}

/// File name for page `index` (1-based) of `total` when saving to `path`.
/// Single captures keep `path` as is; pages get a `-<index>` suffix.
pub fn page_path(path: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}-{}", stem, index),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_minimal_data() {
        let job = RenderJob::from_value(&json!({ "tplFile": "a.html" })).unwrap();
        assert_eq!(job.tpl_file, PathBuf::from("a.html"));
        assert_eq!(job.save_id("help"), "help");
        assert!(!job.multi_page);
        assert_eq!(job.page_height(), DEFAULT_PAGE_HEIGHT);

        let opts = job.screenshot_options();
        assert_eq!(opts.image_type, ImageType::Jpeg);
        assert_eq!(opts.quality, Some(90));
        assert!(!opts.omit_background);
        assert!(opts.path.is_none());
    }

    #[test]
    fn test_missing_tpl_file_is_rejected() {
        let err = RenderJob::from_value(&json!({ "saveId": "x" })).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(RenderJob::from_value(&json!("a.html")).is_err());
    }

    #[test]
    fn test_png_drops_quality() {
        let job = RenderJob::from_value(&json!({
            "tplFile": "a.html",
            "imgType": "png",
            "quality": 50,
            "omitBackground": true
        }))
        .unwrap();
        let opts = job.screenshot_options();
        assert_eq!(opts.image_type, ImageType::Png);
        assert_eq!(opts.quality, None);
        assert!(opts.omit_background);
    }

    #[test]
    fn test_multi_page_forces_jpeg() {
        let job = RenderJob::from_value(&json!({
            "tplFile": "a.html",
            "imgType": "png",
            "multiPage": true,
            "multiPageHeight": 1000
        }))
        .unwrap();
        let opts = job.screenshot_options();
        assert_eq!(opts.image_type, ImageType::Jpeg);
        assert_eq!(opts.quality, None);
        assert_eq!(job.page_height(), 1000);
    }

    #[test]
    fn test_jpeg_keeps_background() {
        let job = RenderJob::from_value(&json!({ "tplFile": "a.html", "omitBackground": true })).unwrap();
        let opts = job.screenshot_options();
        assert_eq!(opts.image_type, ImageType::Jpeg);
        assert!(!opts.omit_background);

        let paged = RenderJob::from_value(&json!({
            "tplFile": "a.html",
            "imgType": "png",
            "omitBackground": true,
            "multiPage": true
        }))
        .unwrap();
        assert!(!paged.screenshot_options().omit_background);
    }

    #[test]
    fn test_save_id_and_extra_fields() {
        let job = RenderJob::from_value(&json!({
            "tplFile": "a.html",
            "saveId": "12345",
            "quality": 70,
            "title": "ignored here"
        }))
        .unwrap();
        assert_eq!(job.save_id("help"), "12345");
        assert_eq!(job.screenshot_options().quality, Some(70));
    }

    #[test]
    fn test_page_paths_get_index_suffix() {
        let p = Path::new("out/shot.jpg");
        assert_eq!(page_path(p, 1, 1), PathBuf::from("out/shot.jpg"));
        assert_eq!(page_path(p, 2, 3), PathBuf::from("out/shot-2.jpg"));
        assert_eq!(page_path(Path::new("shot"), 1, 2), PathBuf::from("shot-1"));
    }

    #[test]
    fn test_output_buffers() {
        let single = RenderOutput::Single(vec![1, 2]);
        assert_eq!(single.len(), 1);
        assert_eq!(single.buffers(), vec![&[1u8, 2][..]]);

        let pages = RenderOutput::Pages(vec![vec![1], vec![2]]);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.into_pages(), vec![vec![1], vec![2]]);
    }
}
