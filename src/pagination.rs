//! Splitting tall content into fixed-height captures

use crate::ContentBox;

/// Extra viewport height added while stepping through full pages
pub const VIEWPORT_SLACK: u32 = 100;

/// Number of pages for content of `content_height` split at `page_height`:
/// `round(content_height / page_height)`, never less than one.
pub fn page_count(content_height: f64, page_height: u32) -> u32 {
    if page_height == 0 || !content_height.is_finite() || content_height <= 0.0 {
        return 1;
    }
    let n = (content_height / page_height as f64).round();
    (n as u32).max(1)
}

/// What to capture at a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The content element itself
    Element,
    /// The visible viewport
    Viewport,
}

/// One capture of a paginated render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStep {
    /// 1-based
    pub index: u32,
    /// Viewport resize to apply before the capture
    pub resize: Option<(u32, u32)>,
    /// Scroll applied before the capture
    pub scroll: Option<u32>,
    pub target: CaptureTarget,
}

/// The full sequence of viewport changes and captures for a paginated render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pub page_height: u32,
    pub pages: u32,
    /// Resize applied once before the first page
    pub initial_resize: Option<(u32, u32)>,
    pub steps: Vec<PageStep>,
}

impl PagePlan {
    pub fn new(content: ContentBox, page_height: u32) -> Self {
        let pages = page_count(content.height, page_height);
        let width = content.width.ceil().max(1.0) as u32;
        let content_height = content.height.max(0.0) as u32;

        let initial_resize = (pages > 1).then_some((width, page_height + VIEWPORT_SLACK));

        let steps = (1..=pages)
            .map(|index| {
                let resize = (index != 1 && index == pages).then(|| {
                    let remaining = content_height.saturating_sub(page_height * (pages - 1));
                    (width, remaining.max(1))
                });
                let scroll = (index != 1).then_some(page_height);
                let target = if pages == 1 {
                    CaptureTarget::Element
                } else {
                    CaptureTarget::Viewport
                };
                PageStep {
                    index,
                    resize,
                    scroll,
                    target,
                }
            })
            .collect();

        Self {
            page_height,
            pages,
            initial_resize,
            steps,
        }
    }

    /// Whether captures are throttled between pages
    pub fn throttled(&self) -> bool {
        self.pages > 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(width: f64, height: f64) -> ContentBox {
        ContentBox { width, height }
    }

    #[test]
    fn test_page_count_rounds_and_clamps() {
        assert_eq!(page_count(100.0, 4000), 1);
        assert_eq!(page_count(0.0, 4000), 1);
        assert_eq!(page_count(5999.0, 4000), 1);
        assert_eq!(page_count(6000.0, 4000), 2);
        assert_eq!(page_count(10000.0, 4000), 3);
        assert_eq!(page_count(12000.0, 4000), 3);
        assert_eq!(page_count(f64::NAN, 4000), 1);
        assert_eq!(page_count(500.0, 0), 1);
    }

    #[test]
    fn test_single_page_captures_element() {
        let plan = PagePlan::new(content(800.0, 1200.0), 4000);
        assert_eq!(plan.pages, 1);
        assert_eq!(plan.initial_resize, None);
        assert_eq!(
            plan.steps,
            vec![PageStep {
                index: 1,
                resize: None,
                scroll: None,
                target: CaptureTarget::Element
            }]
        );
        assert!(!plan.throttled());
    }

    #[test]
    fn test_three_pages_scroll_and_shrink_last() {
        let plan = PagePlan::new(content(799.5, 10000.0), 4000);
        assert_eq!(plan.pages, 3);
        assert_eq!(plan.initial_resize, Some((800, 4100)));
        assert!(plan.throttled());

        let first = &plan.steps[0];
        assert_eq!((first.resize, first.scroll), (None, None));
        assert_eq!(first.target, CaptureTarget::Viewport);

        let middle = &plan.steps[1];
        assert_eq!((middle.resize, middle.scroll), (None, Some(4000)));

        let last = &plan.steps[2];
        assert_eq!(last.resize, Some((800, 2000)));
        assert_eq!(last.scroll, Some(4000));
    }

    #[test]
    fn test_two_pages_are_not_throttled() {
        let plan = PagePlan::new(content(600.0, 7000.0), 4000);
        assert_eq!(plan.pages, 2);
        assert_eq!(plan.steps[1].resize, Some((600, 3000)));
        assert!(!plan.throttled());
    }
}
