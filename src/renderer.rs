//! Template-to-image renderer
//!
//! Owns the browser process, the template store and the render bookkeeping.
//! A render resolves the template to an html file, opens a page on it, measures
//! the content element and captures it either whole or as fixed-height pages.
//! Errors never escape [`Renderer::screenshot`]; they are logged and turned
//! into `None`.

use crate::backend::{BrowserHandle, Launcher, PageHandle};
use crate::job::page_path;
use crate::logging::kb;
use crate::pagination::{CaptureTarget, PagePlan};
use crate::{Error, RenderJob, RenderLog, RenderOutput, RendererConfig, Result, ScreenshotOptions, TemplateStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Delay before a scheduled browser recycle runs
pub const RESTART_DELAY: Duration = Duration::from_millis(100);

/// Pause after each page when more than two pages are captured
pub const PAGE_THROTTLE: Duration = Duration::from_millis(200);

/// Preferred content element, falling back to `body`
const CONTENT_SELECTORS: [&str; 2] = ["#container", "body"];

type BrowserSlot = Arc<tokio::sync::Mutex<Option<Arc<dyn BrowserHandle>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {}", e)))?
}

async fn on_page<T, F>(page: &Arc<dyn PageHandle>, f: F) -> Result<T>
where
    F: FnOnce(&dyn PageHandle) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let page = page.clone();
    blocking(move || f(page.as_ref())).await
}

fn same_browser(a: &Arc<dyn BrowserHandle>, b: &Arc<dyn BrowserHandle>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Marks a render name as in flight for as long as it lives
struct InFlight<'a> {
    names: &'a Mutex<Vec<String>>,
    name: &'a str,
}

impl<'a> InFlight<'a> {
    fn enter(names: &'a Mutex<Vec<String>>, name: &'a str) -> Self {
        lock(names).push(name.to_string());
        Self { names, name }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut names = lock(self.names);
        if let Some(pos) = names.iter().position(|n| n == self.name) {
            names.remove(pos);
        }
    }
}

/// Renders templates to images with a lazily launched, periodically recycled browser
pub struct Renderer {
    config: RendererConfig,
    launcher: Arc<dyn Launcher>,
    log: Arc<dyn RenderLog>,
    templates: Arc<TemplateStore>,
    browser: BrowserSlot,
    in_flight: Mutex<Vec<String>>,
    render_num: AtomicU64,
    launches: AtomicU64,
}

impl Renderer {
    /// Create a renderer. The browser is not launched until the first render.
    pub fn new(config: RendererConfig, launcher: Arc<dyn Launcher>, log: Arc<dyn RenderLog>) -> Result<Self> {
        let work_dir = config.resolve_work_dir()?;
        let templates = TemplateStore::new(work_dir, log.clone());
        std::fs::create_dir_all(templates.output_root())?;

        Ok(Self {
            config,
            launcher,
            log,
            templates: Arc::new(templates),
            browser: Arc::new(tokio::sync::Mutex::new(None)),
            in_flight: Mutex::new(Vec::new()),
            render_num: AtomicU64::new(0),
            launches: AtomicU64::new(0),
        })
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Captures taken so far
    pub fn render_count(&self) -> u64 {
        self.render_num.load(Ordering::SeqCst)
    }

    /// Successful browser launches so far
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Names of renders currently executing
    pub fn in_flight(&self) -> Vec<String> {
        lock(&self.in_flight).clone()
    }

    pub async fn has_browser(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    /// Return the live browser, launching one if needed.
    ///
    /// Only one launch runs at a time: the slot lock is held for the whole
    /// launch and concurrent callers wait on it, then share the result.
    /// A failed launch is logged and yields `None`.
    pub async fn browser_init(&self) -> Option<Arc<dyn BrowserHandle>> {
        let mut slot = self.browser.lock().await;

        if let Some(browser) = slot.as_ref() {
            let b = browser.clone();
            if blocking(move || Ok(b.is_connected())).await.unwrap_or(false) {
                return Some(browser.clone());
            }
            self.log.error("[browser] instance closed or crashed");
            *slot = None;
        }

        let launcher = self.launcher.clone();
        let config = self.config.clone();
        match blocking(move || launcher.launch(&config)).await {
            Ok(browser) => {
                self.launches.fetch_add(1, Ordering::SeqCst);
                self.log
                    .mark(&format!("[browser] {} launched", self.config.browser_type.as_str()));
                *slot = Some(browser.clone());
                Some(browser)
            }
            Err(e) => {
                self.log.error(&format!("[browser] launch failed: {}", e));
                None
            }
        }
    }

    /// Render the job's template to its html file. Returns the written path.
    pub async fn deal_tpl(&self, name: &str, job: &RenderJob, data: serde_json::Value) -> Result<PathBuf> {
        let templates = self.templates.clone();
        let name = name.to_string();
        let job = job.clone();
        blocking(move || {
            let mut data = data;
            templates.render_job(&name, &job, &mut data)
        })
        .await
    }

    /// Render `data.tplFile` for `name` and capture it.
    ///
    /// Returns `Single` unless `data.multiPage` is set, in which case every
    /// page is returned in order. Any failure yields `None`; a failure during
    /// capture also discards the browser so the next call starts a fresh one.
    pub async fn screenshot(&self, name: &str, data: serde_json::Value) -> Option<RenderOutput> {
        let browser = self.browser_init().await?;

        let job = match RenderJob::from_value(&data) {
            Ok(job) => job,
            Err(e) => {
                self.log.error(&format!("[image][{}] {}", name, e));
                return None;
            }
        };

        let save_path = match self.deal_tpl(name, &job, data).await {
            Ok(path) => path,
            Err(e) => {
                self.log.error(&format!("[image][{}] {}", name, e));
                return None;
            }
        };

        let ret = {
            let _guard = InFlight::enter(&self.in_flight, name);
            match self.capture(&browser, name, &job, &save_path).await {
                Ok(ret) => ret,
                Err(e) => {
                    self.log.error(&format!("[image] render failed: {}: {}", name, e));
                    self.discard_browser(&browser).await;
                    return None;
                }
            }
        };

        if ret.first().map_or(true, |buf| buf.is_empty()) {
            self.log.error(&format!("[image] render produced no image: {}", name));
            return None;
        }

        self.restart();

        if job.multi_page {
            Some(RenderOutput::Pages(ret))
        } else {
            ret.into_iter().next().map(RenderOutput::Single)
        }
    }

    async fn capture(
        &self,
        browser: &Arc<dyn BrowserHandle>,
        name: &str,
        job: &RenderJob,
        save_path: &Path,
    ) -> Result<Vec<Vec<u8>>> {
        let start = Instant::now();
        let b = browser.clone();
        let page = blocking(move || b.new_page()).await?;

        let ret = self.capture_page(&page, name, job, save_path, start).await?;

        if let Err(e) = on_page(&page, |p| p.close()).await {
            self.log.error(&format!("[image][{}] page close failed: {}", name, e));
        }
        Ok(ret)
    }

    async fn capture_page(
        &self,
        page: &Arc<dyn PageHandle>,
        name: &str,
        job: &RenderJob,
        save_path: &Path,
        start: Instant,
    ) -> Result<Vec<Vec<u8>>> {
        let url = url::Url::from_file_path(save_path)
            .map_err(|_| Error::LoadError(format!("Not an absolute path: {}", save_path.display())))?;
        let target = url.to_string();
        on_page(page, move |p| p.goto(&target)).await?;

        let mut content = None;
        for selector in CONTENT_SELECTORS {
            if let Some(bbox) = on_page(page, move |p| p.query(selector)).await? {
                content = Some((selector, bbox));
                break;
            }
        }
        let (selector, bbox) =
            content.ok_or_else(|| Error::RenderError("No #container or body element".into()))?;

        let options = job.screenshot_options();
        let mut ret = Vec::new();

        if !job.multi_page {
            let opts = options.clone();
            let buf = on_page(page, move |p| p.screenshot_element(selector, &opts)).await?;
            self.save_capture(&options, &buf, 1, 1).await?;
            self.log.mark(&format!(
                "[image][{}][{} renders] {} {}",
                name,
                self.render_count(),
                kb(buf.len()),
                self.log.green(&format!("{}ms", start.elapsed().as_millis()))
            ));
            self.render_num.fetch_add(1, Ordering::SeqCst);
            ret.push(buf);
            return Ok(ret);
        }

        let plan = PagePlan::new(bbox, job.page_height());
        let total = plan.pages as usize;

        if let Some((w, h)) = plan.initial_resize {
            on_page(page, move |p| p.set_viewport(w, h)).await?;
        }

        for step in &plan.steps {
            if let Some((w, h)) = step.resize {
                on_page(page, move |p| p.set_viewport(w, h)).await?;
            }
            if let Some(dy) = step.scroll {
                on_page(page, move |p| p.scroll_by(dy)).await?;
            }

            let opts = options.clone();
            let buf = match step.target {
                CaptureTarget::Element => on_page(page, move |p| p.screenshot_element(selector, &opts)).await?,
                CaptureTarget::Viewport => on_page(page, move |p| p.screenshot_page(&opts)).await?,
            };
            self.save_capture(&options, &buf, step.index as usize, total).await?;

            if plan.throttled() {
                tokio::time::sleep(PAGE_THROTTLE).await;
            }
            self.render_num.fetch_add(1, Ordering::SeqCst);
            self.log
                .mark(&format!("[image][{}][{}/{}] {}", name, step.index, plan.pages, kb(buf.len())));
            ret.push(buf);
        }

        if plan.pages > 1 {
            self.log.mark(&format!("[image][{}] done", name));
        }
        Ok(ret)
    }

    async fn save_capture(&self, options: &ScreenshotOptions, buf: &[u8], index: usize, total: usize) -> Result<()> {
        let Some(path) = options.path.as_deref() else {
            return Ok(());
        };
        let path = page_path(path, index, total);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, buf).await?;
        Ok(())
    }

    /// Close and forget `browser` if it is still the current one.
    async fn discard_browser(&self, browser: &Arc<dyn BrowserHandle>) {
        let mut slot = self.browser.lock().await;
        if slot.as_ref().is_some_and(|current| same_browser(current, browser)) {
            *slot = None;
        }
        drop(slot);

        let b = browser.clone();
        if let Err(e) = blocking(move || b.close()).await {
            self.log.error(&format!("[browser] close failed: {}", e));
        }
    }

    /// Schedule a browser recycle when the capture count reaches a multiple of
    /// `restart_num` and nothing is in flight. A busy renderer skips that
    /// occurrence.
    fn restart(&self) {
        let restart_num = self.config.restart_num;
        if restart_num == 0 || self.render_count() % restart_num != 0 {
            return;
        }
        if !lock(&self.in_flight).is_empty() {
            return;
        }

        let slot = self.browser.clone();
        let log = self.log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_DELAY).await;
            let browser = slot.lock().await.take();
            if let Some(browser) = browser {
                if let Err(e) = blocking(move || browser.close()).await {
                    log.error(&format!("[browser] close failed: {}", e));
                }
            }
            log.mark("[browser] closed for restart");
        });
    }
}
