//! Template loading, caching and substitution
//!
//! Template text is cached per template path. The first load of a path also
//! registers a filesystem watch; any change to the file evicts the cached text
//! so the next render reads it from disk again. Watches live as long as the
//! store.

use crate::{Error, RenderJob, RenderLog, Result};
use minijinja::{AutoEscape, Environment};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type TemplateCache = Arc<Mutex<HashMap<PathBuf, Arc<str>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache of template sources plus the watches that invalidate it
pub struct TemplateStore {
    env: Environment<'static>,
    cache: TemplateCache,
    watchers: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
    work_dir: PathBuf,
    log: Arc<dyn RenderLog>,
}

impl TemplateStore {
    /// `work_dir` must be absolute; rendered html goes to `<work_dir>/temp/html`.
    pub fn new(work_dir: impl Into<PathBuf>, log: Arc<dyn RenderLog>) -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self {
            env,
            cache: Arc::new(Mutex::new(HashMap::new())),
            watchers: Mutex::new(HashMap::new()),
            work_dir: work_dir.into(),
            log,
        }
    }

    /// Directory all rendered html is written under
    pub fn output_root(&self) -> PathBuf {
        self.work_dir.join("temp").join("html")
    }

    /// Value injected as `resPath` into every template context
    pub fn resource_path(&self) -> String {
        format!("{}/resources/", self.work_dir.display())
    }

    /// Path the html for render `name` with output stem `save_id` is written to
    pub fn save_path(&self, name: &str, save_id: &str) -> PathBuf {
        self.output_root().join(name).join(format!("{}.html", save_id))
    }

    pub fn is_cached(&self, tpl_file: &Path) -> bool {
        lock(&self.cache).contains_key(tpl_file)
    }

    pub fn is_watched(&self, tpl_file: &Path) -> bool {
        lock(&self.watchers).contains_key(tpl_file)
    }

    /// Drop the cached text for `tpl_file`
    pub fn invalidate(&self, tpl_file: &Path) -> bool {
        lock(&self.cache).remove(tpl_file).is_some()
    }

    /// Template text for `tpl_file`, read from disk when not cached.
    ///
    /// Text is only cached once a watch is in place; a path whose watch
    /// failed is read from disk every time and the watch is retried.
    pub fn load(&self, tpl_file: &Path) -> Result<Arc<str>> {
        if self.is_watched(tpl_file) {
            if let Some(src) = lock(&self.cache).get(tpl_file) {
                return Ok(src.clone());
            }
        }

        let src: Arc<str> = std::fs::read_to_string(tpl_file)
            .map_err(|e| Error::TemplateError(format!("Failed to load html {}: {}", tpl_file.display(), e)))?
            .into();

        match self.watch(tpl_file) {
            Ok(()) => {
                lock(&self.cache).insert(tpl_file.to_path_buf(), src.clone());
            }
            Err(e) => {
                lock(&self.cache).remove(tpl_file);
                self.log
                    .error(&format!("[template] watch failed for {}: {}", tpl_file.display(), e));
            }
        }
        Ok(src)
    }

    /// Register one watch for `tpl_file`; repeated calls are no-ops.
    ///
    /// The parent directory is watched rather than the file so that editors
    /// replacing the file by rename keep triggering evictions.
    pub fn watch(&self, tpl_file: &Path) -> Result<()> {
        let mut watchers = lock(&self.watchers);
        if watchers.contains_key(tpl_file) {
            return Ok(());
        }

        let target = std::fs::canonicalize(tpl_file)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::TemplateError(format!("No parent directory for {}", tpl_file.display())))?;

        let key = tpl_file.to_path_buf();
        let cache = self.cache.clone();
        let log = self.log.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let changed = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
                if changed && event.paths.iter().any(|p| p == &target) && lock(&cache).remove(&key).is_some() {
                    log.mark(&format!("[template changed] {}", key.display()));
                }
            }
            Err(e) => log.error(&format!("[template] watch error for {}: {}", key.display(), e)),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        watchers.insert(tpl_file.to_path_buf(), watcher);
        Ok(())
    }

    /// Substitute `data` into `source`
    pub fn render_str(&self, source: &str, data: &serde_json::Value) -> Result<String> {
        Ok(self.env.render_str(source, data)?)
    }

    /// Render the job's template with `data` and write it under the output
    /// root. Returns the written path.
    pub fn render_job(&self, name: &str, job: &RenderJob, data: &mut serde_json::Value) -> Result<PathBuf> {
        let save_path = self.save_path(name, job.save_id(name));
        let source = self.load(&job.tpl_file)?;

        if let Some(obj) = data.as_object_mut() {
            obj.insert("resPath".into(), serde_json::Value::String(self.resource_path()));
        }

        let html = self.render_str(&source, data)?;
        if let Some(dir) = save_path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(&save_path, html)?;

        self.log
            .debug(&format!("[image][template] {}", save_path.display()));
        Ok(save_path)
    }
}
