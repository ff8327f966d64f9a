//! File system watching for file-backed sources.

use crate::error::{ConfigError, ConfigResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Watches one file and runs a callback on a background thread whenever it
/// is created, modified or replaced.
///
/// The parent directory is watched rather than the file itself so that
/// editors which save by renaming a temporary file are still observed.
/// Dropping the watcher stops the background thread.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    watched_file: PathBuf,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Starts watching `path`, calling `on_change` for every relevant event.
    pub fn new<P, F>(path: P, on_change: F) -> ConfigResult<Self>
    where
        P: AsRef<Path>,
        F: Fn() + Send + 'static,
    {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_watch(format!(
                "Cannot watch non-existent file: {}",
                path.display()
            )));
        }

        let watched_file = path.canonicalize()?;
        let directory = watched_file
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::file_watch("Watched file has no parent directory"))?;

        let (sender, receiver) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(sender)
            .map_err(|e| ConfigError::file_watch(e.to_string()))?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::file_watch(e.to_string()))?;

        let target = watched_file.clone();
        let handle = thread::Builder::new()
            .name("propbind-file-watcher".to_string())
            .spawn(move || {
                // Ends once the watcher, and with it the sender, is dropped.
                for result in receiver {
                    match result {
                        Ok(event) if is_relevant(&event, &target) => {
                            debug!(path = %target.display(), kind = ?event.kind, "watched file changed");
                            on_change();
                        }
                        Ok(_) => {}
                        Err(e) => warn!(path = %target.display(), error = %e, "file watch error"),
                    }
                }
            })?;

        Ok(Self {
            _watcher: watcher,
            watched_file,
            handle: Some(handle),
        })
    }

    /// Returns the canonical path of the watched file.
    pub fn watched_file(&self) -> &Path {
        &self.watched_file
    }

    /// Stops watching and waits for the background thread to finish.
    pub fn stop(mut self) {
        let handle = self.handle.take();
        drop(self);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn is_relevant(event: &Event, target: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    ) && event
        .paths
        .iter()
        .any(|p| p == target || p.file_name() == target.file_name())
}
