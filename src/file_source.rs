//! File-backed, reloadable property source.

use crate::error::{ConfigError, ConfigResult};
use crate::parser::{detect_parser_by_extension, ConfigParser};
use crate::source::{ChangeCallback, ChangeNotifier, PropertySource, SubscriptionId};
use crate::watcher::FileWatcher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error};

/// Property source that loads a configuration file.
///
/// The format is detected from the file extension (see
/// [`detect_parser_by_extension`]). A failed reload keeps the previously
/// loaded values; a successful reload that changes any value notifies
/// subscribers.
pub struct FileSource {
    /// Path to the configuration file
    file_path: PathBuf,
    /// Parser for the file format
    parser: Box<dyn ConfigParser>,
    /// Flattened property values
    data: RwLock<HashMap<String, String>>,
    /// Last modification time for change detection
    last_modified: RwLock<Option<SystemTime>>,
    notifier: ChangeNotifier,
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("file_path", &self.file_path)
            .field("parser", &self.parser.name())
            .field("properties", &self.data.read().len())
            .field("last_modified", &*self.last_modified.read())
            .finish()
    }
}

impl FileSource {
    /// Loads a configuration file, choosing the parser from its extension.
    ///
    /// # Errors
    /// * `ConfigError::Parse` - If the extension is unsupported or the content is invalid
    /// * `ConfigError::Io` - If the file cannot be read
    pub fn new<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::parse_error(
                    path.display().to_string(),
                    "cannot detect configuration format without a file extension",
                )
            })?;
        let parser = detect_parser_by_extension(extension)?;
        Self::with_parser(path, parser)
    }

    /// Loads a configuration file with an explicit parser.
    pub fn with_parser<P: AsRef<Path>>(
        path: P,
        parser: Box<dyn ConfigParser>,
    ) -> ConfigResult<Self> {
        let file_path = path.as_ref().to_path_buf();
        let (data, modified) = read_file(&file_path, parser.as_ref())?;
        debug!(path = %file_path.display(), properties = data.len(), "loaded configuration file");

        Ok(Self {
            file_path,
            parser,
            data: RwLock::new(data),
            last_modified: RwLock::new(modified),
            notifier: ChangeNotifier::new(),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        *self.last_modified.read()
    }

    pub fn parser(&self) -> &dyn ConfigParser {
        self.parser.as_ref()
    }

    /// Checks if the file has been modified since it was last loaded.
    pub fn is_modified(&self) -> ConfigResult<bool> {
        let current = fs::metadata(&self.file_path)?.modified().ok();
        Ok(current != *self.last_modified.read())
    }

    /// Starts a background watcher that reloads this source whenever the
    /// file changes. Reload failures are logged and the previous values kept.
    pub fn watch(self: &Arc<Self>) -> ConfigResult<FileWatcher> {
        let source = Arc::downgrade(self);
        FileWatcher::new(&self.file_path, move || {
            if let Some(source) = source.upgrade() {
                if let Err(e) = source.reload() {
                    error!(path = %source.file_path.display(), error = %e, "failed to reload watched file");
                }
            }
        })
    }
}

fn read_file(
    path: &Path,
    parser: &dyn ConfigParser,
) -> ConfigResult<(HashMap<String, String>, Option<SystemTime>)> {
    let content = fs::read_to_string(path)?;
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    let data = parser
        .parse(&content)
        .map_err(|e| ConfigError::parse_error(path.display().to_string(), e.to_string()))?;
    Ok((data, modified))
}

impl PropertySource for FileSource {
    fn description(&self) -> String {
        self.file_path.display().to_string()
    }

    fn property_names(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    fn raw_value(&self, name: &str) -> Option<String> {
        self.data.read().get(name).cloned()
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }

    fn is_reloadable(&self) -> bool {
        true
    }

    fn reload(&self) -> ConfigResult<()> {
        let (data, modified) = read_file(&self.file_path, self.parser.as_ref())
            .map_err(|e| ConfigError::source_io(self.description(), e.to_string()))?;

        let changed = {
            let mut current = self.data.write();
            let changed = *current != data;
            *current = data;
            changed
        };
        *self.last_modified.write() = modified;

        if changed {
            debug!(path = %self.file_path.display(), "configuration file content changed");
            self.notifier.notify();
        }
        Ok(())
    }

    fn subscribe(&self, callback: ChangeCallback) -> Option<SubscriptionId> {
        Some(self.notifier.subscribe(callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}
