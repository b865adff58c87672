// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::manifest::Manifest;
use crate::Error;

/// Owns the current manifest for a path and profile
///
/// The manifest is never edited in place, a reload swaps in a completely new value.
#[derive(Debug)]
pub struct ManifestHandle {
    path: PathBuf,
    profile: Option<String>,
    current: watch::Sender<Arc<Manifest>>,
}

impl ManifestHandle {
    pub fn open(path: impl Into<PathBuf>, profile: Option<String>) -> Result<Self, Error> {
        let path = path.into();
        let manifest = Manifest::load_profile(&path, profile.as_deref())?;
        let (current, _) = watch::channel(Arc::new(manifest));

        Ok(Self {
            path,
            profile,
            current,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn current(&self) -> Arc<Manifest> {
        Arc::clone(&self.current.borrow())
    }

    /// Receives each manifest that replaces the current one
    pub fn subscribe(&self) -> watch::Receiver<Arc<Manifest>> {
        self.current.subscribe()
    }

    /// Loads the file again, on failure the previous manifest stays current
    pub fn reload(&self) -> Result<Arc<Manifest>, Error> {
        let manifest = match Manifest::load_profile(&self.path, self.profile.as_deref()) {
            Ok(manifest) => Arc::new(manifest),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    "reload failed, keeping the previous manifest: {}",
                    e
                );
                return Err(e);
            }
        };

        info!(path = %self.path.display(), apps = manifest.apps().len(), "manifest reloaded");
        self.current.send_replace(Arc::clone(&manifest));
        Ok(manifest)
    }
}

/// Differences between the manifest running apps were started from and a newer one
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppChanges {
    /// Apps whose descriptor differs, they need a restart to pick it up
    pub changed: Vec<String>,
    /// Apps no longer in the manifest
    pub removed: Vec<String>,
}

impl AppChanges {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Compares each of `apps` as it was in `launched` with `current`
///
/// Apps that `launched` doesn't know are ignored.
pub fn app_changes<'a>(
    apps: impl IntoIterator<Item = &'a str>,
    launched: &Manifest,
    current: &Manifest,
) -> AppChanges {
    let mut changes = AppChanges::default();

    for app in apps {
        let was = match launched.get(app) {
            Some(was) => was,
            None => continue,
        };

        match current.get(app) {
            None => changes.removed.push(app.to_string()),
            Some(now) if now != was => changes.changed.push(app.to_string()),
            Some(_) => (),
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::manifest::Format;

    const V1: &str = r#"{"apps": [{"name": "api", "script": "uvicorn", "args": "main:app --port 8000"}]}"#;
    const V2: &str = r#"{"apps": [{"name": "api", "script": "uvicorn", "args": "main:app --port 9000"}]}"#;

    #[test]
    fn test_reload_replaces_whole_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        fs::write(&path, V1).unwrap();

        let handle = ManifestHandle::open(&path, None).unwrap();
        let mut updates = handle.subscribe();
        let before = handle.current();

        fs::write(&path, V2).unwrap();
        let after = handle.reload().unwrap();

        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), after);
        assert_eq!(handle.current(), after);
        assert_eq!(before.get("api").unwrap().arguments()[2], "8000");
        assert_eq!(after.get("api").unwrap().arguments()[2], "9000");
    }

    #[test]
    fn test_changes_are_against_launched_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        fs::write(&path, V1).unwrap();

        let handle = ManifestHandle::open(&path, None).unwrap();
        let launched = handle.current();

        fs::write(&path, V2).unwrap();
        let first = app_changes(vec!["api"], &launched, &handle.reload().unwrap());
        assert_eq!(first.changed, ["api"]);

        // nothing edited since, but the running app still has the first settings
        let second = app_changes(vec!["api"], &launched, &handle.reload().unwrap());
        assert_eq!(second, first);

        fs::write(&path, V1).unwrap();
        let reverted = app_changes(vec!["api"], &launched, &handle.reload().unwrap());
        assert!(reverted.is_empty());
    }

    #[test]
    fn test_removed_apps() {
        let launched = Manifest::parse(
            r#"{"apps": [{"name": "api", "script": "uvicorn"}, {"name": "worker", "script": "celery"}]}"#,
            Format::Json,
        )
        .unwrap();
        let current = Manifest::parse(V1, Format::Json).unwrap();

        let changes = app_changes(vec!["api", "worker", "unknown"], &launched, &current);
        assert_eq!(changes.changed, ["api"]);
        assert_eq!(changes.removed, ["worker"]);
    }

    #[test]
    fn test_failed_reload_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apps.json");
        fs::write(&path, V1).unwrap();

        let handle = ManifestHandle::open(&path, None).unwrap();
        let before = handle.current();

        fs::write(&path, "{\"apps\": [").unwrap();
        assert!(handle.reload().unwrap_err().is_parse());
        assert!(Arc::ptr_eq(&before, &handle.current()));
    }
}
