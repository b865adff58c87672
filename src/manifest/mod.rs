// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Loading of process launch manifests
//!
//! A manifest is a single document with an `apps` array, each entry describing one process a supervisor should
//!  start. For example the ecosystem file for a FastAPI service:
//!
//! ```js
//! module.exports = {
//!   apps: [
//!     {
//!       name: "fastapi-chat",
//!       script: "uvicorn",
//!       args: "backend.main:app --host 0.0.0.0 --port 8000",
//!       interpreter: "python3",
//!       cwd: "/home/chat/chat-app",
//!       env: { PYTHONPATH: "." }
//!     }
//!   ]
//! }
//! ```

mod format;

pub use format::Format;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::descriptor::LaunchDescriptor;
use crate::Error;

const APPS: &str = "apps";

/// The validated, immutable contents of a manifest file
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Manifest {
    apps: Vec<LaunchDescriptor>,
}

impl Manifest {
    /// Reads and validates the manifest at `path`, the format follows from the file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        debug!(path = %path.display(), %format, "loading manifest");

        let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&source, format)
    }

    /// Loads the manifest and applies `profile` to every app, see [`Manifest::with_profile`]
    pub fn load_profile(path: impl AsRef<Path>, profile: Option<&str>) -> Result<Self, Error> {
        let manifest = Self::load(path)?;
        match profile {
            Some(profile) => manifest.with_profile(profile),
            None => Ok(manifest),
        }
    }

    pub fn parse(source: &str, format: Format) -> Result<Self, Error> {
        let document = format.parse_document(source)?;
        Self::from_document(document)
    }

    /// Validates an already parsed document
    pub fn from_document(document: Value) -> Result<Self, Error> {
        let mut document = match document {
            Value::Object(map) => map,
            _ => return Err(Error::validation(None, "manifest must be an object")),
        };

        let apps = match document.remove(APPS) {
            Some(Value::Array(apps)) => apps,
            Some(_) => return Err(Error::validation(None, "`apps` must be an array")),
            None => return Err(Error::validation(None, "missing top-level `apps`")),
        };

        for key in document.keys() {
            debug!(key = %key, "ignoring unrecognised manifest setting");
        }

        if apps.is_empty() {
            return Err(Error::validation(None, "`apps` is empty"));
        }

        let apps = apps
            .into_iter()
            .map(LaunchDescriptor::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let mut names = BTreeSet::new();
        for app in &apps {
            if !names.insert(app.name()) {
                return Err(Error::validation(Some(app.name()), "duplicate app name"));
            }
        }

        Ok(Self { apps })
    }

    pub fn render(&self, format: Format) -> Result<String, Error> {
        format.render(self)
    }

    /// Descriptors in manifest order
    pub fn apps(&self) -> &[LaunchDescriptor] {
        &self.apps
    }

    pub fn get(&self, name: &str) -> Option<&LaunchDescriptor> {
        self.apps.iter().find(|app| app.name() == name)
    }

    /// Applies the named profile to every app
    ///
    /// Apps that don't define the profile are left as they are, but at least one must define it.
    pub fn with_profile(&self, profile: &str) -> Result<Self, Error> {
        if !self.apps.iter().any(|app| app.defines_profile(profile)) {
            return Err(Error::validation(
                None,
                format!("no app defines the profile `{}`", profile),
            ));
        }

        debug!(profile, "applying profile");
        Ok(Self {
            apps: self
                .apps
                .iter()
                .map(|app| app.with_profile(profile))
                .collect(),
        })
    }
}

impl IntoIterator for Manifest {
    type Item = LaunchDescriptor;
    type IntoIter = std::vec::IntoIter<LaunchDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.apps.into_iter()
    }
}
