// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("could not read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The manifest is not syntactically valid configuration
    #[error("failed to parse manifest: {0}")]
    Parse(String),
    /// A descriptor is missing a required field, has a field of the wrong type, or breaks an invariant
    #[error("invalid manifest{}: {}", for_app(.app), .reason)]
    Validation { app: Option<String>, reason: String },
    /// The OS refused to start the process
    #[error("failed to launch {app}: {source}")]
    Launch {
        app: String,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("nix error")]
    NixError(#[from] nix::Error),
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

fn for_app(app: &Option<String>) -> String {
    app.as_ref()
        .map(|a| format!(" (app {})", a))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub(crate) fn parse(msg: impl ToString) -> Self {
        Self::from_kind(ErrorKind::Parse(msg.to_string()))
    }

    pub(crate) fn validation(app: Option<&str>, reason: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Validation {
            app: app.map(str::to_string),
            reason: reason.into(),
        })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::from_kind(ErrorKind::Io {
            path: path.into(),
            source,
        })
    }

    pub(crate) fn launch(app: &str, source: io::Error) -> Self {
        Self::from_kind(ErrorKind::Launch {
            app: app.to_string(),
            source,
        })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self.0, ErrorKind::Parse(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.0, ErrorKind::Validation { .. })
    }

    pub fn is_launch(&self) -> bool {
        matches!(self.0, ErrorKind::Launch { .. })
    }

    /// The name of the descriptor this error is about, if known
    pub fn app(&self) -> Option<&str> {
        match &self.0 {
            ErrorKind::Validation { app, .. } => app.as_deref(),
            ErrorKind::Launch { app, .. } => Some(app),
            _ => None,
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
