// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::Error;

const MODULE_EXPORTS: &str = "module.exports";
const EXPORT_DEFAULT: &str = "export default";

/// On-disk manifest encodings
///
/// All of them are parsed into a `serde_json::Value` document first, so syntax problems are reported as parse
///  errors independently from the shape checks done on the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// `ecosystem.config.js` style, an object literal assigned to `module.exports`
    Js,
    Json,
    Toml,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        ext.parse().map_err(|_| {
            Error::parse(format!(
                "can not tell the manifest format of {} from its extension",
                path.display()
            ))
        })
    }

    pub fn parse_document(self, source: &str) -> Result<Value, Error> {
        match self {
            Format::Js => json5::from_str(strip_module_wrapper(source)).map_err(Error::parse),
            Format::Json => serde_json::from_str(source).map_err(Error::parse),
            Format::Toml => toml::from_str(source).map_err(Error::parse),
            Format::Yaml => serde_yaml::from_str(source).map_err(Error::parse),
        }
    }

    pub fn render<T: Serialize>(self, document: &T) -> Result<String, Error> {
        let rendered = match self {
            Format::Js => serde_json::to_string_pretty(document)
                .map(|json| format!("{} = {};\n", MODULE_EXPORTS, json))
                .map_err(|e| e.to_string()),
            Format::Json => serde_json::to_string_pretty(document)
                .map(|json| json + "\n")
                .map_err(|e| e.to_string()),
            Format::Toml => toml::to_string_pretty(document).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(document).map_err(|e| e.to_string()),
        };

        rendered.map_err(|e| Error::from(format!("failed to write {} manifest: {}", self, e)))
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "js" | "cjs" | "mjs" | "json5" => Ok(Format::Js),
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            "yaml" | "yml" => Ok(Format::Yaml),
            _ => Err(Error::parse(format!("unknown manifest format: {}", s))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Js => "js",
            Format::Json => "json",
            Format::Toml => "toml",
            Format::Yaml => "yaml",
        };
        f.write_str(name)
    }
}

/// Reduces `module.exports = {...};` (or `export default {...}`) to the object literal
///
/// Anything before the assignment, like a `'use strict';` line, is dropped. Mentions of `module.exports` that
///  aren't followed by `=` (in a comment, say) are skipped. Sources without an export are returned unchanged and
///  parsed as a bare JSON5 document.
fn strip_module_wrapper(source: &str) -> &str {
    let body = find_export(source, MODULE_EXPORTS, |rest| rest.strip_prefix('='))
        .or_else(|| {
            find_export(source, EXPORT_DEFAULT, |rest| {
                if rest.starts_with('{') {
                    Some(rest)
                } else {
                    None
                }
            })
        })
        .unwrap_or(source);

    let body = body.trim();
    body.strip_suffix(';').unwrap_or(body)
}

/// The text after the first `keyword` whose trimmed remainder `accept` takes
fn find_export<'s>(
    source: &'s str,
    keyword: &str,
    accept: impl Fn(&'s str) -> Option<&'s str>,
) -> Option<&'s str> {
    source
        .match_indices(keyword)
        .find_map(|(idx, _)| accept(source[idx + keyword.len()..].trim_start()))
}
