// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single managed application within a manifest

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::Error;

/// pm2 spelling for "run the script directly"
const NO_INTERPRETER: &str = "none";
const ENV_PROFILE_PREFIX: &str = "env_";

/// One process entry within the manifest
///
/// Descriptors are only built by validating raw manifest data, so every value of this type
///  has a non-empty name and command, well formed arguments and valid environment keys.
///  Field names on serialization follow the ecosystem file layout (`script`, `args`, `cwd`, `env`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LaunchDescriptor {
    name: String,
    #[serde(rename = "script")]
    command: String,
    #[serde(rename = "args", skip_serializing_if = "Vec::is_empty")]
    arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interpreter: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    interpreter_args: Vec<String>,
    #[serde(rename = "cwd", skip_serializing_if = "Option::is_none")]
    working_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "is_false")]
    watch: bool,
    #[serde(rename = "env", skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    profiles: BTreeMap<String, Profile>,
    /// Keys this crate does not interpret, kept so that a rewrite does not lose them
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// A named overlay, selecting e.g. the production or development variant of an app
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
}

impl Profile {
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn watch(&self) -> Option<bool> {
        self.watch
    }

    pub fn args(&self) -> Option<&[String]> {
        self.args.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl LaunchDescriptor {
    /// Validates one entry of the `apps` array
    pub(crate) fn from_value(value: Value) -> Result<Self, Error> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);

        if !value.is_object() {
            return Err(Error::validation(name.as_deref(), "app entries must be objects"));
        }

        let raw: RawDescriptor = serde_json::from_value(value)
            .map_err(|e| Error::validation(name.as_deref(), e.to_string()))?;

        raw.validate()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The executable (or script, when an interpreter is set) to run
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// `None` when the command is executed directly
    pub fn interpreter(&self) -> Option<&str> {
        self.interpreter.as_deref()
    }

    pub fn interpreter_args(&self) -> &[String] {
        &self.interpreter_args
    }

    /// `None` means the caller's working directory
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn watch(&self) -> bool {
        self.watch
    }

    pub fn profiles(&self) -> &BTreeMap<String, Profile> {
        &self.profiles
    }

    pub fn defines_profile(&self, profile: &str) -> bool {
        self.profiles.contains_key(profile)
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// Returns a copy with the named profile applied, or an unchanged copy if this app doesn't define it.
    ///
    /// `cwd`, `watch` and `args` are replaced when the profile sets them, `env` is merged over the base environment.
    pub fn with_profile(&self, profile: &str) -> Self {
        let mut desc = self.clone();
        let overlay = match self.profiles.get(profile) {
            Some(overlay) => overlay,
            None => return desc,
        };

        if let Some(cwd) = &overlay.cwd {
            desc.working_directory = Some(cwd.clone());
        }
        if let Some(watch) = overlay.watch {
            desc.watch = watch;
        }
        if let Some(args) = &overlay.args {
            desc.arguments = args.clone();
        }
        desc.environment
            .extend(overlay.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        desc
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArgs {
    Line(String),
    List(Vec<String>),
}

impl RawArgs {
    fn into_vec(self, app: &str, field: &str) -> Result<Vec<String>, Error> {
        match self {
            RawArgs::List(args) => Ok(args),
            RawArgs::Line(line) => shell_words::split(&line).map_err(|e| {
                Error::validation(
                    Some(app),
                    format!("`{}` is not a valid shell-style argument string: {}", field, e),
                )
            }),
        }
    }
}

/// Environment values, ecosystem files commonly write `PORT: 8000`
///
/// Numbers keep their written digits, `serde_json::Number` holds any `u64`/`i64` exactly.
#[derive(Deserialize)]
#[serde(untagged)]
enum EnvValue {
    Str(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl From<EnvValue> for String {
    fn from(value: EnvValue) -> Self {
        match value {
            EnvValue::Str(s) => s,
            EnvValue::Number(n) => n.to_string(),
            EnvValue::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawProfile {
    #[serde(default, alias = "workingDirectory")]
    cwd: Option<PathBuf>,
    #[serde(default)]
    watch: Option<bool>,
    #[serde(default)]
    args: Option<RawArgs>,
    #[serde(default)]
    env: BTreeMap<String, EnvValue>,
}

#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "command")]
    script: Option<String>,
    #[serde(default)]
    args: Option<RawArgs>,
    #[serde(default)]
    interpreter: Option<String>,
    #[serde(default)]
    interpreter_args: Option<RawArgs>,
    #[serde(default, alias = "workingDirectory")]
    cwd: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, EnvValue>,
    #[serde(default)]
    watch: Option<bool>,
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl RawDescriptor {
    fn validate(self) -> Result<LaunchDescriptor, Error> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(Error::validation(None, "app is missing `name`")),
        };

        let command = match self.script {
            Some(script) if !script.trim().is_empty() => script,
            _ => {
                return Err(Error::validation(
                    Some(name.as_str()),
                    "missing `script` (or `command`)",
                ))
            }
        };

        let arguments = match self.args {
            Some(args) => args.into_vec(&name, "args")?,
            None => Vec::new(),
        };
        let interpreter_args = match self.interpreter_args {
            Some(args) => args.into_vec(&name, "interpreter_args")?,
            None => Vec::new(),
        };

        let interpreter = self
            .interpreter
            .filter(|i| !i.trim().is_empty() && i != NO_INTERPRETER);

        let environment = env_map(&name, self.env)?;

        let mut profiles = BTreeMap::new();
        for (profile_name, raw) in self.profiles {
            let args = match raw.args {
                Some(args) => Some(args.into_vec(&name, "args")?),
                None => None,
            };
            let profile = Profile {
                cwd: raw.cwd,
                watch: raw.watch,
                args,
                env: env_map(&name, raw.env)?,
            };
            profiles.insert(profile_name, profile);
        }

        // pm2 style `env_production: {...}` blocks extend the env of the matching profile
        let mut extra = BTreeMap::new();
        for (key, value) in self.extra {
            match key.strip_prefix(ENV_PROFILE_PREFIX) {
                Some(profile_name) if !profile_name.is_empty() => {
                    let env: BTreeMap<String, EnvValue> =
                        serde_json::from_value(value).map_err(|e| {
                            Error::validation(Some(name.as_str()), format!("`{}`: {}", key, e))
                        })?;
                    profiles
                        .entry(profile_name.to_string())
                        .or_insert_with(Profile::default)
                        .env
                        .extend(env_map(&name, env)?);
                }
                _ if value.is_null() => {
                    debug!(app = %name, key = %key, "dropping unset app setting");
                }
                _ => {
                    debug!(app = %name, key = %key, "ignoring unrecognised app setting");
                    extra.insert(key, without_nulls(value));
                }
            }
        }

        Ok(LaunchDescriptor {
            name,
            command,
            arguments,
            interpreter,
            interpreter_args,
            working_directory: self.cwd,
            watch: self.watch.unwrap_or(false),
            environment,
            profiles,
            extra,
        })
    }
}

/// `null` means unset in ecosystem files, and TOML has no way to write it
fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(without_nulls)
                .collect(),
        ),
        value => value,
    }
}

fn env_map(
    app: &str,
    raw: BTreeMap<String, EnvValue>,
) -> Result<BTreeMap<String, String>, Error> {
    raw.into_iter()
        .map(|(key, value)| {
            if is_env_identifier(&key) {
                Ok((key, String::from(value)))
            } else {
                Err(Error::validation(
                    Some(app),
                    format!("`{}` is not a valid environment variable name", key),
                ))
            }
        })
        .collect()
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_env_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
