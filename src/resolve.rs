// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Turning a descriptor into the literal process invocation

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::descriptor::LaunchDescriptor;
use crate::Error;

/// What a child inherits from whoever launches it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseEnvironment {
    pub cwd: PathBuf,
    pub vars: BTreeMap<String, String>,
}

impl BaseEnvironment {
    /// Captures the working directory and environment of this process
    ///
    /// Variables whose name or value isn't valid unicode can't be represented in a manifest and are not inherited.
    pub fn current() -> Result<Self, Error> {
        let cwd = env::current_dir()?;
        let vars = env::vars_os()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    debug!(?key, "not inheriting non unicode environment variable");
                    None
                }
            })
            .collect();

        Ok(Self { cwd, vars })
    }

    /// No inherited variables, only a working directory
    pub fn empty(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            vars: BTreeMap::new(),
        }
    }
}

/// The argument vector, environment and directory handed to the OS to start one app
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub app: String,
    pub program: String,
    /// Arguments after the program name
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// The complete child environment, inherited variables included
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    /// `program` followed by `args`
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// The invocation as a single shell-quoted line, for display
    pub fn command_line(&self) -> String {
        shell_words::join(self.argv())
    }
}

/// Resolves against the current process' directory and environment
pub fn resolve(descriptor: &LaunchDescriptor) -> Result<Invocation, Error> {
    Ok(resolve_with(descriptor, &BaseEnvironment::current()?))
}

/// Builds the invocation for `descriptor`
///
/// With an interpreter the program is the interpreter and the command becomes its first argument (after any
///  interpreter arguments), otherwise the command is executed directly. Descriptor variables override inherited ones.
pub fn resolve_with(descriptor: &LaunchDescriptor, base: &BaseEnvironment) -> Invocation {
    let (program, mut args) = match descriptor.interpreter() {
        Some(interpreter) => {
            let mut args = descriptor.interpreter_args().to_vec();
            args.push(descriptor.command().to_string());
            (interpreter.to_string(), args)
        }
        None => (descriptor.command().to_string(), Vec::new()),
    };
    args.extend(descriptor.arguments().iter().cloned());

    // join keeps absolute paths as they are
    let cwd = match descriptor.working_directory() {
        Some(dir) => base.cwd.join(dir),
        None => base.cwd.clone(),
    };

    let mut env = base.vars.clone();
    env.extend(
        descriptor
            .environment()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    Invocation {
        app: descriptor.name().to_string(),
        program,
        args,
        cwd,
        env,
    }
}
