// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::resolve::Invocation;
use crate::Error;

/// A started app
#[derive(Debug)]
pub struct Launched {
    app: String,
    child: Child,
}

/// Starts the process described by `invocation`
///
/// The child gets exactly the resolved environment, stdio is inherited. Must be called from within a tokio runtime.
pub fn spawn(invocation: &Invocation) -> Result<Launched, Error> {
    debug!(
        app = %invocation.app,
        cwd = %invocation.cwd.display(),
        "spawning {}",
        invocation.command_line()
    );

    let child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .env_clear()
        .envs(&invocation.env)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::launch(&invocation.app, e))?;

    info!(app = %invocation.app, pid = ?child.id(), "started");
    Ok(Launched {
        app: invocation.app.clone(),
        child,
    })
}

/// Asks the process to shut down
pub fn terminate(pid: u32) -> Result<(), Error> {
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;
    Ok(())
}

impl Launched {
    pub fn app(&self) -> &str {
        &self.app
    }

    /// `None` once the process has been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn wait(&mut self) -> Result<ExitStatus, Error> {
        let status = self.child.wait().await?;
        info!(app = %self.app, %status, "exited");
        Ok(status)
    }

    /// Sends `SIGTERM`, a no-op if the process already exited
    pub fn terminate(&self) -> Result<(), Error> {
        match self.id() {
            Some(pid) => terminate(pid),
            None => Ok(()),
        }
    }
}

/// Pids of the apps whose exit hasn't been observed yet
///
/// An app is dropped in the same poll that reaps it, so `terminate_all` never signals a reaped (and possibly
///  reused) pid. Meant for a single threaded runtime.
#[derive(Debug, Default)]
pub struct Running {
    pids: RefCell<BTreeMap<String, u32>>,
}

impl Running {
    pub fn track(&self, launched: &Launched) {
        if let Some(pid) = launched.id() {
            self.pids.borrow_mut().insert(launched.app().to_string(), pid);
        }
    }

    /// Waits for `launched` to exit and stops tracking it
    pub async fn wait(&self, mut launched: Launched) -> (String, Result<ExitStatus, Error>) {
        let status = launched.wait().await;
        self.pids.borrow_mut().remove(launched.app());
        (launched.app, status)
    }

    pub fn apps(&self) -> Vec<String> {
        self.pids.borrow().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.borrow().is_empty()
    }

    /// Sends `SIGTERM` to every app still running
    pub fn terminate_all(&self) {
        let pids = self.pids.borrow();
        info!("stopping {} app(s)", pids.len());

        for (app, pid) in pids.iter() {
            if let Err(e) = terminate(*pid) {
                warn!(app = %app, "failed to signal: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(app: &str, script: &str) -> Invocation {
        let mut env = BTreeMap::new();
        env.insert("PYTHONPATH".to_string(), ".".to_string());
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }

        Invocation {
            app: app.to_string(),
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
            env,
        }
    }

    #[tokio::test]
    async fn test_child_sees_resolved_env() {
        let script = r#"test "$PYTHONPATH" = "." && test -z "$HOME""#;
        let mut launched = spawn(&sh("env-check", script)).unwrap();
        assert_eq!(launched.app(), "env-check");
        assert!(launched.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let mut launched = spawn(&sh("failing", "exit 3")).unwrap();
        assert_eq!(launched.wait().await.unwrap().code(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_error() {
        let mut invocation = sh("ghost", "true");
        invocation.program = "/nonexistent/uvicorn".to_string();

        let err = spawn(&invocation).unwrap_err();
        assert!(err.is_launch());
        assert_eq!(err.app(), Some("ghost"));
    }

    #[tokio::test]
    async fn test_missing_working_directory_is_a_launch_error() {
        let mut invocation = sh("lost", "true");
        invocation.cwd = "/nonexistent/chat-app".into();

        assert!(spawn(&invocation).unwrap_err().is_launch());
    }

    #[tokio::test]
    async fn test_terminate() {
        let mut launched = spawn(&sh("sleeper", "exec sleep 30")).unwrap();
        launched.terminate().unwrap();

        let status = launched.wait().await.unwrap();
        assert!(!status.success());
        assert!(launched.terminate().is_ok());
    }

    #[tokio::test]
    async fn test_exited_apps_are_not_signalled() {
        let running = Running::default();

        let quick = spawn(&sh("quick", "exit 0")).unwrap();
        let sleeper = spawn(&sh("sleeper", "exec sleep 30")).unwrap();
        running.track(&quick);
        running.track(&sleeper);
        assert_eq!(running.apps(), ["quick", "sleeper"]);

        let (app, status) = running.wait(quick).await;
        assert_eq!(app, "quick");
        assert!(status.unwrap().success());
        assert_eq!(running.apps(), ["sleeper"]);

        running.terminate_all();
        let (_, status) = running.wait(sleeper).await;
        assert!(!status.unwrap().success());
        assert!(running.is_empty());
    }
}
