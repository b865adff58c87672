// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use clap::{App, Arg, ArgMatches, SubCommand};
use futures::future::join_all;
use tokio::runtime;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use launchrc::launch::{self, Running};
use launchrc::reload::{app_changes, ManifestHandle};
use launchrc::resolve::{resolve_with, BaseEnvironment};
use launchrc::{Error, Format, LaunchDescriptor, Manifest};

const CHECK: &str = "check";
const SHOW: &str = "show";
const CONVERT: &str = "convert";
const RUN: &str = "run";

const MANIFEST: &str = "manifest";
const PROFILE: &str = "profile";
const APP: &str = "app";
const TO: &str = "to";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
    fn manifest_opts(self) -> Self;
    fn profile_opts(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }

    fn manifest_opts(self) -> Self {
        self.arg(
            Arg::with_name(MANIFEST)
                .value_name("MANIFEST")
                .help("manifest file (.js, .json, .toml, .yaml)")
                .required(true)
                .index(1),
        )
    }

    fn profile_opts(self) -> Self {
        self.arg(
            Arg::with_name(PROFILE)
                .short("p")
                .long(PROFILE)
                .value_name("NAME")
                .env("LAUNCHRC_PROFILE")
                .help("apply the named profile (e.g. production) to every app")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(APP)
                .short("a")
                .long(APP)
                .value_name("NAME")
                .help("only this app")
                .takes_value(true),
        )
    }
}

fn check_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(CHECK).about("validate a manifest")
}

fn show_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(SHOW).about("print how each app would be launched")
}

fn convert_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(CONVERT)
        .about("rewrite a manifest in another format")
        .arg(
            Arg::with_name(TO)
                .short("t")
                .long(TO)
                .value_name("FORMAT")
                .possible_values(&["js", "json", "toml", "yaml"])
                .required(true)
                .takes_value(true),
        )
}

fn run_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(RUN).about("launch the apps of a manifest and wait for them to exit")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand(
            check_sub_command()
                .setup_clap_app()
                .manifest_opts()
                .profile_opts(),
        )
        .subcommand(
            show_sub_command()
                .setup_clap_app()
                .manifest_opts()
                .profile_opts(),
        )
        .subcommand(convert_sub_command().setup_clap_app().manifest_opts())
        .subcommand(
            run_sub_command()
                .setup_clap_app()
                .manifest_opts()
                .profile_opts(),
        )
        .get_matches();

    let result = match args.subcommand() {
        (CHECK, Some(args)) => check(args),
        (SHOW, Some(args)) => show(args),
        (CONVERT, Some(args)) => convert(args),
        (RUN, Some(args)) => run(args),
        ("", None) => {
            println!("command required");
            println!("{}", args.usage());
            std::process::exit(1);
        }
        (arg, _) => {
            println!("unexpected argument: {}", arg);
            println!("{}", args.usage());
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load(args: &ArgMatches<'_>) -> Result<Manifest, Error> {
    let path = args
        .value_of(MANIFEST)
        .ok_or_else(|| Error::from("manifest not specified"))?;
    Manifest::load_profile(path, args.value_of(PROFILE))
}

fn select_apps<'m>(
    manifest: &'m Manifest,
    app: Option<&str>,
) -> Result<Vec<&'m LaunchDescriptor>, Error> {
    match app {
        Some(name) => manifest
            .get(name)
            .map(|desc| vec![desc])
            .ok_or_else(|| Error::from(format!("no app named `{}` in the manifest", name))),
        None => Ok(manifest.apps().iter().collect()),
    }
}

fn check(args: &ArgMatches<'_>) -> Result<(), Error> {
    let manifest = load(args)?;
    for app in select_apps(&manifest, args.value_of(APP))? {
        println!("{}: ok", app.name());
    }

    Ok(())
}

fn show(args: &ArgMatches<'_>) -> Result<(), Error> {
    let manifest = load(args)?;
    let base = BaseEnvironment::current()?;

    for app in select_apps(&manifest, args.value_of(APP))? {
        let invocation = resolve_with(app, &base);

        println!("{}", app.name());
        println!("  command: {}", invocation.command_line());
        println!("  cwd:     {}", invocation.cwd.display());
        for (key, value) in app.environment() {
            println!("  env:     {}={}", key, value);
        }
        println!("  watch:   {}", app.watch());
    }

    Ok(())
}

fn convert(args: &ArgMatches<'_>) -> Result<(), Error> {
    let path = args
        .value_of(MANIFEST)
        .ok_or_else(|| Error::from("manifest not specified"))?;
    let format: Format = args
        .value_of(TO)
        .ok_or_else(|| Error::from("target format not specified"))?
        .parse()?;

    print!("{}", Manifest::load(path)?.render(format)?);
    Ok(())
}

fn run(args: &ArgMatches<'_>) -> Result<(), Error> {
    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_apps(args))
}

async fn run_apps(args: &ArgMatches<'_>) -> Result<(), Error> {
    let path = args
        .value_of(MANIFEST)
        .ok_or_else(|| Error::from("manifest not specified"))?;
    let handle = ManifestHandle::open(path, args.value_of(PROFILE).map(str::to_string))?;
    let manifest = handle.current();
    let base = BaseEnvironment::current()?;

    // an error here drops the already started children, which kills them
    let mut children = Vec::new();
    for app in select_apps(&manifest, args.value_of(APP))? {
        children.push(launch::spawn(&resolve_with(app, &base))?);
    }

    let running = Running::default();
    for child in &children {
        running.track(child);
    }

    let mut exits = Box::pin(join_all(children.into_iter().map(|c| running.wait(c))));

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let exits = loop {
        tokio::select! {
            exits = &mut exits => break exits,
            _ = tokio::signal::ctrl_c() => running.terminate_all(),
            _ = terminate.recv() => running.terminate_all(),
            _ = hangup.recv() => report_reload(&handle, &manifest, &running.apps()),
        }
    };

    let failed: Vec<String> = exits
        .into_iter()
        .filter_map(|(app, status)| match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("{} ({})", app, status)),
            Err(e) => Some(format!("{} ({})", app, e)),
        })
        .collect();

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::from(format!(
            "apps exited unsuccessfully: {}",
            failed.join(", ")
        )))
    }
}

/// Running apps are not restarted, only told about
fn report_reload(handle: &ManifestHandle, launched: &Manifest, running: &[String]) {
    let current = match handle.reload() {
        Ok(current) => current,
        Err(_) => return,
    };

    let changes = app_changes(running.iter().map(String::as_str), launched, &current);
    for app in &changes.removed {
        warn!(app = %app, "app was removed from the manifest, it keeps running until stopped");
    }
    for app in &changes.changed {
        warn!(app = %app, "app settings differ from the running ones, restart it to apply them");
    }
    if changes.is_empty() {
        debug!("running apps match the manifest");
    }
}
