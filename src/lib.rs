// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Process launch manifests: loading, validation, resolution and launching
//!
//! ```no_run
//! use launchrc::manifest::Manifest;
//! use launchrc::resolve::resolve;
//!
//! # fn main() -> Result<(), launchrc::Error> {
//! let manifest = Manifest::load_profile("ecosystem.config.js", Some("production"))?;
//! for app in manifest.apps() {
//!     println!("{}: {}", app.name(), resolve(app)?.command_line());
//! }
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
mod error;
pub mod launch;
pub mod manifest;
pub mod reload;
pub mod resolve;

pub use descriptor::LaunchDescriptor;
pub use error::{Error, ErrorKind};
pub use manifest::{Format, Manifest};
