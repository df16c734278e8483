// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

pub use self::dependency::Dependency;
pub use self::evr::Evr;
pub use self::installation::Installation;
pub use self::package::Filename;
pub use self::record::InstalledRecord;

/// Program name used to derive every on-disk path under a target root
/// (`/etc/<APP_NAME>`, `/var/lib/<APP_NAME>`, ...) and the config domain
/// passed to [`config::Manager`].
pub const APP_NAME: &str = "warden";

pub mod client;
pub mod delta;
pub mod dependency;
pub mod evr;
pub mod fingerprint;
pub mod history;
pub mod installation;
pub mod package;
pub mod planner;
pub mod record;
pub mod rollback;
