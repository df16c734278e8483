// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The installer: extracts a package archive, overlays it onto a target
//! root, and keeps the installed-package database, history log, deltas
//! and rollback bundles in step with whatever happened.

pub mod install;
pub mod rollback;
