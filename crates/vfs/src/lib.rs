// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! VFS assistance for moss including optimised tree + blit helpers
pub mod cache;
pub mod tree;
