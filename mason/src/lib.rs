// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0
pub use self::env::Env;
pub use self::paths::Paths;
pub use self::recipe::Recipe;

pub mod build;
pub mod env;
pub mod extract;
pub mod fetch;
pub mod package;
pub mod paths;
pub mod recipe;
pub mod util;
