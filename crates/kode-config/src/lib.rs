// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod schema;

pub use loader::{
    global_config_path, load_global_config, load_global_config_from, load_project_file,
    load_strict, load_strict_from, save_global_config, save_global_config_to, ConfigError,
};
pub use schema::*;
