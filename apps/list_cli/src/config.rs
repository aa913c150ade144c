use std::{fs, path::Path};

use anyhow::{Context, Result};
use list_view::ListOptions;
use shared::domain::LoadMoreMode;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "list.toml";

/// Defaults, then the TOML file (explicit path or `list.toml` if present), then `APP__*` env.
pub fn load_options(path: Option<&Path>) -> Result<ListOptions> {
    let mut options = match path {
        Some(path) => read_options_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            read_options_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => ListOptions::default(),
    };

    apply_env_overrides(&mut options, |key| std::env::var(key).ok());
    Ok(options)
}

fn read_options_file(path: &Path) -> Result<ListOptions> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read list config '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse list config '{}'", path.display()))
}

pub(crate) fn apply_env_overrides<F>(options: &mut ListOptions, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("APP__SRC") {
        options.src = (!v.trim().is_empty()).then_some(v);
    }
    if let Some(v) = lookup("APP__ITEMS_KEY") {
        options.items_key = v;
    }
    if let Some(v) = lookup("APP__LOAD_MORE_BOOKMARK") {
        options.load_more_bookmark = v;
    }

    if let Some(v) = lookup("APP__MAX_ITEMS") {
        match v.parse::<usize>() {
            Ok(parsed) => options.max_items = parsed,
            Err(err) => warn!("config: ignoring APP__MAX_ITEMS={v}: {err}"),
        }
    }
    if let Some(v) = lookup("APP__LOAD_MORE") {
        match v.parse::<LoadMoreMode>() {
            Ok(parsed) => options.load_more = parsed,
            Err(err) => warn!("config: ignoring APP__LOAD_MORE: {err}"),
        }
    }
    if let Some(v) = lookup("APP__VIEWPORT_BUFFER") {
        match v.parse::<f64>() {
            Ok(parsed) if parsed >= 0.0 => options.viewport_buffer = parsed,
            _ => warn!("config: ignoring APP__VIEWPORT_BUFFER={v}"),
        }
    }
    if let Some(v) = lookup("APP__RESET_ON_REFRESH") {
        match v.parse::<bool>() {
            Ok(parsed) => options.reset_on_refresh = parsed,
            Err(err) => warn!("config: ignoring APP__RESET_ON_REFRESH={v}: {err}"),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
