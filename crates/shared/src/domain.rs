use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a list asks for pages beyond the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMoreMode {
    /// Only the first page is ever requested.
    #[default]
    None,
    /// A "load more" button is shown while more pages exist.
    Manual,
    /// Pages are requested whenever the end of the list nears the viewport.
    Auto,
}

impl LoadMoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadMoreMode::None => "none",
            LoadMoreMode::Manual => "manual",
            LoadMoreMode::Auto => "auto",
        }
    }
}

impl fmt::Display for LoadMoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown load-more mode '{0}' (expected none, manual or auto)")]
pub struct UnknownLoadMoreMode(pub String);

impl FromStr for LoadMoreMode {
    type Err = UnknownLoadMoreMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("none") || trimmed.is_empty() {
            Ok(LoadMoreMode::None)
        } else if trimmed.eq_ignore_ascii_case("manual") {
            Ok(LoadMoreMode::Manual)
        } else if trimmed.eq_ignore_ascii_case("auto") {
            Ok(LoadMoreMode::Auto)
        } else {
            Err(UnknownLoadMoreMode(raw.to_string()))
        }
    }
}
