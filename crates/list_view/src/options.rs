use serde::{Deserialize, Serialize};
use shared::domain::LoadMoreMode;

pub const DEFAULT_ITEMS_KEY: &str = "items";
pub const DEFAULT_LOAD_MORE_BOOKMARK: &str = "load-more-src";
pub const DEFAULT_VIEWPORT_BUFFER: f64 = 2.0;

/// Behaviour of a paginated list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub src: Option<String>,
    pub items_key: String,
    /// `0` means no limit.
    pub max_items: usize,
    pub reset_on_refresh: bool,
    pub load_more: LoadMoreMode,
    pub load_more_bookmark: String,
    /// In auto mode, how many viewport heights below the visible area still count as near.
    pub viewport_buffer: f64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            src: None,
            items_key: DEFAULT_ITEMS_KEY.into(),
            max_items: 0,
            reset_on_refresh: false,
            load_more: LoadMoreMode::None,
            load_more_bookmark: DEFAULT_LOAD_MORE_BOOKMARK.into(),
            viewport_buffer: DEFAULT_VIEWPORT_BUFFER,
        }
    }
}

impl ListOptions {
    /// Observer root margin that extends the bottom edge by the viewport buffer.
    pub fn root_margin(&self) -> String {
        let buffer_pct = (self.viewport_buffer * 100.0).floor() as i64;
        format!("0% 0% {buffer_pct}% 0%")
    }

    pub fn truncate_items<T>(&self, items: &mut Vec<T>) {
        if self.max_items > 0 && items.len() > self.max_items {
            items.truncate(self.max_items);
        }
    }
}
