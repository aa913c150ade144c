use query_core::QueryState;
use serde_json::Value;
use shared::{domain::LoadMoreMode, error::FetchError};

use crate::{json_path::items_from_page, options::ListOptions};

pub type ListState = QueryState<Value, FetchError>;

pub const LOADING_TEXT: &str = "Loading...";
pub const LOAD_MORE_TEXT: &str = "Load more";

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub key: usize,
    pub value: Value,
}

impl ListItem {
    /// Text of the default item template: strings as-is, everything else as JSON.
    pub fn text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// What a list shows for one state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRender {
    pub show_loading: bool,
    pub show_results: bool,
    pub items: Vec<ListItem>,
    pub error: Option<String>,
    pub show_load_more: bool,
    /// Auto mode keeps an element at the end of the list to detect viewport proximity.
    pub show_sentinel: bool,
}

impl ListRender {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.show_loading {
            lines.push(LOADING_TEXT.to_string());
        }
        if self.show_results {
            lines.extend(self.items.iter().map(ListItem::text));
        }
        if let Some(error) = &self.error {
            lines.push(error.clone());
        }
        if self.show_load_more {
            lines.push(format!("[{LOAD_MORE_TEXT}]"));
        }
        lines
    }
}

/// All items of all pages in fetch order, cut to `max_items`.
pub fn collect_items(pages: &[Value], options: &ListOptions) -> Vec<ListItem> {
    let mut values: Vec<Value> = pages
        .iter()
        .flat_map(|page| items_from_page(page, &options.items_key))
        .collect();
    options.truncate_items(&mut values);

    values
        .into_iter()
        .enumerate()
        .map(|(key, value)| ListItem { key, value })
        .collect()
}

pub fn render(state: &ListState, options: &ListOptions) -> ListRender {
    let items = collect_items(&state.pages, options);
    let show_loading = state.loading && (state.is_empty() || options.reset_on_refresh);
    let show_results = !items.is_empty() && !show_loading;

    ListRender {
        show_loading,
        show_results,
        items,
        error: state.error.as_ref().map(|err| format!("Error: {}", err.message)),
        show_load_more: options.load_more == LoadMoreMode::Manual && state.has_more,
        show_sentinel: options.load_more == LoadMoreMode::Auto,
    }
}

/// Whether auto mode should request the next page right now.
pub fn should_auto_load(
    state: &ListState,
    options: &ListOptions,
    near_viewport: bool,
    renderable: bool,
) -> bool {
    renderable
        && options.load_more == LoadMoreMode::Auto
        && near_viewport
        && !state.loading
        && state.has_more
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
