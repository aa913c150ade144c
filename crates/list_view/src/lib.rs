//! List read model on top of [`query_core::InfiniteQuery`]: pulls items out of JSON
//! pages, follows load-more bookmarks and derives what a list should show.

pub mod controller;
pub mod json_path;
pub mod options;
pub mod render;
pub mod source;

pub use controller::ListController;
pub use options::ListOptions;
pub use render::{render, should_auto_load, ListItem, ListRender, ListState};
pub use source::{JsonFetcher, ListSource, ReqwestFetcher};
