use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use list_view::{ListController, ListOptions, ListRender};
use shared::domain::LoadMoreMode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_options;

#[derive(Parser, Debug)]
#[command(about = "Fetch a paginated JSON list and print its items")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    src: Option<String>,
    #[arg(long)]
    items_key: Option<String>,
    #[arg(long)]
    max_items: Option<usize>,
    #[arg(long)]
    load_more: Option<LoadMoreMode>,
    #[arg(long)]
    load_more_bookmark: Option<String>,
    #[arg(long)]
    reset_on_refresh: bool,
    /// "Load more" clicks to perform in manual mode.
    #[arg(long, default_value_t = 1)]
    pages: usize,
    /// Rows visible at once; auto mode loads until the list end is past rows * (1 + buffer).
    #[arg(long, default_value_t = 20)]
    viewport_rows: usize,
}

fn apply_args(options: &mut ListOptions, args: &Args) {
    if let Some(src) = &args.src {
        options.src = Some(src.clone());
    }
    if let Some(items_key) = &args.items_key {
        options.items_key = items_key.clone();
    }
    if let Some(max_items) = args.max_items {
        options.max_items = max_items;
    }
    if let Some(mode) = args.load_more {
        options.load_more = mode;
    }
    if let Some(bookmark) = &args.load_more_bookmark {
        options.load_more_bookmark = bookmark.clone();
    }
    if args.reset_on_refresh {
        options.reset_on_refresh = true;
    }
}

/// Whether the end-of-list sentinel would sit inside the buffered viewport.
fn sentinel_near(render: &ListRender, viewport_rows: usize, viewport_buffer: f64) -> bool {
    render.show_sentinel
        && (render.items.len() as f64) < viewport_rows as f64 * (1.0 + viewport_buffer)
}

async fn drive(list: &ListController, args: &Args) {
    list.mount().await;

    match list.options().load_more {
        LoadMoreMode::None => {}
        LoadMoreMode::Manual => {
            for _ in 0..args.pages {
                if !list.render().show_load_more || list.state().error.is_some() {
                    break;
                }
                list.click_load_more().await;
            }
        }
        LoadMoreMode::Auto => loop {
            let render = list.render();
            let max_items = list.options().max_items;
            if max_items > 0 && render.items.len() >= max_items {
                break;
            }
            let near = sentinel_near(&render, args.viewport_rows, list.options().viewport_buffer);
            list.viewport_changed(near).await;
            // A page without items (or no page at all) ends the walk.
            if list.render().items.len() == render.items.len() {
                break;
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut options = load_options(args.config.as_deref())?;
    apply_args(&mut options, &args);
    if options.src.is_none() {
        bail!("no list src configured; pass --src or set APP__SRC");
    }
    info!(
        "list: src={} mode={} items_key={} max_items={}",
        options.src.as_deref().unwrap_or_default(),
        options.load_more,
        options.items_key,
        options.max_items
    );

    let list = ListController::new(options);
    drive(&list, &args).await;

    let state = list.state();
    for line in list.render().lines() {
        println!("{line}");
    }
    info!(
        "list: pages={} items={} has_more={}",
        state.pages.len(),
        list.render().items.len(),
        state.has_more
    );

    if let Some(err) = state.error {
        if err.is_retryable() {
            warn!("list: last fetch failed with a transient error; retrying later may succeed");
        }
        return Err(anyhow::Error::new(err).context("failed to load list"));
    }

    Ok(())
}
