use eframe::egui;
use egui::ViewportBuilder;
use image::ImageReader;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod blog_client;
mod cache;
mod comment_tree;
mod comments;
mod config;
mod db;
mod display;
mod excerpt;
mod models;
mod rate_limit;
mod sanitize;
mod theme;
mod validation;

use crate::app::{BlogApp, SetupScreen};
use crate::config::AppConfig;
use crate::db::KvStore;

fn load_icon(path: &str) -> anyhow::Result<egui::IconData> {
    let rgba_image = ImageReader::open(path)?.decode()?.into_rgba8();
    let (width, height) = rgba_image.dimensions();

    Ok(egui::IconData {
        rgba: rgba_image.into_raw(),
        width,
        height,
    })
}

/// Opens the on-disk cache, or an in-memory one if the disk is unavailable.
fn open_cache(config: &AppConfig) -> anyhow::Result<KvStore> {
    let opened = config
        .cache_path
        .clone()
        .map_or_else(KvStore::default_path, Ok)
        .and_then(|path| KvStore::open(&path, config.origin()));
    match opened {
        Ok(store) => Ok(store),
        Err(e) => {
            warn!(error = %e, "persistent cache unavailable, using memory");
            KvStore::open_in_memory(config.origin())
        }
    }
}

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let icon_data = match load_icon("logo/logo.png") {
        Ok(icon) => Some(icon),
        Err(e) => {
            warn!(error = %e, "failed to load icon");
            None
        }
    };

    let mut options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([1100.0, 800.0])
            .with_min_inner_size([720.0, 560.0])
            .with_title("Blog Reader"),
        ..Default::default()
    };
    if let Some(icon) = icon_data {
        options.viewport.icon = Some(Arc::new(icon));
    }

    let config = AppConfig::load();

    eframe::run_native(
        "Blog Reader",
        options,
        Box::new(move |cc| {
            let is_dark_mode = cc
                .storage
                .and_then(|storage| storage.get_string("is_dark_mode"))
                .and_then(|value| value.parse::<bool>().ok())
                .unwrap_or(true);

            let app: Box<dyn eframe::App> = match config {
                Ok(config) => {
                    let kv = open_cache(&config)?;
                    Box::new(BlogApp::new(config, kv, is_dark_mode)?)
                }
                Err(e) => {
                    error!(error = %e, "configuration incomplete");
                    Box::new(SetupScreen::new(e.to_string(), is_dark_mode))
                }
            };
            Ok(app)
        }),
    )
}
