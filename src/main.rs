use std::path::PathBuf;
use anyhow::Result;
use commandr_core::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout and stderr belong to the terminal UI, so logs go to a file
    let _guard = init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("could not load config, using defaults: {}", e);
        Config::new()
    });
    tracing::info!(
        model = %config.chat_settings().model,
        key_source = config.key_source().unwrap_or("none"),
        "starting commandr"
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut app = App::new(&config);
    let mut events = EventHandler::new(tui::TICK_RATE);

    let result = run(&mut terminal, &mut app, &mut events).await;

    app.controller.shutdown();
    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

fn init_logging() -> Result<WorkerGuard> {
    let log_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("commandr")
        .join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "commandr.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter =
        EnvFilter::try_from_env("COMMANDR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
