mod app;
mod color;
mod state;
mod ui;

use anyhow::Context;
use app::RustySpectraApp;
use eframe::egui;
use rusty_spectra::config::Settings;
use state::AppState;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = Settings::load().context("loading settings")?;
    let mut state = AppState::new(settings);
    // Files named on the command line are opened at start-up.
    for path in std::env::args_os().skip(1) {
        state.load_path(std::path::Path::new(&path));
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([640.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty Spectra – Spectral Comparison",
        options,
        Box::new(|_cc| Ok(Box::new(RustySpectraApp::new(state)))),
    )
    .map_err(|e| anyhow::anyhow!("viewer exited with an error: {e}"))
}
