use eframe::egui::{Color32, Ui};
use egui_plot::{Legend, Line, Plot, PlotPoints, VLine};

use crate::color::{line_color, spectrum_color, COMPARISON_COLOR};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Spectral plot (central panel)
// ---------------------------------------------------------------------------

/// Render the loaded spectra, the latest comparison and reference lines.
/// A click with the annotation note filled in pins the note at that point.
pub fn spectral_plot(ui: &mut Ui, state: &mut AppState) {
    if state.spectra.is_empty() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a file to view spectra  (File → Open…)");
        });
        return;
    }

    if let Some(e) = state.comparison.latest_error() {
        let message = format!("Comparison failed: {e}");
        ui.horizontal(|ui: &mut Ui| {
            ui.colored_label(Color32::RED, message);
            if ui.small_button("Dismiss").clicked() {
                state.comparison.clear_error();
            }
        });
    }

    let x_label = format!("Wavelength [{}]", state.wavelength_unit);
    let y_label = format!("Flux [{}]", state.flux_unit);

    let response = Plot::new("spectral_plot")
        .legend(Legend::default())
        .x_axis_label(x_label)
        .y_axis_label(y_label)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for (idx, slot) in state.spectra.iter().enumerate() {
                if !slot.visible {
                    continue;
                }
                let Some(sp) = slot.shown.last_good() else {
                    continue;
                };
                let points: PlotPoints = sp
                    .wavelength()
                    .iter()
                    .zip(sp.flux())
                    .map(|(&x, &y)| [x, y])
                    .collect();
                plot_ui.line(
                    Line::new(points)
                        .name(sp.id())
                        .color(spectrum_color(idx))
                        .width(1.5),
                );
            }

            if let Some(result) = state.comparison.last_good() {
                let sp = &result.spectrum;
                let points: PlotPoints = sp
                    .wavelength()
                    .iter()
                    .zip(sp.flux())
                    .map(|(&x, &y)| [x, y])
                    .collect();
                plot_ui.line(Line::new(points).name(sp.id()).color(COMPARISON_COLOR).width(2.0));
            }

            if let Some(lookup) = state.lines.last_good() {
                let color = line_color(lookup.source);
                for line in &lookup.lines {
                    // Lines are vacuum nm; skip any the display axis cannot express.
                    let Ok(x) = state.wavelength_unit.from_vacuum_nm(line.wavelength_nm) else {
                        continue;
                    };
                    plot_ui.vline(VLine::new(x).name(&line.label).color(color).width(1.0));
                }
            }

            let clicked = plot_ui.response().clicked();
            clicked.then(|| plot_ui.pointer_coordinate()).flatten()
        });

    if let Some(point) = response.inner {
        if !state.annotation_note.trim().is_empty() {
            state.annotate(point.x, point.y);
        }
    }
}
