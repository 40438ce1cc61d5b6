use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::{Column, TableBuilder};

use rusty_spectra::analysis::Operation;
use rusty_spectra::remote::lines::LineSource;
use rusty_spectra::units::{FluxUnit, WavelengthUnit};

use crate::color::{line_color, spectrum_color};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – spectra, comparison, reference lines
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            spectra_section(ui, state);
            ui.separator();
            comparison_section(ui, state);
            ui.separator();
            lines_section(ui, state);
            ui.separator();
            annotation_section(ui, state);
        });
}

fn spectra_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Spectra");
    if state.spectra.is_empty() {
        ui.label("No spectra loaded.");
        return;
    }
    for (idx, slot) in state.spectra.iter_mut().enumerate() {
        let mut text = RichText::new(slot.native.id()).color(spectrum_color(idx));
        if slot.shown.latest_error().is_some() {
            text = text.italics();
        }
        let response = ui.checkbox(&mut slot.visible, text);
        let meta = slot.native.metadata();
        let mut hover = format!(
            "{} samples, native {} / {}\nsource: {}",
            slot.native.len(),
            slot.native.wavelength_unit(),
            slot.native.flux_unit(),
            meta.source
        );
        if let Some(target) = &meta.target {
            hover.push_str(&format!("\ntarget: {target}"));
        }
        if let Some(instrument) = &meta.instrument {
            hover.push_str(&format!("\ninstrument: {instrument}"));
        }
        if let Some(e) = slot.shown.latest_error() {
            hover.push_str(&format!("\n{e}"));
        }
        response.on_hover_text(hover);
    }
}

fn comparison_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Compare");
    let names: Vec<String> = state.spectra.iter().map(|s| s.native.id().to_string()).collect();
    spectrum_picker(ui, "primary", "A", &names, &mut state.primary);
    spectrum_picker(ui, "secondary", "B", &names, &mut state.secondary);

    ui.horizontal(|ui: &mut Ui| {
        ui.radio_value(&mut state.operation, Operation::Difference, "A − B");
        ui.radio_value(&mut state.operation, Operation::Ratio, "A / B");
    });
    if ui.button("Compute").clicked() {
        state.run_comparison();
    }
    if let Some(result) = state.comparison.last_good() {
        let grid = &result.provenance.grid;
        ui.label(format!(
            "{}: {} points on [{:.4}, {:.4}] {}",
            result.spectrum.id(),
            grid.count,
            grid.start,
            grid.end,
            grid.unit
        ));
    }
}

fn spectrum_picker(ui: &mut Ui, id: &str, label: &str, names: &[String], selected: &mut Option<usize>) {
    let current = selected
        .and_then(|i| names.get(i))
        .cloned()
        .unwrap_or_else(|| "—".to_string());
    ui.horizontal(|ui: &mut Ui| {
        ui.label(label);
        egui::ComboBox::from_id_salt(id)
            .selected_text(current)
            .show_ui(ui, |ui: &mut Ui| {
                for (i, name) in names.iter().enumerate() {
                    ui.selectable_value(selected, Some(i), name);
                }
            });
    });
}

fn lines_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Reference lines");
    let form = &mut state.line_form;
    egui::Grid::new("line_form").num_columns(2).show(ui, |ui: &mut Ui| {
        ui.label("Species");
        ui.text_edit_singleline(&mut form.species);
        ui.end_row();
        ui.label("Ion");
        ui.text_edit_singleline(&mut form.ion_stage);
        ui.end_row();
        ui.label("From (nm)");
        ui.add(egui::DragValue::new(&mut form.wavelength_min).speed(1.0));
        ui.end_row();
        ui.label("To (nm)");
        ui.add(egui::DragValue::new(&mut form.wavelength_max).speed(1.0));
        ui.end_row();
        ui.label("Min intensity");
        ui.add(egui::DragValue::new(&mut form.min_intensity).speed(1.0).range(0.0..=f64::MAX));
        ui.end_row();
    });
    if ui.button("Look up").clicked() {
        state.start_line_lookup();
    }

    if let Some(lookup) = state.lines.last_good() {
        let origin = match lookup.source {
            LineSource::Remote => "catalog",
            LineSource::Fallback => "bundled table",
        };
        ui.label(RichText::new(format!("{} lines from {origin}", lookup.lines.len())).color(line_color(lookup.source)));
        for warning in &lookup.warnings {
            ui.label(RichText::new(warning).small().color(Color32::YELLOW));
        }
    }
    if let Some(e) = state.lines.latest_error() {
        ui.colored_label(Color32::RED, e.to_string());
    }
}

fn annotation_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Annotate");
    ui.text_edit_singleline(&mut state.annotation_note);
    ui.label(RichText::new("Click the plot to pin the note.").small());
    let count = state.recorder.manifest().annotations.len();
    if count > 0 {
        ui.label(format!("{count} annotation(s) recorded"));
    }
}

// ---------------------------------------------------------------------------
// Bottom panel – archive discovery
// ---------------------------------------------------------------------------

pub fn discovery_panel(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        ui.strong("Archive");
        ui.label("Program");
        ui.add(egui::TextEdit::singleline(&mut state.program_id).desired_width(80.0));
        ui.label("Target");
        ui.add(egui::TextEdit::singleline(&mut state.target_name).desired_width(160.0));
        if ui.button("Search").clicked() {
            state.start_discovery();
        }
        if state.busy() {
            ui.spinner();
        }
    });

    if let Some(e) = state.discovery.latest_error() {
        ui.colored_label(Color32::RED, e.to_string());
    }
    let Some(found) = state.discovery.last_good() else {
        return;
    };
    for warning in &found.warnings {
        ui.label(RichText::new(warning).color(Color32::YELLOW));
    }

    let mut fetch = None;
    TableBuilder::new(ui)
        .striped(true)
        .column(Column::auto())
        .column(Column::auto())
        .column(Column::auto())
        .column(Column::auto())
        .column(Column::remainder())
        .column(Column::auto())
        .header(20.0, |mut header| {
            for title in ["Program", "Target", "Instrument", "Date", "Observation", ""] {
                header.col(|ui: &mut Ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for result in &found.results {
                body.row(18.0, |mut row| {
                    row.col(|ui: &mut Ui| {
                        ui.label(&result.program_id);
                    });
                    row.col(|ui: &mut Ui| {
                        ui.label(&result.target_name);
                    });
                    row.col(|ui: &mut Ui| {
                        ui.label(&result.instrument);
                    });
                    row.col(|ui: &mut Ui| {
                        ui.label(result.observation_date.as_deref().unwrap_or("—"));
                    });
                    row.col(|ui: &mut Ui| {
                        ui.label(&result.observation_id);
                    });
                    row.col(|ui: &mut Ui| {
                        if ui.small_button("Load").clicked() {
                            fetch = Some(result.clone());
                        }
                    });
                });
            }
        });
    if let Some(result) = fetch {
        state.start_fetch(result);
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui.button("Export session…").clicked() {
                export_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        let mut wavelength_unit = state.wavelength_unit;
        let mut flux_unit = state.flux_unit;
        egui::ComboBox::from_id_salt("wavelength_unit")
            .selected_text(wavelength_unit.to_string())
            .show_ui(ui, |ui: &mut Ui| {
                for unit in WavelengthUnit::ALL {
                    ui.selectable_value(&mut wavelength_unit, unit, unit.to_string());
                }
            });
        egui::ComboBox::from_id_salt("flux_unit")
            .selected_text(flux_unit.to_string())
            .show_ui(ui, |ui: &mut Ui| {
                for unit in FluxUnit::ALL {
                    ui.selectable_value(&mut flux_unit, unit, unit.to_string());
                }
            });
        if wavelength_unit != state.wavelength_unit || flux_unit != state.flux_unit {
            state.set_units(wavelength_unit, flux_unit);
        }

        ui.separator();
        ui.label(format!("{} spectra loaded", state.spectra.len()));

        if let Some(msg) = &state.status_message {
            let color = if msg.starts_with("Error") { Color32::RED } else { Color32::YELLOW };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let files = rfd::FileDialog::new()
        .set_title("Open spectra")
        .add_filter("Supported files", &["csv", "txt", "tsv", "dat", "fits", "fit", "fts", "parquet", "pq"])
        .add_filter("Delimited text", &["csv", "txt", "tsv", "dat"])
        .add_filter("FITS", &["fits", "fit", "fts"])
        .add_filter("Parquet", &["parquet", "pq"])
        .pick_files();

    for path in files.unwrap_or_default() {
        state.load_path(&path);
    }
}

fn export_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export session")
        .set_file_name("session.json")
        .add_filter("JSON", &["json"])
        .save_file();
    if let Some(path) = file {
        state.export_session(&path);
    }
}
