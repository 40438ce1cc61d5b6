use std::path::Path;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use rusty_spectra::analysis::{compare, ComparisonResult, Operation};
use rusty_spectra::config::Settings;
use rusty_spectra::data::model::Spectrum;
use rusty_spectra::error::{Result, SpectralError};
use rusty_spectra::remote::archive::{Discovery, DiscoveryClient, DiscoveryResult};
use rusty_spectra::remote::lines::{LineLookup, LineProvider, LineQuery};
use rusty_spectra::remote::worker;
use rusty_spectra::session::{Annotation, SessionRecorder, ViewState};
use rusty_spectra::units::{convert, FluxUnit, WavelengthUnit};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// One loaded spectrum: the native samples plus what is currently shown.
pub struct SpectrumSlot {
    pub native: Spectrum,
    /// The native spectrum converted to the display units.
    pub shown: ViewState<Spectrum>,
    pub visible: bool,
}

/// Form fields of the reference-line lookup.
pub struct LineForm {
    pub species: String,
    pub ion_stage: String,
    pub wavelength_min: f64,
    pub wavelength_max: f64,
    pub min_intensity: f64,
}

impl Default for LineForm {
    fn default() -> Self {
        Self {
            species: "Fe".into(),
            ion_stage: "II".into(),
            wavelength_min: 500.0,
            wavelength_max: 510.0,
            min_intensity: 0.0,
        }
    }
}

/// The full UI state, independent of rendering.
pub struct AppState {
    pub settings: Settings,
    pub spectra: Vec<SpectrumSlot>,

    /// Display units applied to every spectrum.
    pub wavelength_unit: WavelengthUnit,
    pub flux_unit: FluxUnit,

    pub primary: Option<usize>,
    pub secondary: Option<usize>,
    pub operation: Operation,
    pub comparison: ViewState<ComparisonResult>,

    pub line_form: LineForm,
    pub lines: ViewState<LineLookup>,

    pub program_id: String,
    pub target_name: String,
    pub discovery: ViewState<Discovery>,

    pub annotation_note: String,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    pub recorder: SessionRecorder,

    discovery_client: Option<DiscoveryClient>,
    line_provider: LineProvider,

    discovery_rx: Option<Receiver<Result<Discovery>>>,
    lines_rx: Option<Receiver<Result<LineLookup>>>,
    fetch_rx: Option<Receiver<Result<Spectrum>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let discovery_client = DiscoveryClient::from_settings(&settings)
            .map_err(|e| log::error!("Archive discovery disabled: {e}"))
            .ok();
        let line_provider = LineProvider::from_settings(&settings).unwrap_or_else(|e| {
            log::error!("Remote line catalog disabled: {e}");
            LineProvider::offline()
        });

        let mut recorder = SessionRecorder::default();
        recorder.set_config("archive.cone_radius_arcsec", settings.archive.cone_radius_arcsec.to_string());
        recorder.set_config("retry.max_attempts", settings.retry.max_attempts.to_string());
        recorder.set_config("lines.offline", settings.lines.offline.to_string());

        Self {
            settings,
            spectra: Vec::new(),
            wavelength_unit: WavelengthUnit::CANONICAL,
            flux_unit: FluxUnit::CANONICAL,
            primary: None,
            secondary: None,
            operation: Operation::Difference,
            comparison: ViewState::default(),
            line_form: LineForm::default(),
            lines: ViewState::default(),
            program_id: String::new(),
            target_name: String::new(),
            discovery: ViewState::default(),
            annotation_note: String::new(),
            status_message: None,
            recorder,
            discovery_client,
            line_provider,
            discovery_rx: None,
            lines_rx: None,
            fetch_rx: None,
        }
    }

    pub fn busy(&self) -> bool {
        self.discovery_rx.is_some() || self.lines_rx.is_some() || self.fetch_rx.is_some()
    }

    // ---- Spectra ----------------------------------------------------------

    pub fn load_path(&mut self, path: &Path) {
        match rusty_spectra::data::loader::load_file(path) {
            Ok(spectrum) => self.add_spectrum(spectrum),
            Err(e) => {
                log::error!("Failed to load {}: {e}", path.display());
                self.status_message = Some(format!("Error: {e}"));
            }
        }
    }

    pub fn add_spectrum(&mut self, native: Spectrum) {
        log::info!(
            "Loaded '{}' ({} samples, {} / {})",
            native.id(),
            native.len(),
            native.wavelength_unit(),
            native.flux_unit()
        );
        if native.metadata().dropped_rows() > 0 {
            self.status_message = Some(format!(
                "'{}': {} unparseable rows dropped",
                native.id(),
                native.metadata().dropped_rows()
            ));
        } else {
            self.status_message = None;
        }
        let mut shown = ViewState::default();
        shown.apply(convert(&native, self.wavelength_unit, self.flux_unit));
        if let Some(s) = shown.last_good() {
            self.recorder.record_spectrum(s);
        }
        let idx = self.spectra.len();
        self.spectra.push(SpectrumSlot { native, shown, visible: true });
        if self.primary.is_none() {
            self.primary = Some(idx);
        } else if self.secondary.is_none() {
            self.secondary = Some(idx);
        }
    }

    /// Re-derive every shown spectrum in the new display units. A spectrum
    /// that cannot be expressed in them keeps its previous rendering and
    /// reports the error.
    pub fn set_units(&mut self, wavelength_unit: WavelengthUnit, flux_unit: FluxUnit) {
        self.wavelength_unit = wavelength_unit;
        self.flux_unit = flux_unit;
        let mut failures = Vec::new();
        for slot in &mut self.spectra {
            slot.shown.apply(convert(&slot.native, wavelength_unit, flux_unit));
            match slot.shown.latest_error() {
                Some(e) => failures.push(format!("{}: {e}", slot.native.id())),
                None => {
                    if let Some(s) = slot.shown.last_good() {
                        self.recorder.record_spectrum(s);
                    }
                }
            }
        }
        self.recorder.set_config("display.wavelength_unit", wavelength_unit.symbol());
        self.recorder.set_config("display.flux_unit", flux_unit.symbol());
        self.status_message = (!failures.is_empty()).then(|| failures.join("; "));
    }

    /// Spectrum as currently displayed, if it has ever converted.
    pub fn shown(&self, idx: usize) -> Option<&Spectrum> {
        self.spectra.get(idx).and_then(|slot| slot.shown.last_good())
    }

    // ---- Comparison -------------------------------------------------------

    pub fn run_comparison(&mut self) {
        let outcome = match (self.primary, self.secondary) {
            (Some(a), Some(b)) if a != b => match (self.current(a), self.current(b)) {
                (Ok(a), Ok(b)) => compare(a, b, self.operation).map(|result| (a.clone(), b.clone(), result)),
                (Err(e), _) | (_, Err(e)) => Err(e),
            },
            _ => Err(SpectralError::InvalidQuery("choose two different spectra".into())),
        };
        let outcome = outcome.map(|(a, b, result)| {
            self.recorder.record_comparison(&a, &b, &result);
            result
        });
        self.comparison.apply(outcome);
    }

    /// Only spectra whose latest conversion succeeded take part in a
    /// comparison; a stale rendering would be in different units.
    fn current(&self, idx: usize) -> Result<&Spectrum> {
        let slot = &self.spectra[idx];
        match (slot.shown.latest_error(), slot.shown.last_good()) {
            (None, Some(s)) => Ok(s),
            (Some(e), _) => Err(e.clone()),
            (None, None) => Err(SpectralError::UnsupportedUnit(format!(
                "{} has no rendering in the display units",
                slot.native.id()
            ))),
        }
    }

    // ---- Background requests ---------------------------------------------

    pub fn start_discovery(&mut self) {
        let Some(client) = self.discovery_client.clone() else {
            self.discovery
                .apply(Err(SpectralError::DiscoveryUnavailable("archive client not configured".into())));
            return;
        };
        let program = Some(self.program_id.clone());
        let target = Some(self.target_name.clone());
        let timeout = Duration::from_secs(self.settings.archive.call_timeout_secs);
        self.discovery_rx = Some(worker::spawn("discovery", move || {
            client.discover_with_timeout(program, target, timeout)
        }));
    }

    pub fn start_fetch(&mut self, result: DiscoveryResult) {
        let Some(client) = self.discovery_client.clone() else {
            return;
        };
        self.status_message = Some(format!("Downloading {}…", result.product_uri));
        self.fetch_rx = Some(worker::spawn("fetch", move || client.fetch_spectrum(&result)));
    }

    pub fn start_line_lookup(&mut self) {
        let form = &self.line_form;
        let mut query = LineQuery::new(form.species.trim(), form.wavelength_min, form.wavelength_max);
        if !form.ion_stage.trim().is_empty() {
            query = query.ion(form.ion_stage.trim());
        }
        if form.min_intensity > 0.0 {
            query = query.min_intensity(form.min_intensity);
        }
        let provider = self.line_provider.clone();
        let timeout = Duration::from_secs(self.settings.lines.call_timeout_secs);
        self.lines_rx = Some(worker::spawn("lines", move || provider.lookup_with_timeout(query, timeout)));
    }

    /// Collect finished background requests. Called once per frame.
    pub fn poll(&mut self) {
        if let Some(outcome) = take_ready(&mut self.discovery_rx) {
            if let Ok(found) = &outcome {
                self.status_message = found.warnings.last().cloned();
            }
            self.discovery.apply(outcome);
        }
        if let Some(outcome) = take_ready(&mut self.lines_rx) {
            if let Ok(lookup) = &outcome {
                self.recorder.record_lines(lookup);
            }
            self.lines.apply(outcome);
        }
        if let Some(outcome) = take_ready(&mut self.fetch_rx) {
            match outcome {
                Ok(spectrum) => self.add_spectrum(spectrum),
                Err(e) => {
                    log::error!("Download failed: {e}");
                    self.status_message = Some(format!("Error: {e}"));
                }
            }
        }
    }

    // ---- Session ----------------------------------------------------------

    /// Annotations are stored in vacuum nm whatever the display units.
    pub fn annotate(&mut self, display_x: f64, display_y: f64) {
        match self.wavelength_unit.to_vacuum_nm(display_x) {
            Ok(wavelength) => {
                let note = std::mem::take(&mut self.annotation_note);
                let flux = (self.flux_unit == FluxUnit::CANONICAL).then_some(display_y);
                self.recorder.annotate(Annotation { wavelength, flux, note });
            }
            Err(e) => self.status_message = Some(format!("Error: {e}")),
        }
    }

    pub fn export_session(&mut self, path: &Path) {
        self.status_message = Some(match self.recorder.export(path) {
            Ok(()) => format!("Session exported to {}", path.display()),
            Err(e) => format!("Error: {e}"),
        });
    }
}

/// A disconnected channel means the worker died without answering.
fn take_ready<T>(slot: &mut Option<Receiver<Result<T>>>) -> Option<Result<T>> {
    let rx = slot.as_ref()?;
    let outcome = match rx.try_recv() {
        Ok(outcome) => outcome,
        Err(TryRecvError::Empty) => return None,
        Err(TryRecvError::Disconnected) => Err(SpectralError::DiscoveryUnavailable(
            "background worker stopped unexpectedly".into(),
        )),
    };
    *slot = None;
    Some(outcome)
}
