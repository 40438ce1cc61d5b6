use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::{compare, ComparisonResult, Provenance};
use crate::data::model::{Spectrum, SpectrumMetadata};
use crate::error::{Result, SpectralError};
use crate::remote::lines::{LineLookup, LineSource, ReferenceLine};
use crate::units::{convert, FluxUnit, WavelengthUnit};

pub const MANIFEST_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A spectrum as shown, in the units applied at export time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumEntry {
    pub id: String,
    pub wavelength_unit: WavelengthUnit,
    pub flux_unit: FluxUnit,
    pub metadata: SpectrumMetadata,
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
}

impl From<&Spectrum> for SpectrumEntry {
    fn from(s: &Spectrum) -> Self {
        Self {
            id: s.id().to_string(),
            wavelength_unit: s.wavelength_unit(),
            flux_unit: s.flux_unit(),
            metadata: s.metadata().clone(),
            wavelength: s.wavelength().to_vec(),
            flux: s.flux().to_vec(),
        }
    }
}

impl SpectrumEntry {
    /// Rebuild the spectrum; the entry passes the same validation as a
    /// freshly ingested one.
    pub fn to_spectrum(&self) -> Result<Spectrum> {
        Spectrum::new(
            self.id.clone(),
            self.wavelength.clone(),
            self.flux.clone(),
            self.wavelength_unit,
            self.flux_unit,
            self.metadata.clone(),
        )
    }
}

/// A comparison together with snapshots of both inputs as they were when it
/// ran. Later unit toggles re-record `spectra` but never touch these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub result: SpectrumEntry,
    pub provenance: Provenance,
    pub primary: SpectrumEntry,
    pub secondary: SpectrumEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineEntry {
    #[serde(flatten)]
    pub line: ReferenceLine,
    pub source: LineSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub wavelength: f64,
    pub flux: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub version: u32,
    pub spectra: Vec<SpectrumEntry>,
    pub comparisons: Vec<ComparisonEntry>,
    pub reference_lines: Vec<LineEntry>,
    pub annotations: Vec<Annotation>,
    pub config: BTreeMap<String, String>,
}

impl Default for SessionManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            spectra: Vec::new(),
            comparisons: Vec::new(),
            reference_lines: Vec::new(),
            annotations: Vec::new(),
            config: BTreeMap::new(),
        }
    }
}

impl SessionManifest {
    pub fn from_path(path: &Path) -> Result<SessionManifest> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SpectralError::Io(format!("reading {}: {e}", path.display())))?;
        let manifest: SessionManifest = serde_json::from_str(&text)
            .map_err(|e| SpectralError::Ingestion(format!("parsing manifest {}: {e}", path.display())))?;
        if manifest.version > MANIFEST_VERSION {
            return Err(SpectralError::Ingestion(format!(
                "manifest version {} is newer than supported version {MANIFEST_VERSION}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    pub fn spectrum(&self, id: &str) -> Option<&SpectrumEntry> {
        self.spectra.iter().find(|s| s.id == id)
    }

    /// Re-run a recorded comparison from its input snapshots, expressed in
    /// the units the provenance records.
    pub fn reproduce(&self, entry: &ComparisonEntry) -> Result<ComparisonResult> {
        let provenance = &entry.provenance;
        let input = |snapshot: &SpectrumEntry, id: &str| -> Result<Spectrum> {
            if snapshot.id != id {
                return Err(SpectralError::Ingestion(format!(
                    "comparison input '{}' does not match provenance id '{id}'",
                    snapshot.id
                )));
            }
            convert(
                &snapshot.to_spectrum()?,
                provenance.input_wavelength_unit,
                provenance.input_flux_unit,
            )
        };
        let primary = input(&entry.primary, &provenance.primary_id)?;
        let secondary = input(&entry.secondary, &provenance.secondary_id)?;
        compare(&primary, &secondary, provenance.operation)
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Collects what the session has shown so it can be exported.
#[derive(Debug, Default)]
pub struct SessionRecorder {
    manifest: SessionManifest,
}

impl SessionRecorder {
    pub fn manifest(&self) -> &SessionManifest {
        &self.manifest
    }

    /// Replaces any earlier entry with the same id (e.g. after a unit toggle).
    pub fn record_spectrum(&mut self, spectrum: &Spectrum) {
        let entry = SpectrumEntry::from(spectrum);
        match self.manifest.spectra.iter_mut().find(|s| s.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.manifest.spectra.push(entry),
        }
    }

    pub fn record_comparison(&mut self, primary: &Spectrum, secondary: &Spectrum, result: &ComparisonResult) {
        self.manifest.comparisons.push(ComparisonEntry {
            result: SpectrumEntry::from(&result.spectrum),
            provenance: result.provenance.clone(),
            primary: SpectrumEntry::from(primary),
            secondary: SpectrumEntry::from(secondary),
        });
    }

    pub fn record_lines(&mut self, lookup: &LineLookup) {
        self.manifest
            .reference_lines
            .extend(lookup.lines.iter().cloned().map(|line| LineEntry {
                line,
                source: lookup.source,
            }));
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.manifest.annotations.push(annotation);
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.manifest.config.insert(key.into(), value.into());
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.manifest)
            .map_err(|e| SpectralError::Io(format!("serialising manifest: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| SpectralError::Io(format!("writing {}: {e}", path.display())))?;
        log::info!(
            "Exported session ({} spectra, {} comparisons) to {}",
            self.manifest.spectra.len(),
            self.manifest.comparisons.len(),
            path.display()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// The last successful value of a request alongside its most recent error.
/// A failure never erases what was last shown.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    last_good: Option<T>,
    latest_error: Option<SpectralError>,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            last_good: None,
            latest_error: None,
        }
    }
}

impl<T> ViewState<T> {
    pub fn apply(&mut self, outcome: Result<T>) {
        match outcome {
            Ok(value) => {
                self.last_good = Some(value);
                self.latest_error = None;
            }
            Err(e) => {
                log::warn!("Request failed: {e}");
                self.latest_error = Some(e);
            }
        }
    }

    pub fn last_good(&self) -> Option<&T> {
        self.last_good.as_ref()
    }

    pub fn latest_error(&self) -> Option<&SpectralError> {
        self.latest_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.latest_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Operation;
    use crate::data::model::MetadataValue;

    fn spectrum(id: &str, start: f64, flux: f64) -> Spectrum {
        let wavelength: Vec<f64> = (0..20).map(|i| start + i as f64 * 5.0).collect();
        let values = wavelength.iter().map(|w| flux + w * 1e-3).collect();
        let mut metadata = SpectrumMetadata::new(format!("{id}.csv"));
        metadata.extra.insert("exposure".into(), MetadataValue::Float(12.5));
        Spectrum::new(id, wavelength, values, WavelengthUnit::VacuumNanometer, FluxUnit::Jansky, metadata).unwrap()
    }

    fn recorder() -> SessionRecorder {
        let a = spectrum("a", 600.0, 2.0);
        let b = spectrum("b", 620.0, 1.0);
        let mut rec = SessionRecorder::default();
        rec.record_spectrum(&a);
        rec.record_spectrum(&b);
        rec.record_comparison(&a, &b, &compare(&a, &b, Operation::Ratio).unwrap());
        rec.record_lines(&LineLookup {
            lines: vec![ReferenceLine {
                element: "H".into(),
                ion_stage: "I".into(),
                wavelength_nm: 656.4614,
                intensity: 1000.0,
                label: "H\u{3b1}".into(),
            }],
            source: LineSource::Fallback,
            warnings: vec!["offline".into()],
        });
        rec.annotate(Annotation { wavelength: 656.0, flux: None, note: "H\u{3b1} dip".into() });
        rec.set_config("retry.max_attempts", "3");
        rec
    }

    #[test]
    fn export_then_import_reproduces_comparisons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let rec = recorder();
        rec.export(&path).unwrap();

        let manifest = SessionManifest::from_path(&path).unwrap();
        assert_eq!(&manifest, rec.manifest());
        assert_eq!(manifest.reference_lines[0].source, LineSource::Fallback);

        let entry = &manifest.comparisons[0];
        let again = manifest.reproduce(entry).unwrap();
        assert_eq!(again.provenance, entry.provenance);
        assert_eq!(SpectrumEntry::from(&again.spectrum), entry.result);
    }

    #[test]
    fn recording_same_id_replaces_entry() {
        let mut rec = recorder();
        let toggled = crate::units::convert(
            &spectrum("a", 600.0, 2.0),
            WavelengthUnit::VacuumAngstrom,
            FluxUnit::Jansky,
        )
        .unwrap();
        rec.record_spectrum(&toggled);
        assert_eq!(rec.manifest().spectra.len(), 2);
        assert_eq!(
            rec.manifest().spectrum("a").unwrap().wavelength_unit,
            WavelengthUnit::VacuumAngstrom
        );
    }

    #[test]
    fn unit_toggle_after_comparing_still_reproduces() {
        let a = spectrum("a", 600.0, 2.0);
        let b = spectrum("b", 620.0, 1.0);
        let mut rec = SessionRecorder::default();
        rec.record_spectrum(&a);
        rec.record_spectrum(&b);
        rec.record_comparison(&a, &b, &compare(&a, &b, Operation::Difference).unwrap());

        for s in [&a, &b] {
            let toggled = convert(s, WavelengthUnit::VacuumAngstrom, FluxUnit::MilliJansky).unwrap();
            rec.record_spectrum(&toggled);
        }
        assert_eq!(rec.manifest().spectrum("a").unwrap().flux_unit, FluxUnit::MilliJansky);

        let entry = &rec.manifest().comparisons[0];
        assert_eq!(entry.provenance.input_flux_unit, FluxUnit::Jansky);
        let again = rec.manifest().reproduce(entry).unwrap();
        assert_eq!(again.spectrum.flux_unit(), FluxUnit::Jansky);
        assert_eq!(SpectrumEntry::from(&again.spectrum), entry.result);
    }

    #[test]
    fn reproduce_converts_snapshots_to_recorded_units() {
        let a = spectrum("a", 600.0, 2.0);
        let b = spectrum("b", 620.0, 1.0);
        let result = compare(&a, &b, Operation::Ratio).unwrap();
        let mut rec = SessionRecorder::default();
        rec.record_comparison(&a, &b, &result);

        let mut entry = rec.manifest().comparisons[0].clone();
        let milli = convert(&b, WavelengthUnit::VacuumNanometer, FluxUnit::MilliJansky).unwrap();
        entry.secondary = SpectrumEntry::from(&milli);
        let again = rec.manifest().reproduce(&entry).unwrap();
        for (x, y) in again.spectrum.flux().iter().zip(result.spectrum.flux()) {
            approx::assert_relative_eq!(*x, *y, max_relative = 1e-12);
        }

        entry.secondary.id = "other".into();
        assert!(matches!(rec.manifest().reproduce(&entry), Err(SpectralError::Ingestion(_))));
    }

    #[test]
    fn newer_manifest_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        let mut manifest = SessionManifest::default();
        manifest.version = MANIFEST_VERSION + 1;
        std::fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();
        assert!(matches!(SessionManifest::from_path(&path), Err(SpectralError::Ingestion(_))));
    }

    #[test]
    fn view_state_keeps_last_good_value() {
        let mut view: ViewState<u32> = ViewState::default();
        view.apply(Ok(1));
        view.apply(Err(SpectralError::InvalidQuery("empty".into())));
        assert_eq!(view.last_good(), Some(&1));
        assert!(matches!(view.latest_error(), Some(SpectralError::InvalidQuery(_))));
        view.apply(Ok(2));
        assert_eq!(view.last_good(), Some(&2));
        assert!(view.latest_error().is_none());

        view.apply(Err(SpectralError::InvalidQuery("empty".into())));
        view.clear_error();
        assert!(view.latest_error().is_none());
        assert_eq!(view.last_good(), Some(&2));
    }
}
