use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectralError};
use crate::units::{FluxUnit, WavelengthUnit};

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in the `extra` map
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Classify a raw text cell. Never fails: anything that is not a number
    /// or a boolean is kept verbatim as a string.
    pub fn guess(s: &str) -> MetadataValue {
        let s = s.trim();
        if s.is_empty() {
            return MetadataValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return MetadataValue::Float(f);
            }
        }
        if s == "true" || s == "false" {
            return MetadataValue::Bool(s == "true");
        }
        MetadataValue::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// SpectrumMetadata – provenance of one spectrum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMetadata {
    /// Where the samples came from (path, product URI, or "in-memory").
    pub source: String,
    pub target: Option<String>,
    pub instrument: Option<String>,
    pub observation_date: Option<String>,
    pub description: Option<String>,
    /// Open-ended key/value map (header fields, ingestion counters, flags).
    pub extra: BTreeMap<String, MetadataValue>,
}

impl SpectrumMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Rows discarded during ingestion because a sample cell was not numeric.
    pub fn dropped_rows(&self) -> usize {
        self.extra
            .get("dropped_rows")
            .and_then(MetadataValue::as_i64)
            .map(|n| n.max(0) as usize)
            .unwrap_or(0)
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.extra.get(key), Some(MetadataValue::Bool(true)))
    }
}

// ---------------------------------------------------------------------------
// Spectrum – immutable, unit-tagged sample arrays
// ---------------------------------------------------------------------------

/// A single spectrum. Fields are private: every transform builds a new
/// instance through [`Spectrum::new`], which enforces the invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    id: String,
    /// Spectral axis, strictly increasing in `wavelength_unit`.
    wavelength: Vec<f64>,
    /// Flux axis – same length as `wavelength`.
    flux: Vec<f64>,
    wavelength_unit: WavelengthUnit,
    flux_unit: FluxUnit,
    metadata: SpectrumMetadata,
}

impl Spectrum {
    /// Validate and build a spectrum.
    ///
    /// Fails when the arrays are empty, differ in length, contain non-finite
    /// values, or the axis is not strictly increasing.
    pub fn new(
        id: impl Into<String>,
        wavelength: Vec<f64>,
        flux: Vec<f64>,
        wavelength_unit: WavelengthUnit,
        flux_unit: FluxUnit,
        metadata: SpectrumMetadata,
    ) -> Result<Self> {
        let id = id.into();
        if wavelength.is_empty() {
            return Err(SpectralError::Ingestion(format!("{id}: spectrum has no samples")));
        }
        if wavelength.len() != flux.len() {
            return Err(SpectralError::Ingestion(format!(
                "{id}: wavelength has {} values but flux has {}",
                wavelength.len(),
                flux.len()
            )));
        }
        if let Some(i) = wavelength
            .iter()
            .zip(&flux)
            .position(|(w, f)| !w.is_finite() || !f.is_finite())
        {
            return Err(SpectralError::Ingestion(format!(
                "{id}: non-finite sample at index {i}"
            )));
        }
        if let Some(i) = wavelength.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SpectralError::Ingestion(format!(
                "{id}: spectral axis not strictly increasing at index {}",
                i + 1
            )));
        }
        Ok(Self {
            id,
            wavelength,
            flux,
            wavelength_unit,
            flux_unit,
            metadata,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn wavelength_unit(&self) -> WavelengthUnit {
        self.wavelength_unit
    }

    pub fn flux_unit(&self) -> FluxUnit {
        self.flux_unit
    }

    pub fn metadata(&self) -> &SpectrumMetadata {
        &self.metadata
    }

    /// Number of samples (always ≥ 1).
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// First and last axis value.
    pub fn range(&self) -> (f64, f64) {
        (self.wavelength[0], self.wavelength[self.wavelength.len() - 1])
    }

    /// Same samples and units under a new identifier and metadata.
    pub fn relabeled(&self, id: impl Into<String>, metadata: SpectrumMetadata) -> Spectrum {
        Spectrum {
            id: id.into(),
            metadata,
            ..self.clone()
        }
    }

    /// Linear interpolation at `x`. Returns `None` outside the native range.
    pub fn interpolate(&self, x: f64) -> Option<f64> {
        let (lo, hi) = self.range();
        if x < lo || x > hi {
            return None;
        }
        let idx = self.wavelength.partition_point(|&w| w < x);
        if idx < self.len() && self.wavelength[idx] == x {
            return Some(self.flux[idx]);
        }
        // lo < x < hi, so both neighbours exist.
        let (x0, x1) = (self.wavelength[idx - 1], self.wavelength[idx]);
        let (y0, y1) = (self.flux[idx - 1], self.flux[idx]);
        let t = (x - x0) / (x1 - x0);
        Some(y0 + t * (y1 - y0))
    }
}
