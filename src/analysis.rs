//! Comparative analysis: resample two spectra onto a shared grid and combine
//! them elementwise.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::model::{MetadataValue, Spectrum, SpectrumMetadata};
use crate::error::{Result, SpectralError};
use crate::units::{FluxUnit, WavelengthUnit};

/// A ratio denominator with `|value| <= RATIO_EPSILON` is a singularity.
pub const RATIO_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Difference,
    Ratio,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Difference => write!(f, "difference"),
            Operation::Ratio => write!(f, "ratio"),
        }
    }
}

/// Which input's native sampling the common grid was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridSource {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDescription {
    pub start: f64,
    pub end: f64,
    pub count: usize,
    pub source: GridSource,
    pub unit: String,
}

/// Everything needed to recompute a comparison from its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub operation: Operation,
    pub primary_id: String,
    pub secondary_id: String,
    /// Units both inputs were expressed in when compared.
    pub input_wavelength_unit: WavelengthUnit,
    pub input_flux_unit: FluxUnit,
    pub grid: GridDescription,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub spectrum: Spectrum,
    pub provenance: Provenance,
}

/// Compare `primary` against `secondary` on their common grid.
///
/// Both inputs must already share units; nothing is converted here.
pub fn compare(primary: &Spectrum, secondary: &Spectrum, operation: Operation) -> Result<ComparisonResult> {
    if primary.wavelength_unit() != secondary.wavelength_unit() {
        return Err(SpectralError::UnitMismatch {
            primary: primary.wavelength_unit().to_string(),
            secondary: secondary.wavelength_unit().to_string(),
        });
    }
    if primary.flux_unit() != secondary.flux_unit() {
        return Err(SpectralError::UnitMismatch {
            primary: primary.flux_unit().to_string(),
            secondary: secondary.flux_unit().to_string(),
        });
    }

    let (grid, source) = common_grid(primary, secondary)?;
    let mut flux = Vec::with_capacity(grid.len());
    for &x in &grid {
        let (Some(a), Some(b)) = (primary.interpolate(x), secondary.interpolate(x)) else {
            return Err(no_overlap(primary, secondary));
        };
        let value = match operation {
            Operation::Difference => a - b,
            Operation::Ratio => {
                let quotient = a / b;
                if b.abs() <= RATIO_EPSILON || !quotient.is_finite() {
                    return Err(SpectralError::DivisionSingularity {
                        wavelength: x,
                        denominator: b,
                        epsilon: RATIO_EPSILON,
                    });
                }
                quotient
            }
        };
        flux.push(value);
    }

    let mut parameters = BTreeMap::new();
    parameters.insert("interpolation".to_string(), "linear".to_string());
    parameters.insert("extrapolation".to_string(), "none".to_string());
    if operation == Operation::Ratio {
        parameters.insert("epsilon".to_string(), format!("{RATIO_EPSILON:e}"));
        parameters.insert("singularity_policy".to_string(), "raise".to_string());
    }

    let provenance = Provenance {
        operation,
        primary_id: primary.id().to_string(),
        secondary_id: secondary.id().to_string(),
        input_wavelength_unit: primary.wavelength_unit(),
        input_flux_unit: primary.flux_unit(),
        grid: GridDescription {
            start: grid[0],
            end: grid[grid.len() - 1],
            count: grid.len(),
            source,
            unit: primary.wavelength_unit().to_string(),
        },
        parameters,
    };

    let (id, flux_unit) = match operation {
        Operation::Difference => (
            format!("{}-minus-{}", primary.id(), secondary.id()),
            primary.flux_unit(),
        ),
        Operation::Ratio => (
            format!("{}-over-{}", primary.id(), secondary.id()),
            FluxUnit::Dimensionless,
        ),
    };
    let metadata = combine_metadata(operation, primary, secondary);
    let spectrum = Spectrum::new(id, grid, flux, primary.wavelength_unit(), flux_unit, metadata)?;

    log::info!(
        "Computed {operation} of '{}' and '{}' on {} grid points",
        provenance.primary_id,
        provenance.secondary_id,
        provenance.grid.count
    );
    Ok(ComparisonResult { spectrum, provenance })
}

/// The denser input's samples strictly inside the overlap, bracketed by the
/// overlap endpoints.
fn common_grid(primary: &Spectrum, secondary: &Spectrum) -> Result<(Vec<f64>, GridSource)> {
    let (p_lo, p_hi) = primary.range();
    let (s_lo, s_hi) = secondary.range();
    let lo = p_lo.max(s_lo);
    let hi = p_hi.min(s_hi);
    if lo > hi {
        return Err(no_overlap(primary, secondary));
    }

    let inside = |s: &Spectrum| -> usize {
        s.wavelength().iter().filter(|&&w| w >= lo && w <= hi).count()
    };
    let (denser, source) = if inside(secondary) > inside(primary) {
        (secondary, GridSource::Secondary)
    } else {
        (primary, GridSource::Primary)
    };

    let mut grid = Vec::with_capacity(denser.len() + 2);
    grid.push(lo);
    grid.extend(denser.wavelength().iter().copied().filter(|&w| w > lo && w < hi));
    if hi > lo {
        grid.push(hi);
    }
    Ok((grid, source))
}

fn no_overlap(primary: &Spectrum, secondary: &Spectrum) -> SpectralError {
    let (primary_min, primary_max) = primary.range();
    let (secondary_min, secondary_max) = secondary.range();
    SpectralError::NoOverlap {
        primary_min,
        primary_max,
        secondary_min,
        secondary_max,
    }
}

fn combine_metadata(operation: Operation, primary: &Spectrum, secondary: &Spectrum) -> SpectrumMetadata {
    let first = primary.metadata();
    let second = secondary.metadata();
    let description = format!("{operation} of {} and {}", first.source, second.source);

    // Prefixed input keys win over the generated ones.
    let mut extra = BTreeMap::new();
    extra.insert("operation".into(), MetadataValue::String(operation.to_string()));
    extra.insert("primary_source".into(), MetadataValue::String(first.source.clone()));
    extra.insert("secondary_source".into(), MetadataValue::String(second.source.clone()));
    for (k, v) in &first.extra {
        extra.insert(format!("primary_{k}"), v.clone());
    }
    for (k, v) in &second.extra {
        extra.insert(format!("secondary_{k}"), v.clone());
    }

    SpectrumMetadata {
        source: description.clone(),
        target: first.target.clone().or_else(|| second.target.clone()),
        instrument: None,
        observation_date: None,
        description: Some(description),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::convert;
    use approx::assert_relative_eq;

    fn linear(id: &str, lo: f64, hi: f64, step: f64, f: impl Fn(f64) -> f64) -> Spectrum {
        let n = ((hi - lo) / step).round() as usize;
        let wavelength: Vec<f64> = (0..=n).map(|i| lo + i as f64 * step).collect();
        let flux = wavelength.iter().map(|&w| f(w)).collect();
        Spectrum::new(
            id,
            wavelength,
            flux,
            WavelengthUnit::VacuumNanometer,
            FluxUnit::Jansky,
            SpectrumMetadata::new(id),
        )
        .unwrap()
    }

    #[test]
    fn difference_grid_spans_the_overlap() {
        let a = linear("A", 400.0, 700.0, 1.0, |w| w / 100.0);
        let b = linear("B", 650.0, 900.0, 5.0, |_| 1.0);
        let result = compare(&a, &b, Operation::Difference).unwrap();
        let (lo, hi) = result.spectrum.range();
        assert_eq!((lo, hi), (650.0, 700.0));
        assert_eq!(result.provenance.grid.start, 650.0);
        assert_eq!(result.provenance.grid.end, 700.0);
        assert_eq!(result.provenance.grid.count, 51);
        assert_eq!(result.provenance.grid.source, GridSource::Primary);
        assert_eq!(result.spectrum.id(), "A-minus-B");
        assert_relative_eq!(result.spectrum.flux()[0], 5.5);
    }

    #[test]
    fn grid_never_extrapolates() {
        let a = linear("A", 500.0, 600.0, 3.0, |w| w);
        let b = linear("B", 512.5, 650.0, 0.5, |w| 2.0 * w);
        let (p_lo, p_hi) = a.range();
        let (s_lo, s_hi) = b.range();
        let result = compare(&a, &b, Operation::Ratio).unwrap();
        assert_eq!(result.provenance.grid.source, GridSource::Secondary);
        for &w in result.spectrum.wavelength() {
            assert!(w >= p_lo.max(s_lo) && w <= p_hi.min(s_hi));
        }
        for &r in result.spectrum.flux() {
            assert_relative_eq!(r, 0.5, max_relative = 1e-12);
        }
        assert_eq!(result.spectrum.flux_unit(), FluxUnit::Dimensionless);
    }

    #[test]
    fn ratio_raises_on_near_zero_denominator() {
        let a = linear("A", 500.0, 520.0, 10.0, |_| 2.0);
        let b = Spectrum::new(
            "B",
            vec![500.0, 510.0, 520.0],
            vec![1.0, 0.0, 2.0],
            WavelengthUnit::VacuumNanometer,
            FluxUnit::Jansky,
            SpectrumMetadata::new("B"),
        )
        .unwrap();
        let err = compare(&a, &b, Operation::Ratio).unwrap_err();
        match err {
            SpectralError::DivisionSingularity { wavelength, .. } => assert_eq!(wavelength, 510.0),
            other => panic!("unexpected error {other:?}"),
        }
        // Difference is unaffected by zero flux.
        assert!(compare(&a, &b, Operation::Difference).is_ok());
    }

    #[test]
    fn ratio_is_finite_above_epsilon() {
        let a = linear("A", 500.0, 520.0, 10.0, |_| 2.0);
        let b = linear("B", 500.0, 520.0, 10.0, |_| 1e-11);
        let result = compare(&a, &b, Operation::Ratio).unwrap();
        assert!(result.spectrum.flux().iter().all(|v| v.is_finite()));
        assert_eq!(result.provenance.parameters["singularity_policy"], "raise");
    }

    #[test]
    fn disjoint_ranges_fail() {
        let a = linear("A", 400.0, 500.0, 10.0, |_| 1.0);
        let b = linear("B", 600.0, 700.0, 10.0, |_| 1.0);
        assert!(matches!(
            compare(&a, &b, Operation::Difference),
            Err(SpectralError::NoOverlap { .. })
        ));
    }

    #[test]
    fn unit_mismatch_is_not_silently_converted() {
        let a = linear("A", 400.0, 500.0, 10.0, |_| 1.0);
        let b = convert(&a, WavelengthUnit::VacuumAngstrom, FluxUnit::Jansky).unwrap();
        assert!(matches!(
            compare(&a, &b, Operation::Difference),
            Err(SpectralError::UnitMismatch { .. })
        ));
        let c = convert(&a, WavelengthUnit::VacuumNanometer, FluxUnit::MilliJansky).unwrap();
        assert!(matches!(
            compare(&a, &c, Operation::Ratio),
            Err(SpectralError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn metadata_and_provenance_are_recorded() {
        let a = linear("A", 400.0, 500.0, 10.0, |_| 3.0);
        let b = linear("B", 400.0, 500.0, 10.0, |_| 1.0);
        let result = compare(&a, &b, Operation::Difference).unwrap();
        let extra = &result.spectrum.metadata().extra;
        assert_eq!(extra["operation"], MetadataValue::String("difference".into()));
        assert_eq!(extra["primary_source"], MetadataValue::String("A".into()));
        assert_eq!(result.provenance.primary_id, "A");
        assert_eq!(result.provenance.secondary_id, "B");
        assert_eq!(result.provenance.input_wavelength_unit, WavelengthUnit::VacuumNanometer);
        assert_eq!(result.provenance.input_flux_unit, FluxUnit::Jansky);
        let again = compare(&a, &b, Operation::Difference).unwrap();
        assert_eq!(again, result);
    }

    #[test]
    fn input_extra_keys_override_generated_ones() {
        let a = linear("A", 400.0, 500.0, 10.0, |_| 3.0);
        let mut meta = a.metadata().clone();
        meta.extra.insert("source".into(), MetadataValue::String("pipeline v2".into()));
        let a = a.relabeled("A", meta);
        let b = linear("B", 400.0, 500.0, 10.0, |_| 1.0);
        let result = compare(&a, &b, Operation::Ratio).unwrap();
        let extra = &result.spectrum.metadata().extra;
        assert_eq!(extra["primary_source"], MetadataValue::String("pipeline v2".into()));
        assert_eq!(extra["secondary_source"], MetadataValue::String("B".into()));
    }
}
