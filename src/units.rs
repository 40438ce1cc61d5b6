//! Unit normalizer.
//!
//! Every stored [`Spectrum`] carries one [`WavelengthUnit`] and one
//! [`FluxUnit`]. [`convert`] moves a spectrum between units by going through
//! the canonical representation (vacuum nm, Jy) exactly once, so toggling
//! units back and forth never accumulates drift.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::model::Spectrum;
use crate::error::{Result, SpectralError};

/// Speed of light in Å/s.
pub const SPEED_OF_LIGHT_ANGSTROM_PER_S: f64 = 2.997_924_58e18;

/// Shortest vacuum wavelength (nm) the air refraction formula is applied to.
pub const AIR_FORMULA_MIN_NM: f64 = 170.0;

/// Relative tolerance used by [`round_trip_verified`].
pub const ROUND_TRIP_RTOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Wavelength units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WavelengthUnit {
    VacuumNanometer,
    VacuumAngstrom,
    VacuumMicron,
    AirNanometer,
    AirAngstrom,
    /// Vacuum wavenumber in cm⁻¹.
    Wavenumber,
}

impl WavelengthUnit {
    pub const ALL: [WavelengthUnit; 6] = [
        WavelengthUnit::VacuumNanometer,
        WavelengthUnit::VacuumAngstrom,
        WavelengthUnit::VacuumMicron,
        WavelengthUnit::AirNanometer,
        WavelengthUnit::AirAngstrom,
        WavelengthUnit::Wavenumber,
    ];

    pub const CANONICAL: WavelengthUnit = WavelengthUnit::VacuumNanometer;

    pub fn symbol(self) -> &'static str {
        match self {
            WavelengthUnit::VacuumNanometer => "nm",
            WavelengthUnit::VacuumAngstrom => "Å",
            WavelengthUnit::VacuumMicron => "µm",
            WavelengthUnit::AirNanometer => "air nm",
            WavelengthUnit::AirAngstrom => "air Å",
            WavelengthUnit::Wavenumber => "cm⁻¹",
        }
    }

    pub fn is_air(self) -> bool {
        matches!(self, WavelengthUnit::AirNanometer | WavelengthUnit::AirAngstrom)
    }

    pub fn is_wavenumber(self) -> bool {
        self == WavelengthUnit::Wavenumber
    }

    /// Parse a unit symbol such as `nm`, `AA`, `um`, `air-nm` or `cm-1`.
    pub fn parse(s: &str) -> Result<WavelengthUnit> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect();
        let unit = match key.as_str() {
            "nm" | "nanometer" | "vacnm" => WavelengthUnit::VacuumNanometer,
            "å" | "aa" | "a" | "angstrom" | "vacaa" | "vacå" => WavelengthUnit::VacuumAngstrom,
            "um" | "µm" | "micron" | "micrometer" => WavelengthUnit::VacuumMicron,
            "airnm" => WavelengthUnit::AirNanometer,
            "airaa" | "airå" | "airangstrom" => WavelengthUnit::AirAngstrom,
            "cm1" | "cm^1" | "cm⁻¹" | "1/cm" | "wavenumber" => WavelengthUnit::Wavenumber,
            _ => {
                return Err(SpectralError::UnsupportedUnit(format!(
                    "unknown wavelength unit '{s}'"
                )))
            }
        };
        Ok(unit)
    }

    /// Infer a unit from a column label, e.g. `wavelength (Angstrom)` or
    /// `wave_air_nm`. Returns `None` when nothing recognisable is present.
    pub fn from_label(label: &str) -> Option<WavelengthUnit> {
        let all = label_tokens(label);
        let unit_part = unit_tokens(label);
        let has = |t: &[String], words: &[&str]| t.iter().any(|tok| words.contains(&tok.as_str()));

        if has(&all, &["wavenumber", "wavenumbers", "kayser"]) {
            return Some(WavelengthUnit::Wavenumber);
        }
        let air = has(&all, &["air"]);
        if has(&unit_part, &["nm", "nanometer", "nanometers"]) {
            return Some(if air {
                WavelengthUnit::AirNanometer
            } else {
                WavelengthUnit::VacuumNanometer
            });
        }
        if has(&unit_part, &["angstrom", "angstroms", "ang", "aa", "a"]) {
            return Some(if air {
                WavelengthUnit::AirAngstrom
            } else {
                WavelengthUnit::VacuumAngstrom
            });
        }
        if !air && has(&unit_part, &["um", "micron", "microns", "micrometer", "micrometers"]) {
            return Some(WavelengthUnit::VacuumMicron);
        }
        None
    }

    /// Map an axis value in this unit to a vacuum wavelength in nm.
    pub fn to_vacuum_nm(self, value: f64) -> Result<f64> {
        match self {
            WavelengthUnit::VacuumNanometer => Ok(value),
            WavelengthUnit::VacuumAngstrom => Ok(value / 10.0),
            WavelengthUnit::VacuumMicron => Ok(value * 1000.0),
            WavelengthUnit::AirNanometer => air_to_vacuum_nm(value),
            WavelengthUnit::AirAngstrom => air_to_vacuum_nm(value / 10.0),
            WavelengthUnit::Wavenumber => {
                if value <= 0.0 {
                    return Err(SpectralError::UnsupportedUnit(format!(
                        "wavenumber {value} has no wavelength equivalent"
                    )));
                }
                Ok(1.0e7 / value)
            }
        }
    }

    /// Inverse of [`WavelengthUnit::to_vacuum_nm`].
    pub fn from_vacuum_nm(self, nm: f64) -> Result<f64> {
        match self {
            WavelengthUnit::VacuumNanometer => Ok(nm),
            WavelengthUnit::VacuumAngstrom => Ok(nm * 10.0),
            WavelengthUnit::VacuumMicron => Ok(nm / 1000.0),
            WavelengthUnit::AirNanometer => vacuum_to_air_nm(nm),
            WavelengthUnit::AirAngstrom => Ok(vacuum_to_air_nm(nm)? * 10.0),
            WavelengthUnit::Wavenumber => {
                if nm <= 0.0 {
                    return Err(SpectralError::UnsupportedUnit(format!(
                        "wavelength {nm} nm has no wavenumber equivalent"
                    )));
                }
                Ok(1.0e7 / nm)
            }
        }
    }
}

impl fmt::Display for WavelengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Air / vacuum
// ---------------------------------------------------------------------------

/// Refractive index of standard air at a vacuum wavelength (nm).
///
/// IAU standard, Morton (2000) after Ciddor (1996):
/// `n = 1 + 8.34254e-5 + 2.406147e-2 / (130 - σ²) + 1.5998e-4 / (38.9 - σ²)`
/// with σ the vacuum wavenumber in µm⁻¹.
pub fn air_refractive_index(vacuum_nm: f64) -> f64 {
    let sigma = 1.0e3 / vacuum_nm;
    let s2 = sigma * sigma;
    1.0 + 8.342_54e-5 + 2.406_147e-2 / (130.0 - s2) + 1.5998e-4 / (38.9 - s2)
}

pub fn vacuum_to_air_nm(vacuum_nm: f64) -> Result<f64> {
    if !(vacuum_nm >= AIR_FORMULA_MIN_NM) {
        return Err(air_domain_error(vacuum_nm));
    }
    Ok(vacuum_nm / air_refractive_index(vacuum_nm))
}

/// Solves `air = vac / n(vac)` for `vac`. The fixed point contracts by a
/// factor far below 1e-4 per step, so a handful of iterations reach the
/// closest representable value.
pub fn air_to_vacuum_nm(air_nm: f64) -> Result<f64> {
    if !(air_nm >= AIR_FORMULA_MIN_NM * 0.99) {
        return Err(air_domain_error(air_nm));
    }
    let mut vac = air_nm * air_refractive_index(air_nm);
    for _ in 0..16 {
        let next = air_nm * air_refractive_index(vac);
        if next == vac {
            break;
        }
        vac = next;
    }
    if vac < AIR_FORMULA_MIN_NM {
        return Err(air_domain_error(air_nm));
    }
    Ok(vac)
}

fn air_domain_error(nm: f64) -> SpectralError {
    SpectralError::UnsupportedUnit(format!(
        "air wavelengths are defined above {AIR_FORMULA_MIN_NM} nm, got {nm} nm"
    ))
}

// ---------------------------------------------------------------------------
// Flux units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FluxUnit {
    Jansky,
    MilliJansky,
    /// erg s⁻¹ cm⁻² Hz⁻¹
    ErgPerSecCm2Hz,
    /// erg s⁻¹ cm⁻² Å⁻¹
    ErgPerSecCm2Angstrom,
    /// W m⁻² nm⁻¹
    WattPerM2Nm,
    /// W m⁻² µm⁻¹
    WattPerM2Micron,
    /// Ratios, normalized spectra.
    Dimensionless,
}

impl FluxUnit {
    pub const ALL: [FluxUnit; 7] = [
        FluxUnit::Jansky,
        FluxUnit::MilliJansky,
        FluxUnit::ErgPerSecCm2Hz,
        FluxUnit::ErgPerSecCm2Angstrom,
        FluxUnit::WattPerM2Nm,
        FluxUnit::WattPerM2Micron,
        FluxUnit::Dimensionless,
    ];

    pub const CANONICAL: FluxUnit = FluxUnit::Jansky;

    pub fn symbol(self) -> &'static str {
        match self {
            FluxUnit::Jansky => "Jy",
            FluxUnit::MilliJansky => "mJy",
            FluxUnit::ErgPerSecCm2Hz => "erg/s/cm²/Hz",
            FluxUnit::ErgPerSecCm2Angstrom => "erg/s/cm²/Å",
            FluxUnit::WattPerM2Nm => "W/m²/nm",
            FluxUnit::WattPerM2Micron => "W/m²/µm",
            FluxUnit::Dimensionless => "dimensionless",
        }
    }

    pub fn parse(s: &str) -> Result<FluxUnit> {
        if s.trim().is_empty() {
            return Err(SpectralError::UnsupportedUnit("empty flux unit".into()));
        }
        Self::from_label(s).ok_or_else(|| {
            SpectralError::UnsupportedUnit(format!("unknown flux unit '{s}'"))
        })
    }

    /// Infer a unit from a column label such as `flux (Jy)`,
    /// `flux [erg/s/cm2/A]` or `irradiance_w_m2_nm`.
    pub fn from_label(label: &str) -> Option<FluxUnit> {
        let t = unit_tokens(label);
        let has = |words: &[&str]| t.iter().any(|tok| words.contains(&tok.as_str()));

        if has(&["mjy"]) {
            return Some(FluxUnit::MilliJansky);
        }
        if has(&["jy", "jansky", "janskys"]) {
            return Some(FluxUnit::Jansky);
        }
        if has(&["erg", "ergs"]) {
            if has(&["hz"]) {
                return Some(FluxUnit::ErgPerSecCm2Hz);
            }
            if has(&["a", "aa", "ang", "angstrom"]) {
                return Some(FluxUnit::ErgPerSecCm2Angstrom);
            }
            return None;
        }
        if has(&["w", "watt", "watts"]) && has(&["m2"]) {
            if has(&["nm"]) {
                return Some(FluxUnit::WattPerM2Nm);
            }
            if has(&["um", "micron"]) {
                return Some(FluxUnit::WattPerM2Micron);
            }
        }
        if has(&["dimensionless", "unitless", "normalized", "relative"]) {
            return Some(FluxUnit::Dimensionless);
        }
        None
    }

    /// Jansky per unit of `self` at the given vacuum wavelength, or `None`
    /// for dimensionless values.
    fn jansky_per_unit(self, vacuum_nm: f64) -> Option<f64> {
        let angstrom = vacuum_nm * 10.0;
        let per_angstrom = angstrom * angstrom / SPEED_OF_LIGHT_ANGSTROM_PER_S * 1.0e23;
        match self {
            FluxUnit::Jansky => Some(1.0),
            FluxUnit::MilliJansky => Some(1.0e-3),
            FluxUnit::ErgPerSecCm2Hz => Some(1.0e23),
            FluxUnit::ErgPerSecCm2Angstrom => Some(per_angstrom),
            FluxUnit::WattPerM2Nm => Some(100.0 * per_angstrom),
            FluxUnit::WattPerM2Micron => Some(0.1 * per_angstrom),
            FluxUnit::Dimensionless => None,
        }
    }
}

impl fmt::Display for FluxUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Label tokenizer
// ---------------------------------------------------------------------------

/// Lower-case alphanumeric tokens, with `m 2` style pairs merged into `m2`
/// and reciprocal centimetres rewritten to `wavenumber`.
fn label_tokens(text: &str) -> Vec<String> {
    let mut cleaned = text.to_lowercase();
    for pat in ["cm^-1", "cm**-1", "cm-1", "1/cm", "cm⁻¹"] {
        cleaned = cleaned.replace(pat, " wavenumber ");
    }
    cleaned = cleaned.replace('å', " angstrom ").replace('µ', "u");
    let raw: Vec<&str> = cleaned
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut merged = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if i + 1 < raw.len() {
            let combined = format!("{}{}", raw[i], raw[i + 1]);
            if matches!(combined.as_str(), "m2" | "cm2" | "m3" | "cm3") {
                merged.push(combined);
                i += 2;
                continue;
            }
        }
        merged.push(raw[i].to_string());
        i += 1;
    }
    merged
}

/// Tokens of the bracketed unit part of a label, or of the whole label when
/// it has no `(...)` / `[...]` group.
fn unit_tokens(label: &str) -> Vec<String> {
    let bracketed = [('(', ')'), ('[', ']')].iter().find_map(|&(open, close)| {
        let start = label.find(open)?;
        let end = label[start + 1..].find(close)? + start + 1;
        Some(&label[start + 1..end])
    });
    label_tokens(bracketed.unwrap_or(label))
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert a spectrum to the requested units. Pure: the input is untouched
/// and a new spectrum is returned.
///
/// Crossing between a wavelength unit and [`WavelengthUnit::Wavenumber`]
/// reverses the sample order so the stored axis stays increasing.
pub fn convert(
    spectrum: &Spectrum,
    wavelength_unit: WavelengthUnit,
    flux_unit: FluxUnit,
) -> Result<Spectrum> {
    let src_w = spectrum.wavelength_unit();
    let src_f = spectrum.flux_unit();
    if src_w == wavelength_unit && src_f == flux_unit {
        return Ok(spectrum.clone());
    }
    if (src_f == FluxUnit::Dimensionless) != (flux_unit == FluxUnit::Dimensionless) {
        return Err(SpectralError::UnsupportedUnit(format!(
            "cannot convert flux from {src_f} to {flux_unit}"
        )));
    }

    let vacuum_nm: Vec<f64> = spectrum
        .wavelength()
        .iter()
        .map(|&x| src_w.to_vacuum_nm(x))
        .collect::<Result<_>>()?;

    let mut axis: Vec<f64> = if src_w == wavelength_unit {
        spectrum.wavelength().to_vec()
    } else {
        vacuum_nm
            .iter()
            .map(|&nm| wavelength_unit.from_vacuum_nm(nm))
            .collect::<Result<_>>()?
    };

    let mut flux: Vec<f64> = if src_f == flux_unit {
        spectrum.flux().to_vec()
    } else {
        spectrum
            .flux()
            .iter()
            .zip(&vacuum_nm)
            .map(|(&y, &nm)| {
                match (src_f.jansky_per_unit(nm), flux_unit.jansky_per_unit(nm)) {
                    (Some(from), Some(to)) => Ok(y * from / to),
                    _ => Err(SpectralError::UnsupportedUnit(format!(
                        "cannot convert flux from {src_f} to {flux_unit}"
                    ))),
                }
            })
            .collect::<Result<_>>()?
    };

    if src_w.is_wavenumber() != wavelength_unit.is_wavenumber() {
        axis.reverse();
        flux.reverse();
    }

    Spectrum::new(
        spectrum.id(),
        axis,
        flux,
        wavelength_unit,
        flux_unit,
        spectrum.metadata().clone(),
    )
}

/// Convert to the given units and back, and report whether the samples agree
/// within [`ROUND_TRIP_RTOL`].
pub fn round_trip_verified(
    spectrum: &Spectrum,
    wavelength_unit: WavelengthUnit,
    flux_unit: FluxUnit,
) -> Result<bool> {
    let there = convert(spectrum, wavelength_unit, flux_unit)?;
    let back = convert(&there, spectrum.wavelength_unit(), spectrum.flux_unit())?;
    let close = |a: &[f64], b: &[f64]| {
        a.len() == b.len()
            && a.iter()
                .zip(b)
                .all(|(x, y)| (x - y).abs() <= ROUND_TRIP_RTOL * x.abs().max(y.abs()) + 1e-300)
    };
    Ok(close(spectrum.wavelength(), back.wavelength()) && close(spectrum.flux(), back.flux()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::SpectrumMetadata;
    use approx::assert_relative_eq;

    fn optical(flux_unit: FluxUnit) -> Spectrum {
        let wavelength: Vec<f64> = (0..200).map(|i| 400.0 + i as f64 * 2.5).collect();
        let flux: Vec<f64> = wavelength
            .iter()
            .map(|w| 1.0 + 0.5 * (w / 37.0).sin())
            .collect();
        Spectrum::new(
            "optical",
            wavelength,
            flux,
            WavelengthUnit::VacuumNanometer,
            flux_unit,
            SpectrumMetadata::new("test"),
        )
        .unwrap()
    }

    fn dimensioned() -> impl Iterator<Item = FluxUnit> {
        FluxUnit::ALL
            .into_iter()
            .filter(|u| *u != FluxUnit::Dimensionless)
    }

    #[test]
    fn round_trip_every_unit_pair() {
        for f1 in dimensioned() {
            for w1 in WavelengthUnit::ALL {
                let start = convert(&optical(FluxUnit::Jansky), w1, f1).unwrap();
                for f2 in dimensioned() {
                    for w2 in WavelengthUnit::ALL {
                        let there = convert(&start, w2, f2).unwrap();
                        let back = convert(&there, w1, f1).unwrap();
                        assert_eq!(back.len(), start.len());
                        for (a, b) in start.wavelength().iter().zip(back.wavelength()) {
                            assert_relative_eq!(*a, *b, max_relative = 1e-12);
                        }
                        for (a, b) in start.flux().iter().zip(back.flux()) {
                            assert_relative_eq!(*a, *b, max_relative = 1e-12);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn repeated_toggles_do_not_drift() {
        let original = optical(FluxUnit::Jansky);
        let mut current = original.clone();
        for _ in 0..50 {
            current = convert(&current, WavelengthUnit::AirAngstrom, FluxUnit::WattPerM2Micron).unwrap();
            current = convert(&current, WavelengthUnit::VacuumNanometer, FluxUnit::Jansky).unwrap();
        }
        for (a, b) in original.wavelength().iter().zip(current.wavelength()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
        for (a, b) in original.flux().iter().zip(current.flux()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn same_units_is_identity() {
        let s = optical(FluxUnit::MilliJansky);
        let same = convert(&s, WavelengthUnit::VacuumNanometer, FluxUnit::MilliJansky).unwrap();
        assert_eq!(same, s);
    }

    #[test]
    fn air_vacuum_known_values() {
        // H-alpha: 656.281 nm in air, 656.461 nm in vacuum.
        assert_relative_eq!(vacuum_to_air_nm(656.461).unwrap(), 656.281, epsilon = 2e-3);
        assert_relative_eq!(air_to_vacuum_nm(656.281).unwrap(), 656.461, epsilon = 2e-3);
        let v = 500.0;
        assert_relative_eq!(air_to_vacuum_nm(vacuum_to_air_nm(v).unwrap()).unwrap(), v, max_relative = 1e-15);
    }

    #[test]
    fn air_outside_formula_domain_fails() {
        let uv = Spectrum::new(
            "uv",
            vec![120.0, 130.0],
            vec![1.0, 1.0],
            WavelengthUnit::VacuumNanometer,
            FluxUnit::Jansky,
            SpectrumMetadata::new("test"),
        )
        .unwrap();
        assert!(matches!(
            convert(&uv, WavelengthUnit::AirNanometer, FluxUnit::Jansky),
            Err(SpectralError::UnsupportedUnit(_))
        ));
    }

    #[test]
    fn wavenumber_reverses_order() {
        let s = optical(FluxUnit::Jansky);
        let k = convert(&s, WavelengthUnit::Wavenumber, FluxUnit::Jansky).unwrap();
        assert_relative_eq!(k.wavelength()[k.len() - 1], 1.0e7 / 400.0, max_relative = 1e-12);
        assert_relative_eq!(k.flux()[k.len() - 1], s.flux()[0]);
        assert!(k.wavelength().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn jansky_to_flambda() {
        let s = Spectrum::new(
            "ir",
            vec![1000.0],
            vec![3.0],
            WavelengthUnit::VacuumNanometer,
            FluxUnit::Jansky,
            SpectrumMetadata::new("test"),
        )
        .unwrap();
        let c = convert(&s, WavelengthUnit::VacuumAngstrom, FluxUnit::ErgPerSecCm2Angstrom).unwrap();
        assert_relative_eq!(c.wavelength()[0], 10_000.0);
        assert_relative_eq!(c.flux()[0], 3.0e-23 * 2.997_924_58e18 / 1.0e8, max_relative = 1e-12);
        assert!(round_trip_verified(&s, WavelengthUnit::VacuumAngstrom, FluxUnit::ErgPerSecCm2Angstrom).unwrap());
    }

    #[test]
    fn dimensionless_only_converts_to_itself() {
        let s = optical(FluxUnit::Dimensionless);
        assert!(convert(&s, WavelengthUnit::VacuumAngstrom, FluxUnit::Dimensionless).is_ok());
        assert!(matches!(
            convert(&s, WavelengthUnit::VacuumNanometer, FluxUnit::Jansky),
            Err(SpectralError::UnsupportedUnit(_))
        ));
    }

    #[test]
    fn labels_map_to_units() {
        assert_eq!(
            WavelengthUnit::from_label("wavelength (Angstrom)"),
            Some(WavelengthUnit::VacuumAngstrom)
        );
        assert_eq!(WavelengthUnit::from_label("wavelength_nm"), Some(WavelengthUnit::VacuumNanometer));
        assert_eq!(WavelengthUnit::from_label("wave_air [nm]"), Some(WavelengthUnit::AirNanometer));
        assert_eq!(WavelengthUnit::from_label("wavenumber (cm-1)"), Some(WavelengthUnit::Wavenumber));
        assert_eq!(WavelengthUnit::from_label("WAVELENGTH"), None);
        assert_eq!(FluxUnit::from_label("flux (Jy)"), Some(FluxUnit::Jansky));
        assert_eq!(FluxUnit::from_label("irradiance_w_m2_nm"), Some(FluxUnit::WattPerM2Nm));
        assert_eq!(FluxUnit::from_label("flux [erg/s/cm2/A]"), Some(FluxUnit::ErgPerSecCm2Angstrom));
        assert_eq!(FluxUnit::from_label("F_nu (erg s-1 cm-2 Hz-1)"), Some(FluxUnit::ErgPerSecCm2Hz));
        assert_eq!(FluxUnit::from_label("flux"), None);
    }

    #[test]
    fn parse_rejects_unknown_symbols() {
        assert_eq!(WavelengthUnit::parse("air-nm").unwrap(), WavelengthUnit::AirNanometer);
        assert_eq!(WavelengthUnit::parse("cm-1").unwrap(), WavelengthUnit::Wavenumber);
        assert!(matches!(WavelengthUnit::parse("furlong"), Err(SpectralError::UnsupportedUnit(_))));
        assert!(matches!(FluxUnit::parse("lumens"), Err(SpectralError::UnsupportedUnit(_))));
    }
}
