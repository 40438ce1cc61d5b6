use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::fits::{self, Hdu};
use super::model::{MetadataValue, Spectrum, SpectrumMetadata};
use crate::error::{Result, SpectralError};
use crate::units::{FluxUnit, WavelengthUnit};

/// Header-name candidates for the spectral axis, in priority order.
const WAVE_PRIORITY: &[&str] = &["wavelength", "lambda", "wave", "wl"];

/// Header-name candidates for the flux column, in priority order.
const FLUX_PRIORITY: &[&str] = &["flux", "intensity", "power", "counts"];

/// Name fragments that mark uncertainty columns (`flux_err`, `FLUX_ERROR`, ...).
const UNCERTAINTY_MARKERS: &[&str] = &["err", "unc", "sigma", "ivar", "var"];

/// Header keywords copied from structured binary products into `extra`.
pub const HEADER_FIELDS: &[&str] = &[
    "OBJECT", "TARGNAME", "DATE-OBS", "TELESCOP", "INSTRUME", "DETECTOR", "OBSERVER", "ORIGIN",
    "PROGRAM", "OBS_ID", "VISIT", "CAL_VER",
];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// The closed set of ingestion adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Delimited text: CSV, TSV, whitespace-separated columns.
    DelimitedText,
    /// FITS product (1-D primary image or binary table).
    Fits,
    /// Parquet with one numeric column per axis.
    Parquet,
}

impl InputFormat {
    pub fn from_extension(ext: &str) -> Option<InputFormat> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" | "tsv" | "dat" => Some(InputFormat::DelimitedText),
            "fits" | "fit" | "fts" => Some(InputFormat::Fits),
            "parquet" | "pq" => Some(InputFormat::Parquet),
            _ => None,
        }
    }

    /// Pick the adapter for a path or URI by its extension.
    pub fn for_name(name: &str) -> Result<InputFormat> {
        let ext = Path::new(name.split(['?', '#']).next().unwrap_or(name))
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Self::from_extension(ext).ok_or_else(|| {
            SpectralError::Ingestion(format!("unsupported spectrum format: .{ext}"))
        })
    }
}

/// Caller-declared facts that override what the adapters infer.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub identifier: Option<String>,
    pub source: Option<String>,
    pub wavelength_unit: Option<WavelengthUnit>,
    pub flux_unit: Option<FluxUnit>,
}

/// Load a spectrum from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.csv .txt .tsv .dat` – delimited text with a wavelength and a flux column
/// * `.fits .fit .fts`     – FITS 1-D image or binary table
/// * `.parquet .pq`        – Parquet with numeric or list columns
pub fn load_file(path: &Path) -> Result<Spectrum> {
    let name = path.to_string_lossy();
    let format = InputFormat::for_name(&name)?;
    let bytes = std::fs::read(path)
        .map_err(|e| SpectralError::Io(format!("reading {}: {e}", path.display())))?;
    let options = ParseOptions {
        identifier: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
        source: Some(name.into_owned()),
        ..Default::default()
    };
    parse(&bytes, format, &options)
}

/// Parse raw bytes with the declared adapter.
pub fn parse(raw: &[u8], format: InputFormat, options: &ParseOptions) -> Result<Spectrum> {
    let source = options.source.clone().unwrap_or_else(|| "in-memory".to_string());
    let mut metadata = SpectrumMetadata::new(source);
    let table = match format {
        InputFormat::DelimitedText => {
            metadata.description = Some("ASCII spectrum".into());
            read_delimited(&String::from_utf8_lossy(raw), &mut metadata)?
        }
        InputFormat::Fits => {
            metadata.description = Some("FITS spectrum".into());
            read_fits(raw, &mut metadata)?
        }
        InputFormat::Parquet => {
            metadata.description = Some("Parquet spectrum".into());
            read_parquet(raw, &mut metadata)?
        }
    };
    let spectrum = assemble(table, metadata, options)?;
    log::info!(
        "Loaded spectrum '{}' with {} samples ({}, {})",
        spectrum.id(),
        spectrum.len(),
        spectrum.wavelength_unit(),
        spectrum.flux_unit()
    );
    Ok(spectrum)
}

// ---------------------------------------------------------------------------
// Column table shared by every adapter
// ---------------------------------------------------------------------------

/// One candidate sample column. `None` cells are non-numeric, null or
/// non-finite.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    unit: Option<String>,
    values: Vec<Option<f64>>,
}

impl Column {
    fn is_numeric(&self) -> bool {
        let valid = self.values.iter().filter(|v| v.is_some()).count();
        valid > 0 && valid * 2 >= self.values.len()
    }
}

fn parse_cell(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Record a header keyword in `extra` and lift the well-known ones into
/// the typed metadata fields.
fn apply_header_field(metadata: &mut SpectrumMetadata, key: &str, value: MetadataValue) {
    let key = key.trim().to_ascii_lowercase();
    let text = value.to_string();
    match key.as_str() {
        "object" | "targname" | "target" if metadata.target.is_none() => {
            metadata.target = Some(text)
        }
        "instrume" | "instrument" if metadata.instrument.is_none() => {
            metadata.instrument = Some(text)
        }
        "date-obs" | "date_obs" if metadata.observation_date.is_none() => {
            metadata.observation_date = Some(text)
        }
        _ => {}
    }
    metadata.extra.insert(key, value);
}

// ---------------------------------------------------------------------------
// Delimited text adapter
// ---------------------------------------------------------------------------

/// CSV layout: optional `# KEY = value` comment lines, an optional header
/// row, then one sample per row. The delimiter (comma, tab, semicolon or
/// whitespace) is taken from the first data line.
fn read_delimited(text: &str, metadata: &mut SpectrumMetadata) -> Result<Vec<Column>> {
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            if let Some((key, value)) = split_comment(comment) {
                apply_header_field(metadata, key, MetadataValue::guess(value));
            }
            continue;
        }
        lines.push(trimmed);
    }
    let first = lines
        .first()
        .ok_or_else(|| SpectralError::Ingestion("no data rows detected in text spectrum".into()))?;

    let (delimiter, body) = if first.contains(',') {
        (b',', lines.join("\n"))
    } else if first.contains('\t') {
        (b'\t', lines.join("\n"))
    } else if first.contains(';') {
        (b';', lines.join("\n"))
    } else {
        let normalized: Vec<String> = lines
            .iter()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join("\t"))
            .collect();
        (b'\t', normalized.join("\n"))
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| SpectralError::Ingestion(format!("text row {row_no}: {e}")))?;
        records.push(record);
    }

    // A header row has no numeric cell and at least one word; anything else
    // is data, so a bad first sample is dropped and counted like any other.
    let has_header = records
        .first()
        .map(|r| {
            r.iter().all(|cell| cell.parse::<f64>().is_err())
                && r.iter().any(|cell| cell.chars().any(char::is_alphabetic))
        })
        .unwrap_or(false);
    let n_cols = records.iter().map(|r| r.len()).max().unwrap_or(0);
    let names: Vec<String> = (0..n_cols)
        .map(|i| {
            if has_header {
                records[0].get(i).unwrap_or("").to_string()
            } else {
                format!("col{i}")
            }
        })
        .collect();
    let data = if has_header { &records[1..] } else { &records[..] };

    Ok(names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column {
            name,
            unit: None,
            values: data
                .iter()
                .map(|r| r.get(i).and_then(parse_cell))
                .collect(),
        })
        .collect())
}

/// `KEY = value` or `KEY: value`; the key must be a single word.
fn split_comment(comment: &str) -> Option<(&str, &str)> {
    let pos = comment.find(['=', ':'])?;
    let key = comment[..pos].trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, comment[pos + 1..].trim()))
}

// ---------------------------------------------------------------------------
// FITS adapter
// ---------------------------------------------------------------------------

fn read_fits(raw: &[u8], metadata: &mut SpectrumMetadata) -> Result<Vec<Column>> {
    let hdus = fits::read_hdus(raw)?;
    let primary = &hdus[0];

    let table = hdus
        .iter()
        .skip(1)
        .find(|h| h.header.get_string("XTENSION") == Some("BINTABLE"));
    copy_header_fields(primary, table, metadata);

    if let Some(table) = table {
        let columns = fits::read_table_columns(table)?;
        return Ok(columns
            .into_iter()
            .map(|c| Column {
                name: c.name,
                unit: c.unit,
                values: c.values,
            })
            .collect());
    }

    if primary.header.get_int("NAXIS") == Some(1) {
        let flux = fits::read_image_1d(primary)?;
        let h = &primary.header;
        let crval = h.get_float("CRVAL1").unwrap_or(1.0);
        let crpix = h.get_float("CRPIX1").unwrap_or(1.0);
        let cdelt = h
            .get_float("CDELT1")
            .or_else(|| h.get_float("CD1_1"))
            .unwrap_or(1.0);
        let ctype = h.get_string("CTYPE1").unwrap_or("WAVE").to_ascii_uppercase();
        let axis_name = match ctype.get(..4) {
            Some("AWAV") => "wavelength_air",
            Some("WAVN") => "wavenumber",
            _ => "wavelength",
        };
        let wavelength = (0..flux.len())
            .map(|i| Some(crval + (i as f64 + 1.0 - crpix) * cdelt))
            .collect();
        return Ok(vec![
            Column {
                name: axis_name.to_string(),
                unit: h.get_string("CUNIT1").map(str::to_string),
                values: wavelength,
            },
            Column {
                name: "flux".to_string(),
                unit: h.get_string("BUNIT").map(str::to_string),
                values: flux,
            },
        ]);
    }

    Err(SpectralError::Ingestion(
        "FITS: no 1-D image or binary table with spectral columns".into(),
    ))
}

fn copy_header_fields(primary: &Hdu<'_>, table: Option<&Hdu<'_>>, metadata: &mut SpectrumMetadata) {
    for key in HEADER_FIELDS {
        let value = primary
            .header
            .get(key)
            .or_else(|| table.and_then(|t| t.header.get(key)));
        let Some(value) = value else { continue };
        let value = match value {
            fits::FitsValue::String(s) => MetadataValue::String(s.clone()),
            fits::FitsValue::Integer(i) => MetadataValue::Integer(*i),
            fits::FitsValue::Float(f) => MetadataValue::Float(*f),
            fits::FitsValue::Boolean(b) => MetadataValue::Bool(*b),
        };
        apply_header_field(metadata, key, value);
    }
}

// ---------------------------------------------------------------------------
// Parquet adapter
// ---------------------------------------------------------------------------

/// Expected schema: numeric columns (one sample per row) or List /
/// LargeList columns (samples inside the list). Arrow schema metadata
/// entries are treated as header fields.
fn read_parquet(raw: &[u8], metadata: &mut SpectrumMetadata) -> Result<Vec<Column>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(raw))
        .map_err(|e| SpectralError::Ingestion(format!("reading parquet metadata: {e}")))?;

    let schema = builder.schema().clone();
    let mut header: Vec<(&String, &String)> = schema.metadata().iter().collect();
    header.sort();
    for (key, value) in header {
        if key.starts_with("ARROW:") || key == "pandas" {
            continue;
        }
        apply_header_field(metadata, key, MetadataValue::guess(value));
    }

    let mut columns: Vec<Column> = schema
        .fields()
        .iter()
        .map(|f| Column {
            name: f.name().clone(),
            unit: f.metadata().get("unit").cloned(),
            values: Vec::new(),
        })
        .collect();
    let mut numeric = vec![true; columns.len()];

    let reader = builder
        .build()
        .map_err(|e| SpectralError::Ingestion(format!("building parquet reader: {e}")))?;
    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| SpectralError::Ingestion(format!("reading parquet record batch: {e}")))?;
        for (idx, column) in columns.iter_mut().enumerate() {
            if !numeric[idx] {
                continue;
            }
            match extract_f64_values(batch.column(idx)) {
                Some(values) => column.values.extend(values),
                None => numeric[idx] = false,
            }
        }
    }

    Ok(columns
        .into_iter()
        .zip(numeric)
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect())
}

/// Numeric column → values, List column → flattened entries. `None` for
/// columns that hold neither.
fn extract_f64_values(col: &ArrayRef) -> Option<Vec<Option<f64>>> {
    match col.data_type() {
        DataType::List(_) => {
            let list = col.as_list::<i32>();
            let mut out = Vec::new();
            for row in 0..list.len() {
                if list.is_null(row) {
                    continue;
                }
                out.extend(numeric_values(&list.value(row))?);
            }
            Some(out)
        }
        DataType::LargeList(_) => {
            let list = col.as_list::<i64>();
            let mut out = Vec::new();
            for row in 0..list.len() {
                if list.is_null(row) {
                    continue;
                }
                out.extend(numeric_values(&list.value(row))?);
            }
            Some(out)
        }
        _ => numeric_values(col),
    }
}

fn numeric_values(col: &ArrayRef) -> Option<Vec<Option<f64>>> {
    if !col.data_type().is_numeric() {
        return None;
    }
    let as_f64 = cast(col, &DataType::Float64).ok()?;
    let arr = as_f64.as_any().downcast_ref::<Float64Array>()?;
    Some(arr.iter().map(|v| v.filter(|x| x.is_finite())).collect())
}

// ---------------------------------------------------------------------------
// Column selection and spectrum assembly
// ---------------------------------------------------------------------------

fn is_uncertainty(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    UNCERTAINTY_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Exact header match first (in candidate priority), then prefix match in
/// column order. Uncertainty columns only ever match exactly.
fn resolve_column(candidates: &[&str], columns: &[Column], skip: Option<usize>) -> Option<usize> {
    let lowered: Vec<String> = columns
        .iter()
        .map(|c| c.name.trim().to_ascii_lowercase())
        .collect();
    for candidate in candidates {
        if let Some(i) = lowered
            .iter()
            .enumerate()
            .position(|(i, n)| Some(i) != skip && n == candidate)
        {
            return Some(i);
        }
    }
    lowered.iter().enumerate().position(|(i, n)| {
        Some(i) != skip
            && !is_uncertainty(n)
            && candidates.iter().any(|c| n.starts_with(c))
    })
}

fn select_columns(columns: &[Column]) -> Result<(usize, usize)> {
    let first_numeric = |skip: Option<usize>| {
        columns
            .iter()
            .enumerate()
            .position(|(i, c)| Some(i) != skip && c.is_numeric())
    };
    let wave = resolve_column(WAVE_PRIORITY, columns, None)
        .or_else(|| first_numeric(None))
        .ok_or_else(|| SpectralError::Ingestion("no numeric wavelength column".into()))?;
    let flux = resolve_column(FLUX_PRIORITY, columns, Some(wave))
        .or_else(|| first_numeric(Some(wave)))
        .ok_or_else(|| SpectralError::Ingestion("no numeric flux column".into()))?;
    Ok((wave, flux))
}

fn assemble(columns: Vec<Column>, mut metadata: SpectrumMetadata, options: &ParseOptions) -> Result<Spectrum> {
    let (wave_idx, flux_idx) = select_columns(&columns)?;
    let wave = &columns[wave_idx];
    let flux = &columns[flux_idx];

    let total = wave.values.len().max(flux.values.len());
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(total);
    let mut dropped = 0usize;
    for i in 0..total {
        let w = wave.values.get(i).copied().flatten();
        let f = flux.values.get(i).copied().flatten();
        match (w, f) {
            (Some(w), Some(f)) => pairs.push((w, f)),
            _ => dropped += 1,
        }
    }
    if pairs.is_empty() {
        return Err(SpectralError::Ingestion(format!(
            "no valid numeric rows in columns '{}' / '{}' ({dropped} dropped)",
            wave.name, flux.name
        )));
    }
    if dropped > 0 {
        log::warn!("Dropped {dropped} rows with non-numeric samples");
    }

    let wavelength_unit = options
        .wavelength_unit
        .or_else(|| axis_unit(wave))
        .unwrap_or_else(|| {
            metadata
                .extra
                .insert("wavelength_unit_assumed".into(), MetadataValue::Bool(true));
            log::warn!("Wavelength unit of '{}' undetermined, assuming nm", wave.name);
            WavelengthUnit::CANONICAL
        });
    let flux_unit = options
        .flux_unit
        .or_else(|| flux.unit.as_deref().and_then(FluxUnit::from_label))
        .or_else(|| FluxUnit::from_label(&flux.name))
        .unwrap_or_else(|| {
            metadata
                .extra
                .insert("flux_unit_assumed".into(), MetadataValue::Bool(true));
            log::warn!("Flux unit of '{}' undetermined, assuming Jy", flux.name);
            FluxUnit::CANONICAL
        });

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (wavelength, flux_values, merged) = merge_duplicates(&pairs);

    let extra = &mut metadata.extra;
    extra.insert("wave_column".into(), MetadataValue::String(wave.name.clone()));
    extra.insert("flux_column".into(), MetadataValue::String(flux.name.clone()));
    extra.insert("row_count".into(), MetadataValue::Integer(total as i64));
    extra.insert("dropped_rows".into(), MetadataValue::Integer(dropped as i64));
    extra.insert("merged_duplicates".into(), MetadataValue::Integer(merged as i64));

    let identifier = options
        .identifier
        .clone()
        .or_else(|| {
            Path::new(&metadata.source)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "spectrum".to_string());

    Spectrum::new(identifier, wavelength, flux_values, wavelength_unit, flux_unit, metadata)
}

/// Wavelength unit from the column's attached unit, then from its name.
fn axis_unit(column: &Column) -> Option<WavelengthUnit> {
    let from_unit = column.unit.as_deref().and_then(WavelengthUnit::from_label);
    let from_name = WavelengthUnit::from_label(&column.name);
    let air = column.name.to_ascii_lowercase().contains("air");
    match (from_unit, from_name) {
        (Some(unit), _) if air => Some(to_air(unit)),
        (Some(unit), _) => Some(unit),
        (None, Some(unit)) => Some(unit),
        (None, None) if column.name.to_ascii_lowercase().starts_with("wavenumber") => {
            Some(WavelengthUnit::Wavenumber)
        }
        _ => None,
    }
}

fn to_air(unit: WavelengthUnit) -> WavelengthUnit {
    match unit {
        WavelengthUnit::VacuumNanometer => WavelengthUnit::AirNanometer,
        WavelengthUnit::VacuumAngstrom => WavelengthUnit::AirAngstrom,
        other => other,
    }
}

/// Sorted pairs → strictly increasing axis; equal axis values are merged
/// by averaging their flux.
fn merge_duplicates(pairs: &[(f64, f64)]) -> (Vec<f64>, Vec<f64>, usize) {
    let mut wavelength = Vec::with_capacity(pairs.len());
    let mut flux = Vec::with_capacity(pairs.len());
    let mut merged = 0;
    let mut i = 0;
    while i < pairs.len() {
        let x = pairs[i].0;
        let mut j = i;
        let mut sum = 0.0;
        while j < pairs.len() && pairs[j].0 == x {
            sum += pairs[j].1;
            j += 1;
        }
        wavelength.push(x);
        flux.push(sum / (j - i) as f64);
        merged += j - i - 1;
        i = j;
    }
    (wavelength, flux, merged)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use super::*;

    fn text(data: &str) -> Result<Spectrum> {
        parse(data.as_bytes(), InputFormat::DelimitedText, &ParseOptions::default())
    }

    #[test]
    fn detects_units_from_headers() {
        let s = text("wavelength (Angstrom),flux (Jy)\n5000,1.0\n5100,1.5\n").unwrap();
        assert_eq!(s.wavelength_unit(), WavelengthUnit::VacuumAngstrom);
        assert_eq!(s.flux_unit(), FluxUnit::Jansky);
        assert_eq!(s.wavelength(), &[5000.0, 5100.0]);
        assert_relative_eq!(s.flux()[1], 1.5);
        assert!(!s.metadata().flag("wavelength_unit_assumed"));
    }

    #[test]
    fn bad_flux_rows_are_dropped_and_counted() {
        let mut data = String::from("wavelength_nm,flux_jy\n");
        for i in 0..10 {
            data.push_str(&format!("{},{}\n", 500 + i, 1.0 + i as f64));
        }
        data.push_str("520,n/a\n521,--\n");
        let s = text(&data).unwrap();
        assert_eq!(s.len(), 10);
        assert_eq!(s.metadata().dropped_rows(), 2);
        assert_eq!(s.metadata().extra["row_count"], MetadataValue::Integer(12));
    }

    #[test]
    fn bad_first_row_without_header_is_dropped_and_counted() {
        for first in ["500,--", "500,n/a"] {
            let s = text(&format!("{first}\n501,1\n502,2\n503,3\n")).unwrap();
            assert_eq!(s.wavelength(), &[501.0, 502.0, 503.0]);
            assert_eq!(s.metadata().dropped_rows(), 1);
            assert!(s.metadata().flag("wavelength_unit_assumed"));
        }
    }

    #[test]
    fn zero_valid_rows_fails() {
        let err = text("wavelength,flux\n1,abc\n2,def\n").unwrap_err();
        assert!(matches!(err, SpectralError::Ingestion(_)));
    }

    #[test]
    fn headerless_whitespace_falls_back_to_defaults() {
        let s = text("3  0.5\n1  0.1\n2  0.3\n2  0.5\n").unwrap();
        assert_eq!(s.wavelength(), &[1.0, 2.0, 3.0]);
        assert_relative_eq!(s.flux()[1], 0.4);
        assert_eq!(s.metadata().extra["merged_duplicates"], MetadataValue::Integer(1));
        assert!(s.metadata().flag("wavelength_unit_assumed"));
        assert!(s.metadata().flag("flux_unit_assumed"));
        assert_eq!(s.wavelength_unit(), WavelengthUnit::VacuumNanometer);
    }

    #[test]
    fn comment_metadata_never_raises() {
        let data = "# OBJECT = WASP-39\n# INSTRUME: NIRSpec\n# EXPTIME = 12.5\n# note without separator\n\
                    lambda\tflux_err\tintensity\n600\t0.1\t2\n610\t0.1\t3\n";
        let s = text(data).unwrap();
        let meta = s.metadata();
        assert_eq!(meta.target.as_deref(), Some("WASP-39"));
        assert_eq!(meta.instrument.as_deref(), Some("NIRSpec"));
        assert_eq!(meta.extra["exptime"], MetadataValue::Float(12.5));
        assert_eq!(meta.extra["flux_column"], MetadataValue::String("intensity".into()));
        assert_eq!(s.flux(), &[2.0, 3.0]);
    }

    #[test]
    fn declared_units_override_inference() {
        let options = ParseOptions {
            wavelength_unit: Some(WavelengthUnit::AirAngstrom),
            flux_unit: Some(FluxUnit::MilliJansky),
            ..Default::default()
        };
        let s = parse(b"wave (nm);flux\n6000;1\n6001;2\n", InputFormat::DelimitedText, &options).unwrap();
        assert_eq!(s.wavelength_unit(), WavelengthUnit::AirAngstrom);
        assert_eq!(s.flux_unit(), FluxUnit::MilliJansky);
    }

    #[test]
    fn fits_binary_table_product() {
        let mut data = Vec::new();
        for (w, f) in [(2.0f64, 0.5f64), (1.0, 0.25), (3.0, f64::NAN)] {
            data.extend_from_slice(&w.to_be_bytes());
            data.extend_from_slice(&f.to_be_bytes());
        }
        let c = |k: &str, v: &str| (k.to_string(), v.to_string());
        let bytes = fits::write_fits(&[
            (
                vec![
                    c("SIMPLE", "T"),
                    c("BITPIX", "8"),
                    c("NAXIS", "0"),
                    c("TARGNAME", "'WASP-39'"),
                    c("INSTRUME", "'NIRSPEC'"),
                    c("PROGRAM", "'01366'"),
                    c("VISIT", "3"),
                ],
                Vec::new(),
            ),
            (
                vec![
                    c("XTENSION", "'BINTABLE'"),
                    c("BITPIX", "8"),
                    c("NAXIS", "2"),
                    c("NAXIS1", "16"),
                    c("NAXIS2", "3"),
                    c("PCOUNT", "0"),
                    c("GCOUNT", "1"),
                    c("TFIELDS", "2"),
                    c("TTYPE1", "'WAVELENGTH'"),
                    c("TFORM1", "'D'"),
                    c("TUNIT1", "'um'"),
                    c("TTYPE2", "'FLUX'"),
                    c("TFORM2", "'D'"),
                    c("TUNIT2", "'Jy'"),
                ],
                data,
            ),
        ]);
        let s = parse(&bytes, InputFormat::Fits, &ParseOptions::default()).unwrap();
        assert_eq!(s.wavelength(), &[1.0, 2.0]);
        assert_eq!(s.wavelength_unit(), WavelengthUnit::VacuumMicron);
        assert_eq!(s.metadata().dropped_rows(), 1);
        assert_eq!(s.metadata().target.as_deref(), Some("WASP-39"));
        assert_eq!(s.metadata().extra["program"], MetadataValue::String("01366".into()));
        assert_eq!(s.metadata().extra["visit"], MetadataValue::Integer(3));
    }

    #[test]
    fn fits_primary_image_with_linear_axis() {
        let mut data = Vec::new();
        for f in [1.0f32, 2.0, 3.0] {
            data.extend_from_slice(&f.to_be_bytes());
        }
        let c = |k: &str, v: &str| (k.to_string(), v.to_string());
        let bytes = fits::write_fits(&[(
            vec![
                c("SIMPLE", "T"),
                c("BITPIX", "-32"),
                c("NAXIS", "1"),
                c("NAXIS1", "3"),
                c("CTYPE1", "'AWAV'"),
                c("CUNIT1", "'Angstrom'"),
                c("CRVAL1", "6500.0"),
                c("CRPIX1", "1.0"),
                c("CDELT1", "0.5"),
                c("BUNIT", "'erg/s/cm2/A'"),
            ],
            data,
        )]);
        let s = parse(&bytes, InputFormat::Fits, &ParseOptions::default()).unwrap();
        assert_eq!(s.wavelength(), &[6500.0, 6500.5, 6501.0]);
        assert_eq!(s.wavelength_unit(), WavelengthUnit::AirAngstrom);
        assert_eq!(s.flux_unit(), FluxUnit::ErgPerSecCm2Angstrom);
    }

    #[test]
    fn parquet_scalar_columns_with_schema_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.parquet");

        let mut meta = std::collections::HashMap::new();
        meta.insert("OBJECT".to_string(), "HD 209458".to_string());
        let schema = Arc::new(
            Schema::new(vec![
                Field::new("wavelength (nm)", DataType::Float64, true),
                Field::new("flux (mJy)", DataType::Float64, true),
                Field::new("quality", DataType::Utf8, true),
            ])
            .with_metadata(meta),
        );
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float64Array::from(vec![Some(700.0), Some(710.0), Some(720.0)])),
                Arc::new(Float64Array::from(vec![Some(1.0), None, Some(3.0)])),
                Arc::new(StringArray::from(vec!["ok", "bad", "ok"])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let s = load_file(&path).unwrap();
        assert_eq!(s.id(), "sample");
        assert_eq!(s.wavelength(), &[700.0, 720.0]);
        assert_eq!(s.flux_unit(), FluxUnit::MilliJansky);
        assert_eq!(s.metadata().dropped_rows(), 1);
        assert_eq!(s.metadata().target.as_deref(), Some("HD 209458"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            InputFormat::for_name("spectrum.xlsx"),
            Err(SpectralError::Ingestion(_))
        ));
        assert_eq!(
            InputFormat::for_name("mast:JWST/product/jw01366_x1d.fits").unwrap(),
            InputFormat::Fits
        );
    }
}
