//! Minimal FITS reader for 1-D spectral products.
//!
//! FITS layout:
//! - 2880-byte blocks
//! - Header with 80-character keyword records, terminated by `END`
//! - Data in big-endian format, padded to a block boundary
//!
//! Only what spectral products need is supported: header parsing for every
//! HDU, 1-D primary images, and `BINTABLE` extensions with numeric columns.

use std::collections::HashMap;

use crate::error::{Result, SpectralError};

const BLOCK: usize = 2880;
const CARD: usize = 80;

/// FITS value types
#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl FitsValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FitsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FitsValue::Integer(i) => Some(*i),
            FitsValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FitsValue::Float(f) => Some(*f),
            FitsValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Header keywords of one HDU.
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    keywords: HashMap<String, FitsValue>,
}

impl FitsHeader {
    pub fn get(&self, key: &str) -> Option<&FitsValue> {
        self.keywords.get(&key.to_uppercase())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FitsValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FitsValue::as_i64)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FitsValue::as_f64)
    }

    fn require_int(&self, key: &str) -> Result<i64> {
        self.get_int(key)
            .ok_or_else(|| SpectralError::Ingestion(format!("FITS: missing keyword {key}")))
    }

    /// A size keyword (NAXISn, TFIELDS, ...): present and non-negative.
    fn require_size(&self, key: &str) -> Result<usize> {
        let value = self.require_int(key)?;
        usize::try_from(value)
            .map_err(|_| SpectralError::Ingestion(format!("FITS: {key} = {value} is negative")))
    }
}

/// One header-data unit with its raw (still big-endian) data segment.
#[derive(Debug, Clone)]
pub struct Hdu<'a> {
    pub header: FitsHeader,
    pub data: &'a [u8],
}

/// A numeric column pulled out of a binary table, with its `TUNITn`.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub unit: Option<String>,
    /// One entry per element; `None` when the element is NaN.
    pub values: Vec<Option<f64>>,
}

/// Split a FITS byte stream into HDUs.
pub fn read_hdus(bytes: &[u8]) -> Result<Vec<Hdu<'_>>> {
    if bytes.len() < BLOCK || !bytes.starts_with(b"SIMPLE  =") {
        return Err(SpectralError::Ingestion("not a FITS file".into()));
    }
    let mut hdus = Vec::new();
    let mut offset = 0;
    while offset + BLOCK <= bytes.len() {
        let (header, header_len) = read_header(&bytes[offset..])?;
        offset += header_len;
        let data_len = data_size(&header)?;
        let end = offset.saturating_add(data_len);
        if end > bytes.len() {
            return Err(SpectralError::Ingestion(format!(
                "FITS: data segment truncated ({data_len} bytes expected)"
            )));
        }
        hdus.push(Hdu {
            header,
            data: &bytes[offset..end],
        });
        offset = end.div_ceil(BLOCK) * BLOCK;
    }
    Ok(hdus)
}

fn read_header(bytes: &[u8]) -> Result<(FitsHeader, usize)> {
    let mut header = FitsHeader::default();
    let mut pos = 0;
    loop {
        if pos + CARD > bytes.len() {
            return Err(SpectralError::Ingestion("FITS: header missing END card".into()));
        }
        let card = &bytes[pos..pos + CARD];
        pos += CARD;
        let key = String::from_utf8_lossy(&card[..8]).trim().to_uppercase();
        if key == "END" {
            break;
        }
        if &card[8..10] != b"= " {
            continue;
        }
        if let Some(value) = parse_value(&String::from_utf8_lossy(&card[10..])) {
            header.keywords.insert(key, value);
        }
    }
    Ok((header, pos.div_ceil(BLOCK) * BLOCK))
}

fn parse_value(raw: &str) -> Option<FitsValue> {
    let raw = raw.trim_start();
    if let Some(rest) = raw.strip_prefix('\'') {
        // Quoted string; '' escapes a quote.
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        return Some(FitsValue::String(out.trim_end().to_string()));
    }
    let token = raw.split('/').next().unwrap_or("").trim();
    match token {
        "" => None,
        "T" => Some(FitsValue::Boolean(true)),
        "F" => Some(FitsValue::Boolean(false)),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                Some(FitsValue::Integer(i))
            } else if let Ok(f) = token.replace(['D', 'd'], "E").parse::<f64>() {
                Some(FitsValue::Float(f))
            } else {
                Some(FitsValue::String(token.to_string()))
            }
        }
    }
}

fn data_size(header: &FitsHeader) -> Result<usize> {
    let overflow = || SpectralError::Ingestion("FITS: data size overflows".into());
    let bitpix = header.require_int("BITPIX")?;
    let naxis = header.require_size("NAXIS")?;
    if naxis == 0 {
        return Ok(0);
    }
    let mut elements: usize = 1;
    for i in 1..=naxis {
        elements = elements
            .checked_mul(header.require_size(&format!("NAXIS{i}"))?)
            .ok_or_else(overflow)?;
    }
    let non_negative = |key: &str, default: i64| {
        let value = header.get_int(key).unwrap_or(default);
        usize::try_from(value)
            .map_err(|_| SpectralError::Ingestion(format!("FITS: {key} = {value} is negative")))
    };
    let pcount = non_negative("PCOUNT", 0)?;
    let gcount = non_negative("GCOUNT", 1)?;
    let width = (bitpix.unsigned_abs() / 8) as usize;
    pcount
        .checked_add(elements)
        .and_then(|n| n.checked_mul(gcount))
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(overflow)
}

// ---------------------------------------------------------------------------
// Data decoding
// ---------------------------------------------------------------------------

/// Decode a 1-D primary image, applying `BSCALE` / `BZERO`.
pub fn read_image_1d(hdu: &Hdu<'_>) -> Result<Vec<Option<f64>>> {
    let bitpix = hdu.header.require_int("BITPIX")?;
    let n = hdu.header.require_size("NAXIS1")?;
    let bscale = hdu.header.get_float("BSCALE").unwrap_or(1.0);
    let bzero = hdu.header.get_float("BZERO").unwrap_or(0.0);
    let code = match bitpix {
        8 => 'B',
        16 => 'I',
        32 => 'J',
        64 => 'K',
        -32 => 'E',
        -64 => 'D',
        other => {
            return Err(SpectralError::Ingestion(format!("FITS: unsupported BITPIX {other}")))
        }
    };
    let width = element_width(code).unwrap_or(0);
    (0..n)
        .map(|i| {
            let raw = decode(code, hdu.data.get(i * width..(i + 1) * width))?;
            Ok(raw.map(|v| v * bscale + bzero))
        })
        .collect()
}

/// Decode every numeric column of a `BINTABLE` HDU. Non-numeric columns are
/// skipped.
pub fn read_table_columns(hdu: &Hdu<'_>) -> Result<Vec<TableColumn>> {
    let row_len = hdu.header.require_size("NAXIS1")?;
    let n_rows = hdu.header.require_size("NAXIS2")?;
    let n_fields = hdu.header.require_size("TFIELDS")?;
    if row_len.checked_mul(n_rows).map_or(true, |n| n > hdu.data.len()) {
        return Err(SpectralError::Ingestion(format!(
            "FITS: {n_rows} rows of {row_len} bytes exceed the data segment"
        )));
    }

    let mut columns = Vec::new();
    let mut field_offset = 0;
    for i in 1..=n_fields {
        let tform = hdu
            .header
            .get_string(&format!("TFORM{i}"))
            .ok_or_else(|| SpectralError::Ingestion(format!("FITS: missing TFORM{i}")))?;
        let (repeat, code) = parse_tform(tform)?;
        let width = element_width(code);
        let field_end = width
            .unwrap_or_else(|| fixed_width(code))
            .checked_mul(repeat)
            .and_then(|len| len.checked_add(field_offset))
            .filter(|&end| end <= row_len)
            .ok_or_else(|| {
                SpectralError::Ingestion(format!("FITS: TFORM{i} '{tform}' overruns the {row_len}-byte row"))
            })?;
        if let Some(w) = width {
            let name = hdu
                .header
                .get_string(&format!("TTYPE{i}"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("col{i}"));
            let unit = hdu
                .header
                .get_string(&format!("TUNIT{i}"))
                .map(str::to_string)
                .filter(|u| !u.is_empty());
            let mut values = Vec::with_capacity(n_rows * repeat);
            for row in 0..n_rows {
                for r in 0..repeat {
                    let start = row * row_len + field_offset + r * w;
                    values.push(decode(code, hdu.data.get(start..start + w))?);
                }
            }
            columns.push(TableColumn { name, unit, values });
        }
        field_offset = field_end;
    }
    Ok(columns)
}

fn parse_tform(tform: &str) -> Result<(usize, char)> {
    let tform = tform.trim();
    let digits: String = tform.chars().take_while(|c| c.is_ascii_digit()).collect();
    let code = tform[digits.len()..]
        .chars()
        .next()
        .ok_or_else(|| SpectralError::Ingestion(format!("FITS: bad TFORM '{tform}'")))?;
    let repeat = if digits.is_empty() {
        1
    } else {
        digits
            .parse()
            .map_err(|_| SpectralError::Ingestion(format!("FITS: bad TFORM '{tform}'")))?
    };
    Ok((repeat, code))
}

/// Byte width of numeric type codes.
fn element_width(code: char) -> Option<usize> {
    match code {
        'B' => Some(1),
        'I' => Some(2),
        'J' | 'E' => Some(4),
        'K' | 'D' => Some(8),
        _ => None,
    }
}

/// Byte width of the non-numeric codes we skip over.
fn fixed_width(code: char) -> usize {
    match code {
        'L' | 'A' | 'X' => 1,
        'C' => 8,
        'M' => 16,
        'P' => 8,
        'Q' => 16,
        _ => 0,
    }
}

fn decode(code: char, bytes: Option<&[u8]>) -> Result<Option<f64>> {
    let bytes = bytes.ok_or_else(|| SpectralError::Ingestion("FITS: data segment too short".into()))?;
    let value = match code {
        'B' => bytes[0] as f64,
        'I' => i16::from_be_bytes([bytes[0], bytes[1]]) as f64,
        'J' => i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        'K' => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            i64::from_be_bytes(b) as f64
        }
        'E' => f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        'D' => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            f64::from_be_bytes(b)
        }
        other => {
            return Err(SpectralError::Ingestion(format!("FITS: unsupported type code {other}")))
        }
    };
    Ok(value.is_finite().then_some(value))
}

// ---------------------------------------------------------------------------
// Writer used by tests and the sample generator
// ---------------------------------------------------------------------------

/// Build a FITS byte stream from header cards (keyword, rendered value) and
/// raw big-endian data segments, one pair per HDU.
pub fn write_fits(hdus: &[(Vec<(String, String)>, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (cards, data) in hdus {
        let start = out.len();
        for (key, value) in cards {
            let card = format!("{key:<8}= {value:>20}");
            out.extend_from_slice(format!("{card:<80}").as_bytes());
        }
        out.extend_from_slice(format!("{:<80}", "END").as_bytes());
        pad_to_block(&mut out, start, b' ');
        let data_start = out.len();
        out.extend_from_slice(data);
        if !data.is_empty() {
            pad_to_block(&mut out, data_start, 0);
        }
    }
    out
}

fn pad_to_block(out: &mut Vec<u8>, start: usize, fill: u8) {
    let len = out.len() - start;
    let padded = len.div_ceil(BLOCK) * BLOCK;
    out.resize(start + padded, fill);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn parses_header_values() {
        assert_eq!(parse_value(" 'WASP-39 '   / target"), Some(FitsValue::String("WASP-39".into())));
        assert_eq!(parse_value("  'O''Hara'"), Some(FitsValue::String("O'Hara".into())));
        assert_eq!(parse_value("                   T"), Some(FitsValue::Boolean(true)));
        assert_eq!(parse_value("  42 / answer"), Some(FitsValue::Integer(42)));
        assert_eq!(parse_value("  1.5D2"), Some(FitsValue::Float(150.0)));
    }

    #[test]
    fn reads_binary_table_columns() {
        let mut data = Vec::new();
        for (w, f) in [(1.0f64, 2.0f32), (1.5, f32::NAN)] {
            data.extend_from_slice(&w.to_be_bytes());
            data.extend_from_slice(&f.to_be_bytes());
        }
        let bytes = write_fits(&[
            (
                vec![
                    card("SIMPLE", "T"),
                    card("BITPIX", "8"),
                    card("NAXIS", "0"),
                    card("OBJECT", "'WASP-39'"),
                ],
                Vec::new(),
            ),
            (
                vec![
                    card("XTENSION", "'BINTABLE'"),
                    card("BITPIX", "8"),
                    card("NAXIS", "2"),
                    card("NAXIS1", "12"),
                    card("NAXIS2", "2"),
                    card("PCOUNT", "0"),
                    card("GCOUNT", "1"),
                    card("TFIELDS", "2"),
                    card("TTYPE1", "'WAVELENGTH'"),
                    card("TFORM1", "'D'"),
                    card("TUNIT1", "'um'"),
                    card("TTYPE2", "'FLUX'"),
                    card("TFORM2", "'E'"),
                    card("TUNIT2", "'Jy'"),
                ],
                data,
            ),
        ]);
        let hdus = read_hdus(&bytes).unwrap();
        assert_eq!(hdus.len(), 2);
        assert_eq!(hdus[0].header.get_string("OBJECT"), Some("WASP-39"));
        let cols = read_table_columns(&hdus[1]).unwrap();
        assert_eq!(cols[0].name, "WAVELENGTH");
        assert_eq!(cols[0].unit.as_deref(), Some("um"));
        assert_eq!(cols[0].values, vec![Some(1.0), Some(1.5)]);
        assert_eq!(cols[1].values, vec![Some(2.0), None]);
    }

    fn table(naxis1: &str, forms: &[&str], data: Vec<u8>) -> Vec<u8> {
        let mut cards = vec![
            card("XTENSION", "'BINTABLE'"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", naxis1),
            card("NAXIS2", "2"),
            card("PCOUNT", "0"),
            card("GCOUNT", "1"),
            card("TFIELDS", &forms.len().to_string()),
        ];
        for (i, form) in forms.iter().enumerate() {
            cards.push(card(&format!("TFORM{}", i + 1), &format!("'{form}'")));
        }
        write_fits(&[
            (vec![card("SIMPLE", "T"), card("BITPIX", "8"), card("NAXIS", "0")], Vec::new()),
            (cards, data),
        ])
    }

    #[test]
    fn oversized_repeat_count_is_an_ingestion_error() {
        let bytes = table("16", &["1000000000D"], vec![0; 32]);
        let hdus = read_hdus(&bytes).unwrap();
        assert!(matches!(read_table_columns(&hdus[1]), Err(SpectralError::Ingestion(_))));

        let bytes = table("16", &["D", "2E"], vec![0; 32]);
        let hdus = read_hdus(&bytes).unwrap();
        assert_eq!(read_table_columns(&hdus[1]).unwrap().len(), 2);

        let bytes = table("16", &["D", "3E"], vec![0; 32]);
        let hdus = read_hdus(&bytes).unwrap();
        assert!(read_table_columns(&hdus[1]).is_err());
    }

    #[test]
    fn overflowing_or_negative_axes_are_rejected() {
        let header = |naxis1: &str, naxis2: &str| {
            write_fits(&[(
                vec![
                    card("SIMPLE", "T"),
                    card("BITPIX", "-64"),
                    card("NAXIS", "2"),
                    card("NAXIS1", naxis1),
                    card("NAXIS2", naxis2),
                ],
                Vec::new(),
            )])
        };
        for (a, b) in [("4294967296", "4294967296"), ("-3", "2"), ("9223372036854775807", "1")] {
            assert!(matches!(read_hdus(&header(a, b)), Err(SpectralError::Ingestion(_))));
        }
    }

    #[test]
    fn rejects_non_fits_bytes() {
        assert!(read_hdus(b"wavelength,flux\n1,2\n").is_err());
    }
}
