use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::LineSettings;
use crate::error::{Result, SpectralError};
use crate::remote::lines::{LineCatalog, LineQuery, ReferenceLine};
use crate::remote::retry::ServiceError;

/// [`LineCatalog`] backed by the NIST Atomic Spectra Database line form,
/// asking for CSV output with vacuum wavelengths in nm.
pub struct NistCatalog {
    client: Client,
    url: String,
}

impl NistCatalog {
    pub fn new(settings: &LineSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(concat!("rusty-spectra/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SpectralError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: settings.catalog_url.clone(),
        })
    }
}

impl LineCatalog for NistCatalog {
    fn query(&self, query: &LineQuery) -> std::result::Result<Vec<ReferenceLine>, ServiceError> {
        let spectra = match &query.ion_stage {
            Some(ion) => format!("{} {ion}", query.species),
            None => query.species.clone(),
        };
        let params = [
            ("spectra", spectra),
            ("low_w", query.wavelength_min.to_string()),
            ("upp_w", query.wavelength_max.to_string()),
            ("unit", "1".to_string()),
            ("format", "2".to_string()),
            ("line_out", "0".to_string()),
            ("show_av", "3".to_string()),
            ("show_obs_wl", "1".to_string()),
            ("show_calc_wl", "1".to_string()),
            ("intens_out", "on".to_string()),
            ("order_out", "0".to_string()),
            ("submit", "Retrieve Data".to_string()),
        ];
        let response = self.client.get(&self.url).query(&params).send().map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                ServiceError::Transient(e.to_string())
            } else {
                ServiceError::Fatal(e.to_string())
            }
        })?;
        let status = response.status();
        if status.is_server_error() {
            return Err(ServiceError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ServiceError::Fatal(format!("HTTP {status}")));
        }
        let body = response
            .text()
            .map_err(|e| ServiceError::Transient(e.to_string()))?;
        let lines = parse_csv(&body, query);
        log::debug!("NIST returned {} rows for {spectra_label}", lines.len(), spectra_label = params[0].1);
        Ok(lines)
    }
}

/// Parse the ASD CSV export. An HTML error page has no recognisable header
/// and yields no rows.
fn parse_csv(body: &str, query: &LineQuery) -> Vec<ReferenceLine> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let Ok(headers) = reader.headers().map(|h| h.iter().map(clean).collect::<Vec<_>>()) else {
        return Vec::new();
    };
    let find = |prefix: &str| headers.iter().position(|h| h.starts_with(prefix));
    let observed = find("obs_wl");
    let ritz = find("ritz_wl");
    if observed.is_none() && ritz.is_none() {
        return Vec::new();
    }
    let element_col = find("element");
    let ion_col = find("sp_num");
    let intensity_col = find("intens");

    let mut lines = Vec::new();
    for record in reader.records().flatten() {
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(clean).filter(|s| !s.is_empty());
        let Some(wavelength_nm) = cell(observed)
            .or_else(|| cell(ritz))
            .and_then(|s| leading_number(&s))
        else {
            continue;
        };
        let element = cell(element_col).unwrap_or_else(|| query.species.clone());
        let ion_stage = cell(ion_col)
            .and_then(|s| s.parse::<u32>().ok())
            .map(roman)
            .or_else(|| query.ion_stage.clone())
            .unwrap_or_default();
        let intensity = cell(intensity_col).and_then(|s| leading_number(&s)).unwrap_or(0.0);
        let label = format!("{element} {ion_stage} {wavelength_nm:.3}");
        lines.push(ReferenceLine {
            element,
            ion_stage,
            wavelength_nm,
            intensity,
            label,
        });
    }
    lines
}

/// Strip the spreadsheet quoting ASD wraps around cells (`="501.984"`).
fn clean(raw: &str) -> String {
    raw.trim().trim_start_matches('=').trim_matches('"').trim().to_string()
}

/// `"1000bl"` → 1000, `"(40)"` → 40, `"5.2e2"` → 520.
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'));
    let bytes = s.as_bytes();
    let end = (0..bytes.len())
        .find(|&i| {
            let c = bytes[i];
            let signed = c == b'-' || c == b'+';
            let after_exponent = i > 0 && matches!(bytes[i - 1], b'e' | b'E');
            !(c.is_ascii_digit() || c == b'.' || c == b'e' || c == b'E' || (signed && (i == 0 || after_exponent)))
        })
        .unwrap_or(bytes.len());
    // Longest numeric prefix, so a trailing flag letter such as `e` is ignored.
    (1..=end)
        .rev()
        .find_map(|k| s[..k].parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn roman(mut n: u32) -> String {
    const NUMERALS: [(u32, &str); 8] = [
        (90, "XC"), (50, "L"), (40, "XL"), (10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I"),
    ];
    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "element,sp_num,obs_wl_vac(nm),unc_obs_wl,ritz_wl_vac(nm),unc_ritz_wl,intens,Aki(s^-1)\n\
        Fe,2,=\"501.9838\",=\"0.0003\",=\"501.98395\",=\"0.00012\",=\"1000bl\",=\"5.2e+05\"\n\
        Fe,2,,,=\"505.6327\",=\"0.0002\",=\"(40)\",\n\
        Fe,2,,,,,=\"10\",\n";

    #[test]
    fn parses_asd_csv() {
        let query = LineQuery::new("Fe", 500.0, 510.0).ion("II");
        let lines = parse_csv(SAMPLE, &query);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].element, "Fe");
        assert_eq!(lines[0].ion_stage, "II");
        approx::assert_relative_eq!(lines[0].wavelength_nm, 501.9838);
        approx::assert_relative_eq!(lines[0].intensity, 1000.0);
        approx::assert_relative_eq!(lines[1].wavelength_nm, 505.6327);
        approx::assert_relative_eq!(lines[1].intensity, 40.0);
        assert_eq!(lines[1].label, "Fe II 505.633");
    }

    #[test]
    fn html_error_pages_yield_nothing() {
        let query = LineQuery::new("Xx", 1.0, 2.0);
        assert!(parse_csv("<html><body>Unrecognized token.</body></html>", &query).is_empty());
    }

    #[test]
    fn helpers() {
        assert_eq!(leading_number("1000bl"), Some(1000.0));
        assert_eq!(leading_number("(40)"), Some(40.0));
        assert_eq!(leading_number("bl"), None);
        assert_eq!(leading_number("5.2e+05"), Some(5.2e5));
        assert_eq!(leading_number("3E-2"), Some(0.03));
        assert_eq!(leading_number("-1.5"), Some(-1.5));
        assert_eq!(leading_number("7e"), Some(7.0));
        assert_eq!(roman(1), "I");
        assert_eq!(roman(4), "IV");
        assert_eq!(roman(26), "XXVI");
        assert_eq!(clean("=\"501.98\""), "501.98");
    }
}
