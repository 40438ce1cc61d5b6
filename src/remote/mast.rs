use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::ArchiveSettings;
use crate::error::{Result, SpectralError};
use crate::remote::archive::{ArchiveService, DiscoveryResult, SkyPosition};
use crate::remote::retry::ServiceError;

/// [`ArchiveService`] over the MAST portal JSON API.
pub struct MastArchive {
    client: Client,
    invoke_url: String,
    download_url: String,
    collection: String,
    page_size: usize,
}

impl MastArchive {
    pub fn new(settings: &ArchiveSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(concat!("rusty-spectra/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SpectralError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            invoke_url: settings.invoke_url.clone(),
            download_url: settings.download_url.clone(),
            collection: settings.collection.clone(),
            page_size: settings.page_size,
        })
    }

    fn invoke(&self, request: Value) -> std::result::Result<Value, ServiceError> {
        let service = request["service"].as_str().unwrap_or("?").to_string();
        log::debug!("MAST {service} request");
        let response = self
            .client
            .post(&self.invoke_url)
            .form(&[("request", request.to_string())])
            .send()
            .map_err(transport)?;
        check_status(response)?
            .json::<Value>()
            .map_err(|e| ServiceError::Fatal(format!("{service}: unreadable response: {e}")))
    }

    fn filters(&self, program_id: Option<&str>, target_name: Option<&str>) -> Vec<Value> {
        let mut filters = vec![
            json!({ "paramName": "obs_collection", "values": [self.collection] }),
            json!({ "paramName": "dataproduct_type", "values": ["spectrum"] }),
        ];
        if let Some(pid) = program_id {
            filters.push(json!({ "paramName": "proposal_id", "values": [pid] }));
        }
        if let Some(target) = target_name {
            filters.push(json!({ "paramName": "target_name", "values": [target] }));
        }
        filters
    }
}

impl ArchiveService for MastArchive {
    fn query_exact(
        &self,
        program_id: Option<&str>,
        target_name: Option<&str>,
    ) -> std::result::Result<Vec<DiscoveryResult>, ServiceError> {
        let request = json!({
            "service": "Mast.Caom.Filtered",
            "format": "json",
            "pagesize": self.page_size,
            "page": 1,
            "params": { "columns": "*", "filters": self.filters(program_id, target_name) },
        });
        let body = self.invoke(request)?;
        Ok(parse_observations(&body))
    }

    fn resolve_target(&self, target_name: &str) -> std::result::Result<Option<SkyPosition>, ServiceError> {
        let request = json!({
            "service": "Mast.Name.Lookup",
            "format": "json",
            "params": { "input": target_name, "format": "json" },
        });
        let body = self.invoke(request)?;
        Ok(parse_resolved(&body))
    }

    fn query_cone(
        &self,
        center: SkyPosition,
        radius_deg: f64,
        program_id: Option<&str>,
    ) -> std::result::Result<Vec<DiscoveryResult>, ServiceError> {
        let request = json!({
            "service": "Mast.Caom.Cone",
            "format": "json",
            "pagesize": self.page_size,
            "page": 1,
            "params": { "ra": center.ra_deg, "dec": center.dec_deg, "radius": radius_deg },
        });
        let body = self.invoke(request)?;
        // The cone service takes no column filters; apply them here.
        let rows = body["data"].as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| text(row, "obs_collection").as_deref() == Some(self.collection.as_str()))
            .filter(|row| text(row, "dataproduct_type").as_deref() == Some("spectrum"))
            .filter(|row| program_id.map_or(true, |pid| text(row, "proposal_id").as_deref() == Some(pid)))
            .filter_map(observation_from_row)
            .collect())
    }

    fn fetch_product(&self, product_uri: &str) -> std::result::Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .get(&self.download_url)
            .query(&[("uri", product_uri)])
            .send()
            .map_err(transport)?;
        let bytes = check_status(response)?.bytes().map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

fn transport(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        ServiceError::Transient(e.to_string())
    } else {
        ServiceError::Fatal(e.to_string())
    }
}

fn check_status(response: Response) -> std::result::Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ServiceError::Transient(format!("HTTP {status}")))
    } else {
        Err(ServiceError::Fatal(format!("HTTP {status}")))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn parse_observations(body: &Value) -> Vec<DiscoveryResult> {
    body["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(observation_from_row).collect())
        .unwrap_or_default()
}

/// Rows without a product URL cannot be fetched and are skipped.
fn observation_from_row(row: &Value) -> Option<DiscoveryResult> {
    let product_uri = text(row, "dataURL").or_else(|| text(row, "dataURI"))?;
    Some(DiscoveryResult {
        program_id: text(row, "proposal_id").unwrap_or_default(),
        target_name: text(row, "target_name").unwrap_or_default(),
        instrument: text(row, "instrument_name").unwrap_or_default(),
        collection: text(row, "obs_collection").unwrap_or_default(),
        calibration_level: row["calib_level"].as_i64(),
        observation_id: text(row, "obs_id").unwrap_or_default(),
        observation_date: row["t_min"].as_f64().map(mjd_to_date),
        product_uri,
    })
}

fn parse_resolved(body: &Value) -> Option<SkyPosition> {
    let coord = body["resolvedCoordinate"].as_array()?.first()?;
    Some(SkyPosition {
        ra_deg: coord["ra"].as_f64()?,
        dec_deg: coord["decl"].as_f64()?,
    })
}

/// Cell as text; numbers are printed, blanks and nulls are absent.
fn text(row: &Value, key: &str) -> Option<String> {
    match &row[key] {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Modified Julian Date to a `YYYY-MM-DD` civil date.
fn mjd_to_date(mjd: f64) -> String {
    // Days since 1970-01-01, then the proleptic Gregorian civil-from-days
    // conversion.
    let z = mjd.floor() as i64 - 40_587 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!("{year:04}-{month:02}-{day:02}")
}
