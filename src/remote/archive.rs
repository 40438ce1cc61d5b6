use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::data::loader::{self, InputFormat, ParseOptions};
use crate::data::model::{MetadataValue, Spectrum};
use crate::error::{Result, SpectralError};
use crate::remote::mast::MastArchive;
use crate::remote::retry::{CallContext, RetryPolicy, ServiceError};
use crate::remote::worker;

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// One archived observation product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub program_id: String,
    pub target_name: String,
    pub instrument: String,
    pub collection: String,
    pub calibration_level: Option<i64>,
    pub observation_id: String,
    /// ISO-8601 date, when the archive reports one.
    pub observation_date: Option<String>,
    /// Enough to retrieve the product through [`ArchiveService::fetch_product`].
    pub product_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

/// Remote archive operations. Implementations classify their failures as
/// transient or fatal; retrying is the client's job.
pub trait ArchiveService: Send + Sync {
    /// Rows matching the given program id and/or target name exactly.
    fn query_exact(
        &self,
        program_id: Option<&str>,
        target_name: Option<&str>,
    ) -> std::result::Result<Vec<DiscoveryResult>, ServiceError>;

    /// `Ok(None)` when the name resolver does not know the target.
    fn resolve_target(&self, target_name: &str) -> std::result::Result<Option<SkyPosition>, ServiceError>;

    fn query_cone(
        &self,
        center: SkyPosition,
        radius_deg: f64,
        program_id: Option<&str>,
    ) -> std::result::Result<Vec<DiscoveryResult>, ServiceError>;

    fn fetch_product(&self, product_uri: &str) -> std::result::Result<Vec<u8>, ServiceError>;
}

// ---------------------------------------------------------------------------
// Discovery client
// ---------------------------------------------------------------------------

/// Outcome of one discovery call.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub results: Vec<DiscoveryResult>,
    pub warnings: Vec<String>,
    /// True when the rows (or the absence of rows) came from the cone search.
    pub relaxed: bool,
    /// Remote attempts spent, retries included.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Exact,
    Cone,
}

/// Holds no per-call state; every invocation builds its own [`CallContext`].
#[derive(Clone)]
pub struct DiscoveryClient {
    service: Arc<dyn ArchiveService>,
    policy: RetryPolicy,
    cone_radius_arcsec: f64,
    call_timeout: Option<Duration>,
    download_dir: Option<PathBuf>,
}

impl DiscoveryClient {
    pub fn new(service: Arc<dyn ArchiveService>, policy: RetryPolicy) -> Self {
        Self {
            service,
            policy,
            cone_radius_arcsec: 30.0,
            call_timeout: None,
            download_dir: None,
        }
    }

    /// A client backed by the MAST API.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let service = MastArchive::new(&settings.archive)?;
        Ok(Self::new(Arc::new(service), settings.retry_policy())
            .with_cone_radius_arcsec(settings.archive.cone_radius_arcsec)
            .with_call_timeout(Duration::from_secs(settings.archive.call_timeout_secs))
            .with_download_dir(settings.download_dir.clone()))
    }

    pub fn with_cone_radius_arcsec(mut self, radius: f64) -> Self {
        self.cone_radius_arcsec = radius;
        self
    }

    /// Keep a copy of every fetched product under `dir`.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Deadline applied inside each call, across retries.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Exact query, then at most one cone-search relaxation around the
    /// resolved target position.
    pub fn discover(&self, program_id: Option<&str>, target_name: Option<&str>) -> Result<Discovery> {
        let program_id = non_blank(program_id);
        let target_name = non_blank(target_name);
        if program_id.is_none() && target_name.is_none() {
            return Err(SpectralError::InvalidQuery(
                "provide a program id, a target name, or both".into(),
            ));
        }

        let mut ctx = CallContext::new(self.policy, self.call_timeout);
        let mut stage = Stage::Exact;
        let mut results = ctx
            .call("exact query", || self.service.query_exact(program_id, target_name))
            .map_err(unavailable)?;

        if results.is_empty() {
            match target_name {
                Some(target) => {
                    stage = Stage::Cone;
                    results = self.relax(&mut ctx, target, program_id)?;
                }
                None => ctx.warn(format!(
                    "No observations found for program {}",
                    program_id.unwrap_or_default()
                )),
            }
        }

        // Stable: rows sharing a key keep the service's order.
        results.sort_by(|a, b| {
            (&a.program_id, &a.target_name, &a.observation_date).cmp(&(
                &b.program_id,
                &b.target_name,
                &b.observation_date,
            ))
        });
        log::info!(
            "Discovery returned {} result(s) after {} attempt(s){}",
            results.len(),
            ctx.attempts(),
            if stage == Stage::Cone { " (relaxed)" } else { "" }
        );
        let attempts = ctx.attempts();
        Ok(Discovery {
            results,
            warnings: ctx.into_warnings(),
            relaxed: stage == Stage::Cone,
            attempts,
        })
    }

    /// The single cone-search stage.
    fn relax(&self, ctx: &mut CallContext, target: &str, program_id: Option<&str>) -> Result<Vec<DiscoveryResult>> {
        let position = ctx
            .call("name resolution", || self.service.resolve_target(target))
            .map_err(unavailable)?;
        let Some(position) = position else {
            ctx.warn(format!(
                "Target '{target}' matched no observations and its coordinates could not be resolved"
            ));
            return Ok(Vec::new());
        };

        ctx.warn(format!(
            "Target '{target}' matched no observations by name; broadened to a {}\" cone around RA {:.5}, Dec {:.5}",
            self.cone_radius_arcsec, position.ra_deg, position.dec_deg
        ));
        let radius_deg = self.cone_radius_arcsec / 3600.0;
        let rows = ctx
            .call("cone query", || self.service.query_cone(position, radius_deg, program_id))
            .map_err(unavailable)?;
        if rows.is_empty() {
            ctx.warn(format!("The relaxed cone search around '{target}' also returned no observations"));
        }
        Ok(rows)
    }

    /// [`discover`](Self::discover) on a worker thread, giving up after
    /// `timeout`.
    pub fn discover_with_timeout(
        &self,
        program_id: Option<String>,
        target_name: Option<String>,
        timeout: Duration,
    ) -> Result<Discovery> {
        let client = self.clone();
        worker::run_with_timeout("discovery", timeout, move || {
            client.discover(program_id.as_deref(), target_name.as_deref())
        })
        .unwrap_or_else(|| {
            Err(SpectralError::DiscoveryUnavailable(format!(
                "no answer within {timeout:?}"
            )))
        })
    }

    /// Download a product and ingest it. The archive row fills in the
    /// metadata the file itself may lack.
    pub fn fetch_spectrum(&self, result: &DiscoveryResult) -> Result<Spectrum> {
        let format = InputFormat::for_name(&result.product_uri)?;
        let mut ctx = CallContext::new(self.policy, self.call_timeout);
        let bytes = ctx
            .call("product download", || self.service.fetch_product(&result.product_uri))
            .map_err(unavailable)?;
        log::info!("Downloaded {} ({} bytes)", result.product_uri, bytes.len());
        let saved = match &self.download_dir {
            Some(dir) => Some(save_product(dir, result, &bytes)?),
            None => None,
        };

        let options = ParseOptions {
            identifier: Some(result.observation_id.clone()),
            source: Some(result.product_uri.clone()),
            ..Default::default()
        };
        let spectrum = loader::parse(&bytes, format, &options)?;

        let mut metadata = spectrum.metadata().clone();
        metadata.target.get_or_insert_with(|| result.target_name.clone());
        metadata.instrument.get_or_insert_with(|| result.instrument.clone());
        if metadata.observation_date.is_none() {
            metadata.observation_date = result.observation_date.clone();
        }
        let extra = &mut metadata.extra;
        extra.insert("program_id".into(), MetadataValue::String(result.program_id.clone()));
        extra.insert("collection".into(), MetadataValue::String(result.collection.clone()));
        if let Some(level) = result.calibration_level {
            extra.insert("calibration_level".into(), MetadataValue::Integer(level));
        }
        if let Some(path) = saved {
            extra.insert("local_path".into(), MetadataValue::String(path.display().to_string()));
        }
        Ok(spectrum.relabeled(spectrum.id().to_string(), metadata))
    }
}

/// Written under the last segment of the product URI.
fn save_product(dir: &Path, result: &DiscoveryResult, bytes: &[u8]) -> Result<PathBuf> {
    let name = result
        .product_uri
        .rsplit(['/', ':'])
        .next()
        .filter(|n| !n.is_empty() && *n != "..")
        .unwrap_or(&result.observation_id);
    std::fs::create_dir_all(dir)
        .map_err(|e| SpectralError::Io(format!("creating {}: {e}", dir.display())))?;
    let path = dir.join(name);
    std::fs::write(&path, bytes).map_err(|e| SpectralError::Io(format!("writing {}: {e}", path.display())))?;
    log::debug!("Saved product to {}", path.display());
    Ok(path)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn unavailable(e: ServiceError) -> SpectralError {
    SpectralError::DiscoveryUnavailable(e.to_string())
}
