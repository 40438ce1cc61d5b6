use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{Result, SpectralError};
use crate::remote::nist::NistCatalog;
use crate::remote::retry::{CallContext, RetryPolicy, ServiceError};
use crate::remote::worker;

/// Lines closer than this (same label) are the same line.
pub const DUPLICATE_TOLERANCE_NM: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLine {
    pub element: String,
    pub ion_stage: String,
    /// Vacuum wavelength in nanometres.
    pub wavelength_nm: f64,
    pub intensity: f64,
    pub label: String,
}

/// Window bounds are vacuum nanometres, inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct LineQuery {
    pub species: String,
    pub ion_stage: Option<String>,
    pub wavelength_min: f64,
    pub wavelength_max: f64,
    pub min_intensity: Option<f64>,
}

impl LineQuery {
    pub fn new(species: impl Into<String>, wavelength_min: f64, wavelength_max: f64) -> Self {
        Self {
            species: species.into(),
            ion_stage: None,
            wavelength_min,
            wavelength_max,
            min_intensity: None,
        }
    }

    pub fn ion(mut self, stage: impl Into<String>) -> Self {
        self.ion_stage = Some(stage.into());
        self
    }

    pub fn min_intensity(mut self, threshold: f64) -> Self {
        self.min_intensity = Some(threshold);
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.wavelength_min.is_finite() || !self.wavelength_max.is_finite() {
            return Err(SpectralError::InvalidQuery("line window bounds must be finite".into()));
        }
        if self.wavelength_min > self.wavelength_max {
            return Err(SpectralError::InvalidQuery(format!(
                "line window [{}, {}] is inverted",
                self.wavelength_min, self.wavelength_max
            )));
        }
        Ok(())
    }

    fn matches(&self, line: &ReferenceLine) -> bool {
        line.element == self.species
            && self.ion_stage.as_ref().map_or(true, |ion| &line.ion_stage == ion)
            && line.wavelength_nm >= self.wavelength_min
            && line.wavelength_nm <= self.wavelength_max
            && self.min_intensity.map_or(true, |min| line.intensity >= min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineLookup {
    pub lines: Vec<ReferenceLine>,
    pub source: LineSource,
    pub warnings: Vec<String>,
}

/// A remote line database. The provider filters whatever comes back, so an
/// implementation may return a superset of the query.
pub trait LineCatalog: Send + Sync {
    fn query(&self, query: &LineQuery) -> std::result::Result<Vec<ReferenceLine>, ServiceError>;
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LineProvider {
    catalog: Option<Arc<dyn LineCatalog>>,
    policy: RetryPolicy,
    call_timeout: Option<Duration>,
}

impl LineProvider {
    pub fn new(catalog: Arc<dyn LineCatalog>, policy: RetryPolicy) -> Self {
        Self {
            catalog: Some(catalog),
            policy,
            call_timeout: None,
        }
    }

    /// Bundled table only.
    pub fn offline() -> Self {
        Self {
            catalog: None,
            policy: RetryPolicy::immediate(1),
            call_timeout: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.lines.offline {
            return Ok(Self::offline());
        }
        let catalog = NistCatalog::new(&settings.lines)?;
        Ok(Self::new(Arc::new(catalog), settings.retry_policy())
            .with_call_timeout(Duration::from_secs(settings.lines.call_timeout_secs)))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Lines for `query`, from the remote catalog when it answers and from
    /// the bundled table otherwise. Fails only for an invalid window.
    pub fn lookup(&self, query: &LineQuery) -> Result<LineLookup> {
        query.validate()?;
        let Some(catalog) = &self.catalog else {
            return Ok(fallback(query, "Remote line catalog disabled; using bundled table".into()));
        };

        let mut ctx = CallContext::new(self.policy, self.call_timeout);
        match ctx.call("line catalog query", || catalog.query(query)) {
            Ok(rows) => {
                let lines = finalize(rows, query);
                if lines.is_empty() {
                    let mut lookup = fallback(query, format!(
                        "Remote catalog returned no {} lines in [{}, {}] nm; using bundled table",
                        species_label(query), query.wavelength_min, query.wavelength_max
                    ));
                    let mut warnings = ctx.into_warnings();
                    warnings.append(&mut lookup.warnings);
                    lookup.warnings = warnings;
                    return Ok(lookup);
                }
                log::info!("Remote catalog returned {} {} lines", lines.len(), species_label(query));
                Ok(LineLookup {
                    lines,
                    source: LineSource::Remote,
                    warnings: ctx.into_warnings(),
                })
            }
            Err(e) => Ok(fallback(query, format!("Remote line catalog unavailable ({e}); using bundled table"))),
        }
    }

    /// [`lookup`](Self::lookup) on a worker thread; the bundled table answers
    /// if the worker misses `timeout`.
    pub fn lookup_with_timeout(&self, query: LineQuery, timeout: Duration) -> Result<LineLookup> {
        query.validate()?;
        let provider = self.clone();
        let job_query = query.clone();
        worker::run_with_timeout("line-lookup", timeout, move || provider.lookup(&job_query))
            .unwrap_or_else(|| {
                Ok(fallback(
                    &query,
                    format!("Remote line catalog did not answer within {timeout:?}; using bundled table"),
                ))
            })
    }
}

fn species_label(query: &LineQuery) -> String {
    match &query.ion_stage {
        Some(ion) => format!("{} {ion}", query.species),
        None => query.species.clone(),
    }
}

fn fallback(query: &LineQuery, warning: String) -> LineLookup {
    log::warn!("{warning}");
    let rows = BUNDLED_LINES
        .iter()
        .map(|&(element, ion_stage, wavelength_nm, intensity, label)| ReferenceLine {
            element: element.to_string(),
            ion_stage: ion_stage.to_string(),
            wavelength_nm,
            intensity,
            label: label.to_string(),
        })
        .collect();
    LineLookup {
        lines: finalize(rows, query),
        source: LineSource::Fallback,
        warnings: vec![warning],
    }
}

/// Filter, order by wavelength, and collapse near-duplicates keeping the
/// most intense.
fn finalize(rows: Vec<ReferenceLine>, query: &LineQuery) -> Vec<ReferenceLine> {
    let mut rows: Vec<ReferenceLine> = rows.into_iter().filter(|l| query.matches(l)).collect();
    rows.sort_by(|a, b| {
        a.wavelength_nm
            .total_cmp(&b.wavelength_nm)
            .then_with(|| a.label.cmp(&b.label))
    });

    let mut kept: Vec<ReferenceLine> = Vec::with_capacity(rows.len());
    'rows: for line in rows {
        for existing in kept.iter_mut().rev() {
            if line.wavelength_nm - existing.wavelength_nm > DUPLICATE_TOLERANCE_NM {
                break;
            }
            if existing.label == line.label {
                if line.intensity > existing.intensity {
                    *existing = line;
                }
                continue 'rows;
            }
        }
        kept.push(line);
    }
    // A replacement may sit later than a neighbour with another label.
    kept.sort_by(|a, b| {
        a.wavelength_nm
            .total_cmp(&b.wavelength_nm)
            .then_with(|| a.label.cmp(&b.label))
    });
    kept
}

// ---------------------------------------------------------------------------
// Bundled table – vacuum wavelengths (nm)
// ---------------------------------------------------------------------------

/// (element, ion stage, wavelength, relative intensity, label)
const BUNDLED_LINES: &[(&str, &str, f64, f64, &str)] = &[
    ("H", "I", 410.2892, 150.0, "H\u{3b4}"),
    ("H", "I", 434.1692, 300.0, "H\u{3b3}"),
    ("H", "I", 486.2721, 500.0, "H\u{3b2}"),
    ("H", "I", 656.4614, 1000.0, "H\u{3b1}"),
    ("Ca", "II", 393.4777, 800.0, "Ca II K"),
    ("Ca", "II", 396.9591, 750.0, "Ca II H"),
    ("He", "I", 587.7250, 500.0, "He I 5877"),
    ("Na", "I", 589.1583, 900.0, "Na I D2"),
    ("Na", "I", 589.7558, 850.0, "Na I D1"),
    ("Mg", "I", 516.8761, 300.0, "Mg I b4"),
    ("Mg", "I", 517.4125, 450.0, "Mg I b2"),
    ("Mg", "I", 518.5048, 600.0, "Mg I b1"),
    ("O", "III", 496.0295, 330.0, "[O III] 4959"),
    ("O", "III", 500.8240, 1000.0, "[O III] 5007"),
    ("Fe", "I", 500.7520, 200.0, "Fe I 5006"),
    ("Fe", "I", 501.3470, 150.0, "Fe I 5012"),
    ("Fe", "II", 492.5290, 400.0, "Fe II 4924"),
    ("Fe", "II", 501.9840, 500.0, "Fe II 5018"),
    ("Fe", "II", 517.0470, 600.0, "Fe II 5169"),
    ("Fe", "II", 531.8090, 200.0, "Fe II 5316"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn line(element: &str, ion: &str, nm: f64, intensity: f64, label: &str) -> ReferenceLine {
        ReferenceLine {
            element: element.into(),
            ion_stage: ion.into(),
            wavelength_nm: nm,
            intensity,
            label: label.into(),
        }
    }

    struct ScriptedCatalog {
        answers: Mutex<Vec<std::result::Result<Vec<ReferenceLine>, ServiceError>>>,
    }

    impl ScriptedCatalog {
        fn provider(answers: Vec<std::result::Result<Vec<ReferenceLine>, ServiceError>>) -> LineProvider {
            let catalog = ScriptedCatalog { answers: Mutex::new(answers) };
            LineProvider::new(Arc::new(catalog), RetryPolicy::immediate(2))
        }
    }

    impl LineCatalog for ScriptedCatalog {
        fn query(&self, _query: &LineQuery) -> std::result::Result<Vec<ReferenceLine>, ServiceError> {
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() { Ok(Vec::new()) } else { answers.remove(0) }
        }
    }

    #[test]
    fn unreachable_catalog_falls_back_for_fe_ii() {
        let provider = ScriptedCatalog::provider(vec![
            Err(ServiceError::Transient("connection refused".into())),
            Err(ServiceError::Transient("connection refused".into())),
        ]);
        let query = LineQuery::new("Fe", 500.0, 510.0).ion("II");
        let lookup = provider.lookup(&query).unwrap();
        assert_eq!(lookup.source, LineSource::Fallback);
        assert_eq!(lookup.warnings.len(), 1);
        assert_eq!(lookup.lines.len(), 1);
        assert_eq!(lookup.lines[0].label, "Fe II 5018");
        assert!(lookup.lines.iter().all(|l| (500.0..=510.0).contains(&l.wavelength_nm)));
    }

    #[test]
    fn empty_remote_answer_falls_back() {
        let provider = ScriptedCatalog::provider(vec![Ok(Vec::new())]);
        let lookup = provider.lookup(&LineQuery::new("H", 400.0, 700.0).ion("I")).unwrap();
        assert_eq!(lookup.source, LineSource::Fallback);
        assert_eq!(lookup.lines.len(), 4);
        assert!(!lookup.warnings.is_empty());
    }

    #[test]
    fn remote_rows_are_filtered_sorted_and_deduplicated() {
        let provider = ScriptedCatalog::provider(vec![Ok(vec![
            line("Fe", "II", 508.0, 10.0, "Fe II 5080"),
            line("Fe", "II", 501.98400, 40.0, "Fe II 5018"),
            line("Fe", "II", 501.98405, 90.0, "Fe II 5018"),
            line("Fe", "I", 505.0, 100.0, "Fe I 5050"),
            line("Fe", "II", 520.0, 100.0, "Fe II 5200"),
            line("Fe", "II", 503.0, 1.0, "Fe II 5030"),
        ])]);
        let query = LineQuery::new("Fe", 500.0, 510.0).ion("II").min_intensity(5.0);
        let lookup = provider.lookup(&query).unwrap();
        assert_eq!(lookup.source, LineSource::Remote);
        let labels: Vec<_> = lookup.lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["Fe II 5018", "Fe II 5080"]);
        assert_eq!(lookup.lines[0].intensity, 90.0);
    }

    #[test]
    fn replaced_duplicate_keeps_ascending_order() {
        let rows = vec![
            line("Fe", "II", 500.00000, 1.0, "X"),
            line("Fe", "II", 500.00003, 5.0, "Y"),
            line("Fe", "II", 500.00005, 9.0, "X"),
        ];
        let kept = finalize(rows, &LineQuery::new("Fe", 499.0, 501.0));
        let nm: Vec<f64> = kept.iter().map(|l| l.wavelength_nm).collect();
        assert_eq!(nm, vec![500.00003, 500.00005]);
        assert_eq!(kept[1].label, "X");
        assert_eq!(kept[1].intensity, 9.0);
    }

    #[test]
    fn window_is_inclusive_and_intensity_threshold_is_strict_below() {
        let query = LineQuery::new("Na", 589.1583, 589.7558).min_intensity(850.0);
        let lookup = LineProvider::offline().lookup(&query).unwrap();
        assert_eq!(lookup.lines.len(), 2);
        let query = query.min_intensity(850.1);
        assert_eq!(LineProvider::offline().lookup(&query).unwrap().lines.len(), 1);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let provider = LineProvider::offline();
        assert!(matches!(
            provider.lookup(&LineQuery::new("Fe", 510.0, 500.0)),
            Err(SpectralError::InvalidQuery(_))
        ));
        assert!(matches!(
            provider.lookup_with_timeout(LineQuery::new("Fe", 510.0, 500.0), Duration::from_secs(1)),
            Err(SpectralError::InvalidQuery(_))
        ));
    }

    struct StalledCatalog;

    impl LineCatalog for StalledCatalog {
        fn query(&self, _query: &LineQuery) -> std::result::Result<Vec<ReferenceLine>, ServiceError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
    }

    #[test]
    fn timeout_answers_from_bundled_table() {
        let provider = LineProvider::new(Arc::new(StalledCatalog), RetryPolicy::immediate(1));
        let lookup = provider
            .lookup_with_timeout(LineQuery::new("Ca", 390.0, 400.0).ion("II"), Duration::from_millis(20))
            .unwrap();
        assert_eq!(lookup.source, LineSource::Fallback);
        assert_eq!(lookup.lines.len(), 2);
        assert_eq!(lookup.lines[0].label, "Ca II K");
    }

    #[test]
    fn bundled_table_is_vacuum_and_sorted_per_species() {
        let lookup = LineProvider::offline()
            .lookup(&LineQuery::new("Mg", 0.0, 10_000.0).ion("I"))
            .unwrap();
        let nm: Vec<f64> = lookup.lines.iter().map(|l| l.wavelength_nm).collect();
        assert!(nm.windows(2).all(|w| w[0] < w[1]));
        approx::assert_relative_eq!(nm[2], 518.5048);
    }
}
