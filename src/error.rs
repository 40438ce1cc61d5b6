use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy shared by every pipeline stage
// ---------------------------------------------------------------------------

/// Pipeline-fatal conditions. Partial failures (a bad metadata cell, an
/// unreachable line catalog) never appear here; they travel as warnings on
/// the successful result instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpectralError {
    /// The caller supplied a structurally invalid query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The remote service stayed unreachable after bounded retries.
    #[error("discovery service unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// No valid samples survived parsing, or the input could not be read.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// A conversion was requested outside the closed unit enumeration.
    #[error("unsupported unit conversion: {0}")]
    UnsupportedUnit(String),

    /// Two spectra were combined without first sharing units.
    #[error("unit mismatch: {primary} vs {secondary}")]
    UnitMismatch { primary: String, secondary: String },

    /// Comparison inputs share no wavelength range.
    #[error("no overlap: [{primary_min}, {primary_max}] and [{secondary_min}, {secondary_max}]")]
    NoOverlap {
        primary_min: f64,
        primary_max: f64,
        secondary_min: f64,
        secondary_max: f64,
    },

    /// Ratio denominator within epsilon of zero.
    #[error("ratio denominator {denominator:e} at {wavelength} is within {epsilon:e} of zero")]
    DivisionSingularity {
        wavelength: f64,
        denominator: f64,
        epsilon: f64,
    },

    #[error("i/o error: {0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for SpectralError {
    fn from(e: std::io::Error) -> Self {
        SpectralError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SpectralError>;
