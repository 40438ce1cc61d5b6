/// Data layer: the spectrum model and the ingestion adapters.
///
/// Architecture:
/// ```text
///  .csv / .txt / .fits / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  pick adapter → columns + header metadata
///   └──────────┘      │
///        │        ┌──────┐
///        │        │ fits  │  HDU / binary-table reader
///        │        └──────┘
///        ▼
///   ┌──────────┐
///   │ Spectrum  │  validated, immutable samples + units + metadata
///   └──────────┘
/// ```

pub mod fits;
pub mod loader;
pub mod model;
