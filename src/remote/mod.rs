/// Remote services: archive discovery and reference-line lookup.
///
/// Both sit behind a trait (`ArchiveService`, `LineCatalog`) so the
/// retry/relaxation/fallback logic runs the same against MAST, NIST, or an
/// in-process fake.

pub mod archive;
pub mod lines;
pub mod mast;
pub mod nist;
pub mod retry;
pub mod worker;
