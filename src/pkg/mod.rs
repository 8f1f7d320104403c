pub mod download;
pub mod error;
pub mod manifest;
pub mod tarball;

pub use download::{Fetch, HttpFetcher, ProgressObserver, TransferContext};
pub use error::{PipelineError, PkgDiffError, Stage};
pub use manifest::{Manifest, ManifestFormat};
