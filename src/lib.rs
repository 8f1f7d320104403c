//! Compares the packages installed in two releases of a rootfs or stemcell
//! artifact.
//!
//! Each release is resolved to a download URL, fetched into its own staging
//! directory, unpacked, and its `dpkg -l` style package listing parsed into a
//! [`Manifest`]. The two manifests are then diffed into a [`ChangeSet`] sorted
//! by package name.

pub mod artifact;
pub mod diff;
pub mod pipeline;
pub mod pkg;
pub mod telemetry;

pub use artifact::{locate, ArtifactFamily, ArtifactSpec};
pub use diff::{get_diff_between, ChangeEntry, ChangeKind, ChangeSet};
pub use pipeline::{compare, run_pipeline, PipelineConfig, StagingArea};
pub use pkg::{Fetch, HttpFetcher, Manifest, PipelineError, PkgDiffError, Stage};
