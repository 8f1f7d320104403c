use crate::artifact::{locate, ArtifactSpec};
use crate::diff::{get_diff_between, ChangeSet};
use crate::pkg::download::{Fetch, ProgressObserver, TransferContext};
use crate::pkg::error::{PipelineError, PkgDiffError, Stage};
use crate::pkg::manifest::Manifest;
use crate::pkg::tarball;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, info_span, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent for staging directories; the system temp dir when unset.
    pub staging_root: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            staging_root: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A temporary directory owned by a single pipeline run, removed when dropped.
pub struct StagingArea {
    dir: Option<TempDir>,
}

impl StagingArea {
    pub fn create(root: Option<&Path>) -> Result<Self, PkgDiffError> {
        let root = root.map(Path::to_path_buf).unwrap_or_else(env::temp_dir);
        let dir = tempfile::Builder::new()
            .prefix("pkgdiff_")
            .tempdir_in(&root)
            .map_err(|error| PkgDiffError::file_access(&root, error))?;

        debug!(path = %dir.path().display(), "Staging area created");

        Ok(StagingArea { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => unreachable!("staging directory is only taken on drop"),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let path = dir.path().to_path_buf();

        match dir.close() {
            Ok(()) => debug!(path = %path.display(), "Staging area removed"),
            Err(error) => {
                warn!(path = %path.display(), %error, "Could not remove staging area")
            }
        }
    }
}

/// Downloads, unpacks and parses one artifact inside a fresh [`StagingArea`].
pub fn run_pipeline<F: Fetch + ?Sized>(
    spec: &ArtifactSpec,
    fetcher: &F,
    config: &PipelineConfig,
    ctx: &TransferContext,
) -> Result<Manifest, PipelineError> {
    let span = info_span!("pipeline", family = %spec.family, version = %spec.version);
    let _guard = span.enter();

    let family = spec.family.to_string();
    let at = |stage: Stage, error: PkgDiffError| {
        PipelineError::new(stage, &family, &spec.version, error)
    };

    let staging = StagingArea::create(config.staging_root.as_deref())
        .map_err(|error| at(Stage::Staging, error))?;
    let archive_path = staging.path().join(&spec.archive_filename);

    info!(url = %spec.url, "Fetching artifact");
    fetcher
        .fetch(&spec.url, &archive_path, ctx)
        .map_err(|error| at(Stage::Download, error))?;

    if ctx.is_cancelled() {
        return Err(at(Stage::Extract, PkgDiffError::Cancelled));
    }

    tarball::unpack(&archive_path, staging.path(), ctx.cancel)
        .map_err(|error| at(Stage::Extract, error))?;

    let manifest_path = staging.path().join(&spec.manifest_relative_path);
    let manifest = Manifest::parse_file(&manifest_path, spec.manifest_format)
        .map_err(|error| at(Stage::Parse, error))?;

    info!(packages = manifest.len(), "Manifest parsed");

    Ok(manifest)
}

/// Resolves both versions, runs their pipelines concurrently and diffs the manifests.
///
/// The first pipeline to fail cancels its peer; both staging areas are gone
/// by the time this returns.
pub fn compare<F: Fetch + ?Sized>(
    family_id: &str,
    version1: &str,
    version2: &str,
    fetcher: &F,
    config: &PipelineConfig,
    observer: Option<&dyn ProgressObserver>,
) -> Result<ChangeSet, PipelineError> {
    let resolve = |version: &str| {
        locate(family_id, version)
            .map_err(|error| PipelineError::new(Stage::Locate, family_id, version, error))
    };

    let before_spec = resolve(version1)?;
    let after_spec = resolve(version2)?;

    info!(url = %before_spec.url, "Antecedent artifact");
    info!(url = %after_spec.url, "Descendent artifact");

    let cancel = AtomicBool::new(false);
    let ctx = TransferContext::new(&cancel).with_observer(observer);

    let run = |spec: &ArtifactSpec| {
        let result = run_pipeline(spec, fetcher, config, &ctx);

        if result.is_err() {
            cancel.store(true, Ordering::Relaxed);
        }

        result
    };

    let (before, after) = thread::scope(|scope| {
        let before = scope.spawn(|| run(&before_spec));
        let after = scope.spawn(|| run(&after_spec));

        (join(before), join(after))
    });

    let (before, after) = match (before, after) {
        (Ok(before), Ok(after)) => (before, after),
        (Err(error), Ok(_)) | (Ok(_), Err(error)) => return Err(error),
        (Err(first), Err(second)) => {
            return Err(if first.is_cancelled() { second } else { first });
        }
    };

    Ok(get_diff_between(&before, &after))
}

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactFamily;
    use std::fs;

    struct Unreachable;

    impl Fetch for Unreachable {
        fn fetch(
            &self,
            url: &url::Url,
            _: &Path,
            _: &TransferContext,
        ) -> Result<u64, PkgDiffError> {
            Err(PkgDiffError::Network {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn staging_area_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::create(Some(root.path())).unwrap();
        let path = staging.path().to_path_buf();
        fs::write(path.join("partial.tgz"), b"partial").unwrap();

        assert!(path.is_dir());
        drop(staging);
        assert!(!path.exists());
    }

    #[test]
    fn staging_area_already_gone_does_not_panic() {
        let root = tempfile::tempdir().unwrap();
        let staging = StagingArea::create(Some(root.path())).unwrap();

        fs::remove_dir_all(staging.path()).unwrap();
        drop(staging);
    }

    #[test]
    fn unwritable_staging_root_is_file_access_error() {
        let root = tempfile::tempdir().unwrap();
        let not_a_dir = root.path().join("file");
        fs::write(&not_a_dir, b"").unwrap();

        let error = StagingArea::create(Some(&not_a_dir)).err().unwrap();

        assert!(matches!(error, PkgDiffError::FileAccess { .. }));
    }

    #[test]
    fn download_failure_names_stage_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            staging_root: Some(root.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        let spec = ArtifactFamily::StemcellAws.resolve("3312").unwrap();
        let cancel = AtomicBool::new(false);

        let error =
            run_pipeline(&spec, &Unreachable, &config, &TransferContext::new(&cancel)).unwrap_err();

        assert_eq!(error.stage, Stage::Download);
        assert_eq!(error.family, "stemcell_aws");
        assert_eq!(error.version, "3312");
        assert!(matches!(error.source, PkgDiffError::Network { .. }));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
