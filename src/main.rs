use anyhow::{Context, Result};
use clap::{Args, Parser};
use pkgdiff::diff::printer::{write_report, TermProgress};
use pkgdiff::pkg::ProgressObserver;
use pkgdiff::{compare, telemetry, ArtifactFamily, ChangeKind, HttpFetcher, PipelineConfig};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "pkgdiff")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diff the packages between two stemcell or rootfs versions.", long_about = None)]
struct Cli {
    /// Antecedent version
    #[arg(value_name = "VERSION1")]
    version1: String,

    /// Descendent version
    #[arg(value_name = "VERSION2")]
    version2: String,

    #[command(flatten)]
    family: FamilyArgs,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Do not draw download progress on stderr
    #[arg(long)]
    no_progress: bool,

    /// Directory to create staging directories in (default: system temp dir)
    #[arg(long, env = "PKGDIFF_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env = "PKGDIFF_TIMEOUT", default_value_t = 600)]
    timeout: u64,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct FamilyArgs {
    #[arg(short = 'a', long, visible_alias = "sa")]
    stemcell_aws: bool,

    #[arg(short = 'z', long, visible_alias = "sz")]
    stemcell_azure: bool,

    #[arg(short = 'g', long, visible_alias = "sg")]
    stemcell_google: bool,

    #[arg(short = 's', long, visible_alias = "sv")]
    stemcell_vsphere: bool,

    #[arg(short = 'r', long)]
    rootfs: bool,

    /// Artifact family by identifier, e.g. stemcell_aws
    #[arg(long, value_name = "ID")]
    family: Option<String>,
}

impl FamilyArgs {
    fn family_id(&self) -> String {
        let family = if self.stemcell_aws {
            ArtifactFamily::StemcellAws
        } else if self.stemcell_azure {
            ArtifactFamily::StemcellAzure
        } else if self.stemcell_google {
            ArtifactFamily::StemcellGoogle
        } else if self.stemcell_vsphere {
            ArtifactFamily::StemcellVsphere
        } else if self.rootfs {
            ArtifactFamily::Rootfs
        } else {
            return self.family.clone().unwrap_or_default();
        };

        family.to_string()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let start_timestamp = Instant::now();
    let family_id = cli.family.family_id();

    let config = PipelineConfig {
        staging_root: cli.staging_dir.clone(),
        timeout: Duration::from_secs(cli.timeout),
    };

    let fetcher = HttpFetcher::new(config.timeout).context("Failed to set up the downloader")?;

    let progress = (!cli.no_progress && io::stderr().is_terminal()).then(TermProgress::new);
    let observer = progress
        .as_ref()
        .map(|progress| progress as &dyn ProgressObserver);

    let changes = compare(
        &family_id,
        &cli.version1,
        &cli.version2,
        &fetcher,
        &config,
        observer,
    )
    .with_context(|| {
        format!(
            "Failed to diff {family_id} {} against {}",
            cli.version1, cli.version2
        )
    })?;

    write_report(&mut io::stdout().lock(), &cli.version1, &cli.version2, &changes)
        .context("Failed to write the report")?;

    info!(
        added = changes.count_of(ChangeKind::Added),
        removed = changes.count_of(ChangeKind::Removed),
        changed = changes.count_of(ChangeKind::Changed),
        elapsed = %format!("{:.2}s", start_timestamp.elapsed().as_secs_f32()),
        "Diff complete"
    );

    Ok(())
}
