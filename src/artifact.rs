use crate::pkg::error::PkgDiffError;
use crate::pkg::manifest::ManifestFormat;
use std::path::PathBuf;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};
use url::Url;

const VERSION_PLACEHOLDER: &str = "{version}";

/// Characters that would let a version escape the staging directory or the URL path.
const FORBIDDEN_VERSION_CHARS: [char; 4] = ['/', '\\', '?', '#'];

#[derive(Display, EnumString, EnumIter, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFamily {
    #[strum(serialize = "rootfs")]
    Rootfs,
    #[strum(serialize = "stemcell_aws")]
    StemcellAws,
    #[strum(serialize = "stemcell_azure")]
    StemcellAzure,
    #[strum(serialize = "stemcell_google")]
    StemcellGoogle,
    #[strum(serialize = "stemcell_vsphere")]
    StemcellVsphere,
}

/// Where a family's archives are hosted.
#[derive(Debug)]
pub enum HostRule {
    Fixed(&'static str),
    /// Versions numerically below `cutoff` live on `below`, the rest on `at_or_above`.
    Threshold {
        cutoff: f64,
        below: &'static str,
        at_or_above: &'static str,
    },
}

#[derive(Debug)]
pub struct FamilyRule {
    pub family: ArtifactFamily,
    pub archive_template: &'static str,
    pub host: HostRule,
    pub manifest_template: &'static str,
    pub manifest_format: ManifestFormat,
}

const STEMCELL_MANIFEST: &str = "stemcell_dpkg_l.txt";

static CATALOG: [FamilyRule; 5] = [
    FamilyRule {
        family: ArtifactFamily::Rootfs,
        archive_template: "{version}.tar.gz",
        host: HostRule::Fixed("https://github.com/cloudfoundry/stacks/archive/"),
        manifest_template: "stacks-{version}/cflinuxfs2/cflinuxfs2_receipt",
        manifest_format: ManifestFormat::DPKG_LIST,
    },
    FamilyRule {
        family: ArtifactFamily::StemcellAws,
        archive_template: "light-bosh-stemcell-{version}-aws-xen-hvm-ubuntu-trusty-go_agent.tgz",
        host: HostRule::Threshold {
            cutoff: 3300.0,
            below: "https://d26ekeud912fhb.cloudfront.net/bosh-stemcell/aws/",
            at_or_above: "https://s3.amazonaws.com/bosh-aws-light-stemcells/",
        },
        manifest_template: STEMCELL_MANIFEST,
        manifest_format: ManifestFormat::DPKG_LIST,
    },
    FamilyRule {
        family: ArtifactFamily::StemcellAzure,
        archive_template: "bosh-stemcell-{version}-azure-hyperv-ubuntu-trusty-go_agent.tgz",
        host: HostRule::Fixed("https://s3.amazonaws.com/bosh-core-stemcells/azure/"),
        manifest_template: STEMCELL_MANIFEST,
        manifest_format: ManifestFormat::DPKG_LIST,
    },
    FamilyRule {
        family: ArtifactFamily::StemcellGoogle,
        archive_template: "bosh-stemcell-{version}-google-kvm-ubuntu-trusty-go_agent.tgz",
        host: HostRule::Fixed("https://s3.amazonaws.com/bosh-core-stemcells/google/"),
        manifest_template: STEMCELL_MANIFEST,
        manifest_format: ManifestFormat::DPKG_LIST,
    },
    FamilyRule {
        family: ArtifactFamily::StemcellVsphere,
        archive_template: "bosh-stemcell-{version}-vsphere-esxi-ubuntu-trusty-go_agent.tgz",
        host: HostRule::Threshold {
            cutoff: 3300.0,
            below: "https://d26ekeud912fhb.cloudfront.net/bosh-stemcell/vsphere/",
            at_or_above: "https://s3.amazonaws.com/bosh-core-stemcells/vsphere/",
        },
        manifest_template: STEMCELL_MANIFEST,
        manifest_format: ManifestFormat::DPKG_LIST,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub family: ArtifactFamily,
    pub version: String,
    pub url: Url,
    pub archive_filename: String,
    /// Relative to the staging directory the archive is unpacked into.
    pub manifest_relative_path: PathBuf,
    pub manifest_format: ManifestFormat,
}

impl ArtifactFamily {
    pub fn rule(&self) -> &'static FamilyRule {
        CATALOG
            .iter()
            .find(|rule| rule.family.eq(self))
            .unwrap_or_else(|| unreachable!("every family has a catalog entry"))
    }

    pub fn resolve(&self, version: &str) -> Result<ArtifactSpec, PkgDiffError> {
        let rule = self.rule();

        if version.trim().is_empty() {
            return Err(PkgDiffError::Config(format!(
                "Empty version given for family '{self}'."
            )));
        }

        if version.contains(&FORBIDDEN_VERSION_CHARS[..]) || version.contains("..") {
            return Err(PkgDiffError::Config(format!(
                "Version '{version}' may not contain path or URL separators."
            )));
        }

        let archive_filename = rule.archive_template.replace(VERSION_PLACEHOLDER, version);
        let host = rule.host.host_for(version)?;
        let url = Url::parse(host)
            .and_then(|base| base.join(&archive_filename))
            .map_err(|error| {
                PkgDiffError::Config(format!(
                    "Cannot build URL for {self} {version} from '{host}': {error}"
                ))
            })?;

        let manifest_relative_path =
            PathBuf::from(rule.manifest_template.replace(VERSION_PLACEHOLDER, version));

        Ok(ArtifactSpec {
            family: *self,
            version: version.to_string(),
            url,
            archive_filename,
            manifest_relative_path,
            manifest_format: rule.manifest_format,
        })
    }
}

impl HostRule {
    fn host_for(&self, version: &str) -> Result<&'static str, PkgDiffError> {
        match self {
            HostRule::Fixed(host) => Ok(*host),
            HostRule::Threshold {
                cutoff,
                below,
                at_or_above,
            } => {
                let numeric = version.trim().parse::<f64>().map_err(|_| {
                    PkgDiffError::Config(format!(
                        "Version '{version}' must be numeric to choose a download host."
                    ))
                })?;

                if numeric < *cutoff {
                    Ok(*below)
                } else {
                    Ok(*at_or_above)
                }
            }
        }
    }
}

/// Resolves a family identifier such as `stemcell_aws` and a version into an [`ArtifactSpec`].
pub fn locate(family_id: &str, version: &str) -> Result<ArtifactSpec, PkgDiffError> {
    let family = ArtifactFamily::from_str(family_id).map_err(|_| {
        PkgDiffError::Config(format!("Unsupported artifact family: {family_id}"))
    })?;

    family.resolve(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    const LEGACY_STEMCELL_HOST: &str = "https://d26ekeud912fhb.cloudfront.net/bosh-stemcell/";

    #[rstest]
    #[case("3299", "https://d26ekeud912fhb.cloudfront.net/bosh-stemcell/aws/")]
    #[case("3299.9", "https://d26ekeud912fhb.cloudfront.net/bosh-stemcell/aws/")]
    #[case("3300", "https://s3.amazonaws.com/bosh-aws-light-stemcells/")]
    #[case("3312.15", "https://s3.amazonaws.com/bosh-aws-light-stemcells/")]
    fn aws_host_switches_at_threshold(#[case] version: &str, #[case] host: &str) {
        let spec = locate("stemcell_aws", version).unwrap();
        let expected = format!(
            "{host}light-bosh-stemcell-{version}-aws-xen-hvm-ubuntu-trusty-go_agent.tgz"
        );

        assert_eq!(spec.url.as_str(), expected);
        assert_eq!(spec.manifest_relative_path, PathBuf::from(STEMCELL_MANIFEST));
    }

    #[test]
    fn vsphere_uses_legacy_host_below_threshold() {
        let spec = locate("stemcell_vsphere", "3263.8").unwrap();

        assert!(spec.url.as_str().starts_with(LEGACY_STEMCELL_HOST));
        assert_eq!(
            spec.archive_filename,
            "bosh-stemcell-3263.8-vsphere-esxi-ubuntu-trusty-go_agent.tgz"
        );
    }

    #[test]
    fn rootfs_manifest_lives_inside_versioned_directory() {
        let spec = locate("rootfs", "1.62.0").unwrap();

        assert_eq!(
            spec.url.as_str(),
            "https://github.com/cloudfoundry/stacks/archive/1.62.0.tar.gz"
        );
        assert_eq!(
            spec.manifest_relative_path,
            PathBuf::from("stacks-1.62.0/cflinuxfs2/cflinuxfs2_receipt")
        );
    }

    #[test]
    fn fixed_host_families_accept_non_numeric_versions() {
        let spec = locate("stemcell_google", "latest").unwrap();

        assert_eq!(
            spec.url.as_str(),
            "https://s3.amazonaws.com/bosh-core-stemcells/google/bosh-stemcell-latest-google-kvm-ubuntu-trusty-go_agent.tgz"
        );
    }

    #[test]
    fn threshold_families_reject_non_numeric_versions() {
        let error = locate("stemcell_aws", "latest").unwrap_err();

        assert!(matches!(error, PkgDiffError::Config(_)));
    }

    #[rstest]
    #[case("rootfs", "/tmp/rootfs")]
    #[case("rootfs", "../../etc/1.0")]
    #[case("rootfs", "1.0..2")]
    #[case("stemcell_google", "3312\\..\\x")]
    #[case("stemcell_azure", "3312?x=1")]
    #[case("stemcell_azure", "3312#frag")]
    fn version_with_separators_is_config_error(#[case] family_id: &str, #[case] version: &str) {
        let error = locate(family_id, version).unwrap_err();

        assert!(matches!(error, PkgDiffError::Config(_)));
    }

    #[rstest]
    #[case("stemcell_openstack")]
    #[case("ROOTFS")]
    #[case("")]
    fn unknown_family_is_config_error(#[case] family_id: &str) {
        let error = locate(family_id, "3312").unwrap_err();

        assert!(matches!(error, PkgDiffError::Config(_)));
    }

    #[test]
    fn every_family_round_trips_through_its_identifier() {
        for family in ArtifactFamily::iter() {
            let parsed = ArtifactFamily::from_str(&family.to_string()).unwrap();

            assert_eq!(parsed, family);
            assert_eq!(family.rule().family, family);
        }
    }
}
