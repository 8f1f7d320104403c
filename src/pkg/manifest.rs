use crate::pkg::error::PkgDiffError;
use std::collections::btree_map::Iter;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Column layout of a whitespace-delimited package listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestFormat {
    pub min_tokens: usize,
    pub name_index: usize,
    pub version_index: usize,
}

impl ManifestFormat {
    /// `dpkg -l` rows: `ii  <name>  <version>  <arch?>  <description...>`.
    pub const DPKG_LIST: ManifestFormat = ManifestFormat {
        min_tokens: 4,
        name_index: 1,
        version_index: 2,
    };

    fn record<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.len() < self.min_tokens {
            return None;
        }

        let name = *tokens.get(self.name_index)?;
        let version = *tokens.get(self.version_index)?;

        Some((name, version))
    }
}

impl Default for ManifestFormat {
    fn default() -> Self {
        Self::DPKG_LIST
    }
}

/// Package name to version. A name repeated in the source keeps its last version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    packages: BTreeMap<String, String>,
}

impl Manifest {
    pub fn parse_file(path: &Path, format: ManifestFormat) -> Result<Self, PkgDiffError> {
        let data = fs::read(path).map_err(|error| PkgDiffError::file_access(path, error))?;

        Ok(Self::parse_str(&String::from_utf8_lossy(&data), format))
    }

    pub fn parse_str(data: &str, format: ManifestFormat) -> Self {
        let mut manifest = Manifest::default();

        for line in data.lines() {
            if let Some((name, version)) = format.record(line) {
                manifest.insert(name, version);
            }
        }

        manifest
    }

    pub fn insert(&mut self, name: &str, version: &str) {
        self.packages.insert(name.to_string(), version.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.packages.iter()
    }
}

impl<N: AsRef<str>, V: AsRef<str>> FromIterator<(N, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut manifest = Manifest::default();

        for (name, version) in iter {
            manifest.insert(name.as_ref(), version.as_ref());
        }

        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    const DPKG_OUTPUT: &str = "\
Desired=Unknown/Install/Remove/Purge/Hold
| Status=Not/Inst/Conf-files/Unpacked/halF-conf/Half-inst/trig-aWait/Trig-pend
+++-===================-==================-============-==============================
ii  adduser             3.113+nmu3ubuntu3  all          add and remove users and groups
ii  bash                4.3-7ubuntu1.5     amd64        GNU Bourne Again SHell
ii  libssl1.0.0:amd64   1.0.1f-1ubuntu2.19 amd64        Secure Sockets Layer toolkit
";

    #[test]
    fn parses_dpkg_listing_and_skips_headers() {
        let manifest = Manifest::parse_str(DPKG_OUTPUT, ManifestFormat::DPKG_LIST);

        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.get("adduser"), Some("3.113+nmu3ubuntu3"));
        assert_eq!(manifest.get("bash"), Some("4.3-7ubuntu1.5"));
        assert_eq!(manifest.get("libssl1.0.0:amd64"), Some("1.0.1f-1ubuntu2.19"));
    }

    #[rstest]
    #[case("ii  bash  4.3-7  description text", Some(("bash", "4.3-7")))]
    #[case("ii  bash  4.3-7  amd64", Some(("bash", "4.3-7")))]
    #[case("ii bash 4.3-7", None)]
    #[case("ii bash", None)]
    #[case("", None)]
    #[case("\t ii \t curl   7.35.0-1ubuntu2  amd64 ", Some(("curl", "7.35.0-1ubuntu2")))]
    fn line_qualifies_only_with_more_than_three_tokens(
        #[case] line: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let manifest = Manifest::parse_str(line, ManifestFormat::DPKG_LIST);

        match expected {
            Some((name, version)) => {
                assert_eq!(manifest.len(), 1);
                assert_eq!(manifest.get(name), Some(version));
            }
            None => assert!(manifest.is_empty()),
        }
    }

    #[test]
    fn wide_header_rows_are_read_positionally() {
        let data = "||/ Name  Version  Architecture Description\nii  bash  4.3-7  amd64  shell\n";
        let manifest = Manifest::parse_str(data, ManifestFormat::DPKG_LIST);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("Name"), Some("Version"));
    }

    #[test]
    fn repeated_name_keeps_last_version() {
        let data = "ii bash 4.3-7 amd64\nii bash 4.3-9 amd64\n";
        let manifest = Manifest::parse_str(data, ManifestFormat::DPKG_LIST);

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("bash"), Some("4.3-9"));
    }

    #[test]
    fn custom_format_reads_other_columns() {
        let format = ManifestFormat {
            min_tokens: 2,
            name_index: 0,
            version_index: 1,
        };
        let manifest = Manifest::parse_str("zlib1g 1:1.2.8\nlonely\n", format);

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("zlib1g"), Some("1:1.2.8"));
    }

    #[test]
    fn parse_file_tolerates_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ii \xff\xfe broken row here\nii  bash  4.3-7  shell\n")
            .unwrap();

        let manifest = Manifest::parse_file(file.path(), ManifestFormat::DPKG_LIST).unwrap();

        assert_eq!(manifest.get("bash"), Some("4.3-7"));
    }

    #[test]
    fn parse_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("stemcell_dpkg_l.txt");

        let error = Manifest::parse_file(&missing, ManifestFormat::DPKG_LIST).unwrap_err();

        assert!(matches!(error, PkgDiffError::FileAccess { .. }));
    }
}
