//! # Chart Repository Index
//!
//! The `index.yaml` document a chart repository publishes:
//!
//! ```yaml
//! apiVersion: v1
//! entries:
//!   podinfo:
//!     - name: podinfo
//!       version: 6.0.0
//!       urls: [podinfo-6.0.0.tgz]
//!       digest: 3b9c...
//!       created: 2021-08-05T08:12:37Z
//! ```
//!
//! Only the fields the cache acts on are modelled. Unknown fields are
//! ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// One published version of a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl ChartVersion {
    /// The first download URL. Later entries are mirrors.
    pub fn first_url(&self) -> Result<&str, IndexError> {
        self.urls
            .first()
            .map(String::as_str)
            .ok_or_else(|| IndexError::NoUrls {
                name: self.name.clone(),
            })
    }
}

/// A parsed repository index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

impl ChartIndex {
    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        serde_yaml::from_slice(data).map_err(|e| IndexError::Parse(e.to_string()))
    }

    /// Whether no chart has any version.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Fail with [`IndexError::Empty`] when there is nothing to resolve.
    pub fn ensure_not_empty(&self) -> Result<(), IndexError> {
        if self.is_empty() {
            return Err(IndexError::Empty);
        }
        Ok(())
    }

    /// Find a chart version.
    ///
    /// An exact version string wins first. Otherwise `version` is read as a
    /// semver requirement (`^1.0`, `>=1.2, <2`, `6.0.x`) and the highest
    /// matching version is returned. A bare version such as `6.0` means
    /// `=6.0`, not `^6.0`. `None` or an empty version selects the highest
    /// stable version. Entries whose version is not semver are only
    /// reachable by exact match.
    pub fn get(&self, name: &str, version: Option<&str>) -> Result<&ChartVersion, IndexError> {
        let versions = self
            .entries
            .get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| IndexError::NoChartName {
                name: name.to_string(),
            })?;

        let wanted = version.map(str::trim).filter(|v| !v.is_empty());
        if let Some(exact) = wanted.and_then(|w| versions.iter().find(|cv| cv.version == w)) {
            return Ok(exact);
        }

        let no_version = || IndexError::NoChartVersion {
            name: name.to_string(),
            version: wanted.unwrap_or_default().to_string(),
        };
        let req = match wanted {
            None => VersionReq::STAR,
            Some(w) => parse_requirement(w).ok_or_else(no_version)?,
        };

        let mut ranked: Vec<(Version, &ChartVersion)> = versions
            .iter()
            .filter_map(|cv| parse_version(&cv.version).map(|v| (v, cv)))
            .collect();
        ranked.sort_by(|(a, _), (b, _)| b.cmp(a));
        ranked
            .into_iter()
            .find(|(v, _)| req.matches(v))
            .map(|(_, cv)| cv)
            .ok_or_else(no_version)
    }
}

fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().trim_start_matches('v')).ok()
}

fn parse_requirement(raw: &str) -> Option<VersionReq> {
    let raw = raw.trim_start_matches('v');
    if raw.starts_with(|c: char| c.is_ascii_digit()) {
        VersionReq::parse(&format!("={raw}")).ok()
    } else {
        VersionReq::parse(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
apiVersion: v1
generated: "2021-08-05T08:12:37Z"
entries:
  podinfo:
    - name: podinfo
      version: 6.0.0
      urls: [podinfo-6.0.0.tgz]
      created: "2021-08-01T00:00:00Z"
    - name: podinfo
      version: 6.1.0
      urls: [https://cdn.example.com/podinfo-6.1.0.tgz]
      created: "2021-08-03T00:00:00+02:00"
    - name: podinfo
      version: 5.0.0
      urls: []
      created: "2021-07-01T00:00:00Z"
"#;

    #[test]
    fn parses_and_ignores_unknown_fields() {
        let index = ChartIndex::parse(INDEX.as_bytes()).unwrap();
        assert_eq!(index.api_version, "v1");
        assert_eq!(index.entries["podinfo"].len(), 3);
        assert!(!index.is_empty());
    }

    #[test]
    fn latest_is_highest_semver() {
        let index = ChartIndex::parse(INDEX.as_bytes()).unwrap();
        assert_eq!(index.get("podinfo", None).unwrap().version, "6.1.0");
        assert_eq!(index.get("podinfo", Some("")).unwrap().version, "6.1.0");
    }

    #[test]
    fn later_backport_does_not_win_over_higher_version() {
        let yaml = r#"
entries:
  x:
    - {name: x, version: 2.0.0, created: "2024-01-01T00:00:00Z"}
    - {name: x, version: 1.0.1, created: "2024-02-01T00:00:00Z"}
"#;
        let index = ChartIndex::parse(yaml.as_bytes()).unwrap();
        assert_eq!(index.get("x", None).unwrap().version, "2.0.0");
    }

    #[test]
    fn range_requirements_pick_highest_match() {
        let yaml = r#"
entries:
  x:
    - {name: x, version: 2.0.0}
    - {name: x, version: 1.0.1}
    - {name: x, version: 1.2.0}
    - {name: x, version: 1.2.3}
    - {name: x, version: 3.0.0-rc.1}
"#;
        let index = ChartIndex::parse(yaml.as_bytes()).unwrap();
        assert_eq!(index.get("x", Some("^1.0")).unwrap().version, "1.2.3");
        assert_eq!(index.get("x", Some(">=1.0.0, <1.2.0")).unwrap().version, "1.0.1");
        assert_eq!(index.get("x", Some("1.2")).unwrap().version, "1.2.3");
        assert_eq!(index.get("x", Some("1.2.0")).unwrap().version, "1.2.0");
        assert_eq!(index.get("x", Some("*")).unwrap().version, "2.0.0");
        assert_eq!(index.get("x", None).unwrap().version, "2.0.0");
        assert!(matches!(
            index.get("x", Some("^4")),
            Err(IndexError::NoChartVersion { .. })
        ));
        assert!(matches!(
            index.get("x", Some("not a range")),
            Err(IndexError::NoChartVersion { .. })
        ));
    }

    #[test]
    fn non_semver_versions_need_exact_match() {
        let yaml = "entries:\n  x:\n    - {name: x, version: a}\n    - {name: x, version: b}\n";
        let index = ChartIndex::parse(yaml.as_bytes()).unwrap();
        assert_eq!(index.get("x", Some("b")).unwrap().version, "b");
        assert!(matches!(
            index.get("x", None),
            Err(IndexError::NoChartVersion { .. })
        ));
    }

    #[test]
    fn lookup_errors() {
        let index = ChartIndex::parse(INDEX.as_bytes()).unwrap();
        assert_eq!(
            index.get("nginx", None).unwrap_err().to_string(),
            "chart 'nginx' could not be found"
        );
        assert_eq!(
            index.get("podinfo", Some("9.9.9")).unwrap_err().to_string(),
            "no chart with version '9.9.9' found for 'podinfo'"
        );
        let old = index.get("podinfo", Some("5.0.0")).unwrap();
        assert_eq!(
            old.first_url().unwrap_err().to_string(),
            "chart 'podinfo' has no downloadable URLs"
        );
    }

    #[test]
    fn empty_index() {
        let index = ChartIndex::parse(b"apiVersion: v1\nentries: {}\n").unwrap();
        assert!(index.is_empty());
        assert_eq!(index.ensure_not_empty(), Err(IndexError::Empty));
        assert!(ChartIndex::default().is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            ChartIndex::parse(b"entries: [not, a, map]"),
            Err(IndexError::Parse(_))
        ));
    }
}
