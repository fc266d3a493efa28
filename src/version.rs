use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::DatasetError;

pub const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPart {
    Any,
    Exact(String),
}

impl SelectorPart {
    fn matches(&self, component: &str) -> bool {
        match self {
            SelectorPart::Any => true,
            SelectorPart::Exact(value) => value == component,
        }
    }
}

/// A caller-supplied version request: `latest`, an exact `x.y.z`, or a
/// pattern with `*` components (`1.2.*`, `*.0.3`, `1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Pattern(Vec<SelectorPart>),
}

impl VersionSelector {
    pub fn matches(&self, version: &str) -> bool {
        let Some(parts) = split_version(version) else {
            return false;
        };
        match self {
            VersionSelector::Latest => true,
            VersionSelector::Pattern(pattern) => {
                pattern.len() == parts.len()
                    && pattern
                        .iter()
                        .zip(parts.iter())
                        .all(|(want, have)| want.matches(have))
            }
        }
    }
}

impl FromStr for VersionSelector {
    type Err = DatasetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(LATEST) {
            return Ok(VersionSelector::Latest);
        }
        let mut parts = trimmed
            .split('.')
            .map(|part| match part {
                "*" => SelectorPart::Any,
                other => SelectorPart::Exact(other.to_string()),
            })
            .collect::<Vec<_>>();
        // A pattern that can never match still parses; resolution reports it.
        while parts.len() < 3 {
            parts.push(SelectorPart::Any);
        }
        Ok(VersionSelector::Pattern(parts))
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => write!(f, "{LATEST}"),
            VersionSelector::Pattern(parts) => {
                let rendered = parts
                    .iter()
                    .map(|part| match part {
                        SelectorPart::Any => "*",
                        SelectorPart::Exact(value) => value.as_str(),
                    })
                    .collect::<Vec<_>>();
                write!(f, "{}", rendered.join("."))
            }
        }
    }
}

/// Sort key for a well-formed `x.y.z` version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Component {
    Number(u64),
    Text(String),
}

fn version_key(version: &str) -> Option<Vec<Component>> {
    let parts = split_version(version)?;
    Some(
        parts
            .into_iter()
            .map(|part| {
                if part.chars().all(|ch| ch.is_ascii_digit()) {
                    part.parse::<u64>()
                        .map(Component::Number)
                        .unwrap_or_else(|_| Component::Text(part.to_string()))
                } else {
                    Component::Text(part.to_string())
                }
            })
            .collect(),
    )
}

fn split_version(version: &str) -> Option<Vec<&str>> {
    if version.eq_ignore_ascii_case(LATEST) {
        return None;
    }
    let parts = version.split('.').collect::<Vec<_>>();
    if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    Some(parts)
}

/// Compare two versions by their components. Malformed versions sort first.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    version_key(left).cmp(&version_key(right))
}

/// Pick the greatest entry of `available` matching `selector`.
pub fn resolve<S: AsRef<str>>(selector: &str, available: &[S]) -> Result<String, DatasetError> {
    let parsed: VersionSelector = selector.parse()?;
    resolve_selector(&parsed, available)
        .ok_or_else(|| DatasetError::VersionNotFound(selector.to_string()))
}

pub fn resolve_selector<S: AsRef<str>>(
    selector: &VersionSelector,
    available: &[S],
) -> Option<String> {
    available
        .iter()
        .map(AsRef::as_ref)
        .filter(|candidate| selector.matches(candidate))
        .filter_map(|candidate| version_key(candidate).map(|key| (key, candidate)))
        .max_by(|(left, _), (right, _)| left.cmp(right))
        .map(|(_, candidate)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn latest_picks_maximum() {
        assert_eq!(resolve("latest", &["1.0.2", "1.0.3", "2.0.4"]).unwrap(), "2.0.4");
        assert_eq!(resolve("LATEST", &["2.0.2", "2.0.3", "2.0.4"]).unwrap(), "2.0.4");
        assert_eq!(resolve("latest", &["1.0.2", "2.8.3", "3.0.0"]).unwrap(), "3.0.0");
    }

    #[test]
    fn latest_ignores_legacy_latest_entry() {
        assert_eq!(resolve("latest", &["latest", "1.0.0"]).unwrap(), "1.0.0");
        let err = resolve("latest", &["latest"]).unwrap_err();
        assert_matches!(err, DatasetError::VersionNotFound(_));
    }

    #[test]
    fn exact_match() {
        assert_eq!(resolve("1.0.3", &["1.0.2", "1.0.3", "2.0.4"]).unwrap(), "1.0.3");
        assert_eq!(resolve("2.8.3", &["1.0.2", "2.8.3", "3.0.0"]).unwrap(), "2.8.3");
    }

    #[test]
    fn wildcard_and_padding() {
        assert_eq!(resolve("1.0", &["1.0.2", "1.0.3", "2.0.4"]).unwrap(), "1.0.3");
        assert_eq!(resolve("2.0.*", &["2.0.2", "2.0.3", "2.0.4"]).unwrap(), "2.0.4");
        assert_eq!(
            resolve("3", &["1.0.2", "2.8.3", "3.0.0", "3.0.1"]).unwrap(),
            "3.0.1"
        );
        assert_eq!(resolve("*.0.3", &["1.0.3", "2.0.3", "3.0.3"]).unwrap(), "3.0.3");
        assert_eq!(resolve("2.*", &["2.0.2", "2.0.3", "2.0.4"]).unwrap(), "2.0.4");
        assert_eq!(
            resolve("*", &["1.0.2", "2.8.3", "3.0.0", "3.0.1"]).unwrap(),
            "3.0.1"
        );
    }

    #[test]
    fn missing_versions_fail() {
        let empty: [&str; 0] = [];
        for selector in ["latest", "*", "1.0.0", "1"] {
            assert_matches!(
                resolve(selector, &empty),
                Err(DatasetError::VersionNotFound(_))
            );
        }
        let available = ["1.0.2", "1.4.5", "2.3.5"];
        for selector in ["3.1.*", "2.4.*", "3.*", "1.0.2.1"] {
            assert_matches!(
                resolve(selector, &available),
                Err(DatasetError::VersionNotFound(_))
            );
        }
    }

    #[test]
    fn numeric_components_compare_as_numbers() {
        assert_eq!(resolve("latest", &["2.0.0", "10.0.0", "9.9.9"]).unwrap(), "10.0.0");
        assert_eq!(resolve("1.*", &["1.2.0", "1.10.0"]).unwrap(), "1.10.0");
        assert_eq!(compare_versions("1.0.10", "1.0.9"), Ordering::Greater);
    }

    #[test]
    fn malformed_candidates_are_skipped() {
        assert_eq!(resolve("latest", &["1.0", "notes", "1.0.0"]).unwrap(), "1.0.0");
    }

    #[test]
    fn selector_display_pads() {
        let selector: VersionSelector = "1.2".parse().unwrap();
        assert_eq!(selector.to_string(), "1.2.*");
        assert_eq!("Latest".parse::<VersionSelector>().unwrap(), VersionSelector::Latest);
    }
}
