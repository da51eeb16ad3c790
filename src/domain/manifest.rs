//! Manifest domain model
//!
//! A `package.json` reduced to the fields the reconciliation engine reads.
//! Parsing is lenient: anything that is not a JSON object yields no manifest,
//! and map entries whose value is not a string are dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::tracker::DependencyKind;

/// Package name (or engine name) to version range
pub type DependencyMap = BTreeMap<String, String>;

/// The parts of a `package.json` the engine cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, deserialize_with = "string_entries")]
    pub dependencies: Option<DependencyMap>,

    #[serde(default, deserialize_with = "string_entries")]
    pub dev_dependencies: Option<DependencyMap>,

    #[serde(default, deserialize_with = "string_entries")]
    pub peer_dependencies: Option<DependencyMap>,

    #[serde(default, deserialize_with = "string_entries")]
    pub engines: Option<DependencyMap>,

    #[serde(default, deserialize_with = "string_value")]
    pub main: Option<String>,

    #[serde(default, deserialize_with = "string_value")]
    pub typings: Option<String>,

    #[serde(default, deserialize_with = "string_value")]
    pub types: Option<String>,
}

impl Manifest {
    /// Parses manifest text, returning `None` for malformed JSON or a
    /// non-object top level. A leading byte order mark is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let value: Value = serde_json::from_str(text).ok()?;
        Self::from_value(value)
    }

    /// Builds a manifest from an already decoded JSON value
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Returns the declared map for a dependency kind
    pub fn dependency_map(&self, kind: DependencyKind) -> Option<&DependencyMap> {
        match kind {
            DependencyKind::Dependencies => self.dependencies.as_ref(),
            DependencyKind::DevDependencies => self.dev_dependencies.as_ref(),
            DependencyKind::PeerDependencies => self.peer_dependencies.as_ref(),
        }
    }

    /// True if the package points at its own declaration file
    pub fn declares_types(&self) -> bool {
        [&self.typings, &self.types]
            .into_iter()
            .any(|field| field.as_deref().is_some_and(|path| !path.is_empty()))
    }
}

fn string_entries<'de, D>(deserializer: D) -> Result<Option<DependencyMap>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(entries)) => Some(
            entries
                .into_iter()
                .filter_map(|(name, version)| match version {
                    Value::String(version) => Some((name, version)),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

fn string_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}
