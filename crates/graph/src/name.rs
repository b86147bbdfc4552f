use std::fmt;

/// Opaque identifier shared by both the vectors and rasters tables (see design note OQ-1:
/// one key type instead of a string|integer union — format integer-like names yourself,
/// e.g. `FeatureName::from(42.to_string())`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FeatureName(String);

impl FeatureName {
    pub fn new(name: impl Into<String>) -> Self {
        FeatureName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FeatureName {
    fn from(value: String) -> Self {
        FeatureName(value)
    }
}

impl From<&str> for FeatureName {
    fn from(value: &str) -> Self {
        FeatureName(value.to_string())
    }
}

/// Which side of the bipartite graph a vertex belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Vector,
    Raster,
}
