//! Finished configurations.
use std::{collections::BTreeSet, fmt};

/// A complete configuration handed to the build pipeline.
///
/// Holds the names of the selected concrete features. The id is assigned by the producer in
/// emission order, starting at 1.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BuilderConfiguration {
    id: u64,
    features: BTreeSet<String>,
}

impl BuilderConfiguration {
    pub fn new<S: Into<String>>(id: u64, features: impl IntoIterator<Item = S>) -> Self {
        BuilderConfiguration {
            id,
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Selected feature names in lexicographic order.
    pub fn features(&self) -> &BTreeSet<String> {
        &self.features
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Number of selected features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Size of the symmetric difference of the selections.
    pub fn distance(&self, other: &BuilderConfiguration) -> usize {
        self.features.symmetric_difference(&other.features).count()
    }
}

/// Formats as zero padded id followed by the selected features.
impl fmt::Display for BuilderConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:05}", self.id)?;
        for feature in self.features.iter() {
            write!(f, " {}", feature)?;
        }
        Ok(())
    }
}
