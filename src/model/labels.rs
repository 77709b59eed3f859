use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// An instance label map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when every label in `self` is present in `other` with the same
    /// value. An empty label map is a subset of everything.
    #[must_use]
    pub fn subset_of(&self, other: &Labels) -> bool {
        self.0.iter().all(|(k, v)| other.0.get(k) == Some(v))
    }
}

impl From<BTreeMap<String, String>> for Labels {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// The label requirement attached to an instance query.
///
/// An instance matches when its labels are a superset of every requirement
/// in the selection; the empty selection matches every instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelection(Vec<Labels>);

impl LabelSelection {
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.iter().all(|required| required.subset_of(labels))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Labels>> for LabelSelection {
    fn from(required: Vec<Labels>) -> Self {
        Self(required)
    }
}

impl FromIterator<Labels> for LabelSelection {
    fn from_iter<I: IntoIterator<Item = Labels>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_labels() -> Labels {
        [("env", "prod"), ("tier", "web")].into_iter().collect()
    }

    #[test]
    fn subset_matches_on_shared_pairs() {
        let required: Labels = [("env", "prod")].into_iter().collect();
        assert!(required.subset_of(&instance_labels()));
    }

    #[test]
    fn subset_rejects_conflicting_value() {
        let required: Labels = [("env", "staging")].into_iter().collect();
        assert!(!required.subset_of(&instance_labels()));
    }

    #[test]
    fn empty_labels_are_subset_of_anything() {
        assert!(Labels::new().subset_of(&instance_labels()));
        assert!(Labels::new().subset_of(&Labels::new()));
    }

    #[test]
    fn selection_requires_every_entry() {
        let selection: LabelSelection = vec![
            [("env", "prod")].into_iter().collect::<Labels>(),
            [("tier", "web")].into_iter().collect::<Labels>(),
        ]
        .into();
        assert!(selection.matches(&instance_labels()));

        let mismatched: LabelSelection = vec![
            [("env", "prod")].into_iter().collect::<Labels>(),
            [("tier", "db")].into_iter().collect::<Labels>(),
        ]
        .into();
        assert!(!mismatched.matches(&instance_labels()));
    }

    #[test]
    fn empty_selection_matches_everything() {
        assert!(LabelSelection::default().matches(&instance_labels()));
        assert!(LabelSelection::default().matches(&Labels::new()));
    }
}
