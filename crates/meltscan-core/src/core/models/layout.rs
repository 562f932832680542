use super::well::WellId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition labels for the positions of one plate.
///
/// A layout keeps a pristine snapshot of the labels it was created with so that
/// interactive edits can be discarded with [`Layout::reset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    labels: BTreeMap<WellId, String>,
    pristine: BTreeMap<WellId, String>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = (WellId, S)>,
        S: Into<String>,
    {
        let labels: BTreeMap<WellId, String> = labels
            .into_iter()
            .map(|(id, label)| (id, label.into()))
            .filter(|(_, label)| !label.is_empty())
            .collect();
        Self {
            pristine: labels.clone(),
            labels,
        }
    }

    pub fn condition(&self, id: WellId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    pub fn set_condition(&mut self, id: WellId, label: Option<String>) {
        match label.filter(|l| !l.is_empty()) {
            Some(label) => {
                self.labels.insert(id, label);
            }
            None => {
                self.labels.remove(&id);
            }
        }
    }

    pub fn update<I>(&mut self, edits: I)
    where
        I: IntoIterator<Item = (WellId, Option<String>)>,
    {
        for (id, label) in edits {
            self.set_condition(id, label);
        }
    }

    /// Restores the labels captured when the layout was created or last loaded.
    pub fn reset(&mut self) {
        self.labels = self.pristine.clone();
    }

    /// Replaces both the current labels and the pristine snapshot.
    pub fn replace(&mut self, other: Layout) {
        self.labels = other.labels;
        self.pristine = other.pristine;
    }

    pub fn is_modified(&self) -> bool {
        self.labels != self.pristine
    }

    pub fn labels(&self) -> impl Iterator<Item = (WellId, &str)> {
        self.labels.iter().map(|(id, label)| (*id, label.as_str()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    #[test]
    fn reset_restores_pristine_labels() {
        let mut layout = Layout::from_labels([(id("A1"), "buffer"), (id("A2"), "NaCl 50 mM")]);
        layout.set_condition(id("A1"), Some("ligand".into()));
        layout.set_condition(id("A2"), None);
        assert!(layout.is_modified());
        assert_eq!(layout.condition(id("A1")), Some("ligand"));
        assert_eq!(layout.condition(id("A2")), None);

        layout.reset();
        assert!(!layout.is_modified());
        assert_eq!(layout.condition(id("A1")), Some("buffer"));
        assert_eq!(layout.condition(id("A2")), Some("NaCl 50 mM"));
    }

    #[test]
    fn empty_labels_are_treated_as_unlabeled() {
        let mut layout = Layout::from_labels([(id("B1"), "")]);
        assert!(layout.is_empty());
        layout.set_condition(id("B1"), Some(String::new()));
        assert_eq!(layout.condition(id("B1")), None);
    }

    #[test]
    fn replace_swaps_the_pristine_snapshot_too() {
        let mut layout = Layout::from_labels([(id("A1"), "old")]);
        layout.replace(Layout::from_labels([(id("A1"), "new")]));
        layout.set_condition(id("A1"), Some("edited".into()));
        layout.reset();
        assert_eq!(layout.condition(id("A1")), Some("new"));
    }
}
