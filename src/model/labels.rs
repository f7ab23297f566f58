//! Class labels emitted by the nodule classifier.
//!
//! The index order is fixed by the trained weights: output element `i` of the
//! network scores `ClassLabel::ALL[i]`. Never reorder these variants without
//! retraining the model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of classes the network scores
pub const NUM_CLASSES: usize = 3;

/// Class names in output-index order
pub const CLASS_NAMES: [&str; NUM_CLASSES] = ["benign", "malignant", "non-nodule"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    #[serde(rename = "benign")]
    Benign,
    #[serde(rename = "malignant")]
    Malignant,
    #[serde(rename = "non-nodule")]
    NonNodule,
}

impl ClassLabel {
    /// All labels in output-index order
    pub const ALL: [ClassLabel; NUM_CLASSES] =
        [ClassLabel::Benign, ClassLabel::Malignant, ClassLabel::NonNodule];

    pub fn index(self) -> usize {
        match self {
            ClassLabel::Benign => 0,
            ClassLabel::Malignant => 1,
            ClassLabel::NonNodule => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        CLASS_NAMES[self.index()]
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("unknown class label '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_mapping_is_fixed() {
        assert_eq!(ClassLabel::from_index(0), Some(ClassLabel::Benign));
        assert_eq!(ClassLabel::from_index(1), Some(ClassLabel::Malignant));
        assert_eq!(ClassLabel::from_index(2), Some(ClassLabel::NonNodule));
        assert_eq!(ClassLabel::from_index(3), None);

        for (i, label) in ClassLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(label.as_str(), CLASS_NAMES[i]);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ClassLabel::NonNodule).unwrap();
        assert_eq!(json, "\"non-nodule\"");

        let label: ClassLabel = serde_json::from_str("\"malignant\"").unwrap();
        assert_eq!(label, ClassLabel::Malignant);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("benign".parse::<ClassLabel>(), Ok(ClassLabel::Benign));
        assert!("Benign".parse::<ClassLabel>().is_err());
    }
}
