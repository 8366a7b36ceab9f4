use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a trainable class, as named in the model metadata
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for ClassLabel {
    fn from(label: String) -> Self {
        Self(label)
    }
}

impl PartialEq<str> for ClassLabel {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ClassLabel {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Probability the classifier assigned to one label for one frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: ClassLabel,
    pub probability: f32,
}

impl Classification {
    pub fn new(label: impl Into<ClassLabel>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }

    /// False for NaN and anything outside [0, 1]
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.probability)
    }
}

/// A single captured video frame
#[derive(Clone, Debug)]
pub struct Frame {
    /// Monotonic capture counter, starting at 0 for each source
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Capture time in milliseconds since the Unix epoch
    pub captured_at: i64,
}

/// Mount point in the presentation tree where the live view is attached
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the classifier weights and its label metadata live
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub model_url: String,
    pub metadata_url: String,
}

impl Default for ModelRef {
    fn default() -> Self {
        Self {
            model_url: "/model.json".to_string(),
            metadata_url: "/metadata.json".to_string(),
        }
    }
}

/// Requested capture geometry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub width: u32,
    pub height: u32,
    /// Mirror the image horizontally (selfie view)
    pub flip: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            flip: true,
        }
    }
}
