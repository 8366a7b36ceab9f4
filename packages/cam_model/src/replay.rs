//! Recorded stand-ins for the classifier and the camera.
//!
//! A replay script is JSON lines, one line per frame. A line is either the
//! classifier output for that frame, with exactly one entry per model label,
//! or a simulated classifier failure:
//!
//! ```text
//! # lines starting with '#' are ignored
//! [{"label": "cat", "probability": 0.92}, {"label": "dog", "probability": 0.08}]
//! {"error": "inference backend lost"}
//! ```
//!
//! Labels come from a Teachable Machine style `metadata.json`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{Classifier, ModelLoader, VideoDevice, VideoSource};
use crate::error::{PermissionError, PredictError, SetupError};
use crate::types::{CaptureOptions, ClassLabel, Classification, ContainerHandle, Frame, ModelRef};

/// The parts of a model's `metadata.json` that matter here
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub labels: Vec<ClassLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u32>,
}

impl ModelMetadata {
    pub fn from_json(text: &str) -> Result<Self, SetupError> {
        serde_json::from_str(text).map_err(|e| SetupError::Metadata(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
enum ReplayStep {
    Frame(Vec<Classification>),
    Failure { error: String },
}

/// Classifier that replays recorded output, one step per classification pass.
/// Once the recording runs out every label scores zero.
#[derive(Clone, Debug)]
pub struct ReplayModel {
    labels: Vec<ClassLabel>,
    steps: Vec<ReplayStep>,
    cursor: usize,
}

impl ReplayModel {
    pub fn new(labels: Vec<ClassLabel>, frames: Vec<Vec<Classification>>) -> Self {
        Self {
            labels,
            steps: frames.into_iter().map(ReplayStep::Frame).collect(),
            cursor: 0,
        }
    }

    pub fn push_frame(&mut self, classifications: Vec<Classification>) {
        self.steps.push(ReplayStep::Frame(classifications));
    }

    pub fn push_failure(&mut self, reason: impl Into<String>) {
        self.steps.push(ReplayStep::Failure {
            error: reason.into(),
        });
    }

    /// Parse a JSON-lines replay script against the model's labels
    pub fn parse_script(labels: Vec<ClassLabel>, script: &str) -> Result<Self, SetupError> {
        let mut steps = Vec::new();

        for (index, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step: ReplayStep = serde_json::from_str(line)
                .map_err(|e| SetupError::Metadata(format!("line {}: {}", index + 1, e)))?;

            if let ReplayStep::Frame(row) = &step {
                check_row(&labels, row).map_err(|reason| {
                    SetupError::Metadata(format!("line {}: {}", index + 1, reason))
                })?;
            }
            steps.push(step);
        }

        Ok(Self {
            labels,
            steps,
            cursor: 0,
        })
    }

    /// Recorded steps not yet replayed
    pub fn remaining(&self) -> usize {
        self.steps.len().saturating_sub(self.cursor)
    }
}

/// A recorded frame carries exactly one entry per model label
fn check_row(labels: &[ClassLabel], row: &[Classification]) -> Result<(), String> {
    let mut seen: Vec<&ClassLabel> = Vec::with_capacity(row.len());
    for c in row {
        if !labels.contains(&c.label) {
            return Err(format!("unknown label '{}'", c.label));
        }
        if seen.contains(&&c.label) {
            return Err(format!("label '{}' appears more than once", c.label));
        }
        seen.push(&c.label);
    }
    match labels.iter().find(|label| !seen.contains(label)) {
        Some(missing) => Err(format!("missing label '{missing}'")),
        None => Ok(()),
    }
}

impl Classifier for ReplayModel {
    fn labels(&self) -> Vec<ClassLabel> {
        self.labels.clone()
    }

    fn classify(&mut self, _frame: &Frame) -> Result<Vec<Classification>, PredictError> {
        let step = self.steps.get(self.cursor).cloned();
        if step.is_some() {
            self.cursor += 1;
        }

        match step {
            Some(ReplayStep::Frame(row)) => Ok(row),
            Some(ReplayStep::Failure { error }) => Err(PredictError::Classifier(error)),
            None => Ok(self
                .labels
                .iter()
                .map(|label| Classification::new(label.clone(), 0.0))
                .collect()),
        }
    }
}

/// Loads a [`ReplayModel`], either from files or from a preset copy.
///
/// From files, `model_url` names the replay script and `metadata_url` the
/// metadata JSON. A `file://` prefix is accepted.
#[derive(Clone, Debug, Default)]
pub struct ReplayLoader {
    preset: Option<ReplayModel>,
}

impl ReplayLoader {
    pub fn files() -> Self {
        Self { preset: None }
    }

    pub fn preset(model: ReplayModel) -> Self {
        Self {
            preset: Some(model),
        }
    }
}

impl ModelLoader for ReplayLoader {
    type Model = ReplayModel;

    async fn load(&self, model: &ModelRef) -> Result<ReplayModel, SetupError> {
        if let Some(preset) = &self.preset {
            debug!("Using preset replay model");
            return Ok(preset.clone());
        }

        let metadata = ModelMetadata::from_json(&read_resource(&model.metadata_url).await?)?;
        if let Some(name) = &metadata.model_name {
            info!("Model metadata: {}", name);
        }

        let script = read_resource(&model.model_url).await?;
        let replay = ReplayModel::parse_script(metadata.labels, &script)?;
        info!(
            "Loaded {} recorded frames from {}",
            replay.remaining(),
            model.model_url
        );
        Ok(replay)
    }
}

async fn read_resource(url: &str) -> Result<String, SetupError> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SetupError::ModelLoad {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// Video device that produces generated frames, or refuses access
#[derive(Clone, Debug, Default)]
pub struct SyntheticCamera {
    denial: Option<String>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self { denial: None }
    }

    /// A camera whose permission prompt is always refused
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            denial: Some(reason.into()),
        }
    }
}

impl VideoDevice for SyntheticCamera {
    type Source = SyntheticFeed;

    async fn setup(&self, options: &CaptureOptions) -> Result<SyntheticFeed, PermissionError> {
        if let Some(reason) = &self.denial {
            warn!("Camera permission refused: {}", reason);
            return Err(PermissionError::Denied(reason.clone()));
        }
        Ok(SyntheticFeed::new(options.clone()))
    }
}

/// Stream of generated frames from a [`SyntheticCamera`]
#[derive(Debug)]
pub struct SyntheticFeed {
    options: CaptureOptions,
    sequence: u64,
    container: Option<ContainerHandle>,
    playing: bool,
}

impl SyntheticFeed {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            sequence: 0,
            container: None,
            playing: false,
        }
    }

    pub fn container(&self) -> Option<&ContainerHandle> {
        self.container.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn frames_captured(&self) -> u64 {
        self.sequence
    }
}

impl VideoSource for SyntheticFeed {
    fn capture(&mut self) -> Frame {
        let CaptureOptions { width, height, .. } = self.options;
        let shade = (self.sequence % 256) as u8;
        let frame = Frame {
            sequence: self.sequence,
            width,
            height,
            pixels: vec![shade; width as usize * height as usize * 3],
            captured_at: chrono::Utc::now().timestamp_millis(),
        };
        self.sequence += 1;
        frame
    }

    fn attach(&mut self, container: &ContainerHandle) {
        debug!("Synthetic feed attached to {}", container);
        self.container = Some(container.clone());
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}
