//! Collaborator seams: the classifier and the video device.
//!
//! Real implementations (a neural network runtime, a webcam driver) live
//! outside this crate. [`crate::replay`] provides a recorded stand-in.

use std::future::Future;

use crate::error::{PermissionError, PredictError, SetupError};
use crate::types::{CaptureOptions, ClassLabel, Classification, ContainerHandle, Frame, ModelRef};

/// A loaded image classifier
pub trait Classifier: Send + 'static {
    /// Labels in metadata order. This order defines the default target sequence.
    fn labels(&self) -> Vec<ClassLabel>;

    /// Classify one frame, producing one entry per known label in label order
    fn classify(&mut self, frame: &Frame) -> Result<Vec<Classification>, PredictError>;
}

/// Loads a classifier from its model and metadata resources
pub trait ModelLoader: Send + Sync + 'static {
    type Model: Classifier;

    fn load(&self, model: &ModelRef)
    -> impl Future<Output = Result<Self::Model, SetupError>> + Send;
}

/// An acquired video stream
pub trait VideoSource: Send + 'static {
    /// Grab the current frame
    fn capture(&mut self) -> Frame;

    /// Mount the live view into the presentation tree
    fn attach(&mut self, container: &ContainerHandle);

    fn play(&mut self) {}

    fn pause(&mut self) {}
}

/// Grants access to a video stream
pub trait VideoDevice: Send + Sync + 'static {
    type Source: VideoSource;

    fn setup(
        &self,
        options: &CaptureOptions,
    ) -> impl Future<Output = Result<Self::Source, PermissionError>> + Send;
}
