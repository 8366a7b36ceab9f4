use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::backend::{Classifier, ModelLoader, VideoDevice, VideoSource};
use crate::error::{PredictError, SetupError};
use crate::identify::{IdentifySlot, Identifier, Subscription};
use crate::lock;
use crate::types::{CaptureOptions, ClassLabel, Classification, ContainerHandle, Frame, ModelRef};

/// Minimum probability for a classification to count as recognized
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Roughly one display refresh at 60 Hz
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Configuration for a classifier session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub threshold: f32,
    pub frame_interval: Duration,
    pub capture: CaptureOptions,
    pub model: ModelRef,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            capture: CaptureOptions::default(),
            model: ModelRef::default(),
        }
    }
}

/// Everything the frame loop touches, guarded together
struct Devices {
    classifier: Box<dyn Classifier>,
    video: Box<dyn VideoSource>,
    identifier: Identifier,
}

struct SessionInner {
    labels: Vec<ClassLabel>,
    frame_interval: Duration,
    devices: Mutex<Devices>,
    slot: IdentifySlot,
    playing_tx: watch::Sender<bool>,
    predictions_tx: watch::Sender<Vec<Classification>>,
}

/// Exclusive owner of a classifier and a video source.
///
/// While playing, a single frame loop captures, classifies and runs the
/// identification policy once per frame interval. Identification events go
/// to the one callback installed with [`ClassifierSession::on_identify`].
pub struct ClassifierSession {
    inner: Arc<SessionInner>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClassifierSession {
    /// Load the classifier, acquire the video device and mount the live view.
    ///
    /// Fails on the first error; nothing is retried.
    pub async fn setup<L, D>(
        loader: &L,
        device: &D,
        container: &ContainerHandle,
        config: &SessionConfig,
    ) -> Result<Self, SetupError>
    where
        L: ModelLoader,
        D: VideoDevice,
    {
        info!("Loading model from {}", config.model.model_url);
        let classifier = loader.load(&config.model).await.inspect_err(|e| {
            error!("Model load failed: {}", e);
        })?;

        let labels = classifier.labels();
        if labels.is_empty() {
            error!("Model at {} has no class labels", config.model.metadata_url);
            return Err(SetupError::NoLabels);
        }
        info!("Model loaded with {} classes: {:?}", labels.len(), labels);

        let mut video = device.setup(&config.capture).await.map_err(|e| {
            error!("Video device setup failed: {}", e);
            SetupError::from(e)
        })?;
        video.attach(container);
        info!(
            "Video source {}x{} attached to {}",
            config.capture.width, config.capture.height, container
        );

        Ok(Self::from_parts(
            Box::new(classifier),
            Box::new(video),
            labels,
            config,
        ))
    }

    fn from_parts(
        classifier: Box<dyn Classifier>,
        video: Box<dyn VideoSource>,
        labels: Vec<ClassLabel>,
        config: &SessionConfig,
    ) -> Self {
        let (playing_tx, _) = watch::channel(false);
        let (predictions_tx, _) = watch::channel(Vec::new());

        Self {
            inner: Arc::new(SessionInner {
                labels,
                frame_interval: config.frame_interval,
                devices: Mutex::new(Devices {
                    classifier,
                    video,
                    identifier: Identifier::new(config.threshold),
                }),
                slot: IdentifySlot::default(),
                playing_tx,
                predictions_tx,
            }),
            loop_task: Mutex::new(None),
        }
    }

    /// Class labels in classifier order
    pub fn labels(&self) -> &[ClassLabel] {
        &self.inner.labels
    }

    pub fn is_playing(&self) -> bool {
        *self.inner.playing_tx.borrow()
    }

    /// Start (or resume) the frame loop. Calling this while playing is a no-op.
    pub fn play(&self) {
        let started = self.inner.playing_tx.send_if_modified(|playing| {
            let was_playing = *playing;
            *playing = true;
            !was_playing
        });
        if started {
            lock(&self.inner.devices).video.play();
            info!("Classifier session playing");
        }

        let mut task = lock(&self.loop_task);
        if task.as_ref().is_none_or(|t| t.is_finished()) {
            let inner = self.inner.clone();
            *task = Some(tokio::spawn(async move {
                inner.run().await;
            }));
        }
    }

    /// Stop the frame loop. No new frame body starts after this returns; on a
    /// multi-thread runtime one already in progress may still finish.
    pub fn pause(&self) {
        let stopped = self.inner.playing_tx.send_if_modified(|playing| {
            let was_playing = *playing;
            *playing = false;
            was_playing
        });
        if stopped {
            lock(&self.inner.devices).video.pause();
            info!("Classifier session paused");
        }
    }

    /// One classification pass over the current frame. Does not run the
    /// identification policy.
    pub fn predict(&self) -> Result<Vec<Classification>, PredictError> {
        let mut devices = lock(&self.inner.devices);
        let frame = devices.video.capture();
        classify_frame(devices.classifier.as_mut(), &frame)
    }

    /// Install the identify callback, replacing any previous one
    pub fn on_identify<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ClassLabel) + Send + Sync + 'static,
    {
        self.inner.slot.subscribe(Arc::new(callback))
    }

    /// Remove whatever identify callback is installed
    pub fn clear_identify(&self) {
        self.inner.slot.clear();
    }

    pub fn has_subscriber(&self) -> bool {
        self.inner.slot.is_occupied()
    }

    /// Latest classifications produced by the frame loop
    pub fn watch_predictions(&self) -> watch::Receiver<Vec<Classification>> {
        self.inner.predictions_tx.subscribe()
    }
}

impl Drop for ClassifierSession {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.loop_task).take() {
            task.abort();
            debug!("Frame loop aborted on session teardown");
        }
    }
}

impl SessionInner {
    /// The frame loop. Parks while paused; suspends only between frames.
    async fn run(&self) {
        let mut playing_rx = self.playing_tx.subscribe();
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Frame loop started ({:?} per frame)", self.frame_interval);

        loop {
            if playing_rx.wait_for(|playing| *playing).await.is_err() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = playing_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            // pause() may have landed while the tick was pending
            if !*playing_rx.borrow_and_update() {
                continue;
            }

            self.poll_frame();
        }

        debug!("Frame loop stopped");
    }

    /// capture -> classify -> identify -> notify, all before the next tick
    fn poll_frame(&self) {
        let identified = {
            let mut devices = lock(&self.devices);
            let frame = devices.video.capture();
            match classify_frame(devices.classifier.as_mut(), &frame) {
                Ok(classifications) => {
                    let identified = devices.identifier.observe(&classifications);
                    self.predictions_tx.send_replace(classifications);
                    identified
                }
                Err(e) => {
                    warn!("Prediction failed for frame {}: {}", frame.sequence, e);
                    None
                }
            }
        };

        let Some(label) = identified else {
            return;
        };
        debug!("Identified {}", label);
        if let Some(callback) = self.slot.current() {
            callback(&label);
        }
    }
}

fn classify_frame(
    classifier: &mut dyn Classifier,
    frame: &Frame,
) -> Result<Vec<Classification>, PredictError> {
    let classifications = classifier.classify(frame)?;
    if let Some(bad) = classifications.iter().find(|c| !c.is_valid()) {
        return Err(PredictError::InvalidProbability {
            label: bad.label.clone(),
            probability: bad.probability,
        });
    }
    Ok(classifications)
}
