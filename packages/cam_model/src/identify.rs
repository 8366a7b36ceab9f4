//! Identification policy and the single-slot identify callback.

use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use crate::lock;
use crate::types::{ClassLabel, Classification};

pub(crate) type IdentifyCallback = Arc<dyn Fn(&ClassLabel) + Send + Sync>;

/// Debounces per-frame classifications into identification events.
///
/// The first classification (in classifier order) at or above the threshold
/// is the recognized label. A label is reported once per appearance: it can
/// only be reported again after a frame where nothing cleared the threshold.
#[derive(Clone, Debug)]
pub struct Identifier {
    threshold: f32,
    last_identified: Option<ClassLabel>,
}

impl Identifier {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_identified: None,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn last_identified(&self) -> Option<&ClassLabel> {
        self.last_identified.as_ref()
    }

    /// Feed one frame's classifications; returns the label to report, if any
    pub fn observe(&mut self, classifications: &[Classification]) -> Option<ClassLabel> {
        let Some(hit) = classifications
            .iter()
            .find(|c| c.probability >= self.threshold)
        else {
            if let Some(previous) = self.last_identified.take() {
                debug!("No longer recognized: {}", previous);
            }
            return None;
        };

        if self.last_identified.as_ref() == Some(&hit.label) {
            return None;
        }

        self.last_identified = Some(hit.label.clone());
        Some(hit.label.clone())
    }
}

struct SlotState {
    next_id: u64,
    current: Option<(u64, IdentifyCallback)>,
}

/// Holds at most one identify callback
#[derive(Clone)]
pub(crate) struct IdentifySlot {
    inner: Arc<Mutex<SlotState>>,
}

impl Default for IdentifySlot {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState {
                next_id: 1,
                current: None,
            })),
        }
    }
}

impl IdentifySlot {
    /// Install `callback`, replacing whatever was there
    pub(crate) fn subscribe(&self, callback: IdentifyCallback) -> Subscription {
        let mut slot = lock(&self.inner);
        let id = slot.next_id;
        slot.next_id += 1;
        if let Some((previous, _)) = slot.current.replace((id, callback)) {
            debug!("Identify subscription {} replaced by {}", previous, id);
        }
        Subscription {
            id,
            slot: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn clear(&self) {
        lock(&self.inner).current = None;
    }

    /// The installed callback. The slot lock is released before returning so
    /// the callback is free to cancel its own subscription.
    pub(crate) fn current(&self) -> Option<IdentifyCallback> {
        lock(&self.inner)
            .current
            .as_ref()
            .map(|(_, callback)| callback.clone())
    }

    pub(crate) fn is_occupied(&self) -> bool {
        lock(&self.inner).current.is_some()
    }
}

/// Handle to an installed identify callback.
///
/// Cancelling (or dropping) the handle empties the slot, but only while the
/// slot still holds this subscription: a handle that has been replaced is inert.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    id: u64,
    slot: Weak<Mutex<SlotState>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while this subscription still occupies its slot
    pub fn is_live(&self) -> bool {
        self.slot.upgrade().is_some_and(|slot| {
            matches!(lock(&slot).current, Some((id, _)) if id == self.id)
        })
    }

    /// Empty the slot if it still holds this subscription. The work happens
    /// in `Drop`.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut slot = lock(&slot);
        if matches!(slot.current, Some((id, _)) if id == self.id) {
            slot.current = None;
            debug!("Identify subscription {} cancelled", self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
