use cam_model::ClassLabel;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Order in which the model's labels become targets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetOrder {
    /// Metadata order
    #[default]
    Model,
    /// Random permutation, fixed for the whole game
    Shuffled,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetArrangement {
    pub order: TargetOrder,
    /// Seed for `Shuffled`; unseeded shuffles differ every game
    pub seed: Option<u64>,
}

impl TargetArrangement {
    pub fn arrange(&self, mut labels: Vec<ClassLabel>) -> Vec<ClassLabel> {
        if self.order == TargetOrder::Shuffled {
            match self.seed {
                Some(seed) => labels.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => labels.shuffle(&mut rand::rng()),
            }
        }
        labels
    }
}
