//! Uniform scenario sampling.
//!
//! Uses a ChaCha8 RNG so a seeded sampler replays the same scenario sequence.

use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{ScenarioDescriptor, Vocabulary};

/// Draws scenarios independently and uniformly from a [`Vocabulary`].
pub struct ScenarioSampler {
    vocabulary: Vocabulary,
    rng: ChaCha8Rng,
}

impl ScenarioSampler {
    /// Creates a sampler. `None` seeds from the thread RNG.
    pub fn new(vocabulary: Vocabulary, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Self { vocabulary, rng }
    }

    /// Returns the vocabulary this sampler draws from.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Draws one scenario, one element from each table.
    pub fn sample(&mut self) -> ScenarioDescriptor {
        let vocab = self.vocabulary;
        ScenarioDescriptor {
            environment: pick(vocab.environments(), &mut self.rng),
            time_weather: pick(vocab.time_weather(), &mut self.rng),
            fire_stage: pick(vocab.fire_stages(), &mut self.rng),
            pov: pick(vocab.povs(), &mut self.rng),
        }
    }
}

impl Default for ScenarioSampler {
    fn default() -> Self {
        Self::new(Vocabulary::default(), None)
    }
}

// Tables are non-empty by construction of `Vocabulary`.
fn pick(table: &[&str], rng: &mut ChaCha8Rng) -> String {
    table.choose(rng).copied().unwrap_or_default().to_string()
}
