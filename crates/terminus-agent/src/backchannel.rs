//! Backchannel acknowledgements prepended to replies.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Acknowledgement phrases drawn uniformly.
pub const BACKCHANNEL_PHRASES: [&str; 10] = [
    "I see",
    "Got it",
    "I understand",
    "Makes sense",
    "I hear you",
    "Sure thing",
    "Absolutely",
    "Of course",
    "I'm with you",
    "I follow",
];

pub const DEFAULT_BACKCHANNEL_PROBABILITY: f64 = 0.7;

/// Randomized prefixer over a seedable source.
///
/// The source sits behind a mutex so one selector can be shared by several
/// concurrent sessions.
#[derive(Debug)]
pub struct BackchannelSelector {
    rng: Mutex<StdRng>,
    probability: f64,
}

impl Default for BackchannelSelector {
    fn default() -> Self {
        Self::new(DEFAULT_BACKCHANNEL_PROBABILITY)
    }
}

impl BackchannelSelector {
    /// Selector seeded from the operating system.
    pub fn new(probability: f64) -> Self {
        Self::with_rng(probability, StdRng::from_os_rng())
    }

    /// Selector with a fixed seed, for reproducible phrase sequences.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self::with_rng(probability, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(probability: f64, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Prepend "<phrase>. " to `reply` with the configured probability.
    ///
    /// Greetings and empty replies are returned unchanged.
    pub fn maybe_prefix(&self, reply: &str, is_greeting: bool) -> String {
        if is_greeting || reply.trim().is_empty() {
            return reply.to_string();
        }
        match self.draw() {
            Some(phrase) => format!("{}. {}", phrase, reply),
            None => reply.to_string(),
        }
    }

    /// One draw: the phrase to use, or `None` to leave the reply alone.
    fn draw(&self) -> Option<&'static str> {
        let mut rng = self.rng.lock().expect("backchannel rng poisoned");
        if rng.random::<f64>() >= self.probability {
            return None;
        }
        Some(BACKCHANNEL_PHRASES[rng.random_range(0..BACKCHANNEL_PHRASES.len())])
    }
}
