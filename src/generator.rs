use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{FeedError, FeedResult};
use crate::model::{Sample, SampleId};

/// Produces one [`Sample`] per call: value from N(0, 1), creator uniform over
/// a fixed roster, `created` at the current wall-clock time.
pub struct SampleGenerator {
    roster: Vec<String>,
    rng: StdRng,
    last_created: Option<DateTime<Utc>>,
}

impl SampleGenerator {
    /// Entropy-seeded generator. Fails on an empty roster or an empty name.
    pub fn new(roster: Vec<String>) -> FeedResult<Self> {
        Self::with_rng(roster, StdRng::from_entropy())
    }

    /// Deterministic generator, so re-runs draw the same values and creators.
    pub fn seeded(roster: Vec<String>, seed: u64) -> FeedResult<Self> {
        Self::with_rng(roster, StdRng::seed_from_u64(seed))
    }

    fn with_rng(roster: Vec<String>, rng: StdRng) -> FeedResult<Self> {
        if roster.is_empty() {
            return Err(FeedError::Configuration("creator roster is empty".into()));
        }
        if roster.iter().any(|name| name.trim().is_empty()) {
            return Err(FeedError::Configuration(
                "creator roster contains an empty name".into(),
            ));
        }
        Ok(Self {
            roster,
            rng,
            last_created: None,
        })
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn generate(&mut self, id: SampleId) -> Sample {
        let value: f64 = self.rng.sample(StandardNormal);
        let creator = self.roster[self.rng.gen_range(0..self.roster.len())].clone();

        // Never step back in time, even if the wall clock does.
        let now = Utc::now();
        let created = match self.last_created {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created = Some(created);

        Sample {
            id,
            created,
            creator,
            value,
        }
    }
}
