//! Expectation conditions and how they are drawn.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which framing text a participant sees for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    High,
    Low,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::High => "high",
            Condition::Low => "low",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Condition::High),
            "low" => Ok(Condition::Low),
            other => Err(format!("unknown condition '{}'", other)),
        }
    }
}

/// Draws a [`Condition`] for one scenario instance.
///
/// Flows call this once per scenario when they start and never redraw.
/// Implementations must be `Send + Sync` so a single assigner can be shared
/// by every flow the server creates.
pub trait ConditionAssigner: Send + Sync {
    fn assign(&self) -> Condition;

    /// Draw `count` independent conditions. No balancing across draws.
    fn assign_many(&self, count: usize) -> Vec<Condition> {
        (0..count).map(|_| self.assign()).collect()
    }
}

/// Bernoulli(0.5) draws from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAssigner;

impl ConditionAssigner for RandomAssigner {
    fn assign(&self) -> Condition {
        if rand::thread_rng().gen_bool(0.5) {
            Condition::High
        } else {
            Condition::Low
        }
    }
}

/// Always returns the same condition.
#[derive(Debug, Clone, Copy)]
pub struct FixedAssigner(pub Condition);

impl ConditionAssigner for FixedAssigner {
    fn assign(&self) -> Condition {
        self.0
    }
}

/// Replays a fixed sequence, wrapping around at the end.
///
/// Deterministic stand-in for [`RandomAssigner`] in tests and demos.
#[derive(Debug)]
pub struct SequenceAssigner {
    sequence: Vec<Condition>,
    next: AtomicUsize,
}

impl SequenceAssigner {
    /// Cycle through `sequence`, starting at its first element.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` is empty. This is a test double; production code
    /// uses [`RandomAssigner`].
    pub fn new(sequence: Vec<Condition>) -> Self {
        assert!(!sequence.is_empty(), "SequenceAssigner needs at least one condition");
        SequenceAssigner {
            sequence,
            next: AtomicUsize::new(0),
        }
    }
}

impl ConditionAssigner for SequenceAssigner {
    fn assign(&self) -> Condition {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.sequence[i % self.sequence.len()]
    }
}
