//! Fork policies - when a folder-like branch gets its own worker

use std::sync::Arc;

use contracts::IngestError;

/// Decides, at every folder-like node about to be walked, whether the
/// branch is handed to a new worker or walked depth-first in place.
///
/// Stateless: every input is passed on each call.
pub trait ForkPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Arguments
    /// * `uploaded` - messages produced so far by the whole run
    /// * `batch_size` - configured target batch size
    /// * `scheduled` - branch workers currently active
    fn need_fork(&self, uploaded: u64, batch_size: u64, scheduled: usize) -> bool;
}

/// Forks once the run is warm, up to a concurrency cap.
///
/// 1. `uploaded < batch_size / 3` -> no fork, too early
/// 2. `scheduled >= max_concurrent` -> no fork, cap reached
/// 3. otherwise fork
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveForkPolicy {
    max_concurrent: usize,
}

impl AdaptiveForkPolicy {
    pub const NAME: &'static str = "adaptive";

    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }
}

impl Default for AdaptiveForkPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ForkPolicy for AdaptiveForkPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn need_fork(&self, uploaded: u64, batch_size: u64, scheduled: usize) -> bool {
        if uploaded < batch_size / 3 {
            return false;
        }
        scheduled < self.max_concurrent
    }
}

/// Never forks; the whole tree is walked by one worker
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPolicy;

impl SequentialPolicy {
    pub const NAME: &'static str = "sequential";
}

impl ForkPolicy for SequentialPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn need_fork(&self, _uploaded: u64, _batch_size: u64, _scheduled: usize) -> bool {
        false
    }
}

type PolicyFactory = fn(usize) -> Arc<dyn ForkPolicy>;

fn adaptive(max_concurrent: usize) -> Arc<dyn ForkPolicy> {
    Arc::new(AdaptiveForkPolicy::new(max_concurrent))
}

fn sequential(_max_concurrent: usize) -> Arc<dyn ForkPolicy> {
    Arc::new(SequentialPolicy)
}

const FORK_POLICIES: &[(&str, PolicyFactory)] = &[
    (AdaptiveForkPolicy::NAME, adaptive),
    (SequentialPolicy::NAME, sequential),
];

/// Build a fork policy by name
///
/// # Errors
/// `ConfigValidation` for unknown names
pub fn fork_policy(name: &str, max_concurrent: usize) -> Result<Arc<dyn ForkPolicy>, IngestError> {
    FORK_POLICIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, factory)| factory(max_concurrent))
        .ok_or_else(|| {
            IngestError::config_validation(
                "producer.fork_policy",
                format!(
                    "unknown fork policy '{name}', expected one of {:?}",
                    fork_policy_names()
                ),
            )
        })
}

/// Registered policy names
pub fn fork_policy_names() -> Vec<&'static str> {
    FORK_POLICIES.iter().map(|(n, _)| *n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_adaptive_boundaries() {
        let policy = AdaptiveForkPolicy::default();
        let batch = 9;

        assert!(!policy.need_fork(batch / 3 - 1, batch, 0));
        // exactly batch/3 is warm enough
        assert!(policy.need_fork(batch / 3, batch, 0));
        assert!(policy.need_fork(batch, batch, 4));
        assert!(!policy.need_fork(batch, batch, 5));
        assert!(!policy.need_fork(batch, batch, 6));
    }

    #[test]
    fn test_adaptive_small_batch() {
        // batch/3 == 0: warm from the start
        let policy = AdaptiveForkPolicy::default();
        assert!(policy.need_fork(0, 2, 0));
    }

    #[test]
    fn test_adaptive_matches_rule() {
        let mut rng = rand::rng();
        for _ in 0..1_000 {
            let cap = rng.random_range(1..10usize);
            let batch = rng.random_range(1..200u64);
            let uploaded = rng.random_range(0..300u64);
            let scheduled = rng.random_range(0..12usize);

            let expected = uploaded >= batch / 3 && scheduled < cap;
            assert_eq!(
                AdaptiveForkPolicy::new(cap).need_fork(uploaded, batch, scheduled),
                expected,
                "cap={cap} batch={batch} uploaded={uploaded} scheduled={scheduled}"
            );
        }
    }

    #[test]
    fn test_registry() {
        assert_eq!(fork_policy_names(), vec!["adaptive", "sequential"]);
        assert_eq!(fork_policy("adaptive", 5).unwrap().name(), "adaptive");

        let sequential = fork_policy("sequential", 5).unwrap();
        assert!(!sequential.need_fork(1_000, 9, 0));

        let err = fork_policy("random", 5).err().unwrap();
        assert!(matches!(err, IngestError::ConfigValidation { .. }));
    }

    #[test]
    fn test_configured_cap() {
        let policy = fork_policy("adaptive", 2).unwrap();
        assert!(policy.need_fork(10, 9, 1));
        assert!(!policy.need_fork(10, 9, 2));
    }
}
