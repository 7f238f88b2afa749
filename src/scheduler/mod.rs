//! Scheduler plugins: pure node-placement policies for pinned workers.
//!
//! Every scheduler implements [`crate::traits::Scheduler`]. The active one
//! is picked by `worker.scheduler` configuration at process start and never
//! changes at runtime (`spec.md` §4.3). Scheduler inputs are always a
//! read-only snapshot; none of the built-ins mutate the store themselves.

mod greedy;
mod least_load;
mod least_load_random;
mod load_weighted_random;

pub use greedy::Greedy;
pub use least_load::LeastLoad;
pub use least_load_random::LeastLoadRandom;
pub use load_weighted_random::LoadWeightedRandom;

use crate::error::{Error, Result};
use crate::traits::Scheduler;

/// Builds the configured scheduler by registry name. Unlike driver
/// lookup failures, an unrecognized scheduler name is fatal at boot
/// (`spec.md` §9, "scheduler-load failure which is fatal").
pub fn build(name: &str) -> Result<Box<dyn Scheduler>> {
    match name {
        "greedy" => Ok(Box::new(Greedy)),
        "least_load" => Ok(Box::new(LeastLoad)),
        "least_load_random" => Ok(Box::new(LeastLoadRandom)),
        "load_weighted_random" => Ok(Box::new(LoadWeightedRandom)),
        other => Err(Error::Config(format!(
            "unknown scheduler plugin '{other}'; expected one of greedy, least_load, least_load_random, load_weighted_random"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeInfo;
    use proptest::prelude::*;

    #[test]
    fn build_resolves_known_names() {
        for name in ["greedy", "least_load", "least_load_random", "load_weighted_random"] {
            assert_eq!(build(name).unwrap().name(), name);
        }
    }

    #[test]
    fn build_rejects_unknown_name() {
        assert!(build("quantum_annealing").is_err());
    }

    fn arb_snapshot() -> impl Strategy<Value = Vec<NodeInfo>> {
        prop::collection::vec(
            (1u32..8, 0u32..8).prop_map(|(capacity, count)| NodeInfo {
                node_id: format!("node-{capacity}-{count}"),
                hostname: format!("host-{capacity}-{count}"),
                capacity,
                count: count.min(capacity),
                last_heartbeat: 0,
            }),
            1..6,
        )
    }

    proptest! {
        /// Invariant 6 + weighted-scheduler non-negativity: whatever
        /// `load_weighted_random` selects always has spare capacity.
        #[test]
        fn weighted_random_respects_capacity_bound(snapshot in arb_snapshot()) {
            let scheduler = LoadWeightedRandom;
            if let Ok(picked) = scheduler.select(&snapshot, "r1") {
                prop_assert!(picked.count < picked.capacity);
            }
        }

        /// `greedy` and `least_load` are pure functions of their inputs.
        #[test]
        fn greedy_and_least_load_are_deterministic(snapshot in arb_snapshot()) {
            let a = Greedy.select(&snapshot, "r1");
            let b = Greedy.select(&snapshot, "r1");
            prop_assert_eq!(a.map(|n| n.node_id), b.map(|n| n.node_id));

            let a = LeastLoad.select(&snapshot, "r1");
            let b = LeastLoad.select(&snapshot, "r1");
            prop_assert_eq!(a.map(|n| n.node_id), b.map(|n| n.node_id));
        }
    }
}
