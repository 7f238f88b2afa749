//! `load_weighted_random` scheduler (the configured default): weighted
//! random placement favoring nodes with more residual capacity, with a
//! small per-host jitter term so repeated selections for the same host
//! don't always land identically across snapshots.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::cluster::NodeInfo;
use crate::error::{Error, Result};
use crate::traits::Scheduler;

/// `w_i = (capacity_i - count_i)`, squared for the batch variant, times a
/// `0.95 + 0.1 * ((hash(host)/1000 + i/N) mod 1)` jitter factor
/// (`spec.md` §4.3).
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadWeightedRandom;

fn stable_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn jitter(host: &str, index: usize, n: usize) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let hash_term = (stable_hash(host) % 1000) as f64 / 1000.0;
    let index_term = index as f64 / n as f64;
    let frac = (hash_term + index_term).fract();
    0.95 + 0.1 * frac
}

fn weight(residual: u32, squared: bool) -> f64 {
    let base = f64::from(residual);
    if squared {
        base * base
    } else {
        base
    }
}

impl LoadWeightedRandom {
    fn weighted_pick(snapshot: &[NodeInfo], host: &str, squared: bool) -> Option<NodeInfo> {
        let available: Vec<&NodeInfo> = snapshot.iter().filter(|n| n.has_capacity()).collect();
        if available.is_empty() {
            return None;
        }
        let n = available.len();
        let weights: Vec<f64> = available
            .iter()
            .enumerate()
            .map(|(i, node)| weight(node.residual_capacity(), squared) * jitter(host, i, n))
            .collect();
        if weights.iter().all(|w| *w <= 0.0) {
            return None;
        }
        let dist = WeightedIndex::new(&weights).ok()?;
        let idx = dist.sample(&mut thread_rng());
        Some(available[idx].clone())
    }
}

impl Scheduler for LoadWeightedRandom {
    fn name(&self) -> &str {
        "load_weighted_random"
    }

    fn select(&self, snapshot: &[NodeInfo], host: &str) -> Result<NodeInfo> {
        Self::weighted_pick(snapshot, host, false).ok_or(Error::CapacityExhausted {
            candidates: snapshot.len(),
        })
    }

    fn batch_select(&self, snapshot: &[NodeInfo], hosts: &[String]) -> Vec<(String, NodeInfo)> {
        let mut residual: Vec<NodeInfo> = snapshot.to_vec();
        let mut out = Vec::with_capacity(hosts.len());
        for host in hosts {
            let Some(chosen) = Self::weighted_pick(&residual, host, true) else {
                continue;
            };
            if let Some(slot) = residual.iter_mut().find(|n| n.node_id == chosen.node_id) {
                slot.count += 1;
            }
            out.push((host.clone(), chosen));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, capacity: u32, count: u32) -> NodeInfo {
        NodeInfo {
            node_id: id.into(),
            hostname: id.into(),
            capacity,
            count,
            last_heartbeat: 0,
        }
    }

    #[test]
    fn never_selects_a_node_without_capacity() {
        let snapshot = vec![node("a", 1, 1), node("b", 4, 1)];
        for _ in 0..500 {
            let picked = LoadWeightedRandom.select(&snapshot, "r1").unwrap();
            assert_eq!(picked.node_id, "b");
        }
    }

    #[test]
    fn exhausted_when_all_nodes_full() {
        let snapshot = vec![node("a", 2, 2), node("b", 4, 4)];
        let err = LoadWeightedRandom.select(&snapshot, "r1").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CapacityExhausted);
    }

    #[test]
    fn favors_higher_residual_capacity_over_many_trials() {
        let snapshot = vec![node("a", 100, 99), node("b", 100, 0)];
        let mut b_wins = 0;
        for _ in 0..2000 {
            if LoadWeightedRandom.select(&snapshot, "r1").unwrap().node_id == "b" {
                b_wins += 1;
            }
        }
        assert!(b_wins > 1800, "expected node b to dominate selection, got {b_wins}/2000");
    }
}
