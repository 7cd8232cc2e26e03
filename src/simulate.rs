//! Synthetic transaction feed with one planted collusion ring.
//!
//! Benign accounts transact at random with no shared identifiers. Ring
//! members transact among themselves and reuse a small pool of devices,
//! IP addresses and instruments.

use crate::records::TransactionRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const BASE_TIMESTAMP: i64 = 1_700_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingScenario {
    pub accounts: usize,
    pub ring_size: usize,
    pub benign_edges: usize,
    pub ring_edges: usize,
    pub seed: u64,
}

impl Default for RingScenario {
    fn default() -> Self {
        Self {
            accounts: 300,
            ring_size: 15,
            benign_edges: 1200,
            ring_edges: 250,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedData {
    pub records: Vec<TransactionRecord>,
    /// Account keys of the planted ring.
    pub ring_accounts: BTreeSet<String>,
}

/// Two distinct entries, chosen uniformly. `pool` holds at least two.
fn pick_pair<'a>(rng: &mut StdRng, pool: &'a [String]) -> (&'a str, &'a str) {
    let first = rng.gen_range(0..pool.len());
    let mut second = rng.gen_range(0..pool.len() - 1);
    if second >= first {
        second += 1;
    }
    (pool[first].as_str(), pool[second].as_str())
}

fn pick(rng: &mut StdRng, pool: &[String]) -> Option<String> {
    pool.choose(rng).cloned()
}

impl RingScenario {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn generate(&self) -> SimulatedData {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let accounts: Vec<String> = (0..self.accounts.max(2)).map(|i| format!("a{i}")).collect();
        let ring_size = self.ring_size.clamp(2, accounts.len());
        let ring: Vec<String> = accounts
            .choose_multiple(&mut rng, ring_size)
            .cloned()
            .collect();

        let pool = (ring_size / 2).max(50);
        let devices: Vec<String> = (0..pool).map(|i| format!("d{i}")).collect();
        let ips: Vec<String> = (1..=pool).map(|i| format!("10.0.0.{i}")).collect();
        let instruments: Vec<String> = (0..ring_size.max(60)).map(|i| format!("card{i}")).collect();

        let mut records = Vec::with_capacity(self.benign_edges + self.ring_edges);
        for _ in 0..self.benign_edges {
            let (s, r) = pick_pair(&mut rng, &accounts);
            let amount = (rng.gen_range(5.0..150.0f64) * 100.0).round() / 100.0;
            records.push(TransactionRecord::new(BASE_TIMESTAMP, s, r, amount));
        }
        for _ in 0..self.ring_edges {
            let (s, r) = pick_pair(&mut rng, &ring);
            let amount = (rng.gen_range(20.0..80.0f64) * 100.0).round() / 100.0;
            let mut record = TransactionRecord::new(BASE_TIMESTAMP, s, r, amount);
            record.device_id = pick(&mut rng, &devices);
            record.ip = pick(&mut rng, &ips);
            record.instrument_id = pick(&mut rng, &instruments);
            records.push(record);
        }

        SimulatedData {
            records,
            ring_accounts: ring.into_iter().collect(),
        }
    }
}
