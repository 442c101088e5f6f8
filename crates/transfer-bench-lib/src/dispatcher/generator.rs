// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{config::WorkloadConfig, types::TransferRequest};
use rand::{
    Rng, SeedableRng,
    distributions::{Distribution, Uniform},
    rngs::StdRng,
};

/// Draws randomized transfers from a fixed workload.
///
/// Owns its random source so that a seeded generator always yields the same
/// sequence of requests.
#[derive(Debug)]
pub struct RequestGenerator {
    rng: StdRng,
    workload: WorkloadConfig,
    amounts: Uniform<f64>,
}

impl RequestGenerator {
    pub fn new(workload: WorkloadConfig, rng: StdRng) -> Self {
        let amounts = Uniform::new_inclusive(workload.amounts.min(), workload.amounts.max());
        Self {
            rng,
            workload,
            amounts,
        }
    }

    pub fn from_seed(workload: WorkloadConfig, seed: u64) -> Self {
        Self::new(workload, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(workload: WorkloadConfig) -> Self {
        Self::new(workload, StdRng::from_entropy())
    }

    pub fn next_request(&mut self) -> TransferRequest {
        let ids = self.workload.accounts.ids();
        let from_index = self.rng.gen_range(0, ids.len());
        // Pick among the other len - 1 accounts by skipping over the sender's slot.
        let mut to_index = self.rng.gen_range(0, ids.len() - 1);
        if to_index >= from_index {
            to_index += 1;
        }

        TransferRequest {
            from_account: ids[from_index],
            to_account: ids[to_index],
            amount: round_cents(self.amounts.sample(&mut self.rng)),
            mode: self.workload.mode,
            isolation: self.workload.isolation,
        }
    }
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
