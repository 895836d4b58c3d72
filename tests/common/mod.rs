// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use healcoin_ledger::{
    Caller, HealCoinCore, InMemoryDirectory, LedgerConfig, ManualClock, PartnerChannel, Reward,
    RewardId, Role, SimulatedPartner, SourceId, UserId,
};
use serde_json::json;
use std::sync::Arc;

pub const METRO: &str = "metro";
pub const BUS_PASS: &str = "bus-pass";
pub const CINEMA: &str = "cinema";
pub const RETIRED: &str = "retired-reward";

pub struct Harness {
    pub core: HealCoinCore,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemoryDirectory>,
}

/// Monday 2025-03-10 09:00 UTC.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(LedgerConfig::default(), SimulatedPartner::always_succeed())
}

pub fn harness_with_config(config: LedgerConfig) -> Harness {
    harness_with(config, SimulatedPartner::always_succeed())
}

pub fn harness_with(config: LedgerConfig, channel: impl PartnerChannel + 'static) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let directory = Arc::new(directory());
    let core =
        HealCoinCore::with_channel(&config, directory.clone(), clock.clone(), Arc::new(channel))
            .unwrap();
    Harness {
        core,
        clock,
        directory,
    }
}

/// alice, bob and carol are citizens; root is an administrator.
pub fn directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory
        .add_user("alice", Role::Citizen)
        .add_user("bob", Role::Citizen)
        .add_user("carol", Role::Citizen)
        .add_user("root", Role::Admin);
    directory
        .add_reward(reward(BUS_PASS, 50, true))
        .add_reward(reward(CINEMA, 200, true))
        .add_reward(reward(RETIRED, 10, false))
        .add_partner(METRO, json!({"inventory": 12}));
    directory
}

fn reward(id: &str, cost: u64, active: bool) -> Reward {
    Reward {
        id: RewardId::from(id),
        partner_id: METRO.into(),
        cost,
        active,
    }
}

pub fn user(name: &str) -> UserId {
    UserId::from(name)
}

pub fn citizen(name: &str) -> Caller {
    Caller::citizen(name)
}

pub fn admin() -> Caller {
    Caller::admin("root")
}

pub fn source(name: &str) -> SourceId {
    SourceId::from(name)
}

impl Harness {
    /// Earns `coins` for `name` from a fresh source.
    pub fn earn(&self, name: &str, source_id: &str, coins: u64) -> healcoin_ledger::EarnOutcome {
        self.core
            .ledger
            .earn(&citizen(name), &user(name), &source(source_id), coins)
            .unwrap()
    }

    pub fn balance(&self, name: &str) -> u64 {
        self.core
            .ledger
            .get_balance(&citizen(name), &user(name))
            .unwrap()
            .heal_coins
    }

    pub fn events(&self) -> Vec<String> {
        self.core
            .audit
            .entries()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn count_events(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == kind).count()
    }
}
