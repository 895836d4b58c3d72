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

//! Lookups the ledger consumes from the rest of the platform.
//!
//! The traits are the seams; [`InMemoryDirectory`] implements all three for
//! tests, the CLI replay and the demo server.

use dashmap::DashMap;
use serde_json::Value;

use crate::base::{PartnerId, RewardId, Role, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub role: Role,
    pub active: bool,
}

/// "Does this user exist, is it active, what role does it hold?"
pub trait UserDirectory: Send + Sync {
    fn lookup(&self, user_id: &UserId) -> Option<UserRecord>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    pub id: RewardId,
    pub partner_id: PartnerId,
    /// Coins a redemption of this reward must spend.
    pub cost: u64,
    pub active: bool,
}

pub trait RewardCatalog: Send + Sync {
    fn reward(&self, reward_id: &RewardId) -> Option<Reward>;
}

/// Per-partner integration settings (endpoint, credentials, inventory).
pub trait PartnerConfigs: Send + Sync {
    fn partner_config(&self, partner_id: &PartnerId) -> Option<Value>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, UserRecord>,
    rewards: DashMap<RewardId, Reward>,
    partners: DashMap<PartnerId, Value>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: impl Into<String>, role: Role) -> &Self {
        let user_id = UserId(user_id.into());
        self.users.insert(
            user_id.clone(),
            UserRecord {
                user_id,
                role,
                active: true,
            },
        );
        self
    }

    pub fn set_user_active(&self, user_id: &UserId, active: bool) {
        if let Some(mut record) = self.users.get_mut(user_id) {
            record.active = active;
        }
    }

    pub fn add_reward(&self, reward: Reward) -> &Self {
        self.rewards.insert(reward.id.clone(), reward);
        self
    }

    pub fn add_partner(&self, partner_id: impl Into<String>, config: Value) -> &Self {
        self.partners.insert(PartnerId(partner_id.into()), config);
        self
    }
}

impl UserDirectory for InMemoryDirectory {
    fn lookup(&self, user_id: &UserId) -> Option<UserRecord> {
        self.users.get(user_id).map(|r| r.value().clone())
    }
}

impl RewardCatalog for InMemoryDirectory {
    fn reward(&self, reward_id: &RewardId) -> Option<Reward> {
        self.rewards.get(reward_id).map(|r| r.value().clone())
    }
}

impl PartnerConfigs for InMemoryDirectory {
    fn partner_config(&self, partner_id: &PartnerId) -> Option<Value> {
        self.partners.get(partner_id).map(|c| c.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn users_can_be_deactivated() {
        let directory = InMemoryDirectory::new();
        directory.add_user("alice", Role::Citizen);
        let alice = UserId::from("alice");
        assert!(directory.lookup(&alice).unwrap().active);

        directory.set_user_active(&alice, false);
        assert!(!directory.lookup(&alice).unwrap().active);
        assert!(directory.lookup(&UserId::from("nobody")).is_none());
    }

    #[test]
    fn partner_configs_are_returned_verbatim() {
        let directory = InMemoryDirectory::new();
        directory.add_partner("green-co", json!({"endpoint": "http://x", "inventory": 3}));
        let config = directory.partner_config(&PartnerId::from("green-co")).unwrap();
        assert_eq!(config["inventory"], 3);
    }
}
