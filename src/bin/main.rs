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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use healcoin_ledger::directory::RewardCatalog;
use healcoin_ledger::logging::init_logging;
use healcoin_ledger::{
    AuditEntryId, Caller, HealCoinCore, InMemoryDirectory, LedgerConfig, LedgerError, Reward,
    RewardId, Role, SourceId, SystemClock, UserId,
};
use serde::Deserialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Partner that rewards first seen in a replay are attached to.
const REPLAY_PARTNER: &str = "replay-partner";

/// HealCoin ledger tools
#[derive(Parser, Debug)]
#[command(name = "healcoin-ledger")]
#[command(about = "Replays wallet operations against an in-memory HealCoin ledger", long_about = None)]
struct Args {
    /// TOML configuration file, layered over defaults and under HEALCOIN__* variables
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a CSV of operations and print the resulting wallets as CSV
    ///
    /// Expected format: op,actor,role,user,source,amount,reward,entry
    /// Example: cargo run -- replay ops.csv > wallets.csv
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = LedgerConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Replay { input } => {
            let file = File::open(&input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let directory = Arc::new(InMemoryDirectory::new());
            let core = HealCoinCore::from_config(&config, directory.clone(), Arc::new(SystemClock))?;

            let stats = process_operations(BufReader::new(file), &core, &directory)
                .await
                .context("Failed to replay operations")?;
            let dispatched = core.dispatcher.drain_pending().await;
            let verification = core.audit.verify_chain();
            info!(
                applied = stats.applied,
                rejected = stats.rejected,
                skipped = stats.skipped,
                dispatched = dispatched.len(),
                audit_entries = verification.verified_entries,
                chain_valid = verification.valid,
                "replay finished"
            );

            write_wallets(&core, std::io::stdout()).context("Failed to write wallets")?;
        }
    }
    Ok(())
}

/// Raw CSV record.
///
/// Fields: `op, actor, role, user, source, amount, reward, entry`. `actor`
/// defaults to `user` and `role` to `citizen`.
#[derive(Debug, Deserialize)]
struct OpRecord {
    op: String,
    #[serde(default)]
    actor: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    role: Option<Role>,
    user: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<u64>,
    #[serde(default)]
    reward: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    entry: Option<u64>,
}

impl OpRecord {
    fn caller(&self) -> Caller {
        let actor = self
            .actor
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.user);
        Caller::new(actor, self.role.unwrap_or(Role::Citizen))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    /// Operations the ledger refused (caps, duplicates, balance, ...).
    pub rejected: usize,
    /// Malformed rows and unknown ops.
    pub skipped: usize,
}

/// Applies operations from a CSV reader.
///
/// Every user and reward a row mentions is registered as active before the
/// row runs; rewards cost the amount of the first row that names them.
/// Ledger errors are counted and logged but do not stop the replay.
pub async fn process_operations<R: Read>(
    reader: R,
    core: &HealCoinCore,
    directory: &InMemoryDirectory,
) -> Result<ReplayStats, csv::Error> {
    let mut stats = ReplayStats::default();
    directory.add_partner(REPLAY_PARTNER, json!({}));

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<OpRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping malformed row");
                stats.skipped += 1;
                continue;
            }
        };
        register(directory, &record);

        match apply(core, &record).await {
            Some(Ok(())) => stats.applied += 1,
            Some(Err(e)) => {
                debug!(line = line + 2, op = %record.op, error = %e, "operation rejected");
                stats.rejected += 1;
            }
            None => {
                warn!(line = line + 2, op = %record.op, "skipping unknown or incomplete operation");
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

fn register(directory: &InMemoryDirectory, record: &OpRecord) {
    let caller = record.caller();
    directory.add_user(caller.user_id.as_str(), caller.role);
    if caller.user_id.as_str() != record.user {
        directory.add_user(record.user.as_str(), Role::Citizen);
    }
    if let (Some(reward), Some(amount)) = (record.reward.as_deref(), record.amount) {
        let reward_id = RewardId::from(reward);
        if directory.reward(&reward_id).is_none() {
            directory.add_reward(Reward {
                id: reward_id,
                partner_id: REPLAY_PARTNER.into(),
                cost: amount,
                active: true,
            });
        }
    }
}

/// Runs one operation. `None` means the row does not describe a valid operation.
async fn apply(core: &HealCoinCore, record: &OpRecord) -> Option<Result<(), LedgerError>> {
    let caller = record.caller();
    let user = UserId::from(record.user.as_str());

    let result = match record.op.to_lowercase().as_str() {
        "earn" => {
            let source = SourceId::from(record.source.as_deref()?);
            core.ledger
                .earn(&caller, &user, &source, record.amount?)
                .map(|_| ())
        }
        "redeem" => {
            let reward = record.reward.as_deref().map(RewardId::from);
            core.ledger
                .redeem(&caller, &user, record.amount?, reward.as_ref())
                .map(|_| ())
        }
        "reverse" => core
            .reversals
            .reverse(&caller, AuditEntryId(record.entry?))
            .map(|_| ()),
        "delete" => core.ledger.delete_account(&caller, &user).map(|_| ()),
        "dispatch" => {
            core.dispatcher.drain_pending().await;
            Ok(())
        }
        _ => return None,
    };
    Some(result)
}

/// Writes one balance row per wallet, ordered by user id.
///
/// Columns: `userId, healCoins, fiatBalance, lifetimeEarned, lifetimeRedeemed, isActive`
pub fn write_wallets<W: Write>(core: &HealCoinCore, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for wallet in core.store.wallets() {
        wtr.serialize(wallet.snapshot())?;
    }
    wtr.flush()?;
    Ok(())
}
