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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use invest_ledger_rs::{
    Admin, InvestmentId, Ledger, NewPlan, PlanId, Principal, Role, TxId, UserId, WithdrawalAction,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Invest Ledger - Replay operation CSV files
///
/// Seeds the plan catalog, replays ledger operations from a CSV file, and
/// outputs wallet states to stdout.
#[derive(Parser, Debug)]
#[command(name = "invest-ledger-rs")]
#[command(about = "A ledger engine that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with plan definitions
    ///
    /// Expected format:
    /// name,rate,rate_unit,period_count,payout_frequency_secs,min_amount_cents,max_amount_cents,capital_back,referral_percent
    #[arg(long, value_name = "FILE")]
    plans: Option<PathBuf>,

    /// Path to CSV file with operations
    ///
    /// Expected format: op,user,ref,amount
    /// Example: cargo run -- --plans plans.csv operations.csv > wallets.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();
    let ledger = Ledger::new();

    // Seed the plan catalog first so operation rows can reference plans by
    // their row number.
    let plans = match &args.plans {
        Some(path) => {
            let file = match File::open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Error opening plans file '{}': {}", path.display(), e);
                    process::exit(1);
                }
            };
            match seed_plans(BufReader::new(file), &ledger) {
                Ok(plans) => plans,
                Err(e) => {
                    eprintln!("Error seeding plans: {}", e);
                    process::exit(1);
                }
            }
        }
        None => Vec::new(),
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let replay = match process_operations(BufReader::new(file), ledger, plans) {
        Ok(replay) => replay,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_wallets(&replay.ledger, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the operations format.
///
/// Fields: `op, user, ref, amount`
/// - `op`: register, deposit, invest, cancel, withdraw, complete, fail
/// - `user`: caller label, registered on first use
/// - `ref`: referrer label (register), plan row (invest), investment row
///   (cancel), or withdrawal row (complete/fail)
/// - `amount`: integer minor-currency units where the operation takes one
#[derive(Debug, Deserialize)]
struct OpRecord {
    op: String,
    #[serde(default)]
    user: String,
    #[serde(rename = "ref", default)]
    reference: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<i64>,
}

/// Replay state: the ledger plus the label/row-number indirections the CSV
/// format uses in place of store-assigned ids.
pub struct Replay {
    pub ledger: Ledger,
    users: HashMap<String, UserId>,
    plans: Vec<PlanId>,
    investments: Vec<InvestmentId>,
    withdrawals: Vec<TxId>,
}

impl Replay {
    fn new(ledger: Ledger, plans: Vec<PlanId>) -> Self {
        Replay {
            ledger,
            users: HashMap::new(),
            plans,
            investments: Vec::new(),
            withdrawals: Vec::new(),
        }
    }

    /// Resolves a user label, registering it without a referrer on first use.
    fn user_id(&mut self, label: &str) -> Option<UserId> {
        if label.is_empty() {
            return None;
        }
        if let Some(id) = self.users.get(label) {
            return Some(*id);
        }
        match self.ledger.register_user(None) {
            Ok(id) => {
                self.users.insert(label.to_owned(), id);
                Some(id)
            }
            Err(e) => {
                tracing::debug!(label, error = %e, "skipping user registration");
                None
            }
        }
    }

    fn apply(&mut self, admin: Admin<'_>, record: OpRecord) {
        let outcome = match record.op.to_lowercase().as_str() {
            "register" => self.apply_register(&record),
            "deposit" => self.apply_deposit(admin, &record),
            "invest" => self.apply_invest(&record),
            "cancel" => self.apply_cancel(&record),
            "withdraw" => self.apply_withdraw(&record),
            "complete" => self.apply_settle(admin, &record, WithdrawalAction::Complete),
            "fail" => self.apply_settle(admin, &record, WithdrawalAction::Fail),
            other => {
                tracing::debug!(op = other, "skipping unknown operation");
                return;
            }
        };
        if let Err(e) = outcome {
            tracing::debug!(op = record.op, user = record.user, "skipping row: {}", e);
        }
    }

    fn apply_register(&mut self, record: &OpRecord) -> Result<(), String> {
        if record.user.is_empty() {
            return Err("missing user label".to_owned());
        }
        if self.users.contains_key(&record.user) {
            return Err("label already registered".to_owned());
        }
        let referred_by = if record.reference.is_empty() {
            None
        } else {
            Some(
                self.user_id(&record.reference)
                    .ok_or("unresolvable referrer")?,
            )
        };
        let id = self
            .ledger
            .register_user(referred_by)
            .map_err(|e| e.to_string())?;
        self.users.insert(record.user.clone(), id);
        Ok(())
    }

    fn apply_deposit(&mut self, admin: Admin<'_>, record: &OpRecord) -> Result<(), String> {
        let user = self.user_id(&record.user).ok_or("unresolvable user")?;
        let amount = record.amount.ok_or("missing amount")?;
        self.ledger
            .deposit(admin, user, amount, None, None, None)
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn apply_invest(&mut self, record: &OpRecord) -> Result<(), String> {
        let user = self.user_id(&record.user).ok_or("unresolvable user")?;
        let plan_id = *row_ref(&self.plans, &record.reference).ok_or("unknown plan row")?;
        let amount = record.amount.ok_or("missing amount")?;
        let principal = Principal::new(user, Role::User);
        let id = self
            .ledger
            .create_investment(&principal, plan_id, amount)
            .map_err(|e| e.to_string())?;
        self.investments.push(id);
        Ok(())
    }

    fn apply_cancel(&mut self, record: &OpRecord) -> Result<(), String> {
        let user = self.user_id(&record.user).ok_or("unresolvable user")?;
        let investment_id =
            *row_ref(&self.investments, &record.reference).ok_or("unknown investment row")?;
        let principal = Principal::new(user, Role::User);
        self.ledger
            .cancel_investment(&principal, investment_id)
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn apply_withdraw(&mut self, record: &OpRecord) -> Result<(), String> {
        let user = self.user_id(&record.user).ok_or("unresolvable user")?;
        let amount = record.amount.ok_or("missing amount")?;
        let principal = Principal::new(user, Role::User);
        let tx_id = self
            .ledger
            .request_withdrawal(&principal, amount, None, None)
            .map_err(|e| e.to_string())?;
        self.withdrawals.push(tx_id);
        Ok(())
    }

    fn apply_settle(
        &mut self,
        admin: Admin<'_>,
        record: &OpRecord,
        action: WithdrawalAction,
    ) -> Result<(), String> {
        let tx_id =
            *row_ref(&self.withdrawals, &record.reference).ok_or("unknown withdrawal row")?;
        self.ledger
            .process_withdrawal(admin, tx_id, action, 0, None)
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Resolves a 1-based row number into a replay-assigned id list.
fn row_ref<'a, T>(rows: &'a [T], raw: &str) -> Option<&'a T> {
    let row: usize = raw.parse().ok()?;
    rows.get(row.checked_sub(1)?)
}

/// Seeds the plan catalog from a CSV reader, returning ids in row order.
///
/// Malformed rows are skipped, matching the operations replay.
pub fn seed_plans<R: Read>(reader: R, ledger: &Ledger) -> Result<Vec<PlanId>, csv::Error> {
    let operator = Principal::new(UserId(0), Role::SuperAdmin);
    let admin = match operator.admin() {
        Ok(token) => token,
        Err(_) => unreachable!("super-admin carries the admin capability"),
    };

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut plans = Vec::new();
    for result in rdr.deserialize::<NewPlan>() {
        match result {
            Ok(new_plan) => match ledger.create_plan(admin, new_plan) {
                Ok(id) => plans.push(id),
                Err(e) => tracing::debug!(error = %e, "skipping plan row"),
            },
            Err(e) => {
                tracing::debug!("skipping malformed plan row: {}", e);
                continue;
            }
        }
    }
    Ok(plans)
}

/// Replays operations from a CSV reader against the ledger.
///
/// Streaming parse; malformed rows and rejected operations are skipped so a
/// single bad row never aborts the replay.
///
/// # CSV Format
///
/// Expected columns: `op, user, ref, amount`
///
/// # Example
///
/// ```csv
/// op,user,ref,amount
/// deposit,alice,,10000
/// invest,alice,1,5000
/// withdraw,alice,,2000
/// complete,,1,
/// ```
pub fn process_operations<R: Read>(
    reader: R,
    ledger: Ledger,
    plans: Vec<PlanId>,
) -> Result<Replay, csv::Error> {
    let operator = Principal::new(UserId(0), Role::SuperAdmin);
    let admin = match operator.admin() {
        Ok(token) => token,
        Err(_) => unreachable!("super-admin carries the admin capability"),
    };

    let mut replay = Replay::new(ledger, plans);
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<OpRecord>() {
        match result {
            Ok(record) => replay.apply(admin, record),
            Err(e) => {
                tracing::debug!("skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(replay)
}

/// Wallet state row written to the output CSV.
#[derive(Debug, Serialize)]
struct WalletRow {
    user: u64,
    currency: String,
    main_cents: i64,
    reserved_cents: i64,
    total_cents: i64,
}

/// Writes all wallet states as CSV, ordered by user id.
pub fn write_wallets<W: Write>(ledger: &Ledger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for wallet in ledger.wallets() {
        wtr.serialize(WalletRow {
            user: wallet.user_id.0,
            currency: wallet.currency.0.clone(),
            main_cents: wallet.main_cents,
            reserved_cents: wallet.reserved_cents,
            total_cents: wallet.total_cents(),
        })?;
    }

    wtr.flush()?;
    Ok(())
}
