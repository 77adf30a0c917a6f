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

//! # Invest Ledger
//!
//! This library is the wallet/transaction consistency engine of a
//! fixed-income investment platform: users deposit funds, place them into
//! interest-bearing plans, earn referral commissions, and request
//! withdrawals.
//!
//! ## Core Components
//!
//! - [`Ledger`]: facade running each operation as one atomic unit of work
//! - [`Wallet`]: per-(user, currency) balances with the main/reserved split
//! - [`Transaction`]: append-only audit record of every balance change
//! - [`Investment`] / [`Plan`]: capital committed to a product template
//! - [`ReferralEngine`]: idempotent one-level commission payouts
//! - [`LedgerError`]: error taxonomy for every rejected operation
//!
//! ## Example
//!
//! ```
//! use invest_ledger_rs::{Currency, Ledger, Principal, Role, UserId};
//!
//! let ledger = Ledger::new();
//! let operations = Principal::new(UserId(0), Role::Admin);
//!
//! let user = ledger.register_user(None).unwrap();
//! let token = operations.admin().unwrap();
//! ledger.deposit(token, user, 10_000, None, None, None).unwrap();
//!
//! let wallet = ledger.wallet(user, &Currency::usd()).unwrap();
//! assert_eq!(wallet.main_cents, 10_000);
//! assert_eq!(wallet.reserved_cents, 0);
//! ```
//!
//! ## Consistency
//!
//! Every operation either applies all of its record writes (wallet balances,
//! transaction log, investments, referrals, plan lock) or none of them. The
//! store validates optimistically and retries on write conflicts, so
//! concurrent mutations of one wallet serialize without explicit locks.

mod base;
mod deposit;
mod engine;
pub mod error;
mod investment;
mod plan;
mod principal;
mod referral;
mod store;
mod transaction;
mod user;
mod wallet;
mod withdrawal;

pub use base::{Currency, InvestmentId, PlanId, TxId, UserId};
pub use engine::{Ledger, LedgerConfig};
pub use error::LedgerError;
pub use investment::{Investment, InvestmentAction, InvestmentState};
pub use plan::{NewPlan, Plan, PlanUpdate, RateUnit};
pub use principal::{Admin, Principal, Role, SuperAdmin};
pub use referral::{Referral, ReferralEngine, ReferralOutcome};
pub use transaction::{
    Transaction, TxMeta, TxReason, TxRelated, TxStatus, TxType,
};
pub use user::User;
pub use wallet::Wallet;
pub use withdrawal::WithdrawalAction;
