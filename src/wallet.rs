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

//! Wallet state and balance mutation primitives.
//!
//! One wallet exists per (user, currency) pair. `main_cents` is available to
//! spend; `reserved_cents` is locked in active investments or pending
//! withdrawals. Every mutation runs inside a unit of work so the matching
//! transaction record commits or aborts together with the balance change.
//!
//! Funds move through the primitives only:
//!
//!   credit ──► main ──debit_and_reserve──► reserved ──reduce_reserved──► (out)
//!                ▲                            │
//!                └───release_reserved_to_main─┘

use crate::base::{Currency, UserId};
use crate::error::LedgerError;
use crate::store::UnitOfWork;
use serde::{Deserialize, Serialize};

/// Per-user, per-currency balance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub currency: Currency,
    /// Funds available to invest or withdraw.
    pub main_cents: i64,
    /// Funds locked in active investments or pending withdrawals.
    pub reserved_cents: i64,
    /// Accrued interest awaiting payout. No flow credits this yet; the
    /// accrual process that advances investments runs outside this crate.
    pub interest_cents: i64,
}

pub(crate) type WalletKey = (UserId, Currency);

impl Wallet {
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        Wallet {
            user_id,
            currency,
            main_cents: 0,
            reserved_cents: 0,
            interest_cents: 0,
        }
    }

    /// Returns `main + reserved`.
    pub fn total_cents(&self) -> i64 {
        self.main_cents + self.reserved_cents
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.main_cents >= 0,
            "Invariant violated: main balance went negative: {}",
            self.main_cents
        );
        debug_assert!(
            self.reserved_cents >= 0,
            "Invariant violated: reserved balance went negative: {}",
            self.reserved_cents
        );
    }

    /// Increases the available balance. Callers validate the amount before
    /// reaching this primitive.
    pub fn credit_main(&mut self, amount_cents: i64) {
        debug_assert!(amount_cents > 0, "credit amount must be positive");
        self.main_cents += amount_cents;
        self.assert_invariants();
    }

    /// Moves funds from available to reserved. Total holdings are unchanged.
    pub fn debit_and_reserve(&mut self, amount_cents: i64) -> Result<(), LedgerError> {
        debug_assert!(amount_cents > 0, "debit amount must be positive");
        if self.main_cents < amount_cents {
            return Err(LedgerError::InsufficientFunds);
        }
        self.main_cents -= amount_cents;
        self.reserved_cents += amount_cents;
        self.assert_invariants();
        Ok(())
    }

    /// Moves funds from reserved back to available (investment cancel,
    /// withdrawal reversal).
    pub fn release_reserved_to_main(&mut self, amount_cents: i64) -> Result<(), LedgerError> {
        debug_assert!(amount_cents > 0, "release amount must be positive");
        if self.reserved_cents < amount_cents {
            return Err(LedgerError::ReservedUnderflow);
        }
        self.reserved_cents -= amount_cents;
        self.main_cents += amount_cents;
        self.assert_invariants();
        Ok(())
    }

    /// Removes reserved funds from the wallet entirely (outbound settlement).
    /// There is no corresponding increment anywhere.
    pub fn reduce_reserved(&mut self, amount_cents: i64) -> Result<(), LedgerError> {
        debug_assert!(amount_cents > 0, "settlement amount must be positive");
        if self.reserved_cents < amount_cents {
            return Err(LedgerError::ReservedUnderflow);
        }
        self.reserved_cents -= amount_cents;
        self.assert_invariants();
        Ok(())
    }
}

/// Credits a wallet, creating it with zero balances when absent.
pub(crate) fn credit(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    currency: &Currency,
    amount_cents: i64,
) {
    let mut wallet = uow
        .get_wallet(user_id, currency)
        .unwrap_or_else(|| Wallet::new(user_id, currency.clone()));
    wallet.credit_main(amount_cents);
    uow.put_wallet(wallet);
}

/// Debits the available balance and reserves the same amount.
///
/// A missing wallet has nothing to spend, so it fails the same way an
/// underfunded one does.
pub(crate) fn debit_and_reserve(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    currency: &Currency,
    amount_cents: i64,
) -> Result<(), LedgerError> {
    let mut wallet = uow
        .get_wallet(user_id, currency)
        .ok_or(LedgerError::InsufficientFunds)?;
    wallet.debit_and_reserve(amount_cents)?;
    uow.put_wallet(wallet);
    Ok(())
}

/// Returns previously reserved funds to the available balance.
pub(crate) fn release_reserved_to_main(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    currency: &Currency,
    amount_cents: i64,
) -> Result<(), LedgerError> {
    let mut wallet = uow
        .get_wallet(user_id, currency)
        .ok_or(LedgerError::WalletNotFound)?;
    wallet.release_reserved_to_main(amount_cents)?;
    uow.put_wallet(wallet);
    Ok(())
}

/// Settles previously reserved funds out of the system.
pub(crate) fn reduce_reserved(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    currency: &Currency,
    amount_cents: i64,
) -> Result<(), LedgerError> {
    let mut wallet = uow
        .get_wallet(user_id, currency)
        .ok_or(LedgerError::WalletNotFound)?;
    wallet.reduce_reserved(amount_cents)?;
    uow.put_wallet(wallet);
    Ok(())
}
