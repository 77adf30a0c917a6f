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

//! Error types for ledger operations.

use thiserror::Error;

/// Ledger operation errors.
///
/// Any error from a fund-moving operation means the whole unit of work was
/// aborted: no balance, transaction, investment, or referral write reached
/// the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced user does not exist
    #[error("user not found")]
    UserNotFound,

    /// No wallet exists for the (user, currency) pair
    #[error("wallet not found")]
    WalletNotFound,

    /// Referenced plan does not exist
    #[error("plan not found")]
    PlanNotFound,

    /// Referenced investment does not exist
    #[error("investment not found")]
    InvestmentNotFound,

    /// Referenced transaction does not exist
    #[error("transaction not found")]
    TransactionNotFound,

    /// Caller does not own the referenced object or lacks the capability
    #[error("forbidden")]
    Forbidden,

    /// Plan exists but is not accepting investments
    #[error("plan is not active")]
    PlanInactive,

    /// Economic terms are frozen once a plan has its first investment
    #[error("plan is locked because users have invested in it")]
    PlanLocked,

    /// Investment is not in the `Active` state
    #[error("investment is not active")]
    InvestmentNotActive,

    /// Self-cancel is only allowed before the first payout
    #[error("cannot cancel after payouts started")]
    PayoutsStarted,

    /// Completed investments accept no state-changing operation
    #[error("completed investments are immutable")]
    InvestmentCompleted,

    /// Settlement target is not a pending withdrawal
    #[error("transaction is not a pending withdrawal")]
    NotPendingWithdraw,

    /// Approval target is not a pending deposit
    #[error("transaction is not a pending deposit")]
    NotPendingDeposit,

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Amount violates the plan's min/max limits
    #[error("amount outside plan limits")]
    AmountOutOfRange,

    /// Debit would exceed the available balance
    #[error("insufficient available funds")]
    InsufficientFunds,

    /// Release or settlement would drive reserved funds negative
    #[error("release exceeds reserved funds")]
    ReservedUnderflow,

    /// Duplicate unique key (wallet per user+currency, withdrawal client ref)
    #[error("duplicate unique key")]
    Conflict,

    /// Optimistic commit kept losing to concurrent writers
    #[error("storage contention, retry the operation")]
    CommitContention,
}

impl LedgerError {
    /// True for conditions the caller cannot fix by changing the request.
    ///
    /// Systemic errors are logged server-side and surfaced generically;
    /// the rest carry enough detail for the user to correct the input.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            LedgerError::UserNotFound
                | LedgerError::WalletNotFound
                | LedgerError::PlanNotFound
                | LedgerError::InvestmentNotFound
                | LedgerError::TransactionNotFound
                | LedgerError::ReservedUnderflow
                | LedgerError::CommitContention
        )
    }
}
