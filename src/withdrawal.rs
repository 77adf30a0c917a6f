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

//! Two-phase withdrawal workflow.
//!
//! Per withdrawal transaction: `Pending -> Completed` or `Pending -> Failed`,
//! nothing else. The request phase reserves funds without sending anything;
//! settlement either reduces the reservation out of the system or reverses
//! it in full.

use crate::base::{Currency, TxId, UserId};
use crate::error::LedgerError;
use crate::store::UnitOfWork;
use crate::transaction::{self, NewTransaction, TxStatus, TxType};
use crate::wallet;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Admin settlement decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalAction {
    Complete,
    Fail,
}

/// Reserves funds and appends a pending withdrawal record.
///
/// `client_ref` makes retried requests idempotent: a second request carrying
/// the same reference returns the transaction already created instead of
/// reserving again. Two racing retries cannot both commit because the
/// reference participates in the unit of work's uniqueness validation.
pub(crate) fn request(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    currency: &Currency,
    amount_cents: i64,
    destination: Option<&str>,
    client_ref: Option<&str>,
) -> Result<TxId, LedgerError> {
    if let Some(client_ref) = client_ref {
        if let Some(existing) = uow.get_withdrawal_ref(user_id, client_ref) {
            return Ok(existing);
        }
    }

    wallet::debit_and_reserve(uow, user_id, currency, amount_cents)?;

    let mut new_tx = NewTransaction::new(
        user_id,
        TxType::Withdraw,
        -amount_cents,
        currency.clone(),
        TxStatus::Pending,
    );
    new_tx.meta.destination = destination.map(str::to_owned);
    new_tx.client_ref = client_ref.map(str::to_owned);
    let tx_id = transaction::record(uow, new_tx);

    if let Some(client_ref) = client_ref {
        uow.put_withdrawal_ref(user_id, client_ref.to_owned(), tx_id);
    }

    Ok(tx_id)
}

/// Settles or reverses a pending withdrawal.
///
/// The target must be exactly `{type: withdraw, status: pending}`; anything
/// else fails without touching a wallet.
pub(crate) fn process(
    uow: &mut UnitOfWork<'_>,
    tx_id: TxId,
    action: WithdrawalAction,
    fee_cents: i64,
    provider_tx_id: Option<&str>,
) -> Result<(), LedgerError> {
    let mut tx = uow
        .get_transaction(tx_id)
        .ok_or(LedgerError::TransactionNotFound)?;
    if tx.tx_type != TxType::Withdraw || tx.status != TxStatus::Pending {
        return Err(LedgerError::NotPendingWithdraw);
    }

    let currency = tx.currency.clone();
    let amount_cents = tx.amount_cents.abs();
    match action {
        WithdrawalAction::Complete => {
            // Funds leave the system permanently.
            wallet::reduce_reserved(uow, tx.user_id, &currency, amount_cents)?;
            tx.fee_cents = fee_cents;
            tx.provider_tx_id = provider_tx_id.map(str::to_owned);
            tx.status = TxStatus::Completed;
        }
        WithdrawalAction::Fail => {
            // Full reversal back to the available balance.
            wallet::release_reserved_to_main(uow, tx.user_id, &currency, amount_cents)?;
            tx.status = TxStatus::Failed;
            tx.meta.failed_at = Some(Utc::now());
        }
    }
    uow.put_transaction(tx);

    Ok(())
}
