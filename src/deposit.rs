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

//! Deposit entry points.
//!
//! Manual/provider deposits credit immediately. Crypto deposits are a
//! two-step flow: the user-facing request creates a pending record and the
//! credit happens only at privileged approval, never at request time.

use crate::base::{Currency, TxId, UserId};
use crate::error::LedgerError;
use crate::store::UnitOfWork;
use crate::transaction::{self, NewTransaction, TxStatus, TxType};
use crate::wallet;

pub(crate) const MANUAL_PROVIDER: &str = "manual";
pub(crate) const CRYPTO_PROVIDER: &str = "crypto-manual";

/// Credits the wallet and appends a completed deposit record in one unit.
pub(crate) fn create(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    amount_cents: i64,
    currency: &Currency,
    provider: Option<&str>,
    provider_tx_id: Option<&str>,
) -> Result<TxId, LedgerError> {
    let mut new_tx = NewTransaction::new(
        user_id,
        TxType::Deposit,
        amount_cents,
        currency.clone(),
        TxStatus::Completed,
    );
    new_tx.provider = Some(provider.unwrap_or(MANUAL_PROVIDER).to_owned());
    new_tx.provider_tx_id = provider_tx_id.map(str::to_owned);
    let tx_id = transaction::record(uow, new_tx);

    wallet::credit(uow, user_id, currency, amount_cents);
    Ok(tx_id)
}

/// Records a pending crypto deposit. No funds move until approval.
pub(crate) fn request_crypto(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    amount_cents: i64,
    currency: &Currency,
    receiving_address: Option<&str>,
) -> Result<TxId, LedgerError> {
    let mut new_tx = NewTransaction::new(
        user_id,
        TxType::Deposit,
        amount_cents,
        currency.clone(),
        TxStatus::Pending,
    );
    new_tx.provider = Some(CRYPTO_PROVIDER.to_owned());
    new_tx.meta.wallet_address = receiving_address.map(str::to_owned);
    Ok(transaction::record(uow, new_tx))
}

/// Approves a pending crypto deposit: `Pending -> Completed` plus the wallet
/// credit, atomically. A second approval finds the record completed and
/// fails without crediting again.
pub(crate) fn approve_crypto(uow: &mut UnitOfWork<'_>, tx_id: TxId) -> Result<(), LedgerError> {
    let mut tx = uow
        .get_transaction(tx_id)
        .ok_or(LedgerError::TransactionNotFound)?;
    if tx.tx_type != TxType::Deposit || tx.status != TxStatus::Pending {
        return Err(LedgerError::NotPendingDeposit);
    }

    tx.status = TxStatus::Completed;
    let (user_id, currency, amount_cents) = (tx.user_id, tx.currency.clone(), tx.amount_cents);
    uow.put_transaction(tx);

    wallet::credit(uow, user_id, &currency, amount_cents);
    Ok(())
}
