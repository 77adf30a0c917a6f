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

//! Transaction records and the append-only recorder.
//!
//! Every balance mutation commits together with a transaction record in the
//! same unit of work; a wallet change with no matching record is a
//! consistency bug. The log is append-only and nothing is ever deleted.
//! Once `status` reaches a terminal value a record only accepts late
//! metadata (failure timestamp, provider reference).
//!
//! Sign convention: `amount_cents` is positive when the net effect credits
//! the user's total holdings and negative when it debits them, regardless
//! of `tx_type`.

use crate::base::{Currency, InvestmentId, TxId, UserId};
use crate::store::UnitOfWork;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Deposit,
    Withdraw,
    Payout,
    Fee,
    Referral,
    Adjustment,
}

/// Lifecycle of a transaction record. `Completed`, `Failed`, and `Rejected`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
    Rejected,
}

/// Back-reference from a transaction to the object that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TxRelated {
    #[default]
    None,
    Investment(InvestmentId),
}

/// Why an adjustment was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxReason {
    InvestmentFunding,
    InvestmentCancelRefund,
    AdminForceCancel,
}

/// Metadata attached to a record, typed where flows depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMeta {
    pub reason: Option<TxReason>,
    /// Referred user a referral commission was paid for.
    pub referee: Option<UserId>,
    /// Destination reference supplied with a withdrawal request.
    pub destination: Option<String>,
    /// Platform receiving address recorded on crypto deposit requests.
    pub wallet_address: Option<String>,
    /// Late metadata: when a withdrawal failure was handled.
    pub failed_at: Option<DateTime<Utc>>,
}

/// Immutable audit record of a balance-affecting event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub user_id: UserId,
    pub tx_type: TxType,
    pub amount_cents: i64,
    pub currency: Currency,
    pub fee_cents: i64,
    pub status: TxStatus,
    pub provider: Option<String>,
    pub provider_tx_id: Option<String>,
    pub related: TxRelated,
    /// Client-supplied idempotency reference for withdrawal requests.
    pub client_ref: Option<String>,
    pub meta: TxMeta,
    pub created_at: DateTime<Utc>,
}

/// Fields for a record about to enter the log.
#[derive(Debug, Clone)]
pub(crate) struct NewTransaction {
    pub user_id: UserId,
    pub tx_type: TxType,
    pub amount_cents: i64,
    pub currency: Currency,
    pub status: TxStatus,
    pub provider: Option<String>,
    pub provider_tx_id: Option<String>,
    pub related: TxRelated,
    pub client_ref: Option<String>,
    pub meta: TxMeta,
}

impl NewTransaction {
    pub(crate) fn new(
        user_id: UserId,
        tx_type: TxType,
        amount_cents: i64,
        currency: Currency,
        status: TxStatus,
    ) -> Self {
        NewTransaction {
            user_id,
            tx_type,
            amount_cents,
            currency,
            status,
            provider: None,
            provider_tx_id: None,
            related: TxRelated::None,
            client_ref: None,
            meta: TxMeta::default(),
        }
    }
}

/// Appends a transaction inside the caller's unit of work and returns its id.
///
/// Always called in the same unit as the wallet mutation it documents, never
/// separately.
pub(crate) fn record(uow: &mut UnitOfWork<'_>, new: NewTransaction) -> TxId {
    let id = uow.next_tx_id();
    let tx = Transaction {
        id,
        user_id: new.user_id,
        tx_type: new.tx_type,
        amount_cents: new.amount_cents,
        currency: new.currency,
        fee_cents: 0,
        status: new.status,
        provider: new.provider,
        provider_tx_id: new.provider_tx_id,
        related: new.related,
        client_ref: new.client_ref,
        meta: new.meta,
        created_at: Utc::now(),
    };
    uow.append_transaction(tx);
    id
}
