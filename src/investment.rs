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

//! Investment lifecycle engine.
//!
//! Creating an investment debits-and-reserves the wallet, appends the
//! funding transaction, locks the plan, and pays the referral commission in
//! one unit of work. Cancellation reverses the reserve with a refund record.
//!
//! State machine:
//!
//!   Active ◄──resume──► Paused          (admin, no fund movement)
//!   Active | Paused ──cancel──► Cancelled   (owner before payouts; admin any time)
//!   Active ──────────► Completed        (external accrual process; terminal)

use crate::base::{Currency, InvestmentId, PlanId, UserId};
use crate::error::LedgerError;
use crate::plan;
use crate::referral::ReferralEngine;
use crate::store::UnitOfWork;
use crate::transaction::{self, NewTransaction, TxReason, TxRelated, TxStatus, TxType};
use crate::wallet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentState {
    Active,
    Paused,
    Completed,
    Cancelled,
}

/// Admin pause/resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentAction {
    Pause,
    Resume,
}

/// Capital committed to a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub amount_cents: i64,
    pub start_at: DateTime<Utc>,
    pub next_payout_at: DateTime<Utc>,
    pub payments_completed: u32,
    pub total_expected_profit_cents: i64,
    pub state: InvestmentState,
}

/// Funds an investment from the user's wallet.
///
/// All effects share the caller's unit of work: the reserve, the funding
/// transaction, the investment record, the plan lock, and the referral
/// payout commit or abort together.
pub(crate) fn create(
    uow: &mut UnitOfWork<'_>,
    referral_engine: &ReferralEngine,
    user_id: UserId,
    plan_id: PlanId,
    amount_cents: i64,
    currency: &Currency,
) -> Result<InvestmentId, LedgerError> {
    let plan = uow.get_plan(plan_id).ok_or(LedgerError::PlanNotFound)?;
    if !plan.active {
        return Err(LedgerError::PlanInactive);
    }
    if !plan.accepts_amount(amount_cents) {
        return Err(LedgerError::AmountOutOfRange);
    }

    wallet::debit_and_reserve(uow, user_id, currency, amount_cents)?;

    let id = uow.next_investment_id();
    let mut funding = NewTransaction::new(
        user_id,
        TxType::Adjustment,
        -amount_cents,
        currency.clone(),
        TxStatus::Completed,
    );
    funding.related = TxRelated::Investment(id);
    funding.meta.reason = Some(TxReason::InvestmentFunding);
    transaction::record(uow, funding);

    let now = Utc::now();
    uow.put_investment(Investment {
        id,
        user_id,
        plan_id,
        amount_cents,
        start_at: now,
        next_payout_at: now + Duration::seconds(plan.payout_frequency_secs as i64),
        payments_completed: 0,
        total_expected_profit_cents: plan.expected_profit_cents(amount_cents),
        state: InvestmentState::Active,
    });

    plan::lock_if_needed(uow, plan_id)?;
    referral_engine.pay_on_investment(uow, user_id, id, amount_cents, Some(&plan), currency)?;

    Ok(id)
}

/// Self-service cancel: owner only, active only, and only before the first
/// payout. Releases the full reservation back to the available balance.
pub(crate) fn cancel(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    investment_id: InvestmentId,
    currency: &Currency,
) -> Result<(), LedgerError> {
    let mut investment = uow
        .get_investment(investment_id)
        .ok_or(LedgerError::InvestmentNotFound)?;
    if investment.user_id != user_id {
        return Err(LedgerError::Forbidden);
    }
    if investment.state != InvestmentState::Active {
        return Err(LedgerError::InvestmentNotActive);
    }
    if investment.payments_completed > 0 {
        return Err(LedgerError::PayoutsStarted);
    }

    wallet::release_reserved_to_main(uow, user_id, currency, investment.amount_cents)?;
    investment.state = InvestmentState::Cancelled;
    let amount_cents = investment.amount_cents;
    uow.put_investment(investment);

    let mut refund = NewTransaction::new(
        user_id,
        TxType::Adjustment,
        amount_cents,
        currency.clone(),
        TxStatus::Completed,
    );
    refund.related = TxRelated::Investment(investment_id);
    refund.meta.reason = Some(TxReason::InvestmentCancelRefund);
    transaction::record(uow, refund);

    Ok(())
}

/// Privileged cancel: skips the ownership and payout-count checks. Only
/// `Active` and `Paused` investments hold a reservation to release;
/// `Completed` is terminal and `Cancelled` has already been refunded.
pub(crate) fn force_cancel(
    uow: &mut UnitOfWork<'_>,
    investment_id: InvestmentId,
    currency: &Currency,
) -> Result<(), LedgerError> {
    let mut investment = uow
        .get_investment(investment_id)
        .ok_or(LedgerError::InvestmentNotFound)?;
    match investment.state {
        InvestmentState::Completed => return Err(LedgerError::InvestmentCompleted),
        InvestmentState::Cancelled => return Err(LedgerError::InvestmentNotActive),
        InvestmentState::Active | InvestmentState::Paused => {}
    }

    wallet::release_reserved_to_main(uow, investment.user_id, currency, investment.amount_cents)?;
    investment.state = InvestmentState::Cancelled;
    let (owner, amount_cents) = (investment.user_id, investment.amount_cents);
    uow.put_investment(investment);

    let mut refund = NewTransaction::new(
        owner,
        TxType::Adjustment,
        amount_cents,
        currency.clone(),
        TxStatus::Completed,
    );
    refund.related = TxRelated::Investment(investment_id);
    refund.meta.reason = Some(TxReason::AdminForceCancel);
    transaction::record(uow, refund);

    Ok(())
}

/// Admin pause/resume. Moves no funds. `Completed` is immutable.
pub(crate) fn toggle_state(
    uow: &mut UnitOfWork<'_>,
    investment_id: InvestmentId,
    action: InvestmentAction,
) -> Result<InvestmentState, LedgerError> {
    let mut investment = uow
        .get_investment(investment_id)
        .ok_or(LedgerError::InvestmentNotFound)?;
    if investment.state == InvestmentState::Completed {
        return Err(LedgerError::InvestmentCompleted);
    }
    investment.state = match action {
        InvestmentAction::Pause => InvestmentState::Paused,
        InvestmentAction::Resume => InvestmentState::Active,
    };
    let state = investment.state;
    uow.put_investment(investment);
    Ok(state)
}
