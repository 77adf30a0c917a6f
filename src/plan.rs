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

//! Investment plan catalog.
//!
//! A plan's economic terms freeze the moment its first investment lands
//! (`locked`). The lock is one-directional and idempotent; only the `active`
//! flag stays mutable afterwards.

use crate::base::{percent_of_cents, PlanId};
use crate::error::LedgerError;
use crate::store::UnitOfWork;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Period the `rate` percentage applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Hour,
    Day,
    Week,
    Month,
    Lifetime,
}

/// Investment product template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    /// Percent per period, e.g. 2.5.
    pub rate: Decimal,
    pub rate_unit: RateUnit,
    /// Number of payouts over the plan's term.
    pub period_count: u32,
    pub payout_frequency_secs: u64,
    pub min_amount_cents: i64,
    pub max_amount_cents: i64,
    /// Whether the principal returns to the investor at term end.
    pub capital_back: bool,
    /// Plan-specific referral commission percent; the engine default applies
    /// when absent.
    pub referral_percent: Option<Decimal>,
    /// Set automatically on the first investment; never cleared.
    pub locked: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Profit owed over the full term: `round(amount * rate * periods / 100)`.
    pub fn expected_profit_cents(&self, amount_cents: i64) -> i64 {
        percent_of_cents(amount_cents, self.rate * Decimal::from(self.period_count))
    }

    /// True when `amount_cents` satisfies the plan's min/max limits.
    pub fn accepts_amount(&self, amount_cents: i64) -> bool {
        amount_cents >= self.min_amount_cents && amount_cents <= self.max_amount_cents
    }
}

/// Parameters for a new plan. Plans start unlocked and active.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub rate: Decimal,
    pub rate_unit: RateUnit,
    pub period_count: u32,
    pub payout_frequency_secs: u64,
    pub min_amount_cents: i64,
    pub max_amount_cents: i64,
    pub capital_back: bool,
    pub referral_percent: Option<Decimal>,
}

/// Partial update of a plan's economic terms. Rejected once the plan locks.
#[derive(Debug, Clone, Default)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub rate: Option<Decimal>,
    pub rate_unit: Option<RateUnit>,
    pub period_count: Option<u32>,
    pub payout_frequency_secs: Option<u64>,
    pub min_amount_cents: Option<i64>,
    pub max_amount_cents: Option<i64>,
    pub capital_back: Option<bool>,
    pub referral_percent: Option<Decimal>,
}

pub(crate) fn create(uow: &mut UnitOfWork<'_>, new: NewPlan) -> PlanId {
    let id = uow.next_plan_id();
    uow.put_plan(Plan {
        id,
        name: new.name,
        rate: new.rate,
        rate_unit: new.rate_unit,
        period_count: new.period_count,
        payout_frequency_secs: new.payout_frequency_secs,
        min_amount_cents: new.min_amount_cents,
        max_amount_cents: new.max_amount_cents,
        capital_back: new.capital_back,
        referral_percent: new.referral_percent,
        locked: false,
        active: true,
        created_at: Utc::now(),
    });
    id
}

/// Applies an economic update. Fails with [`LedgerError::PlanLocked`] once
/// any investment references the plan.
pub(crate) fn update(
    uow: &mut UnitOfWork<'_>,
    plan_id: PlanId,
    update: PlanUpdate,
) -> Result<Plan, LedgerError> {
    let mut plan = uow.get_plan(plan_id).ok_or(LedgerError::PlanNotFound)?;
    if plan.locked {
        return Err(LedgerError::PlanLocked);
    }
    if let Some(name) = update.name {
        plan.name = name;
    }
    if let Some(rate) = update.rate {
        plan.rate = rate;
    }
    if let Some(rate_unit) = update.rate_unit {
        plan.rate_unit = rate_unit;
    }
    if let Some(period_count) = update.period_count {
        plan.period_count = period_count;
    }
    if let Some(payout_frequency_secs) = update.payout_frequency_secs {
        plan.payout_frequency_secs = payout_frequency_secs;
    }
    if let Some(min_amount_cents) = update.min_amount_cents {
        plan.min_amount_cents = min_amount_cents;
    }
    if let Some(max_amount_cents) = update.max_amount_cents {
        plan.max_amount_cents = max_amount_cents;
    }
    if let Some(capital_back) = update.capital_back {
        plan.capital_back = capital_back;
    }
    if let Some(referral_percent) = update.referral_percent {
        plan.referral_percent = Some(referral_percent);
    }
    uow.put_plan(plan.clone());
    Ok(plan)
}

/// Flips the `active` flag. Permitted on locked plans; activation state is
/// not an economic term.
pub(crate) fn toggle_active(uow: &mut UnitOfWork<'_>, plan_id: PlanId) -> Result<bool, LedgerError> {
    let mut plan = uow.get_plan(plan_id).ok_or(LedgerError::PlanNotFound)?;
    plan.active = !plan.active;
    let active = plan.active;
    uow.put_plan(plan);
    Ok(active)
}

/// Locks the plan the first time an investment references it. Idempotent.
pub(crate) fn lock_if_needed(uow: &mut UnitOfWork<'_>, plan_id: PlanId) -> Result<(), LedgerError> {
    let mut plan = uow.get_plan(plan_id).ok_or(LedgerError::PlanNotFound)?;
    if !plan.locked {
        plan.locked = true;
        uow.put_plan(plan);
    }
    Ok(())
}
