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

//! Referral commission engine.
//!
//! One commission per (referrer, referee) pair, paid on the referee's first
//! qualifying investment. The `paid` flag is terminal: replays return the
//! recorded result without moving funds again, whatever amount the retry
//! carries. The engine always runs inside the caller's unit of work, so a
//! failed investment never leaves a half-paid commission behind.

use crate::base::{percent_of_cents, Currency, InvestmentId, TxId, UserId};
use crate::error::LedgerError;
use crate::plan::Plan;
use crate::store::UnitOfWork;
use crate::transaction::{self, NewTransaction, TxStatus, TxType};
use crate::wallet;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Commission record for one (referrer, referee) pair. Uniqueness of the
/// pair is what makes the payout idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub referrer_id: UserId,
    pub referee_id: UserId,
    /// Always 1; the platform pays no multi-level chains.
    pub level: u8,
    pub commission_cents: i64,
    /// Terminal once true.
    pub paid: bool,
    pub related_tx_id: Option<TxId>,
    pub created_at: DateTime<Utc>,
}

pub(crate) type ReferralKey = (UserId, UserId);

impl Referral {
    fn new(referrer_id: UserId, referee_id: UserId) -> Self {
        Referral {
            referrer_id,
            referee_id,
            level: 1,
            commission_cents: 0,
            paid: false,
            related_tx_id: None,
            created_at: Utc::now(),
        }
    }
}

/// What a payout invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// The investor has no referrer; nothing to do.
    NoReferrer,
    /// The pair was already paid; the original result stands.
    AlreadyPaid { commission_cents: i64 },
    /// Commission computed to zero; the record closed without payment.
    ClosedZero,
    /// Commission credited to the referrer in this unit of work.
    Paid { commission_cents: i64, tx_id: TxId },
}

/// Pays referral commissions with an explicitly configured default percent.
#[derive(Debug, Clone)]
pub struct ReferralEngine {
    default_percent: Decimal,
}

impl ReferralEngine {
    pub fn new(default_percent: Decimal) -> Self {
        ReferralEngine { default_percent }
    }

    /// Commission for an investment amount: the plan override when present,
    /// the configured default otherwise.
    pub fn commission_cents(&self, amount_cents: i64, plan: Option<&Plan>) -> i64 {
        let percent = plan
            .and_then(|p| p.referral_percent)
            .unwrap_or(self.default_percent);
        percent_of_cents(amount_cents, percent)
    }

    /// Resolves the referee's referrer and pays the commission once.
    ///
    /// Referral earnings skip the reserve step; they land directly in the
    /// referrer's available balance, creating the wallet if needed.
    pub(crate) fn pay_on_investment(
        &self,
        uow: &mut UnitOfWork<'_>,
        referee_id: UserId,
        investment_id: InvestmentId,
        amount_cents: i64,
        plan: Option<&Plan>,
        currency: &Currency,
    ) -> Result<ReferralOutcome, LedgerError> {
        let referee = uow.get_user(referee_id).ok_or(LedgerError::UserNotFound)?;
        let Some(referrer_id) = referee.referred_by else {
            return Ok(ReferralOutcome::NoReferrer);
        };

        let mut referral = uow
            .get_referral(referrer_id, referee_id)
            .unwrap_or_else(|| Referral::new(referrer_id, referee_id));
        if referral.paid {
            return Ok(ReferralOutcome::AlreadyPaid {
                commission_cents: referral.commission_cents,
            });
        }

        let commission_cents = self.commission_cents(amount_cents, plan);
        if commission_cents <= 0 {
            // Close the record permanently so it is never reprocessed.
            referral.commission_cents = 0;
            referral.paid = true;
            uow.put_referral(referral);
            return Ok(ReferralOutcome::ClosedZero);
        }

        wallet::credit(uow, referrer_id, currency, commission_cents);

        let mut new_tx = NewTransaction::new(
            referrer_id,
            TxType::Referral,
            commission_cents,
            currency.clone(),
            TxStatus::Completed,
        );
        new_tx.related = crate::transaction::TxRelated::Investment(investment_id);
        new_tx.meta.referee = Some(referee_id);
        let tx_id = transaction::record(uow, new_tx);

        referral.commission_cents = commission_cents;
        referral.paid = true;
        referral.related_tx_id = Some(tx_id);
        uow.put_referral(referral);

        Ok(ReferralOutcome::Paid {
            commission_cents,
            tx_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RateUnit;
    use crate::PlanId;
    use rust_decimal_macros::dec;

    fn plan_with_override(referral_percent: Option<Decimal>) -> Plan {
        Plan {
            id: PlanId(1),
            name: "Gold".to_owned(),
            rate: dec!(1),
            rate_unit: RateUnit::Day,
            period_count: 10,
            payout_frequency_secs: 86_400,
            min_amount_cents: 100,
            max_amount_cents: 1_000_000,
            capital_back: true,
            referral_percent,
            locked: false,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn default_percent_applies_without_override() {
        let engine = ReferralEngine::new(dec!(5));
        assert_eq!(engine.commission_cents(10_000, None), 500);
        let plan = plan_with_override(None);
        assert_eq!(engine.commission_cents(10_000, Some(&plan)), 500);
    }

    #[test]
    fn plan_override_wins() {
        let engine = ReferralEngine::new(dec!(5));
        let plan = plan_with_override(Some(dec!(10)));
        assert_eq!(engine.commission_cents(10_000, Some(&plan)), 1_000);
    }

    #[test]
    fn commission_rounds_midpoint_up() {
        let engine = ReferralEngine::new(dec!(5));
        // 5% of 10 cents = 0.5 -> 1
        assert_eq!(engine.commission_cents(10, None), 1);
        // 5% of 9 cents = 0.45 -> 0
        assert_eq!(engine.commission_cents(9, None), 0);
    }
}
