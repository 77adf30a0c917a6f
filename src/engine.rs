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

//! Ledger facade.
//!
//! One public entry point per externally triggered operation. Each call
//! opens exactly one unit of work against the store, runs the engine
//! modules inside it, and commits or aborts as a whole. Callers arrive
//! pre-authenticated: user-level operations take a [`Principal`], privileged
//! ones take the capability token the dispatcher resolved.

use crate::base::{Currency, InvestmentId, PlanId, TxId, UserId};
use crate::deposit;
use crate::error::LedgerError;
use crate::investment::{self, Investment, InvestmentAction, InvestmentState};
use crate::plan::{self, NewPlan, Plan, PlanUpdate};
use crate::principal::{Admin, Principal, SuperAdmin};
use crate::referral::{Referral, ReferralEngine};
use crate::store::Store;
use crate::transaction::{Transaction, TxStatus, TxType};
use crate::user::User;
use crate::wallet::Wallet;
use crate::withdrawal::{self, WithdrawalAction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Engine-wide configuration. Nothing here is ambient state; every knob is
/// an explicit value handed to the engine at construction.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Referral commission percent when a plan carries no override.
    pub default_commission_percent: Decimal,
    /// Currency of wallets created at registration and used by flows that
    /// do not name one.
    pub default_currency: Currency,
    /// Platform receiving address stamped on crypto deposit requests.
    pub crypto_receiving_address: Option<String>,
    /// Optimistic commit attempts before an operation gives up.
    pub max_commit_retries: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            default_commission_percent: dec!(5),
            default_currency: Currency::usd(),
            crypto_receiving_address: None,
            max_commit_retries: 8,
        }
    }
}

/// The wallet/transaction consistency engine.
pub struct Ledger {
    store: Store,
    referral: ReferralEngine,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Ledger {
            store: Store::new(config.max_commit_retries),
            referral: ReferralEngine::new(config.default_commission_percent),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn observe<T>(op: &'static str, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
        if let Err(err) = &result {
            if err.is_systemic() {
                tracing::warn!(op, error = %err, "ledger operation failed");
            } else {
                tracing::debug!(op, error = %err, "ledger operation rejected");
            }
        }
        result
    }

    // --- registration ---

    /// Creates a user and their zero-balance wallet atomically.
    ///
    /// A claimed referrer must exist; the referral edge is fixed at
    /// registration and read by the referral engine on the first investment.
    pub fn register_user(&self, referred_by: Option<UserId>) -> Result<UserId, LedgerError> {
        let result = self.store.transact(|uow| {
            if let Some(referrer_id) = referred_by {
                uow.get_user(referrer_id).ok_or(LedgerError::UserNotFound)?;
            }
            let user_id = uow.next_user_id();
            uow.put_user(User::new(user_id, referred_by));
            if uow
                .get_wallet(user_id, &self.config.default_currency)
                .is_some()
            {
                return Err(LedgerError::Conflict);
            }
            uow.put_wallet(Wallet::new(user_id, self.config.default_currency.clone()));
            Ok(user_id)
        });
        Self::observe("register_user", result)
    }

    // --- deposits ---

    /// Admin/provider deposit: credits the wallet and appends a completed
    /// deposit record in one unit.
    pub fn deposit(
        &self,
        _admin: Admin<'_>,
        user_id: UserId,
        amount_cents: i64,
        currency: Option<Currency>,
        provider: Option<&str>,
        provider_tx_id: Option<&str>,
    ) -> Result<TxId, LedgerError> {
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let currency = currency.unwrap_or_else(|| self.config.default_currency.clone());
        let result = self.store.transact(|uow| {
            deposit::create(uow, user_id, amount_cents, &currency, provider, provider_tx_id)
        });
        if let Ok(tx_id) = &result {
            tracing::debug!(user = user_id.0, amount_cents, tx = tx_id.0, "deposit applied");
        }
        Self::observe("deposit", result)
    }

    /// User-facing crypto deposit request. Creates a pending record only;
    /// the credit happens at approval.
    pub fn request_crypto_deposit(
        &self,
        principal: &Principal,
        amount_cents: i64,
    ) -> Result<TxId, LedgerError> {
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let user_id = principal.user_id;
        let result = self.store.transact(|uow| {
            deposit::request_crypto(
                uow,
                user_id,
                amount_cents,
                &self.config.default_currency,
                self.config.crypto_receiving_address.as_deref(),
            )
        });
        Self::observe("request_crypto_deposit", result)
    }

    /// Privileged approval of a pending crypto deposit.
    pub fn approve_crypto_deposit(
        &self,
        _admin: Admin<'_>,
        tx_id: TxId,
    ) -> Result<(), LedgerError> {
        let result = self.store.transact(|uow| deposit::approve_crypto(uow, tx_id));
        Self::observe("approve_crypto_deposit", result)
    }

    // --- investments ---

    /// Funds an investment from the caller's wallet, locks the plan on its
    /// first use, and pays the referral commission, all in one unit.
    pub fn create_investment(
        &self,
        principal: &Principal,
        plan_id: PlanId,
        amount_cents: i64,
    ) -> Result<InvestmentId, LedgerError> {
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let user_id = principal.user_id;
        let result = self.store.transact(|uow| {
            investment::create(
                uow,
                &self.referral,
                user_id,
                plan_id,
                amount_cents,
                &self.config.default_currency,
            )
        });
        if let Ok(investment_id) = &result {
            tracing::debug!(
                user = user_id.0,
                plan = plan_id.0,
                amount_cents,
                investment = investment_id.0,
                "investment created"
            );
        }
        Self::observe("create_investment", result)
    }

    /// Owner self-cancel before the first payout.
    pub fn cancel_investment(
        &self,
        principal: &Principal,
        investment_id: InvestmentId,
    ) -> Result<(), LedgerError> {
        let user_id = principal.user_id;
        let result = self.store.transact(|uow| {
            investment::cancel(uow, user_id, investment_id, &self.config.default_currency)
        });
        Self::observe("cancel_investment", result)
    }

    /// Super-admin cancel, regardless of ownership or payout count.
    pub fn force_cancel_investment(
        &self,
        _super_admin: SuperAdmin<'_>,
        investment_id: InvestmentId,
    ) -> Result<(), LedgerError> {
        let result = self.store.transact(|uow| {
            investment::force_cancel(uow, investment_id, &self.config.default_currency)
        });
        Self::observe("force_cancel_investment", result)
    }

    /// Admin pause/resume. Moves no funds.
    pub fn toggle_investment_state(
        &self,
        _admin: Admin<'_>,
        investment_id: InvestmentId,
        action: InvestmentAction,
    ) -> Result<InvestmentState, LedgerError> {
        let result = self
            .store
            .transact(|uow| investment::toggle_state(uow, investment_id, action));
        Self::observe("toggle_investment_state", result)
    }

    // --- withdrawals ---

    /// Reserves funds and appends a pending withdrawal. A repeated request
    /// carrying the same `client_ref` returns the original transaction.
    pub fn request_withdrawal(
        &self,
        principal: &Principal,
        amount_cents: i64,
        destination: Option<&str>,
        client_ref: Option<&str>,
    ) -> Result<TxId, LedgerError> {
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let user_id = principal.user_id;
        let result = self.store.transact(|uow| {
            withdrawal::request(
                uow,
                user_id,
                &self.config.default_currency,
                amount_cents,
                destination,
                client_ref,
            )
        });
        if let Ok(tx_id) = &result {
            tracing::debug!(user = user_id.0, amount_cents, tx = tx_id.0, "withdrawal requested");
        }
        Self::observe("request_withdrawal", result)
    }

    /// Privileged settlement of a pending withdrawal: complete (funds leave
    /// the system, optional fee recorded) or fail (full reversal).
    pub fn process_withdrawal(
        &self,
        _admin: Admin<'_>,
        tx_id: TxId,
        action: WithdrawalAction,
        fee_cents: i64,
        provider_tx_id: Option<&str>,
    ) -> Result<(), LedgerError> {
        if fee_cents < 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let result = self
            .store
            .transact(|uow| withdrawal::process(uow, tx_id, action, fee_cents, provider_tx_id));
        if result.is_ok() {
            tracing::debug!(tx = tx_id.0, ?action, "withdrawal settled");
        }
        Self::observe("process_withdrawal", result)
    }

    // --- plan catalog ---

    pub fn create_plan(&self, _admin: Admin<'_>, new_plan: NewPlan) -> Result<PlanId, LedgerError> {
        let result = self.store.transact(|uow| Ok(plan::create(uow, new_plan.clone())));
        Self::observe("create_plan", result)
    }

    /// Updates economic terms. Rejected once the plan locks.
    pub fn update_plan(
        &self,
        _admin: Admin<'_>,
        plan_id: PlanId,
        update: PlanUpdate,
    ) -> Result<Plan, LedgerError> {
        let result = self
            .store
            .transact(|uow| plan::update(uow, plan_id, update.clone()));
        Self::observe("update_plan", result)
    }

    /// Flips the `active` flag; permitted on locked plans.
    pub fn toggle_plan_active(
        &self,
        _admin: Admin<'_>,
        plan_id: PlanId,
    ) -> Result<bool, LedgerError> {
        let result = self.store.transact(|uow| plan::toggle_active(uow, plan_id));
        Self::observe("toggle_plan_active", result)
    }

    // --- read-side queries ---

    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.store.user(user_id)
    }

    pub fn wallet(&self, user_id: UserId, currency: &Currency) -> Option<Wallet> {
        self.store.wallet(user_id, currency)
    }

    /// All wallets, ordered by user then currency.
    pub fn wallets(&self) -> Vec<Wallet> {
        let mut wallets = self.store.wallets();
        wallets.sort_by(|a, b| {
            (a.user_id, &a.currency.0).cmp(&(b.user_id, &b.currency.0))
        });
        wallets
    }

    pub fn transaction(&self, tx_id: TxId) -> Option<Transaction> {
        self.store.transaction(tx_id)
    }

    /// A user's transactions in append order, optionally filtered by type.
    pub fn transactions_for(&self, user_id: UserId, tx_type: Option<TxType>) -> Vec<Transaction> {
        self.store
            .transaction_log()
            .into_iter()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| tx_type.is_none_or(|wanted| tx.tx_type == wanted))
            .collect()
    }

    /// Crypto deposit requests awaiting approval, in append order.
    pub fn pending_crypto_deposits(&self, _admin: Admin<'_>) -> Vec<Transaction> {
        self.store
            .transaction_log()
            .into_iter()
            .filter(|tx| {
                tx.tx_type == TxType::Deposit
                    && tx.status == TxStatus::Pending
                    && tx.provider.as_deref() == Some(deposit::CRYPTO_PROVIDER)
            })
            .collect()
    }

    pub fn investment(&self, investment_id: InvestmentId) -> Option<Investment> {
        self.store.investment(investment_id)
    }

    pub fn investments_for(&self, user_id: UserId) -> Vec<Investment> {
        self.store.investments_for(user_id)
    }

    pub fn plan(&self, plan_id: PlanId) -> Option<Plan> {
        self.store.plan(plan_id)
    }

    pub fn plans(&self) -> Vec<Plan> {
        self.store.plans()
    }

    pub fn referral(&self, referrer_id: UserId, referee_id: UserId) -> Option<Referral> {
        self.store.referral(referrer_id, referee_id)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
