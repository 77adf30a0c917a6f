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

//! Ledger store: versioned records with optimistic units of work.
//!
//! Every externally triggered operation runs as one unit of work. Reads
//! remember the version they observed, writes stage locally, and commit
//! re-validates every observed version under the commit lock before applying
//! anything. A failed validation re-runs the closure against fresh state; a
//! closure error aborts with no record touched. Readers never block behind
//! in-flight units.
//!
//! Keyed uniqueness (one wallet per (user, currency), one referral per
//! (referrer, referee), one withdrawal per client reference) falls out of
//! the same validation: a record created from an "absent" read conflicts if
//! the key appeared concurrently, and the retry observes the existing row.

use crate::base::{Currency, InvestmentId, PlanId, TxId, UserId};
use crate::error::LedgerError;
use crate::investment::Investment;
use crate::plan::Plan;
use crate::referral::{Referral, ReferralKey};
use crate::transaction::Transaction;
use crate::user::User;
use crate::wallet::{Wallet, WalletKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    record: T,
}

/// Durable record collections plus the ordered transaction log.
pub(crate) struct Store {
    wallets: DashMap<WalletKey, Versioned<Wallet>>,
    users: DashMap<UserId, Versioned<User>>,
    plans: DashMap<PlanId, Versioned<Plan>>,
    investments: DashMap<InvestmentId, Versioned<Investment>>,
    referrals: DashMap<ReferralKey, Versioned<Referral>>,
    transactions: DashMap<TxId, Versioned<Transaction>>,
    withdrawal_refs: DashMap<(UserId, String), Versioned<TxId>>,
    /// Append order of the transaction log.
    tx_log: RwLock<Vec<TxId>>,
    /// Serializes validate-and-apply. Readers do not take it.
    commit: Mutex<()>,
    next_user_id: AtomicU64,
    next_plan_id: AtomicU64,
    next_investment_id: AtomicU64,
    next_tx_id: AtomicU64,
    max_retries: usize,
}

impl Store {
    pub(crate) fn new(max_retries: usize) -> Self {
        Store {
            wallets: DashMap::new(),
            users: DashMap::new(),
            plans: DashMap::new(),
            investments: DashMap::new(),
            referrals: DashMap::new(),
            transactions: DashMap::new(),
            withdrawal_refs: DashMap::new(),
            tx_log: RwLock::new(Vec::new()),
            commit: Mutex::new(()),
            next_user_id: AtomicU64::new(0),
            next_plan_id: AtomicU64::new(0),
            next_investment_id: AtomicU64::new(0),
            next_tx_id: AtomicU64::new(0),
            max_retries,
        }
    }

    /// Runs `op` as one atomic unit of work.
    ///
    /// The closure may run more than once: it is re-invoked with a fresh
    /// unit whenever commit validation loses to a concurrent writer. An
    /// `Err` from the closure aborts immediately with nothing applied.
    pub(crate) fn transact<T>(
        &self,
        mut op: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        for attempt in 0..self.max_retries {
            let mut uow = UnitOfWork::new(self);
            let out = op(&mut uow)?;
            if uow.commit() {
                return Ok(out);
            }
            tracing::trace!(attempt, "unit of work lost a write conflict, retrying");
        }
        tracing::warn!(
            retries = self.max_retries,
            "unit of work exhausted commit retries"
        );
        Err(LedgerError::CommitContention)
    }

    // --- read-side snapshots, used by queries outside any unit of work ---

    pub(crate) fn wallet(&self, user_id: UserId, currency: &Currency) -> Option<Wallet> {
        self.wallets
            .get(&(user_id, currency.clone()))
            .map(|entry| entry.record.clone())
    }

    pub(crate) fn wallets(&self) -> Vec<Wallet> {
        self.wallets
            .iter()
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub(crate) fn user(&self, user_id: UserId) -> Option<User> {
        self.users.get(&user_id).map(|entry| entry.record.clone())
    }

    pub(crate) fn plan(&self, plan_id: PlanId) -> Option<Plan> {
        self.plans.get(&plan_id).map(|entry| entry.record.clone())
    }

    pub(crate) fn plans(&self) -> Vec<Plan> {
        let mut plans: Vec<Plan> = self
            .plans
            .iter()
            .map(|entry| entry.record.clone())
            .collect();
        plans.sort_by_key(|plan| plan.id);
        plans
    }

    pub(crate) fn investment(&self, investment_id: InvestmentId) -> Option<Investment> {
        self.investments
            .get(&investment_id)
            .map(|entry| entry.record.clone())
    }

    pub(crate) fn investments_for(&self, user_id: UserId) -> Vec<Investment> {
        let mut investments: Vec<Investment> = self
            .investments
            .iter()
            .filter(|entry| entry.record.user_id == user_id)
            .map(|entry| entry.record.clone())
            .collect();
        investments.sort_by_key(|investment| investment.id);
        investments
    }

    pub(crate) fn referral(&self, referrer_id: UserId, referee_id: UserId) -> Option<Referral> {
        self.referrals
            .get(&(referrer_id, referee_id))
            .map(|entry| entry.record.clone())
    }

    pub(crate) fn transaction(&self, tx_id: TxId) -> Option<Transaction> {
        self.transactions
            .get(&tx_id)
            .map(|entry| entry.record.clone())
    }

    /// All transactions in append order.
    pub(crate) fn transaction_log(&self) -> Vec<Transaction> {
        let order = self.tx_log.read();
        order
            .iter()
            .filter_map(|tx_id| {
                self.transactions
                    .get(tx_id)
                    .map(|entry| entry.record.clone())
            })
            .collect()
    }
}

/// Read cache and staged writes for one record collection.
struct Table<K, V> {
    /// Version observed on first read, 0 for absent keys.
    reads: HashMap<K, u64>,
    staged: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V: Clone> Table<K, V> {
    fn new() -> Self {
        Table {
            reads: HashMap::new(),
            staged: HashMap::new(),
        }
    }

    fn get(&mut self, map: &DashMap<K, Versioned<V>>, key: &K) -> Option<V> {
        if let Some(staged) = self.staged.get(key) {
            return Some(staged.clone());
        }
        match map.get(key) {
            Some(entry) => {
                self.reads.entry(key.clone()).or_insert(entry.version);
                Some(entry.record.clone())
            }
            None => {
                self.reads.entry(key.clone()).or_insert(0);
                None
            }
        }
    }

    fn put(&mut self, key: K, record: V) {
        self.staged.insert(key, record);
    }

    /// True when every observed version still matches, and every blind
    /// create still targets an absent key.
    fn validate(&self, map: &DashMap<K, Versioned<V>>) -> bool {
        let current = |key: &K| map.get(key).map_or(0, |entry| entry.version);
        self.reads
            .iter()
            .all(|(key, version)| current(key) == *version)
            && self
                .staged
                .keys()
                .all(|key| self.reads.contains_key(key) || current(key) == 0)
    }

    fn apply(self, map: &DashMap<K, Versioned<V>>) {
        for (key, record) in self.staged {
            match map.entry(key) {
                Entry::Occupied(mut entry) => {
                    let slot = entry.get_mut();
                    slot.version += 1;
                    slot.record = record;
                }
                Entry::Vacant(entry) => {
                    entry.insert(Versioned { version: 1, record });
                }
            }
        }
    }
}

/// One atomic unit of work against the store.
///
/// Every read and staged write of the unit goes through these accessors so
/// commit can validate the full read set at once.
pub(crate) struct UnitOfWork<'s> {
    store: &'s Store,
    wallets: Table<WalletKey, Wallet>,
    users: Table<UserId, User>,
    plans: Table<PlanId, Plan>,
    investments: Table<InvestmentId, Investment>,
    referrals: Table<ReferralKey, Referral>,
    transactions: Table<TxId, Transaction>,
    withdrawal_refs: Table<(UserId, String), TxId>,
    appended: Vec<TxId>,
}

impl<'s> UnitOfWork<'s> {
    fn new(store: &'s Store) -> Self {
        UnitOfWork {
            store,
            wallets: Table::new(),
            users: Table::new(),
            plans: Table::new(),
            investments: Table::new(),
            referrals: Table::new(),
            transactions: Table::new(),
            withdrawal_refs: Table::new(),
            appended: Vec::new(),
        }
    }

    pub(crate) fn get_wallet(&mut self, user_id: UserId, currency: &Currency) -> Option<Wallet> {
        self.wallets
            .get(&self.store.wallets, &(user_id, currency.clone()))
    }

    pub(crate) fn put_wallet(&mut self, wallet: Wallet) {
        let key = (wallet.user_id, wallet.currency.clone());
        self.wallets.put(key, wallet);
    }

    pub(crate) fn get_user(&mut self, user_id: UserId) -> Option<User> {
        self.users.get(&self.store.users, &user_id)
    }

    pub(crate) fn put_user(&mut self, user: User) {
        self.users.put(user.id, user);
    }

    pub(crate) fn get_plan(&mut self, plan_id: PlanId) -> Option<Plan> {
        self.plans.get(&self.store.plans, &plan_id)
    }

    pub(crate) fn put_plan(&mut self, plan: Plan) {
        self.plans.put(plan.id, plan);
    }

    pub(crate) fn get_investment(&mut self, investment_id: InvestmentId) -> Option<Investment> {
        self.investments.get(&self.store.investments, &investment_id)
    }

    pub(crate) fn put_investment(&mut self, investment: Investment) {
        self.investments.put(investment.id, investment);
    }

    pub(crate) fn get_referral(
        &mut self,
        referrer_id: UserId,
        referee_id: UserId,
    ) -> Option<Referral> {
        self.referrals
            .get(&self.store.referrals, &(referrer_id, referee_id))
    }

    pub(crate) fn put_referral(&mut self, referral: Referral) {
        let key = (referral.referrer_id, referral.referee_id);
        self.referrals.put(key, referral);
    }

    pub(crate) fn get_transaction(&mut self, tx_id: TxId) -> Option<Transaction> {
        self.transactions.get(&self.store.transactions, &tx_id)
    }

    /// Stages a status/metadata transition of an existing record. Appends
    /// nothing to the log order.
    pub(crate) fn put_transaction(&mut self, tx: Transaction) {
        self.transactions.put(tx.id, tx);
    }

    /// Stages a brand-new record and its position in the log order.
    pub(crate) fn append_transaction(&mut self, tx: Transaction) {
        self.appended.push(tx.id);
        self.transactions.put(tx.id, tx);
    }

    pub(crate) fn get_withdrawal_ref(&mut self, user_id: UserId, client_ref: &str) -> Option<TxId> {
        self.withdrawal_refs.get(
            &self.store.withdrawal_refs,
            &(user_id, client_ref.to_owned()),
        )
    }

    pub(crate) fn put_withdrawal_ref(&mut self, user_id: UserId, client_ref: String, tx_id: TxId) {
        self.withdrawal_refs.put((user_id, client_ref), tx_id);
    }

    pub(crate) fn next_user_id(&mut self) -> UserId {
        UserId(self.store.next_user_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn next_plan_id(&mut self) -> PlanId {
        PlanId(self.store.next_plan_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn next_investment_id(&mut self) -> InvestmentId {
        InvestmentId(self.store.next_investment_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn next_tx_id(&mut self) -> TxId {
        TxId(self.store.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Validates the full read set and applies all staged writes, or applies
    /// nothing at all.
    fn commit(self) -> bool {
        let UnitOfWork {
            store,
            wallets,
            users,
            plans,
            investments,
            referrals,
            transactions,
            withdrawal_refs,
            appended,
        } = self;

        let _guard = store.commit.lock();

        let valid = wallets.validate(&store.wallets)
            && users.validate(&store.users)
            && plans.validate(&store.plans)
            && investments.validate(&store.investments)
            && referrals.validate(&store.referrals)
            && transactions.validate(&store.transactions)
            && withdrawal_refs.validate(&store.withdrawal_refs);
        if !valid {
            return false;
        }

        wallets.apply(&store.wallets);
        users.apply(&store.users);
        plans.apply(&store.plans);
        investments.apply(&store.investments);
        referrals.apply(&store.referrals);
        transactions.apply(&store.transactions);
        withdrawal_refs.apply(&store.withdrawal_refs);
        if !appended.is_empty() {
            store.tx_log.write().extend(appended);
        }
        true
    }
}
