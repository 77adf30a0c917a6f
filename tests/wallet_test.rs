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

//! Wallet balance behavior through the public ledger API.

use invest_ledger_rs::{
    Admin, Currency, Ledger, LedgerConfig, LedgerError, NewPlan, Principal, RateUnit, Role, UserId,
    Wallet, WithdrawalAction,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

// === Helper Functions ===

fn ops() -> Principal {
    Principal::new(UserId(0), Role::Admin)
}

fn admin(principal: &Principal) -> Admin<'_> {
    principal.admin().unwrap()
}

fn wallet_of(ledger: &Ledger, user: UserId) -> Wallet {
    ledger.wallet(user, &Currency::usd()).unwrap()
}

fn open_plan(ledger: &Ledger) -> invest_ledger_rs::PlanId {
    let operator = ops();
    ledger
        .create_plan(
            admin(&operator),
            NewPlan {
                name: "Open".to_owned(),
                rate: dec!(1),
                rate_unit: RateUnit::Day,
                period_count: 10,
                payout_frequency_secs: 86_400,
                min_amount_cents: 1,
                max_amount_cents: i64::MAX,
                capital_back: true,
                referral_percent: None,
            },
        )
        .unwrap()
}

// === Basic Balance Tests ===

#[test]
fn new_wallet_has_zero_balances() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();

    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 0);
    assert_eq!(wallet.reserved_cents, 0);
    assert_eq!(wallet.interest_cents, 0);
    assert_eq!(wallet.total_cents(), 0);
}

#[test]
fn deposit_increases_main_balance() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();

    ledger
        .deposit(admin(&operator), user, 5_000, None, None, None)
        .unwrap();
    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 5_000);
    assert_eq!(wallet.total_cents(), 5_000);
}

#[test]
fn multiple_deposits_accumulate() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();

    for amount in [10_000, 5_000, 2_550] {
        ledger
            .deposit(admin(&operator), user, amount, None, None, None)
            .unwrap();
    }
    assert_eq!(wallet_of(&ledger, user).main_cents, 17_550);
}

#[test]
fn deposit_creates_wallet_for_unregistered_user() {
    // Upsert-on-write: a provider callback may land before registration
    // finished creating the wallet row.
    let ledger = Ledger::new();
    let operator = ops();

    ledger
        .deposit(admin(&operator), UserId(99), 1_000, None, None, None)
        .unwrap();
    assert_eq!(wallet_of(&ledger, UserId(99)).main_cents, 1_000);
}

#[test]
fn total_equals_main_plus_reserved() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 10_000, None, None, None)
        .unwrap();

    // Withdrawal request moves funds from main to reserved
    let principal = Principal::new(user, Role::User);
    ledger
        .request_withdrawal(&principal, 4_000, None, None)
        .unwrap();

    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 6_000);
    assert_eq!(wallet.reserved_cents, 4_000);
    assert_eq!(wallet.total_cents(), 10_000);
}

#[test]
fn wallets_are_per_currency() {
    let config = LedgerConfig {
        default_currency: Currency("EUR".to_owned()),
        ..LedgerConfig::default()
    };
    let ledger = Ledger::with_config(config);
    let user = ledger.register_user(None).unwrap();
    let operator = ops();

    ledger
        .deposit(
            admin(&operator),
            user,
            2_500,
            Some(Currency("BTC".to_owned())),
            None,
            None,
        )
        .unwrap();

    assert_eq!(
        ledger
            .wallet(user, &Currency("EUR".to_owned()))
            .unwrap()
            .main_cents,
        0
    );
    assert_eq!(
        ledger
            .wallet(user, &Currency("BTC".to_owned()))
            .unwrap()
            .main_cents,
        2_500
    );
    assert!(ledger.wallet(user, &Currency::usd()).is_none());
}

// === Error Cases ===

#[test]
fn withdraw_more_than_main_returns_insufficient_funds() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 5_000, None, None, None)
        .unwrap();

    let principal = Principal::new(user, Role::User);
    let result = ledger.request_withdrawal(&principal, 10_000, None, None);
    assert_eq!(result, Err(LedgerError::InsufficientFunds));
    // Balance unchanged
    assert_eq!(wallet_of(&ledger, user).main_cents, 5_000);
}

#[test]
fn withdraw_zero_returns_invalid_amount() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let principal = Principal::new(user, Role::User);

    assert_eq!(
        ledger.request_withdrawal(&principal, 0, None, None),
        Err(LedgerError::InvalidAmount)
    );
    assert_eq!(
        ledger.request_withdrawal(&principal, -100, None, None),
        Err(LedgerError::InvalidAmount)
    );
}

#[test]
fn reserved_funds_are_not_spendable() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 10_000, None, None, None)
        .unwrap();

    let principal = Principal::new(user, Role::User);
    ledger
        .request_withdrawal(&principal, 8_000, None, None)
        .unwrap();

    // Only 2_000 is left in main; the reserved 8_000 cannot fund this.
    assert_eq!(
        ledger.request_withdrawal(&principal, 3_000, None, None),
        Err(LedgerError::InsufficientFunds)
    );
}

// === Edge Cases ===

#[test]
fn withdraw_exact_balance_succeeds() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 10_000, None, None, None)
        .unwrap();

    let principal = Principal::new(user, Role::User);
    ledger
        .request_withdrawal(&principal, 10_000, None, None)
        .unwrap();

    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 0);
    assert_eq!(wallet.reserved_cents, 10_000);
}

#[test]
fn one_cent_amounts() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();

    ledger
        .deposit(admin(&operator), user, 1, None, None, None)
        .unwrap();
    ledger
        .deposit(admin(&operator), user, 2, None, None, None)
        .unwrap();
    assert_eq!(wallet_of(&ledger, user).main_cents, 3);
}

#[test]
fn large_amounts() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();

    let large = 9_999_999_999_999;
    ledger
        .deposit(admin(&operator), user, large, None, None, None)
        .unwrap();
    assert_eq!(wallet_of(&ledger, user).main_cents, large);
}

// === Conservation Through Flows ===

#[test]
fn invest_conserves_total_holdings() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 10_000, None, None, None)
        .unwrap();
    let plan_id = open_plan(&ledger);

    let principal = Principal::new(user, Role::User);
    ledger.create_investment(&principal, plan_id, 7_000).unwrap();

    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 3_000);
    assert_eq!(wallet.reserved_cents, 7_000);
    assert_eq!(wallet.total_cents(), 10_000);
}

#[test]
fn completed_withdrawal_reduces_total() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 10_000, None, None, None)
        .unwrap();

    let principal = Principal::new(user, Role::User);
    let tx_id = ledger
        .request_withdrawal(&principal, 4_000, None, None)
        .unwrap();
    ledger
        .process_withdrawal(admin(&operator), tx_id, WithdrawalAction::Complete, 0, None)
        .unwrap();

    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.total_cents(), 6_000);
    assert_eq!(wallet.reserved_cents, 0);
}

#[test]
fn failed_withdrawal_preserves_total() {
    let ledger = Ledger::new();
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 10_000, None, None, None)
        .unwrap();

    let principal = Principal::new(user, Role::User);
    let tx_id = ledger
        .request_withdrawal(&principal, 4_000, None, None)
        .unwrap();
    ledger
        .process_withdrawal(admin(&operator), tx_id, WithdrawalAction::Fail, 0, None)
        .unwrap();

    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 10_000);
    assert_eq!(wallet.reserved_cents, 0);
}

// === Multi-threading Tests ===

/// Ledger configured for heavily contended tests.
fn contended_ledger() -> Ledger {
    Ledger::with_config(LedgerConfig {
        max_commit_retries: 256,
        ..LedgerConfig::default()
    })
}

#[test]
fn concurrent_deposits_are_atomic() {
    let ledger = Arc::new(contended_ledger());
    let user = ledger.register_user(None).unwrap();
    let mut handles = vec![];

    for _ in 0..100 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            let operator = ops();
            ledger
                .deposit(admin(&operator), user, 100, None, None, None)
                .unwrap();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wallet_of(&ledger, user).main_cents, 10_000);
}

#[test]
fn concurrent_mixed_operations_maintain_invariants() {
    let ledger = Arc::new(contended_ledger());
    let user = ledger.register_user(None).unwrap();
    let operator = ops();
    ledger
        .deposit(admin(&operator), user, 100_000, None, None, None)
        .unwrap();

    let mut handles = vec![];

    // 50 deposits of 1_000
    for _ in 0..50 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            let operator = ops();
            ledger
                .deposit(admin(&operator), user, 1_000, None, None, None)
                .unwrap();
        }));
    }

    // 50 withdrawal requests of 1_000
    for _ in 0..50 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            let principal = Principal::new(user, Role::User);
            ledger
                .request_withdrawal(&principal, 1_000, None, None)
                .unwrap();
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // Net effect on total: 100_000 + 50_000 in, 50_000 moved to reserved
    let wallet = wallet_of(&ledger, user);
    assert_eq!(wallet.main_cents, 100_000);
    assert_eq!(wallet.reserved_cents, 50_000);
    assert_eq!(wallet.total_cents(), 150_000);
}

// === Race Condition Tests ===

#[test]
fn no_double_spend_race_condition() {
    // Concurrent withdrawal requests must not over-reserve the balance.
    for _ in 0..10 {
        let ledger = Arc::new(contended_ledger());
        let user = ledger.register_user(None).unwrap();
        let operator = ops();
        ledger
            .deposit(admin(&operator), user, 10_000, None, None, None)
            .unwrap();

        let successful = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];

        // 10 concurrent requests for the full balance
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            let counter = Arc::clone(&successful);
            handles.push(thread::spawn(move || {
                let principal = Principal::new(user, Role::User);
                if ledger
                    .request_withdrawal(&principal, 10_000, None, None)
                    .is_ok()
                {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // Only ONE request should reserve the funds
        let count = successful.load(Ordering::SeqCst);
        assert_eq!(count, 1, "Expected exactly 1 successful request, got {}", count);

        let wallet = wallet_of(&ledger, user);
        assert_eq!(wallet.main_cents, 0);
        assert_eq!(wallet.reserved_cents, 10_000);
    }
}

#[test]
fn balance_never_goes_negative() {
    for _ in 0..10 {
        let ledger = Arc::new(contended_ledger());
        let user = ledger.register_user(None).unwrap();
        let operator = ops();
        ledger
            .deposit(admin(&operator), user, 5_000, None, None, None)
            .unwrap();

        let mut handles = vec![];

        // Many concurrent requests trying to overdraw
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(thread::spawn(move || {
                let principal = Principal::new(user, Role::User);
                let _ = ledger.request_withdrawal(&principal, 1_000, None, None);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let wallet = wallet_of(&ledger, user);
        assert!(wallet.main_cents >= 0, "Main balance went negative!");
        assert!(wallet.reserved_cents >= 0, "Reserved balance went negative!");
        assert_eq!(wallet.total_cents(), 5_000);
    }
}
