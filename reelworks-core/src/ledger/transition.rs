//! Pure per-account state transitions.
//!
//! Each function takes the current account snapshot and returns the
//! mutated copy plus the signed transaction amount to record. The CAS
//! loop in [`super::CreditLedger`] re-runs these against a fresh
//! snapshot after a version conflict, so they must stay side-effect
//! free.

use reelworks_model::CreditAccount;

use crate::error::CoreError;
use crate::Result;

fn require_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount(amount));
    }
    Ok(())
}

/// Place a soft hold: `reserved += amount`, balance unchanged.
pub(super) fn reserve(
    account: &CreditAccount,
    amount: i64,
) -> Result<(CreditAccount, i64)> {
    require_positive(amount)?;
    if account.available() < amount {
        return Err(CoreError::InsufficientCredits {
            tenant_id: account.tenant_id,
            required: amount,
            available: account.available(),
        });
    }
    let mut next = account.clone();
    next.reserved += amount;
    Ok((next, amount))
}

/// Spend previously reserved credits: balance and reservation both drop.
pub(super) fn consume(
    account: &CreditAccount,
    amount: i64,
) -> Result<(CreditAccount, i64)> {
    require_positive(amount)?;
    if account.balance < amount || account.reserved < amount {
        return Err(CoreError::InsufficientCredits {
            tenant_id: account.tenant_id,
            required: amount,
            available: account.reserved.min(account.balance),
        });
    }
    let mut next = account.clone();
    next.balance -= amount;
    next.reserved -= amount;
    Ok((next, -amount))
}

/// Return credits to the balance after a failure: `balance += amount`,
/// reservation shrinks by at most `amount` (floored at zero).
pub(super) fn refund(
    account: &CreditAccount,
    amount: i64,
) -> Result<(CreditAccount, i64)> {
    require_positive(amount)?;
    let mut next = account.clone();
    next.balance += amount;
    next.reserved -= next.reserved.min(amount);
    Ok((next, amount))
}

/// Drop an unused hold: reservation shrinks by at most `amount`,
/// balance untouched.
pub(super) fn release(
    account: &CreditAccount,
    amount: i64,
) -> Result<(CreditAccount, i64)> {
    require_positive(amount)?;
    let mut next = account.clone();
    let released = next.reserved.min(amount);
    next.reserved -= released;
    Ok((next, released))
}

/// Direct balance grant (admin top-up or purchase).
pub(super) fn add(
    account: &CreditAccount,
    amount: i64,
) -> Result<(CreditAccount, i64)> {
    require_positive(amount)?;
    let mut next = account.clone();
    next.balance += amount;
    Ok((next, amount))
}

/// Monthly allotment grant. Rollover accounts keep what they have and
/// gain the full allotment; non-rollover accounts are topped back up so
/// that `available == monthly_allotment`, never shrinking below what is
/// still reserved.
pub(super) fn monthly_grant(
    account: &CreditAccount,
) -> Result<(CreditAccount, i64)> {
    if account.monthly_allotment <= 0 {
        return Err(CoreError::InvalidAmount(account.monthly_allotment));
    }
    let mut next = account.clone();
    if account.rollover_enabled {
        next.balance += account.monthly_allotment;
    } else {
        next.balance =
            next.balance.max(next.reserved + account.monthly_allotment);
    }
    let granted = next.balance - account.balance;
    Ok((next, granted))
}

/// Puts a spent amount back exactly as it was held: balance and
/// reservation both grow. Compensates a consume whose follow-up write
/// failed.
pub(super) fn reinstate(
    account: &CreditAccount,
    amount: i64,
) -> Result<(CreditAccount, i64)> {
    require_positive(amount)?;
    let mut next = account.clone();
    next.balance += amount;
    next.reserved += amount;
    Ok((next, amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelworks_model::TenantId;

    fn account(balance: i64, reserved: i64) -> CreditAccount {
        let mut account = CreditAccount::new(TenantId::new());
        account.balance = balance;
        account.reserved = reserved;
        account
    }

    #[test]
    fn reserve_holds_without_touching_balance() {
        let (next, amount) = reserve(&account(100, 0), 30).unwrap();
        assert_eq!(next.balance, 100);
        assert_eq!(next.reserved, 30);
        assert_eq!(next.available(), 70);
        assert_eq!(amount, 30);
    }

    #[test]
    fn reserve_fails_beyond_available() {
        let err = reserve(&account(100, 80), 30).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientCredits {
                required: 30,
                available: 20,
                ..
            }
        ));
    }

    #[test]
    fn consume_drops_balance_and_reservation() {
        let (next, amount) = consume(&account(100, 30), 20).unwrap();
        assert_eq!(next.balance, 80);
        assert_eq!(next.reserved, 10);
        assert_eq!(amount, -20);
    }

    #[test]
    fn consume_requires_matching_reservation() {
        assert!(consume(&account(100, 10), 20).is_err());
        assert!(consume(&account(10, 20), 15).is_err());
    }

    #[test]
    fn refund_restores_balance_and_floors_reservation() {
        let (next, _) = refund(&account(80, 10), 10).unwrap();
        assert_eq!(next.balance, 90);
        assert_eq!(next.reserved, 0);

        // Refund larger than the outstanding reservation.
        let (next, _) = refund(&account(80, 5), 10).unwrap();
        assert_eq!(next.balance, 90);
        assert_eq!(next.reserved, 0);
    }

    #[test]
    fn release_only_shrinks_reservation() {
        let (next, released) = release(&account(100, 30), 30).unwrap();
        assert_eq!(next.balance, 100);
        assert_eq!(next.reserved, 0);
        assert_eq!(released, 30);

        let (next, released) = release(&account(100, 10), 30).unwrap();
        assert_eq!(next.reserved, 0);
        assert_eq!(released, 10);
    }

    #[test]
    fn invariants_hold_across_scenario_a() {
        // balance=100 -> reserve(30) -> consume(20) -> refund(10)
        let start = account(100, 0);
        let (after_reserve, _) = reserve(&start, 30).unwrap();
        assert_eq!(after_reserve.available(), 70);

        let (after_consume, _) = consume(&after_reserve, 20).unwrap();
        assert_eq!(after_consume.balance, 80);
        assert_eq!(after_consume.reserved, 10);

        let (after_refund, _) = refund(&after_consume, 10).unwrap();
        assert_eq!(after_refund.balance, 90);
        assert_eq!(after_refund.reserved, 0);

        for state in [&after_reserve, &after_consume, &after_refund] {
            assert!(state.balance >= 0);
            assert!(state.reserved <= state.balance);
            assert!(state.reserved >= 0);
        }
    }

    #[test]
    fn monthly_grant_rollover_adds_allotment() {
        let mut base = account(40, 10);
        base.monthly_allotment = 100;
        base.rollover_enabled = true;
        let (next, delta) = monthly_grant(&base).unwrap();
        assert_eq!(next.balance, 140);
        assert_eq!(delta, 100);
    }

    #[test]
    fn monthly_grant_without_rollover_tops_up_available() {
        let mut base = account(40, 10);
        base.monthly_allotment = 100;
        base.rollover_enabled = false;
        let (next, delta) = monthly_grant(&base).unwrap();
        assert_eq!(next.balance, 110);
        assert_eq!(next.available(), 100);
        assert_eq!(delta, 70);

        // Already above the allotment: nothing shrinks.
        let mut rich = account(500, 0);
        rich.monthly_allotment = 100;
        let (next, delta) = monthly_grant(&rich).unwrap();
        assert_eq!(next.balance, 500);
        assert_eq!(delta, 0);
    }

    #[test]
    fn reinstate_restores_the_hold_a_consume_took() {
        let (consumed, _) = consume(&account(100, 30), 20).unwrap();
        let (restored, amount) = reinstate(&consumed, 20).unwrap();
        assert_eq!(restored.balance, 100);
        assert_eq!(restored.reserved, 30);
        assert_eq!(amount, 20);
        assert!(restored.reserved <= restored.balance);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let base = account(100, 0);
        assert!(reserve(&base, 0).is_err());
        assert!(consume(&base, -5).is_err());
        assert!(refund(&base, 0).is_err());
        assert!(release(&base, -1).is_err());
        assert!(add(&base, 0).is_err());
        assert!(reinstate(&base, 0).is_err());
    }
}
