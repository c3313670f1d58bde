//! Wide multiply-divide for pro-rata shares.
//!
//! Amounts are 18-decimal fixed point, so `revenue * shares` routinely
//! exceeds `u128` even when the quotient is small. The native product is
//! used when it fits; otherwise the computation falls back to `BigUint`.

use num_bigint::BigUint;
use sharefair_types::Amount;

use crate::{LedgerError, Result};

/// Compute `a * b / d`, truncating toward zero.
///
/// # Errors
///
/// - [`LedgerError::ArithmeticOverflow`] if `d` is zero or the quotient
///   does not fit in an [`Amount`]
pub fn mul_div(a: Amount, b: Amount, d: Amount) -> Result<Amount> {
    if d == 0 {
        return Err(LedgerError::ArithmeticOverflow);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }

    let quotient = BigUint::from(a) * BigUint::from(b) / BigUint::from(d);
    u128::try_from(&quotient).map_err(|_| LedgerError::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    const E18: Amount = 1_000_000_000_000_000_000;

    #[test]
    fn test_small_values() {
        assert_eq!(mul_div(42, 150_000, 1_000_000).expect("mul_div"), 6);
        assert_eq!(mul_div(0, 5, 7).expect("mul_div"), 0);
    }

    #[test]
    fn test_wide_intermediate() {
        // 42e18 * 150_000e18 overflows u128; the quotient does not.
        let revenue = 42 * E18;
        let shares = 150_000 * E18;
        let supply = 1_000_000 * E18;
        assert!(revenue.checked_mul(shares).is_none());
        assert_eq!(
            mul_div(revenue, shares, supply).expect("mul_div"),
            revenue / 1_000_000 * 150_000
        );
    }

    #[test]
    fn test_truncates() {
        assert_eq!(mul_div(10, 1, 3).expect("mul_div"), 3);
        assert_eq!(mul_div(u128::MAX, 2, 3).expect("mul_div"), u128::MAX / 3 * 2);
    }

    #[test]
    fn test_zero_divisor() {
        assert!(matches!(mul_div(1, 1, 0), Err(LedgerError::ArithmeticOverflow)));
    }

    #[test]
    fn test_quotient_overflow() {
        assert!(matches!(
            mul_div(u128::MAX, 2, 1),
            Err(LedgerError::ArithmeticOverflow)
        ));
    }
}
