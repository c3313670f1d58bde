//! # sharefair-types
//!
//! Shared domain types used across the sharefair workspace: account keys,
//! the time-index axis, amounts, and the harvest premium fraction.

pub mod account;
pub mod premium;

pub use account::AccountId;
pub use premium::PremiumFraction;

/// Position on the ambient, monotonically non-decreasing clock.
pub type TimeIndex = u64;

/// Share or value amount in base units (18-decimal fixed point by convention).
pub type Amount = u128;

/// Denominator of the harvest premium: a premium `p` pays `p / 255` of a
/// dividend to the operator.
pub const PREMIUM_DENOMINATOR: u32 = 255;

/// Base units per whole share (10^18).
pub const UNITS_PER_SHARE: Amount = 1_000_000_000_000_000_000;

/// Error parsing a type from its wire representation.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Account key is not 32 bytes of hex.
    #[error("invalid account id: {0}")]
    InvalidAccount(String),

    /// Premium fraction outside 0..=255.
    #[error("premium fraction {0} is outside 0..=255")]
    PremiumOutOfRange(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_per_share() {
        assert_eq!(UNITS_PER_SHARE, 10u128.pow(18));
    }

    #[test]
    fn test_million_shares_fit() {
        let supply = 1_000_000 * UNITS_PER_SHARE;
        assert!(supply.checked_mul(1_000_000).is_some());
    }
}
