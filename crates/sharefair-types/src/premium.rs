//! Harvest premium fraction.

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Share of a harvested dividend paid to the operator, in units of
/// 1/[`PREMIUM_DENOMINATOR`](crate::PREMIUM_DENOMINATOR).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PremiumFraction(u8);

impl PremiumFraction {
    /// No premium; the holder receives the whole dividend.
    pub const ZERO: Self = Self(0);

    /// The whole dividend goes to the operator.
    pub const MAX: Self = Self(u8::MAX);

    /// Numerator of the fraction.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for PremiumFraction {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl TryFrom<u32> for PremiumFraction {
    type Error = ParseError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map(Self)
            .map_err(|_| ParseError::PremiumOutOfRange(value))
    }
}
