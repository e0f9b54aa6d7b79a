#![allow(missing_docs)]

//! This module defines the unit types used for prices and quantities and the conversions between
//! them.
use serde::{Deserialize, Serialize};

/// Represents a dimensionless quantity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Default,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
    derive_more::Display,
)]
pub struct Dimensionless(pub f64);

impl std::ops::Mul for Dimensionless {
    type Output = Dimensionless;

    fn mul(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 * rhs.0)
    }
}

impl From<f64> for Dimensionless {
    fn from(val: f64) -> Self {
        Self(val)
    }
}

impl From<Dimensionless> for f64 {
    fn from(val: Dimensionless) -> Self {
        val.0
    }
}

macro_rules! unit_struct {
    ($name:ident) => {
        /// Represents a type of quantity.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Default,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::Display,
        )]
        pub struct $name(pub f64);

        impl $name {
            /// Creates a new instance of the unit type from a f64 value.
            pub fn new(val: f64) -> Self {
                Self(val)
            }

            /// Returns the value of the unit type as a f64.
            pub fn value(self) -> f64 {
                self.0
            }

            /// The absolute value
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            /// The smaller of two values
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            /// The larger of two values
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            /// Whether the value is neither infinite nor NaN
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::ops::Neg for $name {
            type Output = $name;
            fn neg(self) -> $name {
                $name(-self.0)
            }
        }

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Mul<$name> for Dimensionless {
            type Output = $name;
            fn mul(self, rhs: $name) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div<Dimensionless> for $name {
            type Output = $name;
            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl float_cmp::ApproxEq for $name {
            type Margin = float_cmp::F64Margin;

            fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
                self.0.approx_eq(other.0, margin)
            }
        }
    };
}

macro_rules! impl_mul {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Mul<$Rhs> for $Lhs {
            type Output = $Out;
            fn mul(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 * rhs.0)
            }
        }
        impl std::ops::Mul<$Lhs> for $Rhs {
            type Output = $Out;
            fn mul(self, lhs: $Lhs) -> $Out {
                <$Out>::new(self.0 * lhs.0)
            }
        }
    };
}

// Base quantities
unit_struct!(Price);
unit_struct!(Quantity);

// Derived quantities
unit_struct!(PricePerQuantity);

// Multiplication rules
impl_mul!(Quantity, PricePerQuantity, Price);

impl Price {
    /// The price halfway between this one and `other`
    pub fn midpoint(self, other: Price) -> Price {
        (self + other) * Dimensionless(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_quantity_times_rate_is_price() {
        let adjustment = Quantity(4.0) * PricePerQuantity(0.05);
        assert_approx_eq!(Price, adjustment, Price(0.2));
        assert_eq!(PricePerQuantity(0.5) * Quantity(2.0), Price(1.0));
    }

    #[test]
    fn test_price_midpoint() {
        assert_eq!(Price(1.0).midpoint(Price(3.0)), Price(2.0));
        assert_eq!(Price(2.0).midpoint(Price(2.0)), Price(2.0));
    }

    #[test]
    fn test_quantity_sum() {
        let total: Quantity = [Quantity(1.0), Quantity(2.5), Quantity(0.5)]
            .into_iter()
            .sum();
        assert_eq!(total, Quantity(4.0));
    }

    #[test]
    fn test_deserialise_transparent() {
        #[derive(Deserialize)]
        struct Wrapper {
            price: Price,
        }

        let wrapper: Wrapper = toml::from_str("price = 1.5").unwrap();
        assert_eq!(wrapper.price, Price(1.5));
    }
}
