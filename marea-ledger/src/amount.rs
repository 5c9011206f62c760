//! Overflow-checked decimal arithmetic
//!
//! `Decimal` operators panic on overflow. Sums, products and ratios of
//! caller-supplied quantities go through these helpers instead, and an
//! overflow surfaces as a validation error naming the derived field.

use crate::error::{Error, Result};
use rust_decimal::Decimal;

fn out_of_range(what: &str) -> Error {
    Error::validation(format!("{} is out of range", what))
}

/// `a * b`
pub(crate) fn mul(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_mul(b).ok_or_else(|| out_of_range(what))
}

/// `a + b`
pub(crate) fn add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| out_of_range(what))
}

/// `a - b`
pub(crate) fn sub(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_sub(b).ok_or_else(|| out_of_range(what))
}

/// Sum of every value, zero when empty
pub(crate) fn sum<I>(values: I, what: &str) -> Result<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| add(acc, value, what))
}

/// Box counts
pub(crate) fn add_boxes(a: i64, b: i64, what: &str) -> Result<i64> {
    a.checked_add(b).ok_or_else(|| out_of_range(what))
}

/// `numerator / denominator`, or zero when the denominator is zero
pub(crate) fn ratio(numerator: Decimal, denominator: Decimal, what: &str) -> Result<Decimal> {
    if denominator.is_zero() {
        return Ok(Decimal::ZERO);
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| out_of_range(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::dec;
    use crate::ErrorKind;

    #[test]
    fn test_ratio_zero_denominator() {
        assert_eq!(ratio(dec("10"), Decimal::ZERO, "x").unwrap(), Decimal::ZERO);
        assert_eq!(ratio(dec("10"), dec("4"), "x").unwrap(), dec("2.5"));
    }

    #[test]
    fn test_overflow_is_validation() {
        let err = mul(Decimal::MAX, dec("1.5"), "biomass").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("biomass"));

        let err = add(Decimal::MAX, Decimal::ONE, "kilos").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = sub(Decimal::MIN, Decimal::ONE, "adjustment").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ratio(Decimal::MAX, dec("0.5"), "average weight").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = add_boxes(i64::MAX, 1, "boxes").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_sum() {
        assert_eq!(sum(Vec::new(), "kilos").unwrap(), Decimal::ZERO);
        assert_eq!(sum(vec![dec("1.5"), dec("2"), dec("-0.5")], "kilos").unwrap(), dec("3"));

        let err = sum(vec![Decimal::MAX, Decimal::MAX], "kilos").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
