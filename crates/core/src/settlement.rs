use crate::money::{Money, Rate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operator (servicer) cut of a settlement, taken from the pool left after
/// the platform fee. The original flows disagree on this constant, so it is
/// fixed here and overridable through configuration, not inferred.
pub const OPERATOR_FEE_RATE: Rate = Rate::from_basis_points(100); // 1%

/// Funding economics treated as configuration, not business logic; the
/// contract is the source of truth for the bounds it enforces itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingPolicy {
    pub advance_rate: Rate,
    pub fee_rate: Rate,
    pub operator_rate: Rate,
    pub min_funding: Money,
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self {
            advance_rate: Rate::from_basis_points(8_000),
            fee_rate: Rate::from_basis_points(300),
            operator_rate: OPERATOR_FEE_RATE,
            min_funding: Money::from_major(100),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTermsError {
    #[error("face value must be positive")]
    NonPositiveFaceValue,
    #[error("advance rate must be within (0, 100], got {0}")]
    AdvanceRateOutOfRange(Rate),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FundingError {
    #[error("requested {requested} is below the minimum funding amount {minimum}")]
    BelowMinimum { requested: Money, minimum: Money },
    #[error("requested {requested} exceeds invoice face value {face_value}")]
    ExceedsFaceValue { requested: Money, face_value: Money },
}

/// Economics of one funding offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTerms {
    pub advance_amount: Money,
    pub fee_amount: Money,
    pub expected_return: Money,
}

/// Three-way settlement split. Shares always sum exactly to the paid amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSplit {
    pub investor_share: Money,
    pub operator_share: Money,
    pub platform_share: Money,
}

/// Advance, fee and expected return for an invoice funded at the given
/// rates. Rounding is half-up at cent precision.
pub fn compute_funding_terms(
    face_value: Money,
    advance_rate: Rate,
    fee_rate: Rate,
) -> Result<FundingTerms, InvalidTermsError> {
    if !face_value.is_positive() {
        return Err(InvalidTermsError::NonPositiveFaceValue);
    }
    if advance_rate.basis_points() == 0 || advance_rate.basis_points() > 10_000 {
        return Err(InvalidTermsError::AdvanceRateOutOfRange(advance_rate));
    }
    let advance_amount = face_value.mul_rate_half_up(advance_rate);
    let fee_amount = advance_amount.mul_rate_half_up(fee_rate);
    let expected_return = advance_amount
        .checked_add(fee_amount)
        .ok_or(InvalidTermsError::NonPositiveFaceValue)?;
    Ok(FundingTerms {
        advance_amount,
        fee_amount,
        expected_return,
    })
}

/// Fail-fast bounds check on a funding request. The escrow contract
/// re-enforces the same bounds; this only spares a doomed ledger call.
pub fn validate_funding_amount(
    requested: Money,
    face_value: Money,
    min_absolute: Money,
) -> Result<(), FundingError> {
    if requested < min_absolute {
        return Err(FundingError::BelowMinimum {
            requested,
            minimum: min_absolute,
        });
    }
    if requested > face_value {
        return Err(FundingError::ExceedsFaceValue {
            requested,
            face_value,
        });
    }
    Ok(())
}

/// Split a paid invoice's proceeds among investor, operator and platform.
/// Investor and operator shares round down; the platform share takes the
/// remainder, so the three always reassemble `paid` exactly.
pub fn split_settlement(paid: Money, fee_rate: Rate) -> SettlementSplit {
    split_settlement_with_operator_rate(paid, fee_rate, OPERATOR_FEE_RATE)
}

pub fn split_settlement_with_operator_rate(
    paid: Money,
    fee_rate: Rate,
    operator_rate: Rate,
) -> SettlementSplit {
    let platform_base = paid.mul_rate_floor(fee_rate);
    let pool = paid.checked_sub(platform_base).unwrap_or(Money::ZERO);

    let operator_share = pool.mul_rate_floor(operator_rate);
    let investor_rate = Rate::from_basis_points(10_000 - operator_rate.basis_points().min(10_000));
    let investor_share = pool.mul_rate_floor(investor_rate);

    let platform_share = Money::from_minor(
        paid.minor() - investor_share.minor() - operator_share.minor(),
    );

    SettlementSplit {
        investor_share,
        operator_share,
        platform_share,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(p: f64) -> Rate {
        Rate::from_percent(p).unwrap()
    }

    #[test]
    fn reference_funding_terms() {
        // $10,000 face, 80% advance, 3% fee -> $8,000 / $240 / $8,240
        let terms =
            compute_funding_terms(Money::from_major(10_000), pct(80.0), pct(3.0)).unwrap();
        assert_eq!(terms.advance_amount, Money::from_major(8_000));
        assert_eq!(terms.fee_amount, Money::from_major(240));
        assert_eq!(terms.expected_return, Money::from_major(8_240));
    }

    #[test]
    fn advance_never_exceeds_face_value() {
        for face in [1, 99, 100, 12_345, 1_000_000] {
            for adv_bps in [1, 250, 5_000, 9_999, 10_000] {
                let terms = compute_funding_terms(
                    Money::from_minor(face),
                    Rate::from_basis_points(adv_bps),
                    pct(3.0),
                )
                .unwrap();
                assert!(terms.advance_amount <= Money::from_minor(face));
                assert!(terms.expected_return >= terms.advance_amount);
            }
        }
    }

    #[test]
    fn rejects_out_of_range_terms() {
        assert_eq!(
            compute_funding_terms(Money::ZERO, pct(80.0), pct(3.0)),
            Err(InvalidTermsError::NonPositiveFaceValue)
        );
        assert_eq!(
            compute_funding_terms(Money::from_major(100), pct(0.0), pct(3.0)),
            Err(InvalidTermsError::AdvanceRateOutOfRange(pct(0.0)))
        );
        assert_eq!(
            compute_funding_terms(Money::from_major(100), pct(101.0), pct(3.0)),
            Err(InvalidTermsError::AdvanceRateOutOfRange(pct(101.0)))
        );
    }

    #[test]
    fn zero_fee_rate_is_allowed() {
        let terms =
            compute_funding_terms(Money::from_major(1_000), pct(80.0), pct(0.0)).unwrap();
        assert_eq!(terms.fee_amount, Money::ZERO);
        assert_eq!(terms.expected_return, terms.advance_amount);
    }

    #[test]
    fn funding_amount_bounds() {
        let face = Money::from_major(1_000);
        let min = Money::from_major(100);
        assert_eq!(
            validate_funding_amount(Money::from_major(10), face, min),
            Err(FundingError::BelowMinimum {
                requested: Money::from_major(10),
                minimum: min
            })
        );
        assert_eq!(
            validate_funding_amount(Money::from_major(5_000), face, min),
            Err(FundingError::ExceedsFaceValue {
                requested: Money::from_major(5_000),
                face_value: face
            })
        );
        assert_eq!(validate_funding_amount(Money::from_major(800), face, min), Ok(()));
    }

    #[test]
    fn split_reassembles_exactly() {
        for paid in [1, 3, 99, 101, 12_345, 1_000_003, 999_999_999] {
            for fee_bps in [0, 1, 299, 300, 700, 10_000] {
                let paid = Money::from_minor(paid);
                let split = split_settlement(paid, Rate::from_basis_points(fee_bps));
                assert_eq!(
                    split.investor_share.minor()
                        + split.operator_share.minor()
                        + split.platform_share.minor(),
                    paid.minor(),
                    "leakage at paid={paid} fee_bps={fee_bps}"
                );
            }
        }
    }

    #[test]
    fn residual_cent_goes_to_platform() {
        // 101 cents at 3% fee: platform base = 3.03 -> 3, pool = 98,
        // operator 1% of 98 -> 0, investor 99% of 98 -> 97, platform = 4.
        let split = split_settlement(Money::from_minor(101), pct(3.0));
        assert_eq!(split.investor_share, Money::from_minor(97));
        assert_eq!(split.operator_share, Money::from_minor(0));
        assert_eq!(split.platform_share, Money::from_minor(4));
    }
}
