// Funds gate: can the account afford one more bracket?

use rust_decimal::Decimal;

use crate::types::PriceLevel;

/// Quote currency needed to buy `order_size` at `market_price` including fees.
pub fn required_funds(market_price: Decimal, order_size: Decimal, fee_rate: Decimal) -> Decimal {
    order_size * market_price * (Decimal::ONE + fee_rate)
}

pub fn has_sufficient_funds(
    market_price: Decimal,
    balance: Decimal,
    order_size: Decimal,
    fee_rate: Decimal,
) -> bool {
    balance >= required_funds(market_price, order_size, fee_rate)
}

/// Amount reserved in the ledger for a BUY leg at `level`, rounded down to
/// whole yen so the ledger never over-reserves.
pub fn reservation_cost(order_size: Decimal, level: PriceLevel, fee_rate: Decimal) -> Decimal {
    required_funds(Decimal::from(level), order_size, fee_rate).floor()
}

/// Largest size the balance can pay for at `market_price`.
pub fn max_affordable_size(market_price: Decimal, balance: Decimal, fee_rate: Decimal) -> Decimal {
    if market_price <= Decimal::ZERO || balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    balance / (market_price * (Decimal::ONE + fee_rate))
}

/// Whether `balance` covers at least the exchange's minimum order.
pub fn meets_min_order(
    market_price: Decimal,
    balance: Decimal,
    fee_rate: Decimal,
    min_order_size: Decimal,
) -> bool {
    max_affordable_size(market_price, balance, fee_rate) >= min_order_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sufficient_funds_boundary() {
        assert!(has_sufficient_funds(dec!(1000000), dec!(1001), dec!(0.001), dec!(0.001)));
        assert!(!has_sufficient_funds(dec!(1000000), dec!(999), dec!(0.001), dec!(0.001)));
        assert!(!has_sufficient_funds(dec!(1000000), dec!(1000.99), dec!(0.001), dec!(0.001)));
    }

    #[test]
    fn test_zero_fee() {
        assert!(has_sufficient_funds(dec!(1000000), dec!(1000), dec!(0.001), Decimal::ZERO));
    }

    #[test]
    fn test_reservation_cost_rounds_down() {
        assert_eq!(reservation_cost(dec!(0.001), 9_000_000, dec!(0.001)), dec!(9009));
        assert_eq!(reservation_cost(dec!(0.0015), 9_100_001, dec!(0.001)), dec!(13663));
    }

    #[test]
    fn test_max_affordable_size() {
        let size = max_affordable_size(dec!(1000000), dec!(2002), dec!(0.001));
        assert_eq!(size, dec!(0.002));
        assert_eq!(max_affordable_size(Decimal::ZERO, dec!(10), dec!(0.001)), Decimal::ZERO);
    }

    #[test]
    fn test_meets_min_order() {
        assert!(meets_min_order(dec!(1000000), dec!(1001), dec!(0.001), dec!(0.001)));
        assert!(!meets_min_order(dec!(1000000), dec!(900), dec!(0.001), dec!(0.001)));
    }
}
