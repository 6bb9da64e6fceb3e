use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Round a money amount to two decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Smallest accepted raise over `amount` for a percent step.
pub fn min_increase(amount: Decimal, step_percent: u32) -> Decimal {
    let factor = Decimal::ONE + Decimal::from(step_percent) / Decimal::ONE_HUNDRED;
    round_money(amount * factor)
}

/// Usernames: 3-50 chars from `[A-Za-z0-9_-]`, case-sensitive.
pub fn valid_username(name: &str) -> bool {
    (3..=50).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn min_increase_five_percent() {
        assert_eq!(min_increase(dec!(100), 5), dec!(105.00));
        assert_eq!(min_increase(dec!(105), 5), dec!(110.25));
    }

    #[test]
    fn min_increase_rounds_to_cents() {
        // 33.33 * 1.07 = 35.6631 -> 35.66
        assert_eq!(min_increase(dec!(33.33), 7), dec!(35.66));
        // 99.99 * 1.01 = 100.9899 -> 100.99
        assert_eq!(min_increase(dec!(99.99), 1), dec!(100.99));
    }

    #[test]
    fn round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
    }

    #[test]
    fn username_charset() {
        assert!(valid_username("user_1-a"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"x".repeat(51)));
    }
}
