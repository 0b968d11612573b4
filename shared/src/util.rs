/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms, collision-free at shop scale)
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}

/// Parse a user-entered credit amount ("10", "₹50", "$5", "1,000") to a
/// positive integer. Rejects zero, negatives and garbage.
pub fn parse_credits(input: &str) -> Option<i64> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '₹' | '$' | ','))
        .collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    if !value.is_finite() || value < 1.0 {
        return None;
    }
    Some(value as i64)
}

/// Parse a user-entered USD amount to a positive f64 (minimum 0.1).
pub fn parse_usd(input: &str) -> Option<f64> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ','))
        .collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    if !value.is_finite() || value < 0.1 {
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_ids_are_positive_and_distinct() {
        let a = snowflake_id();
        let b = snowflake_id();
        assert!(a > 0);
        assert!(b > 0);
        // Same millisecond collisions are possible but vanishingly rare
        // with 12 random bits; distinct timestamps guarantee ordering.
        assert!(a >> 12 <= b >> 12);
    }

    #[test]
    fn parse_credits_accepts_common_forms() {
        assert_eq!(parse_credits("10"), Some(10));
        assert_eq!(parse_credits(" ₹50 "), Some(50));
        assert_eq!(parse_credits("1,000"), Some(1000));
        assert_eq!(parse_credits("10.9"), Some(10));
    }

    #[test]
    fn parse_credits_rejects_garbage() {
        assert_eq!(parse_credits("abc"), None);
        assert_eq!(parse_credits("0"), None);
        assert_eq!(parse_credits("-5"), None);
        assert_eq!(parse_credits(""), None);
    }

    #[test]
    fn parse_usd_enforces_minimum() {
        assert_eq!(parse_usd("$5.50"), Some(5.5));
        assert_eq!(parse_usd("0.1"), Some(0.1));
        assert_eq!(parse_usd("0.05"), None);
    }
}
