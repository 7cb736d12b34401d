#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shard_market::settlement::pricing::{
        confirmation_window, nominal_amount, per_shard_cost, real_amount, total_cost, GIB,
        RATE_SCALE,
    };

    const MIB: u64 = 1 << 20;

    #[test]
    fn test_nominal_amount_rounds_up() {
        // 250 * 4 MiB * 30 days / 1 GiB = 29.29...
        assert_eq!(nominal_amount(250, 4 * MIB, 30), 30);
        assert_eq!(nominal_amount(256, 4 * MIB, 30), 30);
        assert_eq!(nominal_amount(10, GIB as u64, 2), 20);
    }

    #[test]
    fn test_nominal_amount_is_never_zero() {
        assert_eq!(nominal_amount(1, 1, 1), 1);
        assert_eq!(nominal_amount(0, 4 * MIB, 30), 1);
    }

    #[test]
    fn test_real_amount_applies_rate() {
        assert_eq!(real_amount(30, RATE_SCALE as u64), 30);
        assert_eq!(real_amount(30, 1_500_000), 45);
        assert_eq!(real_amount(3, 500_000), 1);
    }

    #[test]
    fn test_total_cost_scales_with_shards() {
        let one = per_shard_cost(4 * MIB, 250, 30, RATE_SCALE as u64);
        assert_eq!(one, 30);
        assert_eq!(total_cost(4 * MIB, 250, 30, RATE_SCALE as u64, 50), 1_500);
        assert_eq!(total_cost(4 * MIB, 250, 30, RATE_SCALE as u64, 0), 0);
    }

    #[test]
    fn test_extreme_terms_saturate() {
        assert_eq!(nominal_amount(u64::MAX, u64::MAX, u64::MAX), u64::MAX);
        assert_eq!(
            total_cost(u64::MAX, u64::MAX, u64::MAX, u64::MAX, usize::MAX),
            u128::MAX
        );
    }

    #[test]
    fn test_confirmation_window_bounds() {
        let half_hour = Duration::from_secs(30 * 60);
        assert_eq!(confirmation_window(0), half_hour);
        assert_eq!(confirmation_window(1), half_hour);
        assert_eq!(confirmation_window(GIB as u64), half_hour);
        assert_eq!(confirmation_window(GIB as u64 + 1), half_hour * 2);
        assert_eq!(
            confirmation_window(100 * GIB as u64),
            Duration::from_secs(24 * 60 * 60)
        );
    }
}
