use std::time::Duration;

pub const GIB: u128 = 1 << 30;

/// Exchange rates carry six decimals.
pub const RATE_SCALE: u128 = 1_000_000;

const MIN_CONFIRM_WINDOW: Duration = Duration::from_secs(30 * 60);
const MAX_CONFIRM_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Nominal contract amount for storing `shard_size` bytes for `days` days at
/// `price` per GiB-day. Never below 1.
pub fn nominal_amount(price: u64, shard_size: u64, days: u64) -> u64 {
    let numerator = (price as u128)
        .saturating_mul(shard_size as u128)
        .saturating_mul(days as u128);
    let amount = numerator.div_ceil(GIB).max(1);
    u64::try_from(amount).unwrap_or(u64::MAX)
}

/// Nominal amount converted at `rate`.
pub fn real_amount(nominal: u64, rate: u64) -> u128 {
    nominal as u128 * rate as u128 / RATE_SCALE
}

pub fn per_shard_cost(shard_size: u64, price: u64, days: u64, rate: u64) -> u128 {
    real_amount(nominal_amount(price, shard_size, days), rate)
}

/// What the renter must hold before negotiation starts.
pub fn total_cost(shard_size: u64, price: u64, days: u64, rate: u64, shard_count: usize) -> u128 {
    per_shard_cost(shard_size, price, days, rate).saturating_mul(shard_count as u128)
}

/// How long the renter keeps polling for storage confirmations: half an hour
/// per started GiB, clamped to [30 min, 24 h].
pub fn confirmation_window(total_bytes: u64) -> Duration {
    let gib = (total_bytes as u128).div_ceil(GIB).max(1);
    let secs = MIN_CONFIRM_WINDOW.as_secs() as u128 * gib;
    let secs = secs.min(MAX_CONFIRM_WINDOW.as_secs() as u128) as u64;
    Duration::from_secs(secs).max(MIN_CONFIRM_WINDOW)
}

