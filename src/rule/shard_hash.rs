const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// Stable FNV-1a hash of a sharding value's text form.
///
/// Independent of process, platform and `std` hasher seeding, so the same value
/// always lands on the same target.
pub fn stable_hash(value: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in value.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Bucket in `0..buckets` for `value`; `0` when there are no buckets.
pub fn stable_bucket(value: &str, buckets: usize) -> usize {
    if buckets == 0 {
        return 0;
    }
    (stable_hash(value) % buckets as u64) as usize
}
