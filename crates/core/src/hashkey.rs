use md5::{Digest, Md5};

/// Derives an opaque, unpredictable key from a seed string.
///
/// Used for `pullkey` generation (seed is `pull_time ∥ submission id`) and for
/// file storage keys (seed is `xqueue_header ∥ filename`). The reference
/// system uses `hashlib.md5(str(seed)).hexdigest()`; MD5 is not used here for
/// any security property, only as a stable, collision-unlikely key derivation
/// matching that exact format.
pub fn make_hashkey(seed: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}
