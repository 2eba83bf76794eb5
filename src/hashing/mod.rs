//! BLAKE3 hashing helpers for ids and cache keys.

use blake3::Hasher;

/// Computes a 64-bit hash of the input, truncated from BLAKE3's 256 bits.
///
/// 64 bits is plenty for point ids and cache keys: collisions at practical
/// corpus sizes are negligible, and a collision degrades to a replaced point
/// or a cache miss, never corruption.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Stable numeric form of a tenant identifier.
#[inline]
pub fn hash_tenant_id(tenant: &str) -> u64 {
    hash_to_u64(tenant.as_bytes())
}

/// Deterministic vector point id for a corpus chunk.
///
/// Keyed on `(tenant, source, chunk_index)` so re-ingesting the same file
/// replaces prior points instead of duplicating them.
#[inline]
pub fn chunk_point_id(tenant: &str, source: &str, chunk_index: u32) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"|");
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(&chunk_index.to_le_bytes());

    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Deterministic vector point id for a semantic cache entry.
#[inline]
pub fn cache_point_id(tenant: &str, query: &str) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"|");
    hasher.update(query.as_bytes());

    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Exact-match cache key for `(tenant, query)`.
#[inline]
pub fn exact_query_key(tenant: &str, query: &str) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"|");
    hasher.update(query.as_bytes());
    *hasher.finalize().as_bytes()
}
