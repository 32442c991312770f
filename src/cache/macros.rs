/// Wraps an upstream call in a TTL cache lookup.
///
/// Returns the cached value when present. Otherwise awaits `$block`, propagates its
/// error with `?` (errors are never cached), stores the value with `$ttl` and returns
/// it. A failed cache write is logged and the request proceeds uncached.
///
/// # Arguments
/// * `$cache`: a [`TtlCache`](crate::cache::TtlCache)
/// * `$key`: the [`CacheKey`](crate::cache::CacheKey) for this call
/// * `$ttl`: `Option<Duration>`; `None` caches until explicit eviction
/// * `$block`: the future to run on a miss
///
/// # Example
/// ```rust,ignore
/// cached!(self.cache, key, Some(self.ttl), async move {
///     self.fetch_from_upstream().await
/// })
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get(&$key) {
            Ok(cached)
        } else {
            let value = $block.await?;
            if !$cache.set(&$key, &value, $ttl) {
                tracing::warn!(key = %$key, "Cache write failed, continuing uncached");
            }
            Ok(value)
        }
    }};
}
