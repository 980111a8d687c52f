//! Splitting the test inventory across a fleet

/// Split `items` into `buckets` contiguous, order-preserving chunks whose
/// sizes differ by at most one.
///
/// Every item lands in exactly one chunk. With fewer items than buckets the
/// trailing chunks are empty; zero buckets yields no chunks.
pub fn partition<T: Clone>(items: &[T], buckets: usize) -> Vec<Vec<T>> {
    if buckets == 0 {
        return Vec::new();
    }

    let base = items.len() / buckets;
    let extra = items.len() % buckets;

    let mut chunks = Vec::with_capacity(buckets);
    let mut start = 0;
    for i in 0..buckets {
        let len = base + usize::from(i < extra);
        chunks.push(items[start..start + len].to_vec());
        start += len;
    }
    chunks
}
