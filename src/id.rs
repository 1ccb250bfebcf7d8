use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique id such as `client-1f2e-7`.
///
/// The process id keeps ids from different workers talking to the same
/// broker apart; the counter keeps them unique within this process.
pub(crate) fn next_id(prefix: &str) -> String {
    format!(
        "{}-{:x}-{}",
        prefix,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = next_id("client");
        let b = next_id("client");
        assert!(a.starts_with("client-"));
        assert_ne!(a, b);
    }
}
