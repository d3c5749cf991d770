//! Key encoding for the per-user tables. `\0` is used as a field separator
//! so prefix ranges stay correct regardless of what characters appear in a
//! user id, session id, or lock name (redb orders string keys
//! lexicographically).

/// Fixed width so zero-padded sequence numbers sort numerically as strings.
const SEQ_WIDTH: usize = 20;

#[must_use]
pub(crate) fn l0_key(user: &str, seq: u64) -> String {
    format!("{user}\0{seq:0width$}", width = SEQ_WIDTH)
}

#[must_use]
pub(crate) fn l0_prefix_range(user: &str) -> (String, String) {
    (format!("{user}\0"), format!("{user}\u{1}"))
}

#[must_use]
pub(crate) fn l1_key(user: &str, session_id: &str) -> String {
    format!("{user}\0{session_id}")
}

#[must_use]
pub(crate) fn l1_prefix_range(user: &str) -> (String, String) {
    (format!("{user}\0"), format!("{user}\u{1}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l0_keys_sort_in_sequence_order() {
        let a = l0_key("u1", 1);
        let b = l0_key("u1", 2);
        let c = l0_key("u1", 10);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn prefix_range_excludes_other_users() {
        let (start, end) = l0_prefix_range("u1");
        let other = l0_key("u10", 0);
        assert!(other.as_str() >= end.as_str() || !other.starts_with(&start));
    }
}
