use plugin_core::MessageId;

/// Message ids covered by `offset` relative to `base`.
///
/// Positive offsets walk forward and include `base`; negative offsets walk
/// backward and stop just before it.
#[must_use]
pub fn resolve_ids(base: MessageId, offset: i64) -> Vec<MessageId> {
    match offset {
        0 => vec![base],
        n if n > 0 => (base..=base.saturating_add(n)).collect(),
        n => (base.saturating_add(n)..base).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_offset_is_just_the_base() {
        assert_eq!(resolve_ids(100, 0), vec![100]);
    }

    #[test]
    fn positive_offsets_include_base_and_are_contiguous() {
        for offset in 1..=20 {
            let ids = resolve_ids(100, offset);
            assert_eq!(ids.len(), usize::try_from(offset).unwrap() + 1);
            assert_eq!(ids.first(), Some(&100));
            assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn negative_offsets_exclude_base() {
        assert_eq!(resolve_ids(100, -1), vec![99]);
        assert_eq!(resolve_ids(100, -3), vec![97, 98, 99]);
        for offset in 1..=20 {
            let ids = resolve_ids(100, -offset);
            assert_eq!(ids.len(), usize::try_from(offset).unwrap());
            assert_eq!(ids.last(), Some(&99));
        }
    }
}
