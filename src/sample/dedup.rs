//! Row deduplication.

use crate::schema::Row;
use ahash::AHashSet;

/// Keep the first row of every (entity, primary key) identity, preserving
/// order.
pub fn dedup(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = AHashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert((row.entity, row.pk.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityId;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let user = Row::new(EntityId(0), 1).with("name", "first");
        let post = Row::new(EntityId(1), 1);
        let rows = vec![
            user.clone(),
            post.clone(),
            Row::new(EntityId(0), 1).with("name", "second"),
        ];
        assert_eq!(dedup(rows), vec![user, post]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let rows = vec![
            Row::new(EntityId(0), 2),
            Row::new(EntityId(0), 1),
            Row::new(EntityId(0), 2),
            Row::new(EntityId(1), "a"),
        ];
        let once = dedup(rows);
        assert_eq!(dedup(once.clone()), once);
        assert_eq!(once.len(), 3);
    }
}
