use crate::{Cursor, Native};
use std::ops::AddAssign;

/// Rows affected by a statement that does not produce a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// `None` when the native library cannot tell, as for most schema changes.
    pub rows_affected: Option<u64>,
}

impl RowsAffected {
    pub const NONE: RowsAffected = RowsAffected {
        rows_affected: Some(0),
    };

    /// From the native row count, where a negative value means unknown.
    pub fn from_native(count: i64) -> Self {
        Self {
            rows_affected: u64::try_from(count).ok(),
        }
    }
}

impl AddAssign for RowsAffected {
    fn add_assign(&mut self, rhs: Self) {
        self.rows_affected = self.rows_affected.zip(rhs.rows_affected).map(|(a, b)| a + b);
    }
}

/// Outcome of an execution, as classified by the native library.
pub enum QueryResult<N: Native> {
    Affected(RowsAffected),
    Rows(Cursor<N>),
}

impl<N: Native> QueryResult<N> {
    /// `None` for a result set and when the native library cannot count the
    /// affected rows.
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            QueryResult::Affected(v) => v.rows_affected,
            QueryResult::Rows(..) => None,
        }
    }

    pub fn into_cursor(self) -> Option<Cursor<N>> {
        match self {
            QueryResult::Rows(v) => Some(v),
            QueryResult::Affected(..) => None,
        }
    }
}

impl<N: Native> std::fmt::Debug for QueryResult<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryResult::Affected(v) => f.debug_tuple("Affected").field(v).finish(),
            QueryResult::Rows(v) => f.debug_tuple("Rows").field(&v.columns()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_row_count() {
        assert_eq!(RowsAffected::from_native(-1).rows_affected, None);
        assert_eq!(RowsAffected::from_native(0), RowsAffected::NONE);
        let mut total = RowsAffected::from_native(2);
        total += RowsAffected::from_native(3);
        assert_eq!(total.rows_affected, Some(5));
        total += RowsAffected::from_native(-1);
        assert_eq!(total.rows_affected, None);
    }
}
