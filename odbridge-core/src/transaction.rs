use crate::{Completion, Connection, Native, Result};
use std::ops::Deref;

/// A transaction in progress on a connection.
///
/// Committing or rolling back consumes the guard and switches autocommit
/// back on if it was on when the transaction started. A guard dropped
/// without either rolls back.
pub struct Transaction<'c, N: Native> {
    connection: &'c Connection<N>,
    restore_auto_commit: bool,
    finished: bool,
}

impl<N: Native> std::fmt::Debug for Transaction<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", self.connection)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'c, N: Native> Transaction<'c, N> {
    pub(crate) fn new(connection: &'c Connection<N>, restore_auto_commit: bool) -> Self {
        Self {
            connection,
            restore_auto_commit,
            finished: false,
        }
    }

    pub fn connection(&self) -> &'c Connection<N> {
        self.connection
    }

    pub fn commit(mut self) -> Result<()> {
        self.finish(Completion::Commit)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finish(Completion::Rollback)
    }

    fn finish(&mut self, completion: Completion) -> Result<()> {
        self.finished = true;
        let result = match completion {
            Completion::Commit => self.connection.commit(),
            Completion::Rollback => self.connection.rollback(),
        };
        if self.restore_auto_commit && self.connection.is_open() {
            let restored = self.connection.set_auto_commit(true);
            return result.and(restored);
        }
        result
    }
}

impl<'c, N: Native> Deref for Transaction<'c, N> {
    type Target = Connection<N>;

    fn deref(&self) -> &Self::Target {
        self.connection
    }
}

impl<'c, N: Native> Drop for Transaction<'c, N> {
    fn drop(&mut self) {
        if self.finished || !self.connection.is_open() {
            return;
        }
        log::warn!("Dropping a transaction without commit or rollback, it will be rolled back");
        let _ = self.finish(Completion::Rollback);
    }
}
