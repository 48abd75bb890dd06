use crate::{Database, Driver, Result};
use std::ops::{Deref, DerefMut};

/// Transaction scope over a [`Database`].
///
/// The scope ends with [`Transaction::complete`] or [`Transaction::abort`]. A scope dropped
/// without either is aborted, so the whole transaction is rolled back.
pub struct Transaction<'a, D: Driver> {
    database: &'a mut Database<D>,
    done: bool,
}

impl<'a, D: Driver> Transaction<'a, D> {
    pub(crate) fn begin(database: &'a mut Database<D>) -> Result<Self> {
        database.begin_transaction()?;
        Ok(Self {
            database,
            done: false,
        })
    }

    pub fn complete(mut self) -> Result<()> {
        self.done = true;
        self.database.complete_transaction()
    }

    pub fn abort(mut self) -> Result<()> {
        self.done = true;
        self.database.abort_transaction()
    }
}

impl<D: Driver> Deref for Transaction<'_, D> {
    type Target = Database<D>;

    fn deref(&self) -> &Self::Target {
        self.database
    }
}

impl<D: Driver> DerefMut for Transaction<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.database
    }
}

impl<D: Driver> Drop for Transaction<'_, D> {
    fn drop(&mut self) {
        if !self.done {
            log::warn!("Transaction scope dropped without completing, aborting it");
            if let Err(error) = self.database.abort_transaction() {
                log::error!("{error:#}");
            }
        }
    }
}

impl<D: Driver> Database<D> {
    /// Opens a transaction scope, see [`Database::begin_transaction`].
    pub fn transaction(&mut self) -> Result<Transaction<'_, D>> {
        Transaction::begin(self)
    }
}
