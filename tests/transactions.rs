#[cfg(test)]
mod tests {
    use sluice::{Error, SluiceError};
    use sluice_tests::{Event, Response, ScriptedDriver, database, init_logs};

    const INSERT: &str = "INSERT INTO [FD_GroupNote] ([Text]) VALUES (N'x')";

    #[test]
    fn nested_scopes_share_one_transaction() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.begin_transaction().unwrap();
        db.execute(INSERT).unwrap();
        db.begin_transaction().unwrap();
        assert_eq!(db.transaction_depth(), 2);
        db.execute(INSERT).unwrap();
        db.complete_transaction().unwrap();
        assert!(db.in_transaction());
        assert_eq!(driver.committed_rows(), 0);
        db.complete_transaction().unwrap();
        assert!(!db.in_transaction());
        assert_eq!(
            driver.events(),
            [
                Event::Connect,
                Event::Begin,
                Event::Execute(INSERT.into()),
                Event::Execute(INSERT.into()),
                Event::Commit,
                Event::Close,
            ]
        );
        assert_eq!(driver.committed_rows(), 2);
        assert!(driver.commands().iter().all(|c| c.in_transaction));
    }

    #[test]
    fn inner_abort_rolls_back_everything() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.begin_transaction().unwrap();
        db.begin_transaction().unwrap();
        db.execute(INSERT).unwrap();
        db.abort_transaction().unwrap();
        db.complete_transaction().unwrap();
        assert_eq!(
            driver.events(),
            [
                Event::Connect,
                Event::Begin,
                Event::Execute(INSERT.into()),
                Event::Rollback,
                Event::Close,
            ]
        );
        assert_eq!(driver.committed_rows(), 0);

        db.begin_transaction().unwrap();
        db.execute(INSERT).unwrap();
        db.complete_transaction().unwrap();
        assert_eq!(driver.committed_rows(), 1);
    }

    #[test]
    fn ending_without_a_transaction_fails() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        assert!(db.complete_transaction().is_err());
        assert!(db.abort_transaction().is_err());
        assert!(driver.events().is_empty());
    }

    #[test]
    fn with_transaction() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let affected = db
            .with_transaction(|db| Ok(db.execute(INSERT)? + db.execute(INSERT)?))
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(driver.count(&Event::Commit), 1);

        let error = db
            .with_transaction(|db| {
                db.execute(INSERT)?;
                Err::<(), _>(Error::msg("Validation failed"))
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "Validation failed");
        assert_eq!(driver.count(&Event::Rollback), 1);
        assert_eq!(driver.committed_rows(), 2);

        driver.on("FD_Fail", Response::fail("Conversion failed."));
        let error = db
            .with_transaction(|db| db.execute("DELETE FROM [FD_Fail]"))
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::Execution { .. })
        ));
        assert_eq!(driver.count(&Event::Rollback), 2);
        assert_eq!(db.transaction_depth(), 0);
        assert!(!db.is_connected());
    }

    #[test]
    fn scope_guard() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        {
            let mut transaction = db.transaction().unwrap();
            transaction.execute(INSERT).unwrap();
        }
        assert_eq!(driver.count(&Event::Rollback), 1);
        assert_eq!(driver.committed_rows(), 0);

        let mut transaction = db.transaction().unwrap();
        transaction.execute(INSERT).unwrap();
        transaction.complete().unwrap();
        assert_eq!(driver.count(&Event::Commit), 1);
        assert_eq!(driver.committed_rows(), 1);

        let transaction = db.transaction().unwrap();
        transaction.abort().unwrap();
        assert_eq!(driver.count(&Event::Rollback), 2);
    }

    #[test]
    fn dropping_the_database_rolls_back() {
        init_logs();
        let driver = ScriptedDriver::new();
        {
            let mut db = database(&driver);
            db.begin_transaction().unwrap();
            db.execute(INSERT).unwrap();
        }
        assert_eq!(
            driver.events(),
            [
                Event::Connect,
                Event::Begin,
                Event::Execute(INSERT.into()),
                Event::Rollback,
                Event::Close,
            ]
        );
        assert_eq!(driver.committed_rows(), 0);
    }
}
