#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use sluice::{Command, Database, Error, Hooks, SluiceError, Sql, Value, expr};
    use sluice_tests::{
        BaseData, Event, HouseData, Response, RowStatus, ScriptedDriver, database, init_logs,
    };
    use std::{sync::Arc, time::Duration};
    use time::macros::datetime;
    use uuid::Uuid;

    const SELECT_BASE_DATA: &str = "SELECT t.[Id], t.[Code], t.[Description], t.[Amount], t.[Status], t.[Deleted], t.[Created]\nFROM [FD_BaseData] t WITH (NOLOCK)";

    fn base_data_rows(count: i64) -> Response {
        Response::rows(
            &[
                ("Id", Value::Int64(None)),
                ("Code", Value::Varchar(None)),
                ("Description", Value::Varchar(None)),
                ("Amount", Value::Decimal(None)),
                ("Status", Value::Int32(None)),
                ("Deleted", Value::Boolean(None)),
                ("Created", Value::Timestamp(None)),
                ("Total", Value::Int32(None)),
            ],
            (1..=count)
                .map(|i| {
                    vec![
                        Value::Int64(Some(i)),
                        Value::Varchar(Some(format!("C{i}"))),
                        Value::Varchar(None),
                        Value::Decimal(Some(Decimal::new(1250, 2))),
                        Value::Int32(Some(2)),
                        Value::Boolean(Some(i % 2 == 0)),
                        Value::Timestamp(Some(datetime!(2024-02-29 08:30:15.25))),
                        Value::Int32(Some(i as i32 * 10)),
                    ]
                })
                .collect(),
        )
    }

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Hooks for Recorder {
        fn on_connection_opened(&self, _url: &str) {
            self.0.lock().push("opened".into());
        }
        fn on_connection_closing(&self, _url: &str) {
            self.0.lock().push("closing".into());
        }
        fn on_executing_command(&self, command: &Command) {
            self.0.lock().push(format!("executing {}", command.sql));
        }
        fn on_executed_command(&self, _command: &Command) {
            self.0.lock().push("executed".into());
        }
        fn on_exception(&self, _command: &Command, error: &Error) {
            self.0.lock().push(format!("exception {error}"));
        }
    }

    #[test]
    fn fetch_selects_mapped_columns() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("FROM [FD_BaseData]", base_data_rows(2));
        let mut db = database(&driver);
        let rows = db.fetch::<BaseData>(Sql::new()).unwrap();
        assert_eq!(
            driver.events(),
            [
                Event::Connect,
                Event::Query(SELECT_BASE_DATA.into()),
                Event::Close
            ]
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1],
            BaseData {
                id: 2,
                code: "C2".into(),
                description: None,
                amount: Decimal::new(1250, 2),
                status: RowStatus::Suspended,
                deleted: true,
                created: Some(datetime!(2024-02-29 08:30:15.25)),
                total: Some(20),
            }
        );
        assert!(!db.is_connected());
    }

    #[test]
    fn materializers_are_reused() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("FD_BaseData", base_data_rows(3));
        let mut db = database(&driver);
        for _ in 0..3 {
            let rows = db
                .fetch_where::<BaseData>(expr!(|d| d.code == "C1"))
                .unwrap();
            assert_eq!(rows.len(), 3);
        }
        assert_eq!(db.materializers().built(), 1);
        assert_eq!(
            db.last_sql(),
            Some(format!("{SELECT_BASE_DATA}\nWHERE t.[Code] = @0").as_str())
        );
        assert_eq!(db.last_args(), [Value::from("C1")]);

        let first = db
            .first_where::<BaseData>(expr!(|d| d.status == RowStatus::Suspended))
            .unwrap();
        assert_eq!(first.map(|d| d.id), Some(1));
        assert_eq!(db.materializers().built(), 2);
    }

    #[test]
    fn lazy_rows_hold_the_connection() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("FD_BaseData", base_data_rows(4));
        let mut db = database(&driver);
        let mut codes = Vec::new();
        {
            let rows = db.query::<BaseData>("WHERE t.[Deleted] = 0").unwrap();
            assert!(rows.command().sql.ends_with("WHERE t.[Deleted] = 0"));
            for row in rows {
                codes.push(row.unwrap().code);
            }
        }
        assert_eq!(codes, ["C1", "C2", "C3", "C4"]);
        assert_eq!(driver.count(&Event::Close), 1);
        assert_eq!(db.connection_depth(), 0);
    }

    #[test]
    fn complete_statements_are_sent_as_they_are() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("EXEC", base_data_rows(1));
        driver.on("SELECT Code", Response::rows(
            &[("Code", Value::Varchar(None)), ("N", Value::Int32(None))],
            vec![
                vec![Value::from("A"), Value::Int32(Some(3))],
                vec![Value::from("B"), Value::Int32(Some(1))],
            ],
        ));
        let mut db = database(&driver);
        let rows = db
            .fetch::<BaseData>(Sql::new().raw("EXEC [GetBaseData] @0", vec![7.into()]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(db.last_sql(), Some("EXEC [GetBaseData] @0"));

        let rows = db
            .fetch_dynamic("SELECT Code, COUNT(*) AS N FROM [FD_BaseData] GROUP BY Code")
            .unwrap();
        assert_eq!(
            rows[0].keys().map(String::as_str).collect::<Vec<_>>(),
            ["Code", "N"]
        );
        assert_eq!(rows[1]["Code"], Value::from("B"));
        assert_eq!(rows[1]["N"], Value::Int32(Some(1)));
    }

    #[test]
    fn scalars() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("MAX([Id])", Response::Scalar(Value::Int32(Some(41))));
        let mut db = database(&driver);
        let max: i64 = db
            .execute_scalar("SELECT MAX([Id]) FROM [FD_BaseData]")
            .unwrap();
        assert_eq!(max, 41);
        let missing: Option<i64> = db
            .execute_scalar("SELECT [Id] FROM [FD_BaseData] WHERE 1 = 0")
            .unwrap();
        assert_eq!(missing, None);
        assert_eq!(
            db.execute_scalar_value("SELECT MAX([Id]) FROM [FD_BaseData]")
                .unwrap(),
            Value::Int32(Some(41))
        );
    }

    #[test]
    fn pages() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("SELECT COUNT(*)", Response::Scalar(Value::Int32(Some(25))));
        driver.on("ROW_NUMBER()", base_data_rows(10));
        let mut db = database(&driver);
        let page = db
            .page::<BaseData>(2, 10, Sql::new().order_by::<BaseData>(&["code"]))
            .unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 10);

        let commands = driver.commands();
        assert_eq!(commands.len(), 2);
        assert!(
            commands[0]
                .sql
                .starts_with("SELECT COUNT(*) FROM [FD_BaseData] t WITH (NOLOCK)")
        );
        assert!(!commands[0].sql.contains("ORDER BY"));
        assert!(
            commands[1]
                .sql
                .starts_with("SELECT * FROM (SELECT ROW_NUMBER() OVER (ORDER BY t.[Code]) AS rn, t.[Id]")
        );
        assert!(commands[1].sql.ends_with(") page WHERE rn > @0 AND rn <= @1"));
        assert_eq!(commands[1].args, [Value::Int64(Some(10)), Value::Int64(Some(20))]);

        driver.clear();
        let page = db
            .page::<BaseData>(
                0,
                10,
                Sql::new().where_raw("t.[Code] = @0", vec!["C1".into()]),
            )
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(page.current_page, 1);
        let commands = driver.commands();
        assert_eq!(commands[0].args, [Value::from("C1")]);
        assert!(commands[1].sql.contains("ROW_NUMBER() OVER (ORDER BY (SELECT NULL))"));
        assert_eq!(
            commands[1].args,
            [Value::from("C1"), Value::Int64(Some(0)), Value::Int64(Some(10))]
        );
    }

    #[test]
    fn skip_take() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("ROW_NUMBER()", base_data_rows(5));
        let mut db = database(&driver);
        let rows = db
            .skip_take::<BaseData>(
                40,
                5,
                Sql::new().where_expr::<BaseData>(expr!(|d| d.amount > 0)),
            )
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(
            db.last_args(),
            [
                Value::Int32(Some(0)),
                Value::Int64(Some(40)),
                Value::Int64(Some(45))
            ]
        );
        assert!(db.last_sql().unwrap().ends_with("WHERE rn > @1 AND rn <= @2"));
    }

    #[test]
    fn windows_at_the_end_of_the_range() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("ROW_NUMBER()", base_data_rows(0));
        let mut db = database(&driver);
        let error = db
            .page::<BaseData>(u64::MAX, 10, Sql::new())
            .unwrap_err();
        assert!(format!("{error:#}").contains("beyond the addressable rows"));
        assert!(driver.commands().is_empty());

        let rows = db
            .skip_take::<BaseData>(u64::MAX - 1, 10, Sql::new())
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(
            db.last_args(),
            [Value::Int64(Some(i64::MAX)), Value::Int64(Some(i64::MAX))]
        );
    }

    #[test]
    fn insert_reads_back_the_identity() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("OUTPUT INSERTED.[Id]", Response::Scalar(Value::Int32(Some(77))));
        let mut db = database(&driver);
        let mut item = BaseData::new(0, "N1");
        assert_eq!(db.insert(&mut item).unwrap(), 1);
        assert_eq!(item.id, 77);
        let command = driver.last_command().unwrap();
        assert_eq!(
            command.sql,
            "INSERT INTO [FD_BaseData] ([Code], [Description], [Amount], [Status], [Deleted], [Created]) OUTPUT INSERTED.[Id] VALUES (@0, @1, @2, @3, @4, @5)"
        );
        assert_eq!(command.args.len(), 6);
        assert_eq!(command.args[0], Value::from("N1"));
        assert_eq!(command.args[3], Value::Int32(Some(1)));
        assert!(driver.events().contains(&Event::Scalar(command.sql.clone())));
    }

    #[test]
    fn insert_with_client_key() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let id = Uuid::from_u128(0x6f1d_42a7);
        let mut house = HouseData {
            id,
            street: "Via Roma 1".into(),
            region: "North".into(),
            price: Some(250_000.0),
            listed: None,
        };
        assert_eq!(db.insert(&mut house).unwrap(), 1);
        let command = driver.last_command().unwrap();
        assert_eq!(
            command.sql,
            "INSERT INTO [FD_House] ([HouseID], [Street], [Price], [Listed]) VALUES (@0, @1, @2, @3)"
        );
        assert_eq!(command.args[0], Value::Uuid(Some(id)));
        assert_eq!(house.id, id);
    }

    #[test]
    fn update_by_primary_key() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let item = BaseData::new(5, "U1");
        assert_eq!(db.update(&item, &["code"]).unwrap(), 1);
        let command = driver.last_command().unwrap();
        assert_eq!(
            command.sql,
            "UPDATE [FD_BaseData] SET [Code] = @0 WHERE [Id] = @1"
        );
        assert_eq!(command.args, [Value::from("U1"), Value::Int64(Some(5))]);

        db.update(&item, &[]).unwrap();
        assert_eq!(
            driver.last_command().unwrap().sql,
            "UPDATE [FD_BaseData] SET [Code] = @0, [Description] = @1, [Amount] = @2, [Status] = @3, [Deleted] = @4, [Created] = @5 WHERE [Id] = @6"
        );
        assert!(db.update(&item, &["population"]).is_err());
    }

    #[test]
    fn hooks_see_everything() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("[FD_Missing]", Response::fail("Invalid object name 'FD_Missing'."));
        let recorder = Recorder::default();
        let mut db = database(&driver).with_hooks(recorder.clone());
        db.execute("DELETE FROM [FD_BaseData] WHERE [Deleted] = 1")
            .unwrap();
        let error = db.execute("DELETE FROM [FD_Missing]").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::Execution { message, severity: Some(16), state: Some(1) })
                if message == "Invalid object name 'FD_Missing'."
        ));
        assert!(format!("{error:#}").contains("While executing `DELETE FROM [FD_Missing]`"));
        assert_eq!(
            *recorder.0.lock(),
            [
                "opened",
                "executing DELETE FROM [FD_BaseData] WHERE [Deleted] = 1",
                "executed",
                "closing",
                "opened",
                "executing DELETE FROM [FD_Missing]",
                "exception Invalid object name 'FD_Missing'.",
                "closing",
            ]
        );
    }

    #[test]
    fn timeouts() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = Database::new(
            driver.clone(),
            "mssql://sa@localhost/sluice_test?timeout=30",
        )
        .unwrap();
        db.one_time_command_timeout(Duration::from_secs(300))
            .execute("UPDATE [FD_BaseData] SET [Deleted] = 1")
            .unwrap();
        db.execute("UPDATE [FD_BaseData] SET [Deleted] = 0").unwrap();
        let commands = driver.commands();
        assert_eq!(commands[0].timeout, Some(Duration::from_secs(300)));
        assert_eq!(commands[1].timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn shared_connection() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.execute("DELETE FROM [FD_BaseData]").unwrap();
        db.execute("DELETE FROM [FD_BaseData]").unwrap();
        assert_eq!(driver.count(&Event::Connect), 2);

        let driver = ScriptedDriver::new();
        let mut db = Database::new(
            driver.clone(),
            "mssql://sa@localhost/sluice_test?keep_alive=true",
        )
        .unwrap();
        db.execute("DELETE FROM [FD_BaseData]").unwrap();
        db.execute("DELETE FROM [FD_BaseData]").unwrap();
        assert_eq!(driver.count(&Event::Connect), 1);
        assert!(db.is_connected());
        drop(db);
        assert_eq!(driver.count(&Event::Close), 1);

        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.open_shared_connection().unwrap();
        db.execute("DELETE FROM [FD_BaseData]").unwrap();
        db.execute("DELETE FROM [FD_BaseData]").unwrap();
        db.close_shared_connection().unwrap();
        assert_eq!(driver.count(&Event::Connect), 1);
        assert_eq!(driver.count(&Event::Close), 1);
    }

    #[test]
    fn parameter_binding_errors() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let error = db
            .execute(Sql::new().raw("DELETE FROM [FD_BaseData] WHERE [Id] = @1", vec![1.into()]))
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::ParameterBinding { .. })
        ));
        assert!(driver.events().is_empty());
    }
}
