#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rust_decimal::Decimal;
    use sluice::{Database, SluiceError, Sql, Value};
    use sluice_tests::{
        BaseData, BaseDataGroup, BaseDataGroupItem, Event, GroupNote, HouseData, Response,
        RowStatus, ScriptedDriver, database, init_logs,
    };
    use time::macros::datetime;
    use uuid::Uuid;

    const CATCH: &str = "END TRY\nBEGIN CATCH\nDECLARE @ErrorMessage NVARCHAR(4000) = ERROR_MESSAGE(), @ErrorSeverity INT = ERROR_SEVERITY(), @ErrorState INT = ERROR_STATE();\nRAISERROR(@ErrorMessage, @ErrorSeverity, @ErrorState);\nEND CATCH";

    fn items(count: usize) -> Vec<BaseData> {
        (0..count)
            .map(|i| BaseData::new(0, &format!("B{i:04}")))
            .collect()
    }

    #[test]
    fn chunks_share_one_transaction() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        assert_eq!(db.bulk_insert(&items(2500)).unwrap(), 2500);
        let executed = driver.executed();
        assert_eq!(executed.len(), 3);
        assert!(executed.iter().all(|b| b.starts_with("BEGIN TRY\n")));
        assert_eq!(executed[0].matches("INSERT INTO").count(), 1000);
        assert_eq!(executed[2].matches("INSERT INTO").count(), 500);
        assert_eq!(driver.count(&Event::Begin), 1);
        assert_eq!(driver.count(&Event::Commit), 1);
        assert_eq!(driver.committed_rows(), 2500);
        assert!(driver.commands().iter().all(|c| c.in_transaction));
        assert_eq!(db.bulk_insert::<BaseData>(&[]).unwrap(), 0);
    }

    #[test]
    fn configured_chunk_size() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = Database::new(
            driver.clone(),
            "mssql://sa@localhost/sluice_test?chunk_size=100",
        )
        .unwrap();
        db.bulk_insert(&items(250)).unwrap();
        assert_eq!(driver.executed().len(), 3);
    }

    #[test]
    fn failing_chunk_rolls_back_the_whole_operation() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on_nth(
            "BEGIN TRY",
            2,
            Response::fail("Violation of UNIQUE KEY constraint 'UQ_FD_BaseData_Code'."),
        );
        let mut db = database(&driver);
        let error = db.bulk_insert(&items(2500)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Violation of UNIQUE KEY constraint 'UQ_FD_BaseData_Code'."
        );
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::Execution { severity: Some(16), .. })
        ));
        assert_eq!(driver.executed().len(), 2);
        assert_eq!(driver.count(&Event::Rollback), 1);
        assert_eq!(driver.count(&Event::Commit), 0);
        assert_eq!(driver.committed_rows(), 0);
        assert!(!db.in_transaction());
    }

    #[test]
    fn rows_become_literals() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let item = BaseData {
            id: 0,
            code: "O'Neil".into(),
            description: Some("a@b".into()),
            amount: Decimal::new(1250, 2),
            status: RowStatus::Closed,
            deleted: true,
            created: Some(datetime!(1700-01-01 0:00)),
            total: Some(3),
        };
        let other = BaseData {
            created: Some(datetime!(2024-02-29 08:30:15.25)),
            ..BaseData::new(0, "X")
        };
        db.bulk_insert(&[item, other]).unwrap();
        let expected = indoc! {"
            BEGIN TRY
            INSERT INTO [FD_BaseData] ([Code], [Description], [Amount], [Status], [Deleted], [Created]) VALUES (N'O''Neil', N'a@b', 12.50, 9, 1, '1753-01-01 00:00:00.000');
            INSERT INTO [FD_BaseData] ([Code], [Description], [Amount], [Status], [Deleted], [Created]) VALUES (N'X', NULL, 0, 1, 0, '2024-02-29 08:30:15.250');
        "};
        assert_eq!(driver.executed(), [format!("{expected}{CATCH}")]);
        assert!(driver.last_command().unwrap().args.is_empty());
    }

    #[test]
    fn statements_can_be_rewritten() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.bulk_insert_with(&items(2), |item, statement| {
            format!("{statement} -- row {}", item.code)
        })
        .unwrap();
        let batch = &driver.executed()[0];
        assert!(batch.contains("VALUES (N'B0000', NULL, 0, 1, 0, NULL); -- row B0000\n"));
        assert!(batch.contains("; -- row B0001\n"));
    }

    #[test]
    fn children_follow_their_parent() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let groups = [
            BaseDataGroup {
                id: 0,
                name: "G1".into(),
                items: vec![
                    BaseDataGroupItem {
                        code: "I1".into(),
                        quantity: 2,
                        ..Default::default()
                    },
                    BaseDataGroupItem {
                        code: "I2".into(),
                        quantity: 3,
                        ..Default::default()
                    },
                ],
                notes: Some(vec![GroupNote {
                    id: 0,
                    text: "n".into(),
                }]),
            },
            BaseDataGroup {
                name: "G2".into(),
                ..Default::default()
            },
        ];
        db.bulk_insert(&groups).unwrap();
        let expected = indoc! {"
            DECLARE @ParentId BIGINT;
            BEGIN TRY
            INSERT INTO [FD_BaseDataGroup] ([Name]) VALUES (N'G1');
            SET @ParentId = SCOPE_IDENTITY();
            INSERT INTO [FD_BaseDataGroupItem] ([Code], [Quantity], [GroupID]) VALUES (N'I1', 2, @ParentId), (N'I2', 3, @ParentId);
            INSERT INTO [FD_GroupNote] ([Text], [OwnerGroupID]) VALUES (N'n', @ParentId);
            INSERT INTO [FD_BaseDataGroup] ([Name]) VALUES (N'G2');
        "};
        assert_eq!(driver.executed(), [format!("{expected}{CATCH}")]);
    }

    #[test]
    fn children_of_client_keys_use_the_key_literal() {
        init_logs();
        #[derive(sluice::Entity, Default)]
        #[sluice(table = "FD_Folder", primary_key = "FolderID", auto_increment = false)]
        struct Folder {
            #[sluice(name = "FolderID")]
            id: i32,
            #[sluice(name = "Title")]
            title: String,
            #[sluice(child, foreign_key = "FolderID")]
            notes: Vec<GroupNote>,
        }
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        db.bulk_insert(&[Folder {
            id: 12,
            title: "F".into(),
            notes: vec![GroupNote {
                id: 0,
                text: "a".into(),
            }],
        }])
        .unwrap();
        let batch = &driver.executed()[0];
        assert!(batch.starts_with(
            "BEGIN TRY\nINSERT INTO [FD_Folder] ([FolderID], [Title]) VALUES (12, N'F');\n"
        ));
        assert!(
            batch.contains("INSERT INTO [FD_GroupNote] ([Text], [FolderID]) VALUES (N'a', 12);\n")
        );
        assert!(!batch.contains("SCOPE_IDENTITY"));
    }

    #[test]
    fn filtered_insert_goes_through_staging() {
        init_logs();
        let driver = ScriptedDriver::new();
        driver.on("FROM [#FD_BaseData_Staging] s", Response::Affected(1));
        let mut db = database(&driver);
        let filter = Sql::new().where_raw(
            "NOT EXISTS (SELECT 1 FROM [FD_BaseData] d WHERE d.[Code] = s.[Code] AND d.[Status] = @0)",
            vec![RowStatus::Active.into()],
        );
        assert_eq!(db.bulk_insert_filtered(&items(2), filter).unwrap(), 1);
        let executed = driver.executed();
        assert_eq!(executed.len(), 3);
        assert_eq!(
            executed[0],
            "SELECT TOP 0 [Code], [Description], [Amount], [Status], [Deleted], [Created] INTO [#FD_BaseData_Staging] FROM [FD_BaseData];"
        );
        assert_eq!(
            executed[1],
            format!(
                "BEGIN TRY\nINSERT INTO [#FD_BaseData_Staging] ([Code], [Description], [Amount], [Status], [Deleted], [Created]) VALUES (N'B0000', NULL, 0, 1, 0, NULL), (N'B0001', NULL, 0, 1, 0, NULL);\n{CATCH}"
            )
        );
        assert_eq!(
            executed[2],
            indoc! {"
                INSERT INTO [FD_BaseData] ([Code], [Description], [Amount], [Status], [Deleted], [Created]) SELECT s.[Code], s.[Description], s.[Amount], s.[Status], s.[Deleted], s.[Created] FROM [#FD_BaseData_Staging] s WHERE NOT EXISTS (SELECT 1 FROM [FD_BaseData] d WHERE d.[Code] = s.[Code] AND d.[Status] = @0);
                DROP TABLE [#FD_BaseData_Staging];"
            }
        );
        assert_eq!(driver.last_command().unwrap().args, [Value::Int32(Some(1))]);
        assert_eq!(driver.count(&Event::Commit), 1);
    }

    #[test]
    fn updates_by_key() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let mut first = BaseData::new(5, "A");
        first.amount = Decimal::new(15, 1);
        let second = BaseData::new(6, "B");
        assert_eq!(db.bulk_update(&[first.clone(), second]).unwrap(), 2);
        assert_eq!(
            driver.executed()[0],
            format!(
                "BEGIN TRY\nUPDATE [FD_BaseData] SET [Code] = N'A', [Description] = NULL, [Amount] = 1.5, [Status] = 1, [Deleted] = 0, [Created] = NULL WHERE [Id] = 5;\nUPDATE [FD_BaseData] SET [Code] = N'B', [Description] = NULL, [Amount] = 0, [Status] = 1, [Deleted] = 0, [Created] = NULL WHERE [Id] = 6;\n{CATCH}"
            )
        );

        driver.clear();
        db.bulk_update_with(&[first], &["code"], &["amount"], |_, statement| statement)
            .unwrap();
        assert_eq!(
            driver.executed()[0],
            format!("BEGIN TRY\nUPDATE [FD_BaseData] SET [Amount] = 1.5 WHERE [Code] = N'A';\n{CATCH}")
        );
    }

    #[test]
    fn bulk_copy_streams_rows() {
        init_logs();
        let driver = ScriptedDriver::new();
        let mut db = database(&driver);
        let houses = (1..=3u128)
            .map(|i| HouseData {
                id: Uuid::from_u128(i),
                street: format!("Street {i}"),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        assert_eq!(db.bulk_copy(&houses).unwrap(), 3);
        assert_eq!(
            driver.events(),
            [
                Event::Connect,
                Event::BulkCopy {
                    table: "FD_House".into(),
                    rows: 3
                },
                Event::Close,
            ]
        );
        assert_eq!(driver.committed_rows(), 3);
    }
}
