mod common;

use common::TestDatabase;
use txtemplate::{DatabaseValue, TxError, TxResult};

#[tokio::test]
async fn test_single_rejects_zero_and_several_rows() {
    let db = TestDatabase::new().await;
    let template = db.template();

    let none: TxResult<i64> = template
        .execute(|scope| {
            Box::pin(async move { scope.sql("select 1 where 1 = 0").query::<i64>().single().await })
        })
        .await;
    assert!(matches!(
        none,
        Err(TxError::IncorrectResultSize {
            expected: 1,
            actual: 0
        })
    ));

    let many: TxResult<i64> = template
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .sql("select 1 union all select 2")
                    .query::<i64>()
                    .single()
                    .await
            })
        })
        .await;
    assert!(matches!(
        many,
        Err(TxError::IncorrectResultSize {
            expected: 1,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn test_single_rejects_several_columns() {
    let db = TestDatabase::new().await;

    let result: TxResult<i64> = db
        .template()
        .execute(|scope| Box::pin(async move { scope.sql("select 1, 2").query::<i64>().single().await }))
        .await;

    assert!(matches!(
        result,
        Err(TxError::IncorrectColumnCount {
            expected: 1,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn test_optional_and_list() {
    let db = TestDatabase::new().await;

    let (missing, found, names) = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                for name in ["alice", "bob", "carol"] {
                    scope
                        .sql("insert into accounts (name) values (:name)")
                        .param("name", name)
                        .update()
                        .await?;
                }

                let missing = scope
                    .sql("select name from accounts where name = :name")
                    .param("name", "dave")
                    .query::<String>()
                    .optional()
                    .await?;
                let found = scope
                    .sql("select id from accounts where name = :name")
                    .param("name", "bob")
                    .query::<i64>()
                    .optional()
                    .await?;
                let names = scope
                    .sql("select name from accounts where name <> :excluded order by id")
                    .param("excluded", "bob")
                    .query::<String>()
                    .list()
                    .await?;
                Ok::<_, TxError>((missing, found, names))
            })
        })
        .await
        .unwrap();

    assert_eq!(missing, None);
    assert_eq!(found, Some(2));
    assert_eq!(names, vec!["alice", "carol"]);
}

#[tokio::test]
async fn test_missing_parameter() {
    let db = TestDatabase::new().await;

    let result: TxResult<String> = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .sql("select :param")
                    .param("other", "value")
                    .query::<String>()
                    .single()
                    .await
            })
        })
        .await;

    match result {
        Err(TxError::MissingParameter(name)) => assert_eq!(name, "param"),
        other => panic!("Expected missing parameter error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_repeated_parameter_and_rows() {
    let db = TestDatabase::new().await;

    let rows = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .sql("select :value as a, :value || '!' as b, :nothing as c")
                    .params([("value", DatabaseValue::from("hi")), ("nothing", DatabaseValue::Null)])
                    .rows()
                    .await
            })
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.column_names(), ["a", "b", "c"]);
    assert_eq!(row.get::<String>("a").unwrap(), "hi");
    assert_eq!(row.get::<String>("b").unwrap(), "hi!");
    assert_eq!(row.get::<Option<String>>("c").unwrap(), None);
}

#[tokio::test]
async fn test_update_returns_affected_rows() {
    let db = TestDatabase::new().await;

    let (inserted, renamed) = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                let inserted = scope
                    .sql("insert into accounts (name) values (:first), (:second)")
                    .param("first", "alice")
                    .param("second", "bob")
                    .update()
                    .await?;
                let renamed = scope
                    .sql("update accounts set name = upper(name) where name like :pattern")
                    .param("pattern", "%")
                    .update()
                    .await?;
                Ok::<_, TxError>((inserted, renamed))
            })
        })
        .await
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(renamed, 2);
    assert_eq!(db.names().await, vec!["ALICE", "BOB"]);
}

#[tokio::test]
async fn test_decode_mismatch() {
    let db = TestDatabase::new().await;

    let result: TxResult<i64> = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .sql("select :text")
                    .param("text", "not a number")
                    .query::<i64>()
                    .single()
                    .await
            })
        })
        .await;

    assert!(matches!(result, Err(TxError::Decode(_))));
}
