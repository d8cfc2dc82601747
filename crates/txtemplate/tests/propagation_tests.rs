mod common;

use common::{init_test_logging, TestDatabase};
use txtemplate::{Propagation, TransactionScope, TransactionSettings, TxError, TxResult};

fn with_propagation(propagation: Propagation) -> TransactionSettings {
    TransactionSettings::default().propagation(propagation)
}

async fn insert(scope: &mut TransactionScope<'_>, name: &str) -> TxResult<u64> {
    scope
        .sql("insert into accounts (name) values (:name)")
        .param("name", name)
        .update()
        .await
}

#[tokio::test]
async fn test_required_joins_existing_transaction() {
    init_test_logging();
    let db = TestDatabase::new().await;

    let (outer_id, inner_id, inner_is_new) = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                let outer_id = scope.status().transaction_id();
                let (inner_id, inner_is_new) = scope
                    .execute_with(with_propagation(Propagation::Required), |inner| {
                        Box::pin(async move {
                            insert(inner, "alice").await?;
                            Ok::<_, TxError>((inner.status().transaction_id(), inner.status().is_new_transaction()))
                        })
                    })
                    .await?;
                Ok::<_, TxError>((outer_id, inner_id, inner_is_new))
            })
        })
        .await
        .unwrap();

    assert!(outer_id.is_some());
    assert_eq!(outer_id, inner_id);
    assert!(!inner_is_new);
    assert_eq!(db.names().await, vec!["alice"]);
}

#[tokio::test]
async fn test_requires_new_suspends_outer_transaction() {
    let db = TestDatabase::new().await;

    let (outer_id, inner_id, seen_by_inner) = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;
                let outer_id = scope.status().transaction_id();
                let (inner_id, seen) = scope
                    .execute_with(with_propagation(Propagation::RequiresNew), |inner| {
                        Box::pin(async move {
                            assert!(inner.status().is_new_transaction());
                            let seen = inner
                                .sql("select count(*) from accounts")
                                .query::<i64>()
                                .single()
                                .await?;
                            Ok::<_, TxError>((inner.status().transaction_id(), seen))
                        })
                    })
                    .await?;
                Ok::<_, TxError>((outer_id, inner_id, seen))
            })
        })
        .await
        .unwrap();

    assert_ne!(outer_id, inner_id);
    assert_eq!(seen_by_inner, 0, "uncommitted outer write must not be visible");
    assert_eq!(db.names().await, vec!["alice"]);
}

#[tokio::test]
async fn test_inner_requires_new_commit_survives_outer_rollback() {
    let db = TestDatabase::new().await;

    db.template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .execute_with(with_propagation(Propagation::RequiresNew), |inner| {
                        Box::pin(async move { insert(inner, "audit").await })
                    })
                    .await?;
                scope.set_rollback_only();
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(db.names().await, vec!["audit"]);
}

#[tokio::test]
async fn test_participant_failure_causes_unexpected_rollback() {
    let db = TestDatabase::new().await;

    let result = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;
                let inner: TxResult<()> = scope
                    .execute(|inner| {
                        Box::pin(async move {
                            insert(inner, "bob").await?;
                            Err(TxError::database("constraint violated"))
                        })
                    })
                    .await;
                assert!(inner.is_err());
                assert!(scope.is_rollback_only());
                // The outer unit of work swallows the failure and tries to commit
                Ok::<_, TxError>(())
            })
        })
        .await;

    assert!(matches!(result, Err(TxError::UnexpectedRollback(_))));
    assert_eq!(db.count().await, 0);
}

#[tokio::test]
async fn test_participant_rollback_only_dooms_outer_transaction() {
    let db = TestDatabase::new().await;

    let result = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;
                scope
                    .execute(|inner| {
                        Box::pin(async move {
                            inner.set_rollback_only();
                            Ok::<_, TxError>(())
                        })
                    })
                    .await?;
                assert!(!scope.status().is_local_rollback_only());
                assert!(scope.is_rollback_only());
                Ok::<_, TxError>(())
            })
        })
        .await;

    assert!(matches!(result, Err(TxError::UnexpectedRollback(_))));
    assert_eq!(db.count().await, 0);
}

#[tokio::test]
async fn test_nested_failure_rolls_back_to_savepoint() {
    let db = TestDatabase::new().await;

    db.template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;

                let nested: TxResult<()> = scope
                    .execute_with(with_propagation(Propagation::Nested), |inner| {
                        Box::pin(async move {
                            assert!(inner.status().has_savepoint());
                            assert!(!inner.status().is_new_transaction());
                            insert(inner, "bob").await?;
                            Err(TxError::database("bob is not allowed"))
                        })
                    })
                    .await;
                assert!(nested.is_err());
                assert!(!scope.is_rollback_only());

                insert(scope, "carol").await?;
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(db.names().await, vec!["alice", "carol"]);
}

#[tokio::test]
async fn test_nested_contains_participant_failure() {
    let db = TestDatabase::new().await;

    db.template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;

                let nested: TxResult<()> = scope
                    .execute_with(with_propagation(Propagation::Nested), |savepoint| {
                        Box::pin(async move {
                            savepoint
                                .execute(|participant| {
                                    Box::pin(async move {
                                        insert(participant, "bob").await?;
                                        Err(TxError::database("bob is not allowed"))
                                    })
                                })
                                .await
                        })
                    })
                    .await;
                assert!(nested.is_err());
                assert!(!scope.is_rollback_only());

                insert(scope, "carol").await?;
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(db.names().await, vec!["alice", "carol"]);
}

#[tokio::test]
async fn test_nested_reports_swallowed_participant_rollback() {
    let db = TestDatabase::new().await;

    db.template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;

                let nested: TxResult<()> = scope
                    .execute_with(with_propagation(Propagation::Nested), |savepoint| {
                        Box::pin(async move {
                            insert(savepoint, "bob").await?;
                            savepoint
                                .execute(|participant| {
                                    Box::pin(async move {
                                        participant.set_rollback_only();
                                        Ok::<_, TxError>(())
                                    })
                                })
                                .await?;
                            Ok::<_, TxError>(())
                        })
                    })
                    .await;
                assert!(matches!(nested, Err(TxError::UnexpectedRollback(_))));
                assert!(!scope.is_rollback_only());

                insert(scope, "carol").await?;
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(db.names().await, vec!["alice", "carol"]);
}

#[tokio::test]
async fn test_nested_keeps_outer_rollback_only() {
    let db = TestDatabase::new().await;

    let result = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;
                scope
                    .execute(|participant| {
                        Box::pin(async move {
                            participant.set_rollback_only();
                            Ok::<_, TxError>(())
                        })
                    })
                    .await?;

                let _ = scope
                    .execute_with(with_propagation(Propagation::Nested), |_savepoint| {
                        Box::pin(async move { Err::<(), _>(TxError::database("nested failure")) })
                    })
                    .await;
                assert!(scope.is_rollback_only());
                Ok::<_, TxError>(())
            })
        })
        .await;

    assert!(matches!(result, Err(TxError::UnexpectedRollback(_))));
    assert_eq!(db.count().await, 0);
}

#[tokio::test]
async fn test_nested_success_releases_savepoint() {
    let db = TestDatabase::new().await;

    db.template()
        .execute(|scope| {
            Box::pin(async move {
                for name in ["alice", "bob"] {
                    scope
                        .execute_with(with_propagation(Propagation::Nested), move |inner| {
                            Box::pin(async move { insert(inner, name).await })
                        })
                        .await?;
                }

                let skipped = scope
                    .execute_with(with_propagation(Propagation::Nested), |inner| {
                        Box::pin(async move {
                            insert(inner, "carol").await?;
                            inner.set_rollback_only();
                            Ok::<_, TxError>("skipped")
                        })
                    })
                    .await?;
                assert_eq!(skipped, "skipped");
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(db.names().await, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_nested_without_outer_begins_new_transaction() {
    let db = TestDatabase::new().await;

    let status = db
        .template()
        .execute_with(with_propagation(Propagation::Nested), |scope| {
            Box::pin(async move { Ok::<_, TxError>(scope.status().clone()) })
        })
        .await
        .unwrap();

    assert!(status.is_new_transaction());
    assert!(!status.has_savepoint());
}

#[tokio::test]
async fn test_mandatory_requires_existing_transaction() {
    let db = TestDatabase::new().await;

    let result = db
        .template()
        .execute_with(with_propagation(Propagation::Mandatory), |_scope| {
            Box::pin(async move { Ok::<_, TxError>(()) })
        })
        .await;
    assert!(matches!(result, Err(TxError::IllegalTransactionState(_))));

    let joined = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                let outer_id = scope.status().transaction_id();
                let inner_id = scope
                    .execute_with(with_propagation(Propagation::Mandatory), |inner| {
                        Box::pin(async move { Ok::<_, TxError>(inner.status().transaction_id()) })
                    })
                    .await?;
                Ok::<_, TxError>(outer_id == inner_id)
            })
        })
        .await
        .unwrap();
    assert!(joined);
}

#[tokio::test]
async fn test_never_rejects_existing_transaction() {
    let db = TestDatabase::new().await;

    let has_transaction = db
        .template()
        .execute_with(with_propagation(Propagation::Never), |scope| {
            Box::pin(async move { Ok::<_, TxError>(scope.status().has_transaction()) })
        })
        .await
        .unwrap();
    assert!(!has_transaction);

    let result = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .execute_with(with_propagation(Propagation::Never), |_inner| {
                        Box::pin(async move { Ok::<_, TxError>(()) })
                    })
                    .await
            })
        })
        .await;
    assert!(matches!(result, Err(TxError::IllegalTransactionState(_))));
}

#[tokio::test]
async fn test_not_supported_work_survives_outer_rollback() {
    let db = TestDatabase::new().await;

    db.template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .execute_with(with_propagation(Propagation::NotSupported), |inner| {
                        Box::pin(async move {
                            assert!(!inner.status().has_transaction());
                            insert(inner, "audit").await
                        })
                    })
                    .await?;
                insert(scope, "alice").await?;
                scope.set_rollback_only();
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();

    assert_eq!(db.names().await, vec!["audit"]);
}

#[tokio::test]
async fn test_supports_joins_or_runs_without_transaction() {
    let db = TestDatabase::new().await;

    db.template()
        .execute_with(with_propagation(Propagation::Supports), |scope| {
            Box::pin(async move {
                assert!(!scope.status().has_transaction());
                // Autocommit: survives the ignored rollback-only flag
                insert(scope, "alice").await?;
                scope.set_rollback_only();
                Ok::<_, TxError>(())
            })
        })
        .await
        .unwrap();
    assert_eq!(db.names().await, vec!["alice"]);

    let joined = db
        .template()
        .execute(|scope| {
            Box::pin(async move {
                scope
                    .execute_with(with_propagation(Propagation::Supports), |inner| {
                        Box::pin(async move { Ok::<_, TxError>(inner.status().has_transaction()) })
                    })
                    .await
            })
        })
        .await
        .unwrap();
    assert!(joined);
}

#[tokio::test]
async fn test_participant_timeout_uses_outer_deadline() {
    let db = TestDatabase::new().await;
    let settings = TransactionSettings::default().timeout(Some(std::time::Duration::from_millis(100)));

    let result = db
        .template()
        .execute_with(settings, |scope| {
            Box::pin(async move {
                insert(scope, "alice").await?;
                scope
                    .execute(|_inner| {
                        Box::pin(async move {
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                            Ok::<_, TxError>(())
                        })
                    })
                    .await
            })
        })
        .await;

    assert!(matches!(result, Err(TxError::Timeout { .. })));
    assert_eq!(db.count().await, 0);
}
