mod common;

use food_order_service::catalog::CatalogRepository;
use food_order_service::models::NewProduct;
use food_order_service::orders::OrderRepository;
use food_order_service::{PgUnitOfWork, StoreError, UnitOfWork, UnitOfWorkSession};

use common::{cleanup_database, setup_database, OutcomeProbe};

const SOUP: NewProduct = NewProduct {
    name: "Tomato Soup",
    price: 5.5,
    category: "Soup",
};

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_commit_functionality() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());

    let session = uow.begin().await.expect("Failed to begin transaction");
    let probe = OutcomeProbe::new();
    session.register_transaction_aware(probe.clone());

    let catalog = CatalogRepository::new(session.executor().clone());
    let orders = OrderRepository::new(session.executor().clone());

    let product = catalog.insert(&SOUP).await.expect("Failed to create product");
    let order = orders.insert_order().await.expect("Failed to create order");
    orders
        .insert_item(order.id, product.id, 3)
        .await
        .expect("Failed to create item");

    // Visible inside the transaction before commit.
    let found = catalog
        .find_by_id(product.id)
        .await
        .expect("Failed to find product")
        .expect("Product not found");
    assert_eq!(found.name, "Tomato Soup");

    session.commit().await.expect("Failed to commit transaction");

    assert!(probe.is_committed(), "observer should hear about the commit");
    assert!(!probe.is_rolled_back(), "observer should not hear about a rollback");

    let verify = uow.begin().await.expect("Failed to begin verify transaction");
    let verify_orders = OrderRepository::new(verify.executor().clone());
    assert_eq!(verify_orders.count_orders().await.unwrap(), 1);
    assert_eq!(verify_orders.count_items().await.unwrap(), 1);

    let persisted = CatalogRepository::new(verify.executor().clone())
        .find_by_id(product.id)
        .await
        .expect("Failed to find persisted product");
    assert_eq!(persisted, Some(product));
    verify.commit().await.expect("Failed to commit verify transaction");

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_rollback_functionality() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());

    let session = uow.begin().await.expect("Failed to begin transaction");
    let probe = OutcomeProbe::new();
    session.register_transaction_aware(probe.clone());

    let catalog = CatalogRepository::new(session.executor().clone());
    let orders = OrderRepository::new(session.executor().clone());

    let product = catalog.insert(&SOUP).await.expect("Failed to create product");
    let order = orders.insert_order().await.expect("Failed to create order");
    orders
        .link_product(order.id, product.id)
        .await
        .expect("Failed to link product");

    session.rollback().await.expect("Failed to rollback transaction");

    assert!(!probe.is_committed(), "observer should not hear about a commit");
    assert!(probe.is_rolled_back(), "observer should hear about the rollback");

    let verify = uow.begin().await.expect("Failed to begin verify transaction");
    let verify_catalog = CatalogRepository::new(verify.executor().clone());
    let verify_orders = OrderRepository::new(verify.executor().clone());

    assert!(verify_catalog.find_by_id(product.id).await.unwrap().is_none());
    assert_eq!(verify_catalog.count().await.unwrap(), 0);
    assert_eq!(verify_orders.count_orders().await.unwrap(), 0);
    verify.commit().await.expect("Failed to commit verify transaction");

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_multiple_transactions_isolation() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());

    let first = uow.begin().await.expect("Failed to begin transaction 1");
    let kept = CatalogRepository::new(first.executor().clone())
        .insert(&SOUP)
        .await
        .expect("Failed to create kept product");
    first.commit().await.expect("Failed to commit transaction 1");

    let second = uow.begin().await.expect("Failed to begin transaction 2");
    let discarded = CatalogRepository::new(second.executor().clone())
        .insert(&NewProduct {
            name: "Lentil Soup",
            ..SOUP
        })
        .await
        .expect("Failed to create discarded product");
    second.rollback().await.expect("Failed to rollback transaction 2");

    let verify = uow.begin().await.expect("Failed to begin verify transaction");
    let repo = CatalogRepository::new(verify.executor().clone());
    let products = repo.list().await.expect("Failed to list products");
    assert_eq!(products, vec![kept]);
    assert!(repo.find_by_id(discarded.id).await.unwrap().is_none());
    verify.commit().await.expect("Failed to commit verify transaction");

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn test_repository_refuses_work_after_commit() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());

    let session = uow.begin().await.expect("Failed to begin transaction");
    let executor = session.executor().clone();
    session.commit().await.expect("Failed to commit transaction");

    assert!(executor.is_closed().await);
    let err = CatalogRepository::new(executor)
        .count()
        .await
        .expect_err("closed transaction should be refused");
    assert!(matches!(err, StoreError::TransactionClosed));

    cleanup_database(&pool).await;
}
