mod common;

use food_order_service::coupons::CouponPolicy;
use food_order_service::models::{OrderLine, PlaceOrderRequest, Product};
use food_order_service::orders::{OrderRepository, OrderService};
use food_order_service::queries::QueryService;
use food_order_service::{OrderError, PgUnitOfWork, UnitOfWork, UnitOfWorkSession};

use common::{cleanup_database, seed_catalog, setup_database, standard_corpus};

fn line(product: &Product, quantity: i64) -> OrderLine {
    OrderLine {
        product_id: product.id.to_string(),
        quantity,
    }
}

fn request(coupon: Option<&str>, items: Vec<OrderLine>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        coupon_code: coupon.map(String::from),
        items,
    }
}

async fn stored_counts(uow: &PgUnitOfWork) -> (i64, i64) {
    let session = uow.begin().await.expect("Failed to begin count transaction");
    let repo = OrderRepository::new(session.executor().clone());
    let counts = (
        repo.count_orders().await.expect("Failed to count orders"),
        repo.count_items().await.expect("Failed to count items"),
    );
    session.commit().await.expect("Failed to commit count transaction");
    counts
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn places_order_with_items_and_products() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    let products = seed_catalog(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());

    let order = service
        .place_order(&request(
            None,
            vec![line(&products[0], 2), line(&products[3], 1)],
        ))
        .await
        .expect("Failed to place order");

    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].product_id, products[0].id.to_string());
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.products, vec![products[0].clone(), products[3].clone()]);

    let listed = QueryService::new(uow.clone())
        .list_orders()
        .await
        .expect("Failed to list orders");
    assert_eq!(listed, vec![order]);

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn repeated_product_links_once_but_keeps_every_line() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    let products = seed_catalog(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());

    let order = service
        .place_order(&request(
            None,
            vec![line(&products[1], 1), line(&products[1], 3)],
        ))
        .await
        .expect("Failed to place order");

    assert_eq!(order.items.len(), 2);
    assert_eq!(order.products, vec![products[1].clone()]);

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn empty_or_invalid_lines_write_nothing() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    let products = seed_catalog(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());

    let err = service.place_order(&request(None, vec![])).await.unwrap_err();
    assert!(matches!(err, OrderError::EmptyItems));

    let err = service
        .place_order(&request(None, vec![line(&products[0], 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidQuantity { quantity: 0, .. }));

    assert_eq!(stored_counts(&uow).await, (0, 0));

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn unknown_product_rejects_the_whole_order() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    let products = seed_catalog(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());

    let err = service
        .place_order(&request(
            None,
            vec![
                line(&products[0], 1),
                OrderLine {
                    product_id: "999999".into(),
                    quantity: 1,
                },
                OrderLine {
                    product_id: "pizza".into(),
                    quantity: 1,
                },
            ],
        ))
        .await
        .unwrap_err();

    match err {
        OrderError::UnknownProducts(ids) => {
            assert!(ids.contains(&"999999".to_string()));
            assert!(ids.contains(&"pizza".to_string()));
            assert_eq!(ids.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stored_counts(&uow).await, (0, 0));

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn coupon_needs_enough_sources() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    let products = seed_catalog(&uow).await;
    standard_corpus().load(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());
    let items = || vec![line(&products[0], 1)];

    for code in ["ONEFILE99", "NOTACOUPON"] {
        let err = service
            .place_order(&request(Some(code), items()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidCoupon(ref c) if c == code), "{code}");
    }
    assert_eq!(stored_counts(&uow).await, (0, 0));

    service
        .place_order(&request(Some("SAVE10NOW"), items()))
        .await
        .expect("coupon found in two files should be accepted");

    // A relaxed policy accepts single-source coupons.
    OrderService::new(uow.clone(), CouponPolicy::new(1))
        .place_order(&request(Some("ONEFILE99"), items()))
        .await
        .expect("single-source coupon should pass a one-source policy");

    assert_eq!(stored_counts(&uow).await, (2, 2));

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn coupon_is_checked_before_items() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    seed_catalog(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());

    let err = service
        .place_order(&request(Some("NOTACOUPON"), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidCoupon(_)));

    // An empty coupon is no coupon.
    let err = service
        .place_order(&request(Some(""), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::EmptyItems));

    cleanup_database(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
#[ignore = "requires PostgreSQL at DATABASE_URL"]
async fn coupon_code_must_match_exactly() {
    let pool = setup_database().await;
    let uow = PgUnitOfWork::new(pool.clone());
    let products = seed_catalog(&uow).await;
    standard_corpus().load(&uow).await;
    let service = OrderService::new(uow.clone(), CouponPolicy::default());

    for code in [" SAVE10NOW ", "save10now", "   "] {
        let err = service
            .place_order(&request(Some(code), vec![line(&products[0], 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidCoupon(ref c) if c == code), "{code:?}");
    }
    assert_eq!(stored_counts(&uow).await, (0, 0));

    cleanup_database(&pool).await;
}
