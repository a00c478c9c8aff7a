mod common;

use axum::http::{Method, StatusCode};
use common::app;
use entity_api_sdk::Store;
use serde_json::{json, Value};
use uuid::Uuid;

const PAYMENT: &str = "6f1c2a9e-3b4d-4c5e-8f70-1a2b3c4d5e6f";

#[tokio::test]
async fn category_create_read_patch() {
    let app = app();
    let (status, created) = app
        .send(Method::POST, "/odata/categories", Some(json!({ "name": "Drinks" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({ "id": 1, "name": "Drinks" }));

    let (status, body) = app.send(Method::GET, "/odata/categories/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": 1, "name": "Drinks" }));

    let (status, _) = app
        .send(Method::PATCH, "/odata/categories/1", Some(json!({ "name": "" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.send(Method::GET, "/odata/categories/1", None).await;
    assert_eq!(body["name"], json!(""));
}

#[tokio::test]
async fn guid_keyed_create_read_patch() {
    let app = app();
    let (status, created) = app
        .send(Method::POST, "/odata/suppliers", Some(json!({ "name": "Drinks" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    let parsed = Uuid::parse_str(&id).unwrap();
    assert!(!parsed.is_nil());
    assert_eq!(created, json!({ "id": id, "name": "Drinks" }));

    let uri = format!("/odata/suppliers/{}", id);
    let (status, body) = app.send(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": id, "name": "Drinks" }));

    let (status, _) = app.send(Method::PATCH, &uri, Some(json!({ "name": "" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.send(Method::GET, &uri, None).await;
    assert_eq!(body, json!({ "id": id, "name": "" }));

    let (status, _) = app.send(Method::GET, "/odata/suppliers/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn decimals_are_stored_without_rounding() {
    let app = app();
    let (status, created) = app
        .send(
            Method::POST,
            "/odata/products",
            Some(json!({ "name": "Gold", "unitPrice": "12345678901234567.89" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["unitPrice"], json!("12345678901234567.89"));
    let stored = app.store.rows("Product");
    assert_eq!(stored[0]["unit_price"], json!("12345678901234567.89"));

    let (_, body) = app.send(Method::GET, "/odata/products/1", None).await;
    assert_eq!(body["unitPrice"], json!("12345678901234567.89"));
}

#[tokio::test]
async fn oversized_skip_is_bad_request() {
    let app = app();
    let (status, body) = app
        .send(Method::GET, "/odata/categories?$skip=18446744073709551615&$skiptoken=1", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("bad_request"));
}

#[tokio::test]
async fn patch_on_missing_key_is_not_found_and_changes_nothing() {
    let app = app();
    let (status, body) = app
        .send(Method::PATCH, "/odata/categories/99", Some(json!({ "name": "x" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));
    assert_eq!(app.store.commit_count(), 0);
}

#[tokio::test]
async fn key_segment_must_match_key_type() {
    let app = app();
    let (status, _) = app.send(Method::GET, "/odata/categories/abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(Method::POST, "/odata/payments/not-a-guid/approve", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_ignores_key_and_requires_a_change() {
    let app = app();
    app.seed("Category", vec![json!({ "id": 1, "name": "Drinks" })]);
    let (status, body) = app
        .send(Method::PATCH, "/odata/categories/1", Some(json!({ "id": 7, "name": "Drinks" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": 1, "name": "Drinks" }));

    let (status, body) = app.send(Method::PATCH, "/odata/categories/1", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("Failed to update entity"));
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let app = app();
    app.seed("Category", vec![json!({ "id": 1, "name": "Drinks" })]);
    let (status, body) = app.send(Method::DELETE, "/odata/categories/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    let (status, _) = app.send(Method::GET, "/odata/categories/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::DELETE, "/odata/categories/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payload_type_mismatch_is_bad_request() {
    let app = app();
    let (status, body) = app
        .send(Method::POST, "/odata/categories", Some(json!({ "name": 5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("invalid_payload"));
    assert!(app.store.rows("Category").is_empty());
}

#[tokio::test]
async fn count_follows_denial_mask() {
    let app = app();
    app.seed("Category", vec![json!({ "id": 1, "name": "Drinks" })]);
    app.seed(
        "Product",
        vec![
            json!({ "id": 1, "name": "Tea", "unit_price": 2.5, "category_id": 1 }),
            json!({ "id": 2, "name": "Cake", "unit_price": 4, "category_id": null }),
        ],
    );

    // $count disabled globally, no override
    let (status, body) = app.send(Method::GET, "/odata/categories?$count=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert!(body.get("meta").is_none());

    // override allows only $filter and $count; $top is ignored
    let (_, body) = app
        .send(Method::GET, "/odata/products?$count=true&$top=1", None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["count"], json!(2));

    let (_, body) = app
        .send(Method::GET, "/odata/products?$filter=unitPrice%20gt%203&$count=true", None)
        .await;
    assert_eq!(body["data"], json!([{ "id": 2, "name": "Cake", "unitPrice": 4, "categoryId": null }]));
    assert_eq!(body["meta"]["count"], json!(1));
}

#[tokio::test]
async fn select_and_expand() {
    let app = app();
    app.seed("Customer", vec![json!({ "id": 1, "name": "Ann" })]);
    app.seed(
        "Order",
        vec![
            json!({ "id": 5, "order_no": "A1", "customer_id": 1 }),
            json!({ "id": 6, "order_no": "A2", "customer_id": 1 }),
        ],
    );
    let (status, body) = app
        .send(Method::GET, "/odata/customers/1?$expand=orders&$select=name", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("Ann"));
    assert!(body.get("id").is_none());
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["orderNo"], json!("A1"));

    let (_, body) = app
        .send(Method::GET, "/odata/orders/5?$expand=customer", None)
        .await;
    assert_eq!(body["customer"]["name"], json!("Ann"));
}

#[tokio::test]
async fn nested_collection_is_created_and_linked() {
    let app = app();
    let (status, body) = app
        .send(
            Method::POST,
            "/odata/customers",
            Some(json!({ "name": "Ann", "orders": [{ "orderNo": "A1" }, { "orderNo": "A2" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let customer_id = body["id"].clone();
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o["customerId"] == customer_id));

    let stored = app.store.rows("Order");
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|o| o["customer_id"] == customer_id));
    assert_eq!(app.store.commit_count(), 1);
}

#[tokio::test]
async fn nested_reference_to_existing_row_is_linked_and_patched() {
    let app = app();
    app.seed("Customer", vec![json!({ "id": 1, "name": "Ann" })]);
    let (status, body) = app
        .send(
            Method::POST,
            "/odata/orders",
            Some(json!({ "orderNo": "B1", "customer": { "id": 1, "name": "Ann B" } })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["customerId"], json!(1));
    assert_eq!(body["customer"]["name"], json!("Ann B"));

    let customer = app.store.find("Customer", &json!(1)).await.unwrap().unwrap();
    assert_eq!(customer["name"], json!("Ann B"));
    assert_eq!(app.store.rows("Customer").len(), 1);
}

#[tokio::test]
async fn null_reference_unlinks() {
    let app = app();
    app.seed("Customer", vec![json!({ "id": 1, "name": "Ann" })]);
    app.seed("Order", vec![json!({ "id": 5, "order_no": "A1", "customer_id": 1 })]);
    let (status, body) = app
        .send(Method::PATCH, "/odata/orders/5", Some(json!({ "customer": null })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer"], Value::Null);
    let order = app.store.find("Order", &json!(5)).await.unwrap().unwrap();
    assert_eq!(order["customer_id"], Value::Null);
    assert_eq!(order["order_no"], json!("A1"));
}

#[tokio::test]
async fn complex_value_patch_merges_supplied_members() {
    let app = app();
    app.seed(
        "Payment",
        vec![json!({
            "id": PAYMENT,
            "total_amount": 10,
            "payment_info": { "card_number": "4111", "expires": 2026 }
        })],
    );
    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/odata/payments/{}", PAYMENT),
            Some(json!({ "paymentInfo": { "expires": 2030 } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentInfo"], json!({ "cardNumber": "4111", "expires": 2030 }));
    assert_eq!(body["totalAmount"], json!(10));
}

#[tokio::test]
async fn operations_dispatch_to_registered_handlers() {
    let app = app();
    let (status, body) = app
        .send(Method::POST, &format!("/odata/payments/{}/approve", PAYMENT), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "approved": PAYMENT }));

    let (status, body) = app.send(Method::GET, "/odata/ping", None).await;
    assert_eq!((status, body), (StatusCode::OK, json!("pong")));

    let (status, body) = app.send(Method::POST, "/odata/charge", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], json!("Invalid Request"));

    // no response type: success without a body
    let (status, body) = app.send(Method::POST, "/odata/charge?amount=5", None).await;
    assert_eq!((status, body), (StatusCode::OK, Value::Null));
}

#[tokio::test]
async fn health_route_is_mounted() {
    let app = app();
    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}
