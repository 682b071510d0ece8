use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bson::Document as BsonDocument;
use docgate::{memory::InMemoryStore, prelude::*};
use serde_json::json;

fn object(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("test literal is an object")
}

#[tokio::test]
async fn customers_round_trip_through_the_memory_store() {
    let store = InMemoryStore::new();
    let customers = CustomerGateway::for_record(store.clone());

    customers
        .insert_one(&object(json!({
            "name": "Alice",
            "email": "alice@example.com",
            "age": 41,
        })))
        .await
        .unwrap();

    let found = customers
        .first(&FindRequest::new().filter("name", "Alice"))
        .await
        .unwrap()
        .expect("alice was inserted");

    assert!(!found.contains_key("age"));
    let alice: Customer = from_document(found).unwrap();
    assert_eq!(alice.email, "alice@example.com");
    assert_eq!(alice._id, alice._id.to_uppercase());
    assert_eq!(alice.number, None);

    customers
        .update_one(
            &object(json!({ "_id": alice._id })),
            &object(json!({ "_id": "ignored", "number": "555-0100", "vip": true })),
        )
        .await
        .unwrap();

    let updated: Customer = from_document(
        customers
            .first(&FindRequest::new().filter("_id", alice._id.clone()))
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(updated._id, alice._id);
    assert_eq!(updated.number.as_deref(), Some("555-0100"));

    customers
        .delete_one(&object(json!({ "_id": alice._id })))
        .await
        .unwrap();
    assert_eq!(store.count("customers").await, 0);
}

#[tokio::test]
async fn customers_are_found_through_every_filter_tier() {
    let customers = CustomerGateway::for_record(InMemoryStore::new());

    customers
        .insert_many(&[
            object(json!({ "_id": "C1", "name": "Alice", "email": "alice@example.com" })),
            object(json!({ "_id": "C2", "name": "Bob", "email": "bob@example.org" })),
            object(json!({ "_id": "C3", "name": "Carol", "email": "carol@example.com" })),
        ])
        .await
        .unwrap();

    let ids = |documents: Vec<Document>| {
        documents
            .into_iter()
            .map(|document| document["_id"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>()
    };

    let by_in = customers
        .find(&FindRequest::new().filter_in(vec![(
            "name".to_string(),
            vec![json!("Alice"), json!("Carol")],
        )]))
        .await
        .unwrap();
    assert_eq!(ids(by_in), vec!["C1", "C3"]);

    let by_regex = customers
        .find(&FindRequest::new().filter_expression(FilterExpression::OrInRegex(vec![object(
            json!({ "email": "/example\\.org$/" }),
        )])))
        .await
        .unwrap();
    assert_eq!(ids(by_regex), vec!["C2"]);

    let by_compound = customers
        .find(&FindRequest::new().filter_compound(CompoundFilter::new(
            LogicalOperator::Or,
            vec![
                FilterExpression::And(object(json!({ "name": "Bob" }))),
                FilterExpression::And(object(json!({ "name": "Carol" }))),
            ],
        )))
        .await
        .unwrap();
    assert_eq!(ids(by_compound), vec!["C2", "C3"]);

    let by_raw = customers
        .find(&FindRequest::new().query("{name: {$in: ['Alice', 'Bob']}}").skip(1).limit(5))
        .await
        .unwrap();
    assert_eq!(ids(by_raw), vec!["C2"]);

    let projected = customers
        .first(&FindRequest::new().filter("_id", "C1").project(["email"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(projected, object(json!({ "_id": "C1", "email": "alice@example.com" })));
}

#[tokio::test]
async fn products_carry_audit_stamps() {
    let products = ProductGateway::for_record(InMemoryStore::new());
    let admin = json!({ "by": { "_id": "U1", "name": "admin" } });

    products
        .insert_one(&object(json!({
            "_id": "P1",
            "name": "bolt",
            "category": "hardware",
            "price": 0.25,
            "created": admin,
        })))
        .await
        .unwrap();

    products
        .update_one(
            &object(json!({ "_id": "P1" })),
            &object(json!({
                "price": 0.3,
                "modified": { "by": { "_id": "U2", "name": "editor" } },
            })),
        )
        .await
        .unwrap();

    let bolt: Product = from_document(
        products
            .first(&FindRequest::new().filter("_id", "P1"))
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();

    assert_eq!(bolt.price, 0.3);
    let created = bolt.created.expect("insert stamps created");
    let modified = bolt.modified.expect("update stamps modified");
    assert_eq!(created.by.name, "admin");
    assert_eq!(modified.by._id, "U2");
    assert!(modified.on >= created.on);
}

#[tokio::test]
async fn incomplete_stamps_are_rejected_before_the_store() {
    let products = ProductGateway::for_record(InMemoryStore::new());

    let err = products
        .update_one(
            &object(json!({ "_id": "P1" })),
            &object(json!({ "modified": { "by": { "_id": "U2" } } })),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test]
async fn products_are_bulk_updated_in_order() {
    let products = ProductGateway::for_record(InMemoryStore::new());

    products
        .insert_many(&[
            object(json!({ "_id": "P1", "name": "bolt", "category": "hardware", "price": 1 })),
            object(json!({ "_id": "P2", "name": "nut", "category": "hardware", "price": 2 })),
        ])
        .await
        .unwrap();

    products
        .bulk_update(&[
            (object(json!({ "_id": "P1" })), object(json!({ "price": 3 }))),
            (object(json!({ "price": 3 })), object(json!({ "category": "fasteners" }))),
        ])
        .await
        .unwrap();

    let fasteners = products
        .find(&FindRequest::new().filter("category", "fasteners"))
        .await
        .unwrap();

    assert_eq!(fasteners.len(), 1);
    assert_eq!(fasteners[0]["_id"], json!("P1"));
}

#[derive(Debug, Default)]
struct FailingBackend {
    calls: AtomicUsize,
}

impl FailingBackend {
    fn fail<T>(&self) -> DocumentStoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DocumentStoreError::Backend("connection refused".to_string()))
    }
}

#[async_trait]
impl StoreBackend for FailingBackend {
    async fn find_one(
        &self,
        _collection: &str,
        _filter: BsonDocument,
        _projection: Option<BsonDocument>,
    ) -> DocumentStoreResult<Option<BsonDocument>> {
        self.fail()
    }

    async fn find(
        &self,
        _collection: &str,
        _filter: BsonDocument,
        _projection: Option<BsonDocument>,
        _skip: u64,
        _limit: u64,
    ) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.fail()
    }

    async fn insert_one(&self, _collection: &str, _document: BsonDocument) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn insert_many(&self, _collection: &str, _documents: Vec<BsonDocument>) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn update_one(
        &self,
        _collection: &str,
        _filter: BsonDocument,
        _update: BsonDocument,
    ) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn bulk_update(
        &self,
        _collection: &str,
        _updates: Vec<(BsonDocument, BsonDocument)>,
    ) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn delete_one(&self, _collection: &str, _filter: BsonDocument) -> DocumentStoreResult<()> {
        self.fail()
    }
}

fn assert_wrapped(err: DocumentStoreError, collection: &str, operation: Operation) {
    match err {
        DocumentStoreError::StoreOperation { collection: c, operation: o, source } => {
            assert_eq!(c, collection);
            assert_eq!(o, operation.as_str());
            assert!(matches!(*source, DocumentStoreError::Backend(_)));
        }
        other => panic!("expected a wrapped store failure, got {other:?}"),
    }
}

#[tokio::test]
async fn every_store_failure_is_wrapped_with_its_context() {
    let backend = Arc::new(FailingBackend::default());
    let customers = CustomerGateway::for_record(backend.clone());
    let filter = object(json!({ "_id": "C1" }));
    let customer = object(json!({ "name": "Alice", "email": "alice@example.com" }));

    assert_wrapped(
        customers.first(&FindRequest::new()).await.unwrap_err(),
        "customers",
        Operation::First,
    );
    assert_wrapped(
        customers.find(&FindRequest::new()).await.unwrap_err(),
        "customers",
        Operation::Find,
    );
    assert_wrapped(
        customers.insert_one(&customer).await.unwrap_err(),
        "customers",
        Operation::InsertOne,
    );
    assert_wrapped(
        customers.insert_many(&[customer.clone()]).await.unwrap_err(),
        "customers",
        Operation::InsertMany,
    );
    assert_wrapped(
        customers.update_one(&filter, &customer).await.unwrap_err(),
        "customers",
        Operation::UpdateOne,
    );
    assert_wrapped(
        customers
            .bulk_update(&[(filter.clone(), customer.clone())])
            .await
            .unwrap_err(),
        "customers",
        Operation::BulkUpdate,
    );
    assert_wrapped(
        customers.delete_one(&filter).await.unwrap_err(),
        "customers",
        Operation::DeleteOne,
    );

    assert_eq!(backend.calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn malformed_raw_filters_fail_at_the_store_boundary() {
    let backend = Arc::new(FailingBackend::default());
    let products = ProductGateway::for_record(backend.clone());

    let err = products
        .find(&FindRequest::new().query("{name: 'bolt'"))
        .await
        .unwrap_err();

    match err {
        DocumentStoreError::StoreOperation { collection, operation, source } => {
            assert_eq!(collection, "products");
            assert_eq!(operation, "Find");
            assert!(matches!(*source, DocumentStoreError::InvalidFilter(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn settings_connect_a_shared_backend() {
    let backend = RuntimeSettings::from_json(r#"{ "environment": "testing" }"#)
        .unwrap()
        .connect()
        .await
        .unwrap();

    let customers = CustomerGateway::for_record(backend.clone());
    customers
        .insert_one(&object(json!({ "_id": "C9", "name": "Dana", "email": "dana@example.com" })))
        .await
        .unwrap();

    let gateway = Gateway::new(backend, "customers");
    let all = gateway
        .find(QueryBuilder::new().find_query().unwrap())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}
