mod common;

use cartkit_commerce::cart::{
    Address, CartAction, CustomFields, ShippingMethodDraft, ShippingMethodKind, ShippingTarget,
};
use cartkit_commerce::ids::ShippingEntryId;
use cartkit_sync::memory::{Call, InMemoryPlatform};
use cartkit_sync::{
    AuxRecord, ErrorKind, LineShippingAssignment, Operation, OperationKind, ShippingPlan,
    ShippingSetup, StoreError,
};
use common::{new_cart, setup, spot, usd};
use serde_json::json;

fn method(key: &str, kind: ShippingMethodKind, address_key: &str) -> ShippingMethodDraft {
    ShippingMethodDraft {
        key: ShippingEntryId::new(key),
        name: key.to_string(),
        method: kind,
        address_key: Some(address_key.to_string()),
    }
}

fn standard() -> ShippingMethodDraft {
    method(
        "standard",
        ShippingMethodKind::Catalog {
            method_id: "sm-1".to_string(),
        },
        "home",
    )
}

fn freight() -> ShippingMethodDraft {
    method("freight", ShippingMethodKind::Custom { rate: usd(2500) }, "office")
}

fn record(cart_id: &str) -> AuxRecord {
    AuxRecord::new("delivery-instructions", cart_id, json!({ "window": "AM" }))
}

fn update_action_names(operation: &Operation) -> Vec<&'static str> {
    match operation {
        Operation::UpdateCart { actions, .. } => actions.iter().map(CartAction::name).collect(),
        other => panic!("unexpected operation {:?}", other),
    }
}

#[tokio::test]
async fn test_setup_writes_record_before_cart_update() {
    let (platform, orchestrator) =
        setup(InMemoryPlatform::new().with_shipping_rate("sm-1", usd(500)));
    let cart = new_cart(&orchestrator).await;
    let cart = orchestrator
        .add_line_item(&cart.snapshot, spot("p-1"), 2)
        .await
        .unwrap();
    let line_id = cart.snapshot.line_items[0].id.clone();

    let mut custom_fields = CustomFields::new();
    custom_fields.insert("deliveryWindow".to_string(), json!("AM"));
    let plan = ShippingPlan {
        shipping_address: Some(Address::new("US").with_key("home")),
        item_addresses: vec![
            Address::new("US").with_key("home"),
            Address::new("US").with_key("office"),
        ],
        methods: vec![standard(), freight()],
        assignments: vec![LineShippingAssignment {
            line_item_id: line_id.clone(),
            targets: vec![
                ShippingTarget {
                    address_key: "home".to_string(),
                    quantity: 1,
                    shipping_entry: Some(ShippingEntryId::new("standard")),
                },
                ShippingTarget {
                    address_key: "office".to_string(),
                    quantity: 1,
                    shipping_entry: Some(ShippingEntryId::new("freight")),
                },
            ],
        }],
        custom_fields,
    };
    let setup = ShippingSetup {
        record: Some(record(cart.id().as_str())),
        plan,
    };

    let cart = orchestrator
        .setup_shipping(&cart.snapshot, setup)
        .await
        .unwrap();

    assert_eq!(cart.version(), 3);
    assert_eq!(cart.snapshot.shipping.len(), 2);
    assert_eq!(
        cart.snapshot
            .shipping_entry(&ShippingEntryId::new("standard"))
            .unwrap()
            .price,
        usd(500)
    );
    assert_eq!(
        cart.snapshot
            .shipping_entry(&ShippingEntryId::new("freight"))
            .unwrap()
            .price,
        usd(2500)
    );
    assert_eq!(cart.snapshot.item_shipping_addresses.len(), 2);
    assert_eq!(cart.snapshot.line(&line_id).unwrap().shipping_targets.len(), 2);
    assert_eq!(cart.snapshot.custom_fields["deliveryWindow"], json!("AM"));

    let calls = platform.calls();
    let n = calls.len();
    assert!(matches!(&calls[n - 2], Call::StoreWrite(r) if r.container == "delivery-instructions"));
    match &calls[n - 1] {
        Call::Operation(operation) => assert_eq!(
            update_action_names(operation),
            vec![
                "setShippingAddress",
                "upsertItemShippingAddress",
                "upsertItemShippingAddress",
                "addShippingMethod",
                "addShippingMethod",
                "setLineItemShippingTargets",
                "setCustomField",
            ]
        ),
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_setup_replaces_stale_methods() {
    let (platform, orchestrator) = setup(InMemoryPlatform::new());
    let cart = new_cart(&orchestrator).await;
    let cart = orchestrator
        .set_shipping_methods(&cart.snapshot, vec![standard(), freight()])
        .await
        .unwrap();

    let setup = ShippingSetup {
        record: None,
        plan: ShippingPlan {
            methods: vec![standard()],
            ..ShippingPlan::default()
        },
    };
    let cart = orchestrator
        .setup_shipping(&cart.snapshot, setup)
        .await
        .unwrap();

    let keys: Vec<_> = cart.snapshot.shipping.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["standard"]);
    let operations = platform.operations();
    assert_eq!(
        update_action_names(&operations[operations.len() - 1]),
        vec!["removeShippingMethod"]
    );
    assert!(platform.records().is_empty());
}

#[tokio::test]
async fn test_store_failure_leaves_cart_untouched() {
    let (platform, orchestrator) = setup(InMemoryPlatform::new());
    let cart = new_cart(&orchestrator).await;
    platform.fail_next_write(StoreError::Unavailable("timeout".to_string()));

    let setup = ShippingSetup {
        record: Some(record(cart.id().as_str())),
        plan: ShippingPlan {
            methods: vec![standard()],
            ..ShippingPlan::default()
        },
    };
    let err = orchestrator
        .setup_shipping(&cart.snapshot, setup)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
    assert_eq!(platform.operation_count(OperationKind::Update), 0);
    assert_eq!(platform.cart(cart.id()).unwrap().version, 1);
}

#[tokio::test]
async fn test_store_rejection_is_bad_input() {
    let (platform, orchestrator) = setup(InMemoryPlatform::new());
    let cart = new_cart(&orchestrator).await;
    platform.fail_next_write(StoreError::Rejected {
        code: "InvalidJsonInput".to_string(),
        message: "window must be AM or PM".to_string(),
    });

    let setup = ShippingSetup {
        record: Some(record(cart.id().as_str())),
        plan: ShippingPlan::default(),
    };
    let err = orchestrator
        .setup_shipping(&cart.snapshot, setup)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadInput);
    assert!(platform.records().is_empty());
}

#[tokio::test]
async fn test_shipping_conflict_is_not_retried() {
    let (platform, orchestrator) = setup(InMemoryPlatform::new());
    let cart = new_cart(&orchestrator).await;
    platform
        .mutate(cart.id(), |cart| {
            cart.custom_fields.insert("channel".to_string(), json!("mobile"));
        })
        .unwrap();

    let setup = ShippingSetup {
        record: Some(record(cart.id().as_str())),
        plan: ShippingPlan {
            methods: vec![standard()],
            ..ShippingPlan::default()
        },
    };
    let err = orchestrator
        .setup_shipping(&cart.snapshot, setup)
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(platform.records().len(), 1);
    assert_eq!(platform.operation_count(OperationKind::Fetch), 0);
    assert!(platform.cart(cart.id()).unwrap().shipping.is_empty());
}
