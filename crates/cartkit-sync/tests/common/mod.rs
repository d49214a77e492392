#![allow(dead_code)]

use cartkit_commerce::cart::{CartDraft, ContractItem, ContractRef, OwnershipContext, SpotItem};
use cartkit_commerce::ids::{CustomerId, ProductId, VariantId};
use cartkit_commerce::money::{Currency, Money};
use cartkit_sync::memory::InMemoryPlatform;
use cartkit_sync::{Backoff, CartOrchestrator, EnrichedCart, RetryConfig, SyncConfig};
use std::sync::Arc;

pub type Orchestrator = CartOrchestrator<InMemoryPlatform, InMemoryPlatform>;

pub fn config() -> SyncConfig {
    SyncConfig {
        retry: RetryConfig {
            max_attempts: 3,
            backoff: Backoff::None,
        },
        ..SyncConfig::default()
    }
}

pub fn setup(platform: InMemoryPlatform) -> (Arc<InMemoryPlatform>, Orchestrator) {
    let platform = Arc::new(platform);
    let orchestrator = CartOrchestrator::new(platform.clone(), platform.clone(), config());
    (platform, orchestrator)
}

pub fn usd(amount: i64) -> Money {
    Money::new(amount, Currency::USD)
}

pub fn spot(product: &str) -> SpotItem {
    SpotItem::new(ProductId::new(product), VariantId::new("1"))
}

pub fn contract_item(line_number: u32) -> ContractItem {
    ContractItem::new(
        ContractRef::new(2024, "C1001", line_number, None).unwrap(),
        ProductId::new("p-9"),
        VariantId::new("1"),
        usd(4200),
    )
}

pub fn customer(id: &str) -> OwnershipContext {
    OwnershipContext::customer(CustomerId::new(id))
}

pub async fn new_cart(orchestrator: &Orchestrator) -> EnrichedCart {
    orchestrator
        .create_cart(CartDraft::new(Currency::USD, customer("c-1")))
        .await
        .unwrap()
}
