use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use subrecon::application::coordinator::ReconciliationCoordinator;
use subrecon::application::verification::VerificationService;
use subrecon::domain::ports::{GuardStoreBox, SubscriptionActivatorBox, VerificationClientBox};
use subrecon::domain::purchase::{PaymentMode, PurchaseDraft};
use subrecon::domain::tariff::Tariff;
use subrecon::infrastructure::in_memory::StaticTariffCatalog;

pub fn catalog() -> StaticTariffCatalog {
    StaticTariffCatalog::new(vec![
        Tariff {
            id: "t1".to_string(),
            name: "Basic".to_string(),
            price: dec!(150),
        },
        Tariff {
            id: "t2".to_string(),
            name: "Pro".to_string(),
            price: dec!(300),
        },
    ])
}

pub fn draft(tariff_id: &str) -> PurchaseDraft {
    PurchaseDraft {
        tariff_id: tariff_id.to_string(),
        devices: 1,
        period_months: 1,
        discount: dec!(0),
        payment_mode: PaymentMode::PayNow,
    }
}

pub fn coordinator(
    guards: GuardStoreBox,
    client: VerificationClientBox,
    activator: SubscriptionActivatorBox,
) -> Arc<ReconciliationCoordinator> {
    Arc::new(ReconciliationCoordinator::new(
        guards,
        VerificationService::new(client, Duration::from_secs(10)),
        activator,
        Box::new(catalog()),
    ))
}
