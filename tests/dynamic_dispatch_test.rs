use serde_json::json;
use subrecon::domain::payment::OrderId;
use subrecon::domain::ports::{
    GuardStoreBox, SubscriptionActivatorBox, TariffCatalogBox, VerificationClientBox,
};
use subrecon::domain::state::GuardState;
use subrecon::domain::tariff::{ActivationRequest, Tariff};
use subrecon::infrastructure::in_memory::{
    InMemoryGuardStore, RecordingActivator, ScriptedVerification, ScriptedVerificationClient,
    StaticTariffCatalog,
};

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let guards: GuardStoreBox = Box::new(InMemoryGuardStore::new());
    let client: VerificationClientBox = Box::new(ScriptedVerificationClient::new(vec![
        ScriptedVerification::respond(json!({"result": {"orderid": "o1", "statuspay": "paid"}})),
    ]));
    let activator: SubscriptionActivatorBox = Box::new(RecordingActivator::new());
    let catalog: TariffCatalogBox = Box::new(StaticTariffCatalog::new(vec![Tariff {
        id: "t1".to_string(),
        name: "Basic".to_string(),
        price: Default::default(),
    }]));

    // Verify Send + Sync by spawning tasks
    let guard_handle = tokio::spawn(async move {
        let order = OrderId::from("o1");
        assert!(guards.try_claim(&order, GuardState::Activating).await.unwrap());
        guards.get(&order).await.unwrap()
    });

    let client_handle =
        tokio::spawn(async move { client.verify_payment(&OrderId::from("o1")).await.unwrap() });

    let activation_handle = tokio::spawn(async move {
        let tariff = catalog.tariffs().await.unwrap().remove(0);
        activator
            .create_subscription(ActivationRequest {
                tariff,
                devices: 1,
                period_months: 1,
                test_period: false,
                payment_mode: Default::default(),
                discount: Default::default(),
            })
            .await
            .unwrap()
    });

    assert_eq!(guard_handle.await.unwrap(), Some(GuardState::Activating));
    assert_eq!(client_handle.await.unwrap()["result"]["statuspay"], "paid");
    assert_eq!(activation_handle.await.unwrap().subscription_id, "sub-1");
}
