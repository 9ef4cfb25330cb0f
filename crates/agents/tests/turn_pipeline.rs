//! End-to-end turn pipeline over scripted agents: intake, gating,
//! escalation, and the insurance handoff across one whole session.

use std::sync::Arc;

use clerky_agents::session::{AgentRoster, Session};
use clerky_agents::stub::ScriptedAgent;
use clerky_core::exchange::Speaker;
use clerky_core::state::{InsuranceStatus, ProductStatus, Routing};

const PRODUCT_REPLY: &str = r#"{
    "recommended_models": [
        {"model_name": "CN-5200", "price": "949 EUR", "features": ["NoFrost", "ice maker"]},
        {"model_name": "GNP-4355", "price": "899 EUR", "features": ["NoFrost"]}
    ],
    "reasoning": "Both stay under the stated budget."
}"#;

const INSURANCE_REPLY: &str = r#"{
    "status": "approved",
    "quote": {
        "bundle": "Comfort Protection",
        "monthly_premium": "7.50 EUR",
        "duration": "24 months"
    }
}"#;

fn scripted_customer() -> Arc<ScriptedAgent> {
    let customer = Arc::new(ScriptedAgent::new("customer_agent"));

    customer.enqueue(
        "I checked our internal stock and found two options that fit your budget.\n\n\
         ---\n\
         STATE: product_status=searching | insurance_status=not_offered | overall_status=inventory_check\n\
         ROUTING: none\n\
         INVENTORY_CHECKED: true\n\
         ITERATION_COUNT: 1\n\
         ---",
    );
    customer.enqueue(
        "Understood - let me bring in our product specialist for the external catalog.\n\n\
         ---\n\
         STATE: product_status=searching | insurance_status=not_offered | overall_status=product_negotiation\n\
         ROUTING: product_agent\n\
         INVENTORY_CHECKED: true\n\
         ITERATION_COUNT: 2\n\
         ---",
    );
    customer.enqueue(
        "Great choice! Let me get you an insurance offer for the CN-5200.\n\n\
         ---\n\
         STATE: product_status=agreed | insurance_status=offered | overall_status=insurance_phase\n\
         ROUTING: ergo_agent\n\
         INVENTORY_CHECKED: true\n\
         ITERATION_COUNT: 3\n\
         ---",
    );

    customer
}

#[tokio::test]
async fn full_session_flows_from_inventory_to_insurance() {
    let customer = scripted_customer();
    let product = Arc::new(ScriptedAgent::new("product_agent"));
    product.enqueue(PRODUCT_REPLY);
    let insurance = Arc::new(ScriptedAgent::new("insurance_agent"));
    insurance.enqueue(INSURANCE_REPLY);

    let roster = AgentRoster {
        customer: Some(customer),
        orchestrator: None,
        product: Some(product.clone()),
        insurance: Some(insurance.clone()),
    };
    let mut session = Session::new(roster);

    // Turn 1: requirements arrive, internal inventory is checked, nothing
    // is routed externally yet.
    let first = session.submit("I need a fridge under 1000 EUR for my flat in Germany").await;
    assert_eq!(first.result.routing, Routing::None);
    assert!(first.result.customer_response.contains("internal stock"));
    let inventory = first.result.inventory_check.as_ref().expect("inventory record");
    assert!(inventory.checked);
    assert_eq!(product.call_count(), 0);

    // Turn 2: the customer rejects the internal options, which satisfies
    // the inventory-first gate and unlocks the product specialist.
    let second = session.submit("none of these work for me, show more options").await;
    assert_eq!(second.result.routing, Routing::ProductAgent);
    assert_eq!(product.call_count(), 1);

    let product_entry = second
        .result
        .specialist_responses
        .iter()
        .find(|entry| entry.speaker == Speaker::ProductSpecialist)
        .expect("product entry");
    assert!(product_entry.response.contains("CN-5200"));
    assert!(product_entry.raw_response.contains("recommended_models"));
    assert_eq!(session.counters().product_specialist_calls, 1);

    // Turn 3: the product is agreed and the legacy `ergo_agent` alias in
    // the metadata still routes to the insurance specialist.
    let third = session.submit("I'll take the CN-5200 at 949 EUR").await;
    assert_eq!(third.result.routing, Routing::InsuranceAgent);
    assert_eq!(insurance.call_count(), 1);
    assert_eq!(third.result.state.product_status, ProductStatus::Agreed);
    assert_eq!(third.result.state.insurance_status, InsuranceStatus::Offered);

    let insurance_entry = third
        .result
        .specialist_responses
        .iter()
        .find(|entry| entry.speaker == Speaker::InsuranceSpecialist)
        .expect("insurance entry");
    assert!(insurance_entry.response.contains("Comfort Protection"));
    assert!(third.result.customer_response.contains("Insurance update:"));
}

#[tokio::test]
async fn insurance_request_before_agreement_yields_a_system_notice() {
    let customer = Arc::new(ScriptedAgent::new("customer_agent"));
    customer.enqueue(
        "I can look into insurance once we've settled on a product.\n\n\
         ---\n\
         STATE: product_status=collecting | insurance_status=not_offered | overall_status=intake\n\
         ROUTING: insurance_agent\n\
         INVENTORY_CHECKED: false\n\
         ITERATION_COUNT: 1\n\
         ---",
    );
    let insurance = Arc::new(ScriptedAgent::new("insurance_agent"));

    let roster = AgentRoster {
        customer: Some(customer),
        insurance: Some(insurance.clone()),
        ..AgentRoster::empty()
    };
    let mut session = Session::new(roster);

    let reply = session.submit("give me an insurance offer right away").await;

    assert_eq!(insurance.call_count(), 0);
    let system_entry = reply
        .result
        .specialist_responses
        .iter()
        .find(|entry| entry.speaker == Speaker::System)
        .expect("system entry");
    assert!(system_entry.response.contains("product not yet agreed"));
}
