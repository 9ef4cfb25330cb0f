//! Request payloads for the two specialist agents.
//!
//! Specialists receive one self-contained JSON request per consultation;
//! they never see the raw conversation. The builders here assemble those
//! requests from the intake packet and extracted context.

use anyhow::Result;
use serde::Serialize;

use clerky_core::exchange::{ChatTurn, IntakePacket, SCHEMA_VERSION};
use clerky_core::extract::{extract_product_details, Requirements};
use clerky_core::inventory::InventoryCheckResult;
use clerky_core::state::ConversationState;

use crate::channel::{send_payload, AgentChannel};

pub const SPECIALIST_REQUEST_TYPE: &str = "specialist_request";

#[derive(Debug, Serialize)]
pub struct ProductSpecialistRequest<'a> {
    pub schema_version: &'static str,
    pub message_type: &'static str,
    pub source_agent: &'static str,
    pub target_agent: &'static str,
    pub requested_action: &'static str,
    pub customer_context: ProductCustomerContext<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_context: Option<&'a InventoryCheckResult>,
    pub state_context: ConversationState,
    pub constraints: ProductConstraints,
}

#[derive(Debug, Serialize)]
pub struct ProductCustomerContext<'a> {
    pub latest_user_input: &'a str,
    pub requirements: &'a Requirements,
}

#[derive(Debug, Serialize)]
pub struct ProductConstraints {
    pub max_recommendations: u32,
    pub response_format: &'static str,
    pub must_return: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InsuranceSpecialistRequest<'a> {
    pub schema_version: &'static str,
    pub message_type: &'static str,
    pub source_agent: &'static str,
    pub target_agent: &'static str,
    pub requested_action: &'static str,
    pub product_context: InsuranceProductContext,
    pub pricing_context: InsurancePricingContext<'a>,
    pub state_context: ConversationState,
    pub constraints: InsuranceConstraints,
}

#[derive(Debug, Serialize)]
pub struct InsuranceProductContext {
    pub product_model: String,
    pub key_features: Vec<String>,
    pub configuration_class: &'static str,
}

#[derive(Debug, Serialize)]
pub struct InsurancePricingContext<'a> {
    pub purchase_price: &'a str,
}

#[derive(Debug, Serialize)]
pub struct InsuranceConstraints {
    pub response_format: &'static str,
}

pub fn build_product_request<'a>(
    packet: &'a IntakePacket,
    inventory: Option<&'a InventoryCheckResult>,
) -> ProductSpecialistRequest<'a> {
    ProductSpecialistRequest {
        schema_version: SCHEMA_VERSION,
        message_type: SPECIALIST_REQUEST_TYPE,
        source_agent: "orchestrator",
        target_agent: "product_specialist",
        requested_action: "provide_product_recommendations",
        customer_context: ProductCustomerContext {
            latest_user_input: &packet.conversation.latest_user_input,
            requirements: &packet.intake.extracted_requirements,
        },
        inventory_context: inventory,
        state_context: packet.routing_context.state,
        constraints: ProductConstraints {
            max_recommendations: 3,
            response_format: "json",
            must_return: "recommendations_or_no_match",
        },
    }
}

pub fn build_insurance_request<'a>(
    packet: &'a IntakePacket,
    history: &[ChatTurn],
) -> InsuranceSpecialistRequest<'a> {
    let details = extract_product_details(history);

    let key_features = if details.key_features.is_empty() {
        vec!["standard configuration".to_string()]
    } else {
        details.key_features
    };

    InsuranceSpecialistRequest {
        schema_version: SCHEMA_VERSION,
        message_type: SPECIALIST_REQUEST_TYPE,
        source_agent: "orchestrator",
        target_agent: "insurance_specialist",
        requested_action: "provide_insurance_quote",
        product_context: InsuranceProductContext {
            product_model: details.product_model.unwrap_or_else(|| "unspecified".to_string()),
            key_features,
            configuration_class: "standard",
        },
        pricing_context: InsurancePricingContext {
            purchase_price: packet
                .intake
                .extracted_requirements
                .budget
                .as_deref()
                .unwrap_or("TBD"),
        },
        state_context: packet.routing_context.state,
        constraints: InsuranceConstraints { response_format: "json" },
    }
}

/// One product consultation, no retries. The caller digests the raw reply.
pub async fn consult_product(
    channel: &dyn AgentChannel,
    packet: &IntakePacket,
    inventory: Option<&InventoryCheckResult>,
) -> Result<String> {
    send_payload(channel, &build_product_request(packet, inventory)).await
}

/// One insurance consultation, no retries.
pub async fn consult_insurance(
    channel: &dyn AgentChannel,
    packet: &IntakePacket,
    history: &[ChatTurn],
) -> Result<String> {
    send_payload(channel, &build_insurance_request(packet, history)).await
}
