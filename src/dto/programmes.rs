use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    enums::PaymentProvider,
    models::{Payment, Programme, ProgrammePurchase},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProgrammeRequest {
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub duration_weeks: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProgrammeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub duration_weeks: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseProgrammeRequest {
    pub provider: PaymentProvider,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseResponse {
    pub purchase: ProgrammePurchase,
    pub payment: Payment,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgrammeList {
    pub items: Vec<Programme>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseList {
    pub items: Vec<ProgrammePurchase>,
}
