use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{HomepagePopup, Transformation};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransformationRequest {
    pub title: String,
    pub description: Option<String>,
    pub before_image_url: String,
    pub after_image_url: String,
    pub is_published: Option<bool>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTransformationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub before_image_url: Option<String>,
    pub after_image_url: Option<String>,
    pub is_published: Option<bool>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransformationList {
    pub items: Vec<Transformation>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePopupRequest {
    pub title: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub cta_label: Option<String>,
    pub cta_url: Option<String>,
    pub is_active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePopupRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub cta_label: Option<String>,
    pub cta_url: Option<String>,
    pub is_active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PopupList {
    pub items: Vec<HomepagePopup>,
}
