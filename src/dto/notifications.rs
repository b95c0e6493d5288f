use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{models::Notification, routes::params::Pagination};

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub unread_only: Option<bool>,
}

impl NotificationQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationList {
    pub items: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendNotificationRequest {
    /// Single recipient; every active user when absent.
    pub user_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub kind: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendNotificationResult {
    pub recipients: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResult {
    pub updated: u64,
}
