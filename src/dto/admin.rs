use serde::Serialize;
use utoipa::ToSchema;

use crate::models::Order;

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrencyTotal {
    pub currency: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_subscriptions: i64,
    pub orders_by_status: Vec<StatusCount>,
    /// Paid payments summed per charge currency.
    pub revenue_by_currency: Vec<CurrencyTotal>,
    pub new_leads: i64,
    pub low_stock_products: i64,
    pub recent_orders: Vec<Order>,
}
