pub mod admin_service;
pub mod auth_service;
pub mod cart_service;
pub mod cms_service;
pub mod coupon_service;
pub mod coupon_usage_service;
pub mod lead_service;
pub mod notification_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod programme_service;
pub mod subscription_service;
pub mod user_service;
pub mod video_service;
