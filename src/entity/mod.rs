pub mod audit_logs;
pub mod cart_items;
pub mod coupon_redemptions;
pub mod coupons;
pub mod homepage_popups;
pub mod leads;
pub mod notifications;
pub mod order_items;
pub mod orders;
pub mod password_resets;
pub mod payments;
pub mod products;
pub mod programme_purchases;
pub mod programmes;
pub mod refresh_tokens;
pub mod subscription_plans;
pub mod subscriptions;
pub mod transformations;
pub mod users;
pub mod videos;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use coupon_redemptions::Entity as CouponRedemptions;
pub use coupons::Entity as Coupons;
pub use homepage_popups::Entity as HomepagePopups;
pub use leads::Entity as Leads;
pub use notifications::Entity as Notifications;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use password_resets::Entity as PasswordResets;
pub use payments::Entity as Payments;
pub use products::Entity as Products;
pub use programme_purchases::Entity as ProgrammePurchases;
pub use programmes::Entity as Programmes;
pub use refresh_tokens::Entity as RefreshTokens;
pub use subscription_plans::Entity as SubscriptionPlans;
pub use subscriptions::Entity as Subscriptions;
pub use transformations::Entity as Transformations;
pub use users::Entity as Users;
pub use videos::Entity as Videos;
