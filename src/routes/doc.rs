use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    currency::Currency,
    error::{ErrorBody, ErrorDetail, FieldError},
    dto::{
        admin::{CurrencyTotal, DashboardStats, StatusCount},
        auth::{
            ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
            ResetPasswordRequest, TokenResponse,
        },
        cart::{AddToCartRequest, CartItemDto, CartList, UpdateCartItemRequest},
        cms::{
            CreatePopupRequest, CreateTransformationRequest, PopupList, TransformationList,
            UpdatePopupRequest, UpdateTransformationRequest,
        },
        coupons::{
            CouponList, CouponQuote, CouponUsage, CreateCouponRequest, ReconcileReport,
            UpdateCouponRequest, ValidateCouponRequest,
        },
        leads::{CreateLeadRequest, LeadList, UpdateLeadStatusRequest},
        notifications::{
            MarkAllReadResult, NotificationList, SendNotificationRequest, SendNotificationResult,
        },
        orders::{CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        payments::{CleanupReport, PaymentList, WebhookAck},
        products::{CreateProductRequest, InventoryAdjustRequest, ProductList, UpdateProductRequest},
        programmes::{
            CreateProgrammeRequest, ProgrammeList, PurchaseList, PurchaseProgrammeRequest,
            PurchaseResponse, UpdateProgrammeRequest,
        },
        subscriptions::{
            CreatePlanRequest, PlanList, SubscribeRequest, SubscribeResponse, SubscriptionList,
            UpdatePlanRequest,
        },
        users::{AdminUpdateUserRequest, ChangePasswordRequest, UpdateProfileRequest, UserList},
        videos::{CreateVideoRequest, UpdateVideoRequest, VideoList},
    },
    enums::{CouponScope, DiscountType, PaymentProvider, PaymentPurpose},
    middleware::currency::{CurrencySource, DetectedCurrency},
    models::{
        CartItem, Coupon, CouponRedemption, HomepagePopup, Lead, Notification, Order, OrderItem,
        Payment, Product, Programme, ProgrammePurchase, Subscription, SubscriptionPlan,
        Transformation, User, Video,
    },
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, cms, coupons, currency, health, leads, notifications, orders, params,
        payments, products as product_routes, programmes, subscriptions, users, videos,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        currency::detect_currency,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::forgot_password,
        auth::reset_password,
        auth::me,
        users::get_profile,
        users::update_profile,
        users::change_password,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_quantity,
        cart::remove_from_cart,
        cart::clear_cart,
        orders::list_order,
        orders::checkout,
        orders::get_order,
        coupons::validate_coupon,
        coupons::list_coupons,
        coupons::create_coupon,
        coupons::get_coupon,
        coupons::update_coupon,
        coupons::delete_coupon,
        coupons::coupon_usage,
        coupons::reconcile_coupon,
        subscriptions::list_plans,
        subscriptions::create_plan,
        subscriptions::update_plan,
        subscriptions::delete_plan,
        subscriptions::subscribe,
        subscriptions::my_subscriptions,
        subscriptions::cancel_subscription,
        subscriptions::list_subscriptions,
        programmes::list_programmes,
        programmes::get_programme,
        programmes::create_programme,
        programmes::update_programme,
        programmes::delete_programme,
        programmes::purchase_programme,
        programmes::my_purchases,
        programmes::list_purchases,
        payments::list_my_payments,
        payments::get_payment,
        payments::list_payments,
        payments::refund_payment,
        payments::paymob_webhook,
        payments::tabby_webhook,
        leads::create_lead,
        leads::list_leads,
        leads::update_lead_status,
        leads::delete_lead,
        cms::list_transformations,
        cms::list_all_transformations,
        cms::create_transformation,
        cms::update_transformation,
        cms::delete_transformation,
        cms::active_popup,
        cms::list_popups,
        cms::create_popup,
        cms::update_popup,
        cms::delete_popup,
        videos::list_videos,
        videos::get_video,
        videos::create_video,
        videos::update_video,
        videos::delete_video,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::send_notification,
        admin::dashboard,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::run_payment_cleanup
    ),
    components(
        schemas(
            ErrorBody,
            ErrorDetail,
            FieldError,
            User,
            Product,
            CartItem,
            Order,
            OrderItem,
            Coupon,
            CouponRedemption,
            Payment,
            SubscriptionPlan,
            Subscription,
            Programme,
            ProgrammePurchase,
            Transformation,
            Video,
            HomepagePopup,
            Lead,
            Notification,
            Currency,
            CurrencySource,
            DetectedCurrency,
            PaymentProvider,
            PaymentPurpose,
            DiscountType,
            CouponScope,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            TokenResponse,
            UpdateProfileRequest,
            ChangePasswordRequest,
            AdminUpdateUserRequest,
            UserList,
            CreateProductRequest,
            UpdateProductRequest,
            InventoryAdjustRequest,
            ProductList,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemDto,
            CartList,
            CheckoutRequest,
            CheckoutResponse,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            CreateCouponRequest,
            UpdateCouponRequest,
            ValidateCouponRequest,
            CouponQuote,
            CouponList,
            CouponUsage,
            ReconcileReport,
            CreatePlanRequest,
            UpdatePlanRequest,
            SubscribeRequest,
            SubscribeResponse,
            PlanList,
            SubscriptionList,
            CreateProgrammeRequest,
            UpdateProgrammeRequest,
            PurchaseProgrammeRequest,
            PurchaseResponse,
            ProgrammeList,
            PurchaseList,
            PaymentList,
            WebhookAck,
            CleanupReport,
            CreateLeadRequest,
            UpdateLeadStatusRequest,
            LeadList,
            CreateTransformationRequest,
            UpdateTransformationRequest,
            TransformationList,
            CreatePopupRequest,
            UpdatePopupRequest,
            PopupList,
            CreateVideoRequest,
            UpdateVideoRequest,
            VideoList,
            NotificationList,
            SendNotificationRequest,
            SendNotificationResult,
            MarkAllReadResult,
            StatusCount,
            CurrencyTotal,
            DashboardStats,
            params::Pagination,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Payment>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and token endpoints"),
        (name = "Users", description = "Profile and user management"),
        (name = "Products", description = "Store catalogue"),
        (name = "Cart", description = "Shopping cart"),
        (name = "Orders", description = "Store checkout and order history"),
        (name = "Coupons", description = "Discount codes"),
        (name = "Subscriptions", description = "Membership plans and subscriptions"),
        (name = "Programmes", description = "Training programmes"),
        (name = "Payments", description = "Payments and provider webhooks"),
        (name = "Leads", description = "Contact requests"),
        (name = "CMS", description = "Transformations and homepage popups"),
        (name = "Videos", description = "Workout video library"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Currency", description = "Display currency detection"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
