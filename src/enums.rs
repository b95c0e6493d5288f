//! String-backed enums stored in TEXT columns.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value.trim() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

text_enum!(Role {
    User => "user",
    Admin => "admin",
});

text_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Shipped => "shipped",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(OrderPaymentStatus {
    Unpaid => "unpaid",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

text_enum!(PaymentProvider {
    Paymob => "paymob",
    Tabby => "tabby",
});

text_enum!(
    /// What a payment settles; `reference_id` on the payment points at the row.
    PaymentPurpose {
        Order => "order",
        Subscription => "subscription",
        Programme => "programme",
    }
);

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

text_enum!(SubscriptionStatus {
    Pending => "pending",
    Active => "active",
    Cancelled => "cancelled",
    Expired => "expired",
});

text_enum!(PurchaseStatus {
    Pending => "pending",
    Active => "active",
    Cancelled => "cancelled",
});

text_enum!(LeadStatus {
    New => "new",
    Contacted => "contacted",
    Converted => "converted",
    Lost => "lost",
});

text_enum!(DiscountType {
    Percentage => "percentage",
    Fixed => "fixed",
});

text_enum!(
    /// Which checkout a coupon may be applied to.
    CouponScope {
        All => "all",
        Store => "store",
        Subscription => "subscription",
        Programme => "programme",
    }
);

impl CouponScope {
    pub fn covers(&self, target: CouponScope) -> bool {
        *self == CouponScope::All || *self == target
    }
}

impl From<PaymentPurpose> for CouponScope {
    fn from(purpose: PaymentPurpose) -> Self {
        match purpose {
            PaymentPurpose::Order => CouponScope::Store,
            PaymentPurpose::Subscription => CouponScope::Subscription,
            PaymentPurpose::Programme => CouponScope::Programme,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips_through_parse() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(*status));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
        assert_eq!(PaymentProvider::parse(" tabby "), Some(PaymentProvider::Tabby));
    }

    #[test]
    fn scope_all_covers_everything() {
        assert!(CouponScope::All.covers(CouponScope::Programme));
        assert!(CouponScope::Store.covers(CouponScope::Store));
        assert!(!CouponScope::Store.covers(CouponScope::Subscription));
    }

    #[test]
    fn only_pending_payments_are_open() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
    }
}
