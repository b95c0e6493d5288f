use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub purpose: String,
    /// Order, subscription or programme purchase id, depending on `purpose`.
    pub reference_id: Uuid,
    /// Charged amount in `currency` minor units.
    pub amount: i64,
    pub currency: String,
    /// Amount after discount in base-currency minor units.
    pub base_amount: i64,
    pub discount_amount: i64,
    pub coupon_id: Option<Uuid>,
    pub status: String,
    pub provider_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
