use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "programme_purchases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub programme_id: Uuid,
    pub status: String,
    pub price_paid: i64,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::programmes::Entity",
        from = "Column::ProgrammeId",
        to = "super::programmes::Column::Id"
    )]
    Programmes,
}

impl Related<super::programmes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Programmes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
