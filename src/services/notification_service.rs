use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::notifications::{
        MarkAllReadResult, NotificationList, NotificationQuery, SendNotificationRequest,
        SendNotificationResult,
    },
    entity::{
        notifications::{self, Column, Entity as Notifications},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Notification,
    response::{ApiResponse, Meta},
    state::AppState,
    validation::Validator,
};

/// Stores an in-app notification. Runs on the caller's connection so it
/// commits together with whatever triggered it.
pub async fn notify<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    title: &str,
    body: &str,
    kind: &str,
) -> AppResult<()> {
    notifications::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        title: Set(title.to_string()),
        body: Set(body.to_string()),
        kind: Set(kind.to_string()),
        is_read: Set(false),
        read_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

async fn unread_count(state: &AppState, user_id: Uuid) -> AppResult<i64> {
    Ok(Notifications::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::IsRead.eq(false))
        .count(&state.orm)
        .await? as i64)
}

pub async fn list_notifications(
    state: &AppState,
    user: &AuthUser,
    query: NotificationQuery,
) -> AppResult<ApiResponse<NotificationList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut finder = Notifications::find().filter(Column::UserId.eq(user.user_id));
    if query.unread_only.unwrap_or(false) {
        finder = finder.filter(Column::IsRead.eq(false));
    }
    let finder = finder.order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Notification::from)
        .collect();
    let unread_count = unread_count(state, user.user_id).await?;

    Ok(ApiResponse::success(
        "Notifications",
        NotificationList { items, unread_count },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn mark_read(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Notification>> {
    let existing = Notifications::find_by_id(id)
        .filter(Column::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if existing.is_read {
        return Ok(ApiResponse::success("Notification", existing.into(), None));
    }

    let mut active: notifications::ActiveModel = existing.into();
    active.is_read = Set(true);
    active.read_at = Set(Some(Utc::now().into()));
    let updated = active.update(&state.orm).await?;
    Ok(ApiResponse::success("Notification marked as read", updated.into(), None))
}

pub async fn mark_all_read(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<MarkAllReadResult>> {
    let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
    let result = Notifications::update_many()
        .col_expr(Column::IsRead, Expr::value(true))
        .col_expr(Column::ReadAt, Expr::value(Some(now)))
        .filter(Column::UserId.eq(user.user_id))
        .filter(Column::IsRead.eq(false))
        .exec(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Notifications marked as read",
        MarkAllReadResult {
            updated: result.rows_affected,
        },
        None,
    ))
}

/// Admin broadcast, or a direct message when `user_id` is set.
pub async fn send_notification(
    state: &AppState,
    user: &AuthUser,
    payload: SendNotificationRequest,
) -> AppResult<ApiResponse<SendNotificationResult>> {
    ensure_admin(user)?;
    Validator::new()
        .required(&payload.title, "title")
        .required(&payload.body, "body")
        .finish()?;

    let kind = payload
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or("announcement")
        .to_string();
    let title = payload.title.trim();
    let body = payload.body.trim();

    let recipients: Vec<Uuid> = match payload.user_id {
        Some(user_id) => {
            let exists = Users::find_by_id(user_id).one(&state.orm).await?;
            if exists.is_none() {
                return Err(AppError::NotFound);
            }
            vec![user_id]
        }
        None => Users::find()
            .filter(UserCol::IsActive.eq(true))
            .select_only()
            .column(UserCol::Id)
            .into_tuple()
            .all(&state.orm)
            .await?,
    };

    if !recipients.is_empty() {
        let now = Utc::now();
        let rows = recipients.iter().map(|user_id| notifications::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(*user_id),
            title: Set(title.to_string()),
            body: Set(body.to_string()),
            kind: Set(kind.clone()),
            is_read: Set(false),
            read_at: Set(None),
            created_at: Set(now.into()),
        });
        Notifications::insert_many(rows).exec(&state.orm).await?;
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "notification_send",
        "notifications",
        serde_json::json!({ "recipients": recipients.len(), "kind": kind }),
    )
    .await;

    Ok(ApiResponse::success(
        "Notification sent",
        SendNotificationResult {
            recipients: recipients.len() as u64,
        },
        Some(Meta::empty()),
    ))
}
