use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartList, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, currency::DetectedCurrency},
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(FromRow)]
struct CartWithProductRow {
    cart_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
    image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<CartWithProductRow> for CartItemDto {
    fn from(row: CartWithProductRow) -> Self {
        CartItemDto {
            id: row.cart_id,
            line_total: row.price * row.quantity as i64,
            quantity: row.quantity,
            product: Product {
                id: row.product_id,
                name: row.name,
                description: row.description,
                price: row.price,
                stock: row.stock,
                image_url: row.image_url,
                is_active: row.is_active,
                created_at: row.created_at,
            },
        }
    }
}

const CART_SELECT: &str = r#"
    SELECT ci.id AS cart_id, ci.quantity,
           p.id AS product_id, p.name, p.description, p.price, p.stock,
           p.image_url, p.is_active, p.created_at
    FROM cart_items ci
    JOIN products p ON p.id = ci.product_id
"#;

pub fn subtotal(items: &[CartItemDto]) -> i64 {
    items.iter().map(|item| item.line_total).sum()
}

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    currency: DetectedCurrency,
) -> AppResult<ApiResponse<CartList>> {
    let rows = sqlx::query_as::<_, CartWithProductRow>(&format!(
        "{CART_SELECT} WHERE ci.user_id = $1 ORDER BY ci.created_at DESC"
    ))
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<CartItemDto> = rows.into_iter().map(CartItemDto::from).collect();
    let subtotal = subtotal(&items);
    let display_subtotal = state
        .config
        .currency
        .rates
        .convert(subtotal, currency.currency)
        .ok_or_else(|| AppError::BadRequest(format!("currency {} is not supported", currency.currency)))?;

    let total = items.len() as i64;
    let meta = Meta::new(1, total.max(1), total);
    Ok(ApiResponse::success(
        "OK",
        CartList {
            items,
            subtotal,
            currency: currency.currency,
            display_subtotal,
        },
        Some(meta),
    ))
}

async fn fetch_line(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<CartItemDto> {
    sqlx::query_as::<_, CartWithProductRow>(&format!(
        "{CART_SELECT} WHERE ci.user_id = $1 AND ci.product_id = $2"
    ))
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(&state.pool)
    .await?
    .map(CartItemDto::from)
    .ok_or(AppError::NotFound)
}

/// Adding a product already in the cart replaces its quantity.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM products WHERE id = $1")
        .bind(payload.product_id)
        .fetch_optional(&state.pool)
        .await?;
    match product {
        Some((true,)) => {}
        _ => return Err(AppError::BadRequest("product not found".to_string())),
    }

    sqlx::query(
        r#"
        INSERT INTO cart_items (id, user_id, product_id, quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .execute(&state.pool)
    .await?;

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
    )
    .await;

    let line = fetch_line(state, user.user_id, payload.product_id).await?;
    Ok(ApiResponse::success("OK", line, None))
}

pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let result = sqlx::query("UPDATE cart_items SET quantity = $3 WHERE user_id = $1 AND product_id = $2")
        .bind(user.user_id)
        .bind(product_id)
        .bind(payload.quantity)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    let line = fetch_line(state, user.user_id, product_id).await?;
    Ok(ApiResponse::success("Quantity updated", line, None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE product_id = $1 AND user_id = $2")
        .bind(product_id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({ "removed": result.rows_affected() }),
        Some(Meta::empty()),
    ))
}
