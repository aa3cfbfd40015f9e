use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartView, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem, effective_price},
    response::ApiResponse,
    state::AppState,
};

#[derive(FromRow)]
struct CartLineRow {
    id: Uuid,
    cart_id: Uuid,
    product_id: Uuid,
    product_name: String,
    product_image: Option<String>,
    price: i64,
    sale_price: Option<i64>,
    quantity: i32,
    size: String,
    color: String,
    created_at: DateTime<Utc>,
}

impl From<CartLineRow> for CartItem {
    fn from(row: CartLineRow) -> Self {
        let unit_price = effective_price(row.price, row.sale_price);
        CartItem {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_image: row.product_image,
            price: row.price,
            sale_price: row.sale_price,
            unit_price,
            quantity: row.quantity,
            size: row.size,
            color: row.color,
            line_total: unit_price * i64::from(row.quantity),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct StockRow {
    stock_quantity: i32,
    is_active: bool,
}

/// Returns the caller's cart, creating it on first use. Concurrent first
/// calls converge on the same row through the unique `user_id`.
pub async fn ensure_cart(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Cart> {
    sqlx::query(
        r#"
        INSERT INTO carts (id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    let cart = sqlx::query_as::<_, Cart>("SELECT id, user_id, created_at FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(cart)
}

pub async fn get_or_create_cart(state: &AppState, user_id: Uuid) -> AppResult<Cart> {
    let mut conn = state.pool.acquire().await?;
    ensure_cart(&mut conn, user_id).await
}

async fn load_items(conn: &mut PgConnection, cart_id: Uuid) -> AppResult<Vec<CartItem>> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        r#"
        SELECT ci.id, ci.cart_id, ci.product_id,
               p.name AS product_name, p.images->>0 AS product_image,
               p.price, p.sale_price,
               ci.quantity, ci.size, ci.color, ci.created_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at ASC, ci.id ASC
        "#,
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(CartItem::from).collect())
}

fn cart_view(cart: Cart, items: Vec<CartItem>) -> CartView {
    let item_count = items.iter().map(|i| i64::from(i.quantity)).sum();
    let subtotal = items.iter().map(|i| i.line_total).sum();
    CartView {
        cart,
        items,
        item_count,
        subtotal,
    }
}

async fn view_for(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let mut conn = state.pool.acquire().await?;
    let cart = ensure_cart(&mut conn, user_id).await?;
    let items = load_items(&mut conn, cart.id).await?;
    Ok(cart_view(cart, items))
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let view = view_for(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart", view, None))
}

/// Adds a product variant to the cart. A line with the same product, size and
/// color is merged by adding to its quantity.
pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    payload.validate()?;
    let size = payload.size.trim();
    let color = payload.color.trim();

    let mut tx = state.pool.begin().await?;
    let cart = ensure_cart(&mut tx, user.user_id).await?;

    let product = sqlx::query_as::<_, StockRow>(
        "SELECT stock_quantity, is_active FROM products WHERE id = $1 FOR UPDATE",
    )
    .bind(payload.product_id)
    .fetch_optional(&mut *tx)
    .await?
    .filter(|p| p.is_active)
    .ok_or_else(|| AppError::not_found("Product"))?;

    if state.config.enforce_stock_on_add {
        let existing: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT quantity FROM cart_items
            WHERE cart_id = $1 AND product_id = $2 AND size = $3 AND color = $4
            FOR UPDATE
            "#,
        )
        .bind(cart.id)
        .bind(payload.product_id)
        .bind(size)
        .bind(color)
        .fetch_optional(&mut *tx)
        .await?;

        let merged = existing.map_or(0, |(q,)| i64::from(q)) + i64::from(payload.quantity);
        if merged > i64::from(product.stock_quantity) {
            return Err(AppError::invalid("quantity", "Insufficient stock available"));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO cart_items (id, cart_id, product_id, quantity, size, color)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (cart_id, product_id, size, color)
        DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(cart.id)
    .bind(payload.product_id)
    .bind(payload.quantity)
    .bind(size)
    .bind(color)
    .execute(&mut *tx)
    .await?;

    let items = load_items(&mut tx, cart.id).await?;
    tx.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({
            "product_id": payload.product_id,
            "quantity": payload.quantity,
            "size": size,
            "color": color,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Item added to cart",
        cart_view(cart, items),
        None,
    ))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    payload.validate()?;

    let mut tx = state.pool.begin().await?;
    let line: Option<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT c.id, p.stock_quantity
        FROM cart_items ci
        JOIN carts c ON c.id = ci.cart_id
        JOIN products p ON p.id = ci.product_id
        WHERE ci.id = $1 AND c.user_id = $2
        FOR UPDATE OF ci
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (cart_id, stock) = line.ok_or_else(|| AppError::not_found("Cart item"))?;

    if state.config.enforce_stock_on_add && payload.quantity > stock {
        return Err(AppError::invalid("quantity", "Insufficient stock available"));
    }

    sqlx::query("UPDATE cart_items SET quantity = $1 WHERE id = $2 AND cart_id = $3")
        .bind(payload.quantity)
        .bind(item_id)
        .bind(cart_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "item_id": item_id, "quantity": payload.quantity }),
    )
    .await;

    let view = view_for(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart item updated", view, None))
}

/// Removing an item that is absent or not the caller's is a no-op.
pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.id = $1 AND ci.cart_id = c.id AND c.user_id = $2
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() > 0 {
        audit::record(
            &state.pool,
            Some(user.user_id),
            "cart_remove",
            "cart_items",
            serde_json::json!({ "item_id": item_id }),
        )
        .await;
    }

    let view = view_for(state, user.user_id).await?;
    Ok(ApiResponse::success("Item removed from cart", view, None))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.cart_id = c.id AND c.user_id = $1
        "#,
    )
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    tracing::debug!(user_id = %user.user_id, removed = result.rows_affected(), "cart cleared");

    let view = view_for(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart cleared", view, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, sale_price: Option<i64>, quantity: i32) -> CartItem {
        CartItem::from(CartLineRow {
            id: Uuid::new_v4(),
            cart_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            product_name: "Tee".into(),
            product_image: None,
            price,
            sale_price,
            quantity,
            size: "M".into(),
            color: "Black".into(),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn lines_are_priced_at_effective_price() {
        let item = line(2000, Some(1500), 3);
        assert_eq!(item.unit_price, 1500);
        assert_eq!(item.line_total, 4500);

        let item = line(2000, Some(2500), 1);
        assert_eq!(item.unit_price, 2000);
    }

    #[test]
    fn view_totals_sum_lines() {
        let cart = Cart {
            id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let view = cart_view(cart, vec![line(1000, None, 2), line(500, Some(400), 3)]);
        assert_eq!(view.item_count, 5);
        assert_eq!(view.subtotal, 2000 + 1200);
    }
}
