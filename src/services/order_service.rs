use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::orders::{
        CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest,
        UpdatePaymentStatusRequest,
    },
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, PaymentStatus, effective_price},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::product_service::first_image,
    state::AppState,
};

const ORDER_NUMBER_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ORDER_NUMBER_SUFFIX_LEN: usize = 9;

/// `ORD-<epoch_ms>-<9 uppercase base36 chars>`. The suffix comes from a v4
/// UUID; the UNIQUE constraint on `orders.order_number` catches collisions.
pub fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let mut entropy = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(ORDER_NUMBER_SUFFIX_LEN);
    for _ in 0..ORDER_NUMBER_SUFFIX_LEN {
        suffix.push(ORDER_NUMBER_ALPHABET[(entropy % 36) as usize] as char);
        entropy /= 36;
    }
    format!("ORD-{millis}-{suffix}")
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        order_number: model.order_number,
        total_amount: model.total_amount,
        shipping_address: model.shipping_address,
        billing_address: model.billing_address,
        payment_method: model.payment_method,
        status: model.status.parse().unwrap_or_default(),
        payment_status: model.payment_status.parse().unwrap_or_default(),
        tracking_number: model.tracking_number,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn order_item_from_entity(model: OrderItemModel, product: Option<&ProductModel>) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: product.map(|p| p.name.clone()),
        product_image: product.and_then(|p| first_image(&p.images)),
        quantity: model.quantity,
        price: model.price,
        size: model.size,
        color: model.color,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) async fn load_order_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItem>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .find_also_related(Products)
        .all(conn)
        .await?
        .into_iter()
        .map(|(item, product)| order_item_from_entity(item, product.as_ref()))
        .collect();
    Ok(items)
}

/// Paginated order listing shared by the customer and admin views.
pub(crate) async fn list_orders_where(
    state: &AppState,
    mut condition: Condition,
    query: &OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match SortOrder::from_param(query.sort_order.as_deref()) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders: Vec<Order> = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total, orders.len());
    Ok(ApiResponse::success("Orders", OrderList { items: orders }, Some(meta)))
}

pub async fn get_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    list_orders_where(state, condition, &query).await
}

/// Reads one of the caller's orders. Another user's order is reported as
/// absent.
pub async fn get_order_by_id(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    let items = load_order_items(&state.orm, order.id).await?;
    Ok(ApiResponse::success(
        "Order",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        None,
    ))
}

struct PricedLine {
    product_id: Uuid,
    quantity: i32,
    size: String,
    color: String,
    unit_price: i64,
}

/// Checkout: prices every line from the live catalog, writes the order and
/// its items, decrements stock and empties the caller's cart. All of it
/// commits together or not at all.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    payload.validate()?;

    let mut product_ids: Vec<Uuid> = payload.items.iter().map(|i| i.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();

    let txn = state.orm.begin().await?;

    // Lock in id order so concurrent checkouts cannot deadlock each other.
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut lines = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let product = products
            .get(&item.product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", item.product_id)))?;

        let unit_price = effective_price(product.price, product.sale_price);
        if item.price.is_some_and(|submitted| submitted != unit_price) {
            return Err(AppError::invalid(
                "items",
                format!("Price of {} has changed, please review your cart", product.name),
            ));
        }

        lines.push(PricedLine {
            product_id: product.id,
            quantity: item.quantity,
            size: item.size.trim().to_string(),
            color: item.color.trim().to_string(),
            unit_price,
        });
    }

    let total_amount: i64 = lines
        .iter()
        .map(|l| l.unit_price * i64::from(l.quantity))
        .sum();
    if payload.total_amount.is_some_and(|submitted| submitted != total_amount) {
        return Err(AppError::invalid(
            "total_amount",
            "Order total does not match current prices",
        ));
    }

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        order_number: Set(generate_order_number()),
        total_amount: Set(total_amount),
        shipping_address: Set(payload.shipping_address),
        billing_address: Set(payload.billing_address),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
        tracking_number: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let decremented = Products::update_many()
            .col_expr(
                ProdCol::StockQuantity,
                Expr::col(ProdCol::StockQuantity).sub(line.quantity),
            )
            .col_expr(ProdCol::UpdatedAt, Expr::value(now))
            .filter(ProdCol::Id.eq(line.product_id))
            .filter(ProdCol::StockQuantity.gte(line.quantity))
            .exec(&txn)
            .await?;

        let product = products.get(&line.product_id);
        if decremented.rows_affected == 0 {
            let name = product.map_or_else(|| line.product_id.to_string(), |p| p.name.clone());
            return Err(AppError::invalid(
                "items",
                format!("Insufficient stock for product {name}"),
            ));
        }

        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            size: Set(line.size),
            color: Set(line.color),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;

        items.push(order_item_from_entity(item, product));
    }

    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?
    {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = order.total_amount,
        "order created"
    );
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_create",
        "orders",
        serde_json::json!({ "order_id": order.id, "order_number": order.order_number }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created successfully",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        None,
    ))
}

/// Admin-only. Any known status may be written; moves outside the usual
/// fulfilment graph are logged.
pub async fn update_order_status(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    let previous: OrderStatus = existing.status.parse().unwrap_or_default();
    if !previous.is_standard_transition(payload.status) {
        tracing::warn!(
            order_id = %id,
            from = %previous,
            to = %payload.status,
            reopened = previous.is_terminal(),
            "non-standard order status transition"
        );
    }

    let mut active: OrderActive = existing.into();
    active.status = Set(payload.status.as_str().to_string());
    if let Some(tracking) = payload
        .tracking_number
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
    {
        active.tracking_number = Set(Some(tracking));
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    tracing::info!(order_id = %order.id, from = %previous, to = %order.status, "order status changed");
    audit::record(
        &state.pool,
        Some(admin.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": previous, "to": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order status updated",
        order_from_entity(order),
        None,
    ))
}

pub async fn update_payment_status(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: UpdatePaymentStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    let mut active: OrderActive = existing.into();
    active.payment_status = Set(payload.payment_status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "order_payment_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "payment_status": order.payment_status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Payment status updated",
        order_from_entity(order),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn well_formed(number: &str) -> bool {
        let Some(rest) = number.strip_prefix("ORD-") else {
            return false;
        };
        let Some((millis, suffix)) = rest.split_once('-') else {
            return false;
        };
        !millis.is_empty()
            && millis.chars().all(|c| c.is_ascii_digit())
            && suffix.len() == 9
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    }

    #[test]
    fn order_number_has_expected_shape() {
        let number = generate_order_number();
        assert!(well_formed(&number), "unexpected order number {number}");
        assert!(!well_formed("ORD-123-abcdefghi"));
        assert!(!well_formed("ORD-123-ABC"));
    }

    #[test]
    fn order_numbers_do_not_repeat() {
        let numbers: HashSet<String> = (0..10_000).map(|_| generate_order_number()).collect();
        assert_eq!(numbers.len(), 10_000);
    }
}
