use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        admin::{DashboardStats, InventoryAdjustRequest, LowStockQuery, StatusCount},
        orders::{OrderList, OrderWithItems},
        products::ProductList,
    },
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{OrderStatus, Product},
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::{order_service, product_service},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    order_service::list_orders_where(state, Condition::all(), &query).await
}

pub async fn get_order_admin(state: &AppState, id: Uuid) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order"))?;

    let items = order_service::load_order_items(&state.orm, order.id).await?;
    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems {
            order: order_service::order_from_entity(order),
            items,
        },
        None,
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let finder = Products::find()
        .filter(ProdCol::IsActive.eq(true))
        .filter(ProdCol::StockQuantity.lte(query.threshold()))
        .order_by_asc(ProdCol::StockQuantity)
        .order_by_desc(ProdCol::CreatedAt);

    let (items, meta) = product_service::paginate(state, finder, &query.pagination()).await?;
    Ok(ApiResponse::success("Low stock", ProductList { items }, Some(meta)))
}

/// Applies a signed stock change under a row lock. The result may not go
/// below zero.
pub async fn adjust_inventory(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    if payload.delta == 0 {
        return Err(AppError::invalid("delta", "delta must not be 0"));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let new_stock = i64::from(product.stock_quantity) + i64::from(payload.delta);
    let new_stock = i32::try_from(new_stock)
        .ok()
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| AppError::invalid("delta", "Stock cannot be negative"))?;

    let mut active: ProductActive = product.into();
    active.stock_quantity = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(product_id = %updated.id, delta = payload.delta, stock = new_stock, "inventory adjusted");
    audit::record(
        &state.pool,
        Some(admin.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    let product = product_service::fetch_with_category(&state.orm, Products::find_by_id(updated.id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Product"))?;
    Ok(ApiResponse::success("Inventory updated", product, None))
}

pub async fn dashboard_stats(state: &AppState) -> AppResult<ApiResponse<DashboardStats>> {
    let total_users = Users::find().count(&state.orm).await? as i64;
    let active_products = Products::find()
        .filter(ProdCol::IsActive.eq(true))
        .count(&state.orm)
        .await? as i64;
    let total_orders = Orders::find().count(&state.orm).await? as i64;

    let revenue: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(total_amount), 0)::BIGINT
        FROM orders
        WHERE status NOT IN ('cancelled', 'refunded')
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let counts: Vec<(String, i64)> = Orders::find()
        .select_only()
        .column(OrderCol::Status)
        .column_as(Expr::col(OrderCol::Id).count(), "count")
        .group_by(OrderCol::Status)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let orders_by_status = OrderStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: counts
                .iter()
                .find(|(s, _)| s == status.as_str())
                .map_or(0, |(_, c)| *c),
        })
        .collect();

    Ok(ApiResponse::success(
        "Dashboard stats",
        DashboardStats {
            total_users,
            active_products,
            total_orders,
            revenue: revenue.unwrap_or(0),
            orders_by_status,
        },
        None,
    ))
}
