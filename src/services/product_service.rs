use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::{
        products::{
            CreateProductRequest, ProductList, RateProductRequest, UpdateProductRequest,
            check_sale_price,
        },
        slugify,
    },
    entity::{
        categories::{Column as CategoryCol, Entity as Categories, Model as CategoryModel},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, effective_price},
    response::{ApiResponse, Meta},
    routes::params::{CategoryRef, Pagination, ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub const DEFAULT_CURATED_LIMIT: u64 = 8;

pub(crate) fn first_image(images: &Value) -> Option<String> {
    images
        .as_array()
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .map(String::from)
}

fn json_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn clean_list(values: Vec<String>) -> Value {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values.into_iter().map(|v| v.trim().to_string()) {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    Value::from(out)
}

pub(crate) fn product_from_entity(model: ProductModel, category: Option<&CategoryModel>) -> Product {
    Product {
        effective_price: effective_price(model.price, model.sale_price),
        id: model.id,
        name: model.name,
        slug: model.slug,
        sku: model.sku,
        description: model.description,
        brand: model.brand,
        price: model.price,
        sale_price: model.sale_price,
        category_id: model.category_id,
        category_name: category.map(|c| c.name.clone()),
        category_slug: category.map(|c| c.slug.clone()),
        stock_quantity: model.stock_quantity,
        images: json_strings(&model.images),
        sizes: json_strings(&model.sizes),
        colors: json_strings(&model.colors),
        is_active: model.is_active,
        is_featured: model.is_featured,
        is_new_arrival: model.is_new_arrival,
        black_friday_deal: model.black_friday_deal,
        black_friday_discount: model.black_friday_discount,
        views: model.views,
        rating: model.rating,
        rating_count: model.rating_count,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

/// Runs a product select with its category joined in.
pub(crate) async fn fetch_with_category<C: ConnectionTrait>(
    conn: &C,
    finder: Select<Products>,
) -> AppResult<Vec<Product>> {
    let rows = finder
        .find_also_related(Categories)
        .all(conn)
        .await?
        .into_iter()
        .map(|(product, category)| product_from_entity(product, category.as_ref()))
        .collect();
    Ok(rows)
}

/// Pages through `finder`, returning the page and its pagination block.
pub(crate) async fn paginate(
    state: &AppState,
    finder: Select<Products>,
    pagination: &Pagination,
) -> AppResult<(Vec<Product>, Meta)> {
    let (page, limit, offset) = pagination.normalize();
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = fetch_with_category(
        &state.orm,
        finder.limit(limit as u64).offset(offset as u64),
    )
    .await?;
    let meta = Meta::new(page, limit, total, items.len());
    Ok((items, meta))
}

fn active() -> Select<Products> {
    Products::find().filter(Column::IsActive.eq(true))
}

async fn resolve_category(state: &AppState, reference: &CategoryRef) -> AppResult<Option<Uuid>> {
    let id = match reference {
        CategoryRef::Id(id) => Some(*id),
        CategoryRef::Slug(slug) => Categories::find()
            .filter(CategoryCol::Slug.eq(slug.as_str()))
            .one(&state.orm)
            .await?
            .map(|c| c.id),
    };
    Ok(id)
}

/// Catalog listing. Every filter is optional and they combine with AND; only
/// active products are returned.
pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let mut condition = Condition::all().add(Column::IsActive.eq(true));

    if let Some(reference) = query.category.as_deref().and_then(CategoryRef::parse) {
        match resolve_category(state, &reference).await? {
            Some(id) => condition = condition.add(Column::CategoryId.eq(id)),
            None => {
                let (page, limit, _) = query.pagination().normalize();
                return Ok(ApiResponse::success(
                    "Products",
                    ProductList { items: Vec::new() },
                    Some(Meta::new(page, limit, 0, 0)),
                ));
            }
        }
    }
    if query.featured == Some(true) {
        condition = condition.add(Column::IsFeatured.eq(true));
    }
    if query.new_arrival == Some(true) {
        condition = condition.add(Column::IsNewArrival.eq(true));
    }
    if query.black_friday == Some(true) {
        condition = condition.add(Column::BlackFridayDeal.eq(true));
    }
    if query.deals == Some(true) {
        condition = condition
            .add(Column::SalePrice.is_not_null())
            .add(Expr::col((Products, Column::SalePrice)).lt(Expr::col((Products, Column::Price))));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        condition = condition.add(
            Condition::any()
                .add(Expr::col((Products, Column::Name)).ilike(pattern.clone()))
                .add(Expr::col((Products, Column::Description)).ilike(pattern.clone()))
                .add(Expr::col((Products, Column::Brand)).ilike(pattern)),
        );
    }
    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let (sort_by, sort_order) = query.sort();
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
        ProductSortBy::Rating => Column::Rating,
        ProductSortBy::Views => Column::Views,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };
    finder = finder.order_by_asc(Column::Id);

    let (items, meta) = paginate(state, finder, &query.pagination()).await?;
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

async fn find_one_counting_view(
    state: &AppState,
    condition: Condition,
) -> AppResult<Product> {
    let bumped = Products::update_many()
        .col_expr(Column::Views, Expr::col(Column::Views).add(1))
        .filter(condition.clone())
        .filter(Column::IsActive.eq(true))
        .exec(&state.orm)
        .await?;
    if bumped.rows_affected == 0 {
        return Err(AppError::not_found("Product"));
    }

    fetch_with_category(&state.orm, active().filter(condition))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Product"))
}

/// Reading a product counts as a view.
pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = find_one_counting_view(state, Condition::all().add(Column::Id.eq(id))).await?;
    Ok(ApiResponse::success("Product", product, None))
}

pub async fn get_by_slug(state: &AppState, slug: &str) -> AppResult<ApiResponse<Product>> {
    let condition = Condition::all().add(Column::Slug.eq(slug.trim()));
    let product = find_one_counting_view(state, condition).await?;
    Ok(ApiResponse::success("Product", product, None))
}

async fn curated(
    state: &AppState,
    finder: Select<Products>,
    limit: u64,
    message: &str,
) -> AppResult<ApiResponse<ProductList>> {
    let items = fetch_with_category(&state.orm, finder.limit(limit)).await?;
    Ok(ApiResponse::success(message, ProductList { items }, None))
}

pub async fn featured(state: &AppState, limit: u64) -> AppResult<ApiResponse<ProductList>> {
    let finder = active()
        .filter(Column::IsFeatured.eq(true))
        .order_by_desc(Column::CreatedAt);
    curated(state, finder, limit, "Featured products").await
}

pub async fn new_arrivals(state: &AppState, limit: u64) -> AppResult<ApiResponse<ProductList>> {
    let finder = active()
        .filter(Column::IsNewArrival.eq(true))
        .order_by_desc(Column::CreatedAt);
    curated(state, finder, limit, "New arrivals").await
}

pub async fn black_friday(state: &AppState, limit: u64) -> AppResult<ApiResponse<ProductList>> {
    let finder = active()
        .filter(Column::BlackFridayDeal.eq(true))
        .order_by_desc(Column::BlackFridayDiscount)
        .order_by_desc(Column::CreatedAt);
    curated(state, finder, limit, "Black Friday deals").await
}

/// Other active products from the same category.
pub async fn related(
    state: &AppState,
    id: Uuid,
    limit: u64,
) -> AppResult<ApiResponse<ProductList>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let Some(category_id) = product.category_id else {
        return Ok(ApiResponse::success(
            "Related products",
            ProductList { items: Vec::new() },
            None,
        ));
    };

    let finder = active()
        .filter(Column::CategoryId.eq(category_id))
        .filter(Column::Id.ne(id))
        .order_by_desc(Column::Rating)
        .order_by_desc(Column::CreatedAt);
    curated(state, finder, limit, "Related products").await
}

async fn ensure_unique<C: ConnectionTrait>(
    conn: &C,
    column: Column,
    value: &str,
    except: Option<Uuid>,
    message: &str,
) -> AppResult<()> {
    let mut finder = Products::find().filter(column.eq(value));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.one(conn).await?.is_some() {
        return Err(AppError::Conflict(message.to_string()));
    }
    Ok(())
}

async fn ensure_category<C: ConnectionTrait>(conn: &C, category_id: Uuid) -> AppResult<()> {
    if Categories::find_by_id(category_id).one(conn).await?.is_none() {
        return Err(AppError::invalid("category_id", "Category does not exist"));
    }
    Ok(())
}

async fn load_with_category(state: &AppState, id: Uuid) -> AppResult<Product> {
    fetch_with_category(&state.orm, Products::find_by_id(id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Product"))
}

pub async fn create_product(
    state: &AppState,
    admin: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;

    let slug = payload
        .slug
        .clone()
        .unwrap_or_else(|| slugify(&payload.name));
    if slug.is_empty() {
        return Err(AppError::invalid("slug", "A slug could not be derived from the name"));
    }
    let sku = payload
        .sku
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("PROD-{}", Utc::now().timestamp_millis()));

    ensure_unique(&state.orm, Column::Slug, &slug, None, "Product with this slug already exists").await?;
    ensure_unique(&state.orm, Column::Sku, &sku, None, "Product with this SKU already exists").await?;
    if let Some(category_id) = payload.category_id {
        ensure_category(&state.orm, category_id).await?;
    }

    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        slug: Set(slug),
        sku: Set(sku),
        description: Set(payload.description),
        brand: Set(payload.brand),
        price: Set(payload.price),
        sale_price: Set(payload.sale_price),
        category_id: Set(payload.category_id),
        stock_quantity: Set(payload.stock_quantity),
        images: Set(clean_list(payload.images)),
        sizes: Set(clean_list(payload.sizes)),
        colors: Set(clean_list(payload.colors)),
        is_active: Set(true),
        is_featured: Set(payload.is_featured),
        is_new_arrival: Set(payload.is_new_arrival),
        black_friday_deal: Set(payload.black_friday_deal),
        black_friday_discount: Set(payload.black_friday_discount),
        views: Set(0),
        rating: Set(0.0),
        rating_count: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id, "sku": product.sku }),
    )
    .await;

    let product = load_with_category(state, product.id).await?;
    Ok(ApiResponse::success("Product created successfully", product, None))
}

pub async fn update_product(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;

    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let price = payload.price.unwrap_or(existing.price);
    let sale_price = payload.sale_price.unwrap_or(existing.sale_price);
    if let Err(err) = check_sale_price(price, sale_price) {
        let mut errors = validator::ValidationErrors::new();
        errors.add("sale_price", err);
        return Err(AppError::Validation(errors));
    }

    if let Some(slug) = payload.slug.as_deref() {
        ensure_unique(&state.orm, Column::Slug, slug, Some(id), "Product with this slug already exists").await?;
    }
    if let Some(sku) = payload.sku.as_deref() {
        ensure_unique(&state.orm, Column::Sku, sku, Some(id), "Product with this SKU already exists").await?;
    }
    if let Some(Some(category_id)) = payload.category_id {
        ensure_category(&state.orm, category_id).await?;
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    if let Some(sku) = payload.sku {
        active.sku = Set(sku.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(Some(brand));
    }
    active.price = Set(price);
    active.sale_price = Set(sale_price);
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    if let Some(stock) = payload.stock_quantity {
        active.stock_quantity = Set(stock);
    }
    if let Some(images) = payload.images {
        active.images = Set(clean_list(images));
    }
    if let Some(sizes) = payload.sizes {
        active.sizes = Set(clean_list(sizes));
    }
    if let Some(colors) = payload.colors {
        active.colors = Set(clean_list(colors));
    }
    if let Some(flag) = payload.is_active {
        active.is_active = Set(flag);
    }
    if let Some(flag) = payload.is_featured {
        active.is_featured = Set(flag);
    }
    if let Some(flag) = payload.is_new_arrival {
        active.is_new_arrival = Set(flag);
    }
    if let Some(flag) = payload.black_friday_deal {
        active.black_friday_deal = Set(flag);
    }
    if let Some(discount) = payload.black_friday_discount {
        active.black_friday_discount = Set(discount);
    }
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    let product = load_with_category(state, product.id).await?;
    Ok(ApiResponse::success("Product updated successfully", product, None))
}

/// Soft delete: the row stays for order history but leaves the catalog.
pub async fn delete_product(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Products::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Product"));
    }

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product deleted successfully",
        serde_json::json!({}),
        None,
    ))
}

pub(crate) fn running_average(current: f64, count: i32, rating: i32) -> f64 {
    let count = f64::from(count.max(0));
    (current * count + f64::from(rating)) / (count + 1.0)
}

pub async fn rate_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: RateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .filter(Column::IsActive.eq(true))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product"))?;

    let rating = running_average(product.rating, product.rating_count, payload.rating);
    let count = product.rating_count + 1;

    let mut active: ActiveModel = product.into();
    active.rating = Set(rating);
    active.rating_count = Set(count);
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_rate",
        "products",
        serde_json::json!({ "product_id": product.id, "rating": payload.rating }),
    )
    .await;

    let product = load_with_category(state, product.id).await?;
    Ok(ApiResponse::success("Rating recorded", product, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_folds_in_new_rating() {
        assert_eq!(running_average(0.0, 0, 4), 4.0);
        assert_eq!(running_average(4.0, 1, 2), 3.0);
        assert!((running_average(4.5, 2, 5) - 4.666_666).abs() < 1e-3);
    }

    #[test]
    fn image_helpers_read_json_arrays() {
        let images = serde_json::json!(["a.jpg", "b.jpg"]);
        assert_eq!(first_image(&images).as_deref(), Some("a.jpg"));
        assert_eq!(first_image(&serde_json::json!([])), None);
        assert_eq!(json_strings(&images), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn lists_are_trimmed_and_deduplicated() {
        let cleaned = clean_list(vec![" M ".into(), "L".into(), "M".into(), "".into()]);
        assert_eq!(cleaned, serde_json::json!(["M", "L"]));
    }
}
