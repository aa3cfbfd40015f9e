use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::{
        categories::{CreateCategoryRequest, UpdateCategoryRequest},
        products::ProductList,
        slugify,
    },
    entity::{
        categories::{ActiveModel, Column, Entity as Categories},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Category, CategoryNode},
    response::ApiResponse,
    routes::params::Pagination,
    services::product_service,
    state::AppState,
};

fn category_sql(filter: &str) -> String {
    format!(
        r#"
        SELECT c.id, c.name, c.slug, c.description, c.image, c.parent_id,
               parent.name AS parent_name, c.is_active, c.created_at,
               COUNT(p.id) FILTER (WHERE p.is_active) AS product_count
        FROM categories c
        LEFT JOIN categories parent ON parent.id = c.parent_id
        LEFT JOIN products p ON p.category_id = c.id
        WHERE {filter}
        GROUP BY c.id, parent.name
        ORDER BY c.name ASC
        "#
    )
}

async fn find_view(state: &AppState, id: Uuid, active_only: bool) -> AppResult<Category> {
    let filter = if active_only {
        "c.id = $1 AND c.is_active"
    } else {
        "c.id = $1"
    };
    let sql = category_sql(filter);
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))
}

/// Arranges categories into a forest by `parent_id`. Categories whose parent
/// is not in `categories` are dropped along with their descendants.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let mut by_parent: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
    for category in categories {
        by_parent.entry(category.parent_id).or_default().push(category);
    }

    fn attach(
        parent: Option<Uuid>,
        by_parent: &mut HashMap<Option<Uuid>, Vec<Category>>,
    ) -> Vec<CategoryNode> {
        let Some(level) = by_parent.remove(&parent) else {
            return Vec::new();
        };
        level
            .into_iter()
            .map(|category| {
                let children = attach(Some(category.id), by_parent);
                CategoryNode { category, children }
            })
            .collect()
    }

    attach(None, &mut by_parent)
}

/// Whether making `proposed_parent` the parent of `id` would close a loop.
/// `parents` maps every category id to its current parent.
pub fn creates_cycle(
    id: Uuid,
    proposed_parent: Uuid,
    parents: &HashMap<Uuid, Option<Uuid>>,
) -> bool {
    let mut cursor = Some(proposed_parent);
    let mut steps = 0;
    while let Some(current) = cursor {
        if current == id || steps > parents.len() {
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
        steps += 1;
    }
    false
}

pub async fn list(state: &AppState) -> AppResult<ApiResponse<Vec<Category>>> {
    let sql = category_sql("c.is_active");
    let categories = sqlx::query_as::<_, Category>(&sql)
        .fetch_all(&state.pool)
        .await?;
    Ok(ApiResponse::success("Categories", categories, None))
}

pub async fn tree(state: &AppState) -> AppResult<ApiResponse<Vec<CategoryNode>>> {
    let sql = category_sql("c.is_active");
    let categories = sqlx::query_as::<_, Category>(&sql)
        .fetch_all(&state.pool)
        .await?;
    Ok(ApiResponse::success("Category tree", build_tree(categories), None))
}

pub async fn get_by_id(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Category>> {
    let category = find_view(state, id, true).await?;
    Ok(ApiResponse::success("Category", category, None))
}

pub async fn get_by_slug(state: &AppState, slug: &str) -> AppResult<ApiResponse<Category>> {
    let sql = category_sql("c.slug = $1 AND c.is_active");
    let category = sqlx::query_as::<_, Category>(&sql)
        .bind(slug.trim())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;
    Ok(ApiResponse::success("Category", category, None))
}

pub async fn children(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Vec<Category>>> {
    find_view(state, id, true).await?;
    let sql = category_sql("c.parent_id = $1 AND c.is_active");
    let children = sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .fetch_all(&state.pool)
        .await?;
    Ok(ApiResponse::success("Subcategories", children, None))
}

pub async fn products(
    state: &AppState,
    id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    find_view(state, id, true).await?;
    let finder = Products::find()
        .filter(ProdCol::IsActive.eq(true))
        .filter(ProdCol::CategoryId.eq(id))
        .order_by_desc(ProdCol::CreatedAt)
        .order_by_asc(ProdCol::Id);
    let (items, meta) = product_service::paginate(state, finder, &pagination).await?;
    Ok(ApiResponse::success("Category products", ProductList { items }, Some(meta)))
}

async fn ensure_slug_free(state: &AppState, slug: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut finder = Categories::find().filter(Column::Slug.eq(slug));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.one(&state.orm).await?.is_some() {
        return Err(AppError::Conflict(
            "Category with this slug already exists".into(),
        ));
    }
    Ok(())
}

async fn ensure_parent(state: &AppState, parent_id: Uuid) -> AppResult<()> {
    if Categories::find_by_id(parent_id).one(&state.orm).await?.is_none() {
        return Err(AppError::invalid("parent_id", "Parent category does not exist"));
    }
    Ok(())
}

pub async fn create(
    state: &AppState,
    admin: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    payload.validate()?;
    let slug = payload
        .slug
        .clone()
        .unwrap_or_else(|| slugify(&payload.name));
    if slug.is_empty() {
        return Err(AppError::invalid("slug", "A slug could not be derived from the name"));
    }

    ensure_slug_free(state, &slug, None).await?;
    if let Some(parent_id) = payload.parent_id {
        ensure_parent(state, parent_id).await?;
    }

    let category = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        slug: Set(slug),
        description: Set(payload.description),
        image: Set(payload.image),
        parent_id: Set(payload.parent_id),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id, "slug": category.slug }),
    )
    .await;

    let view = find_view(state, category.id, false).await?;
    Ok(ApiResponse::success("Category created successfully", view, None))
}

pub async fn update(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    payload.validate()?;
    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Category"))?;

    if let Some(slug) = payload.slug.as_deref() {
        ensure_slug_free(state, slug, Some(id)).await?;
    }

    if let Some(Some(parent_id)) = payload.parent_id {
        ensure_parent(state, parent_id).await?;
        let parents: HashMap<Uuid, Option<Uuid>> = Categories::find()
            .select_only()
            .column(Column::Id)
            .column(Column::ParentId)
            .into_tuple::<(Uuid, Option<Uuid>)>()
            .all(&state.orm)
            .await?
            .into_iter()
            .collect();
        if creates_cycle(id, parent_id, &parents) {
            return Err(AppError::invalid(
                "parent_id",
                "A category cannot be moved under itself or one of its descendants",
            ));
        }
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(image) = payload.image {
        active.image = Set(Some(image));
    }
    if let Some(parent_id) = payload.parent_id {
        active.parent_id = Set(parent_id);
    }
    if let Some(flag) = payload.is_active {
        active.is_active = Set(flag);
    }
    active.updated_at = Set(Utc::now().into());
    let category = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    let view = find_view(state, category.id, false).await?;
    Ok(ApiResponse::success("Category updated successfully", view, None))
}

/// Soft delete.
pub async fn delete(
    state: &AppState,
    admin: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Categories::update_many()
        .col_expr(Column::IsActive, Expr::value(false))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::Id.eq(id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("Category"));
    }

    audit::record(
        &state.pool,
        Some(admin.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category deleted successfully",
        serde_json::json!({}),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: Uuid, parent_id: Option<Uuid>, name: &str) -> Category {
        Category {
            id,
            name: name.into(),
            slug: name.to_lowercase(),
            description: None,
            image: None,
            parent_id,
            parent_name: None,
            is_active: true,
            product_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_children_and_drops_orphans() {
        let men = Uuid::new_v4();
        let shoes = Uuid::new_v4();
        let boots = Uuid::new_v4();
        let orphan = Uuid::new_v4();

        let tree = build_tree(vec![
            category(men, None, "Men"),
            category(shoes, Some(men), "Shoes"),
            category(boots, Some(shoes), "Boots"),
            category(orphan, Some(Uuid::new_v4()), "Lost"),
        ]);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].category.id, men);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].category.id, shoes);
        assert_eq!(tree[0].children[0].children[0].category.id, boots);
    }

    #[test]
    fn cycles_are_detected_through_ancestors() {
        let root = Uuid::new_v4();
        let mid = Uuid::new_v4();
        let leaf = Uuid::new_v4();
        let other = Uuid::new_v4();
        let parents = HashMap::from([
            (root, None),
            (mid, Some(root)),
            (leaf, Some(mid)),
            (other, None),
        ]);

        assert!(creates_cycle(root, root, &parents));
        assert!(creates_cycle(root, leaf, &parents));
        assert!(creates_cycle(mid, leaf, &parents));
        assert!(!creates_cycle(leaf, other, &parents));
        assert!(!creates_cycle(other, leaf, &parents));
    }
}
