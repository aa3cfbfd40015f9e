mod common;

use serde_json::json;
use storefront_api::{
    dto::{
        categories::{CreateCategoryRequest, UpdateCategoryRequest},
        products::{RateProductRequest, UpdateProductRequest},
    },
    error::AppError,
    models::Role,
    routes::params::{Pagination, ProductQuery},
    services::{category_service, product_service},
    state::AppState,
};
use storefront_api::middleware::auth::AuthUser;
use uuid::Uuid;

async fn category(
    state: &AppState,
    admin: &AuthUser,
    parent_id: Option<Uuid>,
) -> anyhow::Result<storefront_api::models::Category> {
    let created = category_service::create(
        state,
        admin,
        CreateCategoryRequest {
            name: common::unique("Category"),
            slug: None,
            description: None,
            image: None,
            parent_id,
        },
    )
    .await?
    .data
    .expect("category");
    Ok(created)
}

#[tokio::test]
async fn products_get_derived_slugs_and_unique_identity() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let name = common::unique("Trail Runner");

    let product = common::create_product_with(&state, &admin, json!({ "name": name, "price": 9900 })).await?;
    assert_eq!(product.slug, storefront_api::dto::slugify(&name));
    assert!(product.sku.starts_with("PROD-"));
    assert_eq!(product.effective_price, 9900);

    let err = common::create_product_with(
        &state,
        &admin,
        json!({ "name": "Another", "slug": product.slug, "price": 100 }),
    )
    .await
    .expect_err("duplicate slug");
    let err = err.downcast::<AppError>()?;
    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn reads_count_views_and_soft_delete_hides_products() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let product = common::create_product(&state, &admin, 1000, None, 5).await?;

    product_service::get_product(&state, product.id).await?;
    let seen = product_service::get_by_slug(&state, &product.slug)
        .await?
        .data
        .expect("product");
    assert_eq!(seen.views, 2);

    product_service::delete_product(&state, &admin, product.id).await?;
    let err = product_service::get_product(&state, product.id)
        .await
        .expect_err("deleted product is hidden");
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn sale_price_is_checked_against_the_merged_price() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let product = common::create_product(&state, &admin, 1000, Some(800), 5).await?;

    let err = product_service::update_product(
        &state,
        &admin,
        product.id,
        UpdateProductRequest {
            price: Some(700),
            ..Default::default()
        },
    )
    .await
    .expect_err("existing sale price is no longer below price");
    assert!(matches!(err, AppError::Validation(_)));

    let cleared = product_service::update_product(
        &state,
        &admin,
        product.id,
        UpdateProductRequest {
            price: Some(700),
            sale_price: Some(None),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("product");
    assert_eq!(cleared.sale_price, None);
    assert_eq!(cleared.effective_price, 700);
    Ok(())
}

#[tokio::test]
async fn ratings_keep_a_running_average() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let user = common::create_user(&state, Role::User).await?;
    let product = common::create_product(&state, &admin, 1000, None, 5).await?;

    product_service::rate_product(&state, &user, product.id, RateProductRequest { rating: 5 }).await?;
    let rated = product_service::rate_product(&state, &user, product.id, RateProductRequest { rating: 2 })
        .await?
        .data
        .expect("product");
    assert_eq!(rated.rating_count, 2);
    assert!((rated.rating - 3.5).abs() < 1e-9);

    let err = product_service::rate_product(&state, &user, product.id, RateProductRequest { rating: 6 })
        .await
        .expect_err("out of range");
    assert!(matches!(err, AppError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn listing_filters_by_category_and_price() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let shoes = category(&state, &admin, None).await?;

    for price in [1000, 5000, 9000] {
        common::create_product_with(
            &state,
            &admin,
            json!({
                "name": common::unique("Shoe"),
                "sku": common::unique("SKU"),
                "price": price,
                "category_id": shoes.id,
            }),
        )
        .await?;
    }

    let page = product_service::list_products(
        &state,
        ProductQuery {
            category: Some(shoes.slug.clone()),
            min_price: Some(2000),
            sort_by: Some("price".into()),
            order: Some("asc".into()),
            ..Default::default()
        },
    )
    .await?;
    let prices: Vec<i64> = page.data.expect("products").items.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![5000, 9000]);
    assert_eq!(page.meta.and_then(|m| m.total), Some(2));

    let by_id = product_service::list_products(
        &state,
        ProductQuery {
            category: Some(shoes.id.to_string()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(by_id.data.expect("products").items.len(), 3);

    let unknown = product_service::list_products(
        &state,
        ProductQuery {
            category: Some(common::unique("no-such-category")),
            ..Default::default()
        },
    )
    .await?;
    assert!(unknown.data.expect("products").items.is_empty());

    let in_category = category_service::products(&state, shoes.id, Pagination::default())
        .await?
        .data
        .expect("products");
    assert_eq!(in_category.items.len(), 3);

    let counted = category_service::get_by_id(&state, shoes.id).await?.data.expect("category");
    assert_eq!(counted.product_count, 3);
    Ok(())
}

async fn listed_ids(state: &AppState, query: ProductQuery) -> anyhow::Result<Vec<Uuid>> {
    let page = product_service::list_products(state, query).await?;
    Ok(page.data.expect("products").items.iter().map(|p| p.id).collect())
}

#[tokio::test]
async fn listing_flags_search_and_price_range_compose() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let shelf = category(&state, &admin, None).await?;
    let token = common::unique("Trail");

    let budget = common::create_product_with(
        &state,
        &admin,
        json!({
            "name": common::unique("Sock"),
            "sku": common::unique("SKU"),
            "description": format!("everyday {} sock", token.to_lowercase()),
            "price": 400,
            "category_id": shelf.id,
            "black_friday_deal": true,
            "black_friday_discount": 25,
        }),
    )
    .await?;
    let runner = common::create_product_with(
        &state,
        &admin,
        json!({
            "name": common::unique("Runner"),
            "sku": common::unique("SKU"),
            "brand": token.as_str(),
            "price": 1500,
            "sale_price": 1200,
            "category_id": shelf.id,
            "is_featured": true,
        }),
    )
    .await?;
    let boot = common::create_product_with(
        &state,
        &admin,
        json!({
            "name": format!("{token} Boot"),
            "sku": common::unique("SKU"),
            "price": 2500,
            "category_id": shelf.id,
            "is_new_arrival": true,
        }),
    )
    .await?;

    let in_shelf = || ProductQuery {
        category: Some(shelf.slug.clone()),
        ..Default::default()
    };

    let ranged = listed_ids(&state, ProductQuery {
        min_price: Some(500),
        max_price: Some(2000),
        ..in_shelf()
    })
    .await?;
    assert_eq!(ranged, vec![runner.id]);

    let capped = listed_ids(&state, ProductQuery {
        max_price: Some(1500),
        sort_by: Some("price".into()),
        order: Some("asc".into()),
        ..in_shelf()
    })
    .await?;
    assert_eq!(capped, vec![budget.id, runner.id]);

    let mut searched = listed_ids(&state, ProductQuery {
        search: Some(token.to_uppercase()),
        ..Default::default()
    })
    .await?;
    searched.sort();
    let mut everything = vec![budget.id, runner.id, boot.id];
    everything.sort();
    assert_eq!(searched, everything);

    let searched_in_range = listed_ids(&state, ProductQuery {
        search: Some(token.to_uppercase()),
        min_price: Some(500),
        max_price: Some(2000),
        ..in_shelf()
    })
    .await?;
    assert_eq!(searched_in_range, vec![runner.id]);

    let searched_deals = listed_ids(&state, ProductQuery {
        search: Some(token.clone()),
        deals: Some(true),
        ..in_shelf()
    })
    .await?;
    assert_eq!(searched_deals, vec![runner.id]);

    let featured = listed_ids(&state, ProductQuery { featured: Some(true), ..in_shelf() }).await?;
    assert_eq!(featured, vec![runner.id]);
    let fresh = listed_ids(&state, ProductQuery { new_arrival: Some(true), ..in_shelf() }).await?;
    assert_eq!(fresh, vec![boot.id]);
    let black_friday = listed_ids(&state, ProductQuery { black_friday: Some(true), ..in_shelf() }).await?;
    assert_eq!(black_friday, vec![budget.id]);

    let unknown_sort = listed_ids(&state, ProductQuery {
        sort_by: Some("unknown_field".into()),
        ..in_shelf()
    })
    .await?;
    assert_eq!(unknown_sort.len(), 3);
    Ok(())
}

#[tokio::test]
async fn category_hierarchy_rejects_cycles() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let root = category(&state, &admin, None).await?;
    let child = category(&state, &admin, Some(root.id)).await?;
    let grandchild = category(&state, &admin, Some(child.id)).await?;
    assert_eq!(child.parent_name.as_deref(), Some(root.name.as_str()));

    let err = category_service::update(
        &state,
        &admin,
        root.id,
        UpdateCategoryRequest {
            parent_id: Some(Some(grandchild.id)),
            ..Default::default()
        },
    )
    .await
    .expect_err("root under its own grandchild");
    assert!(matches!(err, AppError::Validation(_)));

    let children = category_service::children(&state, root.id).await?.data.expect("children");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child.id);

    let tree = category_service::tree(&state).await?.data.expect("tree");
    let node = tree.iter().find(|n| n.category.id == root.id).expect("root in tree");
    assert_eq!(node.children[0].children[0].category.id, grandchild.id);

    let err = category_service::create(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Duplicate".into(),
            slug: Some(root.slug.clone()),
            description: None,
            image: None,
            parent_id: None,
        },
    )
    .await
    .expect_err("slug taken");
    assert!(matches!(err, AppError::Conflict(_)));

    let detached = category_service::update(
        &state,
        &admin,
        child.id,
        UpdateCategoryRequest {
            parent_id: Some(None),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("category");
    assert_eq!(detached.parent_id, None);
    Ok(())
}
