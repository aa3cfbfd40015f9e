mod common;

use serde_json::json;
use storefront_api::{
    dto::cart::{AddToCartRequest, UpdateCartItemRequest},
    error::AppError,
    models::Role,
    services::cart_service,
};
use uuid::Uuid;

fn add(product_id: Uuid, quantity: i32, color: &str) -> AddToCartRequest {
    serde_json::from_value(json!({
        "productId": product_id,
        "quantity": quantity,
        "size": "M",
        "color": color,
    }))
    .expect("add request")
}

#[tokio::test]
async fn same_variant_merges_and_other_variants_get_their_own_line() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let user = common::create_user(&state, Role::User).await?;
    let product = common::create_product(&state, &admin, 2000, Some(1500), 10).await?;

    cart_service::add_item(&state, &user, add(product.id, 1, "Black")).await?;
    cart_service::add_item(&state, &user, add(product.id, 2, "Black")).await?;
    let view = cart_service::add_item(&state, &user, add(product.id, 1, "White"))
        .await?
        .data
        .expect("cart");

    assert_eq!(view.items.len(), 2);
    let black = view.items.iter().find(|i| i.color == "Black").expect("black line");
    assert_eq!(black.quantity, 3);
    assert_eq!(black.unit_price, 1500);
    assert_eq!(view.item_count, 4);
    assert_eq!(view.subtotal, 4 * 1500);

    let cleared = cart_service::clear_cart(&state, &user).await?.data.expect("cart");
    assert!(cleared.items.is_empty());
    assert_eq!(cleared.subtotal, 0);
    Ok(())
}

#[tokio::test]
async fn adding_beyond_stock_is_rejected() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let user = common::create_user(&state, Role::User).await?;
    let product = common::create_product(&state, &admin, 1000, None, 2).await?;

    cart_service::add_item(&state, &user, add(product.id, 2, "Black")).await?;
    let err = cart_service::add_item(&state, &user, add(product.id, 1, "Black"))
        .await
        .expect_err("third unit exceeds stock");
    assert!(matches!(err, AppError::Validation(_)));

    let view = cart_service::get_cart(&state, &user).await?.data.expect("cart");
    assert_eq!(view.items[0].quantity, 2);
    Ok(())
}

#[tokio::test]
async fn missing_or_inactive_products_cannot_be_added() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let user = common::create_user(&state, Role::User).await?;

    let err = cart_service::add_item(&state, &user, add(Uuid::new_v4(), 1, "Black"))
        .await
        .expect_err("unknown product");
    assert!(matches!(err, AppError::NotFound(_)));

    let product = common::create_product(&state, &admin, 1000, None, 5).await?;
    storefront_api::services::product_service::delete_product(&state, &admin, product.id).await?;
    let err = cart_service::add_item(&state, &user, add(product.id, 1, "Black"))
        .await
        .expect_err("soft-deleted product");
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn lines_belong_to_their_owner() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let admin = common::create_user(&state, Role::Admin).await?;
    let owner = common::create_user(&state, Role::User).await?;
    let intruder = common::create_user(&state, Role::User).await?;
    let product = common::create_product(&state, &admin, 1000, None, 5).await?;

    let view = cart_service::add_item(&state, &owner, add(product.id, 1, "Black"))
        .await?
        .data
        .expect("cart");
    let item_id = view.items[0].id;

    let err = cart_service::update_item(
        &state,
        &intruder,
        item_id,
        UpdateCartItemRequest { quantity: 3 },
    )
    .await
    .expect_err("foreign line");
    assert!(matches!(err, AppError::NotFound(_)));

    for quantity in [0, -1] {
        let err = cart_service::update_item(&state, &owner, item_id, UpdateCartItemRequest { quantity })
            .await
            .expect_err("non-positive quantity");
        assert!(matches!(err, AppError::Validation(_)));
    }
    let view = cart_service::get_cart(&state, &owner).await?.data.expect("cart");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 1);

    // Removing someone else's line is a silent no-op.
    cart_service::remove_item(&state, &intruder, item_id).await?;
    let view = cart_service::get_cart(&state, &owner).await?.data.expect("cart");
    assert_eq!(view.items.len(), 1);

    let view = cart_service::update_item(&state, &owner, item_id, UpdateCartItemRequest { quantity: 4 })
        .await?
        .data
        .expect("cart");
    assert_eq!(view.items[0].quantity, 4);

    let view = cart_service::remove_item(&state, &owner, item_id).await?.data.expect("cart");
    assert!(view.items.is_empty());
    cart_service::remove_item(&state, &owner, item_id).await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_first_access_yields_one_cart() -> anyhow::Result<()> {
    let Some(state) = common::db_state().await? else {
        return Ok(());
    };
    let user = common::create_user(&state, Role::User).await?;

    let (a, b, c) = tokio::join!(
        cart_service::get_or_create_cart(&state, user.user_id),
        cart_service::get_or_create_cart(&state, user.user_id),
        cart_service::get_or_create_cart(&state, user.user_id),
    );
    let (a, b, c) = (a?, b?, c?);
    assert_eq!(a.id, b.id);
    assert_eq!(b.id, c.id);
    Ok(())
}
