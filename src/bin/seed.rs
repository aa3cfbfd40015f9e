use serde_json::json;
use storefront_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    dto::slugify,
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, 2).await?;
    run_migrations(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin12345", "Store", "Admin", "admin").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user12345", "Jane", "Shopper", "user").await?;

    let men = ensure_category(&pool, "Men", None).await?;
    let women = ensure_category(&pool, "Women", None).await?;
    let shoes = ensure_category(&pool, "Shoes", Some(men)).await?;
    seed_products(&pool, men, women, shoes).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_category(pool: &sqlx::PgPool, name: &str, parent_id: Option<Uuid>) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, slug, parent_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slugify(name))
    .bind(parent_id)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn seed_products(pool: &sqlx::PgPool, men: Uuid, women: Uuid, shoes: Uuid) -> anyhow::Result<()> {
    // (name, category, price, sale price, stock, featured, new arrival, black friday discount)
    let products = [
        ("Classic Crew Tee", men, 2500, None, 120, true, false, 0),
        ("Slim Fit Chinos", men, 5900, Some(4900), 60, false, true, 0),
        ("Trail Runner", shoes, 11900, Some(8900), 25, true, false, 25),
        ("Wrap Midi Dress", women, 7900, None, 40, true, true, 0),
        ("Cashmere Scarf", women, 8900, Some(6200), 3, false, false, 30),
    ];

    for (index, (name, category_id, price, sale_price, stock, featured, new_arrival, discount)) in
        products.into_iter().enumerate()
    {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, slug, sku, price, sale_price, category_id, stock_quantity,
                images, sizes, colors, is_featured, is_new_arrival,
                black_friday_deal, black_friday_discount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slugify(name))
        .bind(format!("SEED-{:03}", index + 1))
        .bind(price as i64)
        .bind(sale_price.map(|p: i32| p as i64))
        .bind(category_id)
        .bind(stock)
        .bind(json!([format!("/images/{}.jpg", slugify(name))]))
        .bind(json!(["S", "M", "L"]))
        .bind(json!(["Black", "White"]))
        .bind(featured)
        .bind(new_arrival)
        .bind(discount > 0)
        .bind(discount)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
