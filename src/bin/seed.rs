use fitness_platform_api::{
    config::AppConfig,
    db::{DbPool, create_orm_conn, create_pool, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&create_orm_conn(&pool)).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin12345", "Gym Admin", "admin").await?;
    let user_id = ensure_user(&pool, "member@example.com", "member12345", "Demo Member", "user").await?;
    seed_products(&pool).await?;
    seed_plans(&pool).await?;
    seed_programmes(&pool).await?;
    seed_coupon(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &DbPool,
    email: &str,
    password: &str,
    full_name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn seed_products(pool: &DbPool) -> anyhow::Result<()> {
    // Prices are minor units of the base currency.
    let products = [
        ("Whey Protein 2kg", "Chocolate flavour, 66 servings", 250_000_i64, 40),
        ("Resistance Band Set", "Five bands, light to extra heavy", 45_000, 25),
        ("Gym Shaker", "700ml, leak proof", 12_000, 100),
        ("Lifting Belt", "Leather, 10mm", 90_000, 3),
    ];

    for (name, description, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_plans(pool: &DbPool) -> anyhow::Result<()> {
    let plans = [
        ("Monthly", "Full gym access for 30 days", 80_000_i64, 30),
        ("Quarterly", "Full gym access for 90 days", 210_000, 90),
        ("Annual", "Full gym access for a year", 720_000, 365),
    ];

    for (name, description, price, days) in plans {
        sqlx::query(
            r#"
            INSERT INTO subscription_plans (id, name, description, price, duration_days)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(days)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_programmes(pool: &DbPool) -> anyhow::Result<()> {
    let programmes = [
        ("Fat Loss Kickstart", "Conditioning and nutrition plan", 150_000_i64, 6),
        ("Strength Foundations", "Linear progression on the big lifts", 180_000, 8),
    ];

    for (title, description, price, weeks) in programmes {
        sqlx::query(
            r#"
            INSERT INTO programmes (id, title, description, price, duration_weeks)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (title) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(description)
        .bind(price)
        .bind(weeks)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_coupon(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, description, discount_type, discount_value, scope, max_uses, max_uses_per_user)
        VALUES ($1, 'WELCOME10', '10% off any first purchase', 'percentage', 10, 'all', 500, 1)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .execute(pool)
    .await?;

    Ok(())
}
