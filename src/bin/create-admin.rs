use bcrypt::{hash, DEFAULT_COST};
use std::env;
use std::process::exit;

use sevp_backend::db;

fn usage() -> ! {
    eprintln!("Usage: cargo run --bin create-admin <USERNAME> <EMAIL> <PASSWORD>");
    exit(1);
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let [username, email, password] = args.as_slice() else {
        usage();
    };
    let username = username.trim();
    let email = email.trim().to_lowercase();

    if username.is_empty() || !email.contains('@') {
        usage();
    }
    if password.chars().count() < 8 {
        eprintln!("Password must be at least 8 characters");
        exit(1);
    }

    if env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL must be set");
        exit(1);
    }

    let password_hash = match hash(password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            exit(1);
        }
    };

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Could not connect to the database: {}", e);
            exit(1);
        }
    };
    if let Err(e) = db::run_migrations(&pool).await {
        eprintln!("Migrations failed: {}", e);
        exit(1);
    }

    let result: Result<(i64, bool), sqlx::Error> = sqlx::query_as(
        r#"
        INSERT INTO users (username, email, password_hash, is_active, is_staff, is_superuser)
        VALUES ($1, $2, $3, true, true, true)
        ON CONFLICT (username) DO UPDATE SET
            email = EXCLUDED.email,
            password_hash = EXCLUDED.password_hash,
            is_active = true,
            is_staff = true,
            is_superuser = true,
            login_attempts = 0,
            locked_until = NULL
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(username)
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(pool.as_ref())
    .await;

    match result {
        Ok((id, true)) => println!("Created superuser '{}' (id {})", username, id),
        Ok((id, false)) => println!("Updated superuser '{}' (id {})", username, id),
        Err(e) if db::is_unique_violation(&e) => {
            eprintln!("Email {} already belongs to another user", email);
            exit(1);
        }
        Err(e) => {
            eprintln!("Failed to save user: {}", e);
            exit(1);
        }
    }
}
