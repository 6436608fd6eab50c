// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use base64::{Engine as _, engine::general_purpose::STANDARD};
use netwarden::{
    models::profile::NewCredentialProfile,
    secret::SecretBox,
    store::{self, Stores},
};
use once_cell::sync::Lazy;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

pub const ENV_DB: &str = "NETWARDEN_TEST_DATABASE_URL";

static TEST_KEY: Lazy<String> = Lazy::new(|| STANDARD.encode([42u8; 32]));

pub fn secret_box() -> SecretBox {
    SecretBox::from_key_b64(&TEST_KEY).expect("test key must be usable")
}

/// Connects to the scratch database named by `NETWARDEN_TEST_DATABASE_URL`
/// and applies migrations. Returns `None` (test skipped) when the variable
/// is unset.
pub async fn connect() -> Option<PgPool> {
    let url = match std::env::var(ENV_DB) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping: {ENV_DB} is not set");
            return None;
        },
    };

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("failed to connect to the test database");
    store::run_migrations(&pool).await.expect("migrations");
    Some(pool)
}

/// Registers a fresh user row; every test gets its own owner so runs never
/// observe each other's data.
pub async fn new_owner(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("user-{id}"))
        .execute(pool)
        .await
        .expect("insert test user");
    id
}

/// Creates a profile with an encrypted password for `owner`.
pub async fn create_profile(stores: &Stores, owner: Uuid, port: u16) -> Uuid {
    let secrets = secret_box();
    stores
        .profiles
        .create(&NewCredentialProfile {
            name: format!("profile-{}", Uuid::new_v4()),
            username: "u".to_string(),
            secret: secrets.encrypt("p").expect("encrypt"),
            private_key: None,
            port,
            owner_id: owner,
        })
        .await
        .expect("create profile")
}
