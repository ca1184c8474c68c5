use std::env::var;
use pgq::{Config, Connection, Result};

/// Server configured with roles `pgq_none` (trust), `pgq_pw` (password) and `pgq_md5` (md5),
/// both password roles use `PGQ_PASSWORD`, default to `secret`.
pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;
    assert!(conn.parameter("server_version").is_some());
    assert_ne!(conn.process_id(), 0);
    assert_ne!(conn.secret_key(), 0);
    conn.close().await?;

    if let Ok(url) = var("DATABASE_URL") {
        let mut conn = Connection::connect(&url).await?;
        conn.query("SELECT 1").await?;
        conn.close().await?;
    }

    let base = Config::from_env()?.set_database("pgq_test");
    let password = var("PGQ_PASSWORD").unwrap_or_else(|_| "secret".into());

    let mut conn = Connection::connect_with(base.clone().set_user("pgq_none")).await?;
    conn.close().await?;

    for user in ["pgq_pw", "pgq_md5"] {
        let config = base.clone().set_user(user);

        let mut conn = Connection::connect_with(config.clone().set_password(&password)).await?;
        conn.close().await?;

        let err = Connection::connect_with(config.set_password("wrong")).await.unwrap_err();
        assert_eq!(err.code(), Some("28P01"));
    }

    let err = Connection::connect_with(base.set_user("pgq_nobody")).await.unwrap_err();
    assert_eq!(err.code(), Some("28000"));

    Ok(())
}
