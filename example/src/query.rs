use pgq::{Connection, Result};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    let rows = conn.query("select 'Jack' as name").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some("Jack"));

    conn.query("CREATE TEMP TABLE pgq(id serial, name text)").await?;
    conn.query("INSERT INTO pgq(name) VALUES('Deez'),('Foo')").await?;
    assert_eq!(conn.last_command_tag(), Some("INSERT 0 2"));

    let rows = conn.query("SELECT * FROM pgq ORDER BY id; SELECT count(*) AS n FROM pgq").await?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].try_get::<_, i32>("id")?, 1);
    assert_eq!(rows[2].try_get::<_, i64>("n")?, 2);

    assert_eq!(conn.select_string("select 'foo'").await?, "foo");
    assert_eq!(conn.select_i64("select 1").await?, 1);
    assert_eq!(conn.select_i32("select 420").await?, 420);
    assert_eq!(conn.select_i16("select -42").await?, -42);
    assert_eq!(conn.select_f64("select 1.23").await?, 1.23);
    assert_eq!(conn.select_f32("select 1.23").await?, 1.23f32);

    conn.query("BEGIN").await?;
    assert_eq!(conn.transaction_status(), pgq::postgres::TransactionStatus::Transaction);
    conn.query("ROLLBACK").await?;

    conn.close().await?;
    assert!(conn.query("select 1").await.is_err());

    Ok(())
}
