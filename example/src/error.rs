use pgq::{Connection, ErrorKind, Result};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    for sql in ["select 36893488147419103232", "select -36893488147419103232"] {
        let err = conn.select_i64(sql).await.unwrap_err();
        assert!(err.to_string().contains("value out of range"), "{sql}: {err}");
    }

    for sql in ["select 8589934592", "select -8589934592"] {
        let err = conn.select_i32(sql).await.unwrap_err();
        assert!(err.to_string().contains("value out of range"));
    }

    for sql in ["select 131072", "select -131072"] {
        let err = conn.select_i16(sql).await.unwrap_err();
        assert!(err.to_string().contains("value out of range"));
    }

    let err = conn.select_i64("select 'foo'").await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Coerce(_)));

    let err = conn.query("SELECT foo").await.unwrap_err();
    assert_eq!(err.code(), Some("42703"));

    let err = conn.select_i64("select 1 where false").await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::RowNotFound(_)));

    assert!(conn.query("").await?.is_empty());

    // still usable after query level errors
    assert_eq!(conn.select_i64("select 1").await?, 1);

    conn.close().await?;
    Ok(())
}
