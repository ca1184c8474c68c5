//! Postgres connection.
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    Result,
    coerce::FromText,
    common::{ByteStr, report, span, unit_error},
    net::Socket,
    phase::{self, StartupResponse},
    postgres::{TransactionStatus, frontend},
    row::{Row, RowNotFound, ShapeError},
    stream::PgStream,
    transport::{PgTransport, PgTransportExt},
};

mod config;

pub use config::{Config, ConfigError, DEFAULT_PORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// A fatal error occured, the stream is out of sync.
    Broken,
    Closed,
}

/// A single connection to postgres.
///
/// Only one query can be in flight at a time, every operation takes `&mut self`.
#[derive(Debug)]
pub struct Connection<IO = Socket> {
    stream: PgStream<IO>,
    params: HashMap<ByteStr, ByteStr>,
    process_id: u32,
    secret_key: u32,
    status: TransactionStatus,
    last_tag: Option<ByteStr>,
    state: State,
}

impl Connection<Socket> {
    /// Connect using url, see [`Config::parse`].
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect using config from environment variable, see [`Config::from_env`].
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()?).await
    }

    /// Connect using given config.
    pub async fn connect_with(config: Config) -> Result<Self> {
        config.validate()?;
        let stream = PgStream::connect(&config).await?;
        Self::handshake(stream, &config).await
    }
}

impl<IO> Connection<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform startup and authentication over an already established stream.
    pub async fn handshake(mut stream: PgStream<IO>, config: &Config) -> Result<Self> {
        span!("connect", user = config.user(), database = config.database());

        let StartupResponse { backend_key_data, params, status } = phase::startup(config, &mut stream).await?;

        Ok(Self {
            stream,
            params,
            process_id: backend_key_data.process_id,
            secret_key: backend_key_data.secret_key,
            status,
            last_tag: None,
            state: State::Open,
        })
    }

    /// Run-time parameters reported by the backend at startup, e.g. `server_version`.
    pub fn runtime_params(&self) -> &HashMap<ByteStr, ByteStr> {
        &self.params
    }

    /// Get a run-time parameter reported at startup.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(ByteStr::as_str)
    }

    /// The process ID of the backend.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// The secret key of the backend, used for cancel request.
    pub fn secret_key(&self) -> u32 {
        self.secret_key
    }

    /// Transaction status reported by the last `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    /// Command tag of the last completed statement, e.g. `SELECT 1`.
    pub fn last_command_tag(&self) -> Option<&str> {
        self.last_tag.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Returns `true` if a previous fatal error leave the connection unusable.
    pub fn is_broken(&self) -> bool {
        self.state == State::Broken
    }

    fn check(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Broken => Err(Broken.into()),
            State::Closed => Err(Closed.into()),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Err(err) if err.is_fatal() => {
                report!(error, "connection broken: {err}");
                self.state = State::Broken;
            },
            _ => { },
        }
        result
    }

    /// Execute a simple query.
    ///
    /// The query string may contain multiple statements, rows of every statement are returned in order.
    ///
    /// A backend error is returned after the connection is ready for the next query,
    /// the connection can still be used afterwards.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.check()?;
        span!("query", sql);

        let result = phase::simple_query(sql, &mut self.stream).await;
        let mut result = self.track(result)?;

        self.status = result.status;
        if let Some(tag) = result.tag.take() {
            self.last_tag = Some(tag);
        }

        self.track(result.into_rows())
    }

    /// Select a single value.
    ///
    /// The query must return exactly one row with one column, `NULL` is coerced from empty string.
    pub async fn select<T: FromText>(&mut self, sql: &str) -> Result<T> {
        let mut rows = self.query(sql).await?;

        let row = match (rows.pop(), rows.len()) {
            (None, _) => return Err(RowNotFound.into()),
            (Some(row), 0) if row.len() == 1 => row,
            (Some(row), rest) => return Err(ShapeError { rows: rest + 1, columns: row.len() }.into()),
        };

        let text = row.into_values().pop().flatten().unwrap_or_default();
        Ok(T::from_text(text.as_str())?)
    }

    pub async fn select_string(&mut self, sql: &str) -> Result<String> {
        self.select(sql).await
    }

    pub async fn select_i16(&mut self, sql: &str) -> Result<i16> {
        self.select(sql).await
    }

    pub async fn select_i32(&mut self, sql: &str) -> Result<i32> {
        self.select(sql).await
    }

    pub async fn select_i64(&mut self, sql: &str) -> Result<i64> {
        self.select(sql).await
    }

    pub async fn select_f32(&mut self, sql: &str) -> Result<f32> {
        self.select(sql).await
    }

    pub async fn select_f64(&mut self, sql: &str) -> Result<f64> {
        self.select(sql).await
    }

    /// Send `Terminate` and close the underlying stream.
    ///
    /// Any further operation returns [`Closed`] error.
    pub async fn close(&mut self) -> Result<()> {
        span!("close");

        match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => Err(Closed.into()),
            // the backend may already be gone
            State::Broken => {
                let _ = self.stream.shutdown().await;
                Ok(())
            },
            State::Open => {
                self.stream.send(frontend::Terminate);
                self.stream.flush().await?;
                self.stream.shutdown().await?;
                Ok(())
            },
        }
    }
}

unit_error! {
    /// An error when using a closed connection.
    pub struct Closed("connection closed");
}

unit_error! {
    /// An error when using a connection after a fatal error.
    pub struct Broken("connection is broken by a previous fatal error");
}
