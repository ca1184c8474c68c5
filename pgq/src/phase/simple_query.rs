use crate::{
    Result,
    common::{ByteStr, verbose},
    postgres::{BackendMessage, PgError, ProtocolError, TransactionStatus, frontend},
    row::{Row, Schema, schema},
    transport::{PgTransport, PgTransportExt},
};

#[derive(Debug)]
enum State {
    /// Waiting for the next statement result.
    Idle,
    /// `RowDescription` received, `DataRow` may follow.
    Rows(Schema),
    /// `ErrorResponse` received, ignore everything until `ReadyForQuery`.
    Errored(PgError),
    Ready,
}

/// Turns backend messages of a simple query cycle into rows.
///
/// The decoder does no io, every received message is given to [`feed`][ResultDecoder::feed]
/// until it returns `true`.
#[derive(Debug)]
pub struct ResultDecoder {
    state: State,
    rows: Vec<Row>,
    tag: Option<ByteStr>,
    error: Option<PgError>,
    status: TransactionStatus,
}

/// Decoded simple query cycle.
#[derive(Debug)]
pub struct QueryResult {
    /// Rows of every statement in order.
    pub rows: Vec<Row>,
    /// Command tag of the last completed statement.
    pub tag: Option<ByteStr>,
    /// Transaction status reported by `ReadyForQuery`.
    pub status: TransactionStatus,
    /// The `ErrorResponse` that ended the cycle, if any.
    pub error: Option<PgError>,
}

impl QueryResult {
    /// Returns the rows, or the backend error.
    pub fn into_rows(self) -> Result<Vec<Row>> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(self.rows),
        }
    }
}

impl Default for ResultDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            rows: vec![],
            tag: None,
            error: None,
            status: TransactionStatus::Idle,
        }
    }

    /// Returns `true` when `ReadyForQuery` is received.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready)
    }

    /// Feed a backend message, returns `true` when `ReadyForQuery` is received.
    pub fn feed(&mut self, message: BackendMessage) -> Result<bool, ProtocolError> {
        use BackendMessage::*;

        let state = std::mem::replace(&mut self.state, State::Idle);

        self.state = match (state, message) {
            (State::Ready, f) => {
                self.state = State::Ready;
                return Err(f.unexpected("simple query after ReadyForQuery"));
            },

            // The backend terminates the session after FATAL or PANIC, no ReadyForQuery follows.
            (_, ErrorResponse(err)) if err.0.is_fatal() => {
                self.error = Some(err.0);
                State::Ready
            },

            // Drain until the backend is in sync again.
            (State::Errored(err), ReadyForQuery(ready)) => {
                self.error = Some(err);
                self.status = ready.status;
                State::Ready
            },
            (State::Errored(err), _) => State::Errored(err),

            // Indicates that rows are about to be returned in response to a SELECT, FETCH, etc. query.
            // The contents of this message describe the column layout of the rows.
            (_, RowDescription(desc)) => State::Rows(schema(desc)),
            // One of the set of rows returned by a SELECT, FETCH, etc. query.
            (State::Rows(columns), DataRow(datarow)) => {
                self.rows.push(Row::new(columns.clone(), datarow)?);
                State::Rows(columns)
            },
            (State::Idle, DataRow(_)) => return Err(ProtocolError::MissingRowDescription),
            // An SQL command completed normally
            (_, CommandComplete(cmd)) => {
                self.tag = Some(cmd.tag);
                State::Idle
            },
            // An empty query string was recognized.
            (_, EmptyQueryResponse(_)) => State::Idle,
            (_, ErrorResponse(err)) => State::Errored(err.0),
            // Run-time parameter changed by e.g. `SET`, the startup values are kept.
            (state, ParameterStatus(_param)) => {
                verbose!("{} = {}", _param.name, _param.value);
                state
            },
            (state, NoticeResponse(_)) => state,
            (_, ReadyForQuery(ready)) => {
                self.status = ready.status;
                State::Ready
            },
            (_, f) => return Err(f.unexpected("simple query")),
        };

        Ok(self.is_ready())
    }

    /// Finish the query cycle.
    pub fn finish(self) -> Result<QueryResult, ProtocolError> {
        if !self.is_ready() {
            return Err(ProtocolError::malformed("simple query finished before ReadyForQuery"));
        }
        Ok(QueryResult {
            rows: self.rows,
            tag: self.tag,
            status: self.status,
            error: self.error,
        })
    }
}

/// Perform a simple query.
///
/// The backend error is returned inside [`QueryResult`], after the backend is ready for the next query.
/// A `FATAL` or `PANIC` error ends the cycle immediately.
///
/// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SIMPLE-QUERY>
pub async fn simple_query<IO: PgTransport>(sql: &str, mut io: IO) -> Result<QueryResult> {
    frontend::check_nul_string("sql", sql)?;

    io.send(frontend::Query { sql });
    io.flush().await?;

    let mut decoder = ResultDecoder::new();

    while !decoder.feed(io.recv().await?)? { }

    Ok(decoder.finish()?)
}
