use std::collections::HashMap;

use super::AuthNegotiator;
use crate::{
    Result,
    common::{ByteStr, report, verbose},
    connection::Config,
    postgres::{
        BackendMessage, ProtocolError, TransactionStatus,
        backend, frontend,
    },
    transport::{PgTransport, PgTransportExt},
};

/// Run-time parameters sent with the startup message.
const STARTUP_PARAMS: &[(&str, &str)] = &[("client_encoding", "UTF8")];

/// Startup phase successful response.
#[derive(Debug)]
pub struct StartupResponse {
    pub backend_key_data: backend::BackendKeyData,
    pub params: HashMap<ByteStr, ByteStr>,
    pub status: TransactionStatus,
}

/// Perform a startup message.
///
/// <https://www.postgresql.org/docs/17/protocol-flow.html#PROTOCOL-FLOW-START-UP>
pub async fn startup<IO: PgTransport>(config: &Config, mut io: IO) -> Result<StartupResponse> {
    // To begin a session, a frontend opens a connection to the server and sends a startup message.

    io.send_startup(frontend::Startup {
        user: config.user(),
        database: Some(config.database()),
        params: STARTUP_PARAMS,
    });
    io.flush().await?;

    // The server then sends an appropriate authentication request message,
    // to which the frontend must reply with an appropriate authentication response message (such as a password).

    let mut auth = AuthNegotiator::new(config.user(), config.password());

    while !auth.is_done() {
        let message = match io.recv().await? {
            BackendMessage::NegotiateProtocolVersion(v) => {
                report!(warn, "server only support protocol 3.{}, unrecognized options: {:?}", v.minor, v.options);
                continue;
            },
            message => message,
        };
        if let Some(password) = auth.step(message)? {
            io.send(frontend::PasswordMessage { password: &password });
            io.flush().await?;
        }
    }

    // After having received AuthenticationOk, the frontend must wait for further messages from the server.
    // In this phase a backend process is being started, and the frontend is just an interested bystander.
    // It is still possible for the startup attempt to fail (ErrorResponse), but in the normal case the backend
    // will send some ParameterStatus messages, BackendKeyData, and finally ReadyForQuery.

    let mut params = HashMap::new();
    let mut key_data = None;

    let status = loop {
        use BackendMessage::*;
        match io.recv().await? {
            ReadyForQuery(ready) => break ready.status,
            BackendKeyData(new_key_data) => key_data = Some(new_key_data),
            ParameterStatus(param) => {
                verbose!("{} = {}", param.name, param.value);
                params.insert(param.name, param.value);
            },
            ErrorResponse(err) => return Err(err.0.into()),
            f => return Err(f.unexpected("startup").into()),
        }
    };

    let Some(backend_key_data) = key_data else {
        return Err(ProtocolError::malformed("backend key data missing in startup").into());
    };

    Ok(StartupResponse {
        backend_key_data,
        params,
        status,
    })
}
