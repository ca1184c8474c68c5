//! Authentication sub-protocol.
//!
//! <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-START-UP>
use md5::{Digest, Md5};
use std::fmt;

use crate::{
    Result,
    postgres::{BackendMessage, ProtocolError, backend::Authentication, frontend},
};

/// State of [`AuthNegotiator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Waiting for the first authentication request.
    AwaitingRequest,
    /// A password response was sent, waiting for `AuthenticationOk`.
    AwaitingResult,
    Authenticated,
    Failed,
}

/// Drive the authentication exchange between startup message and `AuthenticationOk`.
///
/// The negotiator does no io, every received message is given to [`step`][AuthNegotiator::step]
/// which returns the password payload to send back, if any.
#[derive(Debug)]
pub struct AuthNegotiator<'a> {
    user: &'a str,
    password: Option<&'a str>,
    state: AuthState,
}

impl<'a> AuthNegotiator<'a> {
    pub fn new(user: &'a str, password: Option<&'a str>) -> Self {
        Self { user, password, state: AuthState::AwaitingRequest }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, AuthState::Authenticated | AuthState::Failed)
    }

    /// Feed a backend message.
    ///
    /// Returns `Some(password)` that must be sent as `PasswordMessage`.
    ///
    /// Any error moves the negotiator to [`AuthState::Failed`].
    pub fn step(&mut self, message: BackendMessage) -> Result<Option<String>> {
        let result = self.transition(message);
        if result.is_err() {
            self.state = AuthState::Failed;
        }
        result
    }

    fn transition(&mut self, message: BackendMessage) -> Result<Option<String>> {
        use AuthState::*;

        let auth = match message {
            BackendMessage::Authentication(auth) => auth,
            // backend rejecting the user or password
            BackendMessage::ErrorResponse(err) => return Err(err.0.into()),
            f => return Err(f.unexpected("authentication").into()),
        };

        match (self.state, auth) {
            (AwaitingRequest | AwaitingResult, Authentication::Ok) => {
                self.state = Authenticated;
                Ok(None)
            },
            // The frontend must now send a PasswordMessage containing the password in clear-text form.
            (AwaitingRequest, Authentication::CleartextPassword) => {
                let password = self.require_password("CleartextPassword")?;
                frontend::check_nul_string("password", password)?;
                self.state = AwaitingResult;
                Ok(Some(password.to_owned()))
            },
            // The frontend must now send a PasswordMessage containing the password (with user name)
            // encrypted via MD5, then encrypted again using the 4-byte random salt.
            (AwaitingRequest, Authentication::MD5Password { salt }) => {
                let password = self.require_password("MD5Password")?;
                self.state = AwaitingResult;
                Ok(Some(md5_password(self.user, password, salt)))
            },
            (AwaitingRequest, auth @ Authentication::Unsupported { code, .. }) => {
                Err(AuthError::Unsupported { method: auth.method_name(), code }.into())
            },
            (AwaitingResult, _) => {
                Err(ProtocolError::malformed("authentication request after password response").into())
            },
            (Authenticated | Failed, _) => {
                Err(ProtocolError::malformed("authentication request after authentication is finished").into())
            },
        }
    }

    fn require_password(&self, method: &'static str) -> Result<&'a str, AuthError> {
        self.password.ok_or(AuthError::PasswordRequired { method })
    }
}

/// Compute MD5 password response.
///
/// `"md5" + md5hex(md5hex(password + user) + salt)`
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let mut md5 = Md5::new();
    md5.update(password.as_bytes());
    md5.update(user.as_bytes());
    let inner = hex(&md5.finalize());

    let mut md5 = Md5::new();
    md5.update(inner.as_bytes());
    md5.update(salt);

    let mut output = String::with_capacity(3 + 32);
    output.push_str("md5");
    output.push_str(&hex(&md5.finalize()));
    output
}

fn hex(bytes: &[u8]) -> String {
    const TABLE: &[u8; 16] = b"0123456789abcdef";
    let mut output = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        output.push(TABLE[(b >> 4) as usize] as char);
        output.push(TABLE[(b & 0xf) as usize] as char);
    }
    output
}

/// Authentication cannot proceed on the client side.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Backend requested authentication method other than trust, cleartext or md5.
    Unsupported {
        method: &'static str,
        code: u32,
    },
    /// Backend requested password while none is configured.
    PasswordRequired {
        method: &'static str,
    },
}

impl std::error::Error for AuthError { }

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { method, code } => {
                write!(f, "unsupported authentication method: {method} ({code})")
            },
            Self::PasswordRequired { method } => {
                write!(f, "password required for {method} authentication, but none is configured")
            },
        }
    }
}

impl fmt::Debug for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
