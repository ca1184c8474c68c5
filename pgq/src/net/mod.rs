//! Network transport.
mod socket;

pub use socket::Socket;
