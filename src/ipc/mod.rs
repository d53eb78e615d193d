//! IPC: s-expression protocol over a Unix domain socket.
//!
//! Wire format: 4-byte big-endian length prefix + UTF-8 s-expression payload.

pub mod codec;
pub mod dispatch;
pub mod server;

pub use server::IpcServer;
