pub mod api;
pub mod limit;
pub mod retry;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerState};
