//! Chain account queries.
//!
//! The workflows only ever read three things from the network: an account's
//! balance, a program account's state and the current slot. `ChainClient`
//! is the seam; `RpcChainClient` speaks JSON-RPC 2.0 over HTTP.

pub mod rpc;

pub use rpc::RpcChainClient;

use crate::error::RpcError;
use crate::models::OnChainProgramState;
use futures::future::BoxFuture;

/// Read-only view of the target network.
pub trait ChainClient: Send + Sync {
    /// Balance of `address` in base units.
    fn get_balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<u64, RpcError>>;

    /// Account state of `address`; a missing account is `exists = false`, not an error.
    fn get_account<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, Result<OnChainProgramState, RpcError>>;

    fn get_slot(&self) -> BoxFuture<'_, Result<u64, RpcError>>;
}
