//! # Adapters Layer (Hexagonal Architecture)
//!
//! JSON-RPC implementations of the outbound ports: the Index Service and
//! the ledger's account reads.

mod index_rpc;
mod ledger_rpc;
mod transport;
mod tree_account;

pub use index_rpc::RpcIndexService;
pub use ledger_rpc::RpcLedgerClient;
pub use transport::{JsonRpcTransport, REQUEST_ID};
pub use tree_account::{TreeAccount, ACCOUNT_TYPE_CONCURRENT_TREE, HEADER_LEN, HEADER_VERSION_V1};
