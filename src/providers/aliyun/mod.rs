//! Alibaba Cloud RPC-style APIs.

pub mod docmind;
pub mod rpc;
pub mod sts;

pub use docmind::DocMindClient;
pub use rpc::{RpcClient, RpcRequest, sign_rpc};
pub use sts::{AssumeRoleRequest, AssumedCredential, StsClient};
