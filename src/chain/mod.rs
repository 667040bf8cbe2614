//! Chain access: reading state, the pending hash feed, and response submission.

pub mod feed;
pub mod reader;
pub mod submitter;

pub use feed::{FeedStats, PendingHashFeed, ReconnectConfig};
pub use reader::{ChainReader, RpcChainReader};
pub use submitter::{DryRunSubmitter, ResponseSubmitter, RpcSubmitter};
