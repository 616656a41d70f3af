pub mod client;
pub mod response;

pub use client::{BulkClient, BulkSender, ClientConfig, ClientError};
pub use response::{BulkResponse, InvalidResult, LevelHint, SendResult};
