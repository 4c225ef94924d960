//! 领域实体定义

pub mod connection;
pub mod conversation;
pub mod message;

pub use connection::*;
pub use conversation::*;
pub use message::*;
