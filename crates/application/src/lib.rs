//! 应用层实现。
//!
//! 聊天中枢（连接注册、在线广播、消息路由）以及历史查询服务，
//! 通过领域层定义的存储与用户目录接口访问外部适配器。

pub mod clock;
pub mod directory;
pub mod error;
pub mod history;
pub mod hub;
pub mod memory_store;
pub mod outbound;
pub mod presence;
pub mod profile_cache;
pub mod registry;
pub mod router;

pub use clock::{Clock, SystemClock};
pub use config::OverflowPolicy;
pub use directory::StaticUserDirectory;
pub use error::ApplicationError;
pub use history::{ConversationOverview, HistoryMessage, HistoryService, PeerSummary};
pub use hub::{Hub, HubDependencies, HubHandle, Registration};
pub use memory_store::InMemoryConversationStore;
pub use outbound::{outbound_queue, OutboundReceiver, OutboundSender, PushOutcome};
pub use presence::{FanoutReport, PresenceBroadcaster};
pub use profile_cache::ProfileCache;
pub use registry::{ColorPalette, ConnectionRegistry, RegisteredConnection};
pub use router::{MessageRouter, RouteOutcome};
