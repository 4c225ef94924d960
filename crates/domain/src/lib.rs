//! 聊天子系统核心领域模型
//!
//! 包含连接、会话、消息等实体，实时事件，以及存储与身份查询的抽象接口。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
pub use value_objects::*;
