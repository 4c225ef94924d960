//! 实时通道上的事件定义
//!
//! 服务端下发事件是封闭的标签枚举，客户端只需穷举匹配。

pub mod chat_event;

// 重新导出事件类型
pub use chat_event::*;
