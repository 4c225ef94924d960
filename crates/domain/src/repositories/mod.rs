//! Repository接口定义
//!
//! 定义数据访问层的抽象接口，内层定义接口，外层实现接口。

pub mod conversation_repository;
pub mod user_directory;

pub use conversation_repository::ConversationStore;
pub use user_directory::UserDirectory;

#[cfg(feature = "testing")]
pub use conversation_repository::MockConversationStore;
#[cfg(feature = "testing")]
pub use user_directory::MockUserDirectory;
