//! Repository接口定义
//!
//! 定义连接中心读取的数据访问抽象，内层定义接口，外层实现接口。

pub mod chat_directory;

pub use chat_directory::*;
