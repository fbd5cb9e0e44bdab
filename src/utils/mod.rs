//! 通用工具：原子文件写入与内容哈希

mod file;
mod hash;

pub use file::*;
pub use hash::*;
