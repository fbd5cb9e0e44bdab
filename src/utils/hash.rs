//! 哈希工具

use sha2::{Digest, Sha256};

/// 计算 SHA-256，返回 64 位小写十六进制字符串
///
/// 用于条目 id 的回退后缀和 manifest 缓存键，取前缀即可作为短摘要。
pub fn compute_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}
