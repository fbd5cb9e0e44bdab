//! 文件工具函数
//!
//! 目录、缓存条目和嵌入向量都经由这里落盘。

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// 原子写入：先写同目录下的临时文件并 fsync，再 rename 覆盖目标
///
/// 读者只会看到旧内容或完整的新内容，不会读到写了一半的文件。
/// 父目录不存在时会自动创建。
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // 临时文件必须和目标在同一目录，rename 才是原子的
    let tmp_path = temp_sibling(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    // rename 失败时清理临时文件，错误原样返回
    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })
}

/// `out.json` -> `out.json.tmp`
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 确保目录存在（含父目录），返回该目录路径
pub fn ensure_dir(dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}
