//! 分桶哈希
//!
//! MurmurHash3 x86 32 位。分桶结果必须跨进程、跨版本稳定，
//! 因此固定算法与种子，不依赖标准库的随机化哈希。

use crate::error::{Result, RuleError};
use std::io::Cursor;

/// 计算 MurmurHash3 (x86, 32 位)
pub fn murmur3_x86_32(data: &[u8], seed: u32) -> Result<u32> {
    murmur3::murmur3_32(&mut Cursor::new(data), seed)
        .map_err(|e| RuleError::MatchError(format!("分桶哈希计算失败: {}", e)))
}
