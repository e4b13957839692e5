// ==========================================
// 手术室排班核心 - 冲突检测引擎
// ==========================================
// 输入: 日排班 + 区域规则目录
// 输出: 完整、确定的冲突列表 (整体替换，保留 is_resolved)
// 规则: 相邻性 / 最低配员 / 监管上限 / 重复排班
// 红线: 规则违反不是异常，只产出 Conflict 记录
// ==========================================

mod core;
mod rules;

#[cfg(test)]
mod tests;

pub use core::{reconcile, ConflictDetector, ConflictRefresh};
pub use rules::ConflictFinding;
