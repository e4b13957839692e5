// ==========================================
// 手术室排班核心 - 模板展开引擎
// ==========================================
// 输入: TrameModele + 站点 + [from, to]
// 输出: 按 ISO 周切片提交的日排班 + 展开报告
// 幂等键: (trameModeleId, date, roomId, period)
// ==========================================

mod calendar;
mod core;

pub use calendar::{iso_week_chunks, iso_week_number, WeekChunk};
pub use core::{
    ChunkCounts, ChunkOutcome, ChunkReport, ExpansionEngine, ExpansionOptions, ExpansionReport,
    PlanningStore, SkippedDate,
};
