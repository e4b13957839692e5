// ==========================================
// 手术室排班核心 - 旧数据迁移错误类型
// ==========================================
// Abort: 前置检查失败，整个迁移不执行
// Record: 单个模板迁移失败，继续处理后续模板
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 迁移模块错误类型
#[derive(Error, Debug)]
pub enum MigrationError {
    // ===== 整体中止 =====
    #[error("迁移前置检查失败: {}", .0.join("; "))]
    Abort(Vec<String>),

    // ===== 单条记录 =====
    #[error("模板 {original_id} 迁移失败: {message}")]
    Record { original_id: String, message: String },

    // ===== 数据源错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .json/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("JSON 解析失败: {0}")]
    JsonParseError(String),

    #[error("字段值错误 (行 {row}, 字段 {field}): {value}")]
    FieldValueError {
        row: usize,
        field: String,
        value: String,
    },

    // ===== 数据库错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for MigrationError {
    fn from(err: csv::Error) -> Self {
        MigrationError::CsvParseError(err.to_string())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::JsonParseError(err.to_string())
    }
}
