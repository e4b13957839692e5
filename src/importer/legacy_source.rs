// ==========================================
// 手术室排班核心 - 旧数据读取
// ==========================================
// 支持: JSON (带 shape 标签的记录数组) / CSV (扁平行，按 FLAT_ASSIGNMENT_V1 解释)
// CSV 每行一个时段 + 至多一个岗位；同一时段的多行合并岗位
// 单条记录无法解析时只拒收该条 (记入 rejected)，其余记录照常返回
// ==========================================

use crate::importer::error::MigrationError;
use crate::importer::legacy_record::{FlatAssignmentV1, LegacyPost, LegacyRecord};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// 输入文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFormat {
    Json,
    Csv,
}

impl LegacyFormat {
    /// 根据扩展名推断
    pub fn from_path(path: &Path) -> Result<Self, MigrationError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        Self::from_str(&ext).ok_or(MigrationError::UnsupportedFormat(ext))
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(LegacyFormat::Json),
            "csv" => Some(LegacyFormat::Csv),
            _ => None,
        }
    }
}

/// 读取结果: 可用记录 + 被拒收的记录 + 读取阶段的警告
#[derive(Debug, Default)]
pub struct LegacyInput {
    pub records: Vec<LegacyRecord>,
    /// 每条均为 MigrationError::Record，original_id 为模板 ID (取不到时为位置标签)
    pub rejected: Vec<MigrationError>,
    pub warnings: Vec<String>,
}

impl LegacyInput {
    /// 是否有以该 ID 标记的拒收记录
    pub fn has_rejected(&self, original_id: &str) -> bool {
        self.rejected.iter().any(|e| {
            matches!(e, MigrationError::Record { original_id: id, .. } if id == original_id)
        })
    }

    fn reject(&mut self, original_id: String, message: String) {
        warn!(original_id = %original_id, message = %message, "旧记录无法解析，已拒收");
        self.rejected.push(MigrationError::Record {
            original_id,
            message,
        });
    }
}

impl From<Vec<LegacyRecord>> for LegacyInput {
    fn from(records: Vec<LegacyRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }
}

/// 读取旧数据文件
///
/// 文件级问题 (不存在、格式不支持、不是记录数组、CSV 表头) 直接返回错误
pub fn load_legacy_records(
    path: &Path,
    format: Option<LegacyFormat>,
) -> Result<LegacyInput, MigrationError> {
    if !path.exists() {
        return Err(MigrationError::FileNotFound(path.display().to_string()));
    }
    let format = match format {
        Some(f) => f,
        None => LegacyFormat::from_path(path)?,
    };

    let file = File::open(path)?;
    let input = match format {
        LegacyFormat::Json => parse_json_records(file)?,
        LegacyFormat::Csv => parse_csv_records(file)?,
    };
    debug!(
        path = %path.display(),
        count = input.records.len(),
        rejected = input.rejected.len(),
        "旧数据读取完成"
    );
    Ok(input)
}

/// JSON: 记录数组，逐条反序列化
pub fn parse_json_records<R: Read>(reader: R) -> Result<LegacyInput, MigrationError> {
    let values: Vec<Value> = serde_json::from_reader(reader)?;
    let mut input = LegacyInput::default();
    for (idx, value) in values.into_iter().enumerate() {
        let label = json_record_label(&value, idx + 1);
        match serde_json::from_value::<LegacyRecord>(value) {
            Ok(record) => input.records.push(record),
            Err(e) => input.reject(label, format!("第 {} 条记录无法解析: {}", idx + 1, e)),
        }
    }
    Ok(input)
}

/// 拒收记录的标识: 模板 ID，取不到时用位置
fn json_record_label(value: &Value, position: usize) -> String {
    ["trameId", "id"]
        .iter()
        .find_map(|key| value.get(*key))
        .and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("#{}", position))
}

/// CSV: 表头即 FLAT_ASSIGNMENT_V1 字段名，岗位列为 postName / postType / postMaxCount
pub fn parse_csv_records<R: Read>(reader: R) -> Result<LegacyInput, MigrationError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut input = LegacyInput::default();
    for (row_idx, result) in reader.records().enumerate() {
        // 行号从 1 开始 (不含表头)
        let row_no = row_idx + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                input.reject(format!("行 {}", row_no), MigrationError::from(e).to_string());
                continue;
            }
        };
        let row: HashMap<&str, &str> = headers
            .iter()
            .map(String::as_str)
            .zip(record.iter().map(str::trim))
            .collect();

        // 跳过完全空白的行
        if row.values().all(|v| v.is_empty()) {
            continue;
        }

        match map_csv_row(row_no, &row, &mut input.warnings) {
            Ok(flat) => input.records.push(LegacyRecord::FlatAssignmentV1(flat)),
            Err(e) => {
                let label = row
                    .get("trameId")
                    .filter(|v| !v.is_empty())
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| format!("行 {}", row_no));
                input.reject(label, e.to_string());
            }
        }
    }
    Ok(input)
}

/// 单行转换；必填 ID、房间号、日期无效时拒收该行，可选的标志与数量无效时取默认值并警告
fn map_csv_row(
    row_no: usize,
    row: &HashMap<&str, &str>,
    warnings: &mut Vec<String>,
) -> Result<FlatAssignmentV1, MigrationError> {
    let text = |key: &str| {
        row.get(key)
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty())
    };
    let required = |key: &str| {
        text(key).ok_or_else(|| MigrationError::FieldValueError {
            row: row_no,
            field: key.to_string(),
            value: String::new(),
        })
    };
    let invalid = |key: &str, value: String| MigrationError::FieldValueError {
        row: row_no,
        field: key.to_string(),
        value,
    };

    let parse_date = |key: &str| -> Result<Option<NaiveDate>, MigrationError> {
        text(key)
            .map(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|_| invalid(key, v)))
            .transpose()
    };
    let mut ignore = |key: &str, value: &str| {
        warnings.push(format!(
            "[行 {}] 字段 {} 的值 {} 无法识别，已使用默认值",
            row_no, key, value
        ));
    };
    let is_active = match text("isActive") {
        None => None,
        Some(v) => match v.to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => {
                ignore("isActive", &v);
                None
            }
        },
    };
    let max_count = text("postMaxCount").and_then(|v| match v.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            ignore("postMaxCount", &v);
            None
        }
    });
    let room_id = text("roomId")
        .map(|v| v.parse().map_err(|_| invalid("roomId", v)))
        .transpose()?;

    let post_name = text("postName");
    let post_type = text("postType");
    let posts = if post_name.is_some() || post_type.is_some() || max_count.is_some() {
        vec![LegacyPost {
            name: post_name,
            role: post_type,
            max_count,
        }]
    } else {
        Vec::new()
    };

    Ok(FlatAssignmentV1 {
        trame_id: required("trameId")?,
        trame_name: text("trameName").unwrap_or_default(),
        trame_description: text("trameDescription"),
        is_active,
        start_date: parse_date("startDate")?,
        end_date: parse_date("endDate")?,
        site_id: text("siteId"),
        assignment_id: required("assignmentId")?,
        name: text("name").unwrap_or_default(),
        type_code: text("type"),
        room_id,
        day_of_week: text("dayOfWeek"),
        period: text("period"),
        week_type: text("weekType"),
        posts,
    })
}
