// ==========================================
// 手术室排班核心 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// 旧系统的法文编码 (TOUTES/PAIRES/MATIN...) 仅在解析时兼容
// ==========================================

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 时段 (Period)
// ==========================================
// FULL_DAY 同时占用上午与下午两个时间槽
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    Morning,   // 上午
    Afternoon, // 下午
    FullDay,   // 全天
}

impl Period {
    /// 占用的基本时间槽
    pub fn slots(&self) -> &'static [Period] {
        match self {
            Period::Morning => &[Period::Morning],
            Period::Afternoon => &[Period::Afternoon],
            Period::FullDay => &[Period::Morning, Period::Afternoon],
        }
    }

    /// 两个时段是否重叠
    pub fn overlaps(&self, other: Period) -> bool {
        self.slots().iter().any(|s| other.slots().contains(s))
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "MORNING" | "MATIN" | "AM" => Some(Period::Morning),
            "AFTERNOON" | "APRES_MIDI" | "APRES-MIDI" | "PM" => Some(Period::Afternoon),
            "FULL_DAY" | "JOURNEE_ENTIERE" | "JOURNEE" => Some(Period::FullDay),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Period::Morning => "MORNING",
            Period::Afternoon => "AFTERNOON",
            Period::FullDay => "FULL_DAY",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 冲突严重度 (Severity)
// ==========================================
// 顺序: Info < Warning < Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "WARNING" | "AVERTISSEMENT" => Some(Severity::Warning),
            "ERROR" | "ERREUR" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 日排班状态 (Planning Status)
// ==========================================
// 状态迁移表见 engine::lifecycle，调用方不得直接比较字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanningStatus {
    Draft,                   // 草稿
    ValidationRequested,     // 待审核
    Validated,               // 已审核
    ModifiedAfterValidation, // 审核后修改
    Locked,                  // 已锁定 (终态)
    Archived,                // 已归档 (终态)
}

impl PlanningStatus {
    /// 终态不接受任何编辑或状态变更
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanningStatus::Locked | PlanningStatus::Archived)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Some(PlanningStatus::Draft),
            "VALIDATION_REQUESTED" => Some(PlanningStatus::ValidationRequested),
            "VALIDATED" => Some(PlanningStatus::Validated),
            "MODIFIED_AFTER_VALIDATION" => Some(PlanningStatus::ModifiedAfterValidation),
            "LOCKED" => Some(PlanningStatus::Locked),
            "ARCHIVED" => Some(PlanningStatus::Archived),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanningStatus::Draft => "DRAFT",
            PlanningStatus::ValidationRequested => "VALIDATION_REQUESTED",
            PlanningStatus::Validated => "VALIDATED",
            PlanningStatus::ModifiedAfterValidation => "MODIFIED_AFTER_VALIDATION",
            PlanningStatus::Locked => "LOCKED",
            PlanningStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for PlanningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 周类型过滤 (Week Type)
// ==========================================
// 依据 ISO 周序号奇偶性，用于双周轮换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekType {
    All,  // 每周
    Odd,  // 奇数周
    Even, // 偶数周
}

impl WeekType {
    /// ISO 周序号是否满足过滤条件
    pub fn matches_iso_week(&self, iso_week: u32) -> bool {
        match self {
            WeekType::All => true,
            WeekType::Odd => iso_week % 2 == 1,
            WeekType::Even => iso_week % 2 == 0,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ALL" | "TOUTES" => Some(WeekType::All),
            "ODD" | "IMPAIRES" => Some(WeekType::Odd),
            "EVEN" | "PAIRES" => Some(WeekType::Even),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            WeekType::All => "ALL",
            WeekType::Odd => "ODD",
            WeekType::Even => "EVEN",
        }
    }
}

impl fmt::Display for WeekType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 重复类型 (Recurrence Type)
// ==========================================
// 当前仅支持按周重复
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    Weekly,
}

impl RecurrenceType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "WEEKLY" | "HEBDOMADAIRE" => Some(RecurrenceType::Weekly),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RecurrenceType::Weekly => "WEEKLY",
        }
    }
}

// ==========================================
// 人员角色 (Staff Role)
// ==========================================
// MAR: 麻醉医师 (负责监管)
// IADE: 麻醉护士
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Mar,
    Iade,
    Chirurgien,
}

impl StaffRole {
    /// 是否为监管角色 (一人可同时监管多间手术室)
    pub fn is_supervising(&self) -> bool {
        matches!(self, StaffRole::Mar)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "MAR" | "ANESTHESIOLOGIST" => Some(StaffRole::Mar),
            "IADE" | "NURSE_ANESTHETIST" => Some(StaffRole::Iade),
            "CHIRURGIEN" | "SURGEON" => Some(StaffRole::Chirurgien),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            StaffRole::Mar => "MAR",
            StaffRole::Iade => "IADE",
            StaffRole::Chirurgien => "CHIRURGIEN",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 冲突规则 (Conflict Rule)
// ==========================================
// 规则编码是冲突自然键的一部分，不可随意改名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictRule {
    RoomContiguity,
    MinStaffing,
    SupervisorRoomLimit,
    DoubleBooking,
}

impl ConflictRule {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ROOM_CONTIGUITY" => Some(ConflictRule::RoomContiguity),
            "MIN_STAFFING" => Some(ConflictRule::MinStaffing),
            "SUPERVISOR_ROOM_LIMIT" => Some(ConflictRule::SupervisorRoomLimit),
            "DOUBLE_BOOKING" => Some(ConflictRule::DoubleBooking),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictRule::RoomContiguity => "ROOM_CONTIGUITY",
            ConflictRule::MinStaffing => "MIN_STAFFING",
            ConflictRule::SupervisorRoomLimit => "SUPERVISOR_ROOM_LIMIT",
            ConflictRule::DoubleBooking => "DOUBLE_BOOKING",
        }
    }
}

impl fmt::Display for ConflictRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 排班来源 (Assignment Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentSource {
    Manual,   // 人工编辑
    Template, // 模板展开
}

impl AssignmentSource {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TEMPLATE" => AssignmentSource::Template,
            _ => AssignmentSource::Manual, // 默认值
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            AssignmentSource::Manual => "MANUAL",
            AssignmentSource::Template => "TEMPLATE",
        }
    }
}

// ==========================================
// 星期辅助函数
// ==========================================

/// ISO 星期序号 (1=周一 .. 7=周日) 转换为 Weekday
pub fn weekday_from_iso(n: u32) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

/// 解析星期名称 (英文/法文全称或 ISO 序号)
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    let normalized = s.trim().to_uppercase();
    if let Ok(n) = normalized.parse::<u32>() {
        return weekday_from_iso(n);
    }
    match normalized.as_str() {
        "MONDAY" | "LUNDI" | "MON" => Some(Weekday::Mon),
        "TUESDAY" | "MARDI" | "TUE" => Some(Weekday::Tue),
        "WEDNESDAY" | "MERCREDI" | "WED" => Some(Weekday::Wed),
        "THURSDAY" | "JEUDI" | "THU" => Some(Weekday::Thu),
        "FRIDAY" | "VENDREDI" | "FRI" => Some(Weekday::Fri),
        "SATURDAY" | "SAMEDI" | "SAT" => Some(Weekday::Sat),
        "SUNDAY" | "DIMANCHE" | "SUN" => Some(Weekday::Sun),
        _ => None,
    }
}
