// ==========================================
// 手术室排班核心 - 站点/区域/手术室领域模型
// ==========================================
// 站点与手术室目录由外部设施子系统维护，这里仅为只读投影
// ==========================================

use crate::domain::types::StaffRole;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type RoomId = i64;
pub type SectorId = i64;

/// 手术室相邻关系 (roomId -> 相邻 roomId 列表)
///
/// 声明方向无关，校验器按无向图使用
pub type ContiguityMap = BTreeMap<RoomId, Vec<RoomId>>;

// ==========================================
// Site - 站点
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub site_id: String,
    pub name: String,
}

// ==========================================
// SectorRules - 区域规则 (强类型)
// ==========================================
// 原始数据为 JSON blob，由 config::sector_rules 在加载时一次性解析
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorRules {
    /// 同一监管人员的手术室必须相邻
    pub require_contiguous_rooms: bool,
    /// 未配置相邻图时按"无相邻"处理 (否则视为不受约束)
    pub enforce_contiguity: bool,
    /// 每间手术室每种角色的最低人数
    pub min_per_role_type_per_room: BTreeMap<StaffRole, u32>,
    /// 完全缺失即为 ERROR 的角色
    pub mandatory_roles: BTreeSet<StaffRole>,
    /// 单人同一时段最多监管的手术室数
    pub max_rooms_per_supervisor: Option<u32>,
    /// 相邻图
    pub contiguity_map: Option<ContiguityMap>,
}

// ==========================================
// OperatingSector - 手术区域
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingSector {
    pub sector_id: SectorId,
    pub site_id: String,
    pub name: String,
    pub color: Option<String>,
    pub rules: SectorRules,
}

// ==========================================
// OperatingRoom - 手术室
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingRoom {
    pub room_id: RoomId,
    pub site_id: String,
    pub name: String,
    pub sector_id: Option<SectorId>, // 允许不属于任何区域
    pub is_active: bool,
}

// ==========================================
// PlanningContext - 冲突检测所需的目录快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    pub rooms: HashMap<RoomId, OperatingRoom>,
    pub sectors: HashMap<SectorId, OperatingSector>,
}

impl PlanningContext {
    pub fn new(rooms: Vec<OperatingRoom>, sectors: Vec<OperatingSector>) -> Self {
        Self {
            rooms: rooms.into_iter().map(|r| (r.room_id, r)).collect(),
            sectors: sectors.into_iter().map(|s| (s.sector_id, s)).collect(),
        }
    }

    pub fn room(&self, room_id: RoomId) -> Option<&OperatingRoom> {
        self.rooms.get(&room_id)
    }

    /// 手术室所属区域 (无区域或区域不存在时返回 None)
    pub fn sector_of(&self, room_id: RoomId) -> Option<&OperatingSector> {
        self.rooms
            .get(&room_id)
            .and_then(|r| r.sector_id)
            .and_then(|sid| self.sectors.get(&sid))
    }
}
