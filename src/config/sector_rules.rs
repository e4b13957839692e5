// ==========================================
// 手术室排班核心 - 区域规则解析
// ==========================================
// 原始数据: operating_sector.rules_json (无类型 JSON)
// 输出: 不可变的 SectorRules；非法字段取默认值并记录 warn
// 兼容旧键: supervisionContigues / maxSallesParMAR
// ==========================================

use crate::domain::sector::{ContiguityMap, RoomId, SectorId, SectorRules};
use crate::domain::types::StaffRole;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const KEY_REQUIRE_CONTIGUOUS: &[&str] = &["requireContiguousRooms", "supervisionContigues"];
const KEY_ENFORCE_CONTIGUITY: &str = "enforceContiguity";
const KEY_MIN_PER_ROLE: &str = "minPerRoleTypePerRoom";
const KEY_MANDATORY_ROLES: &str = "mandatoryRoles";
const KEY_MAX_ROOMS: &[&str] = &["maxRoomsPerSupervisor", "maxSallesParMAR"];
const KEY_CONTIGUITY_MAP: &str = "contiguityMap";

/// 解析 rules_json 文本；缺失或无法解析时返回默认规则
pub fn parse_sector_rules(raw: Option<&str>, sector_id: SectorId) -> SectorRules {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return SectorRules::default();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => parse_sector_rules_value(&value, sector_id),
        Err(e) => {
            warn!(sector_id, error = %e, "区域规则 JSON 无法解析，使用默认规则");
            SectorRules::default()
        }
    }
}

/// 解析已反序列化的规则对象
pub fn parse_sector_rules_value(value: &Value, sector_id: SectorId) -> SectorRules {
    let mut rules = SectorRules::default();
    let Some(obj) = value.as_object() else {
        if !value.is_null() {
            warn!(sector_id, "区域规则不是 JSON 对象，使用默认规则");
        }
        return rules;
    };

    if let Some((key, v)) = first_present(obj, KEY_REQUIRE_CONTIGUOUS) {
        rules.require_contiguous_rooms = read_bool(v, key, sector_id);
    }
    if let Some(v) = obj.get(KEY_ENFORCE_CONTIGUITY) {
        rules.enforce_contiguity = read_bool(v, KEY_ENFORCE_CONTIGUITY, sector_id);
    }
    if let Some(v) = obj.get(KEY_MIN_PER_ROLE) {
        match v.as_object() {
            Some(map) => {
                for (role_code, count) in map {
                    let Some(role) = StaffRole::from_str(role_code) else {
                        warn!(sector_id, role = %role_code, "最低配员中的角色无法识别，已忽略");
                        continue;
                    };
                    match count.as_u64().and_then(|n| u32::try_from(n).ok()) {
                        Some(n) => {
                            rules.min_per_role_type_per_room.insert(role, n);
                        }
                        None => warn!(sector_id, role = %role_code, value = %count, "最低配员人数非法，已忽略"),
                    }
                }
            }
            None => warn!(sector_id, key = KEY_MIN_PER_ROLE, "应为对象，已忽略"),
        }
    }
    if let Some(v) = obj.get(KEY_MANDATORY_ROLES) {
        match v.as_array() {
            Some(items) => {
                for item in items {
                    match item.as_str().and_then(StaffRole::from_str) {
                        Some(role) => {
                            rules.mandatory_roles.insert(role);
                        }
                        None => warn!(sector_id, value = %item, "强制角色无法识别，已忽略"),
                    }
                }
            }
            None => warn!(sector_id, key = KEY_MANDATORY_ROLES, "应为数组，已忽略"),
        }
    }
    if let Some((key, v)) = first_present(obj, KEY_MAX_ROOMS) {
        match v.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0) {
            Some(n) => rules.max_rooms_per_supervisor = Some(n),
            None if v.is_null() => {}
            None => warn!(sector_id, key, value = %v, "监管上限应为正整数，已忽略"),
        }
    }
    if let Some(v) = obj.get(KEY_CONTIGUITY_MAP) {
        rules.contiguity_map = parse_contiguity_map(v, sector_id);
    }

    for key in obj.keys() {
        let known = KEY_REQUIRE_CONTIGUOUS.contains(&key.as_str())
            || KEY_MAX_ROOMS.contains(&key.as_str())
            || [KEY_ENFORCE_CONTIGUITY, KEY_MIN_PER_ROLE, KEY_MANDATORY_ROLES, KEY_CONTIGUITY_MAP]
                .contains(&key.as_str());
        if !known {
            debug!(sector_id, key = %key, "忽略未知的区域规则字段");
        }
    }

    rules
}

/// 相邻图: {"1": [2, 3], ...}；非法条目忽略
fn parse_contiguity_map(value: &Value, sector_id: SectorId) -> Option<ContiguityMap> {
    if value.is_null() {
        return None;
    }
    let Some(obj) = value.as_object() else {
        warn!(sector_id, key = KEY_CONTIGUITY_MAP, "应为对象，已忽略");
        return None;
    };

    let mut map = ContiguityMap::new();
    for (room_key, neighbors) in obj {
        let Ok(room_id) = room_key.trim().parse::<RoomId>() else {
            warn!(sector_id, room = %room_key, "相邻图中的手术室 ID 非法，已忽略");
            continue;
        };
        let Some(items) = neighbors.as_array() else {
            warn!(sector_id, room = room_id, "相邻列表应为数组，已忽略");
            continue;
        };
        let ids: Vec<RoomId> = items
            .iter()
            .filter_map(|n| {
                let id = n
                    .as_i64()
                    .or_else(|| n.as_str().and_then(|s| s.trim().parse().ok()));
                if id.is_none() {
                    warn!(sector_id, room = room_id, value = %n, "相邻手术室 ID 非法，已忽略");
                }
                id
            })
            .collect();
        map.entry(room_id).or_default().extend(ids);
    }
    Some(map)
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    keys.iter().find_map(|k| obj.get(*k).map(|v| (*k, v)))
}

fn read_bool(value: &Value, key: &str, sector_id: SectorId) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) if s.eq_ignore_ascii_case("true") => true,
        Value::String(s) if s.eq_ignore_ascii_case("false") => false,
        Value::Null => false,
        other => {
            warn!(sector_id, key, value = %other, "应为布尔值，按 false 处理");
            false
        }
    }
}
