// ==========================================
// 手术室排班核心 - 手术室相邻性校验
// ==========================================
// 输入: 区域相邻图 (roomId -> [roomId])
// 规则: 边按无向处理，无论声明方向
// 红线: 纯函数，不持有房间对象引用，只按 id 遍历
// ==========================================

use crate::domain::sector::{ContiguityMap, RoomId};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// ==========================================
// RoomGraph - 对称化后的邻接表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RoomGraph {
    adjacency: BTreeMap<RoomId, BTreeSet<RoomId>>,
}

impl RoomGraph {
    /// 从相邻图构建对称邻接表 (自环忽略)
    pub fn from_map(map: &ContiguityMap) -> Self {
        let mut adjacency: BTreeMap<RoomId, BTreeSet<RoomId>> = BTreeMap::new();
        for (&from, neighbors) in map {
            adjacency.entry(from).or_default();
            for &to in neighbors {
                if to == from {
                    continue;
                }
                adjacency.entry(from).or_default().insert(to);
                adjacency.entry(to).or_default().insert(from);
            }
        }
        Self { adjacency }
    }

    fn neighbors(&self, room: RoomId) -> impl Iterator<Item = RoomId> + '_ {
        self.adjacency
            .get(&room)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// b 是否可由 a 经广度优先遍历到达
    pub fn is_contiguous(&self, a: RoomId, b: RoomId) -> bool {
        if a == b {
            return true;
        }
        let mut visited = BTreeSet::from([a]);
        let mut queue = VecDeque::from([a]);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if next == b {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// 诱导子图的连通分量 (只沿两端都在集合内的边)
    ///
    /// 分量内部与分量之间均按最小 roomId 排序，保证结果确定
    pub fn induced_components(&self, rooms: &[RoomId]) -> Vec<BTreeSet<RoomId>> {
        let members: BTreeSet<RoomId> = rooms.iter().copied().collect();
        let mut seen = BTreeSet::new();
        let mut components = Vec::new();

        for &start in &members {
            if !seen.insert(start) {
                continue;
            }
            let mut component = BTreeSet::from([start]);
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for next in self.neighbors(current) {
                    if members.contains(&next) && seen.insert(next) {
                        component.insert(next);
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }

        components
    }

    /// 诱导子图是否为单一连通分量 (空集或单元素为 true)
    pub fn all_connected(&self, rooms: &[RoomId]) -> bool {
        self.induced_components(rooms).len() <= 1
    }
}

// ==========================================
// 对外函数接口
// ==========================================

/// b 是否可由 a 到达
///
/// 未配置相邻图时视为不受约束，返回 true
pub fn is_contiguous(a: RoomId, b: RoomId, map: Option<&ContiguityMap>) -> bool {
    match map {
        Some(map) => RoomGraph::from_map(map).is_contiguous(a, b),
        None => true,
    }
}

/// 房间集合在相邻图诱导子图中是否连通
///
/// 未配置相邻图时视为不受约束，返回 true
pub fn all_connected(rooms: &[RoomId], map: Option<&ContiguityMap>) -> bool {
    match map {
        Some(map) => RoomGraph::from_map(map).all_connected(rooms),
        None => true,
    }
}
