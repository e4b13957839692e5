// ==========================================
// 手术室排班核心 - 展开日历工具
// ==========================================
// ISO 周切片与周奇偶判定
// ==========================================

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// 一个 ISO 周切片 (已裁剪到请求区间)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekChunk {
    pub iso_year: i32,
    pub iso_week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekChunk {
    /// 切片内的所有日期 (含首尾)
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let days = (self.end - self.start).num_days();
        (0..=days).map(move |offset| start + Duration::days(offset))
    }

    pub fn label(&self) -> String {
        format!("{}-W{:02}", self.iso_year, self.iso_week)
    }
}

/// 将 [from, to] 按 ISO 周切分；from > to 时返回空
pub fn iso_week_chunks(from: NaiveDate, to: NaiveDate) -> Vec<WeekChunk> {
    let mut chunks = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        let week = cursor.iso_week();
        // 本周周日
        let sunday = cursor + Duration::days(7 - i64::from(cursor.weekday().number_from_monday()));
        let end = sunday.min(to);
        chunks.push(WeekChunk {
            iso_year: week.year(),
            iso_week: week.week(),
            start: cursor,
            end,
        });
        cursor = end + Duration::days(1);
    }
    chunks
}

/// 日期所在 ISO 周序号
pub fn iso_week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_chunks_clip_to_range() {
        // 2026-03-04 是周三
        let chunks = iso_week_chunks(d(2026, 3, 4), d(2026, 3, 17));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, d(2026, 3, 4));
        assert_eq!(chunks[0].end, d(2026, 3, 8));
        assert_eq!(chunks[1].start, d(2026, 3, 9));
        assert_eq!(chunks[1].end, d(2026, 3, 15));
        assert_eq!(chunks[2].end, d(2026, 3, 17));
        assert_eq!(chunks.iter().map(|c| c.dates().count()).sum::<usize>(), 14);
    }

    #[test]
    fn test_iso_year_boundary() {
        // 2026-12-31 (周四) 属于 2026-W53，2027-01-01 同周
        let chunks = iso_week_chunks(d(2026, 12, 30), d(2027, 1, 5));
        assert_eq!(chunks[0].label(), "2026-W53");
        assert_eq!(chunks[0].end, d(2027, 1, 3));
        assert_eq!(chunks[1].label(), "2027-W01");
        assert_eq!(iso_week_number(d(2027, 1, 1)), 53);
    }

    #[test]
    fn test_empty_range() {
        assert!(iso_week_chunks(d(2026, 3, 5), d(2026, 3, 4)).is_empty());
        assert_eq!(iso_week_chunks(d(2026, 3, 5), d(2026, 3, 5)).len(), 1);
    }
}
