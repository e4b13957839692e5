// ==========================================
// 旧模板迁移集成测试
// ==========================================
// 场景: 前置检查中止 / 单模板失败不影响其他 / 坏记录只拒收该条 / dry-run 计数一致
//       重复迁移跳过与 --force 覆盖 / CSV 输入 / 迁移后展开
// ==========================================


use bloc_planning::api::{ExpansionApi, ExpansionRequest};
use bloc_planning::config::{ConfigManager, MigrationDefaults};
use bloc_planning::importer::{
    load_legacy_records, LegacyInput, MigrationOptions, MigrationResult, TrameMigrator,
};
use bloc_planning::repository::{CatalogRepository, PlanningRepository, TrameRepository};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tempfile::{Builder, NamedTempFile};

use test_helpers::{create_test_db, d, open_shared, seed_catalog, seed_site_only};

const LEGACY_JSON: &str = r#"[
  {
    "shape": "TRAME_AFFECTATION_V2",
    "id": "T-ORTHO",
    "name": "Ortho semaine",
    "siteId": "SITE1",
    "startDate": "2026-01-05",
    "recurrenceType": "WEEKLY",
    "joursSemaineActifs": [1, 2, 3, 4, 5],
    "typeSemaine": "ALL",
    "periods": [
      {
        "name": "Semaine",
        "assignments": [
          {
            "id": "A1", "name": "Orthopédie", "type": "ORTHO", "roomId": 1,
            "dayOfWeek": "LUNDI", "period": "MATIN",
            "posts": [
              {"name": "Anesthésiste", "type": "MAR", "maxCount": 1},
              {"name": "Infirmier", "type": "IADE", "maxCount": 2}
            ]
          },
          {
            "id": "A2", "name": "Cardio pédiatrique", "roomId": 2,
            "dayOfWeek": "MARDI", "period": "APRES_MIDI",
            "posts": [{"type": "MAR"}]
          }
        ]
      }
    ]
  },
  {
    "shape": "FLAT_ASSIGNMENT_V1",
    "trameId": "F1", "trameName": "Visc", "siteId": "SITE1", "startDate": "2026-01-05",
    "assignmentId": "B1", "name": "Chirurgie viscérale", "type": "VISC", "roomId": 3,
    "dayOfWeek": "MERCREDI", "period": "JOURNEE",
    "posts": [{"type": "IADE", "maxCount": 1}]
  }
]"#;

const BROKEN_JSON: &str = r#"[
  {"shape": "TRAME_AFFECTATION_V2", "id": "T-BAD", "name": "Broken", "siteId": "NOWHERE", "periods": []}
]"#;

struct TestEnv {
    _temp_file: NamedTempFile,
    conn: Arc<Mutex<Connection>>,
    catalog: Arc<CatalogRepository>,
    trames: Arc<TrameRepository>,
}

fn setup(seed: fn(&Connection) -> Result<(), Box<dyn std::error::Error>>) -> TestEnv {
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path);
    seed(&conn.lock().unwrap()).unwrap();
    TestEnv {
        _temp_file: temp_file,
        catalog: Arc::new(CatalogRepository::from_connection(conn.clone())),
        trames: Arc::new(TrameRepository::from_connection(conn.clone())),
        conn,
    }
}

impl TestEnv {
    fn migrator(&self) -> TrameMigrator {
        TrameMigrator::new(
            self.catalog.clone(),
            self.trames.clone(),
            MigrationDefaults::default(),
            None,
        )
    }

    fn migrate(&self, input: LegacyInput, dry_run: bool, force: bool) -> MigrationResult {
        self.migrator()
            .migrate(input, MigrationOptions { dry_run, force }, now())
    }
}

fn now() -> NaiveDateTime {
    d(2026, 2, 1).and_hms_opt(8, 0, 0).unwrap()
}

fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn records(json: &str) -> LegacyInput {
    let file = write_temp(json, ".json");
    load_legacy_records(file.path(), None).unwrap()
}

#[test]
fn test_preflight_aborts_without_catalogs() {
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path);
    let env = TestEnv {
        _temp_file: temp_file,
        catalog: Arc::new(CatalogRepository::from_connection(conn.clone())),
        trames: Arc::new(TrameRepository::from_connection(conn.clone())),
        conn,
    };

    let result = env.migrate(records(LEGACY_JSON), false, false);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.trame_modeles_migrated, 0);
    assert_eq!(env.trames.count_trames().unwrap(), 0);
}

#[test]
fn test_preflight_requires_activity_types() {
    let env = setup(seed_site_only);
    let result = env.migrate(records(LEGACY_JSON), false, false);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.trame_modeles_migrated, 0);
}

#[test]
fn test_migration_counts_and_synthetic_activity() {
    let env = setup(seed_catalog);
    let result = env.migrate(records(LEGACY_JSON), false, false);

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.trame_modeles_migrated, 2);
    assert_eq!(result.affectations_migrated, 3);
    assert_eq!(result.personnel_requis_migrated, 4);
    assert!(result.warnings.iter().any(|w| w.contains("MIGRATED_A2")));

    let synthetic = env
        .catalog
        .find_activity_type_by_code("MIGRATED_A2")
        .unwrap()
        .unwrap();
    assert!(synthetic.is_synthetic());

    let trame = env
        .trames
        .find_by_original_id("TRAME_AFFECTATION_V2", "T-ORTHO")
        .unwrap()
        .unwrap();
    let provenance = trame.provenance.as_ref().unwrap();
    assert_eq!(provenance.original_id, "T-ORTHO");
    assert_eq!(provenance.migration_date, now());
    let ortho = trame
        .affectations
        .iter()
        .find(|a| a.room_id == Some(1))
        .unwrap();
    assert_eq!(ortho.activity_type_id, "AT_ORTHO");
    assert_eq!(ortho.personnel_requis.len(), 2);
}

#[test]
fn test_record_failure_does_not_stop_other_templates() {
    let env = setup(seed_catalog);
    let mut input = records(BROKEN_JSON);
    input.records.extend(records(LEGACY_JSON).records);

    let result = env.migrate(input, false, false);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("T-BAD"));
    assert_eq!(result.trame_modeles_migrated, 2);
}

#[test]
fn test_unreadable_record_rejected_alone() {
    let env = setup(seed_catalog);
    let mixed = r#"[
      {"shape": "TRAME_AFFECTATION_V2", "id": "T-OK", "name": "Ortho", "siteId": "SITE1",
       "periods": [{"assignments": [{"id": "K1", "name": "Orthopédie", "type": "ORTHO",
                                      "roomId": 1, "dayOfWeek": "LUNDI", "period": "MATIN"}]}]},
      {"shape": "TRAME_AFFECTATION_V2", "id": "T-SALLE", "name": "Visc", "siteId": "SITE1",
       "periods": [{"assignments": [{"id": "K2", "name": "Visc", "roomId": "salle-3"}]}]},
      {"shape": "TRAME_AFFECTATION_V2", "id": "T-ANON", "siteId": "SITE1", "periods": []}
    ]"#;
    let input = records(mixed);
    assert_eq!(input.records.len(), 2);
    assert_eq!(input.rejected.len(), 1);

    let result = env.migrate(input, false, false);
    assert!(!result.success);
    assert_eq!(result.trame_modeles_migrated, 1);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().any(|e| e.contains("T-SALLE")));
    assert!(result.errors.iter().any(|e| e.contains("T-ANON") && e.contains("缺少模板名称")));
    assert!(env.trames.find_by_original_id("TRAME_AFFECTATION_V2", "T-OK").unwrap().is_some());

    let csv = "\
trameId,trameName,siteId,assignmentId,name,type,roomId,isActive,dayOfWeek,period
C1,Ortho CSV,SITE1,R1,Orthopédie,ORTHO,1,maybe,MONDAY,MORNING
C2,Visc CSV,SITE1,R2,Visc,VISC,salle-3,true,MONDAY,MORNING
";
    let file = write_temp(csv, ".csv");
    let input = load_legacy_records(file.path(), None).unwrap();
    let result = env.migrate(input, false, false);
    assert_eq!(result.trame_modeles_migrated, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("C2"));
    assert!(result.warnings.iter().any(|w| w.contains("isActive")));
    // isActive 无法识别时按默认启用
    let c1 = env
        .trames
        .find_by_original_id("FLAT_ASSIGNMENT_V1", "C1")
        .unwrap()
        .unwrap();
    assert!(c1.is_active);
}

#[test]
fn test_dry_run_matches_real_run() {
    let env = setup(seed_catalog);
    let dry = env.migrate(records(LEGACY_JSON), true, false);
    assert_eq!(env.trames.count_trames().unwrap(), 0);
    assert!(env
        .catalog
        .find_activity_type_by_code("MIGRATED_A2")
        .unwrap()
        .is_none());

    let real = env.migrate(records(LEGACY_JSON), false, false);
    assert_eq!(dry, real);
}

#[test]
fn test_rerun_skips_unless_forced() {
    let env = setup(seed_catalog);
    env.migrate(records(LEGACY_JSON), false, false);

    let rerun = env.migrate(records(LEGACY_JSON), false, false);
    assert!(rerun.success);
    assert_eq!(rerun.trame_modeles_migrated, 0);
    assert_eq!(
        rerun.warnings.iter().filter(|w| w.contains("--force")).count(),
        2
    );
    assert_eq!(env.trames.count_trames().unwrap(), 2);

    let forced = env.migrate(records(LEGACY_JSON), false, true);
    assert_eq!(forced.trame_modeles_migrated, 2);
    assert_eq!(env.trames.count_trames().unwrap(), 2);
    assert_eq!(env.trames.count_affectations().unwrap(), 3);
}

#[test]
fn test_csv_input() {
    let env = setup(seed_catalog);
    let csv = "\
trameId,trameName,siteId,startDate,assignmentId,name,type,roomId,dayOfWeek,period,postType,postMaxCount
C1,Ortho CSV,SITE1,2026-01-05,R1,Orthopédie,ORTHO,1,MONDAY,MORNING,MAR,1
C1,Ortho CSV,SITE1,2026-01-05,R1,Orthopédie,ORTHO,1,MONDAY,MORNING,IADE,1
C1,Ortho CSV,SITE1,2026-01-05,R2,Orthopédie,ORTHO,2,THURSDAY,AFTERNOON,MAR,1
";
    let file = write_temp(csv, ".csv");
    let input = load_legacy_records(file.path(), None).unwrap();

    let result = env.migrate(input, false, false);
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.trame_modeles_migrated, 1);
    assert_eq!(result.affectations_migrated, 2);
    assert_eq!(result.personnel_requis_migrated, 3);
}

#[test]
fn test_migrated_trame_expands() {
    let env = setup(seed_catalog);
    env.migrate(records(LEGACY_JSON), false, false);
    let trame = env
        .trames
        .find_by_original_id("TRAME_AFFECTATION_V2", "T-ORTHO")
        .unwrap()
        .unwrap();

    let api = ExpansionApi::new(
        Arc::new(PlanningRepository::from_connection(env.conn.clone())),
        env.catalog.clone(),
        env.trames.clone(),
        Arc::new(ConfigManager::from_connection(env.conn.clone()).unwrap()),
        None,
    );
    let report = api
        .expand(
            &ExpansionRequest {
                trame_modele_id: trame.trame_modele_id,
                site_id: "SITE1".to_string(),
                from: d(2026, 3, 2),
                to: d(2026, 3, 8),
                dry_run: false,
                include_inactive: false,
            },
            &AtomicBool::new(false),
        )
        .unwrap();
    assert!(report.is_complete());
    // 周一上午 OR1 + 周二下午 OR2
    assert_eq!(report.totals.assignments_created, 2);
    assert_eq!(report.totals.staffing_requirements_created, 3);
}
