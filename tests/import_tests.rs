mod common;

use capaian::db::{insertions, queries};
use capaian::models::NewCourse;
use capaian::excel::{import_mapping_rows, import_outcome_rows};
use common::fixture;

fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
    data.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
}

#[test]
fn test_outcome_import_continues_past_bad_rows() {
    let mut fx = fixture();
    let kaprodi = fx.kaprodi.clone();
    let cfg = fx.cfg.clone();
    let sheet = rows(&[
        &["Kode CPL", "Deskripsi", "Kategori", "Target"],
        &["CPL-01", "Mampu menganalisis masalah", "Keterampilan Umum", ""],
        &["CPL-02", "Mampu merancang sistem", "", "80%"],
        &["", "", "", ""],
        &["CPL-03", "", "", ""],
        &["CPL-01", "Duplikat", "", ""],
        &["CPL-04", "Target aneh", "", "delapan puluh"],
    ]);

    let report = import_outcome_rows(&mut fx.conn, &kaprodi, &cfg, fx.program_id, &sheet).unwrap();
    assert_eq!(report.success, 2);
    assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    assert!(report.errors[0].starts_with("Row 5 (CPL-03):"), "{}", report.errors[0]);
    assert!(report.errors[1].starts_with("Row 6 (CPL-01):"), "{}", report.errors[1]);
    assert!(report.errors[2].starts_with("Row 7 (CPL-04): invalid target"), "{}", report.errors[2]);
    assert_eq!(report.message, "2 CPL imported, 3 rows failed");

    let imported = queries::find_outcome_by_code(&fx.conn, fx.program_id, "CPL-02").unwrap().unwrap();
    assert_eq!(imported.target, 80.0);
    let defaulted = queries::find_outcome_by_code(&fx.conn, fx.program_id, "CPL-01").unwrap().unwrap();
    assert_eq!(defaulted.target, 75.0);
    assert_eq!(defaulted.category.as_deref(), Some("Keterampilan Umum"));
}

#[test]
fn test_outcome_import_requires_program_write_access() {
    let mut fx = fixture();
    let dosen = fx.dosen.clone();
    let cfg = fx.cfg.clone();
    let sheet = rows(&[&["Kode CPL", "Deskripsi"], &["CPL-01", "x"]]);
    let err = import_outcome_rows(&mut fx.conn, &dosen, &cfg, fx.program_id, &sheet).unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN_IMPORT");

    let kaprodi = fx.kaprodi.clone();
    let no_desc = rows(&[&["Kode CPL", "Target"], &["CPL-01", "70"]]);
    let err = import_outcome_rows(&mut fx.conn, &kaprodi, &cfg, fx.program_id, &no_desc).unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[test]
fn test_mapping_import_reports_budget_per_row() {
    let mut fx = fixture();
    fx.cpl("CPL-01");
    fx.cpl("CPL-02");
    fx.cpmk("CPMK-1");
    let kaprodi = fx.kaprodi.clone();
    let sheet = rows(&[
        &["Kode MK", "Kode CPMK", "Kode CPL", "Bobot"],
        &["IF101", "CPMK-1", "CPL-01", "60"],
        &["IF101", "CPMK-1", "CPL-02", "50"],
        &["IF999", "CPMK-1", "CPL-02", "10"],
        &["IF101", "CPMK-1", "CPL-02", "40%"],
    ]);

    let report = import_mapping_rows(&mut fx.conn, &kaprodi, fx.program_id, &sheet).unwrap();
    assert_eq!(report.success, 2, "{:?}", report.errors);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].starts_with("Row 3 (CPMK-1 -> CPL-02):"), "{}", report.errors[0]);
    assert!(report.errors[0].contains("Sisa Bobot CPL: 40"), "{}", report.errors[0]);
    assert!(report.errors[1].contains("course IF999 not found in program"), "{}", report.errors[1]);
}

#[test]
fn test_mapping_import_denied_for_students() {
    let mut fx = fixture();
    let student = fx.mahasiswa.clone();
    let sheet = rows(&[&["Kode MK", "Kode CPMK", "Kode CPL", "Bobot"]]);
    let err = import_mapping_rows(&mut fx.conn, &student, fx.program_id, &sheet).unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN_IMPORT");
}

#[test]
fn test_mapping_import_resolves_codes_in_the_given_program() {
    let mut fx = fixture();
    // IF101 exists in both programs; CPMK-9 and CPL-01 only in the second
    let si_course = insertions::insert_course(
        &fx.conn,
        &NewCourse { program_id: fx.other_program_id, code: "IF101".into(), name: "Algoritma SI".into() },
    )
    .unwrap();
    let other = fx.other_program_id;
    fx.cpl_in(other, "CPL-01");
    let cpmk = fx.cpmk_in(si_course, "CPMK-9");
    let admin = fx.admin.clone();
    let sheet = rows(&[&["Kode MK", "Kode CPMK", "Kode CPL", "Bobot"], &["IF101", "CPMK-9", "CPL-01", "30"]]);

    let report = import_mapping_rows(&mut fx.conn, &admin, other, &sheet).unwrap();
    assert_eq!(report.success, 1, "{:?}", report.errors);
    let mappings = queries::list_outcome_mappings(&fx.conn, cpmk).unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].weight, 30.0);

    // the same sheet against the first program finds its own IF101
    let report = import_mapping_rows(&mut fx.conn, &admin, fx.program_id, &sheet).unwrap();
    assert_eq!(report.success, 0);
    assert!(report.errors[0].contains("CPMK CPMK-9 not found in IF101"), "{}", report.errors[0]);
}

#[test]
fn test_mapping_import_scope_per_role() {
    let mut fx = fixture();
    fx.cpl("CPL-01");
    fx.cpmk("CPMK-1");
    fx.cpmk_in(fx.other_course_id, "CPMK-2");
    let sheet = rows(&[
        &["Kode MK", "Kode CPMK", "Kode CPL", "Bobot"],
        &["IF101", "CPMK-1", "CPL-01", "20"],
        &["IF102", "CPMK-2", "CPL-01", "20"],
    ]);

    // a dosen imports into its own program, but only rows of taught courses land
    let dosen = fx.dosen.clone();
    let report = import_mapping_rows(&mut fx.conn, &dosen, fx.program_id, &sheet).unwrap();
    assert_eq!(report.success, 1);
    assert!(report.errors[0].contains("FORBIDDEN_PEMETAAN"), "{}", report.errors[0]);

    for actor in [fx.dosen.clone(), fx.kaprodi.clone()] {
        let err = import_mapping_rows(&mut fx.conn, &actor, fx.other_program_id, &sheet).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN_IMPORT");
    }

    let admin = fx.admin.clone();
    let err = import_mapping_rows(&mut fx.conn, &admin, 9999, &sheet).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
