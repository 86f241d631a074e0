//! Shared fixture: one faculty, two programs, two courses and one user per role.
#![allow(dead_code)]

use capaian::access::{load_actor, Actor};
use capaian::config::AppConfig;
use capaian::db::{init_schema, insertions, open_in_memory};
use capaian::models::{NewCourse, NewCourseOutcome, NewFaculty, NewOutcome, NewProgram, NewUser, Role};
use capaian::service;
use rusqlite::Connection;

pub struct Fixture {
    pub conn: Connection,
    pub cfg: AppConfig,
    pub program_id: i64,
    pub other_program_id: i64,
    /// Course taught by `dosen`.
    pub course_id: i64,
    /// Course in the same program, not taught by `dosen`.
    pub other_course_id: i64,
    pub admin: Actor,
    pub kaprodi: Actor,
    pub dosen: Actor,
    pub mahasiswa: Actor,
}

pub struct SeedIds {
    pub program_id: i64,
    pub other_program_id: i64,
    pub course_id: i64,
    pub other_course_id: i64,
    pub admin_id: i64,
    pub kaprodi_id: i64,
    pub dosen_id: i64,
    pub mahasiswa_id: i64,
}

/// Seed master data into an existing schema.
pub fn seed(conn: &Connection) -> SeedIds {
    init_schema(conn).expect("schema");
    let f = insertions::insert_faculty(conn, &NewFaculty { code: "FT".into(), name: "Fakultas Teknik".into() }).unwrap();
    let p = insertions::insert_program(conn, &NewProgram { faculty_id: f, code: "IF".into(), name: "Informatika".into() }).unwrap();
    let p2 = insertions::insert_program(conn, &NewProgram { faculty_id: f, code: "SI".into(), name: "Sistem Informasi".into() }).unwrap();
    let c = insertions::insert_course(conn, &NewCourse { program_id: p, code: "IF101".into(), name: "Algoritma".into() }).unwrap();
    let c2 = insertions::insert_course(conn, &NewCourse { program_id: p, code: "IF102".into(), name: "Basis Data".into() }).unwrap();

    let user = |name: &str, role: Role, program_id: Option<i64>| {
        insertions::insert_user(conn, &NewUser { name: name.into(), role, program_id }).unwrap()
    };
    let admin_id = user("Admin", Role::Admin, None);
    let kaprodi_id = user("Kaprodi IF", Role::Kaprodi, Some(p));
    let dosen_id = user("Dosen A", Role::Dosen, Some(p));
    let mahasiswa_id = user("Mahasiswa A", Role::Mahasiswa, Some(p));
    insertions::assign_lecturer(conn, dosen_id, c).unwrap();

    SeedIds {
        program_id: p,
        other_program_id: p2,
        course_id: c,
        other_course_id: c2,
        admin_id,
        kaprodi_id,
        dosen_id,
        mahasiswa_id,
    }
}

pub fn fixture() -> Fixture {
    let conn = open_in_memory().expect("in-memory db");
    let ids = seed(&conn);
    let actor = |id| load_actor(&conn, id).unwrap().expect("seeded user");
    let admin = actor(ids.admin_id);
    let kaprodi = actor(ids.kaprodi_id);
    let dosen = actor(ids.dosen_id);
    let mahasiswa = actor(ids.mahasiswa_id);
    Fixture {
        conn,
        cfg: AppConfig::default(),
        program_id: ids.program_id,
        other_program_id: ids.other_program_id,
        course_id: ids.course_id,
        other_course_id: ids.other_course_id,
        admin,
        kaprodi,
        dosen,
        mahasiswa,
    }
}

impl Fixture {
    pub fn cpl(&mut self, code: &str) -> i64 {
        self.cpl_in(self.program_id, code)
    }

    pub fn cpl_in(&mut self, program_id: i64, code: &str) -> i64 {
        let admin = self.admin.clone();
        let new = NewOutcome {
            program_id,
            code: code.into(),
            description: format!("Capaian {}", code),
            category: None,
            target: None,
        };
        service::create_outcome(&mut self.conn, &admin, &self.cfg, &new).expect("create CPL").id
    }

    pub fn cpmk(&mut self, code: &str) -> i64 {
        self.cpmk_in(self.course_id, code)
    }

    pub fn cpmk_in(&mut self, course_id: i64, code: &str) -> i64 {
        let admin = self.admin.clone();
        let new = NewCourseOutcome {
            course_id,
            code: code.into(),
            description: format!("Mampu {}", code),
            taxonomy_levels: vec!["C3".into()],
        };
        service::create_course_outcome(&mut self.conn, &admin, &new).expect("create CPMK").id
    }

    pub fn student(&mut self, name: &str) -> i64 {
        insertions::insert_user(
            &self.conn,
            &NewUser { name: name.into(), role: Role::Mahasiswa, program_id: Some(self.program_id) },
        )
        .unwrap()
    }
}
