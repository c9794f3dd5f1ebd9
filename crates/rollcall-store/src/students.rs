//! CRUD operations for [`Student`] records.

use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Student;

const SELECT_COLUMNS: &str = "SELECT id, name, section, guardian_contact, adviser_id FROM students";

impl Database {
    pub fn upsert_student(&self, student: &Student) -> Result<()> {
        upsert(self.conn(), student)
    }

    /// Insert-or-replace every student in one transaction.
    pub fn replace_students(&self, students: &[Student]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        for student in students {
            upsert(&tx, student)?;
        }
        tx.commit()?;
        Ok(students.len())
    }

    pub fn get_student(&self, id: &str) -> Result<Student> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_student,
            )
            .map_err(not_found)
    }

    pub fn list_students(&self) -> Result<Vec<Student>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY section ASC, name ASC"))?;
        let rows = stmt.query_map([], row_to_student)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Students of one homeroom section, ordered by name.
    pub fn list_students_in_section(&self, section: &str) -> Result<Vec<Student>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} WHERE section = ?1 ORDER BY name ASC"))?;
        let rows = stmt.query_map(params![section], row_to_student)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_student(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM students WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn upsert(conn: &Connection, student: &Student) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO students (id, name, section, guardian_contact, adviser_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            student.id,
            student.name,
            student.section,
            student.guardian_contact,
            student.adviser_id,
        ],
    )?;
    Ok(())
}

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        section: row.get(2)?,
        guardian_contact: row.get(3)?,
        adviser_id: row.get(4)?,
    })
}
