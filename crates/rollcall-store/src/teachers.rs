//! CRUD operations for [`Teacher`] records.

use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::Teacher;

impl Database {
    /// Insert or replace a teacher by id.
    pub fn upsert_teacher(&self, teacher: &Teacher) -> Result<()> {
        upsert(self.conn(), teacher)
    }

    /// Insert-or-replace every teacher in one transaction. Rows whose id is
    /// not in `teachers` are left alone.
    pub fn replace_teachers(&self, teachers: &[Teacher]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        for teacher in teachers {
            upsert(&tx, teacher)?;
        }
        tx.commit()?;
        Ok(teachers.len())
    }

    pub fn get_teacher(&self, id: &str) -> Result<Teacher> {
        self.conn()
            .query_row(
                "SELECT id, name, email, department FROM teachers WHERE id = ?1",
                params![id],
                row_to_teacher,
            )
            .map_err(not_found)
    }

    /// List all teachers ordered by name.
    pub fn list_teachers(&self) -> Result<Vec<Teacher>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, email, department FROM teachers ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_teacher)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_teacher(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM teachers WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn upsert(conn: &Connection, teacher: &Teacher) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO teachers (id, name, email, department)
         VALUES (?1, ?2, ?3, ?4)",
        params![teacher.id, teacher.name, teacher.email, teacher.department],
    )?;
    Ok(())
}

fn row_to_teacher(row: &rusqlite::Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        department: row.get(3)?,
    })
}
