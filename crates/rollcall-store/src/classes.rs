//! CRUD operations for [`SubjectClass`] records.

use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::SubjectClass;

const SELECT_COLUMNS: &str = "SELECT id, subject, teacher_id, section, schedule FROM subject_classes";

impl Database {
    pub fn upsert_subject_class(&self, class: &SubjectClass) -> Result<()> {
        upsert(self.conn(), class)
    }

    pub fn replace_subject_classes(&self, classes: &[SubjectClass]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        for class in classes {
            upsert(&tx, class)?;
        }
        tx.commit()?;
        Ok(classes.len())
    }

    pub fn get_subject_class(&self, id: &str) -> Result<SubjectClass> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_class,
            )
            .map_err(not_found)
    }

    pub fn list_subject_classes(&self) -> Result<Vec<SubjectClass>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY section ASC, subject ASC"))?;
        let rows = stmt.query_map([], row_to_class)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Classes handled by one teacher.
    pub fn list_subject_classes_for_teacher(&self, teacher_id: &str) -> Result<Vec<SubjectClass>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS} WHERE teacher_id = ?1 ORDER BY section ASC, subject ASC"
        ))?;
        let rows = stmt.query_map(params![teacher_id], row_to_class)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_subject_class(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM subject_classes WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn upsert(conn: &Connection, class: &SubjectClass) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO subject_classes (id, subject, teacher_id, section, schedule)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            class.id,
            class.subject,
            class.teacher_id,
            class.section,
            class.schedule,
        ],
    )?;
    Ok(())
}

fn row_to_class(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubjectClass> {
    Ok(SubjectClass {
        id: row.get(0)?,
        subject: row.get(1)?,
        teacher_id: row.get(2)?,
        section: row.get(3)?,
        schedule: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_by_teacher() {
        let db = Database::open_in_memory().unwrap();
        let math = SubjectClass {
            id: "C1".into(),
            subject: "Math".into(),
            teacher_id: "T1".into(),
            section: "10-A".into(),
            schedule: Some("MWF 08:00".into()),
        };
        let science = SubjectClass {
            id: "C2".into(),
            subject: "Science".into(),
            teacher_id: "T2".into(),
            section: "10-A".into(),
            schedule: None,
        };
        db.replace_subject_classes(&[math.clone(), science]).unwrap();

        assert_eq!(db.list_subject_classes_for_teacher("T1").unwrap(), vec![math.clone()]);
        assert_eq!(db.get_subject_class("C1").unwrap(), math);
        assert_eq!(db.list_subject_classes().unwrap().len(), 2);
        assert!(db.delete_subject_class("C2").unwrap());
        assert!(matches!(db.get_subject_class("C2"), Err(StoreError::NotFound)));
    }
}
