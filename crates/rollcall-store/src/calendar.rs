//! Academic calendar: school events and academic periods.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::error::{conversion, not_found, Result, StoreError};
use crate::models::{AcademicPeriod, SchoolEvent};

const EVENT_COLUMNS: &str = "SELECT id, title, date, description, is_holiday FROM school_events";
const PERIOD_COLUMNS: &str =
    "SELECT id, label, school_year, start_date, end_date, is_current FROM academic_periods";

/// Dates are stored as ISO `YYYY-MM-DD` text so they compare correctly.
const DATE_FORMAT: &str = "%Y-%m-%d";

impl Database {
    // ------------------------------------------------------------------
    // School events
    // ------------------------------------------------------------------

    pub fn upsert_event(&self, event: &SchoolEvent) -> Result<()> {
        upsert_event(self.conn(), event)
    }

    pub fn replace_events(&self, events: &[SchoolEvent]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        for event in events {
            upsert_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(events.len())
    }

    pub fn get_event(&self, id: &str) -> Result<SchoolEvent> {
        self.conn()
            .query_row(
                &format!("{EVENT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_event,
            )
            .map_err(not_found)
    }

    pub fn list_events(&self) -> Result<Vec<SchoolEvent>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{EVENT_COLUMNS} ORDER BY date ASC, title ASC"))?;
        let rows = stmt.query_map([], row_to_event)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Events whose date falls in `[from, to]`.
    pub fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<SchoolEvent>> {
        let mut stmt = self.conn().prepare(&format!(
            "{EVENT_COLUMNS} WHERE date BETWEEN ?1 AND ?2 ORDER BY date ASC, title ASC"
        ))?;
        let rows = stmt.query_map(
            params![from.format(DATE_FORMAT).to_string(), to.format(DATE_FORMAT).to_string()],
            row_to_event,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_event(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM school_events WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Academic periods
    // ------------------------------------------------------------------

    pub fn upsert_academic_period(&self, period: &AcademicPeriod) -> Result<()> {
        upsert_period(self.conn(), period)
    }

    pub fn replace_academic_periods(&self, periods: &[AcademicPeriod]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        for period in periods {
            upsert_period(&tx, period)?;
        }
        tx.commit()?;
        Ok(periods.len())
    }

    pub fn list_academic_periods(&self) -> Result<Vec<AcademicPeriod>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{PERIOD_COLUMNS} ORDER BY start_date ASC"))?;
        let rows = stmt.query_map([], row_to_period)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// The period covering `date`. When no range covers it, fall back to the
    /// period the administrator flagged as current.
    pub fn current_academic_period(&self, date: NaiveDate) -> Result<Option<AcademicPeriod>> {
        let day = date.format(DATE_FORMAT).to_string();
        let covering = self
            .conn()
            .query_row(
                &format!(
                    "{PERIOD_COLUMNS} WHERE ?1 BETWEEN start_date AND end_date
                     ORDER BY is_current DESC, start_date DESC LIMIT 1"
                ),
                params![day],
                row_to_period,
            )
            .optional()?;

        if covering.is_some() {
            return Ok(covering);
        }

        let flagged = self
            .conn()
            .query_row(
                &format!("{PERIOD_COLUMNS} WHERE is_current = 1 ORDER BY start_date DESC LIMIT 1"),
                [],
                row_to_period,
            )
            .optional()?;
        Ok(flagged)
    }

    pub fn delete_academic_period(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM academic_periods WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

fn upsert_event(conn: &Connection, event: &SchoolEvent) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO school_events (id, title, date, description, is_holiday)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.id,
            event.title,
            event.date.format(DATE_FORMAT).to_string(),
            event.description,
            event.is_holiday,
        ],
    )?;
    Ok(())
}

fn upsert_period(conn: &Connection, period: &AcademicPeriod) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO academic_periods (id, label, school_year, start_date, end_date, is_current)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            period.id,
            period.label,
            period.school_year,
            period.start_date.format(DATE_FORMAT).to_string(),
            period.end_date.format(DATE_FORMAT).to_string(),
            period.is_current,
        ],
    )?;
    Ok(())
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| conversion(idx, e))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<SchoolEvent> {
    let date: String = row.get(2)?;
    Ok(SchoolEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        date: parse_date(2, &date)?,
        description: row.get(3)?,
        is_holiday: row.get(4)?,
    })
}

fn row_to_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<AcademicPeriod> {
    let start: String = row.get(3)?;
    let end: String = row.get(4)?;
    Ok(AcademicPeriod {
        id: row.get(0)?,
        label: row.get(1)?,
        school_year: row.get(2)?,
        start_date: parse_date(3, &start)?,
        end_date: parse_date(4, &end)?,
        is_current: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period(id: &str, label: &str, start: NaiveDate, end: NaiveDate, current: bool) -> AcademicPeriod {
        AcademicPeriod {
            id: id.into(),
            label: label.into(),
            school_year: "2026-2027".into(),
            start_date: start,
            end_date: end,
            is_current: current,
        }
    }

    #[test]
    fn current_period_prefers_covering_range() {
        let db = Database::open_in_memory().unwrap();
        db.replace_academic_periods(&[
            period("q1", "Q1", day(2026, 6, 1), day(2026, 8, 31), false),
            period("q2", "Q2", day(2026, 9, 1), day(2026, 11, 15), true),
        ])
        .unwrap();

        let found = db.current_academic_period(day(2026, 7, 15)).unwrap().unwrap();
        assert_eq!(found.label, "Q1");
        assert!(found.contains(day(2026, 7, 15)));

        // Christmas break: nothing covers it, fall back to the flagged one.
        let fallback = db.current_academic_period(day(2026, 12, 24)).unwrap().unwrap();
        assert_eq!(fallback.label, "Q2");
    }

    #[test]
    fn no_periods_means_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.current_academic_period(day(2026, 1, 1)).unwrap().is_none());
    }

    #[test]
    fn events_in_range() {
        let db = Database::open_in_memory().unwrap();
        db.replace_events(&[
            SchoolEvent {
                id: "e1".into(),
                title: "Foundation Day".into(),
                date: day(2026, 8, 20),
                description: None,
                is_holiday: true,
            },
            SchoolEvent {
                id: "e2".into(),
                title: "Quarter exams".into(),
                date: day(2026, 10, 5),
                description: Some("All sections".into()),
                is_holiday: false,
            },
        ])
        .unwrap();

        let august = db.events_between(day(2026, 8, 1), day(2026, 8, 31)).unwrap();
        assert_eq!(august.len(), 1);
        assert!(august[0].is_holiday);
        assert_eq!(db.get_event("e2").unwrap().description.as_deref(), Some("All sections"));
        assert!(db.delete_event("e1").unwrap());
        assert_eq!(db.list_events().unwrap().len(), 1);
    }
}
