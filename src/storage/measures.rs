//! Measures, the measure update log and the goal progress cascade.

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use super::{Storage, enum_column, new_id, not_found, parse_time};
use crate::models::input::validate_finite;
use crate::models::progress::rollup;
use crate::models::{GoalStatus, Measure, MeasurePatch, MeasureUpdate, NewMeasure, OwnerSummary};
use crate::{Error, Result};

const MEASURE_COLUMNS: &str = "m.id, m.goal_id, m.title, m.description, m.period, m.measure_type, \
     m.unit, m.start_value, m.current_value, m.target_value, m.progress, m.created_at, m.updated_at";

fn row_to_measure(row: &Row<'_>) -> rusqlite::Result<Measure> {
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(Measure {
        id: row.get(0)?,
        goal_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        period: row.get(4)?,
        measure_type: enum_column(row, 5)?,
        unit: row.get(6)?,
        start_value: row.get(7)?,
        current_value: row.get(8)?,
        target_value: row.get(9)?,
        progress: row.get(10)?,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

pub(crate) fn insert_measure(conn: &Connection, m: &Measure) -> Result<()> {
    conn.execute(
        "INSERT INTO measures (id, goal_id, title, description, period, measure_type, unit, start_value, current_value, target_value, progress, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            m.id,
            m.goal_id,
            m.title,
            m.description,
            m.period,
            m.measure_type.as_str(),
            m.unit,
            m.start_value,
            m.current_value,
            m.target_value,
            m.progress,
            m.created_at.to_rfc3339(),
            m.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn save_measure(conn: &Connection, m: &Measure) -> Result<()> {
    conn.execute(
        "UPDATE measures SET title = ?2, description = ?3, measure_type = ?4, unit = ?5,
             start_value = ?6, current_value = ?7, target_value = ?8, progress = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            m.id,
            m.title,
            m.description,
            m.measure_type.as_str(),
            m.unit,
            m.start_value,
            m.current_value,
            m.target_value,
            m.progress,
            m.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl Storage {
    /// Get a measure whose goal belongs to the organization.
    pub fn get_measure(&self, id: &str, org_id: &str) -> Result<Measure> {
        not_found(
            self.conn.query_row(
                &format!(
                    "SELECT {} FROM measures m
                     JOIN goals g ON m.goal_id = g.id
                     JOIN teams t ON g.team_id = t.id
                     WHERE m.id = ?1 AND t.organization_id = ?2",
                    MEASURE_COLUMNS
                ),
                params![id, org_id],
                row_to_measure,
            ),
            "Measure not found",
        )
    }

    /// Measures of a goal in creation order.
    pub(crate) fn list_measures(&self, goal_id: &str) -> Result<Vec<Measure>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM measures m WHERE m.goal_id = ?1 ORDER BY m.created_at, m.rowid",
            MEASURE_COLUMNS
        ))?;
        let measures = stmt
            .query_map([goal_id], row_to_measure)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(measures)
    }

    /// Create a measure at its start value.
    ///
    /// The measure's own progress is computed, but the goal is not rolled up
    /// until the first measure write.
    pub fn create_measure(&mut self, org_id: &str, input: NewMeasure) -> Result<Measure> {
        input.validate()?;
        let goal = self.get_goal(&input.goal_id, org_id)?;

        let now = Utc::now();
        let mut measure = Measure {
            id: new_id(),
            goal_id: goal.id,
            title: input.title.trim().to_string(),
            description: input.description,
            period: Some(input.period.unwrap_or(goal.period)),
            measure_type: input.measure_type,
            unit: input.unit,
            start_value: input.start_value,
            current_value: input.start_value,
            target_value: input.target_value,
            progress: 0.0,
            created_at: now,
            updated_at: now,
        };
        measure.refresh_progress();

        insert_measure(&self.conn, &measure)?;
        Ok(measure)
    }

    /// Edit a measure and roll the change up into its goal.
    pub fn update_measure(&mut self, id: &str, org_id: &str, patch: MeasurePatch) -> Result<Measure> {
        patch.validate()?;
        let mut measure = self.get_measure(id, org_id)?;

        if let Some(title) = patch.title {
            measure.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            measure.description = Some(description);
        }
        if let Some(kind) = patch.measure_type {
            measure.measure_type = kind;
        }
        if let Some(unit) = patch.unit {
            measure.unit = Some(unit);
        }
        if let Some(v) = patch.start_value {
            measure.start_value = v;
        }
        if let Some(v) = patch.current_value {
            measure.current_value = v;
        }
        if let Some(v) = patch.target_value {
            measure.target_value = v;
        }
        measure.refresh_progress();
        measure.updated_at = Utc::now();

        save_measure(&self.conn, &measure)?;
        self.recompute_goal_progress(&measure.goal_id)?;
        Ok(measure)
    }

    /// Delete a measure and roll up what remains. A goal left with no
    /// measures keeps its last progress and status.
    pub fn delete_measure(&mut self, id: &str, org_id: &str) -> Result<()> {
        let measure = self.get_measure(id, org_id)?;
        self.conn.execute("DELETE FROM measures WHERE id = ?1", [id])?;
        self.recompute_goal_progress(&measure.goal_id)?;
        Ok(())
    }

    /// Record a new value for a measure.
    pub fn record_measure_update(
        &mut self,
        id: &str,
        org_id: &str,
        author_id: &str,
        value: f64,
        note: Option<&str>,
    ) -> Result<MeasureUpdate> {
        validate_finite("value", value)?;
        let mut measure = self.get_measure(id, org_id)?;
        let author = self.owner_summary(author_id)?;

        let update = MeasureUpdate {
            id: new_id(),
            measure_id: measure.id.clone(),
            value,
            note: note.map(str::to_string).filter(|n| !n.trim().is_empty()),
            author,
            created_at: Utc::now(),
        };
        measure.current_value = value;
        measure.refresh_progress();
        measure.updated_at = update.created_at;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO measure_updates (id, measure_id, value, note, author_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                update.id,
                update.measure_id,
                update.value,
                update.note,
                update.author.id,
                update.created_at.to_rfc3339(),
            ],
        )?;
        save_measure(&tx, &measure)?;
        tx.commit()?;

        self.recompute_goal_progress(&measure.goal_id)?;
        Ok(update)
    }

    /// Every recorded value of a measure, newest first.
    pub fn measure_history(&self, id: &str, org_id: &str) -> Result<Vec<MeasureUpdate>> {
        self.get_measure(id, org_id)?;
        self.measure_updates(id, None)
    }

    pub(crate) fn measure_updates(
        &self,
        measure_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MeasureUpdate>> {
        let mut sql = String::from(
            "SELECT mu.id, mu.measure_id, mu.value, mu.note, u.id, u.first_name, u.last_name, mu.created_at
             FROM measure_updates mu JOIN users u ON mu.author_id = u.id
             WHERE mu.measure_id = ?1 ORDER BY mu.created_at DESC, mu.rowid DESC",
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let updates = stmt
            .query_map([measure_id], |row| {
                let created_at: String = row.get(7)?;
                Ok(MeasureUpdate {
                    id: row.get(0)?,
                    measure_id: row.get(1)?,
                    value: row.get(2)?,
                    note: row.get(3)?,
                    author: OwnerSummary {
                        id: row.get(4)?,
                        first_name: row.get(5)?,
                        last_name: row.get(6)?,
                    },
                    created_at: parse_time(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(updates)
    }

    /// Roll measure progress up into the goal.
    ///
    /// Overwrites any manually set status. Returns `None`, and changes
    /// nothing, when the goal has no measures.
    pub fn recompute_goal_progress(&mut self, goal_id: &str) -> Result<Option<(f64, GoalStatus)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT progress FROM measures WHERE goal_id = ?1")?;
        let progresses = stmt
            .query_map([goal_id], |row| row.get::<_, f64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let Some((progress, status)) = rollup(&progresses) else {
            tracing::debug!(goal = goal_id, "no measures, progress left unchanged");
            return Ok(None);
        };

        let changed = self.conn.execute(
            "UPDATE goals SET progress = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
            params![goal_id, progress, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(Error::NotFound("Goal not found".to_string()));
        }
        tracing::debug!(goal = goal_id, progress, %status, "rolled up goal progress");
        Ok(Some((progress, status)))
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;
    use crate::models::{GoalStatus, MeasurePatch, MeasureType, NewMeasure};
    use crate::test_utils::{TestEnv, add_goal, add_measure, seed};

    #[test]
    fn test_create_starts_at_start_value() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "Ship", "Q1-2026");

        let measure = add_measure(&mut storage, &fx, &goal.id, "Users", 10.0, 20.0);
        assert_eq!(measure.current_value, 10.0);
        assert_eq!(measure.progress, 0.0);
        assert_eq!(measure.period.as_deref(), Some("Q1-2026"));

        // creation does not roll up
        let goal = storage.get_goal(&goal.id, &fx.org.id).unwrap();
        assert_eq!(goal.status, GoalStatus::Draft);
    }

    #[test]
    fn test_create_rejects_foreign_goal() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "Ship", "2026");
        let other = storage.create_organization("Other", "other").unwrap();

        let err = storage
            .create_measure(
                &other.id,
                NewMeasure {
                    goal_id: goal.id.clone(),
                    title: "Sneaky".to_string(),
                    description: None,
                    period: None,
                    measure_type: MeasureType::Milestone,
                    unit: None,
                    start_value: 0.0,
                    target_value: 1.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_example_scenario_rolls_up_to_on_track() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "G", "2026");
        let m1 = add_measure(&mut storage, &fx, &goal.id, "M1", 0.0, 100.0);
        let m2 = add_measure(&mut storage, &fx, &goal.id, "M2", 0.0, 100.0);

        storage
            .record_measure_update(&m1.id, &fx.org.id, &fx.admin.id, 100.0, None)
            .unwrap();
        storage
            .record_measure_update(&m2.id, &fx.org.id, &fx.admin.id, 40.0, None)
            .unwrap();

        let goal = storage.get_goal(&goal.id, &fx.org.id).unwrap();
        assert_eq!(goal.progress, 70.0);
        assert_eq!(goal.status, GoalStatus::OnTrack);
    }

    #[test]
    fn test_patch_triggers_rollup() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "G", "2026");
        let m = add_measure(&mut storage, &fx, &goal.id, "M", 0.0, 10.0);

        let updated = storage
            .update_measure(
                &m.id,
                &fx.org.id,
                MeasurePatch {
                    current_value: Some(10.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.progress, 100.0);
        let goal = storage.get_goal(&goal.id, &fx.org.id).unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);

        storage
            .update_measure(
                &m.id,
                &fx.org.id,
                MeasurePatch {
                    target_value: Some(40.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let goal = storage.get_goal(&goal.id, &fx.org.id).unwrap();
        assert_eq!(goal.progress, 25.0);
        assert_eq!(goal.status, GoalStatus::Behind);
    }

    #[test]
    fn test_deleting_last_measure_keeps_goal_state() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "G", "2026");
        let a = add_measure(&mut storage, &fx, &goal.id, "A", 0.0, 100.0);
        let b = add_measure(&mut storage, &fx, &goal.id, "B", 0.0, 100.0);
        storage
            .record_measure_update(&a.id, &fx.org.id, &fx.admin.id, 80.0, None)
            .unwrap();
        storage
            .record_measure_update(&b.id, &fx.org.id, &fx.admin.id, 20.0, None)
            .unwrap();

        storage.delete_measure(&b.id, &fx.org.id).unwrap();
        let goal_after_one = storage.get_goal(&goal.id, &fx.org.id).unwrap();
        assert_eq!(goal_after_one.progress, 80.0);
        assert_eq!(goal_after_one.status, GoalStatus::OnTrack);

        storage.delete_measure(&a.id, &fx.org.id).unwrap();
        let goal_after_all = storage.get_goal(&goal.id, &fx.org.id).unwrap();
        assert_eq!(goal_after_all.progress, 80.0);
        assert_eq!(goal_after_all.status, GoalStatus::OnTrack);
        assert_eq!(storage.recompute_goal_progress(&goal.id).unwrap(), None);
    }

    #[test]
    fn test_history_newest_first() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "G", "2026");
        let m = add_measure(&mut storage, &fx, &goal.id, "M", 0.0, 10.0);

        storage
            .record_measure_update(&m.id, &fx.org.id, &fx.admin.id, 2.0, Some("week one"))
            .unwrap();
        storage
            .record_measure_update(&m.id, &fx.org.id, &fx.admin.id, 4.0, Some("  "))
            .unwrap();

        let history = storage.measure_history(&m.id, &fx.org.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, 4.0);
        assert_eq!(history[0].note, None);
        assert_eq!(history[1].note.as_deref(), Some("week one"));
        assert_eq!(history[1].author.id, fx.admin.id);
        assert_eq!(storage.get_measure(&m.id, &fx.org.id).unwrap().current_value, 4.0);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let goal = add_goal(&mut storage, &fx, "G", "2026");
        let m = add_measure(&mut storage, &fx, &goal.id, "M", 0.0, 10.0);

        assert!(matches!(
            storage.record_measure_update(&m.id, &fx.org.id, &fx.admin.id, f64::INFINITY, None),
            Err(Error::InvalidArgument(_))
        ));
    }
}
