//! Goals, goal updates, cloning and bulk import.

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use super::measures::insert_measure;
use super::{Storage, enum_column, new_id, not_found, parse_opt_date, parse_time};
use crate::models::input::validate_title;
use crate::models::{
    BulkGoal, CloneGoalInput, Goal, GoalDetail, GoalFilter, GoalListItem, GoalPage, GoalPatch,
    GoalStatus, GoalUpdate, GoalWithMeasures, LinkCounts, Measure, MeasureWithUpdates, NewGoal,
    OwnerSummary, Pagination,
};
use crate::{Error, Result};

pub(crate) const GOAL_COLUMNS: &str = "g.id, g.title, g.description, g.period, g.status, g.progress, \
     g.is_stretch, g.due_date, g.owner_id, g.team_id, g.created_at, g.updated_at";

/// Goals joined to their team so queries can be scoped to an organization.
pub(crate) const GOALS_IN_ORG: &str = "goals g JOIN teams t ON g.team_id = t.id";

pub(crate) fn row_to_goal(row: &Row<'_>) -> rusqlite::Result<Goal> {
    let is_stretch: i32 = row.get(6)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(Goal {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        period: row.get(3)?,
        status: enum_column(row, 4)?,
        progress: row.get(5)?,
        is_stretch: is_stretch != 0,
        due_date: parse_opt_date(row.get(7)?),
        owner_id: row.get(8)?,
        team_id: row.get(9)?,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

fn insert_goal(conn: &Connection, goal: &Goal) -> Result<()> {
    conn.execute(
        "INSERT INTO goals (id, title, description, period, status, progress, is_stretch, due_date, owner_id, team_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            goal.id,
            goal.title,
            goal.description,
            goal.period,
            goal.status.as_str(),
            goal.progress,
            goal.is_stretch as i32,
            goal.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            goal.owner_id,
            goal.team_id,
            goal.created_at.to_rfc3339(),
            goal.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn validate_period(period: &str) -> Result<()> {
    if period.trim().is_empty() {
        Err(Error::InvalidArgument("Period is required".to_string()))
    } else {
        Ok(())
    }
}

impl Storage {
    /// Get a goal within an organization.
    pub fn get_goal(&self, id: &str, org_id: &str) -> Result<Goal> {
        not_found(
            self.conn.query_row(
                &format!(
                    "SELECT {} FROM {} WHERE g.id = ?1 AND t.organization_id = ?2",
                    GOAL_COLUMNS, GOALS_IN_ORG
                ),
                params![id, org_id],
                row_to_goal,
            ),
            "Goal not found",
        )
    }

    pub(crate) fn owner_summary(&self, user_id: &str) -> Result<OwnerSummary> {
        not_found(
            self.conn.query_row(
                "SELECT id, first_name, last_name FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(OwnerSummary {
                        id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                    })
                },
            ),
            "User not found",
        )
    }

    pub(crate) fn recent_team_goals(&self, team_id: &str, limit: usize) -> Result<Vec<Goal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM goals g WHERE g.team_id = ?1 ORDER BY g.created_at DESC, g.rowid DESC LIMIT ?2",
            GOAL_COLUMNS
        ))?;
        let goals = stmt
            .query_map(params![team_id, limit as i64], row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(goals)
    }

    fn link_counts(&self, goal_id: &str) -> Result<LinkCounts> {
        let (parents, children): (i64, i64) = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM goal_links WHERE child_goal_id = ?1),
                (SELECT COUNT(*) FROM goal_links WHERE parent_goal_id = ?1)",
            [goal_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(LinkCounts {
            parent_links: parents as usize,
            child_links: children as usize,
        })
    }

    pub(crate) fn goal_list_item(&self, goal: Goal) -> Result<GoalListItem> {
        let owner = self.owner_summary(&goal.owner_id)?;
        let team = self.team_summary(&goal.team_id)?;
        let measures = self.list_measures(&goal.id)?;
        let counts = self.link_counts(&goal.id)?;
        Ok(GoalListItem {
            goal,
            owner,
            team,
            measures,
            counts,
        })
    }

    /// One page of goals, newest first.
    pub fn list_goals(&self, org_id: &str, filter: &GoalFilter) -> Result<GoalPage> {
        let mut clause = String::from("t.organization_id = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(org_id.to_string())];

        if let Some(period) = &filter.period {
            clause.push_str(" AND g.period = ?");
            params_vec.push(Box::new(period.clone()));
        }
        if let Some(team_id) = &filter.team_id {
            clause.push_str(" AND g.team_id = ?");
            params_vec.push(Box::new(team_id.clone()));
        }
        if let Some(owner_id) = &filter.owner_id {
            clause.push_str(" AND g.owner_id = ?");
            params_vec.push(Box::new(owner_id.clone()));
        }
        if let Some(status) = filter.status {
            clause.push_str(" AND g.status = ?");
            params_vec.push(Box::new(status.as_str()));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", GOALS_IN_ORG, clause),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let page = filter.page();
        let limit = filter.limit();
        let offset = filter.offset()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY g.created_at DESC, g.rowid DESC LIMIT {} OFFSET {}",
            GOAL_COLUMNS,
            GOALS_IN_ORG,
            clause,
            limit,
            offset
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params_refs.as_slice(), row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::with_capacity(goals.len());
        for goal in goals {
            items.push(self.goal_list_item(goal)?);
        }

        Ok(GoalPage {
            goals: items,
            pagination: Pagination::new(page, limit, total as usize),
        })
    }

    /// Goals whose period is one of `periods`, ordered by team level then title.
    pub fn goals_for_periods(&self, org_id: &str, periods: &[String]) -> Result<Vec<GoalListItem>> {
        if periods.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; periods.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE t.organization_id = ? AND g.period IN ({}) ORDER BY {}, g.title",
            GOAL_COLUMNS,
            GOALS_IN_ORG,
            placeholders,
            super::teams::LEVEL_RANK_SQL
        );
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&org_id];
        for period in periods {
            params_vec.push(period);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params_vec.as_slice(), row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        goals.into_iter().map(|g| self.goal_list_item(g)).collect()
    }

    /// Most recently touched goals, optionally restricted to some statuses.
    pub fn recent_goals(
        &self,
        org_id: &str,
        statuses: &[GoalStatus],
        limit: usize,
    ) -> Result<Vec<GoalListItem>> {
        let mut clause = String::from("t.organization_id = ?");
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&org_id];
        let status_strs: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();
        if !status_strs.is_empty() {
            clause.push_str(&format!(
                " AND g.status IN ({})",
                vec!["?"; status_strs.len()].join(", ")
            ));
            for s in &status_strs {
                params_vec.push(s);
            }
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY g.updated_at DESC, g.rowid DESC LIMIT {}",
            GOAL_COLUMNS, GOALS_IN_ORG, clause, limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params_vec.as_slice(), row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        goals.into_iter().map(|g| self.goal_list_item(g)).collect()
    }

    /// Goal count per status across the organization.
    pub fn goal_status_counts(&self, org_id: &str) -> Result<Vec<(GoalStatus, usize)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT g.status, COUNT(*) FROM {} WHERE t.organization_id = ?1 GROUP BY g.status ORDER BY g.status",
            GOALS_IN_ORG
        ))?;
        let counts = stmt
            .query_map([org_id], |row| {
                let n: i64 = row.get(1)?;
                Ok((enum_column(row, 0)?, n as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Full goal view: owner, team, measures with recent updates, recent
    /// goal updates and both link directions.
    pub fn get_goal_detail(&self, id: &str, org_id: &str) -> Result<GoalDetail> {
        let goal = self.get_goal(id, org_id)?;
        let owner = self.owner_summary(&goal.owner_id)?;
        let team = self.team_summary(&goal.team_id)?;

        let mut measures = Vec::new();
        for measure in self.list_measures(id)? {
            let updates = self.measure_updates(&measure.id, Some(5))?;
            measures.push(MeasureWithUpdates { measure, updates });
        }

        let updates = self.goal_updates(id, Some(10))?;
        let parent_links = self.linked_goals(id, true)?;
        let child_links = self.linked_goals(id, false)?;

        Ok(GoalDetail {
            goal,
            owner,
            team,
            measures,
            updates,
            parent_links,
            child_links,
        })
    }

    /// Create a draft goal owned by `owner_id`.
    pub fn create_goal(&mut self, org_id: &str, owner_id: &str, input: NewGoal) -> Result<Goal> {
        input.validate()?;
        validate_period(&input.period)?;
        self.get_team_row(&input.team_id, org_id)?;
        self.get_user(owner_id, org_id)?;

        let mut goal = Goal::new(
            new_id(),
            input.title.trim().to_string(),
            input.period,
            input.team_id,
            owner_id.to_string(),
        );
        goal.description = input.description;
        goal.is_stretch = input.is_stretch;
        goal.due_date = input.due_date;

        insert_goal(&self.conn, &goal)?;
        tracing::info!(goal = %goal.id, period = %goal.period, "created goal");
        Ok(goal)
    }

    /// Apply a client edit. A status set here lasts until the next measure
    /// write triggers a rollup.
    pub fn update_goal(&mut self, id: &str, org_id: &str, patch: GoalPatch) -> Result<Goal> {
        patch.validate()?;
        let mut goal = self.get_goal(id, org_id)?;

        if let Some(title) = patch.title {
            goal.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            goal.description = Some(description);
        }
        if let Some(status) = patch.status {
            goal.status = status;
        }
        if let Some(stretch) = patch.is_stretch {
            goal.is_stretch = stretch;
        }
        if let Some(due) = patch.due_date {
            goal.due_date = Some(due);
        }
        goal.updated_at = Utc::now();

        self.conn.execute(
            "UPDATE goals SET title = ?2, description = ?3, status = ?4, is_stretch = ?5, due_date = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                goal.id,
                goal.title,
                goal.description,
                goal.status.as_str(),
                goal.is_stretch as i32,
                goal.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                goal.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(goal)
    }

    /// Delete a goal with its measures, logs and every link touching it.
    pub fn delete_goal(&mut self, id: &str, org_id: &str) -> Result<()> {
        self.get_goal(id, org_id)?;
        self.conn.execute("DELETE FROM goals WHERE id = ?1", [id])?;
        tracing::info!(goal = id, "deleted goal");
        Ok(())
    }

    // === Goal Update Log ===

    pub fn add_goal_update(
        &mut self,
        goal_id: &str,
        org_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<GoalUpdate> {
        if content.trim().is_empty() {
            return Err(Error::InvalidArgument("Content is required".to_string()));
        }
        self.get_goal(goal_id, org_id)?;
        let author = self.owner_summary(author_id)?;

        let update = GoalUpdate {
            id: new_id(),
            goal_id: goal_id.to_string(),
            content: content.to_string(),
            author,
            created_at: Utc::now(),
        };
        self.conn.execute(
            "INSERT INTO goal_updates (id, goal_id, content, author_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                update.id,
                update.goal_id,
                update.content,
                update.author.id,
                update.created_at.to_rfc3339(),
            ],
        )?;
        Ok(update)
    }

    /// Goal updates, newest first.
    pub fn list_goal_updates(&self, goal_id: &str, org_id: &str) -> Result<Vec<GoalUpdate>> {
        self.get_goal(goal_id, org_id)?;
        self.goal_updates(goal_id, None)
    }

    fn goal_updates(&self, goal_id: &str, limit: Option<usize>) -> Result<Vec<GoalUpdate>> {
        let mut sql = String::from(
            "SELECT gu.id, gu.goal_id, gu.content, u.id, u.first_name, u.last_name, gu.created_at
             FROM goal_updates gu JOIN users u ON gu.author_id = u.id
             WHERE gu.goal_id = ?1 ORDER BY gu.created_at DESC, gu.rowid DESC",
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let updates = stmt
            .query_map([goal_id], |row| {
                let created_at: String = row.get(6)?;
                Ok(GoalUpdate {
                    id: row.get(0)?,
                    goal_id: row.get(1)?,
                    content: row.get(2)?,
                    author: OwnerSummary {
                        id: row.get(3)?,
                        first_name: row.get(4)?,
                        last_name: row.get(5)?,
                    },
                    created_at: parse_time(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(updates)
    }

    // === Clone and Bulk Import ===

    /// Copy a goal onto another team and period as a new draft.
    ///
    /// Copied measures restart at their start value. The new goal and all of
    /// its measures are written in one transaction.
    pub fn clone_goal(
        &mut self,
        org_id: &str,
        owner_id: &str,
        input: CloneGoalInput,
    ) -> Result<GoalWithMeasures> {
        validate_period(&input.period)?;
        let source = self.get_goal(&input.source_goal_id, org_id)?;
        self.get_team_row(&input.target_team_id, org_id)?;
        self.get_user(owner_id, org_id)?;
        let source_measures = if input.include_measures {
            self.list_measures(&source.id)?
        } else {
            Vec::new()
        };

        let mut goal = Goal::new(
            new_id(),
            source.title.clone(),
            input.period.clone(),
            input.target_team_id.clone(),
            owner_id.to_string(),
        );
        goal.description = source.description.clone();
        goal.is_stretch = source.is_stretch;

        let measure_period = input.measure_period.unwrap_or_else(|| input.period.clone());
        let measures: Vec<Measure> = source_measures
            .into_iter()
            .map(|m| {
                let mut copy = Measure {
                    id: new_id(),
                    goal_id: goal.id.clone(),
                    title: m.title,
                    description: m.description,
                    period: Some(measure_period.clone()),
                    measure_type: m.measure_type,
                    unit: m.unit,
                    start_value: m.start_value,
                    current_value: m.start_value,
                    target_value: m.target_value,
                    progress: 0.0,
                    created_at: goal.created_at,
                    updated_at: goal.created_at,
                };
                copy.refresh_progress();
                copy
            })
            .collect();

        let tx = self.conn.transaction()?;
        insert_goal(&tx, &goal)?;
        for measure in &measures {
            insert_measure(&tx, measure)?;
        }
        tx.commit()?;

        tracing::info!(
            source = %source.id,
            goal = %goal.id,
            measures = measures.len(),
            "cloned goal"
        );
        Ok(GoalWithMeasures { goal, measures })
    }

    /// Create many draft goals with their measures on one team, atomically.
    pub fn bulk_import_goals(
        &mut self,
        org_id: &str,
        owner_id: &str,
        team_id: &str,
        period: &str,
        measure_period: Option<&str>,
        goals: &[BulkGoal],
    ) -> Result<Vec<GoalWithMeasures>> {
        validate_period(period)?;
        if goals.is_empty() {
            return Err(Error::InvalidArgument("No goals to import".to_string()));
        }
        self.get_team_row(team_id, org_id)?;
        self.get_user(owner_id, org_id)?;
        for bulk in goals {
            validate_title(&bulk.title)?;
            for m in &bulk.measures {
                validate_title(&m.title)?;
            }
        }

        let measure_period = measure_period.unwrap_or(period);
        let mut created = Vec::with_capacity(goals.len());
        for bulk in goals {
            let mut goal = Goal::new(
                new_id(),
                bulk.title.trim().to_string(),
                period.to_string(),
                team_id.to_string(),
                owner_id.to_string(),
            );
            goal.description = bulk.description.clone();
            goal.is_stretch = bulk.is_stretch;

            let measures = bulk
                .measures
                .iter()
                .map(|m| {
                    let mut measure = Measure {
                        id: new_id(),
                        goal_id: goal.id.clone(),
                        title: m.title.trim().to_string(),
                        description: m.description.clone(),
                        period: Some(measure_period.to_string()),
                        measure_type: m.measure_type,
                        unit: m.unit.clone(),
                        start_value: m.start_value,
                        current_value: m.start_value,
                        target_value: m.target_value,
                        progress: 0.0,
                        created_at: goal.created_at,
                        updated_at: goal.created_at,
                    };
                    measure.refresh_progress();
                    measure
                })
                .collect();
            created.push(GoalWithMeasures { goal, measures });
        }

        let tx = self.conn.transaction()?;
        for item in &created {
            insert_goal(&tx, &item.goal)?;
            for measure in &item.measures {
                insert_measure(&tx, measure)?;
            }
        }
        tx.commit()?;

        tracing::info!(team = team_id, goals = created.len(), "bulk imported goals");
        Ok(created)
    }
}
