//! The organizational team tree.

use chrono::Utc;
use rusqlite::{Row, params};

use super::{Storage, enum_column, new_id, not_found, parse_time};
use crate::models::graph::team_forest;
use crate::models::{
    NewTeam, Team, TeamCounts, TeamDetail, TeamLevel, TeamListItem, TeamNode, TeamPatch,
    TeamSummary,
};
use crate::{Error, Result};

const TEAM_COLUMNS: &str = "t.id, t.organization_id, t.name, t.description, t.level, t.parent_id, \
     t.is_active, t.created_at, t.updated_at";

/// SQL expression ranking `t.level` in tree order.
pub(crate) const LEVEL_RANK_SQL: &str = "CASE t.level WHEN 'CORPORATE' THEN 0 WHEN 'EXECUTIVE' THEN 1 \
     WHEN 'DEPARTMENT' THEN 2 WHEN 'TEAM' THEN 3 ELSE 4 END";

pub(crate) fn row_to_team(row: &Row<'_>) -> rusqlite::Result<Team> {
    let is_active: i32 = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Team {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        level: enum_column(row, 4)?,
        parent_id: row.get(5)?,
        is_active: is_active != 0,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

fn check_parent_rank(parent: &Team, level: TeamLevel) -> Result<()> {
    if parent.level.can_parent(level) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "A {} team cannot be placed under a {} team",
            level, parent.level
        )))
    }
}

impl Storage {
    /// Get a bare team row within an organization.
    pub(crate) fn get_team_row(&self, id: &str, org_id: &str) -> Result<Team> {
        not_found(
            self.conn.query_row(
                &format!(
                    "SELECT {} FROM teams t WHERE t.id = ?1 AND t.organization_id = ?2",
                    TEAM_COLUMNS
                ),
                params![id, org_id],
                row_to_team,
            ),
            "Team not found",
        )
    }

    pub(crate) fn team_summary(&self, id: &str) -> Result<TeamSummary> {
        not_found(
            self.conn.query_row(
                "SELECT id, name, level FROM teams WHERE id = ?1",
                [id],
                |row| {
                    Ok(TeamSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        level: enum_column(row, 2)?,
                    })
                },
            ),
            "Team not found",
        )
    }

    fn team_counts(&self, id: &str) -> Result<TeamCounts> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [id], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(TeamCounts {
            members: count("SELECT COUNT(*) FROM users WHERE team_id = ?1")?,
            goals: count("SELECT COUNT(*) FROM goals WHERE team_id = ?1")?,
            children: count("SELECT COUNT(*) FROM teams WHERE parent_id = ?1")?,
        })
    }

    /// List teams ordered by level, then name.
    pub fn list_teams(&self, org_id: &str, include_inactive: bool) -> Result<Vec<TeamListItem>> {
        let mut sql = format!(
            "SELECT {} FROM teams t WHERE t.organization_id = ?1",
            TEAM_COLUMNS
        );
        if !include_inactive {
            sql.push_str(" AND t.is_active = 1");
        }
        sql.push_str(&format!(" ORDER BY {}, t.name", LEVEL_RANK_SQL));

        let mut stmt = self.conn.prepare(&sql)?;
        let teams = stmt
            .query_map([org_id], row_to_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut items = Vec::with_capacity(teams.len());
        for team in teams {
            let parent = match &team.parent_id {
                Some(pid) => Some(self.team_summary(pid)?),
                None => None,
            };
            let counts = self.team_counts(&team.id)?;
            items.push(TeamListItem {
                team,
                parent,
                counts,
            });
        }
        Ok(items)
    }

    /// Full view of one team.
    pub fn get_team(&self, id: &str, org_id: &str) -> Result<TeamDetail> {
        let team = self.get_team_row(id, org_id)?;
        let parent = match &team.parent_id {
            Some(pid) => Some(self.team_summary(pid)?),
            None => None,
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, name, level FROM teams WHERE parent_id = ?1 AND is_active = 1 ORDER BY name",
        )?;
        let children = stmt
            .query_map([id], |row| {
                Ok(TeamSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    level: enum_column(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let members = self
            .list_users(org_id)?
            .into_iter()
            .filter(|u| u.is_active && u.team_id.as_deref() == Some(id))
            .collect();
        let goals = self.recent_team_goals(id, 10)?;

        Ok(TeamDetail {
            team,
            parent,
            children,
            members,
            goals,
        })
    }

    /// Active teams as a forest rooted at parentless teams.
    pub fn team_hierarchy(&self, org_id: &str) -> Result<Vec<TeamNode>> {
        Ok(team_forest(self.list_teams(org_id, false)?))
    }

    pub fn create_team(&mut self, org_id: &str, input: NewTeam) -> Result<Team> {
        if input.name.trim().is_empty() {
            return Err(Error::InvalidArgument("Team name is required".to_string()));
        }

        match &input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .get_team_row(parent_id, org_id)
                    .map_err(|_| Error::NotFound("Parent team not found".to_string()))?;
                check_parent_rank(&parent, input.level)?;
            }
            None if input.level != TeamLevel::Corporate => {
                return Err(Error::InvalidArgument(
                    "Only CORPORATE teams can be created without a parent".to_string(),
                ));
            }
            None => {}
        }

        let now = Utc::now();
        let team = Team {
            id: new_id(),
            organization_id: org_id.to_string(),
            name: input.name.trim().to_string(),
            description: input.description,
            level: input.level,
            parent_id: input.parent_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO teams (id, organization_id, name, description, level, parent_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
            params![
                team.id,
                team.organization_id,
                team.name,
                team.description,
                team.level.as_str(),
                team.parent_id,
                team.created_at.to_rfc3339(),
                team.updated_at.to_rfc3339(),
            ],
        )?;
        tracing::info!(team = %team.name, level = %team.level, "created team");
        Ok(team)
    }

    pub fn update_team(&mut self, id: &str, org_id: &str, patch: TeamPatch) -> Result<Team> {
        let mut team = self.get_team_row(id, org_id)?;

        if let Some(parent_id) = &patch.parent_id {
            if parent_id == id {
                return Err(Error::InvalidArgument(
                    "Team cannot be its own parent".to_string(),
                ));
            }
            let parent = self
                .get_team_row(parent_id, org_id)
                .map_err(|_| Error::NotFound("Parent team not found".to_string()))?;
            check_parent_rank(&parent, team.level)?;
            team.parent_id = Some(parent_id.clone());
        }
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidArgument("Team name is required".to_string()));
            }
            team.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            team.description = Some(description);
        }
        if let Some(active) = patch.is_active {
            team.is_active = active;
        }
        team.updated_at = Utc::now();

        self.conn.execute(
            "UPDATE teams SET name = ?2, description = ?3, parent_id = ?4, is_active = ?5, updated_at = ?6 WHERE id = ?1",
            params![
                team.id,
                team.name,
                team.description,
                team.parent_id,
                team.is_active as i32,
                team.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(team)
    }

    /// Hard-delete a team. Only allowed for a childless, member-less,
    /// goal-less team; otherwise deactivate it instead.
    pub fn delete_team(&mut self, id: &str, org_id: &str) -> Result<()> {
        self.get_team_row(id, org_id)?;
        let counts = self.team_counts(id)?;

        if counts.children > 0 {
            return Err(Error::Conflict("Cannot delete team with child teams".to_string()));
        }
        if counts.members > 0 {
            return Err(Error::Conflict("Cannot delete team with members".to_string()));
        }
        if counts.goals > 0 {
            return Err(Error::Conflict("Cannot delete team with goals".to_string()));
        }

        self.conn.execute("DELETE FROM teams WHERE id = ?1", [id])?;
        tracing::info!(team = id, "deleted team");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;
    use crate::models::{NewTeam, NewUser, TeamLevel, TeamPatch, UserRole};
    use crate::test_utils::{TestEnv, add_goal_on, add_team, seed};

    #[test]
    fn test_rank_rule_on_create() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let dept = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);

        let err = storage
            .create_team(
                &fx.org.id,
                NewTeam {
                    name: "Exec".to_string(),
                    description: None,
                    level: TeamLevel::Executive,
                    parent_id: Some(dept.id.clone()),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = storage
            .create_team(
                &fx.org.id,
                NewTeam {
                    name: "Floating".to_string(),
                    description: None,
                    level: TeamLevel::Team,
                    parent_id: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_parent_from_other_org_is_not_found() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let other = storage.create_organization("Other", "other").unwrap();

        let err = storage
            .create_team(
                &other.id,
                NewTeam {
                    name: "Sneaky".to_string(),
                    description: None,
                    level: TeamLevel::Team,
                    parent_id: Some(fx.corporate.id.clone()),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(m) if m == "Parent team not found"));
    }

    #[test]
    fn test_self_parent_rejected() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let dept = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);

        let err = storage
            .update_team(
                &dept.id,
                &fx.org.id,
                TeamPatch {
                    parent_id: Some(dept.id.clone()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(m) if m == "Team cannot be its own parent"));
    }

    #[test]
    fn test_list_orders_by_rank_then_name() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let sales = add_team(&mut storage, &fx, "Sales", TeamLevel::Department, &fx.corporate.id);
        add_team(&mut storage, &fx, "Alpha", TeamLevel::Team, &sales.id);
        add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);

        let names: Vec<String> = storage
            .list_teams(&fx.org.id, false)
            .unwrap()
            .into_iter()
            .map(|t| t.team.name)
            .collect();
        assert_eq!(names, vec!["Acme Corp", "Eng", "Sales", "Alpha"]);

        let corp = &storage.list_teams(&fx.org.id, false).unwrap()[0];
        assert_eq!(corp.counts.children, 2);
        assert_eq!(corp.counts.members, 1);
    }

    #[test]
    fn test_inactive_teams_hidden_by_default() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let dept = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);
        storage
            .update_team(
                &dept.id,
                &fx.org.id,
                TeamPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(storage.list_teams(&fx.org.id, false).unwrap().len(), 1);
        assert_eq!(storage.list_teams(&fx.org.id, true).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_blockers() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);

        let err = storage.delete_team(&fx.corporate.id, &fx.org.id).unwrap_err();
        assert!(matches!(err, Error::Conflict(m) if m == "Cannot delete team with members"));

        let dept = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);
        let team = add_team(&mut storage, &fx, "Platform", TeamLevel::Team, &dept.id);
        let err = storage.delete_team(&dept.id, &fx.org.id).unwrap_err();
        assert!(matches!(err, Error::Conflict(m) if m == "Cannot delete team with child teams"));

        add_goal_on(&mut storage, &fx, "Uptime", "2026", &team.id);
        let err = storage.delete_team(&team.id, &fx.org.id).unwrap_err();
        assert!(matches!(err, Error::Conflict(m) if m == "Cannot delete team with goals"));

        let empty = add_team(&mut storage, &fx, "Empty", TeamLevel::Team, &dept.id);
        storage.delete_team(&empty.id, &fx.org.id).unwrap();
        assert!(matches!(
            storage.get_team(&empty.id, &fx.org.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_get_team_detail() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let dept = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);
        storage
            .create_user(NewUser {
                organization_id: fx.org.id.clone(),
                email: "dev@acme.test".to_string(),
                first_name: "Dev".to_string(),
                last_name: "One".to_string(),
                title: None,
                role: UserRole::Contributor,
                team_id: Some(dept.id.clone()),
            })
            .unwrap();
        for i in 0..12 {
            add_goal_on(&mut storage, &fx, &format!("Goal {}", i), "2026", &dept.id);
        }

        let detail = storage.get_team(&dept.id, &fx.org.id).unwrap();
        assert_eq!(detail.parent.unwrap().id, fx.corporate.id);
        assert_eq!(detail.members.len(), 1);
        assert_eq!(detail.goals.len(), 10);
    }

    #[test]
    fn test_hierarchy_nests() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let dept = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);
        add_team(&mut storage, &fx, "Platform", TeamLevel::Team, &dept.id);

        let forest = storage.team_hierarchy(&fx.org.id).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children[0].children[0].team.name, "Platform");
    }
}
