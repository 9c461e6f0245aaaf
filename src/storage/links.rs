//! Goal link store, hierarchy walk and alignment map.
//!
//! Links are never checked for cycles when written. The hierarchy walk goes
//! through [`LinkSource`], which carries the visited-set guard, and issues one
//! query per goal it enters.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::goals::{GOAL_COLUMNS, GOALS_IN_ORG, row_to_goal};
use super::teams::LEVEL_RANK_SQL;
use super::{Storage, new_id, parse_time};
use crate::models::graph::{self, GoalHierarchy, HierarchyNode, LinkSource, Neighbor};
use crate::models::{
    CandidateGoal, ChildRef, Goal, GoalLink, GoalSummary, GoalsMap, LinkedGoal, MapGoal,
    MeasureSummary, ParentRef,
};
use crate::{Error, Result};

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<GoalLink> {
    let created_at: String = row.get(4)?;
    Ok(GoalLink {
        id: row.get(0)?,
        parent_goal_id: row.get(1)?,
        child_goal_id: row.get(2)?,
        contribution_weight: row.get(3)?,
        created_at: parse_time(&created_at),
    })
}

fn validate_weight(weight: f64) -> Result<()> {
    if weight.is_finite() && (0.0..=1.0).contains(&weight) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(
            "Contribution weight must be between 0 and 1".to_string(),
        ))
    }
}

impl LinkSource for Storage {
    fn parents_of(&self, goal_id: &str) -> Result<Vec<Neighbor>> {
        let mut stmt = self.conn.prepare(
            "SELECT parent_goal_id, contribution_weight FROM goal_links
             WHERE child_goal_id = ?1 ORDER BY rowid",
        )?;
        let neighbors = stmt
            .query_map([goal_id], |row| {
                Ok(Neighbor {
                    goal_id: row.get(0)?,
                    contribution_weight: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(neighbors)
    }

    fn children_of(&self, goal_id: &str) -> Result<Vec<Neighbor>> {
        let mut stmt = self.conn.prepare(
            "SELECT child_goal_id, contribution_weight FROM goal_links
             WHERE parent_goal_id = ?1 ORDER BY rowid",
        )?;
        let neighbors = stmt
            .query_map([goal_id], |row| {
                Ok(Neighbor {
                    goal_id: row.get(0)?,
                    contribution_weight: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(neighbors)
    }
}

impl Storage {
    // === Link Store ===

    /// Create the link `parent -> child`, or re-weight it if it exists.
    pub fn link_goals(
        &mut self,
        org_id: &str,
        parent_id: &str,
        child_id: &str,
        weight: f64,
    ) -> Result<GoalLink> {
        for id in [parent_id, child_id] {
            match self.get_goal(id, org_id) {
                Ok(_) => {}
                Err(Error::NotFound(_)) => {
                    return Err(Error::NotFound("One or both goals not found".to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        if parent_id == child_id {
            return Err(Error::InvalidArgument(
                "Cannot link a goal to itself".to_string(),
            ));
        }
        validate_weight(weight)?;

        self.conn.execute(
            "INSERT INTO goal_links (id, parent_goal_id, child_goal_id, contribution_weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (parent_goal_id, child_goal_id)
             DO UPDATE SET contribution_weight = excluded.contribution_weight",
            params![new_id(), parent_id, child_id, weight, Utc::now().to_rfc3339()],
        )?;

        let link = self.conn.query_row(
            "SELECT id, parent_goal_id, child_goal_id, contribution_weight, created_at
             FROM goal_links WHERE parent_goal_id = ?1 AND child_goal_id = ?2",
            params![parent_id, child_id],
            row_to_link,
        )?;
        tracing::info!(parent = parent_id, child = child_id, weight, "linked goals");
        Ok(link)
    }

    /// Remove the link `parent -> child`.
    pub fn unlink_goals(&mut self, org_id: &str, parent_id: &str, child_id: &str) -> Result<()> {
        let link_id: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT l.id FROM goal_links l
                     JOIN {} ON l.parent_goal_id = g.id
                     WHERE l.parent_goal_id = ?1 AND l.child_goal_id = ?2 AND t.organization_id = ?3",
                    GOALS_IN_ORG
                ),
                params![parent_id, child_id, org_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(link_id) = link_id else {
            return Err(Error::NotFound("Link not found".to_string()));
        };
        self.conn
            .execute("DELETE FROM goal_links WHERE id = ?1", [link_id])?;
        tracing::info!(parent = parent_id, child = child_id, "unlinked goals");
        Ok(())
    }

    /// Links touching a goal, each with the goal at the other end.
    pub(crate) fn linked_goals(&self, goal_id: &str, parents: bool) -> Result<Vec<LinkedGoal>> {
        let (this_end, other_end) = if parents {
            ("child_goal_id", "parent_goal_id")
        } else {
            ("parent_goal_id", "child_goal_id")
        };
        let sql = format!(
            "SELECT l.id, l.parent_goal_id, l.child_goal_id, l.contribution_weight, l.created_at,
                    g.id, g.title, g.progress, g.status
             FROM goal_links l JOIN goals g ON g.id = l.{other}
             WHERE l.{this} = ?1 ORDER BY l.rowid",
            other = other_end,
            this = this_end
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let linked = stmt
            .query_map([goal_id], |row| {
                Ok(LinkedGoal {
                    link: row_to_link(row)?,
                    goal: GoalSummary {
                        id: row.get(5)?,
                        title: row.get(6)?,
                        progress: row.get(7)?,
                        status: super::enum_column(row, 8)?,
                    },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(linked)
    }

    // === Hierarchy ===

    fn hierarchy_node(&self, goal: &Goal, weight: Option<f64>) -> Result<HierarchyNode> {
        Ok(HierarchyNode {
            id: goal.id.clone(),
            title: goal.title.clone(),
            progress: goal.progress,
            status: goal.status,
            team: self.team_summary(&goal.team_id)?,
            owner: self.owner_summary(&goal.owner_id)?,
            contribution_weight: weight,
        })
    }

    fn hydrate(&self, found: Vec<Neighbor>) -> Result<Vec<HierarchyNode>> {
        let mut cache: HashMap<String, Goal> = HashMap::new();
        let mut nodes = Vec::with_capacity(found.len());
        for neighbor in found {
            if !cache.contains_key(&neighbor.goal_id) {
                let goal = self.conn.query_row(
                    &format!("SELECT {} FROM goals g WHERE g.id = ?1", GOAL_COLUMNS),
                    [&neighbor.goal_id],
                    row_to_goal,
                )?;
                cache.insert(neighbor.goal_id.clone(), goal);
            }
            if let Some(goal) = cache.get(&neighbor.goal_id) {
                nodes.push(self.hierarchy_node(goal, Some(neighbor.contribution_weight))?);
            }
        }
        Ok(nodes)
    }

    /// Ancestors (root first) and descendants of a goal.
    pub fn goal_hierarchy(&self, goal_id: &str, org_id: &str) -> Result<GoalHierarchy> {
        let goal = self.get_goal(goal_id, org_id)?;
        let current = self.hierarchy_node(&goal, None)?;
        let ancestors = self.hydrate(graph::ancestors(self, goal_id)?)?;
        let descendants = self.hydrate(graph::descendants(self, goal_id)?)?;
        Ok(GoalHierarchy {
            current,
            ancestors,
            descendants,
        })
    }

    // === Alignment Map ===

    /// Flat snapshot of every goal (optionally one period) and the links
    /// whose parent is in the snapshot.
    pub fn goals_map(&self, org_id: &str, period: Option<&str>) -> Result<GoalsMap> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE t.organization_id = ?1",
            GOAL_COLUMNS, GOALS_IN_ORG
        );
        if period.is_some() {
            sql.push_str(" AND g.period = ?2");
        }
        sql.push_str(&format!(" ORDER BY {}, g.title", LEVEL_RANK_SQL));

        let mut stmt = self.conn.prepare(&sql)?;
        let goals = match period {
            Some(p) => stmt.query_map(params![org_id, p], row_to_goal)?,
            None => stmt.query_map(params![org_id], row_to_goal)?,
        }
        .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut map_goals = Vec::with_capacity(goals.len());
        for goal in goals {
            let measures = self
                .list_measures(&goal.id)?
                .into_iter()
                .map(|m| MeasureSummary {
                    id: m.id,
                    title: m.title,
                    progress: m.progress,
                })
                .collect();
            let parent_links = self
                .parents_of(&goal.id)?
                .into_iter()
                .map(|n| ParentRef {
                    parent_goal_id: n.goal_id,
                    contribution_weight: n.contribution_weight,
                })
                .collect();
            let child_links = self
                .children_of(&goal.id)?
                .into_iter()
                .map(|n| ChildRef {
                    child_goal_id: n.goal_id,
                    contribution_weight: n.contribution_weight,
                })
                .collect();
            map_goals.push(MapGoal {
                team: self.team_summary(&goal.team_id)?,
                owner: self.owner_summary(&goal.owner_id)?,
                goal,
                measures,
                parent_links,
                child_links,
            });
        }

        let mut link_sql = format!(
            "SELECT l.id, l.parent_goal_id, l.child_goal_id, l.contribution_weight, l.created_at
             FROM goal_links l JOIN {} ON l.parent_goal_id = g.id
             WHERE t.organization_id = ?1",
            GOALS_IN_ORG
        );
        if period.is_some() {
            link_sql.push_str(" AND g.period = ?2");
        }
        link_sql.push_str(" ORDER BY l.rowid");
        let mut stmt = self.conn.prepare(&link_sql)?;
        let links = match period {
            Some(p) => stmt.query_map(params![org_id, p], row_to_link)?,
            None => stmt.query_map(params![org_id], row_to_link)?,
        }
        .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(GoalsMap {
            goals: map_goals,
            links,
        })
    }

    /// Goals that could still become a direct parent of `goal_id`: same
    /// organization and period, not itself, not already a direct parent.
    ///
    /// Transitive ancestors and descendants are *not* excluded.
    pub fn available_parents(&self, goal_id: &str, org_id: &str) -> Result<Vec<CandidateGoal>> {
        let goal = self.get_goal(goal_id, org_id)?;
        let sql = format!(
            "SELECT {} FROM {}
             WHERE t.organization_id = ?1 AND g.period = ?2 AND g.id != ?3
               AND g.id NOT IN (SELECT parent_goal_id FROM goal_links WHERE child_goal_id = ?3)
             ORDER BY {}, g.title",
            GOAL_COLUMNS, GOALS_IN_ORG, LEVEL_RANK_SQL
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params![org_id, goal.period, goal_id], row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        goals
            .into_iter()
            .map(|g| {
                Ok(CandidateGoal {
                    team: self.team_summary(&g.team_id)?,
                    owner: self.owner_summary(&g.owner_id)?,
                    goal: g,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;
    use crate::models::TeamLevel;
    use crate::models::graph::{AlignmentGraph, LinkSource, ancestors};
    use crate::test_utils::{TestEnv, add_goal, add_goal_on, add_measure, add_team, seed};

    #[test]
    fn test_link_is_upsert() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");
        let b = add_goal(&mut storage, &fx, "B", "2026");

        let first = storage.link_goals(&fx.org.id, &a.id, &b.id, 0.3).unwrap();
        let second = storage.link_goals(&fx.org.id, &a.id, &b.id, 0.8).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.contribution_weight, 0.8);
        assert_eq!(storage.children_of(&a.id).unwrap().len(), 1);
    }

    #[test]
    fn test_self_link_rejected() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");

        let err = storage.link_goals(&fx.org.id, &a.id, &a.id, 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(m) if m == "Cannot link a goal to itself"));
    }

    #[test]
    fn test_database_failure_is_not_reported_as_missing_goal() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");
        let b = add_goal(&mut storage, &fx, "B", "2026");
        storage
            .conn
            .execute_batch("ALTER TABLE goals RENAME TO goals_moved")
            .unwrap();

        let err = storage.link_goals(&fx.org.id, &a.id, &b.id, 1.0).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_missing_goal_checked_before_self_link() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);

        let err = storage.link_goals(&fx.org.id, "ghost", "ghost", 1.0).unwrap_err();
        assert!(matches!(err, Error::NotFound(m) if m == "One or both goals not found"));
    }

    #[test]
    fn test_link_across_tenants_not_found() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");

        let other = storage.create_organization("Other", "other").unwrap();
        let err = storage.link_goals(&other.id, &a.id, &a.id, 1.0).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_weight_bounds() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");
        let b = add_goal(&mut storage, &fx, "B", "2026");

        assert!(storage.link_goals(&fx.org.id, &a.id, &b.id, 1.5).is_err());
        assert!(storage.link_goals(&fx.org.id, &a.id, &b.id, -0.1).is_err());
        assert!(storage.link_goals(&fx.org.id, &a.id, &b.id, 0.0).is_ok());
    }

    #[test]
    fn test_unlink_missing_edge_leaves_edges_unchanged() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");
        let b = add_goal(&mut storage, &fx, "B", "2026");
        storage.link_goals(&fx.org.id, &a.id, &b.id, 1.0).unwrap();

        let err = storage.unlink_goals(&fx.org.id, &b.id, &a.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(m) if m == "Link not found"));
        assert_eq!(storage.children_of(&a.id).unwrap().len(), 1);

        storage.unlink_goals(&fx.org.id, &a.id, &b.id).unwrap();
        assert!(storage.children_of(&a.id).unwrap().is_empty());
    }

    #[test]
    fn test_hierarchy_with_weights() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let p = add_goal(&mut storage, &fx, "P", "2026");
        let g = add_goal(&mut storage, &fx, "G", "2026");
        let m1 = add_measure(&mut storage, &fx, &g.id, "M1", 0.0, 100.0);
        let m2 = add_measure(&mut storage, &fx, &g.id, "M2", 0.0, 100.0);
        storage
            .record_measure_update(&m1.id, &fx.org.id, &fx.admin.id, 100.0, None)
            .unwrap();
        storage
            .record_measure_update(&m2.id, &fx.org.id, &fx.admin.id, 40.0, None)
            .unwrap();
        storage.link_goals(&fx.org.id, &p.id, &g.id, 0.5).unwrap();

        let up = storage.goal_hierarchy(&g.id, &fx.org.id).unwrap();
        assert_eq!(up.current.progress, 70.0);
        assert!(up.current.contribution_weight.is_none());
        assert_eq!(up.ancestors.len(), 1);
        assert_eq!(up.ancestors[0].id, p.id);
        assert_eq!(up.ancestors[0].contribution_weight, Some(0.5));
        assert_eq!(up.ancestors[0].owner.id, fx.admin.id);

        let down = storage.goal_hierarchy(&p.id, &fx.org.id).unwrap();
        assert_eq!(down.descendants.len(), 1);
        assert_eq!(down.descendants[0].id, g.id);
        assert_eq!(down.descendants[0].contribution_weight, Some(0.5));
    }

    #[test]
    fn test_cycle_in_store_terminates() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let a = add_goal(&mut storage, &fx, "A", "2026");
        let b = add_goal(&mut storage, &fx, "B", "2026");
        storage.link_goals(&fx.org.id, &a.id, &b.id, 1.0).unwrap();
        storage.link_goals(&fx.org.id, &b.id, &a.id, 1.0).unwrap();

        let h = storage.goal_hierarchy(&a.id, &fx.org.id).unwrap();
        let up: Vec<&str> = h.ancestors.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(up, vec![a.id.as_str(), b.id.as_str()]);
        assert_eq!(h.descendants.len(), 2);
    }

    #[test]
    fn test_map_snapshot_and_rebuild() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let team = add_team(&mut storage, &fx, "Eng", TeamLevel::Department, &fx.corporate.id);
        let corp = add_goal(&mut storage, &fx, "Corp", "2026");
        let eng = add_goal_on(&mut storage, &fx, "Eng", "2026", &team.id);
        let other = add_goal(&mut storage, &fx, "Other", "2027");
        storage.link_goals(&fx.org.id, &corp.id, &eng.id, 0.7).unwrap();
        storage.link_goals(&fx.org.id, &other.id, &eng.id, 0.2).unwrap();
        add_measure(&mut storage, &fx, &eng.id, "M", 0.0, 1.0);

        let map = storage.goals_map(&fx.org.id, Some("2026")).unwrap();
        assert_eq!(map.goals.len(), 2);
        assert_eq!(map.goals[0].goal.id, corp.id);
        assert_eq!(map.goals[1].measures.len(), 1);
        assert_eq!(map.goals[1].parent_links.len(), 2);
        // only links whose parent is in the period
        assert_eq!(map.links.len(), 1);
        assert_eq!(map.links[0].contribution_weight, 0.7);

        let graph = AlignmentGraph::from_map(&map);
        let up = ancestors(&graph, &eng.id).unwrap();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].goal_id, corp.id);

        let all = storage.goals_map(&fx.org.id, None).unwrap();
        assert_eq!(all.goals.len(), 3);
        assert_eq!(all.links.len(), 2);
    }

    #[test]
    fn test_available_parents_excludes_self_and_direct_parents_only() {
        let env = TestEnv::new();
        let mut storage = env.open_storage();
        let fx = seed(&mut storage);
        let root = add_goal(&mut storage, &fx, "Root", "2026");
        let mid = add_goal(&mut storage, &fx, "Mid", "2026");
        let leaf = add_goal(&mut storage, &fx, "Leaf", "2026");
        add_goal(&mut storage, &fx, "Next year", "2027");
        storage.link_goals(&fx.org.id, &root.id, &mid.id, 1.0).unwrap();
        storage.link_goals(&fx.org.id, &mid.id, &leaf.id, 1.0).unwrap();

        let ids: Vec<String> = storage
            .available_parents(&leaf.id, &fx.org.id)
            .unwrap()
            .into_iter()
            .map(|c| c.goal.id)
            .collect();
        assert!(!ids.contains(&leaf.id));
        assert!(!ids.contains(&mid.id));
        // transitive ancestor is still offered
        assert!(ids.contains(&root.id));
        assert_eq!(ids.len(), 1);
    }
}
