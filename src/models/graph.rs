//! Graph walks over the goal alignment graph and the team tree.
//!
//! Goal links form a directed graph that is *allowed* to contain cycles: link
//! writes never check for them. Every walk here therefore carries a visited
//! set and terminates on any input. The walk is written once against the
//! [`LinkSource`] trait so it runs the same way against SQLite and against the
//! in-memory [`AlignmentGraph`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{
    GoalLink, GoalStatus, GoalsMap, OwnerSummary, Team, TeamCounts, TeamListItem, TeamNode,
    TeamSummary,
};
use crate::Result;

/// A goal adjacent to another through one link.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub goal_id: String,
    pub contribution_weight: f64,
}

/// Anything that can answer "who are the direct parents / children of this goal".
pub trait LinkSource {
    /// Goals that `goal_id` contributes to.
    fn parents_of(&self, goal_id: &str) -> Result<Vec<Neighbor>>;

    /// Goals that contribute to `goal_id`.
    fn children_of(&self, goal_id: &str) -> Result<Vec<Neighbor>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Every ancestor of `goal_id`, farthest root first.
///
/// A goal reached through more than one link appears once per link, but its
/// own parents are only explored the first time it is entered. In a cycle the
/// starting goal can appear in its own ancestor list.
pub fn ancestors<S: LinkSource + ?Sized>(source: &S, goal_id: &str) -> Result<Vec<Neighbor>> {
    let mut found = walk(source, goal_id, Direction::Up)?;
    found.reverse();
    Ok(found)
}

/// Every descendant of `goal_id`, in depth-first discovery order.
pub fn descendants<S: LinkSource + ?Sized>(source: &S, goal_id: &str) -> Result<Vec<Neighbor>> {
    walk(source, goal_id, Direction::Down)
}

fn walk<S: LinkSource + ?Sized>(
    source: &S,
    start: &str,
    direction: Direction,
) -> Result<Vec<Neighbor>> {
    let step = |id: &str| match direction {
        Direction::Up => source.parents_of(id),
        Direction::Down => source.children_of(id),
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut found = Vec::new();

    visited.insert(start.to_string());
    let mut stack = vec![step(start)?.into_iter()];

    loop {
        let next = match stack.last_mut() {
            Some(frame) => frame.next(),
            None => break,
        };
        match next {
            Some(neighbor) => {
                let enter = visited.insert(neighbor.goal_id.clone());
                let id = neighbor.goal_id.clone();
                found.push(neighbor);
                if enter {
                    stack.push(step(&id)?.into_iter());
                }
            }
            None => {
                stack.pop();
            }
        }
    }

    tracing::debug!(
        start,
        ?direction,
        visited = visited.len(),
        emitted = found.len(),
        "goal graph walk finished"
    );
    Ok(found)
}

/// In-memory alignment graph.
///
/// Goals live in an arena indexed by position; edges refer to arena slots, so
/// there are no back-pointers and cycles are harmless to hold.
#[derive(Debug, Clone, Default)]
pub struct AlignmentGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    parents: Vec<Vec<(usize, f64)>>,
    children: Vec<Vec<(usize, f64)>>,
}

impl AlignmentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the graph from an alignment map snapshot.
    ///
    /// Links that mention a goal outside the snapshot still add the goal as
    /// a bare node, so the walk sees every edge the server returned.
    pub fn from_map(map: &GoalsMap) -> Self {
        let mut graph = Self::new();
        for goal in &map.goals {
            graph.add_goal(&goal.goal.id);
        }
        for link in &map.links {
            graph.link(&link.parent_goal_id, &link.child_goal_id, link.contribution_weight);
        }
        graph
    }

    pub fn from_links<'a>(links: impl IntoIterator<Item = &'a GoalLink>) -> Self {
        let mut graph = Self::new();
        for link in links {
            graph.link(&link.parent_goal_id, &link.child_goal_id, link.contribution_weight);
        }
        graph
    }

    /// Add a goal if absent and return its arena slot.
    pub fn add_goal(&mut self, id: &str) -> usize {
        if let Some(&slot) = self.index.get(id) {
            return slot;
        }
        let slot = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), slot);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        slot
    }

    /// Insert or re-weight the edge `parent -> child`.
    pub fn link(&mut self, parent: &str, child: &str, weight: f64) {
        let p = self.add_goal(parent);
        let c = self.add_goal(child);

        match self.children[p].iter_mut().find(|(slot, _)| *slot == c) {
            Some(edge) => edge.1 = weight,
            None => self.children[p].push((c, weight)),
        }
        match self.parents[c].iter_mut().find(|(slot, _)| *slot == p) {
            Some(edge) => edge.1 = weight,
            None => self.parents[c].push((p, weight)),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.children.iter().map(Vec::len).sum()
    }

    fn neighbors(&self, id: &str, edges: &[Vec<(usize, f64)>]) -> Vec<Neighbor> {
        match self.index.get(id) {
            Some(&slot) => edges[slot]
                .iter()
                .map(|&(other, weight)| Neighbor {
                    goal_id: self.ids[other].clone(),
                    contribution_weight: weight,
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

impl LinkSource for AlignmentGraph {
    fn parents_of(&self, goal_id: &str) -> Result<Vec<Neighbor>> {
        Ok(self.neighbors(goal_id, &self.parents))
    }

    fn children_of(&self, goal_id: &str) -> Result<Vec<Neighbor>> {
        Ok(self.neighbors(goal_id, &self.children))
    }
}

/// A goal as it appears in a hierarchy response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub id: String,
    pub title: String,
    pub progress: f64,
    pub status: GoalStatus,
    pub team: TeamSummary,
    pub owner: OwnerSummary,
    /// Weight of the link that reached this node; absent on the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_weight: Option<f64>,
}

/// Ancestors and descendants of one goal.
#[derive(Debug, Clone, Serialize)]
pub struct GoalHierarchy {
    pub current: HierarchyNode,
    pub ancestors: Vec<HierarchyNode>,
    pub descendants: Vec<HierarchyNode>,
}

/// Build the team forest from a flat list.
///
/// Roots are teams without a parent. A team whose parent is not in the list
/// is dropped together with its subtree. Sibling order follows input order.
pub fn team_forest(teams: Vec<TeamListItem>) -> Vec<TeamNode> {
    let known: HashSet<String> = teams.iter().map(|t| t.team.id.clone()).collect();
    let mut by_parent: HashMap<String, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (i, item) in teams.iter().enumerate() {
        match &item.team.parent_id {
            None => roots.push(i),
            Some(parent) if known.contains(parent) => {
                by_parent.entry(parent.clone()).or_default().push(i)
            }
            Some(_) => {}
        }
    }

    let mut slots: Vec<Option<(Team, TeamCounts)>> = teams
        .into_iter()
        .map(|item| Some((item.team, item.counts)))
        .collect();

    roots
        .into_iter()
        .filter_map(|i| build_team_node(i, &mut slots, &by_parent))
        .collect()
}

fn build_team_node(
    slot: usize,
    slots: &mut [Option<(Team, TeamCounts)>],
    by_parent: &HashMap<String, Vec<usize>>,
) -> Option<TeamNode> {
    let (team, counts) = slots[slot].take()?;
    let children = by_parent
        .get(&team.id)
        .map(|kids| {
            kids.iter()
                .filter_map(|&k| build_team_node(k, slots, by_parent))
                .collect()
        })
        .unwrap_or_default();
    Some(TeamNode {
        team,
        counts,
        children,
    })
}
