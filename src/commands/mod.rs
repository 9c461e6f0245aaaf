//! Command implementations for the Bearing CLI.
//!
//! Each command returns a result type implementing [`Output`] so
//! `main` can print it as JSON (the default) or as text with `-H`.
//! Commands other than `init` and `config show` expect the database to exist.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::models::{NewTeam, NewUser, Organization, Team, TeamLevel, TeamListItem, User, UserRole};
use crate::reports::{self, Report};
use crate::storage::Storage;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Open a database created by `bearing init`.
fn open_initialized(db: &Path) -> Result<Storage> {
    if !Storage::exists(db) {
        return Err(Error::NotFound(format!(
            "No database at {}. Run `bearing init` first.",
            db.display()
        )));
    }
    Storage::open(db)
}

/// Find an organization by slug, falling back to id.
fn find_org(storage: &Storage, key: &str) -> Result<Organization> {
    match storage.get_organization_by_slug(key) {
        Err(Error::NotFound(_)) => storage.get_organization(key),
        other => other,
    }
}

/// Lowercase ASCII handle with runs of other characters collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

// === init ===

#[derive(Serialize)]
pub struct InitResult {
    pub database: PathBuf,
    pub created: bool,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.created {
            format!("Initialized database at {}", self.database.display())
        } else {
            format!("Database already initialized at {}", self.database.display())
        }
    }
}

/// Create the database and apply the schema. Idempotent.
pub fn init(db: &Path) -> Result<InitResult> {
    let created = !Storage::exists(db);
    Storage::open(db)?;
    Ok(InitResult {
        database: db.to_path_buf(),
        created,
    })
}

// === org ===

impl Output for Organization {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Organization {} ({})\n  id: {}", self.name, self.slug, self.id)
    }
}

#[derive(Serialize)]
pub struct OrgList {
    pub organizations: Vec<Organization>,
    pub count: usize,
}

impl Output for OrgList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.organizations.is_empty() {
            return "No organizations.".to_string();
        }
        self.organizations
            .iter()
            .map(|o| format!("{}  {}  {}", o.id, o.slug, o.name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn org_create(db: &Path, name: &str, slug: Option<String>) -> Result<Organization> {
    let slug = slug.unwrap_or_else(|| slugify(name));
    let mut storage = open_initialized(db)?;
    storage.create_organization(name, &slug)
}

pub fn org_list(db: &Path) -> Result<OrgList> {
    let storage = open_initialized(db)?;
    let organizations = storage.list_organizations()?;
    Ok(OrgList {
        count: organizations.len(),
        organizations,
    })
}

// === team ===

impl Output for Team {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Team {} [{}]\n  id: {}", self.name, self.level, self.id);
        if let Some(parent) = &self.parent_id {
            out.push_str(&format!("\n  parent: {}", parent));
        }
        out
    }
}

#[derive(Serialize)]
pub struct TeamList {
    pub teams: Vec<TeamListItem>,
    pub count: usize,
}

impl Output for TeamList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.teams.is_empty() {
            return "No teams.".to_string();
        }
        self.teams
            .iter()
            .map(|t| {
                format!(
                    "{}  {:<10}  {}  ({} members, {} goals)",
                    t.team.id, t.team.level, t.team.name, t.counts.members, t.counts.goals
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn team_create(
    db: &Path,
    org: &str,
    name: String,
    level: TeamLevel,
    parent_id: Option<String>,
    description: Option<String>,
) -> Result<Team> {
    let mut storage = open_initialized(db)?;
    let org = find_org(&storage, org)?;
    storage.create_team(
        &org.id,
        NewTeam {
            name,
            description,
            level,
            parent_id,
        },
    )
}

pub fn team_list(db: &Path, org: &str, include_inactive: bool) -> Result<TeamList> {
    let storage = open_initialized(db)?;
    let org = find_org(&storage, org)?;
    let teams = storage.list_teams(&org.id, include_inactive)?;
    Ok(TeamList {
        count: teams.len(),
        teams,
    })
}

// === user ===

impl Output for User {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{} <{}> [{}]\n  id: {}",
            self.full_name(),
            self.email,
            self.role,
            self.id
        )
    }
}

#[derive(Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub count: usize,
}

impl Output for UserList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.users.is_empty() {
            return "No users.".to_string();
        }
        self.users
            .iter()
            .map(|u| {
                let inactive = if u.is_active { "" } else { "  (inactive)" };
                format!("{}  {:<11}  {}{}", u.email, u.role, u.full_name(), inactive)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fields for `user create`.
#[derive(Debug, Clone)]
pub struct UserSpec {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub team_id: Option<String>,
    pub title: Option<String>,
}

pub fn user_create(db: &Path, org: &str, spec: UserSpec) -> Result<User> {
    let mut storage = open_initialized(db)?;
    let org = find_org(&storage, org)?;
    storage.create_user(NewUser {
        organization_id: org.id,
        email: spec.email,
        first_name: spec.first_name,
        last_name: spec.last_name,
        title: spec.title,
        role: spec.role,
        team_id: spec.team_id,
    })
}

pub fn user_list(db: &Path, org: &str) -> Result<UserList> {
    let storage = open_initialized(db)?;
    let org = find_org(&storage, org)?;
    let users = storage.list_users(&org.id)?;
    Ok(UserList {
        count: users.len(),
        users,
    })
}

// === token ===

#[derive(Serialize)]
pub struct TokenIssued {
    pub user_id: String,
    pub email: String,
    pub token: String,
}

impl Output for TokenIssued {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Token for {} (shown once, store it now):\n{}",
            self.email, self.token
        )
    }
}

#[derive(Serialize)]
pub struct TokensRevoked {
    pub email: String,
    pub revoked: usize,
}

impl Output for TokensRevoked {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Revoked {} token(s) for {}", self.revoked, self.email)
    }
}

pub fn token_issue(db: &Path, email: &str) -> Result<TokenIssued> {
    let mut storage = open_initialized(db)?;
    let user = storage.get_user_by_email(email)?;
    if !user.is_active {
        return Err(Error::InvalidArgument(format!("User {} is inactive", user.email)));
    }
    let token = storage.issue_token(&user.id)?;
    tracing::info!(user = %user.email, "issued API token");
    Ok(TokenIssued {
        user_id: user.id,
        email: user.email,
        token,
    })
}

pub fn token_revoke(db: &Path, email: &str) -> Result<TokensRevoked> {
    let mut storage = open_initialized(db)?;
    let user = storage.get_user_by_email(email)?;
    let revoked = storage.revoke_tokens(&user.id)?;
    Ok(TokensRevoked {
        email: user.email,
        revoked,
    })
}

// === report ===

impl Output for Report {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        reports::render_text(self)
    }
}

pub fn report_quarterly(db: &Path, org: &str, quarter: &str) -> Result<Report> {
    let storage = open_initialized(db)?;
    let org = find_org(&storage, org)?;
    Ok(Report::Quarterly(reports::quarterly_report(
        &storage, &org.id, quarter,
    )?))
}

pub fn report_annual(db: &Path, org: &str, year: i32) -> Result<Report> {
    let storage = open_initialized(db)?;
    let org = find_org(&storage, org)?;
    Ok(Report::Annual(reports::annual_report(&storage, &org.id, year)?))
}

// === config ===

impl Output for ResolvedConfig {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("config file: {}", self.config_path.display()),
            format!(
                "database:    {} ({})",
                self.database.value.display(),
                self.database.source
            ),
            format!("host:        {} ({})", self.host.value, self.host.source),
            format!("port:        {} ({})", self.port.value, self.port.source),
            format!(
                "llm:         {} ({})",
                self.llm.provider.value, self.llm.provider.source
            ),
            format!("model:       {} ({})", self.llm.model.value, self.llm.model.source),
            format!(
                "api key:     {}",
                if self.llm.api_key_set { "set" } else { "not set" }
            ),
            format!("log level:   {} ({})", self.log_level.value, self.log_level.source),
        ];
        if !self.cors_origins.is_empty() {
            lines.push(format!("cors:        {}", self.cors_origins.join(", ")));
        }
        if let Some(file) = &self.log_file {
            lines.push(format!("log file:    {}", file.display()));
        }
        lines.join("\n")
    }
}

// === serve ===

/// Run the HTTP API on a fresh multi-threaded runtime until Ctrl-C.
pub fn serve(config: &ResolvedConfig) -> Result<()> {
    open_initialized(&config.database.value)?;
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create runtime: {}", e)))?
        .block_on(crate::server::start_server(config))
}
