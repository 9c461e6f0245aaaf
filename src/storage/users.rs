//! Organizations, users and API tokens.

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use sha2::{Digest, Sha256};

use super::{Storage, enum_column, new_id, not_found, parse_opt_time, parse_time, unique_conflict};
use crate::models::{NewUser, Organization, Principal, User, UserPatch, UserRole};
use crate::{Error, Result};

const USER_COLUMNS: &str = "u.id, u.organization_id, u.email, u.first_name, u.last_name, u.title, \
     u.role, u.team_id, u.manager_id, u.is_active, u.last_login_at, u.created_at";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let is_active: i32 = row.get(9)?;
    let created_at: String = row.get(11)?;
    Ok(User {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        title: row.get(5)?,
        role: enum_column(row, 6)?,
        team_id: row.get(7)?,
        manager_id: row.get(8)?,
        is_active: is_active != 0,
        last_login_at: parse_opt_time(row.get(10)?),
        created_at: parse_time(&created_at),
    })
}

fn row_to_org(row: &Row<'_>) -> rusqlite::Result<Organization> {
    let created_at: String = row.get(3)?;
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: parse_time(&created_at),
    })
}

/// SHA-256 hex digest of a plaintext token.
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Storage {
    // === Organization Operations ===

    pub fn create_organization(&mut self, name: &str, slug: &str) -> Result<Organization> {
        if name.trim().is_empty() || slug.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "Organization name and slug are required".to_string(),
            ));
        }
        let org = Organization {
            id: new_id(),
            name: name.trim().to_string(),
            slug: slug.trim().to_lowercase(),
            created_at: Utc::now(),
        };
        unique_conflict(
            self.conn.execute(
                "INSERT INTO organizations (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![org.id, org.name, org.slug, org.created_at.to_rfc3339()],
            ),
            "Organization slug already in use",
        )?;
        tracing::info!(org = %org.slug, "created organization");
        Ok(org)
    }

    pub fn get_organization(&self, id: &str) -> Result<Organization> {
        not_found(
            self.conn.query_row(
                "SELECT id, name, slug, created_at FROM organizations WHERE id = ?1",
                [id],
                row_to_org,
            ),
            "Organization not found",
        )
    }

    pub fn get_organization_by_slug(&self, slug: &str) -> Result<Organization> {
        not_found(
            self.conn.query_row(
                "SELECT id, name, slug, created_at FROM organizations WHERE slug = ?1",
                [slug.to_lowercase()],
                row_to_org,
            ),
            "Organization not found",
        )
    }

    pub fn list_organizations(&self) -> Result<Vec<Organization>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, created_at FROM organizations ORDER BY name")?;
        let orgs = stmt
            .query_map([], row_to_org)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orgs)
    }

    // === User Operations ===

    pub fn create_user(&mut self, input: NewUser) -> Result<User> {
        let email = input.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(Error::InvalidArgument(format!("Invalid email: {}", input.email)));
        }
        if input.first_name.trim().is_empty() || input.last_name.trim().is_empty() {
            return Err(Error::InvalidArgument("First and last name are required".to_string()));
        }
        self.get_organization(&input.organization_id)?;
        if let Some(team_id) = &input.team_id {
            self.get_team_row(team_id, &input.organization_id)?;
        }

        let user = User {
            id: new_id(),
            organization_id: input.organization_id,
            email,
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            title: input.title,
            role: input.role,
            team_id: input.team_id,
            manager_id: None,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        };

        unique_conflict(
            self.conn.execute(
                "INSERT INTO users (id, organization_id, email, first_name, last_name, title, role, team_id, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
                params![
                    user.id,
                    user.organization_id,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.title,
                    user.role.as_str(),
                    user.team_id,
                    user.created_at.to_rfc3339(),
                ],
            ),
            "Email already registered",
        )?;
        tracing::info!(user = %user.email, role = %user.role, "created user");
        Ok(user)
    }

    /// Get a user within an organization.
    pub fn get_user(&self, id: &str, org_id: &str) -> Result<User> {
        not_found(
            self.conn.query_row(
                &format!(
                    "SELECT {} FROM users u WHERE u.id = ?1 AND u.organization_id = ?2",
                    USER_COLUMNS
                ),
                params![id, org_id],
                row_to_user,
            ),
            "User not found",
        )
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        not_found(
            self.conn.query_row(
                &format!("SELECT {} FROM users u WHERE u.email = ?1", USER_COLUMNS),
                [email.trim().to_lowercase()],
                row_to_user,
            ),
            "User not found",
        )
    }

    /// Active and inactive users of an organization, by name.
    pub fn list_users(&self, org_id: &str) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users u WHERE u.organization_id = ?1 ORDER BY u.last_name, u.first_name",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([org_id], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn update_user(&mut self, id: &str, org_id: &str, patch: UserPatch) -> Result<User> {
        let mut user = self.get_user(id, org_id)?;

        if let Some(team_id) = &patch.team_id {
            self.get_team_row(team_id, org_id)?;
            user.team_id = Some(team_id.clone());
        }
        if let Some(manager_id) = &patch.manager_id {
            if manager_id == id {
                return Err(Error::InvalidArgument(
                    "A user cannot be their own manager".to_string(),
                ));
            }
            self.get_user(manager_id, org_id)?;
            user.manager_id = Some(manager_id.clone());
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(title) = patch.title {
            user.title = Some(title);
        }
        if let Some(active) = patch.is_active {
            user.is_active = active;
        }

        self.conn.execute(
            "UPDATE users SET title = ?2, role = ?3, team_id = ?4, manager_id = ?5, is_active = ?6 WHERE id = ?1",
            params![
                user.id,
                user.title,
                user.role.as_str(),
                user.team_id,
                user.manager_id,
                user.is_active as i32,
            ],
        )?;
        Ok(user)
    }

    pub fn touch_last_login(&mut self, user_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET last_login_at = ?2 WHERE id = ?1",
            params![user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // === Token Operations ===

    /// Issue a new bearer token for a user. Only the hash is stored; the
    /// plaintext is returned once.
    pub fn issue_token(&mut self, user_id: &str) -> Result<String> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            [user_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound("User not found".to_string()));
        }

        let token = format!("brg_{}", uuid::Uuid::new_v4().simple());
        self.conn.execute(
            "INSERT INTO api_tokens (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![hash_token(&token), user_id, Utc::now().to_rfc3339()],
        )?;
        Ok(token)
    }

    /// Resolve a plaintext token to the principal it was issued for.
    pub fn authenticate_token(&mut self, token: &str) -> Result<Principal> {
        let principal = self
            .conn
            .query_row(
                "SELECT u.id, u.organization_id, u.role
                 FROM api_tokens t JOIN users u ON t.user_id = u.id
                 WHERE t.token_hash = ?1 AND u.is_active = 1",
                [hash_token(token)],
                |row| {
                    Ok(Principal {
                        user_id: row.get(0)?,
                        organization_id: row.get(1)?,
                        role: enum_column::<UserRole>(row, 2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| Error::Unauthorized("Invalid or expired token".to_string()))?;

        self.touch_last_login(&principal.user_id)?;
        Ok(principal)
    }

    /// Revoke every token of a user.
    pub fn revoke_tokens(&mut self, user_id: &str) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM api_tokens WHERE user_id = ?1", [user_id])?;
        Ok(n)
    }
}
