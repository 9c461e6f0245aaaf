//! Write-only log of LLM calls.

use rusqlite::params;

use super::Storage;
use crate::Result;
use crate::models::AiInteraction;

impl Storage {
    pub fn log_ai_interaction(&mut self, entry: &AiInteraction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ai_interactions (id, user_id, kind, prompt, response, model, entity_type, entity_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.user_id,
                entry.kind.as_str(),
                entry.prompt,
                entry.response,
                entry.model,
                entry.entity_type,
                entry.entity_id,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Number of logged interactions, optionally for one user.
    pub fn count_ai_interactions(&self, user_id: Option<&str>) -> Result<usize> {
        let n: i64 = match user_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM ai_interactions WHERE user_id = ?1",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM ai_interactions", [], |row| row.get(0))?,
        };
        Ok(n as usize)
    }
}
