//! CLI argument definitions for Bearing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::{TeamLevel, UserRole};

/// Bearing - goal alignment and progress rollup for OKRs.
///
/// Run `bearing init`, create an organization, a corporate team and an admin,
/// issue the admin a token, then `bearing serve`.
#[derive(Parser, Debug)]
#[command(name = "bearing")]
#[command(author, version, about = "Goal alignment and progress rollup service for OKR tracking", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Path to config.kdl (default: ~/.config/bearing/config.kdl).
    /// Can also be set via BEARING_CONFIG environment variable.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database. Overrides BEARING_DB and config.kdl.
    #[arg(long = "db", global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database if it does not exist
    Init,

    /// Organization management
    Org {
        #[command(subcommand)]
        command: OrgCommands,
    },

    /// Team management
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },

    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// API token management
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Run the HTTP API until Ctrl-C
    Serve {
        /// Address to bind (overrides BEARING_HOST and config.kdl)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides BEARING_PORT and config.kdl)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate progress reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Organization subcommands
#[derive(Subcommand, Debug)]
pub enum OrgCommands {
    /// Create an organization
    Create {
        /// Display name
        name: String,

        /// Unique handle (default: derived from the name)
        #[arg(long)]
        slug: Option<String>,
    },

    /// List organizations
    List,
}

/// Team subcommands
#[derive(Subcommand, Debug)]
pub enum TeamCommands {
    /// Create a team
    Create {
        /// Team name
        name: String,

        /// Organization slug or id
        #[arg(long)]
        org: String,

        /// Team level: CORPORATE, EXECUTIVE, DEPARTMENT, TEAM, INDIVIDUAL
        #[arg(short, long, value_parser = parse_level)]
        level: TeamLevel,

        /// Parent team id (required for every level below CORPORATE)
        #[arg(long)]
        parent: Option<String>,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List active teams of an organization
    List {
        /// Organization slug or id
        #[arg(long)]
        org: String,

        /// Include deactivated teams
        #[arg(long)]
        all: bool,
    },
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create a user
    Create {
        /// Organization slug or id
        #[arg(long)]
        org: String,

        /// Login email (unique)
        #[arg(long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Role: ADMIN, EXECUTIVE, MANAGER, CONTRIBUTOR
        #[arg(short, long, value_parser = parse_role, default_value = "CONTRIBUTOR")]
        role: UserRole,

        /// Team id the user belongs to
        #[arg(long)]
        team: Option<String>,

        /// Job title
        #[arg(long)]
        title: Option<String>,
    },

    /// List users of an organization
    List {
        /// Organization slug or id
        #[arg(long)]
        org: String,
    },
}

/// Token subcommands
#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Issue a bearer token (printed once, stored hashed)
    Issue {
        /// Email of the user
        email: String,
    },

    /// Revoke every token of a user
    Revoke {
        /// Email of the user
        email: String,
    },
}

/// Report subcommands
#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Quarterly report, e.g. `Q1-2026`
    Quarterly {
        /// Quarter key in Qn-YYYY form
        quarter: String,

        /// Organization slug or id
        #[arg(long)]
        org: String,
    },

    /// Annual report
    Annual {
        /// Year (2000-2100)
        year: i32,

        /// Organization slug or id
        #[arg(long)]
        org: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each came from
    Show,
}

fn parse_level(s: &str) -> Result<TeamLevel, String> {
    s.parse()
}

fn parse_role(s: &str) -> Result<UserRole, String> {
    s.parse()
}
