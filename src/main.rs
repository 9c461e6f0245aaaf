//! Bearing CLI - goal alignment and progress rollup for OKRs.

use bearing::cli::{
    Cli, Commands, ConfigCommands, OrgCommands, ReportCommands, TeamCommands, TokenCommands,
    UserCommands,
};
use bearing::commands::{self, Output, UserSpec};
use bearing::config::{ConfigOverrides, ResolvedConfig, resolve_config};
use bearing::logging;
use clap::Parser;
use std::process;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    let result = run(cli, human);

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn run(cli: Cli, human: bool) -> Result<(), bearing::Error> {
    let mut overrides = ConfigOverrides::new();
    if let Some(path) = cli.config {
        overrides = overrides.with_config_path(path);
    }
    if let Some(db) = cli.database {
        overrides = overrides.with_database(db);
    }
    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            overrides = overrides.with_host(host.clone());
        }
        if let Some(port) = port {
            overrides = overrides.with_port(*port);
        }
    }

    let config = resolve_config(&overrides)?;
    // Held until exit so the file writer flushes.
    let _guard = logging::init(&config.log_level.value, config.log_file.as_deref())?;

    run_command(cli.command, &config, human)
}

fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    human: bool,
) -> Result<(), bearing::Error> {
    let db = config.database.value.as_path();

    match command {
        Commands::Init => {
            let result = commands::init(db)?;
            output(&result, human);
        }
        Commands::Org { command } => match command {
            OrgCommands::Create { name, slug } => {
                let result = commands::org_create(db, &name, slug)?;
                output(&result, human);
            }
            OrgCommands::List => {
                let result = commands::org_list(db)?;
                output(&result, human);
            }
        },
        Commands::Team { command } => match command {
            TeamCommands::Create {
                name,
                org,
                level,
                parent,
                description,
            } => {
                let result = commands::team_create(db, &org, name, level, parent, description)?;
                output(&result, human);
            }
            TeamCommands::List { org, all } => {
                let result = commands::team_list(db, &org, all)?;
                output(&result, human);
            }
        },
        Commands::User { command } => match command {
            UserCommands::Create {
                org,
                email,
                first_name,
                last_name,
                role,
                team,
                title,
            } => {
                let spec = UserSpec {
                    email,
                    first_name,
                    last_name,
                    role,
                    team_id: team,
                    title,
                };
                let result = commands::user_create(db, &org, spec)?;
                output(&result, human);
            }
            UserCommands::List { org } => {
                let result = commands::user_list(db, &org)?;
                output(&result, human);
            }
        },
        Commands::Token { command } => match command {
            TokenCommands::Issue { email } => {
                let result = commands::token_issue(db, &email)?;
                output(&result, human);
            }
            TokenCommands::Revoke { email } => {
                let result = commands::token_revoke(db, &email)?;
                output(&result, human);
            }
        },
        Commands::Serve { .. } => {
            commands::serve(config)?;
        }
        Commands::Report { command } => match command {
            ReportCommands::Quarterly { quarter, org } => {
                let result = commands::report_quarterly(db, &org, &quarter)?;
                output(&result, human);
            }
            ReportCommands::Annual { year, org } => {
                let result = commands::report_annual(db, &org, year)?;
                output(&result, human);
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(config, human),
        },
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
