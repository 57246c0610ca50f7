//! Command-line interface for tm
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

mod auth;
mod init;
mod task;

/// tm - a personal task manager
///
/// Tasks are kept per owner in a local data directory. Lists can be
/// filtered by status, category, priority and search text, and tasks due
/// within the configured window are flagged.
#[derive(Parser, Debug)]
#[command(name = "tm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true, env = "TASKMASTER_DIR")]
    pub dir: Option<PathBuf>,

    /// Owner whose tasks are read and written (else TASKMASTER_OWNER, the
    /// signed-in account, then owner.default)
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and default config
    Init {
        /// Seed the four sample tasks
        #[arg(long)]
        samples: bool,
    },

    /// Add a task
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// personal, work, groceries, health or finance
        #[arg(short, long)]
        category: Option<String>,

        /// high, medium or low
        #[arg(short, long)]
        priority: Option<String>,

        /// RFC 3339, YYYY-MM-DD, or an offset such as +3h / +2d
        #[arg(long)]
        due: Option<String>,
    },

    /// List tasks through the current filters, one page at a time
    #[command(alias = "ls")]
    List {
        /// all, completed, incomplete or due-soon
        #[arg(short, long, default_value = "all")]
        status: String,

        /// A category name or "all"
        #[arg(short, long, default_value = "all")]
        category: String,

        /// A priority name or "all"
        #[arg(short, long, default_value = "all")]
        priority: String,

        /// Case-insensitive match on title and description
        #[arg(long)]
        search: Option<String>,

        /// 1-based page number (clamped to the available pages)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Override [view] page_size
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Toggle a task between done and not done
    Done {
        /// Task id or unique prefix
        id: String,
    },

    /// Delete a task
    Rm {
        /// Task id or unique prefix
        id: String,
    },

    /// Edit task fields
    Edit {
        /// Task id or unique prefix
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        #[arg(long)]
        clear_due: bool,
    },

    /// Move a task within the full list (1-based positions)
    Move { from: usize, to: usize },

    /// Show tasks due within the notification window
    Due,

    /// Dashboard totals and per-category counts
    Stats,

    /// Tasks with a due date as calendar events
    Calendar,

    /// Account management
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Interactive terminal task viewer
    View,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Create an account and sign in
    SignUp {
        email: String,

        #[arg(long, env = "TASKMASTER_PASSWORD", hide_env_values = true)]
        password: String,

        /// Password confirmation (defaults to --password)
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Sign in to an existing account
    SignIn {
        email: String,

        #[arg(long, env = "TASKMASTER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the current session
    SignOut,

    /// Request a password reset
    ResetPassword { email: String },

    /// Update the display name and/or profile photo
    Profile {
        #[arg(long)]
        name: Option<String>,

        /// Image file to upload as the profile photo
        #[arg(long)]
        photo: Option<PathBuf>,
    },

    /// Show the signed-in account
    Whoami,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let Cli {
            dir,
            owner,
            json,
            quiet,
            command,
        } = self;
        match command {
            Commands::Init { samples } => init::run(init::InitOptions {
                samples,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::Add {
                title,
                description,
                category,
                priority,
                due,
            } => task::run_add(task::AddOptions {
                title,
                description,
                category,
                priority,
                due,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::List {
                status,
                category,
                priority,
                search,
                page,
                page_size,
            } => task::run_list(task::ListOptions {
                status,
                category,
                priority,
                search,
                page,
                page_size,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::Done { id } => task::run_done(task::IdOptions {
                id,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::Rm { id } => task::run_rm(task::IdOptions {
                id,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::Edit {
                id,
                title,
                description,
                clear_description,
                category,
                priority,
                due,
                clear_due,
            } => task::run_edit(task::EditOptions {
                id,
                title,
                description,
                clear_description,
                category,
                priority,
                due,
                clear_due,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::Move { from, to } => task::run_move(task::MoveOptions {
                from,
                to,
                dir,
                owner,
                json,
                quiet,
            }),
            Commands::Due => task::run_due(task::ReportOptions::new(dir, owner, json, quiet)),
            Commands::Stats => task::run_stats(task::ReportOptions::new(dir, owner, json, quiet)),
            Commands::Calendar => {
                task::run_calendar(task::ReportOptions::new(dir, owner, json, quiet))
            }
            Commands::View => task::run_view(task::ReportOptions::new(dir, owner, json, quiet)),
            Commands::Auth(cmd) => {
                let ctx = auth::AuthOptions {
                    dir,
                    json,
                    quiet,
                };
                match cmd {
                    AuthCommands::SignUp {
                        email,
                        password,
                        confirm,
                    } => auth::run_sign_up(ctx, email, password, confirm),
                    AuthCommands::SignIn { email, password } => {
                        auth::run_sign_in(ctx, email, password)
                    }
                    AuthCommands::SignOut => auth::run_sign_out(ctx),
                    AuthCommands::ResetPassword { email } => auth::run_reset_password(ctx, email),
                    AuthCommands::Profile { name, photo } => auth::run_profile(ctx, name, photo),
                    AuthCommands::Whoami => auth::run_whoami(ctx),
                }
            }
        }
    }
}
