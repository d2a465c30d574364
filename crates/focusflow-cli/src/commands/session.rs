use clap::Subcommand;
use focusflow_core::{CreateInput, EventOutcome, PatchInput, SessionId};

use super::{print_json, App, CommandResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a paused session
    Add {
        /// Session title (defaults to defaults.title)
        title: Option<String>,
        /// Planned duration in seconds
        #[arg(long, allow_negative_numbers = true)]
        duration: Option<i64>,
        /// Daily goal in minutes
        #[arg(long, allow_negative_numbers = true)]
        goal: Option<i64>,
        /// Track time without a duration or goal
        #[arg(long)]
        no_goal: bool,
        /// Opaque group id
        #[arg(long, default_value = "0")]
        group: i64,
    },
    /// List live sessions, newest first
    List,
    /// Show one session
    Show { id: i64 },
    /// Start (or resume) a session
    Start { id: i64 },
    /// Pause a running session
    Pause { id: i64 },
    /// Change duration, goal or no-goal mode
    Edit {
        id: i64,
        /// Planned duration in seconds
        #[arg(long, allow_negative_numbers = true)]
        duration: Option<i64>,
        /// Daily goal in minutes
        #[arg(long, allow_negative_numbers = true)]
        goal: Option<i64>,
        /// true or false
        #[arg(long)]
        no_goal: Option<bool>,
    },
    /// Zero the accrued focus time
    Reset { id: i64 },
    /// Delete a session
    Delete { id: i64 },
}

pub async fn run(user: &str, action: SessionAction) -> CommandResult {
    let app = App::open()?;
    let svc = &app.service;
    match action {
        SessionAction::Add {
            title,
            duration,
            goal,
            no_goal,
            group,
        } => {
            let defaults = &app.config.defaults;
            let input = CreateInput {
                title: title.unwrap_or_else(|| defaults.title.clone()),
                initial_duration: match (duration, no_goal) {
                    (Some(d), _) => d,
                    (None, true) => 0,
                    (None, false) => i64::from(defaults.initial_duration),
                },
                daily_goal_minutes: goal.unwrap_or(i64::from(defaults.daily_goal_minutes)),
                no_goal,
                group_id: group,
            };
            print_json(&svc.add_session(user, input).await?)
        }
        SessionAction::List => print_json(&svc.list_sessions(user).await?),
        SessionAction::Show { id } => print_json(&svc.get_session(user, SessionId(id)).await?),
        SessionAction::Start { id } => print_json(&svc.start(user, SessionId(id)).await?),
        SessionAction::Pause { id } => print_json(&svc.pause(user, SessionId(id)).await?),
        SessionAction::Edit {
            id,
            duration,
            goal,
            no_goal,
        } => {
            let patch = PatchInput {
                daily_goal_minutes: goal,
                initial_duration: duration,
                no_goal,
            };
            print_json(&svc.edit(user, SessionId(id), patch).await?)
        }
        SessionAction::Reset { id } => print_json(&svc.reset(user, SessionId(id)).await?),
        SessionAction::Delete { id } => {
            let session_id = SessionId(id);
            svc.delete_session(user, session_id).await?;
            print_json(&EventOutcome::Deleted { session_id })
        }
    }
}
