use std::path::Path;

use focusflow_core::legacy::{import_drafts, LegacyDefaults};

use super::{print_json, App, CommandResult};

/// Import a legacy session export. Every entry is validated before anything
/// is written.
pub async fn run(user: &str, file: &Path) -> CommandResult {
    let json = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let app = App::open()?;
    let defaults = LegacyDefaults {
        title: app.config.defaults.title.clone(),
        initial_duration: app.config.defaults.initial_duration,
        daily_goal_minutes: app.config.defaults.daily_goal_minutes,
    };
    let drafts = import_drafts(&json, user, &defaults)?;
    let created = app.service.import_drafts(drafts).await?;
    print_json(&created)
}
