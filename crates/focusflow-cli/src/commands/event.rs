use focusflow_core::SessionEvent;

use super::{print_json, App, CommandResult};

/// Parse a tagged event and dispatch it as `user`.
pub async fn run(user: &str, json: &str) -> CommandResult {
    let event: SessionEvent =
        serde_json::from_str(json).map_err(|e| format!("invalid event: {e}"))?;
    let app = App::open()?;
    let outcome = app.service.dispatch(user, event).await?;
    print_json(&outcome)
}
