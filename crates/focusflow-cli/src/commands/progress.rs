use chrono::{Duration, NaiveDate};

use super::{print_json, App, CommandResult};

pub async fn progress(user: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> CommandResult {
    let app = App::open()?;
    let to = to.unwrap_or_else(|| app.today());
    let from = from.unwrap_or(to - Duration::days(6));
    let days = app.service.aggregator().progress(user, from, to).await?;
    print_json(&days)
}

pub async fn summary(user: &str, date: Option<NaiveDate>) -> CommandResult {
    let app = App::open()?;
    let date = date.unwrap_or_else(|| app.today());
    print_json(&app.service.aggregator().summary(user, date).await?)
}

pub async fn streak(user: &str) -> CommandResult {
    let app = App::open()?;
    let today = app.today();
    print_json(&app.service.aggregator().streak(user, today).await?)
}
