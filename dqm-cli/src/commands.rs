//! Command handlers. Each returns the JSON document the binary prints.

use crate::app::App;
use crate::{
    Command, ConnectionsCommand, CreateRuleArgs, DamaCommand, ProfileArgs, QueryArgs,
    ResultsArgs, RulesCommand, UpdateRuleArgs,
};
use anyhow::Context;
use chrono::{NaiveDate, NaiveTime};
use dqm_core::{Dimension, HistoryFilter, NewRule, ProfileRequest, RuleKind, RuleUpdate};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use tracing::{info, warn};

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<JsonValue> {
    serde_json::to_value(value).context("serializing command output")
}

/// Runs one command against a wired [`App`].
///
/// # Errors
/// Returns error if the command fails.
pub async fn dispatch(app: &App, command: &Command) -> anyhow::Result<JsonValue> {
    match command {
        Command::Connections(command) => connections(app, command).await,
        Command::Tables => to_json(&app.profiler.list_tables(None).await?),
        Command::Profile(args) => profile(app, args).await,
        Command::Query(args) => query(app, args).await,
        Command::ProfileHistory { table } => {
            to_json(&app.profiler.history(table.as_deref()).await?)
        }
        Command::Rules(command) => rules(app, command).await,
        Command::Dama(command) => dama(app, command).await,
    }
}

async fn connections(app: &App, command: &ConnectionsCommand) -> anyhow::Result<JsonValue> {
    match command {
        ConnectionsCommand::List => to_json(&app.registry.list()),
        ConnectionsCommand::Test { name } => {
            let probe = app.registry.test(name.as_deref()).await?;
            if probe.is_connected() {
                info!(connection = %probe.connection, "Connection test successful");
            } else {
                warn!(
                    connection = %probe.connection,
                    error = probe.error.as_deref().unwrap_or_default(),
                    "Connection test failed"
                );
            }
            to_json(&probe)
        }
    }
}

async fn profile(app: &App, args: &ProfileArgs) -> anyhow::Result<JsonValue> {
    let mut request = ProfileRequest::new(&args.table).with_columns(args.columns.iter().cloned());
    if let Some(pattern) = &args.pattern {
        request = request.with_pattern(pattern);
    }
    let records = app.profiler.profile_table(&request).await?;
    if !args.suggest {
        return to_json(&records);
    }

    let suggestions = app.profiler.suggest_rules(&records);
    let mut created = Vec::new();
    if args.accept {
        for suggestion in &suggestions {
            let rule = app
                .rules
                .create(suggestion.to_new_rule())
                .await
                .with_context(|| format!("accepting suggestion '{}'", suggestion.name))?;
            created.push(rule);
        }
    }
    Ok(json!({
        "profiles": to_json(&records)?,
        "suggestions": to_json(&suggestions)?,
        "created_rules": to_json(&created)?,
    }))
}

async fn query(app: &App, args: &QueryArgs) -> anyhow::Result<JsonValue> {
    let handle = app.registry.active();
    let rows = handle
        .query(
            &args.table,
            &args.columns,
            &parameter_map(&args.filters),
            Some(args.limit),
        )
        .await?;
    info!(connection = %handle.name(), table = %args.table, rows = rows.len(), "Query finished");
    Ok(JsonValue::Array(rows))
}

fn parameter_map(parameters: &[(String, JsonValue)]) -> BTreeMap<String, JsonValue> {
    parameters.iter().cloned().collect()
}

async fn create_rule(app: &App, args: &CreateRuleArgs) -> anyhow::Result<JsonValue> {
    let mut new_rule = NewRule::new(
        &args.name,
        &args.table,
        args.column.as_deref(),
        RuleKind::from(args.kind.as_str()),
    )
    .with_severity(args.severity);
    new_rule.parameters = parameter_map(&args.parameters);
    if let Some(connection) = &args.on {
        new_rule = new_rule.on_connection(connection);
    }
    to_json(&app.rules.create(new_rule).await?)
}

async fn update_rule(app: &App, args: &UpdateRuleArgs) -> anyhow::Result<JsonValue> {
    let column = if args.clear_column {
        Some(None)
    } else {
        args.column.clone().map(Some)
    };
    let changes = RuleUpdate {
        name: args.name.clone(),
        table: args.table.clone(),
        column,
        kind: args.kind.as_deref().map(RuleKind::from),
        parameters: (!args.parameters.is_empty()).then(|| parameter_map(&args.parameters)),
        severity: args.severity,
    };
    to_json(&app.rules.update(args.id, changes).await?)
}

fn day_start(date: NaiveDate) -> chrono::DateTime<chrono::Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn history_filter(args: &ResultsArgs) -> HistoryFilter {
    let mut filter = HistoryFilter::all().between(
        args.since.map(day_start),
        args.until.map(day_start),
    );
    if let Some(rule) = args.rule {
        filter = filter.with_rule(rule);
    }
    if let Some(kind) = &args.kind {
        filter = filter.with_kind(RuleKind::from(kind.as_str()));
    }
    if let Some(table) = &args.table {
        filter = filter.with_table(table);
    }
    filter
}

async fn rules(app: &App, command: &RulesCommand) -> anyhow::Result<JsonValue> {
    match command {
        RulesCommand::Create(args) => create_rule(app, args).await,
        RulesCommand::Update(args) => update_rule(app, args).await,
        RulesCommand::List { all } => to_json(&app.rules.list(*all).await?),
        RulesCommand::Show { id } => to_json(&app.rules.get(*id).await?),
        RulesCommand::Activate { id } => to_json(&app.rules.activate(*id).await?),
        RulesCommand::Deactivate { id } => to_json(&app.rules.deactivate(*id).await?),
        RulesCommand::Delete { id } => to_json(&app.rules.delete(*id).await?),
        RulesCommand::Run { ids } => {
            let results = if ids.is_empty() {
                app.rules.execute_active().await?
            } else {
                app.rules.execute_batch(ids).await?
            };
            let failed = results.iter().filter(|r| !r.passed).count();
            info!(executed = results.len(), failed, "Rule run finished");
            to_json(&results)
        }
        RulesCommand::Results(args) => to_json(&app.rules.results(&history_filter(args)).await?),
        RulesCommand::Failures { result_id } => {
            to_json(&app.rules.list_failures(*result_id).await?)
        }
    }
}

async fn dama(app: &App, command: &DamaCommand) -> anyhow::Result<JsonValue> {
    match command {
        DamaCommand::Overview => to_json(&app.aggregator.overview_scores().await?),
        DamaCommand::Tables { table: None } => to_json(&app.aggregator.table_scores().await?),
        DamaCommand::Tables { table: Some(table) } => {
            let scores = app.aggregator.table_score(table).await?;
            Ok(json!({ "table": table, "scores": to_json(&scores)? }))
        }
        DamaCommand::Dimensions => Ok(dimension_catalog()),
        DamaCommand::Trends { days } => to_json(&app.aggregator.trends(*days).await?),
        DamaCommand::Alerts { threshold } => {
            let threshold = threshold.unwrap_or(app.config.alert_threshold);
            to_json(&app.aggregator.alerts(threshold).await?)
        }
    }
}

fn dimension_catalog() -> JsonValue {
    let dimensions: Vec<JsonValue> = Dimension::ALL
        .into_iter()
        .map(|dimension| json!({ "name": dimension, "rule_kinds": dimension.keywords() }))
        .collect();
    json!({ "count": dimensions.len(), "dimensions": dimensions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_history_filter_from_args() {
        let args = ResultsArgs {
            rule: None,
            kind: Some("null_check".into()),
            table: Some("customers".into()),
            since: NaiveDate::from_ymd_opt(2024, 3, 1),
            until: None,
        };
        let filter = history_filter(&args);
        assert_eq!(filter.rule_kind, Some(RuleKind::NullCheck));
        assert_eq!(filter.table.as_deref(), Some("customers"));

        let since = filter.since.unwrap();
        assert_eq!((since.year(), since.month(), since.day()), (2024, 3, 1));
        assert_eq!(since.hour(), 0);
        assert!(filter.until.is_none());
    }

    #[test]
    fn test_dimension_catalog_lists_every_dimension() {
        let catalog = dimension_catalog();
        assert_eq!(catalog["count"], 9);
        assert_eq!(catalog["dimensions"][0]["name"], "completeness");
        assert_eq!(catalog["dimensions"][4]["name"], "integrity");
        assert!(
            catalog["dimensions"][0]["rule_kinds"]
                .as_array()
                .unwrap()
                .contains(&json!("null_check"))
        );
    }

    #[test]
    fn test_parameter_map_last_value_wins() {
        let map = parameter_map(&[
            ("min".into(), json!(0)),
            ("min".into(), json!(5)),
            ("max".into(), json!(10)),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["min"], json!(5));
    }
}
