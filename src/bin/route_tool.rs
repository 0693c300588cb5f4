use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rustsharding::config::{RuleConfiguration, expand_inline};
use rustsharding::{RouteHint, RoutingEngine, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "route-tool")]
#[command(about = "Shows how statements are routed and rewritten under a rule file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route one statement and print every route unit
    Route {
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        sql: String,
        /// JSON array of parameter values
        #[arg(long, default_value = "[]")]
        params: String,
        #[arg(long)]
        force_master: bool,
    },
    /// Validate a rule file
    Check {
        #[arg(long)]
        rules: PathBuf,
    },
    /// Expand an inline expression such as ds_${0..1}.t_${[0, 1]}
    Expand {
        #[arg(long)]
        expr: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Route {
            rules,
            sql,
            params,
            force_master,
        } => route(&rules, &sql, &params, force_master),
        Command::Check { rules } => check(&rules),
        Command::Expand { expr } => {
            for item in expand_inline(&expr).context("invalid inline expression")? {
                println!("{}", item);
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<RuleConfiguration> {
    RuleConfiguration::from_file(path)
        .with_context(|| format!("failed to load rules from {}", path.display()))
}

fn parse_params(text: &str) -> Result<Vec<Value>> {
    let json: serde_json::Value =
        serde_json::from_str(text).context("parameters must be valid JSON")?;
    let items = json
        .as_array()
        .ok_or_else(|| anyhow!("parameters must be a JSON array"))?;
    Ok(items.iter().map(Value::from).collect())
}

fn route(rules_path: &Path, sql: &str, params: &str, force_master: bool) -> Result<()> {
    let config = load(rules_path)?;
    let rules = config.build().context("invalid rule configuration")?;
    let parameters = parse_params(params)?;

    let engine = RoutingEngine::new(config.props.clone());
    let context = engine
        .analyzer()
        .analyze(sql)
        .context("failed to analyze statement")?;
    let hint = RouteHint { force_master };
    let result = engine
        .route_with_hint(&context, &parameters, &rules, hint)
        .context("failed to route statement")?;

    println!(
        "{} statement, {} route unit(s)",
        format!("{:?}", context.kind()).to_uppercase(),
        result.route_units().len()
    );
    for unit in result.route_units() {
        println!("{}", unit);
    }
    Ok(())
}

fn check(rules_path: &Path) -> Result<()> {
    let config = load(rules_path)?;
    let rules = config.build().context("invalid rule configuration")?;
    println!(
        "OK: {} rules over data sources [{}]",
        rules.strategy_name(),
        rules.data_source_names().join(", ")
    );
    Ok(())
}
