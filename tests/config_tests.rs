use std::io::Write;
use std::sync::Arc;
use std::thread;

use rustsharding::config::expand_inline;
use rustsharding::rule::MasterSlaveRule;
use rustsharding::{
    ErrorKind, RoutingEngine, RuleConfiguration, RuleContext, RuleRegistry, SqlDialect, Value,
    route_sql,
};
use tempfile::NamedTempFile;

const SHARDING: &str = r#"{
  "props": { "sql_show": true, "allow_cross_shard": true, "dialect": "postgresql" },
  "sharding": {
    "data_sources": ["ds_${0..1}"],
    "tables": {
      "t_order": {
        "actual_data_nodes": "ds_${0..1}.t_order_${[0, 1]}",
        "database_strategy": { "sharding_column": "user_id", "algorithm": "mod" },
        "table_strategy": { "sharding_column": "order_id", "algorithm": "mod" }
      },
      "t_order_item": {
        "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
        "database_strategy": { "sharding_column": "user_id", "algorithm": "mod" },
        "table_strategy": { "sharding_column": "order_id", "algorithm": "mod" }
      }
    },
    "binding_tables": ["t_order, t_order_item"],
    "broadcast_tables": ["t_config"]
  }
}"#;

#[test]
fn test_inline_expressions() -> anyhow::Result<()> {
    assert_eq!(
        expand_inline("ds_${0..1}.t_${[a, b]}")?,
        vec!["ds_0.t_a", "ds_0.t_b", "ds_1.t_a", "ds_1.t_b"]
    );
    assert_eq!(expand_inline("ds_a, ds_b")?, vec!["ds_a", "ds_b"]);
    Ok(())
}

#[test]
fn test_huge_inline_range_is_a_config_error() {
    let text = r#"{ "sharding": { "data_sources": ["ds_0"], "tables": { "t": {
        "actual_data_nodes": "ds_0.t_${0..999999999}" } } } }"#;
    let err = RuleConfiguration::from_json(text)
        .and_then(|config| config.build())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(expand_inline("ds_${0..999999999}").unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn test_load_sharding_rules_from_file() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(SHARDING.as_bytes())?;

    let config = RuleConfiguration::from_file(file.path())?;
    assert!(config.props.sql_show);
    assert_eq!(config.props.dialect, SqlDialect::PostgreSql);

    let rules = config.build()?;
    assert_eq!(rules.strategy_name(), "sharding");
    assert_eq!(rules.data_source_names(), vec!["ds_0", "ds_1"]);

    let engine = RoutingEngine::new(config.props.clone());
    let units = route_sql(
        &engine,
        "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = $1 AND o.order_id = $2",
        &[Value::Integer(2), Value::Integer(5)],
        &rules,
    )?;
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data_source_name(), "ds_0");
    assert_eq!(units[0].actual_table("t_order"), Some("t_order_1"));
    assert_eq!(units[0].actual_table("t_order_item"), Some("t_order_item_1"));
    Ok(())
}

#[test]
fn test_configuration_json_round_trip() -> anyhow::Result<()> {
    let config = RuleConfiguration::from_json(SHARDING)?;
    let reloaded = RuleConfiguration::from_json(&config.to_json()?)?;
    assert_eq!(config, reloaded);
    Ok(())
}

#[test]
fn test_invalid_configurations() {
    let cases = [
        // no rule section
        r#"{ "props": {} }"#,
        // two rule sections
        r#"{
          "master_slave": { "name": "ms", "master": "m", "slaves": ["s"] },
          "encrypt": { "data_source": "ds" }
        }"#,
        // unknown field
        r#"{ "master_slave": { "name": "ms", "master": "m", "slaves": ["s"], "weight": 1 } }"#,
        // unknown algorithm
        r#"{ "sharding": { "data_sources": ["ds_0"], "tables": { "t": {
            "actual_data_nodes": "ds_0.t_0",
            "table_strategy": { "sharding_column": "id", "algorithm": "range" } } } } }"#,
        // node on an undeclared data source
        r#"{ "sharding": { "data_sources": ["ds_0"], "tables": { "t": {
            "actual_data_nodes": "ds_9.t_0" } } } }"#,
        // undefined encryptor
        r#"{ "encrypt": { "data_source": "ds", "tables": { "t_user": { "columns": {
            "pwd": { "cipher_column": "pwd_cipher", "encryptor": "missing" } } } } } }"#,
    ];
    for text in cases {
        let err = RuleConfiguration::from_json(text)
            .and_then(|config| config.build())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config, "{}", text);
    }
}

#[test]
fn test_missing_rule_file() {
    let err = RuleConfiguration::from_file("/nonexistent/rules.json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_registry_snapshots_survive_publish() -> anyhow::Result<()> {
    let registry = Arc::new(RuleRegistry::new(RuleContext::from(MasterSlaveRule::new(
        "ms",
        "master_a",
        ["slave_a"],
    )))?);
    let before = registry.snapshot()?;

    let version = registry.publish(RuleContext::from(MasterSlaveRule::new(
        "ms",
        "master_b",
        ["slave_b"],
    )))?;
    assert_eq!(version, 2);
    assert_eq!(registry.version(), 2);

    let engine = RoutingEngine::default();
    let sql = "INSERT INTO t_user (id) VALUES (1)";
    assert_eq!(route_sql(&engine, sql, &[], &before)?[0].data_source_name(), "master_a");

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || -> rustsharding::Result<String> {
                let rules = registry.snapshot()?;
                let units = route_sql(&RoutingEngine::default(), sql, &[], &rules)?;
                Ok(units[0].data_source_name().to_string())
            })
        })
        .collect();
    for reader in readers {
        let picked = reader.join().map_err(|_| anyhow::anyhow!("reader panicked"))??;
        assert_eq!(picked, "master_b");
    }
    Ok(())
}

#[test]
fn test_publish_rejects_invalid_rules() -> anyhow::Result<()> {
    let registry = RuleRegistry::new(RuleContext::from(MasterSlaveRule::new(
        "ms",
        "master",
        ["slave"],
    )))?;
    let err = registry
        .publish(RuleContext::from(MasterSlaveRule::new("ms", "", ["slave"])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(registry.version(), 1);
    Ok(())
}
