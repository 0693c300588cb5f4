use std::sync::Arc;

use rustsharding::rule::{
    DataNode, ModShardingAlgorithm, ShardingRule, ShardingStrategy, TableRule,
};
use rustsharding::{
    ErrorKind, RewriteEngine, RewriteRule, RouteProperties, RouteUnit, RoutingEngine, RuleContext,
    StatementAnalyzer, TableMapping, Value, route_sql,
};

fn nodes(data_sources: &[&str], table: &str, count: usize) -> Vec<DataNode> {
    data_sources
        .iter()
        .flat_map(|ds| (0..count).map(move |i| DataNode::new(*ds, format!("{}_{}", table, i))))
        .collect()
}

fn mod_strategy(column: &str) -> ShardingStrategy {
    ShardingStrategy::new(column, Arc::new(ModShardingAlgorithm))
}

fn order_rules() -> RuleContext {
    let ds = ["ds_0", "ds_1"];
    let order = TableRule::new("t_order", nodes(&ds, "t_order", 2))
        .database_strategy(mod_strategy("user_id"))
        .table_strategy(mod_strategy("order_id"));
    let item = TableRule::new("t_order_item", nodes(&ds, "t_order_item", 2))
        .database_strategy(mod_strategy("user_id"))
        .table_strategy(mod_strategy("order_id"));
    let user = TableRule::new(
        "t_user",
        vec![DataNode::new("ds_0", "t_user"), DataNode::new("ds_1", "t_user")],
    )
    .database_strategy(mod_strategy("user_id"));

    let rule = ShardingRule::new(ds)
        .table_rule(order)
        .table_rule(item)
        .table_rule(user)
        .binding_group(["t_order", "t_order_item"])
        .broadcast_table("t_config");
    rule.validate().unwrap();
    RuleContext::Sharding(rule)
}

fn route(sql: &str, params: &[Value]) -> rustsharding::Result<Vec<RouteUnit>> {
    route_sql(&RoutingEngine::default(), sql, params, &order_rules())
}

fn targets(units: &[RouteUnit]) -> Vec<(String, String)> {
    units
        .iter()
        .map(|u| (u.data_source_name().to_string(), u.sql_unit().sql().to_string()))
        .collect()
}

#[test]
fn test_single_node_route() {
    let units = route(
        "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?",
        &[Value::Integer(10), Value::Integer(3)],
    )
    .unwrap();

    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data_source_name(), "ds_0");
    assert_eq!(
        units[0].sql_unit().sql(),
        "SELECT * FROM t_order_1 WHERE user_id = ? AND order_id = ?"
    );
    assert_eq!(
        units[0].sql_unit().parameters(),
        &[Value::Integer(10), Value::Integer(3)]
    );
    assert_eq!(units[0].actual_table("t_order"), Some("t_order_1"));
}

#[test]
fn test_unconstrained_query_broadcasts_to_every_node() {
    let units = route("SELECT * FROM t_order", &[]).unwrap();
    assert_eq!(
        targets(&units),
        vec![
            ("ds_0".to_string(), "SELECT * FROM t_order_0".to_string()),
            ("ds_0".to_string(), "SELECT * FROM t_order_1".to_string()),
            ("ds_1".to_string(), "SELECT * FROM t_order_0".to_string()),
            ("ds_1".to_string(), "SELECT * FROM t_order_1".to_string()),
        ]
    );
}

#[test]
fn test_units_on_one_data_source_differ_by_table() {
    let units = route("SELECT * FROM t_order WHERE user_id = 1", &[]).unwrap();
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|u| u.data_source_name() == "ds_1"));
    assert_ne!(units[0].sql_unit().sql(), units[1].sql_unit().sql());
}

#[test]
fn test_or_branches_union_their_nodes() {
    let units = route(
        "SELECT * FROM t_order WHERE user_id = 0 AND order_id = 0 OR user_id = 1 AND order_id = 1",
        &[],
    )
    .unwrap();
    let nodes: Vec<(&str, Option<&str>)> = units
        .iter()
        .map(|u| (u.data_source_name(), u.actual_table("t_order")))
        .collect();
    assert_eq!(nodes, vec![("ds_0", Some("t_order_0")), ("ds_1", Some("t_order_1"))]);
}

#[test]
fn test_between_routes_over_all_data_sources() {
    let units = route(
        "SELECT * FROM t_order WHERE user_id BETWEEN 1 AND 3 AND order_id = 1",
        &[],
    )
    .unwrap();
    let nodes: Vec<(&str, Option<&str>)> = units
        .iter()
        .map(|u| (u.data_source_name(), u.actual_table("t_order")))
        .collect();
    assert_eq!(nodes, vec![("ds_0", Some("t_order_1")), ("ds_1", Some("t_order_1"))]);
}

#[test]
fn test_binding_tables_route_without_cross_product() {
    let units = route(
        "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = 1 AND o.order_id = 1",
        &[],
    )
    .unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data_source_name(), "ds_1");
    assert_eq!(
        units[0].sql_unit().sql(),
        "SELECT * FROM t_order_1 o JOIN t_order_item_1 i ON o.order_id = i.order_id WHERE o.user_id = 1 AND o.order_id = 1"
    );

    let all = route(
        "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id",
        &[],
    )
    .unwrap();
    assert_eq!(all.len(), 4);
    for unit in &all {
        let order = unit.actual_table("t_order").unwrap();
        let item = unit.actual_table("t_order_item").unwrap();
        assert_eq!(order.strip_prefix("t_order_"), item.strip_prefix("t_order_item_"));
    }
}

#[test]
fn test_unrelated_tables_combine_within_shared_data_sources() {
    let units = route("SELECT * FROM t_order o, t_user u WHERE o.order_id = u.user_id", &[]).unwrap();
    // 4 t_order nodes, each paired with the t_user node on its own data source
    assert_eq!(units.len(), 4);
    for unit in &units {
        assert!(unit.sql_unit().sql().contains(unit.actual_table("t_order").unwrap()));
        assert_eq!(unit.actual_table("t_user"), Some("t_user"));
    }
    let data_sources: Vec<&str> = units.iter().map(|u| u.data_source_name()).collect();
    assert_eq!(data_sources, vec!["ds_0", "ds_0", "ds_1", "ds_1"]);
}

#[test]
fn test_broadcast_table_writes_everywhere_and_reads_once() {
    let writes = route("INSERT INTO t_config (k, v) VALUES ('a', 'b')", &[]).unwrap();
    let data_sources: Vec<&str> = writes.iter().map(|u| u.data_source_name()).collect();
    assert_eq!(data_sources, vec!["ds_0", "ds_1"]);
    assert!(writes.iter().all(|u| u.sql_unit() == writes[0].sql_unit()));

    let reads = route("SELECT * FROM t_config", &[]).unwrap();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].data_source_name(), "ds_0");
}

#[test]
fn test_insert_rows_are_split_per_node() {
    let params = vec![
        Value::Integer(0),
        Value::Integer(0),
        Value::from("a"),
        Value::Integer(1),
        Value::Integer(1),
        Value::from("b"),
        Value::Integer(2),
        Value::Integer(0),
        Value::from("c"),
    ];
    let units = route(
        "INSERT INTO t_order (user_id, order_id, status) VALUES (?, ?, ?), (?, ?, ?), (?, ?, ?)",
        &params,
    )
    .unwrap();

    assert_eq!(units.len(), 2);
    assert_eq!(units[0].data_source_name(), "ds_0");
    assert_eq!(
        units[0].sql_unit().sql(),
        "INSERT INTO t_order_0 (user_id, order_id, status) VALUES (?, ?, ?), (?, ?, ?)"
    );
    assert_eq!(
        units[0].sql_unit().parameters(),
        &[
            Value::Integer(0),
            Value::Integer(0),
            Value::from("a"),
            Value::Integer(2),
            Value::Integer(0),
            Value::from("c"),
        ]
    );
    assert_eq!(units[1].data_source_name(), "ds_1");
    assert_eq!(
        units[1].sql_unit().sql(),
        "INSERT INTO t_order_1 (user_id, order_id, status) VALUES (?, ?, ?)"
    );
    assert_eq!(
        units[1].sql_unit().parameters(),
        &[Value::Integer(1), Value::Integer(1), Value::from("b")]
    );
}

#[test]
fn test_insert_without_table_sharding_value_is_ambiguous() {
    let err = route("INSERT INTO t_order (user_id, status) VALUES (1, 'x')", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousRoute);
}

#[test]
fn test_unknown_table_without_default_data_source() {
    let err = route("SELECT * FROM t_unknown", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Routing);
}

#[test]
fn test_unsharded_table_goes_to_default_data_source() {
    let rules = RuleContext::Sharding(
        ShardingRule::new(["ds_0", "ds_1"]).default_data_source("ds_1"),
    );
    let units = route_sql(
        &RoutingEngine::default(),
        "UPDATE t_account SET balance = 0 WHERE id = ?",
        &[Value::Integer(5)],
        &rules,
    )
    .unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].data_source_name(), "ds_1");
    assert_eq!(
        units[0].sql_unit().sql(),
        "UPDATE t_account SET balance = 0 WHERE id = ?"
    );
}

#[test]
fn test_cross_shard_can_be_disabled() {
    let engine = RoutingEngine::new(RouteProperties::new().allow_cross_shard(false));
    let rules = order_rules();

    let err = route_sql(&engine, "SELECT * FROM t_order", &[], &rules).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousRoute);

    let units = route_sql(
        &engine,
        "SELECT * FROM t_order WHERE user_id = 1 AND order_id = 1",
        &[],
        &rules,
    )
    .unwrap();
    assert_eq!(units.len(), 1);
}

#[test]
fn test_missing_parameters_fail_before_routing() {
    let err = route("SELECT * FROM t_order WHERE user_id = ?", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rewrite);
}

#[test]
fn test_placeholders_match_parameters_in_every_unit() -> anyhow::Result<()> {
    let statements: Vec<(&str, Vec<Value>)> = vec![
        ("SELECT * FROM t_order WHERE user_id IN (?, ?)", vec![1.into(), 2.into()]),
        (
            "INSERT INTO t_order (user_id, order_id) VALUES (?, ?), (?, ?)",
            vec![1.into(), 1.into(), 2.into(), 2.into()],
        ),
        ("DELETE FROM t_order WHERE order_id = ?", vec![7.into()]),
    ];
    for (sql, params) in statements {
        for unit in route(sql, &params)? {
            let placeholders = unit.sql_unit().sql().matches('?').count();
            assert_eq!(placeholders, unit.sql_unit().parameters().len(), "{}", unit);
        }
    }
    Ok(())
}

#[test]
fn test_route_result_exposes_conditions_and_targets() -> anyhow::Result<()> {
    let engine = RoutingEngine::default();
    let rules = order_rules();
    let context = engine
        .analyzer()
        .analyze("SELECT * FROM t_order WHERE user_id = ?")?;
    let result = engine.route(&context, &[Value::Integer(3)], &rules)?;

    assert_eq!(result.sharding_conditions().len(), 1);
    assert_eq!(result.data_source_names(), vec!["ds_1"]);
    assert_eq!(result.actual_tables("t_order"), vec!["t_order_0", "t_order_1"]);
    assert!(!result.is_single_route());
    assert_eq!(result.statement_context().sql(), context.sql());
    Ok(())
}

#[test]
fn test_rewriting_physical_sql_again_changes_nothing() -> anyhow::Result<()> {
    let units = route(
        "SELECT t_order.order_id FROM t_order WHERE t_order.user_id = ? AND order_id = ?",
        &[Value::Integer(1), Value::Integer(1)],
    )?;
    let physical = units[0].sql_unit();
    assert_eq!(
        physical.sql(),
        "SELECT t_order_1.order_id FROM t_order_1 WHERE t_order_1.user_id = ? AND order_id = ?"
    );

    let context = StatementAnalyzer::default().analyze(physical.sql())?;
    let mappings = [TableMapping::identity("t_order_1")];
    let again = RewriteEngine::new(RewriteRule::Sharding {
        mappings: &mappings,
        insert_rows: None,
    })
    .generate_sql(&context, physical.parameters())?;
    assert_eq!(&again, physical);
    Ok(())
}
