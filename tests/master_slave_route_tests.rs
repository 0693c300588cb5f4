use std::sync::Arc;

use rustsharding::rule::{MasterSlaveRule, RandomLoadBalance};
use rustsharding::{RouteHint, RoutingEngine, RuleContext, Value, route_sql};

fn rules() -> RuleContext {
    RuleContext::from(MasterSlaveRule::new("ms_ds", "master", ["slave_0", "slave_1"]))
}

fn data_source(engine: &RoutingEngine, sql: &str, rules: &RuleContext) -> String {
    let units = route_sql(engine, sql, &[Value::Integer(1)], rules).unwrap();
    assert_eq!(units.len(), 1);
    units[0].data_source_name().to_string()
}

#[test]
fn test_writes_go_to_master() {
    let engine = RoutingEngine::default();
    let rules = rules();
    for sql in [
        "INSERT INTO t_user (id) VALUES (?)",
        "UPDATE t_user SET name = 'x' WHERE id = ?",
        "DELETE FROM t_user WHERE id = ?",
    ] {
        assert_eq!(data_source(&engine, sql, &rules), "master", "{}", sql);
    }
}

#[test]
fn test_reads_round_robin_over_slaves() {
    let engine = RoutingEngine::default();
    let rules = rules();
    let picks: Vec<String> = (0..4)
        .map(|_| data_source(&engine, "SELECT * FROM t_user WHERE id = ?", &rules))
        .collect();
    assert_eq!(picks, vec!["slave_0", "slave_1", "slave_0", "slave_1"]);
}

#[test]
fn test_locking_read_goes_to_master() {
    let engine = RoutingEngine::default();
    assert_eq!(
        data_source(&engine, "SELECT * FROM t_user WHERE id = ? FOR UPDATE", &rules()),
        "master"
    );
}

#[test]
fn test_force_master_hint() -> anyhow::Result<()> {
    let engine = RoutingEngine::default();
    let rules = rules();
    let context = engine.analyzer().analyze("SELECT * FROM t_user WHERE id = ?")?;
    let result = engine.route_with_hint(
        &context,
        &[Value::Integer(1)],
        &rules,
        RouteHint::force_master(),
    )?;
    assert_eq!(result.data_source_names(), vec!["master"]);
    Ok(())
}

#[test]
fn test_sql_is_never_rewritten() {
    let sql = "SELECT u.name FROM t_user u WHERE u.id = ?";
    let units = route_sql(&RoutingEngine::default(), sql, &[Value::Integer(9)], &rules()).unwrap();
    assert_eq!(units[0].sql_unit().sql(), sql);
    assert_eq!(units[0].sql_unit().parameters(), &[Value::Integer(9)]);
    assert_eq!(units[0].actual_table("t_user"), Some("t_user"));
}

#[test]
fn test_disabled_slaves_are_skipped() {
    let engine = RoutingEngine::default();
    let one_left = RuleContext::from(
        MasterSlaveRule::new("ms_ds", "master", ["slave_0", "slave_1"]).disable_slave("slave_0"),
    );
    for _ in 0..3 {
        assert_eq!(data_source(&engine, "SELECT * FROM t_user", &one_left), "slave_1");
    }

    let none_left = RuleContext::from(
        MasterSlaveRule::new("ms_ds", "master", ["slave_0"]).disable_slave("slave_0"),
    );
    assert_eq!(data_source(&engine, "SELECT * FROM t_user", &none_left), "master");
}

#[test]
fn test_random_balance_stays_within_slaves() {
    let engine = RoutingEngine::default();
    let rules = RuleContext::from(
        MasterSlaveRule::new("ms_ds", "master", ["slave_0", "slave_1", "slave_2"])
            .load_balance(Arc::new(RandomLoadBalance)),
    );
    for _ in 0..20 {
        let picked = data_source(&engine, "SELECT * FROM t_user", &rules);
        assert!(picked.starts_with("slave_"), "{}", picked);
    }
}
