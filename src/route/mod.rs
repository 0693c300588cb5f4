pub mod condition;
pub mod encrypt;
pub mod engine;
pub mod master_slave;
pub mod sharding;
pub mod unit;

pub use condition::{
    ConditionOperand, ConditionOperator, ConditionValue, ShardingCondition, ShardingConditions,
    ShardingValue,
};
pub use engine::{RouteHint, RoutingEngine};
pub use unit::{RouteResult, RouteUnit, SqlUnit, TableMapping};
