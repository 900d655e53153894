//! 三个角色：Planner（规划）、Actor Factory（组装 Worker）、Dynamic Actor（执行子任务）

pub mod actor;
pub mod actor_factory;
pub mod output;
pub mod planner;

pub use actor::{ActorCheckpoint, ActorOutcome, ActorSettings, DynamicActor, PendingCall, FALLBACK_PERSONA};
pub use actor_factory::{ActorFactory, ActorSpec};
pub use output::{extract_json, parse_json};
pub use planner::{PlanDecision, Planner};
