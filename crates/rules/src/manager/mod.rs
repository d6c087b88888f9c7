//! The rule orchestrator: one engine per partial response strategy, a
//! scratch directory of partitioned rule files, and a streaming listing of
//! the live groups.

mod core;
mod file_index;
mod reload;
mod stream;


pub use self::core::{Manager, SCRATCH_DIR};
pub use self::file_index::{FileIndex, StrategyFiles};
pub use self::stream::{filter_group, ChannelSink, RuleType, RulesRequest, RulesResponse, RulesSink};
