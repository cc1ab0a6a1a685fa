//! Three-tier decision engine: deterministic rules, reasoning oracle,
//! human-review escalation (`spec.md` §4.2).

pub mod confidence;
pub mod engine;
pub mod oracle;
pub mod rules;

pub use engine::{decide, decide_batch, DecisionContext};
pub use oracle::{NullOracle, OracleContext, Recommendation, ReasoningOracle};
