//! Coverage validation for syncdb
//!
//! Inspects an execution plan and reports whether the query was answered
//! from the index alone. A plan is covered unless some object node, at any
//! depth, carries `"#operator": "Fetch"`.
//!
//! This is a diagnostic. Its errors never reach callers of the query API.

mod errors;
mod plan;

pub use errors::{CoverageError, CoverageResult};
pub use plan::{check_plan, is_covered, load_plan, FETCH_OPERATOR, OPERATOR_FIELD};
