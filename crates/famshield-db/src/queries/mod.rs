pub mod keywords;
pub mod rules;
pub mod usage;

pub use keywords::KeywordQueries;
pub use rules::RuleQueries;
pub use usage::UsageQueries;
