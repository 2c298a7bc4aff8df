mod config;
mod extract;
mod keywords;
mod matcher;
mod scanner;

pub use config::*;
pub use extract::*;
pub use keywords::*;
pub use matcher::*;
pub use scanner::*;
