mod args;
mod output;
mod runner;

pub use args::{Cli, Commands, ScopeArg};
pub use output::print_json;
pub use runner::{load_config, run};
