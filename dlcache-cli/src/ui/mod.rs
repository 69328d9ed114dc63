//! Terminal output for the dlcache CLI.

pub mod progress;

pub use progress::ProgressDisplay;
