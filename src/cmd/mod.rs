//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `project`       | `Init`                                             |
//! | `config`        | `Config`                                           |
//! | `thresholds`    | `Thresholds`                                       |
//! | `view`          | `View`                                             |
//! | `summarize`     | `Summarize`                                        |
//! | `summary`       | `Summary`                                          |
//!
//! `setup` holds the engine wiring shared by the commands above.

pub mod config;
pub mod project;
pub mod setup;
pub mod summarize;
pub mod summary;
pub mod thresholds;
pub mod view;

pub use config::cmd_config;
pub use project::cmd_init;
pub use summarize::cmd_summarize;
pub use summary::cmd_summary_show;
pub use thresholds::cmd_thresholds;
pub use view::cmd_view;
