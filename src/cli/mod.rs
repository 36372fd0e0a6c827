//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting. The commands are a thin
//! layer over [`crate::staging::StagingArea`]; all staging rules live there.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init` | Create `.strata/` with config and an empty model |
//! | `changeset create/list/show` | Changeset lifecycle |
//! | `changeset activate/deactivate` | Default target for staging |
//! | `changeset add/update/remove/unstage` | Edit the change log |
//! | `changeset diff/drift` | Inspect before committing |
//! | `changeset commit/discard` | Finish a changeset |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! The default can be changed with `default_format` in the global config.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr:
//! ```bash
//! strata --verbose changeset commit
//! ```

mod app;
mod changeset;
mod output;

pub use app::{run, Cli, Commands};
pub use changeset::ChangesetCommands;
pub use output::{Output, OutputFormat};
