//! Output formatting utilities
//!
//! Formatters for human-readable and JSON output, plus transfer progress bars.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::ProgressBar;

/// Output configuration derived from CLI flags and config defaults
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Merge command-line flags with the `[defaults]` section of the config file
    ///
    /// Flags can only switch things off or on relative to the defaults, never
    /// re-enable what a flag disabled.
    pub fn from_flags(
        json: bool,
        no_color: bool,
        no_progress: bool,
        quiet: bool,
        defaults: &bfs_core::config::Defaults,
    ) -> Self {
        Self {
            json: json || defaults.output == "json",
            no_color: no_color || defaults.color == "never",
            no_progress: no_progress || !defaults.progress,
            quiet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfs_core::config::Defaults;

    #[test]
    fn test_flags_merge_with_defaults() {
        let defaults = Defaults {
            output: "json".into(),
            color: "never".into(),
            progress: false,
            alias: None,
        };
        let config = OutputConfig::from_flags(false, false, false, true, &defaults);
        assert!(config.json);
        assert!(config.no_color);
        assert!(config.no_progress);
        assert!(config.quiet);

        let config = OutputConfig::from_flags(false, true, false, false, &Defaults::default());
        assert!(!config.json);
        assert!(config.no_color);
        assert!(!config.no_progress);
    }
}
