use std::io::{self, IsTerminal};
use tracing_subscriber::{fmt, EnvFilter};

use crate::RequestedColorMode;

const DEFAULT_FILTER: &str = "info";

/// Whether log lines carry ANSI styling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl ColorMode {
    /// An explicit `--color` wins. Otherwise logs are colored unless `NO_COLOR`
    /// is set or stderr is not a terminal.
    pub(crate) fn resolve(requested: RequestedColorMode) -> ColorMode {
        let no_color = std::env::var_os("NO_COLOR").is_some();

        ColorMode::decide(requested, no_color, io::stderr().is_terminal())
    }

    fn decide(requested: RequestedColorMode, no_color: bool, terminal: bool) -> ColorMode {
        match requested {
            RequestedColorMode::On => ColorMode::On,
            RequestedColorMode::Off => ColorMode::Off,
            RequestedColorMode::Auto if terminal && !no_color => ColorMode::On,
            RequestedColorMode::Auto => ColorMode::Off,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub(crate) fn init(color: ColorMode) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_ansi(color == ColorMode::On)
        .with_writer(io::stderr)
        .init();
}
