//! Debug flags selected with `-D`.
//!
//! Each flag turns on `debug` level logging for a set of log targets. The
//! binaries append the resulting directives to their log filter.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DebugParseError {
    #[error("unknown debug flag '{0}' (use -D list to see the available flags)")]
    Unknown(String),

    /// `list` was among the flags; the caller prints [`DebugFlag::describe_all`]
    #[error("debug flag list requested")]
    ListRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugFlag {
    Engine,
    Session,
    Shutdown,
    Control,
    Messages,
}

impl DebugFlag {
    pub const ALL: [DebugFlag; 5] = [
        DebugFlag::Engine,
        DebugFlag::Session,
        DebugFlag::Shutdown,
        DebugFlag::Control,
        DebugFlag::Messages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DebugFlag::Engine => "engine",
            DebugFlag::Session => "session",
            DebugFlag::Shutdown => "shutdown",
            DebugFlag::Control => "control",
            DebugFlag::Messages => "messages",
        }
    }

    fn description(self) -> &'static str {
        match self {
            DebugFlag::Engine => "backend selection, process thread and ports",
            DebugFlag::Session => "session loading, binding and transport",
            DebugFlag::Shutdown => "shutdown channel, signal routing and teardown",
            DebugFlag::Control => "control socket server and protocol",
            DebugFlag::Messages => "runtime messages posted by the engine and session",
        }
    }

    /// Log targets enabled by this flag.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            DebugFlag::Engine => &["headless_core::engine"],
            DebugFlag::Session => &["headless_core::session"],
            DebugFlag::Shutdown => &[
                "headless_core::channel",
                "headless_core::bridge",
                "headless_core::coordinator",
            ],
            DebugFlag::Control => &["headless_host::control", "headless_ipc"],
            DebugFlag::Messages => &["headless::messages"],
        }
    }

    /// Help text printed for `-D list`.
    pub fn describe_all() -> String {
        let mut out = String::from("Available debug flags:\n");
        for flag in Self::ALL {
            out.push_str(&format!("  {:<10} {}\n", flag.name(), flag.description()));
        }
        out.push_str(&format!("  {:<10} {}\n", "all", "every flag above"));
        out
    }
}

impl fmt::Display for DebugFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DebugFlag {
    type Err = DebugParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DebugParseError::Unknown(s.to_string()))
    }
}

/// A set of debug flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugFlags {
    flags: Vec<DebugFlag>,
}

impl DebugFlags {
    /// Parse a comma separated list such as `engine,shutdown` or `all`.
    pub fn parse(options: &str) -> Result<Self, DebugParseError> {
        let mut flags = Vec::new();
        for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token.eq_ignore_ascii_case("list") {
                return Err(DebugParseError::ListRequested);
            }
            if token.eq_ignore_ascii_case("all") {
                flags.extend(DebugFlag::ALL);
            } else {
                flags.push(token.parse()?);
            }
        }

        flags.sort();
        flags.dedup();
        Ok(Self { flags })
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn contains(&self, flag: DebugFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Filter directives, e.g. `headless_core::engine=debug`.
    pub fn directives(&self) -> Vec<String> {
        self.flags
            .iter()
            .flat_map(|flag| flag.targets())
            .map(|target| format!("{}=debug", target))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_multiple() {
        let flags = DebugFlags::parse("engine").unwrap();
        assert!(flags.contains(DebugFlag::Engine));
        assert!(!flags.contains(DebugFlag::Session));

        let flags = DebugFlags::parse("Session, shutdown").unwrap();
        assert!(flags.contains(DebugFlag::Session));
        assert!(flags.contains(DebugFlag::Shutdown));
    }

    #[test]
    fn test_all_selects_every_flag_once() {
        let flags = DebugFlags::parse("all,engine").unwrap();
        for flag in DebugFlag::ALL {
            assert!(flags.contains(flag));
        }
        assert_eq!(
            flags.directives().iter().filter(|d| d.starts_with("headless_core::engine")).count(),
            1
        );
    }

    #[test]
    fn test_list_requested() {
        assert_eq!(
            DebugFlags::parse("engine,list"),
            Err(DebugParseError::ListRequested)
        );
    }

    #[test]
    fn test_unknown_flag() {
        assert_eq!(
            DebugFlags::parse("engine,bogus"),
            Err(DebugParseError::Unknown("bogus".to_string()))
        );
    }

    #[test]
    fn test_directives() {
        let flags = DebugFlags::parse("shutdown").unwrap();
        assert_eq!(
            flags.directives(),
            vec![
                "headless_core::channel=debug",
                "headless_core::bridge=debug",
                "headless_core::coordinator=debug",
            ]
        );
        assert!(DebugFlags::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_describe_all_lists_names() {
        let text = DebugFlag::describe_all();
        for flag in DebugFlag::ALL {
            assert!(text.contains(flag.name()));
        }
    }
}
