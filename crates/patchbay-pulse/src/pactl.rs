//! `pactl` subprocess driver.
//!
//! Each call spawns its own `pactl` process, so a connection to the server
//! lives exactly as long as one query or module change.

use std::process::Command;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{PulseError, PulseResult};

/// Sample format, channel count and rate of a source or sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSpec {
    /// Sample format, e.g. `s16le`
    pub format: String,
    pub channels: u16,
    /// Rate in Hz
    pub rate: u32,
}

/// One row of `pactl list short sources|sinks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PactlEntry {
    /// Server-side object index
    pub index: u32,
    /// Source or sink name
    pub name: String,
    /// Owning driver or module
    pub driver: String,
    pub sample_spec: SampleSpec,
    /// `RUNNING`, `IDLE` or `SUSPENDED`
    pub state: String,
}

/// Operations the node managers need from a PulseAudio server.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ModuleHost: Send + Sync {
    /// List the server's sources.
    ///
    /// # Errors
    /// Returns an error if the server cannot be queried.
    fn list_sources(&self) -> PulseResult<Vec<PactlEntry>>;

    /// List the server's sinks.
    ///
    /// # Errors
    /// Returns an error if the server cannot be queried.
    fn list_sinks(&self) -> PulseResult<Vec<PactlEntry>>;

    /// Load a module and return its index.
    ///
    /// # Errors
    /// Returns an error if the server refuses the module.
    fn load_module(&self, name: &str, args: &[String]) -> PulseResult<u32>;

    /// Unload a module by index.
    ///
    /// # Errors
    /// Returns [`PulseError::NoSuchModule`] if the module is not loaded.
    fn unload_module(&self, index: u32) -> PulseResult<()>;
}

const SHORT_LIST_PATTERN: &str = r"^(?P<index>\d+)\t(?P<name>[^\t]+)\t(?P<driver>[^\t]*)\t(?P<format>\S+) (?P<channels>\d+)ch (?P<rate>\d+)Hz(?:\t(?P<state>\S+))?";

/// [`ModuleHost`] backed by the `pactl` command line tool.
pub struct PactlHost {
    program: String,
    short_list: Regex,
}

impl PactlHost {
    /// Create a host that runs `pactl` from `PATH`.
    ///
    /// # Errors
    /// Returns an error if the output pattern fails to compile.
    pub fn new() -> PulseResult<Self> {
        Self::with_program("pactl")
    }

    /// Create a host that runs the given program instead of `pactl`.
    ///
    /// # Errors
    /// Returns an error if the output pattern fails to compile.
    pub fn with_program(program: impl Into<String>) -> PulseResult<Self> {
        Ok(Self { program: program.into(), short_list: Regex::new(SHORT_LIST_PATTERN)? })
    }

    fn run(&self, args: &[&str]) -> PulseResult<String> {
        let output = Command::new(&self.program).args(args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PulseError::CommandFailed { command: args.join(" "), stderr: stderr.trim().to_string() });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Parse the output of `pactl list short sources|sinks`.
    ///
    /// Rows that do not carry a sample spec are skipped.
    #[must_use]
    pub fn parse_short_list(&self, output: &str) -> Vec<PactlEntry> {
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = self.parse_row(line);
                if entry.is_none() {
                    warn!(line, "Skipping unrecognized pactl row");
                }
                entry
            })
            .collect()
    }

    fn parse_row(&self, line: &str) -> Option<PactlEntry> {
        let caps = self.short_list.captures(line)?;
        Some(PactlEntry {
            index: caps["index"].parse().ok()?,
            name: caps["name"].to_string(),
            driver: caps["driver"].to_string(),
            sample_spec: SampleSpec {
                format: caps["format"].to_string(),
                channels: caps["channels"].parse().ok()?,
                rate: caps["rate"].parse().ok()?,
            },
            state: caps.name("state").map_or_else(String::new, |m| m.as_str().to_string()),
        })
    }
}

/// Parse the module index `pactl load-module` prints.
///
/// # Errors
/// Returns [`PulseError::Parse`] if the output is not an index.
pub fn parse_module_index(output: &str) -> PulseResult<u32> {
    let trimmed = output.trim();
    trimmed.parse().map_err(|_| PulseError::Parse(format!("expected a module index, got '{trimmed}'")))
}

impl ModuleHost for PactlHost {
    fn list_sources(&self) -> PulseResult<Vec<PactlEntry>> {
        let output = self.run(&["list", "short", "sources"])?;
        Ok(self.parse_short_list(&output))
    }

    fn list_sinks(&self) -> PulseResult<Vec<PactlEntry>> {
        let output = self.run(&["list", "short", "sinks"])?;
        Ok(self.parse_short_list(&output))
    }

    fn load_module(&self, name: &str, args: &[String]) -> PulseResult<u32> {
        let mut command = vec!["load-module", name];
        command.extend(args.iter().map(String::as_str));
        let index = parse_module_index(&self.run(&command)?)?;
        debug!(module = name, index, "Loaded module");
        Ok(index)
    }

    fn unload_module(&self, index: u32) -> PulseResult<()> {
        let arg = index.to_string();
        match self.run(&["unload-module", &arg]) {
            Err(PulseError::CommandFailed { stderr, .. }) if stderr.contains("No such entity") => {
                Err(PulseError::NoSuchModule(index))
            }
            Err(e) => Err(e),
            Ok(_) => {
                debug!(index, "Unloaded module");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SOURCES: &str = "\
0\talsa_output.pci-0000_00_1f.3.analog-stereo.monitor\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tSUSPENDED
1\talsa_input.usb-Elgato_Wave_3-00.mono-fallback\tmodule-alsa-card.c\tfloat32le 1ch 48000Hz\tRUNNING

garbage line
";

    #[test]
    fn test_parse_short_list() {
        let host = PactlHost::new().expect("Failed to create host");
        let entries = host.parse_short_list(SOURCES);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].name, "alsa_output.pci-0000_00_1f.3.analog-stereo.monitor");
        assert_eq!(entries[0].state, "SUSPENDED");
        assert_eq!(
            entries[1].sample_spec,
            SampleSpec { format: "float32le".into(), channels: 1, rate: 48000 }
        );
    }

    #[test]
    fn test_parse_row_without_state() {
        let host = PactlHost::new().expect("Failed to create host");
        let entries = host.parse_short_list("3\tnull\tmodule-null-sink.c\ts16le 2ch 44100Hz\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, "");
    }

    #[test]
    fn test_parse_module_index() {
        assert_eq!(parse_module_index("536870913\n").unwrap(), 536_870_913);
        assert_matches!(parse_module_index("Failure: Module initialization failed"), Err(PulseError::Parse(_)));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let host = PactlHost::with_program("patchbay-no-such-pactl").expect("Failed to create host");
        assert_matches!(host.list_sources(), Err(PulseError::Spawn(_)));
    }
}
