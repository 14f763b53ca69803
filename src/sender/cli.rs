//! Serial-line command parsing for the sender.
//!
//! Three commands, one per ASCII line: `start`, `stop`, `run <minutes>`.
//! Anything else is rejected with a one-line diagnostic.

/// A parsed local command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCommand {
    /// Start heating with the current preset duration.
    Start,
    /// Stop heating.
    Stop,
    /// Start heating for an explicit duration, updating the preset.
    Run(u8),
}

/// Parse one input line. The error is the diagnostic to print.
pub fn parse_line(line: &str) -> Result<CliCommand, &'static str> {
    let line = line.trim();
    let mut words = line.split_whitespace();

    match words.next().map(str::to_ascii_lowercase).as_deref() {
        Some("start") if words.next().is_none() => Ok(CliCommand::Start),
        Some("stop") if words.next().is_none() => Ok(CliCommand::Stop),
        Some("run") => {
            let arg = words.next().ok_or("Usage: run <minutes>")?;
            if words.next().is_some() {
                return Err("Usage: run <minutes>");
            }
            match arg.parse::<u16>() {
                Ok(minutes @ 1..=255) => Ok(CliCommand::Run(minutes as u8)),
                _ => Err("Minutes must be 1..255"),
            }
        }
        _ => Err("Unknown command. Use: start | stop | run <minutes>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_three_commands() {
        assert_eq!(parse_line("start"), Ok(CliCommand::Start));
        assert_eq!(parse_line("stop"), Ok(CliCommand::Stop));
        assert_eq!(parse_line("run 20"), Ok(CliCommand::Run(20)));
    }

    #[test]
    fn is_case_insensitive_and_trims() {
        assert_eq!(parse_line("  STOP  "), Ok(CliCommand::Stop));
        assert_eq!(parse_line("RUN 90"), Ok(CliCommand::Run(90)));
    }

    #[test]
    fn run_bounds() {
        assert_eq!(parse_line("run 1"), Ok(CliCommand::Run(1)));
        assert_eq!(parse_line("run 255"), Ok(CliCommand::Run(255)));
        assert!(parse_line("run 0").is_err());
        assert!(parse_line("run 256").is_err());
        assert!(parse_line("run -5").is_err());
        assert!(parse_line("run").is_err());
        assert!(parse_line("run ten").is_err());
    }

    #[test]
    fn rejects_unknown_input_with_a_diagnostic() {
        let err = parse_line("launch").unwrap_err();
        assert!(err.contains("start | stop | run"));
        assert!(parse_line("start now").is_err());
        assert!(parse_line("").is_err());
    }
}
