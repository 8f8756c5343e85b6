use anyhow::{bail, Result};
use std::path::PathBuf;

pub const USAGE: &str = "Usage:
  deskpilot run \"<instruction>\" [--config PATH] [--no-patterns]
  deskpilot capabilities [--config PATH]
  deskpilot help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run {
        instruction: String,
        config: Option<PathBuf>,
        no_patterns: bool,
    },
    Capabilities {
        config: Option<PathBuf>,
    },
    Help,
}

/// Parses arguments without the program name.
pub fn parse(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    let mut config = None;
    let mut no_patterns = false;
    let mut words = Vec::new();
    let mut rest = rest.iter();

    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" | "-c" => match rest.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            "--no-patterns" => no_patterns = true,
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            word => words.push(word),
        }
    }

    match command.as_str() {
        "run" => {
            let instruction = words.join(" ");
            if instruction.trim().is_empty() {
                bail!("run requires an instruction");
            }
            Ok(Command::Run {
                instruction,
                config,
                no_patterns,
            })
        }
        "capabilities" => Ok(Command::Capabilities { config }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command: {}", other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_run() {
        let command = parse(&args(&[
            "run",
            "open firefox",
            "--config",
            "/etc/deskpilot.yaml",
            "--no-patterns",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Run {
                instruction: "open firefox".to_string(),
                config: Some(PathBuf::from("/etc/deskpilot.yaml")),
                no_patterns: true,
            }
        );
    }

    #[test]
    fn test_unquoted_instruction_words_are_joined() {
        let command = parse(&args(&["run", "switch", "to", "workspace", "3"])).unwrap();
        match command {
            Command::Run {
                instruction,
                no_patterns,
                ..
            } => {
                assert_eq!(instruction, "switch to workspace 3");
                assert!(!no_patterns);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&args(&["run"])).is_err());
        assert!(parse(&args(&["run", "x", "--config"])).is_err());
        assert!(parse(&args(&["run", "x", "--verbose"])).is_err());
        assert!(parse(&args(&["dance"])).is_err());
    }

    #[test]
    fn test_no_args_is_help() {
        assert_eq!(parse(&[]).unwrap(), Command::Help);
        assert_eq!(
            parse(&args(&["capabilities"])).unwrap(),
            Command::Capabilities { config: None }
        );
    }
}
