use std::num::ParseIntError;

use thiserror::Error;

use crate::CommandPayload;

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
}

pub fn parse_command_line(input: &str) -> Result<CommandPayload, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "tick" | "turn" => {
            let steps_str = parts.next().unwrap_or("1");
            let steps = parse_u32(steps_str, "tick steps")?;
            Ok(CommandPayload::Tick { steps })
        }
        "claim" => {
            let index_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("mission index"))?;
            let index = parse_u32(index_str, "mission index")?;
            let console_bits = parts
                .next()
                .map(|value| parse_u64(value, "claim console"))
                .transpose()?;
            Ok(CommandPayload::Claim {
                index,
                console_bits,
            })
        }
        "finish" => {
            let console_bits = parts
                .next()
                .map(|value| parse_u64(value, "finish console"))
                .transpose()?;
            Ok(CommandPayload::Finish { console_bits })
        }
        "round_start" | "round" => Ok(CommandPayload::RoundStart),
        "save_ship" | "save" => {
            let console_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("console"))?;
            let actor_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("actor"))?;
            Ok(CommandPayload::SaveShip {
                console_bits: parse_u64(console_str, "save console")?,
                actor_bits: parse_u64(actor_str, "save actor")?,
            })
        }
        "status" => Ok(CommandPayload::Status),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_u64(value: &str, context: &'static str) -> Result<u64, CommandParseError> {
    value
        .parse::<u64>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_defaults_to_one_step() {
        assert_eq!(
            parse_command_line("tick").unwrap(),
            CommandPayload::Tick { steps: 1 }
        );
        assert_eq!(
            parse_command_line("  TICK 40 ").unwrap(),
            CommandPayload::Tick { steps: 40 }
        );
    }

    #[test]
    fn claim_accepts_optional_console() {
        assert_eq!(
            parse_command_line("claim 3").unwrap(),
            CommandPayload::Claim {
                index: 3,
                console_bits: None
            }
        );
        assert_eq!(
            parse_command_line("claim 3 4294967301").unwrap(),
            CommandPayload::Claim {
                index: 3,
                console_bits: Some(4_294_967_301)
            }
        );
    }

    #[test]
    fn claim_requires_index() {
        let err = parse_command_line("claim").unwrap_err();
        assert!(matches!(err, CommandParseError::MissingArgument(_)));
    }

    #[test]
    fn invalid_integer_reports_context() {
        let err = parse_command_line("claim three").unwrap_err();
        match err {
            CommandParseError::InvalidInteger { value, context, .. } => {
                assert_eq!(value, "three");
                assert_eq!(context, "mission index");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn save_ship_needs_console_and_actor() {
        assert!(matches!(
            parse_command_line("save_ship 12").unwrap_err(),
            CommandParseError::MissingArgument("actor")
        ));
        assert_eq!(
            parse_command_line("save 12 13").unwrap(),
            CommandPayload::SaveShip {
                console_bits: 12,
                actor_bits: 13
            }
        );
    }

    #[test]
    fn unknown_and_empty_commands_are_rejected() {
        assert!(matches!(
            parse_command_line("   ").unwrap_err(),
            CommandParseError::Empty
        ));
        assert!(matches!(
            parse_command_line("launch").unwrap_err(),
            CommandParseError::UnknownCommand(verb) if verb == "launch"
        ));
    }
}
