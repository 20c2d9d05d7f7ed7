use std::time::Duration;

use serde_json::Value;

use crate::{
    controller::sequence::CoilPattern,
    models::{AxisId, Command},
};

pub const STATUS_ITEM: &str = "getxystatus";
pub const SELF_TEST_ITEM: &str = "selftest";
pub const LIVE_STATUS_ITEM: &str = "status";
pub const LOG_ITEM: &str = "log";

const RESTART_CONFIRMATION: &str = "pi";

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("expected an integer, got {0}")]
    InvalidInteger(Value),

    #[error("{0} does not fit in a step count")]
    OutOfRange(i64),

    #[error("expected four coil levels, got {0}")]
    InvalidPattern(Value),
}

/// Maps a request item and its payload to a command. Unknown items and an
/// unconfirmed restart give `Ok(None)`.
pub fn parse_command(
    item: &str,
    payload: &Value,
    restart_delay: Duration,
) -> Result<Option<Command>, CommandError> {
    let command = match item {
        "xmove" => Command::MoveRelative {
            axis: AxisId::X,
            steps: parse_integer(payload)?,
        },
        "ymove" => Command::MoveRelative {
            axis: AxisId::Y,
            steps: parse_integer(payload)?,
        },
        "xmoveto" => Command::MoveToAbsolute {
            axis: AxisId::X,
            target: parse_integer(payload)?,
        },
        "ymoveto" => Command::MoveToAbsolute {
            axis: AxisId::Y,
            target: parse_integer(payload)?,
        },
        "xstop" => Command::Stop { axis: AxisId::X },
        "ystop" => Command::Stop { axis: AxisId::Y },
        "output" => Command::RawOutput(parse_pattern(payload)?),
        "restart" if payload.as_str() == Some(RESTART_CONFIRMATION) => Command::Restart {
            delay: restart_delay,
        },
        _ => return Ok(None),
    };

    Ok(Some(command))
}

fn parse_integer(payload: &Value) -> Result<i32, CommandError> {
    let invalid = || CommandError::InvalidInteger(payload.clone());

    let value = match payload {
        Value::Number(number) => number.as_i64().ok_or_else(invalid)?,
        Value::String(text) => text.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    i32::try_from(value).map_err(|_| CommandError::OutOfRange(value))
}

fn parse_pattern(payload: &Value) -> Result<CoilPattern, CommandError> {
    let invalid = || CommandError::InvalidPattern(payload.clone());

    let items = payload.as_array().ok_or_else(invalid)?;
    if items.len() != 4 {
        return Err(invalid());
    }

    let mut levels = [false; 4];
    for (level, item) in levels.iter_mut().zip(items) {
        *level = match item {
            Value::Bool(on) => *on,
            Value::Number(number) => match number.as_u64() {
                Some(0) => false,
                Some(1) => true,
                _ => return Err(invalid()),
            },
            _ => return Err(invalid()),
        };
    }

    Ok(CoilPattern(levels))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const DELAY: Duration = Duration::from_secs(15);

    #[test]
    fn move_items_accept_numbers_and_strings() {
        assert_eq!(
            parse_command("xmove", &json!(-25), DELAY).unwrap(),
            Some(Command::MoveRelative {
                axis: AxisId::X,
                steps: -25
            })
        );
        assert_eq!(
            parse_command("ymoveto", &json!(" 600 "), DELAY).unwrap(),
            Some(Command::MoveToAbsolute {
                axis: AxisId::Y,
                target: 600
            })
        );
    }

    #[test]
    fn bad_integers_are_rejected() {
        assert!(matches!(
            parse_command("xmoveto", &json!("six hundred"), DELAY),
            Err(CommandError::InvalidInteger(_))
        ));
        assert!(matches!(
            parse_command("xmove", &json!(2.5), DELAY),
            Err(CommandError::InvalidInteger(_))
        ));
        assert!(matches!(
            parse_command("ymove", &json!(5_000_000_000i64), DELAY),
            Err(CommandError::OutOfRange(5_000_000_000))
        ));
    }

    #[test]
    fn output_takes_bools_or_bits() {
        assert_eq!(
            parse_command("output", &json!([1, 0, true, false]), DELAY).unwrap(),
            Some(Command::RawOutput(CoilPattern([true, false, true, false])))
        );
        assert!(parse_command("output", &json!([1, 0, 1]), DELAY).is_err());
        assert!(parse_command("output", &json!([1, 0, 2, 0]), DELAY).is_err());
        assert!(parse_command("output", &json!("1010"), DELAY).is_err());
    }

    #[test]
    fn restart_needs_confirmation() {
        assert_eq!(
            parse_command("restart", &json!("pi"), DELAY).unwrap(),
            Some(Command::Restart { delay: DELAY })
        );
        assert_eq!(parse_command("restart", &json!("now"), DELAY).unwrap(), None);
        assert_eq!(parse_command("restart", &Value::Null, DELAY).unwrap(), None);
    }

    #[test]
    fn stop_items_ignore_the_payload() {
        assert_eq!(
            parse_command("ystop", &Value::Null, DELAY).unwrap(),
            Some(Command::Stop { axis: AxisId::Y })
        );
    }

    #[test]
    fn unknown_items_are_not_commands() {
        assert_eq!(parse_command("zmove", &json!(1), DELAY).unwrap(), None);
    }
}
