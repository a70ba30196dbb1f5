//! Line commands typed on stdin.

use corridor_types::Side;
use thiserror::Error;

const COMMANDS: &str =
    "left right lock unlock leave send|cancel|accept|reject <side> text <words> refresh quit";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestVerb {
    Send,
    Cancel,
    Accept,
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Move(Side),
    Lock,
    Unlock,
    Leave,
    Request(RequestVerb, Side),
    Text(String),
    Refresh,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command {0:?} (try: {commands})", commands = COMMANDS)]
    Unknown(String),
    #[error("{0} needs a side: left or right")]
    MissingSide(&'static str),
    #[error("not a side: {0:?}")]
    BadSide(String),
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let verb = match head.to_ascii_lowercase().as_str() {
        "left" => return Ok(Command::Move(Side::Left)),
        "right" => return Ok(Command::Move(Side::Right)),
        "lock" => return Ok(Command::Lock),
        "unlock" => return Ok(Command::Unlock),
        "leave" => return Ok(Command::Leave),
        "refresh" => return Ok(Command::Refresh),
        "quit" | "exit" => return Ok(Command::Quit),
        // the text is sent as typed, including an empty one to clear it
        "text" => return Ok(Command::Text(rest.to_string())),
        "send" => ("send", RequestVerb::Send),
        "cancel" => ("cancel", RequestVerb::Cancel),
        "accept" => ("accept", RequestVerb::Accept),
        "reject" => ("reject", RequestVerb::Reject),
        _ => return Err(ParseError::Unknown(head.to_string())),
    };

    let (name, verb) = verb;
    if rest.is_empty() {
        return Err(ParseError::MissingSide(name));
    }
    let side = rest
        .parse::<Side>()
        .map_err(|_| ParseError::BadSide(rest.to_string()))?;
    Ok(Command::Request(verb, side))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("left"), Ok(Command::Move(Side::Left)));
        assert_eq!(parse("  RIGHT "), Ok(Command::Move(Side::Right)));
        assert_eq!(parse("lock"), Ok(Command::Lock));
        assert_eq!(parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_request_commands() {
        assert_eq!(parse("send left"), Ok(Command::Request(RequestVerb::Send, Side::Left)));
        assert_eq!(parse("accept Right"), Ok(Command::Request(RequestVerb::Accept, Side::Right)));
        assert_eq!(parse("reject"), Err(ParseError::MissingSide("reject")));
        assert_eq!(parse("cancel up"), Err(ParseError::BadSide("up".into())));
    }

    #[test]
    fn test_text_keeps_words() {
        assert_eq!(parse("text  hello   world "), Ok(Command::Text("hello   world".into())));
        assert_eq!(parse("text"), Ok(Command::Text(String::new())));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(parse("dance"), Err(ParseError::Unknown("dance".into())));
    }
}
