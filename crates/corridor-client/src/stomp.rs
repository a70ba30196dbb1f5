//! Minimal STOMP 1.2 frame codec.
//!
//! One WebSocket text message carries one frame, or a bare EOL heartbeat.
//! Only the commands the push channel uses are constructed here; decoding
//! accepts any server command so that unexpected frames surface as values
//! rather than errors.

use std::fmt::Write as _;

use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StompError {
    #[error("unknown STOMP command {0:?}")]
    UnknownCommand(String),
    #[error("frame truncated")]
    Truncated,
    #[error("frame missing NUL terminator")]
    MissingTerminator,
    #[error("malformed header line {0:?}")]
    BadHeader(String),
    #[error("invalid escape in header {0:?}")]
    BadEscape(String),
    #[error("invalid content-length {0:?}")]
    BadContentLength(String),
    #[error("server rejected connection: {0}")]
    Rejected(String),
    #[error("timed out waiting for CONNECTED")]
    HandshakeTimeout,
    #[error("no traffic for {0:?}")]
    HeartbeatTimeout(std::time::Duration),
    #[error("connection closed")]
    Closed,
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

/// Heart-beat pair in milliseconds: `(can send every, want to receive every)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: u64,
    pub incoming: u64,
}

impl HeartBeat {
    pub fn new(outgoing: u64, incoming: u64) -> Self {
        Self { outgoing, incoming }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (out, inc) = value.split_once(',')?;
        Some(Self {
            outgoing: out.trim().parse().ok()?,
            incoming: inc.trim().parse().ok()?,
        })
    }

    /// Effective intervals given what the client asked for and what the
    /// server answered. Zero on either side disables that direction.
    pub fn negotiate(client: HeartBeat, server: HeartBeat) -> HeartBeat {
        let pick = |ours: u64, theirs: u64| {
            if ours == 0 || theirs == 0 {
                0
            } else {
                ours.max(theirs)
            }
        };
        HeartBeat {
            outgoing: pick(client.outgoing, server.incoming),
            incoming: pick(client.incoming, server.outgoing),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// One decoded WebSocket message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(Frame),
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First value of a header; repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, token: Option<&str>, heart_beat: HeartBeat) -> Self {
        let frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", format!("{},{}", heart_beat.outgoing, heart_beat.incoming));
        match token {
            Some(token) => frame.header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send_json(destination: &str, body: String) -> Self {
        let mut frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string());
        frame.body = body;
        frame
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        let _ = writeln!(out, "{}", self.command);
        for (k, v) in &self.headers {
            if escape {
                let _ = writeln!(out, "{}:{}", escape_header(k), escape_header(v));
            } else {
                let _ = writeln!(out, "{k}:{v}");
            }
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode one WebSocket text message.
    pub fn decode(raw: &str) -> Result<Inbound, StompError> {
        let mut rest = raw.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(Inbound::Heartbeat);
        }

        let command_line = next_line(&mut rest).ok_or(StompError::Truncated)?;
        let command: Command = command_line
            .parse()
            .map_err(|_| StompError::UnknownCommand(command_line.to_string()))?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = next_line(&mut rest).ok_or(StompError::Truncated)?;
            if line.is_empty() {
                break;
            }
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| StompError::BadHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape_header(k)?, unescape_header(v)?));
            } else {
                headers.push((k.to_string(), v.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };
        let body = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| StompError::BadContentLength(len.to_string()))?;
                let body = rest.get(..len).ok_or(StompError::Truncated)?;
                if rest.as_bytes().get(len) != Some(&0) {
                    return Err(StompError::MissingTerminator);
                }
                body
            }
            None => {
                let end = rest.find('\0').ok_or(StompError::MissingTerminator)?;
                &rest[..end]
            }
        };
        frame.body = body.to_string();
        Ok(Inbound::Frame(frame))
    }
}

fn next_line<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let idx = rest.find('\n')?;
    let line = &rest[..idx];
    *rest = &rest[idx + 1..];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::BadEscape(s.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(raw: &str) -> Frame {
        match Frame::decode(raw).unwrap() {
            Inbound::Frame(f) => f,
            Inbound::Heartbeat => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_connect_encoding() {
        let heart_beat = HeartBeat::new(10000, 10000);
        let encoded = Frame::connect("localhost", Some("tok"), heart_beat).encode();
        assert_eq!(
            encoded,
            concat!(
                "CONNECT\naccept-version:1.2\nhost:localhost\n",
                "heart-beat:10000,10000\nAuthorization:Bearer tok\n\n\0"
            )
        );
        let anon = Frame::connect("localhost", None, HeartBeat::default()).encode();
        assert!(!anon.contains("Authorization"));
    }

    #[test]
    fn test_send_has_content_length() {
        let f = Frame::send_json("/app/text", r#"{"text":"héllo"}"#.to_string());
        assert_eq!(f.get("content-length"), Some("17"));
        assert!(f.encode().ends_with("{\"text\":\"héllo\"}\0"));
    }

    #[test]
    fn test_decode_heartbeat() {
        assert_eq!(Frame::decode("\n").unwrap(), Inbound::Heartbeat);
        assert_eq!(Frame::decode("\r\n").unwrap(), Inbound::Heartbeat);
    }

    #[test]
    fn test_decode_message() {
        let f = frame(concat!(
            "MESSAGE\ndestination:/user/queue/snapshot\nsubscription:sub-0\n\n",
            "{\"a\":1}\0\n"
        ));
        assert_eq!(f.command, Command::Message);
        assert_eq!(f.get("subscription"), Some("sub-0"));
        assert_eq!(f.body, "{\"a\":1}");
    }

    #[test]
    fn test_decode_crlf_and_content_length() {
        let f = frame("MESSAGE\r\ncontent-length:3\r\n\r\na\0b\0");
        assert_eq!(f.body, "a\0b");
    }

    #[test]
    fn test_header_escaping_roundtrip() {
        let f = Frame::new(Command::Send).header("x-note", "a:b\\c\nd");
        let decoded = frame(&f.encode());
        assert_eq!(decoded.get("x-note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn test_connected_headers_not_unescaped() {
        let f = frame("CONNECTED\nversion:1.2\nserver:x\\y\nheart-beat:0,5000\n\n\0");
        assert_eq!(f.get("server"), Some("x\\y"));
        assert_eq!(HeartBeat::parse(f.get("heart-beat").unwrap()), Some(HeartBeat::new(0, 5000)));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let f = frame("MESSAGE\nfoo:1\nfoo:2\n\n\0");
        assert_eq!(f.get("foo"), Some("1"));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Frame::decode("BOGUS\n\n\0"), Err(StompError::UnknownCommand(_))));
        assert!(matches!(
            Frame::decode("MESSAGE\nfoo:1\n\nbody"),
            Err(StompError::MissingTerminator)
        ));
        assert!(matches!(Frame::decode("MESSAGE\nnocolon\n\n\0"), Err(StompError::BadHeader(_))));
        assert!(matches!(Frame::decode("MESSAGE\nfoo:\\x\n\n\0"), Err(StompError::BadEscape(_))));
        assert!(matches!(Frame::decode("MESSAGE\nfoo:1"), Err(StompError::Truncated)));
    }

    #[test]
    fn test_heartbeat_negotiation() {
        let client = HeartBeat::new(10000, 10000);
        assert_eq!(
            HeartBeat::negotiate(client, HeartBeat::new(5000, 20000)),
            HeartBeat::new(20000, 10000)
        );
        assert_eq!(
            HeartBeat::negotiate(client, HeartBeat::new(0, 0)),
            HeartBeat::new(0, 0)
        );
    }
}
