// Minimal STOMP 1.2 client framing. Only the commands this engine exchanges
// with the chat backend are modeled; everything rides inside websocket text
// messages (SockJS-free endpoint).

use crate::error::DecodeError;

pub(super) const HEARTBEAT: &str = "\n";

pub(super) const PRIVATE_INBOX: &str = "/user/queue/messages";

pub(super) fn group_topic(group_id: i64) -> String {
    format!("/topic/group.{group_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Frame {
    pub(super) command: String,
    pub(super) headers: Vec<(String, String)>,
    pub(super) body: String,
}

impl Frame {
    pub(super) fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: vec![],
            body: String::new(),
        }
    }

    pub(super) fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub(super) fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the wire form: command line, header lines, blank line,
    /// body, NUL terminator.
    pub(super) fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(&self.command);
        out.push('\n');
        for (k, v) in &self.headers {
            out.push_str(k);
            out.push(':');
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse a single server frame. Returns `None` for heartbeat newlines.
    pub(super) fn parse(raw: &str) -> Result<Option<Frame>, DecodeError> {
        let raw = raw.strip_suffix('\0').unwrap_or(raw);
        if raw.trim_matches(['\r', '\n']).is_empty() {
            return Ok(None);
        }

        let mut lines = raw.split('\n');
        let command = lines
            .next()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .ok_or_else(|| DecodeError::MalformedFrame("missing command line".into()))?
            .to_string();

        let mut headers = vec![];
        for line in lines.by_ref() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| DecodeError::MalformedFrame(format!("bad header {line:?}")))?;
            headers.push((name.to_string(), value.to_string()));
        }

        let body = lines.collect::<Vec<_>>().join("\n");
        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

pub(super) fn connect_frame(token: &str, heartbeat_ms: u64) -> Frame {
    Frame::new("CONNECT")
        .header("accept-version", "1.2")
        .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"))
        .header("Authorization", format!("Bearer {token}"))
}

pub(super) fn subscribe_frame(subscription_id: &str, destination: &str) -> Frame {
    Frame::new("SUBSCRIBE")
        .header("id", subscription_id)
        .header("destination", destination)
}

pub(super) fn unsubscribe_frame(subscription_id: &str) -> Frame {
    Frame::new("UNSUBSCRIBE").header("id", subscription_id)
}
