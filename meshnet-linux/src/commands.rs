//! Operator commands read line by line from stdin.

use meshnet_core::{AddressParseError, PhysicalAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `send <addr> <text>`
    Send(PhysicalAddress, Vec<u8>),
    /// `uplink <text>`: send to the nearest gateway.
    Uplink(Vec<u8>),
    /// `route <addr>`: flood a route request.
    Route(PhysicalAddress),
    Discover,
    /// `gateway on|off`
    Gateway(bool),
    /// Print peers and routes as JSON.
    Status,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command {0:?} (try: send, uplink, route, discover, gateway, status)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error(transparent)]
    Address(#[from] AddressParseError),
}

impl Command {
    /// Parse one line. Blank lines yield None.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim_start()),
            None => (line, ""),
        };
        let cmd = match word {
            "send" => {
                let (to, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(CommandError::Usage("send <addr> <text>"))?;
                Command::Send(to.parse()?, text.trim_start().as_bytes().to_vec())
            }
            "uplink" if !rest.is_empty() => Command::Uplink(rest.as_bytes().to_vec()),
            "uplink" => return Err(CommandError::Usage("uplink <text>")),
            "route" if !rest.is_empty() => Command::Route(rest.parse()?),
            "route" => return Err(CommandError::Usage("route <addr>")),
            "discover" => Command::Discover,
            "gateway" => match rest {
                "on" => Command::Gateway(true),
                "off" => Command::Gateway(false),
                _ => return Err(CommandError::Usage("gateway on|off")),
            },
            "status" => Command::Status,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(cmd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        let a: PhysicalAddress = "02:00:00:00:00:03".parse().unwrap();
        assert_eq!(
            Command::parse("send 02:00:00:00:00:03 hello world").unwrap(),
            Some(Command::Send(a, b"hello world".to_vec()))
        );
        assert_eq!(
            Command::parse("  uplink temp=21 ").unwrap(),
            Some(Command::Uplink(b"temp=21".to_vec()))
        );
        assert_eq!(
            Command::parse("route 02:00:00:00:00:03").unwrap(),
            Some(Command::Route(a))
        );
        assert_eq!(Command::parse("discover").unwrap(), Some(Command::Discover));
        assert_eq!(
            Command::parse("gateway on").unwrap(),
            Some(Command::Gateway(true))
        );
        assert_eq!(Command::parse("status").unwrap(), Some(Command::Status));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Command::parse("send 02:00:00:00:00:03"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            Command::parse("send nowhere hi"),
            Err(CommandError::Address(_))
        ));
        assert!(matches!(
            Command::parse("gateway maybe"),
            Err(CommandError::Usage(_))
        ));
        assert!(matches!(
            Command::parse("reboot"),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!(Command::parse("uplink"), Err(CommandError::Usage(_))));
    }
}
