//! Chat line classification

use super::ChatError;
use crate::types::COMMAND_MARKER;

/// A classified inbound chat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Liveness probe, must be answered with the same nonce
    Ping { nonce: &'a str },
    /// A message posted to a channel
    ChannelMessage {
        sender: &'a str,
        channel: &'a str,
        payload: &'a str,
    },
    /// Joins, parts and name lists
    Membership,
    Other,
}

/// Classify one line received from the chat network
pub fn parse_line(line: &str) -> Result<Frame<'_>, ChatError> {
    let line = line.trim();

    // IRCv3 message tags come before the prefix
    let rest = match line.strip_prefix('@') {
        Some(tagged) => tagged.split_once(' ').map_or("", |(_, rest)| rest),
        None => line,
    };

    let tokens: Vec<&str> = rest.splitn(4, ' ').collect();
    if tokens.len() < 2 {
        return Err(ChatError::ProtocolViolation(format!(
            "line has no spaces: {:?}",
            line
        )));
    }

    if tokens[0] == "PING" {
        let nonce = rest.split_once(' ').map_or("", |(_, nonce)| nonce);
        return Ok(Frame::Ping { nonce });
    }

    match tokens[1] {
        "PRIVMSG" => {
            if tokens.len() < 4 {
                return Err(ChatError::ProtocolViolation(format!(
                    "PRIVMSG without channel or text: {:?}",
                    line
                )));
            }
            let sender = tokens[0].trim_start_matches(':');
            let sender = sender.split('!').next().unwrap_or(sender);
            let payload = tokens[3].strip_prefix(':').unwrap_or(tokens[3]);
            Ok(Frame::ChannelMessage {
                sender,
                channel: tokens[2],
                payload,
            })
        }
        "JOIN" | "PART" | "353" | "366" => Ok(Frame::Membership),
        _ => Ok(Frame::Other),
    }
}

/// Extract the vote text from a channel message.
///
/// Only messages starting with the command marker are votes. The result is
/// lower-cased with the marker removed.
pub fn vote_command(payload: &str) -> Option<String> {
    let payload = payload.trim().to_lowercase();
    let command = payload.strip_prefix(COMMAND_MARKER)?;
    let command = command.trim_start_matches(COMMAND_MARKER).trim();
    if command.is_empty() {
        None
    } else {
        Some(command.to_string())
    }
}
