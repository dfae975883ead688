//! Robot controller wire protocol.
//!
//! Plain text, case-sensitive, no request identifiers. Commands are written
//! without a terminator; acknowledgements are matched by exact equality.

use std::time::Duration;

use crate::job::Verdict;

pub const PICKUP_PRINT: &str = "ROBOT_PICKUP_PRINT";
pub const PLACE_GOOD: &str = "ROBOT_PLACE_GOOD";
pub const PLACE_BAD: &str = "ROBOT_PLACE_BAD";

pub const PICKUP_COMPLETE: &str = "ROBOT_PICKUP_COMPLETE";
pub const PLACE_GOOD_COMPLETE: &str = "ROBOT_PLACE_GOOD_COMPLETE";
pub const PLACE_BAD_COMPLETE: &str = "ROBOT_PLACE_BAD_COMPLETE";

/// Size of a single read from the controller socket.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Which sorting bin an inspected object goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bin {
    Good,
    Bad,
}

impl Bin {
    /// Route a verdict to a bin. Uncertain objects are treated as defective.
    pub fn for_verdict(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Good => Bin::Good,
            Verdict::Bad | Verdict::Uncertain => Bin::Bad,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bin::Good => "good",
            Bin::Bad => "bad",
        }
    }
}

/// One outbound instruction and the acknowledgement that confirms it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Text sent to the controller.
    pub text: String,
    /// Exact acknowledgement expected back.
    pub expected_ack: &'static str,
    /// How long to wait for the acknowledgement.
    pub timeout: Duration,
}

impl Command {
    /// Move the finished print from the bed to the inspection position.
    pub fn pickup(job_id: &str, timeout: Duration) -> Self {
        Self {
            text: format!("{} {}", PICKUP_PRINT, job_id),
            expected_ack: PICKUP_COMPLETE,
            timeout,
        }
    }

    /// Drop the inspected object into a bin.
    pub fn place(bin: Bin, job_id: &str, timeout: Duration) -> Self {
        let (verb, ack) = match bin {
            Bin::Good => (PLACE_GOOD, PLACE_GOOD_COMPLETE),
            Bin::Bad => (PLACE_BAD, PLACE_BAD_COMPLETE),
        };
        Self {
            text: format!("{} {}", verb, job_id),
            expected_ack: ack,
            timeout,
        }
    }

    /// The command verb without its argument, for logs and metrics.
    pub fn verb(&self) -> &str {
        self.text.split_whitespace().next().unwrap_or_default()
    }
}

/// Decode one raw read into messages.
///
/// A chunk without line breaks is a single message. Controllers that
/// terminate messages with newlines, or whose messages were coalesced into
/// one read, are split on line breaks. Fragments are trimmed and empty ones
/// dropped.
pub fn decode_chunk(chunk: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(chunk)
        .split(&['\n', '\r'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickup_command() {
        let cmd = Command::pickup("42", Duration::from_secs(60));
        assert_eq!(cmd.text, "ROBOT_PICKUP_PRINT 42");
        assert_eq!(cmd.expected_ack, "ROBOT_PICKUP_COMPLETE");
        assert_eq!(cmd.verb(), "ROBOT_PICKUP_PRINT");
    }

    #[test]
    fn test_place_commands() {
        let good = Command::place(Bin::Good, "42", Duration::from_secs(30));
        assert_eq!(good.text, "ROBOT_PLACE_GOOD 42");
        assert_eq!(good.expected_ack, "ROBOT_PLACE_GOOD_COMPLETE");

        let bad = Command::place(Bin::Bad, "42", Duration::from_secs(30));
        assert_eq!(bad.text, "ROBOT_PLACE_BAD 42");
        assert_eq!(bad.expected_ack, "ROBOT_PLACE_BAD_COMPLETE");
    }

    #[test]
    fn test_verdict_routing() {
        assert_eq!(Bin::for_verdict(Verdict::Good), Bin::Good);
        assert_eq!(Bin::for_verdict(Verdict::Bad), Bin::Bad);
        assert_eq!(Bin::for_verdict(Verdict::Uncertain), Bin::Bad);
    }

    #[test]
    fn test_decode_single_message() {
        assert_eq!(
            decode_chunk(b"ROBOT_PICKUP_COMPLETE"),
            vec!["ROBOT_PICKUP_COMPLETE"]
        );
        assert_eq!(
            decode_chunk(b"  ROBOT_PICKUP_COMPLETE \r\n"),
            vec!["ROBOT_PICKUP_COMPLETE"]
        );
    }

    #[test]
    fn test_decode_coalesced_lines() {
        assert_eq!(
            decode_chunk(b"HELLO\nROBOT_PLACE_BAD_COMPLETE\n\n"),
            vec!["HELLO", "ROBOT_PLACE_BAD_COMPLETE"]
        );
    }

    #[test]
    fn test_decode_whitespace_only_chunk() {
        assert!(decode_chunk(b" \r\n ").is_empty());
    }

    #[test]
    fn test_decode_is_case_preserving() {
        assert_eq!(decode_chunk(b"robot_pickup_complete"), vec!["robot_pickup_complete"]);
    }
}
