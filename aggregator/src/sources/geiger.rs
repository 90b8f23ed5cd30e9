use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::Acquisition;

/// Framing prefix the counter puts on every report line.
const FRAME_PREFIX: &str = "$GEO";
const FIELD_DELIMITER: char = ',';

/// Result of parsing one line off the counter. The public contract merges
/// everything but `Count` into "absent", but the modes stay distinct here
/// so a bad count field is tellable from an idle wire.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// A well-formed report carrying the count for the read interval.
    Count(i64),
    /// The framing prefix matched but the count field is missing or not
    /// an integer.
    Malformed,
    /// An empty line, or a line from some other talker on the wire.
    NoData,
}

/// Parses one counter line, trailing whitespace stripped.
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim_end();
    if line.is_empty() {
        return Frame::NoData;
    }

    let mut fields = line.split(FIELD_DELIMITER);
    if fields.next() != Some(FRAME_PREFIX) {
        return Frame::NoData;
    }

    match fields.next().map(str::parse::<i64>) {
        Some(Ok(count)) => Frame::Count(count),
        _ => Frame::Malformed,
    }
}

/// Reads a single report line from the counter's stream bridge. A malformed
/// frame never aborts the cycle; it and a silent wire both collapse to
/// `Unavailable` once counted here.
pub async fn acquire(addr: &str, read_timeout: Duration) -> Acquisition<i64> {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => return Acquisition::Transport(e),
    };

    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    match timeout(read_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(0)) => Acquisition::Unavailable,
        Ok(Ok(_)) => match parse_frame(&line) {
            Frame::Count(count) => Acquisition::Value(count),
            Frame::Malformed => {
                debug!("malformed counter frame: {:?}", line.trim_end());
                Acquisition::Unavailable
            }
            Frame::NoData => Acquisition::Unavailable,
        },
        Ok(Err(e)) => Acquisition::Transport(e),
        Err(_) => {
            debug!("no counter frame within {:?}", read_timeout);
            Acquisition::Unavailable
        }
    }
}
