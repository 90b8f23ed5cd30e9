use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::Acquisition;
use crate::model::{round_places, Position};

/// Switches the positioning daemon into its JSON report stream.
const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";

/// One report out of the daemon's stream. Only the fields the fix check
/// needs are kept; everything else in the report is ignored.
#[derive(Debug, Deserialize)]
struct NavReport {
    class: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Connects to the positioning daemon and waits for the first report of
/// kind TPV that carries both coordinates. The stream ending first is a
/// plain "no fix"; so is running out of the time budget. The socket is
/// dropped on every exit path.
pub async fn acquire(addr: &str, budget: Duration) -> Acquisition<Position> {
    let mut stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => return Acquisition::Transport(e),
    };

    if let Err(e) = stream.write_all(WATCH_COMMAND).await {
        return Acquisition::Transport(e);
    }

    match timeout(budget, first_fix(BufReader::new(stream))).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!("no fix within {:?}", budget);
            Acquisition::Unavailable
        }
    }
}

/// Reads reports until one qualifies as a fix. A TPV report missing either
/// coordinate does not qualify; the pair is only ever taken together.
async fn first_fix<R>(mut reader: R) -> Acquisition<Position>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return Acquisition::Unavailable,
            Ok(_) => {}
            Err(e) => return Acquisition::Transport(e),
        }

        // VERSION, DEVICES, SKY and partial lines all fall through here.
        let report: NavReport = match serde_json::from_str(line.trim_end()) {
            Ok(report) => report,
            Err(_) => continue,
        };
        if report.class != "TPV" {
            continue;
        }

        if let (Some(lat), Some(lon)) = (report.lat, report.lon) {
            return Acquisition::Value(Position {
                latitude: round_places(lat, 6),
                longitude: round_places(lon, 6),
            });
        }
    }
}
