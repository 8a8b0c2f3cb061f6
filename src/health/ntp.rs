// src/health/ntp.rs
//! Upstream time synchronization status from `ntpq -np`

use std::process::Command;
use tracing::{debug, warn};

/// Answers whether the host clock is disciplined by a usable time source
pub trait TimeSyncProbe: Send {
    fn is_synchronized(&mut self) -> bool;
}

/// One row of the `ntpq -np` peer table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtpPeer {
    /// Selection tally code: `*` system peer, `+` candidate, and so on
    pub tally: char,
    pub remote: String,
    /// Seconds since the last packet; `None` when ntpq prints `-`
    pub when_s: Option<u64>,
    pub poll_s: u64,
    /// Reachability shift register
    pub reach: u32,
}

impl NtpPeer {
    /// Selected or candidate peer heard from within three poll intervals
    pub fn is_working(&self) -> bool {
        matches!(self.tally, '*' | '+')
            && self.reach > 0
            && self.when_s.is_some_and(|when| when <= 3 * self.poll_s)
    }
}

/// `when` and `poll` switch to m/h/d suffixes for large values
fn parse_interval(field: &str) -> Option<u64> {
    let (digits, scale) = match field.chars().last()? {
        'm' => (&field[..field.len() - 1], 60),
        'h' => (&field[..field.len() - 1], 3600),
        'd' => (&field[..field.len() - 1], 86_400),
        _ => (field, 1),
    };
    digits.parse::<u64>().ok().map(|value| value * scale)
}

/// Parse the peer rows that follow the `====` separator line
pub fn parse_ntpq_peers(output: &str) -> Vec<NtpPeer> {
    let Some(separator) = output.lines().position(|line| line.starts_with("===")) else {
        return Vec::new();
    };

    output
        .lines()
        .skip(separator + 1)
        .filter_map(|line| {
            let tally = line.chars().next()?;
            let fields: Vec<&str> = line[tally.len_utf8()..].split_whitespace().collect();
            if fields.len() < 7 {
                return None;
            }
            Some(NtpPeer {
                tally,
                remote: fields[0].to_string(),
                when_s: parse_interval(fields[4]),
                poll_s: parse_interval(fields[5])?,
                reach: u32::from_str_radix(fields[6], 8).ok()?,
            })
        })
        .collect()
}

/// Healthy when at least one peer is working
pub fn time_source_healthy(peers: &[NtpPeer]) -> bool {
    peers.iter().any(NtpPeer::is_working)
}

/// Probe that shells out to `ntpq`
pub struct NtpqProbe {
    command: String,
}

impl NtpqProbe {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl TimeSyncProbe for NtpqProbe {
    fn is_synchronized(&mut self) -> bool {
        let output = match Command::new(&self.command).arg("-np").output() {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %self.command, error = %e, "failed to query NTP status");
                return false;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.to_lowercase().starts_with("no association id's returned") {
            warn!("NTP daemon has no associations");
            return false;
        }

        let peers = parse_ntpq_peers(&stdout);
        debug!(peers = peers.len(), "NTP peers parsed");
        let healthy = time_source_healthy(&peers);
        if !healthy {
            warn!("no working NTP server found");
        }
        healthy
    }
}
