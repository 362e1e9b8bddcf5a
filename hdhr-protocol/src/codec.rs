//! Parsers for device replies and lineup data.
//!
//! `hdhomerun_config` speaks plain text. A `get` prints the value, a `set`
//! prints nothing on success, and any failure is printed as a line starting
//! with `ERROR:`.

use crate::error::ProtocolError;
use crate::types::*;

/// Check a raw command reply, returning the trimmed value.
pub fn check_reply(reply: &str) -> Result<String, ProtocolError> {
    let trimmed = reply.trim();
    if let Some(msg) = trimmed.strip_prefix(ERROR_REPLY_PREFIX) {
        return Err(ProtocolError::DeviceReply(msg.trim().to_string()));
    }
    Ok(trimmed.to_string())
}

/// Parse a `/tunerN/status` reply.
pub fn parse_tuner_status(reply: &str) -> Result<TunerStatus, ProtocolError> {
    let mut status = TunerStatus::default();
    let mut saw_channel = false;

    for pair in reply.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "ch" => {
                saw_channel = true;
                status.channel = non_sentinel(value);
            }
            "lock" => status.lock = non_sentinel(value),
            "ss" => status.signal_strength = parse_field(key, value)?,
            "snq" => status.snr_quality = parse_field(key, value)?,
            "seq" => status.symbol_quality = parse_field(key, value)?,
            "bps" => status.bps = parse_field(key, value)?,
            "pps" => status.pps = parse_field(key, value)?,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(ProtocolError::MalformedStatus(reply.trim().to_string()));
    }
    Ok(status)
}

fn non_sentinel(value: &str) -> Option<String> {
    if value == CHANNEL_NONE || value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidStatusField {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Extract `(frequency, program)` from a lineup URL such as
/// `http://192.168.1.10:5004/ch569000000-3`.
pub fn parse_lineup_url(url: &str) -> Result<(u64, u32), ProtocolError> {
    for (pos, _) in url.match_indices("/ch") {
        let rest = &url[pos + 3..];
        let freq_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if freq_len == 0 || rest.as_bytes().get(freq_len) != Some(&b'-') {
            continue;
        }
        let prog = &rest[freq_len + 1..];
        let prog_len = prog.bytes().take_while(u8::is_ascii_digit).count();
        if prog_len == 0 {
            continue;
        }
        if let (Ok(frequency), Ok(program)) =
            (rest[..freq_len].parse::<u64>(), prog[..prog_len].parse::<u32>())
        {
            return Ok((frequency, program));
        }
    }
    Err(ProtocolError::InvalidLineupUrl(url.to_string()))
}

/// Build a [`Channel`] from a lineup entry.
pub fn channel_from_lineup(entry: &LineupEntry) -> Result<Channel, ProtocolError> {
    let (frequency, program_index) = parse_lineup_url(&entry.url)?;
    Ok(Channel::new(
        entry.guide_number.clone(),
        entry.guide_name.clone(),
        frequency,
        program_index,
    ))
}

/// Parse the output of `hdhomerun_config discover`.
///
/// ```text
/// hdhomerun device 1012ABCD found at 192.168.1.10
/// ```
pub fn parse_discover_output(output: &str) -> Vec<DiscoveredDevice> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("hdhomerun device ")?;
            let (device_id, address) = rest.split_once(" found at ")?;
            Some(DiscoveredDevice {
                device_id: device_id.trim().to_string(),
                address: address.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idle_status() {
        let status = parse_tuner_status("ch=none lock=none ss=0 snq=0 seq=0 bps=0 pps=0\n").unwrap();
        assert!(status.is_idle());
        assert_eq!(status.lock, None);
    }

    #[test]
    fn test_parse_busy_status() {
        let status = parse_tuner_status(
            "ch=8vsb:569000000 lock=8vsb ss=87 snq=100 seq=100 bps=19394080 pps=0",
        )
        .unwrap();
        assert!(!status.is_idle());
        assert_eq!(status.channel.as_deref(), Some("8vsb:569000000"));
        assert_eq!(status.lock.as_deref(), Some("8vsb"));
        assert_eq!(status.signal_strength, 87);
        assert_eq!(status.bps, 19_394_080);
    }

    #[test]
    fn test_parse_status_errors() {
        assert!(matches!(
            parse_tuner_status("lock=none ss=0"),
            Err(ProtocolError::MalformedStatus(_))
        ));
        assert!(matches!(
            parse_tuner_status("ch=none ss=high"),
            Err(ProtocolError::InvalidStatusField { .. })
        ));
        // Unknown keys and stray tokens are tolerated.
        assert!(parse_tuner_status("ch=none foo=bar junk").unwrap().is_idle());
    }

    #[test]
    fn test_check_reply() {
        assert_eq!(check_reply("20200907\n").unwrap(), "20200907");
        assert_eq!(check_reply("").unwrap(), "");
        assert_eq!(
            check_reply("ERROR: invalid channel\n"),
            Err(ProtocolError::DeviceReply("invalid channel".to_string()))
        );
    }

    #[test]
    fn test_parse_lineup_url() {
        assert_eq!(
            parse_lineup_url("http://192.168.1.10/ch569000000-3").unwrap(),
            (569_000_000, 3)
        );
        assert_eq!(
            parse_lineup_url("http://192.168.1.10:5004/auto/ch473000000-12?x=1").unwrap(),
            (473_000_000, 12)
        );
        assert!(parse_lineup_url("http://192.168.1.10/auto/v7.1").is_err());
        assert!(parse_lineup_url("http://192.168.1.10/ch569000000").is_err());
    }

    #[test]
    fn test_channel_from_lineup() {
        let entry = LineupEntry {
            guide_number: "7.1".to_string(),
            guide_name: "KATU".to_string(),
            url: "http://192.168.1.10/ch569000000-3".to_string(),
        };
        let ch = channel_from_lineup(&entry).unwrap();
        assert_eq!(ch, Channel::new("7.1", "KATU", 569_000_000, 3));
    }

    #[test]
    fn test_parse_discover_output() {
        let out = "hdhomerun device 1012ABCD found at 192.168.1.10\n\
                   some noise\n\
                   hdhomerun device 1013BEEF found at 192.168.1.11\n";
        let devices = parse_discover_output(out);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].device_id, "1012ABCD");
        assert_eq!(devices[0].address, "192.168.1.10");
        assert!(parse_discover_output("no devices found\n").is_empty());
    }
}
