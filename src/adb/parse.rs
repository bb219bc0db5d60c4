/// One line of `adb devices` output: a transport-assigned serial plus the
/// connection state the daemon reported (`device`, `unauthorized`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
}

/// Parse enumeration output. The header line, daemon banner lines and empty
/// lines are discarded; the first whitespace token of every remaining line
/// is taken as the serial. A line with no state token still counts.
pub fn parse_devices_output(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?.to_string();
            let state = tokens.next().unwrap_or_default().to_string();
            Some(DeviceSummary { serial, state })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_adb_devices_output() {
        let output = "List of devices attached\n0123456789ABCDEF\tdevice\nemulator-5554\tunauthorized\n";
        let parsed = parse_devices_output(output);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].serial, "0123456789ABCDEF");
        assert_eq!(parsed[0].state, "device");
        assert_eq!(parsed[1].serial, "emulator-5554");
        assert_eq!(parsed[1].state, "unauthorized");
    }

    #[test]
    fn skips_header_and_daemon_banner() {
        let output = "* daemon not running; starting now at tcp:5037\n* daemon started successfully\nList of devices attached\nABC123\tdevice\n";
        let parsed = parse_devices_output(output);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].serial, "ABC123");
    }

    #[test]
    fn keeps_serial_without_state_token() {
        let parsed = parse_devices_output("List of devices attached\nABC123\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].serial, "ABC123");
        assert_eq!(parsed[0].state, "");
    }

    #[test]
    fn empty_enumeration_yields_no_devices() {
        assert!(parse_devices_output("List of devices attached\n").is_empty());
        assert!(parse_devices_output("").is_empty());
    }
}
