use std::net::IpAddr;

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
/// Hostnames double as artifact file names, so this also guards the build directory.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    if hostname.starts_with('.') {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// A management address is an IPv4 or IPv6 literal, or a resolvable name
pub fn is_valid_mgmt_address(addr: &str) -> bool {
    addr.parse::<IpAddr>().is_ok() || is_valid_hostname(addr)
}

/// Truncate output to a maximum number of lines
pub fn truncate_lines(s: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= max_lines {
        s.to_string()
    } else {
        let truncated: Vec<&str> = lines[..max_lines].to_vec();
        format!("{}\n... ({} more lines)", truncated.join("\n"), lines.len() - max_lines)
    }
}

/// Does a line of device output look like the CLI rejecting a command?
pub fn is_cli_error_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("% Invalid")
        || trimmed.starts_with("% Incomplete")
        || trimmed.starts_with("% Ambiguous")
        || trimmed.starts_with("ERROR:")
        || trimmed.starts_with("Invalid input")
        || trimmed.starts_with("Invalid command")
}
