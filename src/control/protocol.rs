//! Tor control protocol framing: reply parsing and command formatting.

use super::{ConfSetting, ControlError, ControlResult};

/// A complete reply from the control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub code: u16,
    /// Reply text per line, status code and separator stripped. Data
    /// blocks (`NNN+`) are folded into their line with `\n` separators.
    pub lines: Vec<String>,
}

impl ControlReply {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Convert a non-2xx reply into an error carrying the daemon's text.
    pub fn into_result(self) -> ControlResult<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ControlError::Rejected {
                code: self.code,
                message: self.lines.join(" "),
            })
        }
    }

    /// Values reported for `key` by GETCONF.
    ///
    /// A bare `key` line means the option is unset and contributes nothing.
    pub fn values_for(&self, key: &str) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| {
                let (name, value) = line.split_once('=')?;
                if !name.eq_ignore_ascii_case(key) {
                    return None;
                }
                Some(unquote_value(value))
            })
            .collect()
    }
}

/// Split a reply line into `(code, separator, text)`.
pub(crate) fn split_status_line(line: &str) -> ControlResult<(u16, char, &str)> {
    if line.len() < 4 || !line.is_char_boundary(3) {
        return Err(ControlError::Protocol(format!("short reply line: {:?}", line)));
    }
    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| ControlError::Protocol(format!("bad status code in {:?}", line)))?;
    let sep = line[3..].chars().next().unwrap_or(' ');
    if !matches!(sep, ' ' | '-' | '+') {
        return Err(ControlError::Protocol(format!("bad separator in {:?}", line)));
    }
    Ok((code, sep, &line[4..]))
}

/// Quote a value as a control-protocol QuotedString.
pub fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Undo [`quote_value`]. Unquoted input is returned unchanged.
pub(crate) fn unquote_value(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Build a single SETCONF command line (without CRLF).
pub(crate) fn format_setconf(settings: &[ConfSetting]) -> String {
    let mut cmd = String::from("SETCONF");
    for setting in settings {
        if setting.values.is_empty() {
            cmd.push(' ');
            cmd.push_str(&setting.key);
            continue;
        }
        for value in &setting.values {
            cmd.push(' ');
            cmd.push_str(&setting.key);
            cmd.push('=');
            cmd.push_str(&quote_value(value));
        }
    }
    cmd
}
