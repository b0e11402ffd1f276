//! Parsers for the address and port strings used in proxy/firewall settings.

use crate::error::{BridgeError, BridgeResult};

/// Parse a port number in `1..=65535`. Only ASCII digits are accepted.
pub fn parse_port(port: &str) -> BridgeResult<u16> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BridgeError::InvalidInput(format!(
            "invalid port string: '{}'",
            port
        )));
    }
    match port.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(p as u16),
        _ => Err(BridgeError::InvalidInput(format!(
            "port must be in range [1,65535]: '{}'",
            port
        ))),
    }
}

/// Parse `ADDRESS:PORT`. Exactly one colon is allowed, so bare IPv6
/// addresses are rejected.
pub fn parse_addr_port(addr_port: &str) -> BridgeResult<(String, u16)> {
    let tokens: Vec<&str> = addr_port.split(':').collect();
    if tokens.len() != 2 {
        return Err(BridgeError::InvalidInput(format!(
            "invalid ADDRESS:PORT string: '{}'",
            addr_port
        )));
    }
    Ok((tokens[0].to_string(), parse_port(tokens[1])?))
}

/// Parse `USERNAME:PASSWORD`, splitting at the first colon.
pub fn parse_username_password(credentials: &str) -> BridgeResult<(String, String)> {
    // the input may hold a password, keep it out of the error
    let (username, password) = credentials.split_once(':').ok_or_else(|| {
        BridgeError::InvalidInput("invalid USERNAME:PASSWORD string".to_string())
    })?;
    Ok((username.to_string(), password.to_string()))
}

/// Parse `ADDR:PORT,ADDR:PORT,...` keeping only the ports.
pub fn parse_addr_port_list(list: &str) -> BridgeResult<Vec<u16>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_addr_port(entry).map(|(_, port)| port))
        .collect()
}

/// Parse a comma-separated list of ports, whitespace allowed around entries.
pub fn parse_port_list(list: &str) -> BridgeResult<Vec<u16>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_port)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_range() {
        assert_eq!(parse_port("1").unwrap(), 1);
        assert_eq!(parse_port("65535").unwrap(), 65535);
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("99999999999").is_err());
        assert!(parse_port("-1").is_err());
        assert!(parse_port("8o").is_err());
        assert!(parse_port("").is_err());
    }

    #[test]
    fn test_parse_addr_port() {
        assert_eq!(
            parse_addr_port("127.0.0.1:9050").unwrap(),
            ("127.0.0.1".to_string(), 9050)
        );
        assert!(parse_addr_port("127.0.0.1").is_err());
        assert!(parse_addr_port("::1:9050").is_err());
    }

    #[test]
    fn test_parse_username_password_first_colon() {
        assert_eq!(
            parse_username_password("user:pa:ss").unwrap(),
            ("user".to_string(), "pa:ss".to_string())
        );
        let err = parse_username_password("secret").unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_parse_lists() {
        assert_eq!(
            parse_addr_port_list("*:80, *:443").unwrap(),
            vec![80, 443]
        );
        assert_eq!(parse_port_list(" 80 ,443,").unwrap(), vec![80, 443]);
        assert!(parse_port_list("80,http").is_err());
    }
}
