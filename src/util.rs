use std::net::Ipv4Addr;

const AGENT_PORT: &str = "AGENT_PORT";

const DEFAULT_PORT: u16 = 51243;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

fn port_or_default(value: Option<String>) -> u16 {
    value.map_or(DEFAULT_PORT, |res| res.trim().parse().unwrap_or(DEFAULT_PORT))
}

pub fn get_port() -> u16 {
    port_or_default(std::env::var(AGENT_PORT).ok())
}

const AGENT_ADDR: &str = "AGENT_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

fn addr_or_default(value: Option<String>) -> Ipv4Addr {
    value.map_or(DEFAULT_ADDR, |res| res.trim().parse().unwrap_or(DEFAULT_ADDR))
}

pub fn get_addr() -> Ipv4Addr {
    addr_or_default(std::env::var(AGENT_ADDR).ok())
}

const AGENT_API_KEY: &str = "AGENT_API_KEY";

/// Key the agent expects in `X-API-Key`; `None` leaves the agent open
pub fn get_api_key() -> Option<String> {
    std::env::var(AGENT_API_KEY)
        .ok()
        .filter(|key| !key.is_empty())
}

/// Whether a request presenting `presented` may read metrics
pub fn api_key_matches(expected: Option<&str>, presented: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => presented == Some(expected),
    }
}
