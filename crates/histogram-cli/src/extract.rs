use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

const OCTET: &str = "(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";

// Octet grammar lives in the pattern itself so `256.1.1.1` neither
// matches nor lets a shorter suffix like `56.1.1.1` match.
#[allow(clippy::expect_used)]
static IPV4_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{OCTET}(?:\.{OCTET}){{3}}\b")).expect("static ipv4 pattern")
});

/// Scans `text` for public IPv4 literals. Addresses inside the RFC1918
/// blocks (10/8, 172.16/12, 192.168/16) are dropped.
pub fn extract_ips(text: &str) -> BTreeSet<Ipv4Addr> {
    IPV4_CANDIDATE
        .find_iter(text)
        .filter_map(|candidate| candidate.as_str().parse::<Ipv4Addr>().ok())
        .filter(|ip| !ip.is_private())
        .collect()
}
