//! Proxy-aware client IP resolution.

use std::collections::HashMap;

/// Header set by a cluster load balancer with the real client address.
pub const CLUSTER_CLIENT_IP_HEADER: &str = "x-cluster-client-ip";

/// Standard forwarded-for header appended by intermediate proxies.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Tag used when falling back to the raw transport peer address.
const CLIENT_IP_TAG: &str = "client-ip";

/// Resolves the client address behind any proxies.
///
/// Checked in strict priority order: the cluster-assigned client-IP
/// header, then the forwarded-for header (first hop), then the raw peer
/// address tagged `client-ip`. First match wins. The returned pair is
/// `(source_tag, ip)`; the tag names where the address came from, for
/// proxy-aware log lines.
///
/// Header names are expected lowercase (the transport layer normalizes
/// them on ingest).
pub fn find_proxied_ip(
    headers: &HashMap<String, String>,
    peer: Option<String>,
) -> (String, String) {
    if let Some(ip) = headers.get(CLUSTER_CLIENT_IP_HEADER) {
        return (CLUSTER_CLIENT_IP_HEADER.to_string(), ip.clone());
    }
    if let Some(forwarded) = headers.get(FORWARDED_FOR_HEADER) {
        // The header may carry a hop chain; the first entry is the client.
        let first = forwarded
            .split(',')
            .next()
            .unwrap_or(forwarded)
            .trim()
            .to_string();
        return (FORWARDED_FOR_HEADER.to_string(), first);
    }
    (
        CLIENT_IP_TAG.to_string(),
        peer.unwrap_or_else(|| "unknown".to_string()),
    )
}
