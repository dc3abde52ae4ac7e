//! Hosts manifest loader: reads the peer list and per-peer role assignments
//! from a line-oriented text file.
//!
//! Each non-empty line is `<hostname>:<role>[,<role>...]`, where each role
//! is one of `proposer<k>`, `acceptor<k>`, or `learner`. Order of
//! appearance fixes 1-based server ids.

use std::{fmt, fs, path::Path};

/// A single role tag attached to a host in the manifest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Proposer(u32),
    Acceptor(u32),
    Learner,
}

/// Sentinel returned by [`Manifest::proposer_id`] for a host with no
/// `proposer<k>` role.
pub const NOT_A_PROPOSER: i64 = -1;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    Io(String),
    MalformedLine(String),
    UnknownRole(String),
    HostNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(reason) => write!(f, "unable to read hosts manifest: {reason}"),
            Error::MalformedLine(line) => write!(f, "malformed line in hosts manifest: {line}"),
            Error::UnknownRole(role) => write!(f, "unknown role in hosts manifest: {role}"),
            Error::HostNotFound(host) => {
                write!(f, "hostname `{host}` not found in hosts manifest")
            }
        }
    }
}

impl std::error::Error for Error {}

struct Entry {
    host: String,
    roles: Vec<Role>,
}

/// The parsed hosts manifest: an ordered list of peers and their roles.
pub struct Manifest {
    entries: Vec<Entry>,
}

fn parse_role(raw: &str) -> Result<Role, Error> {
    let raw = raw.trim();
    if raw == "learner" {
        return Ok(Role::Learner);
    }
    if let Some(num) = raw.strip_prefix("proposer") {
        return num
            .parse()
            .map(Role::Proposer)
            .map_err(|_| Error::UnknownRole(raw.to_string()));
    }
    if let Some(num) = raw.strip_prefix("acceptor") {
        return num
            .parse()
            .map(Role::Acceptor)
            .map_err(|_| Error::UnknownRole(raw.to_string()));
    }
    Err(Error::UnknownRole(raw.to_string()))
}

impl Manifest {
    /// Read and parse a hosts manifest from `path`.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse manifest text directly (split out for testing without touching
    /// the filesystem).
    pub fn parse(content: &str) -> Result<Self, Error> {
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (host, roles_str) = line
                .split_once(':')
                .ok_or_else(|| Error::MalformedLine(line.to_string()))?;
            let host = host.trim().to_string();
            if host.is_empty() {
                return Err(Error::MalformedLine(line.to_string()));
            }
            let mut roles = Vec::new();
            for role in roles_str.split(',') {
                roles.push(parse_role(role)?);
            }
            entries.push(Entry { host, roles });
        }
        Ok(Self { entries })
    }

    /// The ordered list of peer hostnames. Order fixes 1-based server ids.
    #[must_use]
    pub fn peers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.host.clone()).collect()
    }

    /// The role tags assigned to `host`, or an empty slice if the host
    /// doesn't appear in the manifest.
    #[must_use]
    pub fn roles(&self, host: &str) -> &[Role] {
        self.entries
            .iter()
            .find(|e| e.host == host)
            .map_or(&[], |e| e.roles.as_slice())
    }

    /// The first `proposer<k>` group number assigned to `host`, or
    /// [`NOT_A_PROPOSER`] if `host` carries no proposer role.
    #[must_use]
    pub fn proposer_id(&self, host: &str) -> i64 {
        self.roles(host)
            .iter()
            .find_map(|r| match r {
                Role::Proposer(k) => Some(i64::from(*k)),
                _ => None,
            })
            .unwrap_or(NOT_A_PROPOSER)
    }

    /// All hostnames carrying any `acceptor<k>` role with `k == proposer_id`.
    /// A host that lists itself as both `proposer<k>` and `acceptor<k>` is
    /// included; the manifest format has no self-exclusion rule.
    #[must_use]
    pub fn acceptors_for(&self, proposer_id: i64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                e.roles.iter().any(|r| matches!(r, Role::Acceptor(k) if i64::from(*k) == proposer_id))
            })
            .map(|e| e.host.clone())
            .collect()
    }

    /// The 1-based index of `host` within `peers`, mirroring the original
    /// `GetPeerIdFromName` helper.
    pub fn peer_id_of(host: &str, peers: &[String]) -> Result<usize, Error> {
        peers
            .iter()
            .position(|p| p == host)
            .map(|i| i + 1)
            .ok_or_else(|| Error::HostNotFound(host.to_string()))
    }
}

/// Strip everything after the first `.`, turning a fully qualified domain
/// name into a short hostname (`peer2.cluster.local` -> `peer2`).
#[must_use]
pub fn short_hostname(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

#[cfg(test)]
mod tests {
    use super::{short_hostname, Manifest, Role, NOT_A_PROPOSER};

    const SAMPLE: &str = "
peer1:proposer1
peer2:acceptor1
peer3:acceptor1
peer4:acceptor1,learner
";

    #[test]
    fn parse_peers_in_order() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.peers(), vec!["peer1", "peer2", "peer3", "peer4"]);
    }

    #[test]
    fn parse_roles() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.roles("peer1"), &[Role::Proposer(1)]);
        assert_eq!(m.roles("peer4"), &[Role::Acceptor(1), Role::Learner]);
    }

    #[test]
    fn proposer_id_present_and_absent() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.proposer_id("peer1"), 1);
        assert_eq!(m.proposer_id("peer2"), NOT_A_PROPOSER);
    }

    #[test]
    fn acceptors_for_includes_self_if_listed() {
        let m = Manifest::parse("peer1:proposer1,acceptor1\npeer2:acceptor1\n").unwrap();
        let acceptors = m.acceptors_for(1);
        assert_eq!(acceptors, vec!["peer1", "peer2"]);
    }

    #[test]
    fn acceptors_for_multiple() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let acceptors = m.acceptors_for(1);
        assert_eq!(acceptors, vec!["peer2", "peer3", "peer4"]);
    }

    #[test]
    fn peer_id_of_is_one_based() {
        let peers = vec!["peer1".to_string(), "peer2".to_string()];
        assert_eq!(Manifest::peer_id_of("peer1", &peers).unwrap(), 1);
        assert_eq!(Manifest::peer_id_of("peer2", &peers).unwrap(), 2);
        assert!(Manifest::peer_id_of("peer9", &peers).is_err());
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(Manifest::parse("peer1_no_colon").is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(Manifest::parse("peer1:weirdrole").is_err());
    }

    #[test]
    fn short_hostname_strips_suffix() {
        assert_eq!(short_hostname("peer2.cluster.local"), "peer2");
        assert_eq!(short_hostname("peer2"), "peer2");
    }
}
