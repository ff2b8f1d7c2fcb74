use std::time::Duration;

use crate::error::{Error, Result};
use crate::hasher::Hasher;

/// Maximum size of a topic in bytes.
pub const MAX_TOPIC_LENGTH: usize = 1 << 16;

/// Maximum TTL accepted on a topic, one year.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// One component of a dotted topic path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Part {
    Literal(String),
    /// `*`: matches exactly one part at this level.
    SingleWildcard,
    /// `...`: matches every descendant; only valid as the terminal part.
    MultiWildcard,
}

impl Part {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Part::Literal(s) => s.as_bytes(),
            Part::SingleWildcard => b"*",
            Part::MultiWildcard => b"...",
        }
    }
}

/// The recency bound parsed from a `last=` topic option: either a duration
/// window or a plain result count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Last {
    Window(Duration),
    Count(usize),
}

/// A parsed topic: dotted parts with optional `?ttl=`/`?last=` options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topic {
    pub parts: Vec<Part>,
    /// Number of non-wildcard parts.
    pub depth: u8,
    pub ttl: Option<Duration>,
    pub last: Option<Last>,
}

impl Topic {
    /// Parses a topic string: `part ('.' part)* ('?' kv ('&' kv)*)?`.
    pub fn parse(topic: &[u8]) -> Result<Self> {
        if topic.is_empty() {
            return Err(Error::BadRequest("topic is empty".to_string()));
        }
        if topic.len() > MAX_TOPIC_LENGTH {
            return Err(Error::BadRequest("topic is too large".to_string()));
        }
        let topic = std::str::from_utf8(topic)
            .map_err(|_| Error::BadRequest("topic is not valid utf-8".to_string()))?;

        let (path, options) = match topic.split_once('?') {
            Some((p, o)) => (p, Some(o)),
            None => (topic, None),
        };

        let mut parts = Vec::new();
        let raw_parts: Vec<&str> = path.split('.').collect();
        // A lone "..." splits into three empty strings; handle it up front.
        if path == "..." {
            parts.push(Part::MultiWildcard);
        } else {
            let last_idx = raw_parts.len() - 1;
            let mut i = 0;
            while i < raw_parts.len() {
                let raw = raw_parts[i];
                match raw {
                    "*" => parts.push(Part::SingleWildcard),
                    "" => {
                        // "a..." splits as ["a", "", "", ""]: a trailing run of
                        // three empty parts is the multi-level wildcard.
                        if i + 2 == last_idx
                            && raw_parts[i + 1].is_empty()
                            && raw_parts[i + 2].is_empty()
                        {
                            parts.push(Part::MultiWildcard);
                            i = raw_parts.len();
                            continue;
                        }
                        return Err(Error::BadRequest("topic part is empty".to_string()));
                    }
                    lit => {
                        if lit.contains('*') {
                            return Err(Error::BadRequest(format!("invalid topic part {lit:?}")));
                        }
                        parts.push(Part::Literal(lit.to_string()));
                    }
                }
                i += 1;
            }
        }

        // `...` anywhere but the end fails the grammar.
        for (i, part) in parts.iter().enumerate() {
            if *part == Part::MultiWildcard && i != parts.len() - 1 {
                return Err(Error::BadRequest(
                    "multi-level wildcard must be terminal".to_string(),
                ));
            }
        }

        let depth = parts
            .iter()
            .filter(|p| matches!(p, Part::Literal(_)))
            .count() as u8;

        let mut t = Topic {
            parts,
            depth,
            ttl: None,
            last: None,
        };

        if let Some(options) = options {
            for kv in options.split('&') {
                let (key, value) = kv
                    .split_once('=')
                    .ok_or_else(|| Error::BadRequest(format!("invalid topic option {kv:?}")))?;
                match key {
                    "ttl" => {
                        let ttl = parse_duration(value).ok_or_else(|| {
                            Error::BadRequest(format!("invalid ttl {value:?}"))
                        })?;
                        if ttl > MAX_TTL {
                            return Err(Error::BadRequest("ttl is too large".to_string()));
                        }
                        t.ttl = Some(ttl);
                    }
                    "last" => {
                        if let Some(dur) = parse_duration(value) {
                            t.last = Some(Last::Window(dur));
                        } else if let Ok(count) = value.parse::<usize>() {
                            t.last = Some(Last::Count(count));
                        } else {
                            return Err(Error::BadRequest(format!("invalid last {value:?}")));
                        }
                    }
                    _ => return Err(Error::BadRequest(format!("unknown topic option {key:?}"))),
                }
            }
        }

        Ok(t)
    }

    /// True when any part is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.parts
            .iter()
            .any(|p| !matches!(p, Part::Literal(_)))
    }

    /// 64-bit topic hash over contract, parts and depth, stable across runs.
    pub fn hash(&self, contract: u32) -> u64 {
        let mut h = Hasher::new();
        h.write(&contract.to_le_bytes());
        for part in &self.parts {
            h.write(part.as_bytes());
        }
        h.write(&[self.depth]);
        h.finish()
    }

    /// Canonical dotted path (no options), stored once per topic in the
    /// data file.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push(b'.');
            }
            out.extend_from_slice(part.as_bytes());
        }
        out
    }

    /// Dotted path with the contract prepended as its own level. Trie
    /// paths and stored topic text use this form, which keeps contracts
    /// isolated from each other.
    pub fn marshal_with_contract(&self, contract: u32) -> Vec<u8> {
        let mut out = contract.to_string().into_bytes();
        out.push(b'.');
        out.extend_from_slice(&self.marshal());
        out
    }

    /// Parses a marshalled path back into a topic.
    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        Self::parse(raw)
    }
}

/// Builds a trie path: the contract as its own leading level, then the
/// topic parts.
pub fn contract_path(contract: u32, parts: &[Part]) -> Vec<Part> {
    let mut path = Vec::with_capacity(parts.len() + 1);
    path.push(Part::Literal(contract.to_string()));
    path.extend_from_slice(parts);
    path
}

/// Parses durations of the form `10ms`, `1h`, `1h30m`, `2d`. Returns None
/// for anything that does not end in a known unit.
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits_end == 0 {
            return None;
        }
        let value: u64 = rest[..digits_end].parse().ok()?;
        let unit_end = rest[digits_end..]
            .find(|c: char| c.is_ascii_digit())
            .map(|i| digits_end + i)
            .unwrap_or(rest.len());
        let unit = &rest[digits_end..unit_end];
        let dur = match unit {
            "ns" => Duration::from_nanos(value),
            "us" => Duration::from_micros(value),
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86400),
            _ => return None,
        };
        total += dur;
        rest = &rest[unit_end..];
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal_topic() {
        let t = Topic::parse(b"teams.alpha.ch1.u1").expect("parse failed");
        assert_eq!(t.parts.len(), 4);
        assert_eq!(t.depth, 4);
        assert!(!t.is_wildcard());
        assert_eq!(t.ttl, None);
        assert_eq!(t.last, None);
    }

    #[test]
    fn test_parse_single_wildcard() {
        let t = Topic::parse(b"teams.*.ch1").expect("parse failed");
        assert_eq!(t.parts[1], Part::SingleWildcard);
        assert_eq!(t.depth, 2);
        assert!(t.is_wildcard());
    }

    #[test]
    fn test_parse_multi_wildcard() {
        let t = Topic::parse(b"teams...").expect("parse failed");
        assert_eq!(
            t.parts,
            vec![
                Part::Literal("teams".to_string()),
                Part::MultiWildcard
            ]
        );
        assert_eq!(t.depth, 1);

        let t = Topic::parse(b"...").expect("parse failed");
        assert_eq!(t.parts, vec![Part::MultiWildcard]);
        assert_eq!(t.depth, 0);
    }

    #[test]
    fn test_parse_options() {
        let t = Topic::parse(b"teams.alpha?ttl=1h&last=30m").expect("parse failed");
        assert_eq!(t.ttl, Some(Duration::from_secs(3600)));
        assert_eq!(t.last, Some(Last::Window(Duration::from_secs(1800))));

        let t = Topic::parse(b"teams.alpha?last=50").expect("parse failed");
        assert_eq!(t.last, Some(Last::Count(50)));
    }

    #[test]
    fn test_parse_invalid_topics() {
        assert!(Topic::parse(b"").is_err());
        assert!(Topic::parse(b"teams..alpha").is_err());
        assert!(Topic::parse(b"teams.al*pha").is_err());
        assert!(Topic::parse(b"teams....alpha").is_err());
        assert!(Topic::parse(b"teams.alpha?ttl=banana").is_err());
        assert!(Topic::parse(b"teams.alpha?bogus=1").is_err());
        assert!(Topic::parse(&vec![b'a'; MAX_TOPIC_LENGTH + 1]).is_err());
    }

    #[test]
    fn test_hash_stability_and_contract_isolation() {
        let t = Topic::parse(b"teams.alpha.ch1").expect("parse failed");
        let u = Topic::parse(b"teams.alpha.ch1").expect("parse failed");
        assert_eq!(t.hash(1), u.hash(1));
        assert_ne!(t.hash(1), t.hash(2));

        let w = Topic::parse(b"teams.alpha.*").expect("parse failed");
        assert_ne!(t.hash(1), w.hash(1));
    }

    #[test]
    fn test_marshal_round_trip() {
        for raw in [&b"teams.alpha.ch1"[..], b"teams.*.ch1", b"teams..."] {
            let t = Topic::parse(raw).expect("parse failed");
            let m = t.marshal();
            assert_eq!(m, raw);
            assert_eq!(Topic::unmarshal(&m).expect("unmarshal failed").parts, t.parts);
        }
    }

    #[test]
    fn test_contract_path_prefixes_contract() {
        let t = Topic::parse(b"teams.alpha").expect("parse failed");
        let path = contract_path(7, &t.parts);
        assert_eq!(path[0], Part::Literal("7".to_string()));
        assert_eq!(&path[1..], t.parts.as_slice());

        let m = t.marshal_with_contract(7);
        assert_eq!(m, b"7.teams.alpha");
        let u = Topic::unmarshal(&m).expect("unmarshal failed");
        assert_eq!(u.parts, path);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("50ms"), Some(Duration::from_millis(50)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(
            parse_duration("1h30m"),
            Some(Duration::from_secs(5400))
        );
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(172800)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration(""), None);
    }
}
