//! Shared Policy Registry: ring definitions, the capability whitelist, the
//! injection pattern set, and the destructive-action classifier.
//!
//! This is the single source of truth consulted by both the VSM server and
//! the embedded bridge SDK (`vsm-bridge-sdk`). Queries here are pure and
//! O(1) apart from regex enumeration. At build time the server and SDK
//! link against this same crate; at run time the SDK may overlay a newer
//! snapshot pulled from `/v1/policy/sync` (see `vsm-bridge-sdk::policy_sync`)
//! but that overlay never mutates this registry itself.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Agent privilege ring. Smaller is more trusted. Totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Ring {
    Kernel = 0,
    Driver = 1,
    Service = 2,
    User = 3,
}

impl Ring {
    /// Map an integer to a `Ring`, clamping unrecognized values to `User`
    /// (default-deny: an agent that cannot be classified gets the least
    /// trust, not the most).
    pub fn from_int(value: i64) -> Self {
        match value {
            0 => Ring::Kernel,
            1 => Ring::Driver,
            2 => Ring::Service,
            3 => Ring::User,
            _ => Ring::User,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Ring::Kernel => "KERNEL",
            Ring::Driver => "DRIVER",
            Ring::Service => "SERVICE",
            Ring::User => "USER",
        }
    }
}

/// Wildcard sentinel returned for Ring::Kernel — "allow all". Never handed
/// out over the wire via `/v1/policy/sync` (Ring 0 is omitted there).
pub const WILDCARD: &str = "*";

fn driver_tools() -> &'static [&'static str] {
    &[
        "filesystem_read",
        "subprocess_call",
        "network_limited",
        "database_write",
        "config_read",
        "network_read",
        "database_query",
        "cache_read",
        "event_publish",
        "basic_query",
        "read_only",
        "s3_get_object",
        "s3_put_object",
    ]
}

fn service_tools() -> &'static [&'static str] {
    &[
        "network_read",
        "database_query",
        "cache_read",
        "event_publish",
        "basic_query",
        "read_only",
        "s3_get_object",
    ]
}

fn user_tools() -> &'static [&'static str] {
    &["basic_query", "read_only"]
}

/// The capability whitelist for a given ring. `Ring::Kernel` is not
/// representable here (it is the wildcard, handled separately by
/// `is_capability_allowed`); all other rings map to an explicit finite set.
pub fn capabilities_for(ring: Ring) -> &'static [&'static str] {
    match ring {
        Ring::Kernel => &[],
        Ring::Driver => driver_tools(),
        Ring::Service => service_tools(),
        Ring::User => user_tools(),
    }
}

/// Default-deny capability check. `Ring::Kernel` always answers `true`;
/// every other ring requires `action` to be present in its explicit set —
/// no wildcard, no fall-through, no inheritance between rings.
pub fn is_capability_allowed(ring: Ring, action: &str) -> bool {
    if ring == Ring::Kernel {
        return true;
    }
    capabilities_for(ring).contains(&action)
}

/// Irreversible action names: filesystem/process/database/storage
/// destruction. Lower-cased for case-insensitive membership checks.
fn destructive_action_list() -> &'static [&'static str] {
    &[
        "filesystem_write",
        "filesystem_delete",
        "rm",
        "rmdir",
        "truncate",
        "shell_exec",
        "subprocess_call",
        "database_delete",
        "database_drop",
        "s3_delete",
        "s3_delete_objects",
        "format",
        "wipe",
    ]
}

pub fn destructive_actions() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| destructive_action_list().iter().copied().collect())
}

pub fn is_destructive_action(action: &str) -> bool {
    destructive_actions().contains(action.to_lowercase().as_str())
}

/// Injection pattern source strings, in policy order. Multi-language by
/// design (the original policy source carries Korean variants alongside
/// English ones; spec.md §3 calls for cross-language coverage).
fn injection_pattern_sources() -> &'static [&'static str] {
    &[
        r"ignore\s+(all\s+)?previous\s+instructions",
        r"disregard\s+(?:all\s+)?(?:previous|prior)\s+(?:instructions|context)",
        r"you\s+are\s+now\s+(?:in\s+)?(?:developer|jailbreak|dan)\s+mode",
        r"system\s+prompt\s+(?:reveal|show|display|output)",
        r"print\s+(?:your\s+)?(?:system\s+)?instructions",
        r"act\s+as\s+(?:if\s+)?(?:you\s+(?:have\s+)?no\s+restrictions|an?\s+unrestricted)",
        r"이전\s+지시(?:사항)?\s*(?:무시|삭제|초기화)",
        r"시스템\s+프롬프트\s*(?:누설|출력|보여|공개)",
        r"제한\s*(?:없이|해제|무시)",
    ]
}

fn compile_all(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}")).unwrap_or_else(|e| {
                panic!("invalid builtin pattern {p:?}: {e}");
            })
        })
        .collect()
}

/// Pre-compiled injection patterns, built exactly once.
pub fn injection_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile_all(injection_pattern_sources()))
}

fn destructive_pattern_sources() -> &'static [&'static str] {
    &[
        r"rm\s+-[rf]+",
        r"drop\s+table",
        r"delete\s+from",
        r"truncate\s+(?:table\s+)?\w+",
        r"format\s+(?:disk|drive|c:)",
        r"mkfs\.",
        r"dd\s+if=.+of=/dev/",
        r"파일\s*삭제",
        r"데이터베이스\s*(?:삭제|드롭)",
        r"전체\s*삭제",
        r"모두\s*삭제",
    ]
}

/// Pre-compiled destructive-phrase patterns, built exactly once.
pub fn destructive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile_all(destructive_pattern_sources()))
}

/// Content-addressed policy version: first 8 hex chars of
/// sha256(sorted(injection_pattern_sources).join("|")). Changes iff the
/// injection pattern set changes.
pub fn policy_version() -> String {
    use sha2::{Digest, Sha256};
    let mut sorted: Vec<&str> = injection_pattern_sources().to_vec();
    sorted.sort_unstable();
    let joined = sorted.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// `Display`-friendly source strings, for `/v1/policy/sync` responses.
pub fn injection_pattern_strings() -> Vec<String> {
    injection_pattern_sources().iter().map(|s| s.to_string()).collect()
}

pub fn destructive_pattern_strings() -> Vec<String> {
    destructive_pattern_sources().iter().map(|s| s.to_string()).collect()
}

pub fn destructive_action_strings() -> Vec<String> {
    let mut v: Vec<String> = destructive_action_list().iter().map(|s| s.to_string()).collect();
    v.sort();
    v
}
