//! Per-group counters and path-safe key derivation.

use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Length of the tokens substituted for unsafe key components.
pub const TOKEN_LENGTH: usize = 7;

static PATH_SAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\s\d_-]+$").expect("valid path-safe regex"));

/// Source of run-unique random tokens.
pub struct RandomTokens {
    rng: StdRng,
    used: HashSet<String>,
}

impl RandomTokens {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            used: HashSet::new(),
        }
    }

    /// Deterministic token source for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            used: HashSet::new(),
        }
    }

    /// Returns a token never returned before by this source.
    pub fn next_token(&mut self) -> String {
        loop {
            let token: String = (&mut self.rng)
                .sample_iter(Alphanumeric)
                .take(TOKEN_LENGTH)
                .map(char::from)
                .collect();
            if self.used.insert(token.clone()) {
                return token;
            }
        }
    }
}

impl Default for RandomTokens {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if a key component can be used verbatim in a path.
pub fn is_path_safe(component: &str) -> bool {
    PATH_SAFE_RE.is_match(component)
}

/// Descriptor of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub membership: Vec<String>,
    pub path_safe_keys: Vec<String>,

    /// Records routed to the group over the whole run
    pub total_items: u64,

    /// Records in the group's current buffer file
    pub buffered_items: u64,

    /// Packed files of the group, most recent last
    pub group_files: Vec<PathBuf>,
}

/// Mapping from group membership to group descriptor.
pub struct GroupingInfo {
    groups: HashMap<Vec<String>, GroupInfo>,
    tokens: RandomTokens,
}

impl GroupingInfo {
    pub fn new(tokens: RandomTokens) -> Self {
        Self {
            groups: HashMap::new(),
            tokens,
        }
    }

    /// Returns the group descriptor, creating it on first use.
    pub fn ensure_group(&mut self, key: &[String]) -> &mut GroupInfo {
        let tokens = &mut self.tokens;
        self.groups.entry(key.to_vec()).or_insert_with(|| {
            let path_safe_keys = key
                .iter()
                .map(|component| {
                    if is_path_safe(component) {
                        component.clone()
                    } else {
                        tokens.next_token()
                    }
                })
                .collect();
            GroupInfo {
                membership: key.to_vec(),
                path_safe_keys,
                total_items: 0,
                buffered_items: 0,
                group_files: Vec::new(),
            }
        })
    }

    /// Counts one record routed to the group.
    pub fn add_to_group(&mut self, key: &[String]) {
        let group = self.ensure_group(key);
        group.total_items += 1;
        group.buffered_items += 1;
    }

    /// Resets the buffered counter after a pack and records the packed file.
    pub fn reset_buffered(&mut self, key: &[String], packed: PathBuf) {
        let group = self.ensure_group(key);
        group.buffered_items = 0;
        group.group_files.push(packed);
    }

    pub fn get(&self, key: &[String]) -> Option<&GroupInfo> {
        self.groups.get(key)
    }

    /// Returns the memberships of all groups with buffered records.
    pub fn keys_with_items(&self) -> Vec<Vec<String>> {
        let mut keys: Vec<_> = self
            .groups
            .values()
            .filter(|g| g.buffered_items > 0)
            .map(|g| g.membership.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
