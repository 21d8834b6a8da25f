//! Dissector tables.

use std::collections::BTreeMap;
use std::fmt;

use super::DissectorHandle;

/// Key type accepted by a dissector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Integer keys (ports, ethertypes, protocol numbers).
    UInt,
    /// String keys, optionally compared case-insensitively.
    String { case_sensitive: bool },
    /// No keys; the table is only a heuristic list.
    None,
}

/// Key of a dissector table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(untagged))]
pub enum TableKey {
    UInt(u32),
    String(String),
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKey::UInt(v) => write!(f, "{v}"),
            TableKey::String(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<u32> for TableKey {
    fn from(v: u32) -> Self {
        TableKey::UInt(v)
    }
}

impl From<u16> for TableKey {
    fn from(v: u16) -> Self {
        TableKey::UInt(v.into())
    }
}

impl From<u8> for TableKey {
    fn from(v: u8) -> Self {
        TableKey::UInt(v.into())
    }
}

impl From<&str> for TableKey {
    fn from(v: &str) -> Self {
        TableKey::String(v.to_string())
    }
}

impl From<String> for TableKey {
    fn from(v: String) -> Self {
        TableKey::String(v)
    }
}

/// A named mapping from keys to dissectors, plus an ordered heuristic list
/// tried when no key matches.
#[derive(Debug, Clone)]
pub struct DissectorTable {
    name: String,
    display_name: String,
    key_type: KeyType,
    uint_entries: BTreeMap<u32, DissectorHandle>,
    string_entries: BTreeMap<String, DissectorHandle>,
    heuristics: Vec<DissectorHandle>,
}

impl DissectorTable {
    pub(crate) fn new(name: String, display_name: String, key_type: KeyType) -> Self {
        Self {
            name,
            display_name,
            key_type,
            uint_entries: BTreeMap::new(),
            string_entries: BTreeMap::new(),
            heuristics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Check a key against the table's key type, folding case where the
    /// table is case-insensitive. `None` if the key has the wrong type.
    pub fn normalize(&self, key: TableKey) -> Option<TableKey> {
        match (self.key_type, key) {
            (KeyType::UInt, key @ TableKey::UInt(_)) => Some(key),
            (KeyType::String { case_sensitive: true }, key @ TableKey::String(_)) => Some(key),
            (KeyType::String { case_sensitive: false }, TableKey::String(s)) => {
                Some(TableKey::String(s.to_lowercase()))
            }
            _ => None,
        }
    }

    /// Exact-match lookup.
    pub fn lookup(&self, key: &TableKey) -> Option<DissectorHandle> {
        match (self.key_type, key) {
            (KeyType::UInt, TableKey::UInt(v)) => self.uint_entries.get(v).copied(),
            (KeyType::String { case_sensitive: true }, TableKey::String(s)) => {
                self.string_entries.get(s).copied()
            }
            (KeyType::String { case_sensitive: false }, TableKey::String(s)) => {
                self.string_entries.get(&s.to_lowercase()).copied()
            }
            _ => None,
        }
    }

    /// Registered entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (TableKey, DissectorHandle)> + '_ {
        self.uint_entries
            .iter()
            .map(|(k, h)| (TableKey::UInt(*k), *h))
            .chain(
                self.string_entries
                    .iter()
                    .map(|(k, h)| (TableKey::String(k.clone()), *h)),
            )
    }

    pub fn len(&self) -> usize {
        self.uint_entries.len() + self.string_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Heuristic dissectors in the order they are tried.
    pub fn heuristics(&self) -> &[DissectorHandle] {
        &self.heuristics
    }

    /// Insert a normalized key, returning the entry it replaced.
    pub(crate) fn insert(&mut self, key: TableKey, handle: DissectorHandle) -> Option<DissectorHandle> {
        match key {
            TableKey::UInt(v) => self.uint_entries.insert(v, handle),
            TableKey::String(s) => self.string_entries.insert(s, handle),
        }
    }

    pub(crate) fn heuristics_mut(&mut self) -> &mut Vec<DissectorHandle> {
        &mut self.heuristics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(key_type: KeyType) -> DissectorTable {
        DissectorTable::new("t".into(), "Test".into(), key_type)
    }

    #[test]
    fn test_uint_lookup() {
        let mut t = table(KeyType::UInt);
        let key = t.normalize(TableKey::from(0x0800u16)).unwrap();
        assert!(t.insert(key, DissectorHandle(3)).is_none());
        assert_eq!(t.lookup(&TableKey::UInt(0x0800)), Some(DissectorHandle(3)));
        assert_eq!(t.lookup(&TableKey::UInt(0x86dd)), None);
        assert_eq!(t.lookup(&TableKey::from("0x0800")), None);
    }

    #[test]
    fn test_case_insensitive_strings() {
        let mut t = table(KeyType::String {
            case_sensitive: false,
        });
        let key = t.normalize(TableKey::from("Application/JSON")).unwrap();
        t.insert(key, DissectorHandle(1));
        assert_eq!(t.lookup(&TableKey::from("application/json")), Some(DissectorHandle(1)));
        assert_eq!(t.lookup(&TableKey::from("APPLICATION/JSON")), Some(DissectorHandle(1)));
    }

    #[test]
    fn test_case_sensitive_strings() {
        let mut t = table(KeyType::String {
            case_sensitive: true,
        });
        t.insert(TableKey::from("GET"), DissectorHandle(1));
        assert_eq!(t.lookup(&TableKey::from("get")), None);
    }

    #[test]
    fn test_key_type_mismatch() {
        let t = table(KeyType::String {
            case_sensitive: true,
        });
        assert!(t.normalize(TableKey::UInt(1)).is_none());
        assert!(table(KeyType::None).normalize(TableKey::UInt(1)).is_none());
    }

    #[test]
    fn test_entries_in_key_order() {
        let mut t = table(KeyType::UInt);
        t.insert(TableKey::UInt(443), DissectorHandle(2));
        t.insert(TableKey::UInt(53), DissectorHandle(1));
        let keys: Vec<_> = t.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![TableKey::UInt(53), TableKey::UInt(443)]);
        assert_eq!(t.len(), 2);
    }
}
