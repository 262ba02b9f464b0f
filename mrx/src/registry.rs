//! Essence type registry and the per-session resolver.

use crate::error::{MrxError, Result};
use crate::ul::UniversalLabel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

/// Symbol prefix given to essence keys the registry does not know.
pub const UNKNOWN_SYMBOL_PREFIX: &str = "SystemItemTBD";

/// A registered essence type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssenceType {
    /// `urn:smpte:ul:` form of the registered label (possibly a wildcard form)
    #[serde(rename = "UL")]
    pub ul: String,
    /// Short symbolic name
    #[serde(rename = "Symbol")]
    pub symbol: String,
    /// Human-readable description
    #[serde(rename = "Description")]
    pub description: String,
}

impl EssenceType {
    fn new(ul: &str, symbol: &str, description: &str) -> Self {
        EssenceType {
            ul: ul.to_string(),
            symbol: symbol.to_string(),
            description: description.to_string(),
        }
    }
}

/// Lookup table of essence types keyed by `urn:smpte:ul:` text.
#[derive(Debug, Clone, Default)]
pub struct EssenceRegistry {
    entries: HashMap<String, EssenceType>,
}

const BUILTIN: &[(&str, &str, &str)] = &[
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.047f007f",
        "CPSystemItem",
        "SDTI-CP system item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.057f007f",
        "CPPictureItem",
        "SDTI-CP picture item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.067f007f",
        "CPSoundItem",
        "SDTI-CP sound item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.077f007f",
        "CPDataItem",
        "SDTI-CP data item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.147f007f",
        "GCSystemItem",
        "Generic container system item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.157f007f",
        "GCPictureItem",
        "Generic container picture item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.167f007f",
        "GCSoundItem",
        "Generic container sound item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.177f007f",
        "GCDataItem",
        "Generic container data item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020101.0d010301.187f007f",
        "GCCompoundItem",
        "Generic container compound item",
    ),
    (
        "urn:smpte:ul:060e2b34.01020105.0e090502.0101017f",
        "FrameWrappedISXDData",
        "ISXD data element, frame wrapped",
    ),
    (
        "urn:smpte:ul:060e2b34.01020105.0e090502.0101027f",
        "ClipWrappedISXDData",
        "ISXD data element, clip wrapped",
    ),
    (
        "urn:smpte:ul:060e2b34.0101010c.0d010509.01000000",
        "GenericStreamDataElement",
        "Generic stream data element",
    ),
];

impl EssenceRegistry {
    /// Create a registry holding the built-in essence types.
    pub fn new() -> Self {
        let mut registry = Self::default();
        for (ul, symbol, description) in BUILTIN {
            registry.insert(EssenceType::new(ul, symbol, description));
        }
        registry
    }

    /// Register an essence type, replacing any entry with the same label.
    pub fn insert(&mut self, essence: EssenceType) {
        self.entries.insert(essence.ul.clone(), essence);
    }

    /// Load extra entries from a JSON array of `{UL, Symbol, Description}`.
    ///
    /// Labels may be dotted or plain hex, with or without the URN prefix.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let extra: Vec<EssenceType> = serde_json::from_reader(reader)?;
        let mut registry = Self::new();
        for mut essence in extra {
            let label = UniversalLabel::parse(&essence.ul).ok_or_else(|| {
                MrxError::config(format!("invalid essence label '{}'", essence.ul))
            })?;
            essence.ul = label.to_urn();
            registry.insert(essence);
        }
        Ok(registry)
    }

    /// Look up by `urn:smpte:ul:` text.
    pub fn get(&self, urn: &str) -> Option<&EssenceType> {
        self.entries.get(urn)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wildcard form matching any element count and number: bytes 13 and 15
/// become `0x7f`, byte 14 is cleared.
fn generic_item_form(key: &UniversalLabel) -> UniversalLabel {
    key.with_bytes(&[(13, 0x7F), (14, 0x00), (15, 0x7F)])
}

/// Wildcard form matching any element number.
fn element_form(key: &UniversalLabel) -> UniversalLabel {
    key.with_bytes(&[(15, 0x7F)])
}

/// Resolves essence keys for one decode session.
///
/// Keys the registry does not know get a synthesized `SystemItemTBD<n>`
/// symbol. The same key always gets the same symbol within a session, and
/// `n` is never reused. Create one resolver per decode.
#[derive(Debug)]
pub struct EssenceResolver {
    registry: Arc<EssenceRegistry>,
    unknown: HashMap<[u8; 16], EssenceType>,
    next_unknown: u32,
}

impl EssenceResolver {
    /// Create a resolver over `registry` with an empty unknown-key cache.
    pub fn new(registry: Arc<EssenceRegistry>) -> Self {
        EssenceResolver {
            registry,
            unknown: HashMap::new(),
            next_unknown: 0,
        }
    }

    /// Resolve an essence key, trying the generic item form, then the
    /// element form, then the literal key.
    pub fn resolve(&mut self, key: &UniversalLabel) -> EssenceType {
        let candidates = [generic_item_form(key), element_form(key), *key];
        for candidate in candidates {
            if let Some(found) = self.registry.get(&candidate.to_urn()) {
                return found.clone();
            }
        }

        if let Some(known) = self.unknown.get(key.as_bytes()) {
            return known.clone();
        }

        let synthesized = EssenceType {
            ul: generic_item_form(key).to_urn(),
            symbol: format!("{}{}", UNKNOWN_SYMBOL_PREFIX, self.next_unknown),
            description: "Unregistered essence element".to_string(),
        };
        self.next_unknown += 1;
        tracing::warn!(key = %key, symbol = %synthesized.symbol, "unregistered essence key");
        self.unknown.insert(*key.as_bytes(), synthesized.clone());
        synthesized
    }

    /// Number of distinct unregistered keys seen so far.
    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }
}

impl Default for EssenceResolver {
    fn default() -> Self {
        Self::new(Arc::new(EssenceRegistry::new()))
    }
}
