/*!
 # Device registry

 Static table of the supported KS product lines, keyed by the prefix of the
 advertised device name. Each entry names the GATT service and write
 characteristic (as 16-bit short codes) and the command layout family.
*/

use tracing::trace;
use uuid::Uuid;

use crate::{Error, Result};

/// Expansion template for 16-bit short codes (Bluetooth base UUID)
pub const UUID_TEMPLATE_HEAD: &str = "0000";
pub const UUID_TEMPLATE_TAIL: &str = "-0000-1000-8000-00805f9b34fb";

/// Prefix used when the caller does not name a model
pub const DEFAULT_PREFIX: &str = "KS03~";

/// Command layout family of a lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Ceiling fixtures, `7E .. EF` color frames, no standalone brightness
    Ceiling,
    /// Floor lamps, `5A .. A5` frames carrying a brightness byte
    Floor,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Ceiling => write!(f, "ceiling"),
            DeviceClass::Floor => write!(f, "floor"),
        }
    }
}

/// One supported product line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Advertised-name prefix, e.g. `KS03~`
    pub name_prefix: &'static str,
    /// Service short code, e.g. `AFD0`
    pub service_short_code: &'static str,
    /// Write characteristic short code, e.g. `AFD1`
    pub write_short_code: &'static str,
    /// Command layout family
    pub device_class: DeviceClass,
}

impl DeviceProfile {
    const fn new(
        name_prefix: &'static str,
        service_short_code: &'static str,
        write_short_code: &'static str,
        device_class: DeviceClass,
    ) -> Self {
        Self {
            name_prefix,
            service_short_code,
            write_short_code,
            device_class,
        }
    }

    /// Model stem without the trailing separator (`KS03~` -> `KS03`)
    pub fn model_stem(&self) -> &'static str {
        self.name_prefix
            .strip_suffix(&['-', '~'][..])
            .unwrap_or(self.name_prefix)
    }
}

/// Known product lines
pub const PROFILES: &[DeviceProfile] = &[
    // Classic FFF0/FFF3 family
    DeviceProfile::new("KS03-", "FFF0", "FFF3", DeviceClass::Ceiling),
    DeviceProfile::new("KS04-", "FFF0", "FFF3", DeviceClass::Ceiling),
    // AFD0 family; AFD1 is write-without-response, AFD2 notify, AFD3 read/write
    DeviceProfile::new("KS03~", "AFD0", "AFD1", DeviceClass::Floor),
    DeviceProfile::new("KS15~", "AFD0", "AFD3", DeviceClass::Ceiling),
    // AE00 family
    DeviceProfile::new("KS01-", "AE00", "AE01", DeviceClass::Ceiling),
    DeviceProfile::new("KS02-", "AE00", "AE01", DeviceClass::Ceiling),
    DeviceProfile::new("KS04~", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS05-", "AE00", "AE02", DeviceClass::Ceiling),
    DeviceProfile::new("KS07-", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS08-", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS09-", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS10-", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS11-", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS12-", "AE00", "AE10", DeviceClass::Ceiling),
    DeviceProfile::new("KS13-", "AE00", "AE10", DeviceClass::Ceiling),
];

/// Legacy write characteristics that alias the same physical characteristic
/// across firmware revisions
const ALTERNATE_PAIRS: &[(&str, &str)] = &[("AFD3", "FFF3")];

/// Resolves an advertised name to its profile, preferring the longest matching prefix
pub fn resolve(advertised_name: &str) -> Option<&'static DeviceProfile> {
    let profile = PROFILES
        .iter()
        .filter(|p| advertised_name.starts_with(p.name_prefix))
        .max_by_key(|p| p.name_prefix.len());

    trace!("Resolved '{}' to {:?}", advertised_name, profile.map(|p| p.name_prefix));
    profile
}

/// Looks up a profile by its exact prefix
pub fn lookup(prefix: &str) -> Result<&'static DeviceProfile> {
    PROFILES
        .iter()
        .find(|p| p.name_prefix == prefix)
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "unknown model prefix '{}'. Known: {}",
                prefix,
                known_prefixes().join(", ")
            ))
        })
}

/// All registered prefixes, sorted
pub fn known_prefixes() -> Vec<&'static str> {
    let mut prefixes: Vec<_> = PROFILES.iter().map(|p| p.name_prefix).collect();
    prefixes.sort_unstable();
    prefixes
}

/// Expands a 4-hex-digit short code into a full 128-bit UUID
pub fn characteristic_uuid(short_code: &str) -> Result<Uuid> {
    if short_code.len() != 4 || !short_code.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidParameter(format!(
            "short code '{}' must be exactly four hex digits",
            short_code
        )));
    }

    let full = format!(
        "{}{}{}",
        UUID_TEMPLATE_HEAD,
        short_code.to_ascii_lowercase(),
        UUID_TEMPLATE_TAIL
    );
    Uuid::parse_str(&full).map_err(|e| Error::InvalidParameter(e.to_string()))
}

/// Returns the alias of a legacy write characteristic, if it has one
pub fn alternate_characteristic(short_code: &str) -> Option<&'static str> {
    ALTERNATE_PAIRS.iter().find_map(|&(a, b)| {
        if short_code.eq_ignore_ascii_case(a) {
            Some(b)
        } else if short_code.eq_ignore_ascii_case(b) {
            Some(a)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_variant_is_not_confused_with_dash_variant() {
        let profile = resolve("KS03~370058").unwrap();
        assert_eq!(profile.name_prefix, "KS03~");
        assert_eq!(profile.device_class, DeviceClass::Floor);

        let profile = resolve("KS03-112233").unwrap();
        assert_eq!(profile.name_prefix, "KS03-");
        assert_eq!(profile.service_short_code, "FFF0");
        assert_eq!(profile.write_short_code, "FFF3");
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        assert!(resolve("KS99-anything").is_none());
        assert!(resolve("ELK-BLEDOM").is_none());
        assert!(resolve("").is_none());
        assert!(resolve("ks03-112233").is_none());
    }

    #[test]
    fn prefixes_are_unique() {
        let prefixes = known_prefixes();
        let mut deduped = prefixes.clone();
        deduped.dedup();
        assert_eq!(prefixes, deduped);
    }

    #[test]
    fn lookup_rejects_unknown_prefix() {
        assert_eq!(lookup("KS04~").unwrap().write_short_code, "AE10");
        match lookup("KS99-") {
            Err(Error::InvalidParameter(msg)) => assert!(msg.contains("KS03~")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn short_codes_expand_to_base_uuid() {
        assert_eq!(
            characteristic_uuid("FFF3").unwrap().to_string(),
            "0000fff3-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            characteristic_uuid("afd1").unwrap(),
            Uuid::parse_str("0000afd1-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }

    #[test]
    fn malformed_short_codes_are_rejected() {
        for code in ["FFF", "FFF30", "GGGG", "", "ff f"] {
            assert!(
                matches!(characteristic_uuid(code), Err(Error::InvalidParameter(_))),
                "{code:?} should be rejected"
            );
        }
    }

    #[test]
    fn legacy_pair_aliases_both_ways() {
        assert_eq!(alternate_characteristic("AFD3"), Some("FFF3"));
        assert_eq!(alternate_characteristic("fff3"), Some("AFD3"));
        assert_eq!(alternate_characteristic("AFD1"), None);
        assert_eq!(alternate_characteristic("AE10"), None);
    }

    #[test]
    fn model_stem_drops_separator() {
        assert_eq!(lookup("KS03~").unwrap().model_stem(), "KS03");
        assert_eq!(lookup("KS13-").unwrap().model_stem(), "KS13");
    }
}
