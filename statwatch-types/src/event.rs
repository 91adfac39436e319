//! Availability change events.

use alloc::string::String;

/// A change in aggregated availability, for example a cache being marked
/// unavailable.
///
/// Events form an append-only feed; `index` strictly increases.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Event {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub index: u64,

    /// Unix timestamp in seconds.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub time: i64,

    #[cfg_attr(feature = "minicbor", n(2))]
    pub description: String,

    #[cfg_attr(feature = "minicbor", n(3))]
    pub name: String,

    #[cfg_attr(feature = "minicbor", n(4))]
    pub hostname: String,

    /// Kind of object the event is about, e.g. the cache type.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    #[cfg_attr(feature = "minicbor", n(5))]
    pub event_type: String,

    #[cfg_attr(feature = "serde", serde(rename = "isAvailable"))]
    #[cfg_attr(feature = "minicbor", n(6))]
    pub is_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event {
            index: 7,
            time: 1_700_000_000,
            description: "REPORTED - available".into(),
            name: "edge1".into(),
            hostname: "edge1.cdn.example".into(),
            event_type: "EDGE".into(),
            is_available: true,
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_with_wire_field_names() {
        let value = serde_json::to_value(event()).unwrap();
        assert_eq!(value["index"], 7);
        assert_eq!(value["time"], 1_700_000_000i64);
        assert_eq!(value["type"], "EDGE");
        assert_eq!(value["isAvailable"], true);
        assert_eq!(value["hostname"], "edge1.cdn.example");
        assert!(value.get("event_type").is_none());
    }

    #[cfg(feature = "minicbor")]
    #[test]
    fn cbor_roundtrip() {
        let bytes = minicbor::to_vec(event()).unwrap();
        let decoded: Event = minicbor::decode(&bytes).unwrap();
        assert_eq!(decoded, event());
    }
}
