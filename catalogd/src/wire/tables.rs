use std::collections::HashMap;
use shared::protocol::DEFAULT_DLC;
use shared::types::{Lookup, SessionKind, TrackDescriptor, VehicleClass};

const SESSION_KINDS: &[(u8, SessionKind)] = &[
    (0x00, SessionKind::Practice),
    (0x04, SessionKind::Qualifying),
    (0x0a, SessionKind::Race),
];

const VEHICLE_CLASSES: &[(u8, VehicleClass)] = &[
    (0xfa, VehicleClass::Mixed),
    (0x00, VehicleClass::Gt3),
    (0x07, VehicleClass::Gt4),
    (0xf9, VehicleClass::Gtc),
    (0x0c, VehicleClass::Tcx),
];

const STANDARD_BOOL: &[(u8, bool)] = &[(0x01, true), (0x00, false)];

const RAIN_BOOL: &[(u8, bool)] = &[(0x80, true), (0x00, false)];

/// (id, display name, content pack); `None` means the base game.
const TRACKS: &[(&str, &str, Option<&str>)] = &[
    ("barcelona", "Barcelona Grand Prix Circuit", None),
    ("mount_panorama", "Bathurst - Mount Panorama Circuit", Some("icgt")),
    ("brands_hatch", "Brands Hatch", None),
    ("donington", "Donington Park", Some("bgt")),
    ("hungaroring", "Hungaroring", None),
    ("imola", "Imola", Some("gtwc")),
    ("kyalami", "Kyalami", Some("icgt")),
    ("laguna_seca", "Laguna Seca", Some("icgt")),
    ("misano", "Misano", None),
    ("monza", "Monza", None),
    ("nurburgring", "Nurburgring", None),
    ("oulton_park", "Oulton Park", Some("bgt")),
    ("paul_ricard", "Paul Ricard", None),
    ("silverstone", "Silverstone", None),
    ("snetterton", "Snetterton 300", Some("bgt")),
    ("spa", "Spa-Francorchamps", None),
    ("suzuka", "Suzuka", Some("icgt")),
    ("zandvoort", "Zandvoort", None),
    ("zolder", "Zolder", None),
    ("watkins_glen", "Watkins Glen", Some("atp")),
    ("cota", "Circuit of the Americas", Some("atp")),
    ("indianapolis", "Indianapolis Motor Speedway", Some("atp")),
];

#[derive(Debug, Clone)]
struct TrackEntry {
    name: &'static str,
    dlc: &'static str,
}

/// Immutable code tables and track registry used by the decoder.
#[derive(Debug, Clone)]
pub struct Catalog {
    session_kinds: HashMap<u8, SessionKind>,
    vehicle_classes: HashMap<u8, VehicleClass>,
    standard_bool: HashMap<u8, bool>,
    rain_bool: HashMap<u8, bool>,
    tracks: HashMap<&'static str, TrackEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// The tables the master directory currently speaks.
    pub fn standard() -> Self {
        Self {
            session_kinds: SESSION_KINDS.iter().copied().collect(),
            vehicle_classes: VEHICLE_CLASSES.iter().copied().collect(),
            standard_bool: STANDARD_BOOL.iter().copied().collect(),
            rain_bool: RAIN_BOOL.iter().copied().collect(),
            tracks: TRACKS
                .iter()
                .map(|&(id, name, dlc)| {
                    (id, TrackEntry { name, dlc: dlc.unwrap_or(DEFAULT_DLC) })
                })
                .collect(),
        }
    }

    pub fn session_kind(&self, code: u8) -> Lookup<SessionKind> {
        resolve(&self.session_kinds, code, "session kind")
    }

    pub fn vehicle_class(&self, code: u8) -> Lookup<VehicleClass> {
        resolve(&self.vehicle_classes, code, "vehicle class")
    }

    pub fn flag(&self, code: u8) -> Lookup<bool> {
        resolve(&self.standard_bool, code, "flag")
    }

    pub fn rain(&self, code: u8) -> Lookup<bool> {
        resolve(&self.rain_bool, code, "rain flag")
    }

    /// Resolve a track id. Ids missing from the registry are synthesized
    /// from the raw id and reported so the registry can be extended.
    pub fn track(&self, id: &str) -> TrackDescriptor {
        match self.tracks.get(id) {
            Some(entry) => TrackDescriptor {
                id: id.to_string(),
                name: entry.name.to_string(),
                dlc: entry.dlc.to_string(),
            },
            None => {
                tracing::warn!(track = %id, "Track not in registry, using raw id as name");
                TrackDescriptor {
                    id: id.to_string(),
                    name: id.to_string(),
                    dlc: DEFAULT_DLC.to_string(),
                }
            }
        }
    }
}

fn resolve<T: Copy>(table: &HashMap<u8, T>, code: u8, field: &'static str) -> Lookup<T> {
    match table.get(&code) {
        Some(value) => Lookup::Resolved(*value),
        None => {
            tracing::warn!(field, code = %format!("{:#04x}", code), "Unknown enum code");
            Lookup::Unknown(code)
        }
    }
}
