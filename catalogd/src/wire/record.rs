use std::net::Ipv4Addr;
use shared::protocol::SAFETY_RATING_NONE;
use shared::types::{Conditions, Ports, Requirements, ServerRecord, SessionSlot};
use super::cursor::ByteCursor;
use super::error::DecodeError;
use super::tables::Catalog;

// Reserved span widths, in the order they appear in a record.
const RESERVED_AFTER_IP: usize = 1;
const RESERVED_AFTER_PORTS: usize = 1;
const RESERVED_BEFORE_CLASS: usize = 2;
const RESERVED_AFTER_CLASS: usize = 10;
const RESERVED_AFTER_HOTJOIN: usize = 1;
const RESERVED_AFTER_DRIVERS: usize = 3;
const RESERVED_CLOUD: usize = 1;
const RESERVED_AFTER_REQUIREMENTS: usize = 8;

/// Result of decoding one record that was structurally sound.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Accepted(ServerRecord),
    /// Address failed validation; the cursor is already past the whole record.
    Rejected { raw_ip: String },
}

/// Fields that follow the track and name strings, codes still unresolved.
struct RawMetadata {
    class: u8,
    hotjoin: u8,
    /// (kind code, duration minutes)
    sessions: Vec<(u8, u16)>,
    max_drivers: u8,
    connected_drivers: u8,
    rain: u8,
    night: u8,
    variability: u8,
    requirements: Requirements,
    current_session_index: u8,
}

/// Decode one record starting at the cursor.
///
/// The full field set is consumed even when the address turns out to be
/// invalid, which keeps the cursor aligned on the next record. Codes and the
/// track id are only resolved for accepted records, so rejected ones never
/// show up in registry diagnostics.
pub fn decode_record(
    cursor: &mut ByteCursor<'_>,
    catalog: &Catalog,
) -> Result<RecordOutcome, DecodeError> {
    let raw_ip = cursor.take_length_prefixed_string()?;
    let mut misc = vec![cursor.take_hex(RESERVED_AFTER_IP)?];

    let tcp = take_port(cursor)?;
    let udp = take_port(cursor)?;
    misc.push(cursor.take_hex(RESERVED_AFTER_PORTS)?);

    let track_id = cursor.take_length_prefixed_string()?;
    let name = cursor.take_length_prefixed_string()?;
    let meta = decode_metadata(cursor, &mut misc)?;

    let Some(ip) = parse_ip(&raw_ip) else {
        return Ok(RecordOutcome::Rejected { raw_ip });
    };

    let mut sessions: Vec<SessionSlot> = meta
        .sessions
        .iter()
        .map(|&(kind, duration_minutes)| SessionSlot {
            kind: catalog.session_kind(kind),
            duration_minutes,
            active: false,
        })
        .collect();
    if let Some(slot) = sessions.get_mut(usize::from(meta.current_session_index)) {
        slot.active = true;
    }

    Ok(RecordOutcome::Accepted(ServerRecord {
        ip,
        port: Ports { tcp, udp },
        track: catalog.track(&track_id),
        name,
        class: catalog.vehicle_class(meta.class),
        hotjoin: catalog.flag(meta.hotjoin),
        sessions,
        max_drivers: meta.max_drivers,
        connected_drivers: meta.connected_drivers,
        conditions: Conditions {
            rain: catalog.rain(meta.rain),
            night: catalog.flag(meta.night),
            variability: meta.variability,
        },
        requirements: meta.requirements,
        current_session_index: meta.current_session_index,
        misc,
    }))
}

/// Ports are two single-byte reads, low byte first.
fn take_port(cursor: &mut ByteCursor<'_>) -> Result<u16, DecodeError> {
    let low = cursor.take_u8()?;
    let high = cursor.take_u8()?;
    Ok(u16::from(low) + u16::from(high) * 256)
}

/// Dotted quad, each octet 0-255, no leading zeros other than a bare "0".
pub fn parse_ip(raw: &str) -> Option<Ipv4Addr> {
    raw.parse().ok()
}

fn decode_metadata(
    cursor: &mut ByteCursor<'_>,
    misc: &mut Vec<String>,
) -> Result<RawMetadata, DecodeError> {
    misc.push(cursor.take_hex(RESERVED_BEFORE_CLASS)?);
    let class = cursor.take_u8()?;
    misc.push(cursor.take_hex(RESERVED_AFTER_CLASS)?);
    let hotjoin = cursor.take_u8()?;
    misc.push(cursor.take_hex(RESERVED_AFTER_HOTJOIN)?);

    let session_count = cursor.take_u8()?;
    let mut sessions = Vec::with_capacity(usize::from(session_count));
    for _ in 0..session_count {
        let kind = cursor.take_u8()?;
        let low = cursor.take_u8()?;
        let high = cursor.take_u8()?;
        sessions.push((kind, u16::from(low) + u16::from(high) * 256));
    }

    let max_drivers = cursor.take_u8()?;
    let connected_drivers = cursor.take_u8()?;
    misc.push(cursor.take_hex(RESERVED_AFTER_DRIVERS)?);

    let rain = cursor.take_u8()?;
    // Cloud/forecast related, meaning not pinned down
    misc.push(cursor.take_hex(RESERVED_CLOUD)?);
    let night = cursor.take_u8()?;
    let variability = cursor.take_u8()?;

    let track_medals = cursor.take_u8()?;
    let safety_rating = match cursor.take_u8()? {
        SAFETY_RATING_NONE => 0,
        sa => sa,
    };
    misc.push(cursor.take_hex(RESERVED_AFTER_REQUIREMENTS)?);

    let current_session_index = cursor.take_u8()?;

    Ok(RawMetadata {
        class,
        hotjoin,
        sessions,
        max_drivers,
        connected_drivers,
        rain,
        night,
        variability,
        requirements: Requirements { track_medals, safety_rating },
        current_session_index,
    })
}
