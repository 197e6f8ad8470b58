//! The `Page` data model shared by PXNT files and wire rendering frames.
//!
//! A `Page` is the unit both the PXNT container codec (§4.2) and the wire
//! frame codec (§4.3) materialize into; the category-map interpreter (§4.5)
//! then operates on that shared model regardless of where it came from.

use std::collections::HashMap;

use bytes::BytesMut;

use crate::codec::wire_io;
use crate::error::{PixnetError, PxntErrorCode};

/// Pixel storage format (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit RGBA, 8 bits per channel.
    Rgba8,
    /// 24-bit RGB, 8 bits per channel, no alpha.
    Rgb8,
    /// 64-bit RGBA, 16 bits per channel.
    Rgba16,
}

impl PixelFormat {
    /// Bytes occupied by a single pixel in this format.
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Rgba16 => 8,
        }
    }

    /// Decodes the PXNT on-disk / wire enum value (§6.2).
    pub fn from_u8(value: u8) -> Result<Self, PixnetError> {
        match value {
            0 => Ok(Self::Rgba8),
            1 => Ok(Self::Rgb8),
            2 => Ok(Self::Rgba16),
            _ => Err(crate::error::PxntError::format(
                PxntErrorCode::InvalidDimensions,
                format!("unknown pixel_format {value}"),
            )
            .into()),
        }
    }

    /// Encodes the PXNT on-disk / wire enum value.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Rgba8 => 0,
            Self::Rgb8 => 1,
            Self::Rgba16 => 2,
        }
    }
}

/// A pixel raster owning the invariant that its buffer length always equals
/// `width * height * bytes_per_pixel`, so it cannot be constructed in a
/// violating state (§3 global invariants).
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u16,
    height: u16,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Builds a pixel buffer, validating `data.len()` against the declared
    /// dimensions and format.
    pub fn new(width: u16, height: u16, format: PixelFormat, data: Vec<u8>) -> Result<Self, PixnetError> {
        if width == 0 || height == 0 {
            return Err(invalid_dimensions_error("width/height must be non-zero"));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(invalid_dimensions_error(format!(
                "pixel buffer length {} does not match width*height*bpp {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Raster width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Raster height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Pixel storage format.
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw row-major pixel bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, returning the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

fn invalid_dimensions_error(message: impl Into<String>) -> PixnetError {
    crate::error::PxntError::format(PxntErrorCode::InvalidDimensions, message).into()
}

fn decode_error(message: impl Into<String>) -> PixnetError {
    crate::error::PxntError::format(PxntErrorCode::TruncatedFile, message).into()
}

/// A pixel-addressed category ID map, row-major, one `u16` per pixel.
/// Category ID 0 is reserved for "no behavior" (§3).
#[derive(Debug, Clone)]
pub struct CategoryMap {
    width: u16,
    height: u16,
    ids: Vec<u16>,
}

impl CategoryMap {
    /// Builds a category map, validating `ids.len() == width * height`.
    pub fn new(width: u16, height: u16, ids: Vec<u16>) -> Result<Self, PixnetError> {
        let expected = width as usize * height as usize;
        if ids.len() != expected {
            return Err(invalid_dimensions_error(format!(
                "category map length {} does not match width*height {}",
                ids.len(),
                expected
            )));
        }
        Ok(Self { width, height, ids })
    }

    /// Looks up the category ID at pixel `(x, y)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, x: u16, y: u16) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.ids.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Raw row-major category ID buffer.
    #[must_use]
    pub fn ids(&self) -> &[u16] {
        &self.ids
    }

    /// Raster width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Raster height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.height
    }
}

/// A typed, opaque key-value property attached to a `CategoryDef` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedProperty {
    /// Property name.
    pub key: String,
    /// Property value, stored verbatim as UTF-8 text.
    pub value: String,
}

/// Behavior-specific payload carried by a `CategoryDef` (§4.5). Parsed into
/// an explicit tagged variant at decode time, per the "runtime-typed
/// behavior data → tagged variants" design note (§9): an unrecognized
/// `behavior_id` fails closed instead of misinterpreting the bytes that
/// follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// 1: Navigate — emits a navigation request on click.
    Navigate {
        /// Target URL (pixnet:// scheme, §6.3).
        url: String,
        /// Whether to navigate in the same or a new context.
        target: NavigateTarget,
    },
    /// 2: EmitEvent — emits a debounced named event.
    EmitEvent {
        /// Name reported in the outbound `PIXEVT`.
        event_name: String,
        /// Application-defined event type tag.
        event_type: String,
        /// Minimum milliseconds between emissions of this `(zone, event_name)` pair.
        debounce_ms: u32,
    },
    /// 3: InputZone — opens a client-side input surface.
    InputZone {
        /// Identifier distinguishing this input zone from others sharing a category.
        zone_id: u16,
        /// Flags controlling submit-time validation.
        validation_flags: ValidationFlags,
    },
    /// 4: HoverEffect — purely client-side, no outbound event.
    HoverEffect,
    /// 5: ClickEffect — purely client-side, no outbound event.
    ClickEffect,
    /// 6: DragZone — source side of a drag/drop pair.
    DragZone {
        /// Identifier used to pair with a `DropZone`.
        zone_id: u16,
    },
    /// 7: DropZone — target side of a drag/drop pair.
    DropZone {
        /// Identifier used to pair with a `DragZone`.
        zone_id: u16,
    },
    /// 8: ScrollZone — updates local scroll position, rate-limited to once per frame.
    ScrollZone {
        /// Identifier for this scrollable region.
        zone_id: u16,
    },
    /// 9: MediaZone — forwards play/pause/seek to the audio collaborator; no protocol event.
    MediaZone {
        /// Identifier for this media region.
        zone_id: u16,
    },
}

impl Behavior {
    /// The `behavior_id` this variant encodes to/from (§4.2 step 6, §6.1 category_defs).
    #[must_use]
    pub fn behavior_id(&self) -> u8 {
        match self {
            Self::Navigate { .. } => 1,
            Self::EmitEvent { .. } => 2,
            Self::InputZone { .. } => 3,
            Self::HoverEffect => 4,
            Self::ClickEffect => 5,
            Self::DragZone { .. } => 6,
            Self::DropZone { .. } => 7,
            Self::ScrollZone { .. } => 8,
            Self::MediaZone { .. } => 9,
        }
    }

    /// Serializes the behavior-specific payload that follows `name` in a
    /// category definition. Sub-field integers are big-endian regardless of
    /// the surrounding container, since this blob is opaque to both the wire
    /// frame codec and the PXNT container codec and wire is the primary live
    /// representation.
    #[must_use]
    pub fn encode_data(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            Self::Navigate { url, target } => {
                wire_io::write_u8(&mut buf, target.to_u8());
                wire_io::write_string_u16_len(&mut buf, url);
            }
            Self::EmitEvent {
                event_name,
                event_type,
                debounce_ms,
            } => {
                wire_io::write_string_u8_len(&mut buf, event_name);
                wire_io::write_string_u8_len(&mut buf, event_type);
                wire_io::write_u32(&mut buf, *debounce_ms);
            }
            Self::InputZone { zone_id, validation_flags } => {
                wire_io::write_u16(&mut buf, *zone_id);
                wire_io::write_u8(&mut buf, validation_flags.to_bits());
            }
            Self::HoverEffect | Self::ClickEffect => {}
            Self::DragZone { zone_id }
            | Self::DropZone { zone_id }
            | Self::ScrollZone { zone_id }
            | Self::MediaZone { zone_id } => {
                wire_io::write_u16(&mut buf, *zone_id);
            }
        }
        buf.to_vec()
    }

    /// Parses a behavior-specific payload given its `behavior_id`, failing
    /// closed on an unrecognized ID instead of guessing a layout for the
    /// bytes that follow (§9 redesign note: runtime-typed behavior data →
    /// tagged variants).
    pub fn decode(behavior_id: u8, data: &[u8]) -> Result<Self, PixnetError> {
        let mut buf = BytesMut::from(data);
        let behavior = match behavior_id {
            1 => {
                let target = NavigateTarget::from_u8(wire_io::read_u8(&mut buf)?)?;
                let len = wire_io::read_u16(&mut buf)? as usize;
                let raw = wire_io::read_bytes(&mut buf, len)?;
                let url = String::from_utf8(raw.to_vec())
                    .map_err(|e| decode_error(format!("invalid UTF-8 in navigate url: {e}")))?;
                Self::Navigate { url, target }
            }
            2 => {
                let name_len = wire_io::read_u8(&mut buf)? as usize;
                let event_name = String::from_utf8(wire_io::read_bytes(&mut buf, name_len)?.to_vec())
                    .map_err(|e| decode_error(format!("invalid UTF-8 in event_name: {e}")))?;
                let type_len = wire_io::read_u8(&mut buf)? as usize;
                let event_type = String::from_utf8(wire_io::read_bytes(&mut buf, type_len)?.to_vec())
                    .map_err(|e| decode_error(format!("invalid UTF-8 in event_type: {e}")))?;
                let debounce_ms = wire_io::read_u32(&mut buf)?;
                Self::EmitEvent {
                    event_name,
                    event_type,
                    debounce_ms,
                }
            }
            3 => {
                let zone_id = wire_io::read_u16(&mut buf)?;
                let validation_flags = ValidationFlags::from_bits(wire_io::read_u8(&mut buf)?);
                Self::InputZone { zone_id, validation_flags }
            }
            4 => Self::HoverEffect,
            5 => Self::ClickEffect,
            6 => Self::DragZone {
                zone_id: wire_io::read_u16(&mut buf)?,
            },
            7 => Self::DropZone {
                zone_id: wire_io::read_u16(&mut buf)?,
            },
            8 => Self::ScrollZone {
                zone_id: wire_io::read_u16(&mut buf)?,
            },
            9 => Self::MediaZone {
                zone_id: wire_io::read_u16(&mut buf)?,
            },
            other => {
                return Err(decode_error(format!("unknown behavior_id {other}")));
            }
        };
        Ok(behavior)
    }
}

/// `target` field of a `Navigate` behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateTarget {
    /// Replace the current page.
    Same,
    /// Open in a new context.
    New,
}

impl NavigateTarget {
    fn to_u8(self) -> u8 {
        match self {
            Self::Same => 0,
            Self::New => 1,
        }
    }

    fn from_u8(value: u8) -> Result<Self, PixnetError> {
        match value {
            0 => Ok(Self::Same),
            1 => Ok(Self::New),
            other => Err(decode_error(format!("unknown navigate target {other}"))),
        }
    }
}

/// Submit-time validation rules for an `InputZone` (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationFlags {
    /// Field must be non-empty.
    pub required: bool,
    /// Field must parse as a number.
    pub numeric: bool,
    /// Field must look like an email address.
    pub email: bool,
    /// Field is validated by an application-defined custom rule.
    pub custom: bool,
}

impl ValidationFlags {
    /// Decodes the on-disk/wire bitmask (bit0=required, bit1=numeric, bit2=email, bit3=custom).
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self {
            required: bits & 0x1 != 0,
            numeric: bits & 0x2 != 0,
            email: bits & 0x4 != 0,
            custom: bits & 0x8 != 0,
        }
    }

    /// Encodes to the on-disk/wire bitmask.
    #[must_use]
    pub fn to_bits(self) -> u8 {
        (self.required as u8) | ((self.numeric as u8) << 1) | ((self.email as u8) << 2) | ((self.custom as u8) << 3)
    }
}

/// A category definition (§3): `{id, name, behavior_id, priority, behavior_data,
/// extended_properties}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDef {
    /// Category ID, unique within a `Page`'s `categories` map, non-zero.
    pub id: u16,
    /// Human-readable name, UTF-8, ≤65535 bytes.
    pub name: String,
    /// Resolution priority; higher wins ties over lower-priority overlapping categories.
    pub priority: u8,
    /// Parsed behavior payload.
    pub behavior: Behavior,
    /// Optional typed key-value extensions.
    pub extended_properties: Vec<ExtendedProperty>,
}

/// Page metadata (§3): title/author/description/URL plus custom fields.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Page title.
    pub title: Option<String>,
    /// Page author.
    pub author: Option<String>,
    /// Page description.
    pub description: Option<String>,
    /// Canonical pixnet:// URL for this page.
    pub canonical_url: Option<String>,
    /// Free-form search/navigation keywords.
    pub keywords: Vec<String>,
    /// Custom string-keyed string-valued fields, preserved in insertion order for round-trip fidelity.
    pub custom_fields: Vec<(String, String)>,
}

/// An opaque, verbatim-preserved optional section (animation, audio,
/// extended metadata, or any section type ID this implementation does not
/// recognize — preserved for forward compatibility per §4.2 step 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueSection {
    /// The declared section type ID from the PXNT metadata index.
    pub section_type: u16,
    /// Raw section payload, preserved byte-for-byte.
    pub payload: Vec<u8>,
}

/// The renderable unit both PXNT files and wire frames materialize (§3).
#[derive(Debug, Clone)]
pub struct Page {
    /// Pixel raster.
    pub pixels: PixelBuffer,
    /// Per-pixel category ID map.
    pub category_map: CategoryMap,
    /// Category ID → definition. Every ID in `category_map` other than 0 must
    /// be present here (invariant, §3).
    pub categories: HashMap<u16, CategoryDef>,
    /// Optional descriptive metadata.
    pub metadata: Option<Metadata>,
    /// Optional animation block, opaque payload preserved verbatim.
    pub animation: Option<OpaqueSection>,
    /// Optional audio block, opaque payload preserved verbatim.
    pub audio: Option<OpaqueSection>,
    /// Optional extended-metadata block, opaque payload preserved verbatim.
    pub extended_metadata: Option<OpaqueSection>,
}

impl Page {
    /// Raster width in pixels.
    #[must_use]
    pub fn width(&self) -> u16 {
        self.pixels.width()
    }

    /// Raster height in pixels.
    #[must_use]
    pub fn height(&self) -> u16 {
        self.pixels.height()
    }

    /// Validates the cross-field invariant that every non-zero ID in
    /// `category_map` is present in `categories` (§3).
    pub fn validate(&self) -> Result<(), PixnetError> {
        if self.pixels.width() != self.category_map.width() || self.pixels.height() != self.category_map.height() {
            return Err(invalid_dimensions_error(
                "pixel buffer and category map dimensions differ",
            ));
        }
        for &id in self.category_map.ids() {
            if id != 0 && !self.categories.contains_key(&id) {
                return Err(invalid_dimensions_error(format!(
                    "category_map references undefined category {id}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_buffer_rejects_wrong_length() {
        let err = PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0u8; 10]);
        assert!(err.is_err());
    }

    #[test]
    fn pixel_buffer_accepts_correct_length() {
        let buf = PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0u8; 16]).unwrap();
        assert_eq!(buf.width(), 2);
        assert_eq!(buf.bytes().len(), 16);
    }

    #[test]
    fn category_map_lookup_bounds() {
        let map = CategoryMap::new(2, 2, vec![0, 1, 2, 3]).unwrap();
        assert_eq!(map.get(1, 1), Some(3));
        assert_eq!(map.get(5, 5), None);
    }

    #[test]
    fn validation_flags_round_trip() {
        let flags = ValidationFlags {
            required: true,
            numeric: false,
            email: true,
            custom: false,
        };
        assert_eq!(ValidationFlags::from_bits(flags.to_bits()), flags);
    }

    #[test]
    fn behavior_navigate_round_trip() {
        let behavior = Behavior::Navigate {
            url: "pixnet://example/home".to_string(),
            target: NavigateTarget::New,
        };
        let data = behavior.encode_data();
        let decoded = Behavior::decode(behavior.behavior_id(), &data).unwrap();
        assert_eq!(decoded, behavior);
    }

    #[test]
    fn behavior_emit_event_round_trip() {
        let behavior = Behavior::EmitEvent {
            event_name: "click".to_string(),
            event_type: "custom".to_string(),
            debounce_ms: 250,
        };
        let data = behavior.encode_data();
        let decoded = Behavior::decode(behavior.behavior_id(), &data).unwrap();
        assert_eq!(decoded, behavior);
    }

    #[test]
    fn behavior_no_payload_variants_round_trip() {
        for behavior in [Behavior::HoverEffect, Behavior::ClickEffect] {
            let data = behavior.encode_data();
            assert!(data.is_empty());
            let decoded = Behavior::decode(behavior.behavior_id(), &data).unwrap();
            assert_eq!(decoded, behavior);
        }
    }

    #[test]
    fn behavior_decode_rejects_unknown_id() {
        assert!(Behavior::decode(200, &[]).is_err());
    }

    #[test]
    fn page_validate_rejects_undefined_category() {
        let pixels = PixelBuffer::new(1, 1, PixelFormat::Rgba8, vec![0, 0, 0, 0]).unwrap();
        let category_map = CategoryMap::new(1, 1, vec![7]).unwrap();
        let page = Page {
            pixels,
            category_map,
            categories: HashMap::new(),
            metadata: None,
            animation: None,
            audio: None,
            extended_metadata: None,
        };
        assert!(page.validate().is_err());
    }
}
