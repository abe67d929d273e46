//! TIFF structures inside the EXIF APP1 segment.
//!
//! Three consumers share this module:
//!
//! - the datetime offset operation patches the three datetime tags in place
//!   (they are fixed-width 20-byte ASCII values, so the segment length never
//!   changes);
//! - the metadata strip preview scans which tag categories are present;
//! - the metadata strip execution rebuilds the TIFF block with unwanted
//!   entries dropped, relocating the GPS IFD and the embedded thumbnail so
//!   no pointer dangles.
//!
//! Entries whose value bytes fall outside the segment are dropped at parse
//! time; layout offsets are computed from the bytes actually carried, so a
//! rebuilt block is always self-consistent even for malformed input.

use crate::types::MetadataCategories;
use chrono::NaiveDateTime;

pub const EXIF_HEADER_LEN: usize = 6; // "Exif\0\0"

// Pointer tags
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;

// Datetime tags
const TAG_DATETIME: u16 = 0x0132; // IFD0
const TAG_DATETIME_ORIGINAL: u16 = 0x9003;
const TAG_DATETIME_DIGITIZED: u16 = 0x9004;
const SUBSEC_TAGS: &[u16] = &[0x9290, 0x9291, 0x9292];

// IFD0 category tags
const IFD0_CAMERA_TAGS: &[u16] = &[0x010F, 0x0110]; // Make, Model
const IFD0_SOFTWARE_TAGS: &[u16] = &[0x0131, 0x013C, 0x000B]; // Software, HostComputer, ProcessingSoftware
const IFD0_AUTHOR_TAGS: &[u16] = &[0x013B, 0x8298]; // Artist, Copyright
// ImageDescription plus the Windows XP* strings (written into IFD0 by Explorer)
const IFD0_COMMENT_TAGS: &[u16] = &[0x010E, 0x9C9B, 0x9C9C, 0x9C9D, 0x9C9E, 0x9C9F];

// ExifIFD category tags
// LensSpecification, LensMake, LensModel, BodySerialNumber, LensSerialNumber
const EXIF_CAMERA_TAGS: &[u16] = &[0xA432, 0xA433, 0xA434, 0xA431, 0xA435];
const EXIF_AUTHOR_TAGS: &[u16] = &[0xA430]; // CameraOwnerName (a.k.a. OwnerName)
const EXIF_COMMENT_TAGS: &[u16] = &[0x9286, 0x9C9B, 0x9C9C, 0x9C9D, 0x9C9E, 0x9C9F];
const TAG_MAKER_NOTE: u16 = 0x927C;

// ExifIFD capture-parameter tags covered by the shootingSettings category.
const SHOOTING_SETTINGS_TAGS: &[u16] = &[
    0x829A, 0x829D, // ExposureTime, FNumber
    0x8822, // ExposureProgram
    0x8827, // ISOSpeedRatings
    0x8830, 0x8831, 0x8832, 0x8833, 0x8834, 0x8835, // SensitivityType .. ISOSpeedLatitudezzz
    0x9201, 0x9202, 0x9203, 0x9204, 0x9205, 0x9206, // ShutterSpeed .. SubjectDistance
    0x9207, 0x9208, 0x9209, // MeteringMode, LightSource, Flash
    0x920A, // FocalLength
    0xA20E, 0xA20F, 0xA210, // FocalPlane{X,Y}Resolution, unit
    0xA215, // ExposureIndex
    0xA217, // SensingMethod
    0xA300, 0xA301, 0xA302, // FileSource, SceneType, CFAPattern
    0xA401, 0xA402, 0xA403, 0xA404, 0xA405, 0xA406, // CustomRendered .. SceneCaptureType
    0xA407, 0xA408, 0xA409, 0xA40A, 0xA40B, 0xA40C, // GainControl .. SubjectDistanceRange
    0xA420, // ImageUniqueID
    0xA460, 0xA461, 0xA462, // CompositeImage family
];

// Structural tags a full clean never removes.
const ESSENTIAL_IFD0: &[u16] = &[
    0x0100, 0x0101, // ImageWidth, ImageLength
    0x0102, 0x0103, 0x0106, // BitsPerSample, Compression, PhotometricInterpretation
    0x0112, // Orientation
    0x0115, // SamplesPerPixel
    0x011A, 0x011B, 0x0128, // XResolution, YResolution, ResolutionUnit
    0x0211, 0x0212, 0x0213, // YCbCrCoefficients, YCbCrSubSampling, YCbCrPositioning
    0x013E, 0x013F, // WhitePoint, PrimaryChromaticities
];
const ESSENTIAL_EXIF: &[u16] = &[0xA001, 0xA002, 0xA003]; // ColorSpace, PixelXDimension, PixelYDimension

// Thumbnail location tags in IFD1
const TAG_JPEG_FORMAT: u16 = 0x0201;
const TAG_JPEG_FORMAT_LENGTH: u16 = 0x0202;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ByteOrder {
    Little,
    Big,
}

fn read_u16(data: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let bytes = [data[offset], data[offset + 1]];
    match order {
        ByteOrder::Little => u16::from_le_bytes(bytes),
        ByteOrder::Big => u16::from_be_bytes(bytes),
    }
}

fn read_u32(data: &[u8], offset: usize, order: ByteOrder) -> u32 {
    let bytes = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    match order {
        ByteOrder::Little => u32::from_le_bytes(bytes),
        ByteOrder::Big => u32::from_be_bytes(bytes),
    }
}

fn write_u16(buf: &mut Vec<u8>, value: u16, order: ByteOrder) {
    match order {
        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
    }
}

fn write_u32(buf: &mut Vec<u8>, value: u32, order: ByteOrder) {
    match order {
        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
    }
}

fn patch_u32(buf: &mut [u8], pos: usize, value: u32, order: ByteOrder) {
    let bytes = match order {
        ByteOrder::Little => value.to_le_bytes(),
        ByteOrder::Big => value.to_be_bytes(),
    };
    buf[pos..pos + 4].copy_from_slice(&bytes);
}

fn type_byte_size(dtype: u16) -> usize {
    match dtype {
        1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,         // SHORT, SSHORT
        4 | 9 | 11 => 4,    // LONG, SLONG, FLOAT
        5 | 10 | 12 => 8,   // RATIONAL, SRATIONAL, DOUBLE
        _ => 1,
    }
}

#[derive(Clone, Debug)]
struct IfdEntry {
    tag: u16,
    dtype: u16,
    count: u32,
    /// Value bytes, inline or dereferenced. Always complete.
    data: Vec<u8>,
    /// For pointer and offset-valued tags: the raw 32-bit field value.
    raw_value: u32,
}

struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Tiff<'a> {
    /// `payload` is the APP1 payload including the "Exif\0\0" prefix.
    fn open(payload: &'a [u8]) -> Result<Self, String> {
        if payload.len() < EXIF_HEADER_LEN + 8 || &payload[..EXIF_HEADER_LEN] != b"Exif\0\0" {
            return Err("APP1 segment is not EXIF".to_string());
        }
        let data = &payload[EXIF_HEADER_LEN..];
        let order = match &data[0..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return Err("unknown TIFF byte order".to_string()),
        };
        if read_u16(data, 2, order) != 42 {
            return Err("bad TIFF magic".to_string());
        }
        Ok(Self { data, order })
    }

    fn ifd0_offset(&self) -> usize {
        read_u32(self.data, 4, self.order) as usize
    }

    /// Parse the IFD at `offset` (relative to TIFF start). Returns the
    /// complete entries and the next-IFD offset. Entries whose value bytes
    /// fall outside the block are dropped.
    fn parse_ifd(&self, offset: usize) -> (Vec<IfdEntry>, usize) {
        let data = self.data;
        if offset == 0 || offset + 2 > data.len() {
            return (Vec::new(), 0);
        }
        let entry_count = read_u16(data, offset, self.order) as usize;
        let mut entries = Vec::with_capacity(entry_count);

        for i in 0..entry_count {
            let at = offset + 2 + i * 12;
            if at + 12 > data.len() {
                break;
            }
            let tag = read_u16(data, at, self.order);
            let dtype = read_u16(data, at + 2, self.order);
            let count = read_u32(data, at + 4, self.order);
            let raw_value = read_u32(data, at + 8, self.order);
            let byte_count = type_byte_size(dtype).saturating_mul(count as usize);

            let value = if byte_count <= 4 {
                Some(data[at + 8..at + 8 + byte_count].to_vec())
            } else {
                let start = raw_value as usize;
                data.get(start..start.saturating_add(byte_count)).map(<[u8]>::to_vec)
            };
            if let Some(value) = value {
                entries.push(IfdEntry {
                    tag,
                    dtype,
                    count,
                    data: value,
                    raw_value,
                });
            }
        }

        let next_at = offset + 2 + entry_count * 12;
        let next = if next_at + 4 <= data.len() {
            read_u32(data, next_at, self.order) as usize
        } else {
            0
        };
        (entries, next)
    }
}

// ===== Datetime offset =====

/// Shift an EXIF datetime string (`YYYY:MM:DD HH:MM:SS`) by whole seconds.
/// `None` when the string does not parse or the result leaves the
/// representable range (years 1970–9999).
pub fn apply_offset(datetime: &str, offset_seconds: i64) -> Option<String> {
    let trimmed = datetime.trim().trim_matches('\0');
    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S").ok()?;
    let shifted = parsed.checked_add_signed(chrono::Duration::seconds(offset_seconds))?;
    use chrono::Datelike;
    if !(1970..=9999).contains(&shifted.year()) {
        return None;
    }
    Some(shifted.format("%Y:%m:%d %H:%M:%S").to_string())
}

/// Patch every present datetime tag (`DateTime`, `DateTimeOriginal`,
/// `DateTimeDigitized`) inside an EXIF APP1 payload, in place. The fields
/// are fixed-width, so the payload length is unchanged. Returns how many
/// fields were rewritten; a field whose shifted value would leave the
/// representable range is an error.
pub fn offset_datetimes(payload: &mut [u8], offset_seconds: i64) -> Result<usize, String> {
    let targets = {
        let tiff = Tiff::open(payload)?;
        datetime_field_offsets(&tiff)?
    };

    let mut patched = 0usize;
    for field_offset in targets {
        let at = EXIF_HEADER_LEN + field_offset;
        if at + 20 > payload.len() {
            continue;
        }
        let current = match std::str::from_utf8(&payload[at..at + 19]) {
            Ok(s) => s.trim().to_string(),
            Err(_) => continue,
        };
        if current.is_empty() || current.chars().all(|c| c == '\0' || c == ' ') {
            continue;
        }
        let shifted = apply_offset(&current, offset_seconds)
            .ok_or_else(|| "shifted datetime out of range".to_string())?;
        debug_assert_eq!(shifted.len(), 19);
        payload[at..at + 19].copy_from_slice(shifted.as_bytes());
        payload[at + 19] = 0;
        patched += 1;
    }
    Ok(patched)
}

/// Byte offsets (relative to TIFF start) of every 20-byte ASCII datetime
/// value present in IFD0 and the ExifIFD.
fn datetime_field_offsets(tiff: &Tiff<'_>) -> Result<Vec<usize>, String> {
    let mut offsets = Vec::new();
    let (ifd0, _) = tiff.parse_ifd(tiff.ifd0_offset());

    let mut exif_ifd_offset = None;
    for entry in &ifd0 {
        if entry.tag == TAG_DATETIME && entry.dtype == 2 && entry.count == 20 {
            offsets.push(entry.raw_value as usize);
        }
        if entry.tag == TAG_EXIF_IFD {
            exif_ifd_offset = Some(entry.raw_value as usize);
        }
    }
    if let Some(offset) = exif_ifd_offset {
        let (exif, _) = tiff.parse_ifd(offset);
        for entry in &exif {
            if (entry.tag == TAG_DATETIME_ORIGINAL || entry.tag == TAG_DATETIME_DIGITIZED)
                && entry.dtype == 2
                && entry.count == 20
            {
                offsets.push(entry.raw_value as usize);
            }
        }
    }
    Ok(offsets)
}

// ===== Category scan =====

/// What a scan of one EXIF block found, counted per category.
#[derive(Debug, Default, Clone)]
pub struct MetadataScan {
    pub gps_tags: usize,
    pub camera_lens_tags: usize,
    pub software_tags: usize,
    pub author_copyright_tags: usize,
    pub comment_tags: usize,
    pub thumbnail_tags: usize,
    pub shooting_settings_tags: usize,
    pub capture_datetime_tags: usize,
}

impl MetadataScan {
    /// Tags the given mask would remove from this block.
    pub fn tags_selected_by(&self, cats: &MetadataCategories) -> usize {
        let mut n = 0;
        if cats.gps {
            n += self.gps_tags;
        }
        if cats.camera_lens {
            n += self.camera_lens_tags;
        }
        if cats.software {
            n += self.software_tags;
        }
        if cats.author_copyright {
            n += self.author_copyright_tags;
        }
        if cats.comments {
            n += self.comment_tags;
        }
        if cats.thumbnail {
            n += self.thumbnail_tags;
        }
        if cats.shooting_settings {
            n += self.shooting_settings_tags;
        }
        if cats.capture_datetime {
            n += self.capture_datetime_tags;
        }
        n
    }
}

/// Scan an EXIF APP1 payload for category presence.
pub fn scan_categories(payload: &[u8]) -> Result<MetadataScan, String> {
    let tiff = Tiff::open(payload)?;
    let mut scan = MetadataScan::default();

    let (ifd0, ifd1_offset) = tiff.parse_ifd(tiff.ifd0_offset());
    let mut exif_ifd = None;
    for entry in &ifd0 {
        match entry.tag {
            TAG_GPS_IFD => {
                scan.gps_tags += 1 + tiff.parse_ifd(entry.raw_value as usize).0.len();
            }
            TAG_EXIF_IFD => exif_ifd = Some(entry.raw_value as usize),
            TAG_DATETIME => scan.capture_datetime_tags += 1,
            t if IFD0_CAMERA_TAGS.contains(&t) => scan.camera_lens_tags += 1,
            t if IFD0_SOFTWARE_TAGS.contains(&t) => scan.software_tags += 1,
            t if IFD0_AUTHOR_TAGS.contains(&t) => scan.author_copyright_tags += 1,
            t if IFD0_COMMENT_TAGS.contains(&t) => scan.comment_tags += 1,
            _ => {}
        }
    }

    if let Some(offset) = exif_ifd {
        let (exif, _) = tiff.parse_ifd(offset);
        for entry in &exif {
            match entry.tag {
                TAG_DATETIME_ORIGINAL | TAG_DATETIME_DIGITIZED => {
                    scan.capture_datetime_tags += 1
                }
                t if SUBSEC_TAGS.contains(&t) => scan.capture_datetime_tags += 1,
                t if EXIF_CAMERA_TAGS.contains(&t) => scan.camera_lens_tags += 1,
                t if EXIF_AUTHOR_TAGS.contains(&t) => scan.author_copyright_tags += 1,
                t if EXIF_COMMENT_TAGS.contains(&t) => scan.comment_tags += 1,
                t if SHOOTING_SETTINGS_TAGS.contains(&t) => scan.shooting_settings_tags += 1,
                _ => {}
            }
        }
    }

    if ifd1_offset != 0 {
        let (ifd1, _) = tiff.parse_ifd(ifd1_offset);
        scan.thumbnail_tags += ifd1.len();
    }

    Ok(scan)
}

// ===== Selective rebuild =====

pub struct StripOutcome {
    /// Replacement APP1 payload, "Exif\0\0" prefix included.
    pub payload: Vec<u8>,
    pub removed: usize,
}

fn remove_ifd0_tag(tag: u16, cats: &MetadataCategories, full_clean: bool) -> bool {
    // Pointer tags are handled structurally, never here.
    if tag == TAG_EXIF_IFD || tag == TAG_GPS_IFD {
        return false;
    }
    if cats.camera_lens && IFD0_CAMERA_TAGS.contains(&tag) {
        return true;
    }
    if cats.software && IFD0_SOFTWARE_TAGS.contains(&tag) {
        return true;
    }
    if cats.author_copyright && IFD0_AUTHOR_TAGS.contains(&tag) {
        return true;
    }
    if cats.comments && IFD0_COMMENT_TAGS.contains(&tag) {
        return true;
    }
    if cats.capture_datetime && tag == TAG_DATETIME {
        return true;
    }
    if full_clean {
        return !ESSENTIAL_IFD0.contains(&tag);
    }
    false
}

fn remove_exif_tag(tag: u16, cats: &MetadataCategories, full_clean: bool) -> bool {
    if ESSENTIAL_EXIF.contains(&tag) {
        return false;
    }
    // The interop sub-IFD is not relocated by the rebuild; its pointer is
    // always dropped so it cannot dangle.
    if tag == TAG_INTEROP_IFD {
        return true;
    }
    if tag == TAG_DATETIME_ORIGINAL
        || tag == TAG_DATETIME_DIGITIZED
        || SUBSEC_TAGS.contains(&tag)
    {
        return cats.capture_datetime || full_clean;
    }
    if SHOOTING_SETTINGS_TAGS.contains(&tag) {
        return cats.shooting_settings || full_clean;
    }
    if tag == TAG_MAKER_NOTE {
        return full_clean;
    }
    if cats.camera_lens && EXIF_CAMERA_TAGS.contains(&tag) {
        return true;
    }
    if cats.author_copyright && EXIF_AUTHOR_TAGS.contains(&tag) {
        return true;
    }
    if cats.comments && EXIF_COMMENT_TAGS.contains(&tag) {
        return true;
    }
    full_clean
}

/// Rebuild an EXIF APP1 payload with the selected categories removed.
///
/// The GPS IFD and the IFD1 thumbnail survive (relocated) unless their
/// categories are selected. Fails with "exif too large" when the rebuilt
/// block no longer fits a JPEG segment.
pub fn strip_categories(
    payload: &[u8],
    cats: &MetadataCategories,
    full_clean: bool,
) -> Result<StripOutcome, String> {
    let tiff = Tiff::open(payload)?;
    let order = tiff.order;

    let (ifd0_entries, ifd1_offset) = tiff.parse_ifd(tiff.ifd0_offset());

    let exif_entries = ifd0_entries
        .iter()
        .find(|e| e.tag == TAG_EXIF_IFD)
        .map(|e| tiff.parse_ifd(e.raw_value as usize).0)
        .unwrap_or_default();
    let gps_entries = ifd0_entries
        .iter()
        .find(|e| e.tag == TAG_GPS_IFD)
        .map(|e| tiff.parse_ifd(e.raw_value as usize).0)
        .unwrap_or_default();
    let ifd1_entries = if ifd1_offset != 0 {
        tiff.parse_ifd(ifd1_offset).0
    } else {
        Vec::new()
    };

    // Thumbnail bytes, if IFD1 survives and can be relocated.
    let drop_thumbnail = cats.thumbnail || full_clean;
    let thumbnail: Option<Vec<u8>> = if drop_thumbnail || ifd1_entries.is_empty() {
        None
    } else {
        let format = ifd1_entries.iter().find(|e| e.tag == TAG_JPEG_FORMAT);
        let length = ifd1_entries.iter().find(|e| e.tag == TAG_JPEG_FORMAT_LENGTH);
        match (format, length) {
            (Some(fmt), Some(len)) => {
                let start = fmt.raw_value as usize;
                let count = u32_from_entry(len, order) as usize;
                tiff.data.get(start..start.saturating_add(count)).map(<[u8]>::to_vec)
            }
            _ => None,
        }
    };
    let keep_ifd1 = !drop_thumbnail && thumbnail.is_some();

    let drop_gps = cats.gps || full_clean;
    let kept_gps: Vec<IfdEntry> = if drop_gps { Vec::new() } else { gps_entries };

    let kept_exif: Vec<IfdEntry> = exif_entries
        .iter()
        .filter(|e| !remove_exif_tag(e.tag, cats, full_clean))
        .cloned()
        .collect();

    let kept_ifd0: Vec<IfdEntry> = ifd0_entries
        .iter()
        .filter(|e| {
            if e.tag == TAG_EXIF_IFD {
                return !kept_exif.is_empty();
            }
            if e.tag == TAG_GPS_IFD {
                return !kept_gps.is_empty();
            }
            !remove_ifd0_tag(e.tag, cats, full_clean)
        })
        .cloned()
        .collect();

    // GPS IFD entries disappear with their pointer; the pointer itself is
    // counted in the IFD0 delta.
    let gps_removed = if drop_gps {
        ifd0_entries
            .iter()
            .find(|e| e.tag == TAG_GPS_IFD)
            .map(|e| tiff.parse_ifd(e.raw_value as usize).0.len())
            .unwrap_or(0)
    } else {
        0
    };
    let ifd1_removed = if keep_ifd1 { 0 } else { ifd1_entries.len() };
    let removed = (ifd0_entries.len() - kept_ifd0.len())
        + (exif_entries.len() - kept_exif.len())
        + gps_removed
        + ifd1_removed;

    // ===== Write the new TIFF block =====
    let mut out: Vec<u8> = Vec::new();
    match order {
        ByteOrder::Little => out.extend_from_slice(b"II"),
        ByteOrder::Big => out.extend_from_slice(b"MM"),
    }
    write_u16(&mut out, 42, order);
    write_u32(&mut out, 8, order); // IFD0 directly after the header

    let ifd0_patches = write_ifd(&mut out, &kept_ifd0, order, &[TAG_EXIF_IFD, TAG_GPS_IFD]);

    if !kept_exif.is_empty() {
        let position = out.len() as u32;
        if let Some(pos) = ifd0_patches.pointer(TAG_EXIF_IFD) {
            patch_u32(&mut out, pos, position, order);
        }
        write_ifd(&mut out, &kept_exif, order, &[]);
    }

    if !kept_gps.is_empty() {
        let position = out.len() as u32;
        if let Some(pos) = ifd0_patches.pointer(TAG_GPS_IFD) {
            patch_u32(&mut out, pos, position, order);
        }
        write_ifd(&mut out, &kept_gps, order, &[]);
    }

    if keep_ifd1 {
        let position = out.len() as u32;
        patch_u32(&mut out, ifd0_patches.next_ifd, position, order);
        let ifd1_patches = write_ifd(&mut out, &ifd1_entries, order, &[TAG_JPEG_FORMAT]);
        let thumbnail = thumbnail.expect("keep_ifd1 implies thumbnail bytes");
        if let Some(pos) = ifd1_patches.pointer(TAG_JPEG_FORMAT) {
            let at = out.len() as u32;
            patch_u32(&mut out, pos, at, order);
        }
        out.extend_from_slice(&thumbnail);
    }

    let mut payload_out = b"Exif\0\0".to_vec();
    payload_out.extend_from_slice(&out);
    if payload_out.len() > crate::jpeg::MAX_SEGMENT_PAYLOAD {
        return Err("exif too large".to_string());
    }

    Ok(StripOutcome {
        payload: payload_out,
        removed,
    })
}

fn u32_from_entry(entry: &IfdEntry, order: ByteOrder) -> u32 {
    if entry.data.len() >= 4 {
        read_u32(&entry.data, 0, order)
    } else if entry.data.len() >= 2 {
        read_u16(&entry.data, 0, order) as u32
    } else {
        0
    }
}

struct IfdPatches {
    pointers: Vec<(u16, usize)>,
    next_ifd: usize,
}

impl IfdPatches {
    fn pointer(&self, tag: u16) -> Option<usize> {
        self.pointers
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, pos)| *pos)
    }
}

/// Append one IFD to `out` (entry table, next-IFD field, overflow values).
/// Offsets are relative to the start of `out`, which is the TIFF origin.
/// Tags listed in `pointer_tags` get a zero placeholder recorded for later
/// patching; the next-IFD field is always a recorded placeholder.
fn write_ifd(
    out: &mut Vec<u8>,
    entries: &[IfdEntry],
    order: ByteOrder,
    pointer_tags: &[u16],
) -> IfdPatches {
    let data_area_start = out.len() + 2 + entries.len() * 12 + 4;
    write_u16(out, entries.len() as u16, order);

    let mut pointers = Vec::new();
    let mut cursor = data_area_start;

    for entry in entries {
        write_u16(out, entry.tag, order);
        write_u16(out, entry.dtype, order);
        write_u32(out, entry.count, order);

        if pointer_tags.contains(&entry.tag) {
            pointers.push((entry.tag, out.len()));
            write_u32(out, 0, order);
        } else if entry.data.len() <= 4 {
            out.extend_from_slice(&entry.data);
            for _ in entry.data.len()..4 {
                out.push(0);
            }
        } else {
            write_u32(out, cursor as u32, order);
            cursor += entry.data.len();
            if cursor % 2 != 0 {
                cursor += 1;
            }
        }
    }

    let next_ifd = out.len();
    write_u32(out, 0, order);

    for entry in entries {
        if pointer_tags.contains(&entry.tag) || entry.data.len() <= 4 {
            continue;
        }
        out.extend_from_slice(&entry.data);
        if out.len() % 2 != 0 {
            out.push(0);
        }
    }

    IfdPatches { pointers, next_ifd }
}
