//! JPEG marker-stream codec.
//!
//! [`JpegStream::parse`] splits a JPEG into its marker segments without
//! touching the entropy-coded image data: everything from SOS onward is
//! kept as one opaque byte run and copied back verbatim on
//! [`JpegStream::emit`]. Metadata operations edit, replace or drop
//! individual segments and re-emit; untouched segments keep their original
//! bytes and order, so a parse → emit round trip is byte-identical.
//!
//! The full decode path ([`recompress`]) is only taken when pixels actually
//! change: decode, Lanczos3 resize, baseline re-encode at the requested
//! quality, optionally carrying the first EXIF APP1 segment over verbatim.

pub mod tiff;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use std::io::Cursor;
use std::path::Path;

pub const MARKER_SOI: u8 = 0xD8;
pub const MARKER_EOI: u8 = 0xD9;
pub const MARKER_SOS: u8 = 0xDA;
pub const MARKER_APP0: u8 = 0xE0;
pub const MARKER_APP1: u8 = 0xE1;
pub const MARKER_APP13: u8 = 0xED;

/// Identifier prefixes inside APP segments.
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";
pub const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
pub const IPTC_HEADER: &[u8] = b"Photoshop 3.0\0";

/// Largest payload a length-prefixed segment can carry (u16 length field
/// includes its own two bytes).
pub const MAX_SEGMENT_PAYLOAD: usize = 65533;

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// A length-prefixed segment. `payload` excludes the length field.
    Segment { marker: u8, payload: Vec<u8> },
    /// A bare marker with no length (TEM, RSTn).
    Standalone(u8),
}

impl Chunk {
    pub fn marker(&self) -> u8 {
        match self {
            Chunk::Segment { marker, .. } => *marker,
            Chunk::Standalone(marker) => *marker,
        }
    }

    pub fn is_exif_app1(&self) -> bool {
        matches!(self, Chunk::Segment { marker, payload }
            if *marker == MARKER_APP1 && payload.starts_with(EXIF_HEADER))
    }

    pub fn is_xmp_app1(&self) -> bool {
        matches!(self, Chunk::Segment { marker, payload }
            if *marker == MARKER_APP1 && payload.starts_with(XMP_HEADER))
    }

    pub fn is_iptc_app13(&self) -> bool {
        matches!(self, Chunk::Segment { marker, payload }
            if *marker == MARKER_APP13 && payload.starts_with(IPTC_HEADER))
    }
}

/// A parsed JPEG: header segments plus the untouched entropy tail
/// (SOS marker through end of file).
#[derive(Debug, Clone, PartialEq)]
pub struct JpegStream {
    pub chunks: Vec<Chunk>,
    pub entropy: Vec<u8>,
}

impl JpegStream {
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        if data.len() < 4 || data[0] != 0xFF || data[1] != MARKER_SOI {
            return Err("not a JPEG file (missing SOI)".to_string());
        }

        let mut chunks = Vec::new();
        let mut entropy = Vec::new();
        let mut pos = 2usize;

        while pos < data.len() {
            if data[pos] != 0xFF {
                // Stray bytes before any SOS: keep them so emit stays lossless.
                entropy = data[pos..].to_vec();
                break;
            }
            if pos + 1 >= data.len() {
                entropy = data[pos..].to_vec();
                break;
            }
            let marker = data[pos + 1];

            if marker == MARKER_SOS || marker == MARKER_EOI {
                entropy = data[pos..].to_vec();
                break;
            }
            if marker == 0x00 || marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
                chunks.push(Chunk::Standalone(marker));
                pos += 2;
                continue;
            }
            if pos + 4 > data.len() {
                return Err(format!("truncated segment header at marker 0x{marker:02X}"));
            }
            let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            if seg_len < 2 || pos + 2 + seg_len > data.len() {
                return Err(format!("truncated segment body at marker 0x{marker:02X}"));
            }
            chunks.push(Chunk::Segment {
                marker,
                payload: data[pos + 4..pos + 2 + seg_len].to_vec(),
            });
            pos += 2 + seg_len;
        }

        Ok(Self { chunks, entropy })
    }

    /// Serialize back to bytes. Fails when an edited segment has outgrown
    /// the u16 length field.
    pub fn emit(&self) -> Result<Vec<u8>, String> {
        let mut out = Vec::with_capacity(
            2 + self
                .chunks
                .iter()
                .map(|c| match c {
                    Chunk::Segment { payload, .. } => payload.len() + 4,
                    Chunk::Standalone(_) => 2,
                })
                .sum::<usize>()
                + self.entropy.len(),
        );
        out.push(0xFF);
        out.push(MARKER_SOI);
        for chunk in &self.chunks {
            match chunk {
                Chunk::Segment { marker, payload } => {
                    if payload.len() > MAX_SEGMENT_PAYLOAD {
                        return Err(format!(
                            "segment 0x{marker:02X} payload exceeds {MAX_SEGMENT_PAYLOAD} bytes"
                        ));
                    }
                    out.push(0xFF);
                    out.push(*marker);
                    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
                    out.extend_from_slice(payload);
                }
                Chunk::Standalone(marker) => {
                    out.push(0xFF);
                    out.push(*marker);
                }
            }
        }
        out.extend_from_slice(&self.entropy);
        Ok(out)
    }

    /// Index of the first EXIF APP1 segment, if any.
    pub fn first_exif_app1(&self) -> Option<usize> {
        self.chunks.iter().position(Chunk::is_exif_app1)
    }
}

/// Decode → resize → re-encode a JPEG, returning the new file bytes.
///
/// `resize_percent` scales both dimensions (100 keeps them); `quality` maps
/// to standard baseline quantization tables. With `preserve_exif` the first
/// EXIF APP1 segment of the source is spliced into the output right after
/// SOI; the decode path does not re-orient pixels, so the carried segment's
/// orientation tag still applies.
pub fn recompress(
    source: &Path,
    resize_percent: f32,
    quality: u8,
    preserve_exif: bool,
) -> Result<Vec<u8>, String> {
    let original = std::fs::read(source).map_err(|e| format!("read failed: {e}"))?;

    let mut image = ImageReader::new(Cursor::new(&original))
        .with_guessed_format()
        .map_err(|e| format!("open failed: {e}"))?
        .decode()
        .map_err(|e| format!("decode failed: {e}"))?;

    let ratio = (resize_percent / 100.0).clamp(0.01, 1.0);
    if ratio < 0.999 {
        let nw = ((image.width() as f32) * ratio).round().max(1.0) as u32;
        let nh = ((image.height() as f32) * ratio).round().max(1.0) as u32;
        image = image.resize_exact(nw, nh, FilterType::Lanczos3);
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100))
        .encode_image(&image)
        .map_err(|e| format!("encode failed: {e}"))?;

    if !preserve_exif {
        return Ok(encoded);
    }

    let exif_chunk = JpegStream::parse(&original)
        .ok()
        .and_then(|stream| {
            stream
                .first_exif_app1()
                .map(|i| stream.chunks[i].clone())
        });
    match exif_chunk {
        Some(chunk) => {
            let mut stream = JpegStream::parse(&encoded)?;
            stream.chunks.insert(0, chunk);
            stream.emit()
        }
        None => Ok(encoded),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal synthetic JPEG: SOI, one APP1, one fake DQT, SOS + data + EOI.
    pub(crate) fn synthetic_jpeg(app1_payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.push(0xFF);
        data.push(MARKER_APP1);
        data.extend_from_slice(&((app1_payload.len() + 2) as u16).to_be_bytes());
        data.extend_from_slice(app1_payload);
        // Fake quantization table segment
        let dqt = [0u8; 5];
        data.push(0xFF);
        data.push(0xDB);
        data.extend_from_slice(&((dqt.len() + 2) as u16).to_be_bytes());
        data.extend_from_slice(&dqt);
        // SOS + entropy + EOI
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x04, 0x01, 0x02]);
        data.extend_from_slice(&[0xAB, 0xCD, 0xEF]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    #[test]
    fn parse_emit_round_trip_is_byte_identical() {
        let mut payload = EXIF_HEADER.to_vec();
        payload.extend_from_slice(b"IIabcdef");
        let original = synthetic_jpeg(&payload);
        let stream = JpegStream::parse(&original).unwrap();
        assert_eq!(stream.emit().unwrap(), original);
    }

    #[test]
    fn parse_splits_segments_and_entropy() {
        let mut payload = EXIF_HEADER.to_vec();
        payload.extend_from_slice(b"II");
        let data = synthetic_jpeg(&payload);
        let stream = JpegStream::parse(&data).unwrap();
        assert_eq!(stream.chunks.len(), 2);
        assert!(stream.chunks[0].is_exif_app1());
        assert_eq!(stream.chunks[1].marker(), 0xDB);
        assert_eq!(stream.entropy[0], 0xFF);
        assert_eq!(stream.entropy[1], MARKER_SOS);
        assert_eq!(*stream.entropy.last().unwrap(), MARKER_EOI);
    }

    #[test]
    fn classifies_xmp_and_iptc() {
        let xmp = Chunk::Segment {
            marker: MARKER_APP1,
            payload: XMP_HEADER.to_vec(),
        };
        assert!(xmp.is_xmp_app1());
        assert!(!xmp.is_exif_app1());

        let iptc = Chunk::Segment {
            marker: MARKER_APP13,
            payload: IPTC_HEADER.to_vec(),
        };
        assert!(iptc.is_iptc_app13());
    }

    #[test]
    fn rejects_non_jpeg() {
        assert!(JpegStream::parse(b"PNG\x0d\x0a").is_err());
        assert!(JpegStream::parse(&[0xFF, 0xD8]).is_err());
    }

    #[test]
    fn rejects_truncated_segment() {
        // APP1 claims 100 bytes but the file ends early
        let data = [0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x64, 0x01, 0x02];
        let err = JpegStream::parse(&data).unwrap_err();
        assert!(err.contains("0xE1"));
    }

    #[test]
    fn emit_rejects_oversized_segment() {
        let stream = JpegStream {
            chunks: vec![Chunk::Segment {
                marker: MARKER_APP1,
                payload: vec![0u8; MAX_SEGMENT_PAYLOAD + 1],
            }],
            entropy: vec![0xFF, 0xD9],
        };
        assert!(stream.emit().is_err());
    }

    #[test]
    fn recompress_shrinks_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("in.jpg");
        let img = image::DynamicImage::new_rgb8(100, 80);
        img.save(&source).unwrap();

        let bytes = recompress(&source, 50.0, 80, false).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 50);
        assert_eq!(decoded.height(), 40);
    }

    #[test]
    fn recompress_carries_exif_segment() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("in.jpg");
        // Encode a real JPEG, then splice a recognizable EXIF segment in.
        let img = image::DynamicImage::new_rgb8(16, 16);
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, 90)
            .encode_image(&img)
            .unwrap();
        let mut stream = JpegStream::parse(&encoded).unwrap();
        let mut payload = EXIF_HEADER.to_vec();
        payload.extend_from_slice(b"IIMARKERBYTES");
        stream.chunks.insert(
            0,
            Chunk::Segment {
                marker: MARKER_APP1,
                payload: payload.clone(),
            },
        );
        std::fs::write(&source, stream.emit().unwrap()).unwrap();

        let out = recompress(&source, 100.0, 80, true).unwrap();
        let out_stream = JpegStream::parse(&out).unwrap();
        let idx = out_stream.first_exif_app1().expect("EXIF carried over");
        match &out_stream.chunks[idx] {
            Chunk::Segment { payload: carried, .. } => assert_eq!(*carried, payload),
            _ => unreachable!(),
        }

        let without = recompress(&source, 100.0, 80, false).unwrap();
        assert!(JpegStream::parse(&without).unwrap().first_exif_app1().is_none());
    }
}
