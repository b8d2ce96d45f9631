// Google Motion Photo packaging (§4.8 `create_motion_photo`): injects an XMP
// APP1 segment describing an embedded MP4 into a JPEG, then appends the MP4
// bytes verbatim after the (now-XMP-tagged) JPEG.
//
// Grounded byte-for-byte on `replay_buffer/motion_photo.cpp`:
// `build_xmp_xml`, `inject_xmp_into_jpeg`, `create_motion_photo`. Pure file
// I/O — no Media Foundation dependency.

use std::path::Path;

use anyhow::{bail, Context, Result};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const APP1_MARKER: [u8; 2] = [0xFF, 0xE1];
const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

fn build_xmp_xml(presentation_timestamp_us: i64, mp4_size: u64) -> String {
    format!(
        r#"<?xpacket begin="\u{{feff}}" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:GCamera="http://ns.google.com/photos/1.0/camera/"
    xmlns:Container="http://ns.google.com/photos/1.0/container/"
    xmlns:Item="http://ns.google.com/photos/1.0/container/item/"
    GCamera:MotionPhoto="1"
    GCamera:MotionPhotoVersion="1"
    GCamera:MotionPhotoPresentationTimestampUs="{pts}">
   <Container:Directory>
    <rdf:Seq>
     <rdf:li rdf:parseType="Resource">
      <Container:Item Item:Mime="image/jpeg" Item:Semantic="Primary"/>
     </rdf:li>
     <rdf:li rdf:parseType="Resource">
      <Container:Item Item:Mime="video/mp4" Item:Semantic="MotionPhoto" Item:Length="{len}"/>
     </rdf:li>
    </rdf:Seq>
   </Container:Directory>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#,
        pts = presentation_timestamp_us,
        len = mp4_size,
    )
}

/// Build the complete APP1 segment (marker + length + namespace + XML),
/// failing if the payload can't fit in JPEG's 16-bit segment length field.
fn build_app1_segment(xmp_xml: &str) -> Result<Vec<u8>> {
    let payload_len = XMP_NAMESPACE.len() + xmp_xml.len();
    let segment_len = payload_len + 2; // length field includes itself
    if segment_len > 0xFFFF {
        bail!("motion photo XMP segment ({} bytes) exceeds JPEG's 65535 byte limit", segment_len);
    }

    let mut segment = Vec::with_capacity(2 + segment_len);
    segment.extend_from_slice(&APP1_MARKER);
    segment.extend_from_slice(&(segment_len as u16).to_be_bytes());
    segment.extend_from_slice(XMP_NAMESPACE);
    segment.extend_from_slice(xmp_xml.as_bytes());
    Ok(segment)
}

fn inject_xmp_into_jpeg(jpeg_bytes: &[u8], xmp_xml: &str) -> Result<Vec<u8>> {
    if jpeg_bytes.len() < 2 || jpeg_bytes[0..2] != JPEG_SOI {
        bail!("not a JPEG: missing SOI marker");
    }

    let app1 = build_app1_segment(xmp_xml)?;

    let mut out = Vec::with_capacity(jpeg_bytes.len() + app1.len());
    out.extend_from_slice(&JPEG_SOI);
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg_bytes[2..]);
    Ok(out)
}

/// Create a Google-compatible Motion Photo: `jpeg_path` with an embedded
/// XMP directory pointing at an MP4 clip, followed by the MP4's raw bytes.
pub fn create_motion_photo(jpeg_path: &Path, mp4_path: &Path, output_path: &Path, presentation_timestamp_us: i64) -> Result<()> {
    let jpeg_bytes = std::fs::read(jpeg_path).with_context(|| format!("reading {}", jpeg_path.display()))?;
    let mp4_bytes = std::fs::read(mp4_path).with_context(|| format!("reading {}", mp4_path.display()))?;

    let xmp_xml = build_xmp_xml(presentation_timestamp_us, mp4_bytes.len() as u64);
    let tagged_jpeg = inject_xmp_into_jpeg(&jpeg_bytes, &xmp_xml)?;

    let mut out = Vec::with_capacity(tagged_jpeg.len() + mp4_bytes.len());
    out.extend_from_slice(&tagged_jpeg);
    out.extend_from_slice(&mp4_bytes);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(output_path, out).with_context(|| format!("writing {}", output_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_non_jpeg_input() {
        let err = inject_xmp_into_jpeg(b"not a jpeg", "xml").unwrap_err();
        assert!(err.to_string().contains("SOI"));
    }

    #[test]
    fn xmp_segment_carries_presentation_timestamp() {
        let xml = build_xmp_xml(123_456, 999);
        assert!(xml.contains("GCamera:MotionPhotoPresentationTimestampUs=\"123456\""));
        assert!(xml.contains("Item:Length=\"999\""));
    }

    #[test]
    fn output_is_soi_app1_then_original_body_then_mp4() {
        let dir = tempdir().unwrap();
        let jpeg_path = dir.path().join("a.jpg");
        let mp4_path = dir.path().join("a.mp4");
        let out_path = dir.path().join("out.jpg");

        // minimal fake JPEG: SOI + EOI
        std::fs::write(&jpeg_path, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        std::fs::write(&mp4_path, b"fakemp4bytes").unwrap();

        create_motion_photo(&jpeg_path, &mp4_path, &out_path, 0).unwrap();
        let out = std::fs::read(&out_path).unwrap();

        assert_eq!(&out[0..2], &JPEG_SOI);
        assert_eq!(&out[2..4], &APP1_MARKER);
        assert!(out.ends_with(b"fakemp4bytes"));
    }
}
