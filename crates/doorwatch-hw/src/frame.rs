//! Frame type and JPEG helpers: SOI sniffing and `image2pipe` stream splitting.

/// JPEG start-of-image marker followed by the first marker prefix.
pub const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// A single encoded frame delivered by a live stream.
#[derive(Clone)]
pub struct Frame {
    /// Encoded image bytes (MJPEG frames from `image2pipe`).
    pub data: Vec<u8>,
    pub timestamp: std::time::Instant,
    /// Position of the frame in its stream, starting at 0.
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, sequence: u32) -> Self {
        Self {
            data,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    /// Whether the payload starts with the JPEG magic bytes.
    pub fn is_jpeg(&self) -> bool {
        is_jpeg(&self.data)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Check the first three bytes for `FF D8 FF`.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&JPEG_MAGIC)
}

/// Splits a concatenated MJPEG byte stream (ffmpeg `-f image2pipe -vcodec mjpeg`)
/// into individual JPEG images.
///
/// Bytes before the first SOI marker are discarded. A frame ends at the first
/// EOI marker after its SOI; ffmpeg's mjpeg encoder does not embed thumbnails,
/// so no nested EOI can appear inside a frame.
#[derive(Default)]
pub struct JpegSplitter {
    buf: Vec<u8>,
    /// Offset from which the EOI search resumes, so repeated pushes stay linear.
    scan_from: usize,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stdout, returning every image completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            let Some(start) = find(&self.buf, &JPEG_SOI, 0) else {
                // Keep a trailing 0xFF: it may be the first half of an SOI.
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                self.buf.drain(..self.buf.len() - keep);
                self.scan_from = 0;
                break;
            };
            if start > 0 {
                self.buf.drain(..start);
                self.scan_from = 0;
            }

            let from = self.scan_from.max(JPEG_SOI.len());
            match find(&self.buf, &JPEG_EOI, from) {
                Some(end) => {
                    let image: Vec<u8> = self.buf.drain(..end + JPEG_EOI.len()).collect();
                    self.scan_from = 0;
                    out.push(image);
                }
                None => {
                    // Resume one byte early in case the marker straddles chunks.
                    self.scan_from = self.buf.len().saturating_sub(1);
                    break;
                }
            }
        }

        out
    }

    /// Number of bytes held for an incomplete image.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
