//! Frame admission and face-crop accumulation for a capture session.

use doorwatch_core::DetectionCrop;
use doorwatch_hw::Frame;

/// Why a frame was turned away before detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotJpeg,
    BatchFull,
}

/// Decides whether a frame is worth a detector call.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameFilter;

impl FrameFilter {
    pub fn check(&self, frame: &Frame, accumulator: &FaceAccumulator) -> Result<(), Rejection> {
        if !frame.is_jpeg() {
            return Err(Rejection::NotJpeg);
        }
        if accumulator.is_full() {
            return Err(Rejection::BatchFull);
        }
        Ok(())
    }

    pub fn accept(&self, frame: &Frame, accumulator: &FaceAccumulator) -> bool {
        self.check(frame, accumulator).is_ok()
    }
}

/// Bounded FIFO of accepted face crops.
///
/// Holds at most `target` crops; a batch is handed to recognition once full.
#[derive(Debug)]
pub struct FaceAccumulator {
    crops: Vec<DetectionCrop>,
    target: usize,
}

impl FaceAccumulator {
    pub fn new(target: usize) -> Self {
        Self {
            crops: Vec::with_capacity(target),
            target,
        }
    }

    /// Append a crop. Returns `false` (dropping the crop) when already full.
    pub fn append(&mut self, crop: DetectionCrop) -> bool {
        if self.is_full() {
            return false;
        }
        self.crops.push(crop);
        true
    }

    pub fn is_full(&self) -> bool {
        self.crops.len() >= self.target
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Take every crop in arrival order, leaving the accumulator empty.
    pub fn drain_all(&mut self) -> Vec<DetectionCrop> {
        std::mem::take(&mut self.crops)
    }

    /// Discard every crop. Later frames are trusted over earlier ones, so
    /// nothing from a failed batch is kept.
    pub fn reset(&mut self) {
        self.crops.clear();
    }
}
