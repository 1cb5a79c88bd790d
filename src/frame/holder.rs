//! Process-wide current-frame slot

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use super::{Frame, FrameBuffer, FrameError, PixelFormat};

/// Single slot holding the most recently published frame.
///
/// The producer replaces the whole snapshot with one atomic pointer swap;
/// every streaming connection loads the snapshot once per iteration and keeps
/// its `Arc` until the frame has been written.
#[derive(Default)]
pub struct FrameHolder {
    current: ArcSwapOption<Frame>,
    published: AtomicU64,
}

impl FrameHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a raw frame described by `format`, `width` and `height`.
    pub fn set_frame(
        &self,
        format: PixelFormat,
        buffer: FrameBuffer,
        width: usize,
        height: usize,
    ) -> Result<(), FrameError> {
        let frame = Frame::new(format, buffer, width, height)?;
        self.publish(frame);
        Ok(())
    }

    /// Publishes a ready-made JPEG image.
    pub fn set_frame_jpeg(&self, data: Bytes, width: usize, height: usize) -> Result<(), FrameError> {
        let frame = Frame::jpeg(data, width, height)?;
        self.publish(frame);
        Ok(())
    }

    /// Replaces the current frame.
    pub fn publish(&self, frame: Frame) {
        let descriptor = *frame.descriptor();
        self.current.store(Some(Arc::new(frame)));
        let n = self.published.fetch_add(1, Ordering::Relaxed) + 1;

        trace!(
            seq = n,
            format = %descriptor.format,
            width = descriptor.width,
            height = descriptor.height,
            bytes = descriptor.byte_size,
            "Frame published"
        );
    }

    /// Snapshot of the current frame, if any has been published
    pub fn current(&self) -> Option<Arc<Frame>> {
        self.current.load_full()
    }

    /// Drops the current frame.
    pub fn clear(&self) {
        self.current.store(None);
    }

    /// Number of frames published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn gray_frame(width: usize, height: usize, value: u8) -> FrameBuffer {
        FrameBuffer::Flat(Bytes::from(vec![value; width * height]))
    }

    #[test]
    fn test_empty_holder() {
        let holder = FrameHolder::new();
        assert!(holder.current().is_none());
        assert_eq!(holder.published(), 0);
    }

    #[test]
    fn test_publish_replaces_frame() {
        let holder = FrameHolder::new();
        holder
            .set_frame(PixelFormat::Grayscale, gray_frame(4, 2, 1), 4, 2)
            .unwrap();
        let first = holder.current().unwrap();

        holder
            .set_frame(PixelFormat::Grayscale, gray_frame(8, 4, 2), 8, 4)
            .unwrap();
        let second = holder.current().unwrap();

        // an earlier snapshot is unaffected by the swap
        assert_eq!(first.width(), 4);
        assert_eq!(second.width(), 8);
        assert_eq!(holder.published(), 2);

        holder.clear();
        assert!(holder.current().is_none());
    }

    #[test]
    fn test_invalid_frame_not_published() {
        let holder = FrameHolder::new();
        let result = holder.set_frame(PixelFormat::Grayscale, gray_frame(4, 1, 0), 4, 2);
        assert!(result.is_err());
        assert!(holder.current().is_none());
        assert_eq!(holder.published(), 0);
    }

    #[test]
    fn test_readers_never_see_torn_frames() {
        let holder = Arc::new(FrameHolder::new());
        holder
            .set_frame(PixelFormat::Grayscale, gray_frame(2, 2, 2), 2, 2)
            .unwrap();

        let writer = {
            let holder = Arc::clone(&holder);
            thread::spawn(move || {
                for i in 1..200usize {
                    let side = 2 + (i % 7);
                    holder
                        .set_frame(PixelFormat::Grayscale, gray_frame(side, side, side as u8), side, side)
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let holder = Arc::clone(&holder);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let frame = holder.current().unwrap();
                        let FrameBuffer::Flat(data) = frame.buffer() else {
                            panic!("expected flat buffer");
                        };
                        assert_eq!(data.len(), frame.width() * frame.height());
                        assert!(data.iter().all(|&v| v as usize == frame.width()));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
