//! Frame sources: sequential and seek access to decoded video frames.
//!
//! A [`FrameSource`] is blocking by contract. Async callers run it on the
//! blocking pool (see `KeyframeExtractor`), never on the runtime threads.

use image::{DynamicImage, RgbImage};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoMetadata;

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Index of the frame in the source video
    pub index: u64,
    /// Presentation time in milliseconds
    pub timestamp_ms: u64,
    /// Decoded pixels
    pub pixels: DynamicImage,
}

impl Frame {
    pub fn timestamp_s(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }
}

/// Decoder handle for one video.
pub trait FrameSource: Send {
    /// Container metadata (duration, frame rate, frame count).
    fn metadata(&self) -> &VideoMetadata;

    /// Restart sequential decoding from the first frame.
    fn rewind(&mut self) -> MediaResult<()>;

    /// Next frame in decode order, `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Decode the frame with the given source index, `None` past the end.
    fn seek_frame(&mut self, index: u64) -> MediaResult<Option<Frame>>;
}

fn timestamp_ms_for(metadata: &VideoMetadata, index: u64) -> u64 {
    (metadata.timestamp_of(index) * 1000.0).round() as u64
}

// =============================================================================
// Decode budget
// =============================================================================

/// Bounds on how much decoding one extraction may do.
///
/// Every decoded frame is charged against a frame budget and a wall-clock
/// deadline; the cancel flag is polled at the same time.
#[derive(Debug)]
pub struct DecodeBudget {
    max_frames: u64,
    decoded: u64,
    started: Instant,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl DecodeBudget {
    pub fn new(max_frames: u64, timeout: Duration) -> Self {
        Self {
            max_frames,
            decoded: 0,
            started: Instant::now(),
            timeout,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an external cancellation flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Account for one decoded frame.
    pub fn charge(&mut self) -> MediaResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(MediaError::Cancelled);
        }
        self.decoded += 1;
        if self.decoded > self.max_frames {
            return Err(MediaError::FrameBudgetExceeded(self.max_frames));
        }
        if self.started.elapsed() > self.timeout {
            return Err(MediaError::Timeout(self.timeout.as_secs()));
        }
        Ok(())
    }

    /// Frames decoded so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

// =============================================================================
// In-memory source
// =============================================================================

/// Frames already held in memory at a fixed frame rate.
pub struct MemoryFrameSource {
    metadata: VideoMetadata,
    frames: Vec<Arc<DynamicImage>>,
    cursor: usize,
}

impl MemoryFrameSource {
    /// Wrap decoded frames; duration is `frames / fps`.
    pub fn new(frames: Vec<DynamicImage>, fps: f64) -> MediaResult<Self> {
        let (width, height) = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        let duration_s = if fps > 0.0 {
            frames.len() as f64 / fps
        } else {
            0.0
        };

        let mut metadata = VideoMetadata::new(duration_s, fps, width, height);
        metadata.frame_count = frames.len() as u64;
        metadata.validate()?;

        Ok(Self {
            metadata,
            frames: frames.into_iter().map(Arc::new).collect(),
            cursor: 0,
        })
    }

    fn frame_at(&self, index: usize) -> Option<Frame> {
        self.frames.get(index).map(|pixels| Frame {
            index: index as u64,
            timestamp_ms: timestamp_ms_for(&self.metadata, index as u64),
            pixels: pixels.as_ref().clone(),
        })
    }
}

impl FrameSource for MemoryFrameSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let frame = self.frame_at(self.cursor);
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn seek_frame(&mut self, index: u64) -> MediaResult<Option<Frame>> {
        Ok(usize::try_from(index).ok().and_then(|i| self.frame_at(i)))
    }
}

// =============================================================================
// FFmpeg source
// =============================================================================

/// Live rawvideo stream from one FFmpeg child.
struct RawStream {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl Drop for RawStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Frame source that decodes through the `ffmpeg` CLI as RGB24 rawvideo.
///
/// Sequential reads share one child process. A seek restarts the stream at
/// the requested time, unless the target is a short distance ahead of the
/// current position, in which case the intervening frames are read through.
pub struct FfmpegFrameSource {
    path: PathBuf,
    metadata: VideoMetadata,
    out_width: u32,
    out_height: u32,
    max_forward_gap: u64,
    stream: Option<RawStream>,
    next_index: u64,
    exhausted: bool,
}

impl FfmpegFrameSource {
    /// Open a probed video, scaling frames down to `max_width` when wider.
    pub fn open(
        path: impl AsRef<Path>,
        metadata: VideoMetadata,
        max_width: u32,
    ) -> MediaResult<Self> {
        check_ffmpeg()?;
        metadata.validate()?;

        let (out_width, out_height) = scaled_dimensions(metadata.width, metadata.height, max_width)
            .ok_or_else(|| {
                MediaError::InvalidVideo(format!(
                    "unusable frame size {}x{}",
                    metadata.width, metadata.height
                ))
            })?;

        debug!(
            width = out_width,
            height = out_height,
            fps = metadata.fps,
            "Opened FFmpeg frame source"
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            max_forward_gap: metadata.fps.ceil().max(1.0) as u64,
            metadata,
            out_width,
            out_height,
            stream: None,
            next_index: 0,
            exhausted: false,
        })
    }

    fn bytes_per_frame(&self) -> usize {
        self.out_width as usize * self.out_height as usize * 3
    }

    /// Spawn a stream whose first output frame is `from_index`.
    fn start_stream(&mut self, from_index: u64) -> MediaResult<()> {
        self.stream = None;

        let mut cmd = FfmpegCommand::to_pipe(&self.path);
        if from_index > 0 {
            // Floor to the millisecond so rounding never lands past the frame
            let seek_s = (self.metadata.timestamp_of(from_index) * 1000.0).floor() / 1000.0;
            cmd = cmd.seek(seek_s);
        }
        let cmd = cmd
            .output_args(["-vsync", "0"])
            .rawvideo_rgb24(Some((self.out_width, self.out_height)));

        let mut child = cmd
            .to_std_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
        })?;

        self.stream = Some(RawStream {
            child,
            reader: BufReader::with_capacity(self.bytes_per_frame().max(8192), stdout),
        });
        self.next_index = from_index;
        self.exhausted = false;
        Ok(())
    }

    /// Read the frame at `next_index` from the live stream.
    fn read_frame(&mut self) -> MediaResult<Option<Frame>> {
        let bytes = self.bytes_per_frame();
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; bytes];
        match stream.reader.read_exact(&mut buffer) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return self.finish_stream();
            }
            Err(e) => return Err(MediaError::decode_failed(format!("reading frames: {}", e))),
        }

        let pixels = RgbImage::from_raw(self.out_width, self.out_height, buffer)
            .ok_or_else(|| MediaError::decode_failed("short rawvideo frame"))?;

        let index = self.next_index;
        self.next_index += 1;

        Ok(Some(Frame {
            index,
            timestamp_ms: timestamp_ms_for(&self.metadata, index),
            pixels: DynamicImage::ImageRgb8(pixels),
        }))
    }

    /// End of stream: a failed exit before any frame means the video is unreadable.
    fn finish_stream(&mut self) -> MediaResult<Option<Frame>> {
        self.exhausted = true;
        if let Some(mut stream) = self.stream.take() {
            let status = stream.child.wait()?;
            if !status.success() {
                if self.next_index == 0 {
                    return Err(MediaError::decode_failed(format!(
                        "FFmpeg could not decode {} (exit {:?})",
                        self.path.display(),
                        status.code()
                    )));
                }
                warn!(
                    exit_code = ?status.code(),
                    frame = self.next_index,
                    "FFmpeg stream ended with non-zero status"
                );
            }
        }
        Ok(None)
    }
}

impl FrameSource for FfmpegFrameSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.stream = None;
        self.next_index = 0;
        self.exhausted = false;
        Ok(())
    }

    fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.stream.is_none() {
            self.start_stream(self.next_index)?;
        }
        self.read_frame()
    }

    fn seek_frame(&mut self, index: u64) -> MediaResult<Option<Frame>> {
        if index >= self.metadata.frame_count {
            return Ok(None);
        }

        let reuse = self.stream.is_some()
            && index >= self.next_index
            && index - self.next_index <= self.max_forward_gap;

        if reuse {
            while self.next_index < index {
                if self.read_frame()?.is_none() {
                    return Ok(None);
                }
            }
        } else {
            self.start_stream(index)?;
        }

        self.read_frame()
    }
}

/// Output size that fits `max_width`, keeping aspect ratio and even sides.
fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> Option<(u32, u32)> {
    if width < 2 || height < 2 {
        return None;
    }
    if width <= max_width || max_width < 2 {
        return Some((width & !1, height & !1));
    }
    let out_w = max_width & !1;
    let out_h = ((height as f64 * out_w as f64 / width as f64).round() as u32).max(2) & !1;
    Some((out_w, out_h))
}
