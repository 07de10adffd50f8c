use super::*;

/// Device-side collaborator: fills a frame with one color plane and one
/// aligned depth plane per call.
pub trait FrameSource: Send {
    fn size(&self) -> (u32, u32);

    /// Overwrites the planes of `frame`. On error the frame contents are
    /// undefined and the ring does not expose it.
    fn capture(&mut self, frame: &mut FrameBuffer) -> Result<()>;
}

//
// Frame ring
//

struct Slot {
    locked: AtomicBool,
    frame: Mutex<FrameBuffer>,
}

/// Fixed set of frame buffers rotated between one producer and any number of
/// consumers. The producer only ever writes the slot after `current`, and
/// only moves `current` once that write succeeded.
pub struct FrameRing {
    slots: Box<[Slot]>,
    current: AtomicUsize,
    depth_range: AtomicU32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Publish {
    Published,
    Failed,
    Stopped,
}

const STALL_POLL_INTERVAL: Duration = Duration::from_millis(1);

fn pack_range(min_depth: u16, max_depth: u16) -> u32 {
    u32::from(min_depth) | u32::from(max_depth) << 16
}

fn unpack_range(packed: u32) -> (u16, u16) {
    ((packed & 0xffff) as u16, (packed >> 16) as u16)
}

impl FrameRing {
    pub fn new(count: usize, width: u32, height: u32, min_depth: u16, max_depth: u16) -> Result<Self> {
        ensure!(count >= 2, "Frame ring needs at least 2 buffers, got {count}");
        let slots = (0..count)
            .map(|_| {
                Ok(Slot {
                    locked: AtomicBool::new(false),
                    frame: Mutex::new(FrameBuffer::new(width, height, min_depth, max_depth)?),
                })
            })
            .collect::<Result<Box<[_]>>>()?;
        Ok(Self {
            slots,
            current: AtomicUsize::new(0),
            depth_range: AtomicU32::new(pack_range(min_depth, max_depth)),
        })
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// New sensor range, picked up by the next acquired or captured frame.
    pub fn set_depth_range(&self, min_depth: u16, max_depth: u16) -> Result<()> {
        ensure!(
            min_depth < max_depth,
            "Invalid depth range {min_depth}..{max_depth}"
        );
        self.depth_range
            .store(pack_range(min_depth, max_depth), Ordering::Release);
        Ok(())
    }

    pub fn depth_range(&self) -> (u16, u16) {
        unpack_range(self.depth_range.load(Ordering::Acquire))
    }

    /// Locks the current frame for reading and repair. The slot stays locked
    /// until the guard is dropped.
    pub fn acquire(&self) -> Result<FrameGuard<'_>> {
        let slot = loop {
            if let Some(slot) = self.try_lock(self.current_index()) {
                break slot;
            }
        };
        let mut frame = slot.frame.lock().unwrap_or_else(PoisonError::into_inner);
        let (min_depth, max_depth) = self.depth_range();
        if frame.depth_range() != (min_depth, max_depth) {
            frame.set_depth_range(min_depth, max_depth)?;
        }
        Ok(FrameGuard { slot, frame })
    }

    /// Marks slot `index` locked, then checks it is still current. A stale
    /// index may name the slot the producer is writing, so it is released
    /// again and `None` is returned.
    fn try_lock(&self, index: usize) -> Option<&Slot> {
        let slot = &self.slots[index];
        slot.locked.store(true, Ordering::SeqCst);
        if self.current_index() == index {
            Some(slot)
        } else {
            slot.locked.store(false, Ordering::SeqCst);
            None
        }
    }

    /// Producer side: waits for the next slot to be released, fills it with
    /// `write` and makes it current. Gives up without writing if `running`
    /// goes false while waiting.
    pub fn publish_next<F>(&self, running: &AtomicBool, stats: &CaptureStats, write: F) -> Publish
    where
        F: FnOnce(&mut FrameBuffer) -> Result<()>,
    {
        let next = (self.current_index() + 1) % self.slots.len();
        let slot = &self.slots[next];

        let mut stalled = false;
        while slot.locked.load(Ordering::SeqCst) {
            if !stalled {
                warn!("Frame buffer {next} is still locked, capture stalled");
                stats.stalls.fetch_add(1, Ordering::Relaxed);
                stalled = true;
            }
            if !running.load(Ordering::Acquire) {
                return Publish::Stopped;
            }
            thread::sleep(STALL_POLL_INTERVAL);
        }

        let mut frame = slot.frame.lock().unwrap_or_else(PoisonError::into_inner);
        frame.filtered = false;
        let (min_depth, max_depth) = self.depth_range();
        let result = frame
            .set_depth_range(min_depth, max_depth)
            .and_then(|_| write(&mut frame));
        drop(frame);

        match result {
            Ok(()) => {
                self.current.store(next, Ordering::SeqCst);
                stats.frames.fetch_add(1, Ordering::Relaxed);
                Publish::Published
            }
            Err(err) => {
                warn!("Frame capture failed: {err:#}");
                stats.failures.fetch_add(1, Ordering::Relaxed);
                Publish::Failed
            }
        }
    }
}

pub struct FrameGuard<'a> {
    slot: &'a Slot,
    frame: MutexGuard<'a, FrameBuffer>,
}

impl Deref for FrameGuard<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.frame
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.slot.locked.store(false, Ordering::SeqCst);
    }
}

//
// Capture thread
//

/// Counters shared between a capture thread and whoever wants to report on
/// it.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames: AtomicU64,
    pub failures: AtomicU64,
    pub stalls: AtomicU64,
    pub last_capture_us: AtomicU64,
}

impl CaptureStats {
    pub fn summary(&self) -> String {
        format!(
            "frames: {}, failures: {}, stalls: {}, capture: {:.03} ms",
            self.frames.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.stalls.load(Ordering::Relaxed),
            1e-3 * self.last_capture_us.load(Ordering::Relaxed) as f64
        )
    }
}

pub struct Capturer {
    thread: Option<thread::JoinHandle<()>>,
    keep_running: Arc<AtomicBool>,
}

impl Capturer {
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        ring: Arc<FrameRing>,
        stats: Arc<CaptureStats>,
        period: Duration,
    ) -> Result<Self> {
        let keep_running = Arc::new(AtomicBool::new(true));
        let thread = thread::Builder::new()
            .name("capture".to_owned())
            .spawn({
                let keep_running = keep_running.clone();
                move || {
                    info!("Capture thread started, period {period:?}");
                    while keep_running.load(Ordering::Acquire) {
                        let start = Instant::now();
                        let publish = ring.publish_next(&keep_running, &stats, |frame| {
                            source.capture(frame)
                        });
                        if publish == Publish::Stopped {
                            break;
                        }

                        // Sleep for the rest of the period.
                        let elapsed = start.elapsed();
                        stats
                            .last_capture_us
                            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
                        if let Some(rest) = period.checked_sub(elapsed) {
                            thread::sleep(rest);
                        }
                    }
                    info!("Capture thread stopped");
                }
            })
            .context("Spawning capture thread")?;
        Ok(Self {
            thread: Some(thread),
            keep_running,
        })
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(false, |thread| !thread.is_finished())
    }

    /// Asks the thread to stop and waits at most `timeout` for it. Calling
    /// this on an already stopped capturer is a no-op.
    pub fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.keep_running.store(false, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let start = Instant::now();
        while !thread.is_finished() {
            if start.elapsed() > timeout {
                self.thread = Some(thread);
                bail!("Capture thread did not stop within {timeout:?}");
            }
            thread::sleep(STALL_POLL_INTERVAL);
        }
        thread
            .join()
            .map_err(|_| anyhow!("Capture thread panicked"))
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        self.keep_running.store(false, Ordering::Release);
    }
}

//
// Rig
//

/// One ring and capture thread per source camera.
pub struct CaptureRig {
    rings: Vec<Arc<FrameRing>>,
    capturers: Vec<Capturer>,
    stats: Vec<Arc<CaptureStats>>,
}

impl CaptureRig {
    pub fn start(sources: Vec<Box<dyn FrameSource>>, sensor: &SensorConfig) -> Result<Self> {
        ensure!(!sources.is_empty(), "Capture rig needs at least one source");
        let period = Duration::from_secs_f32(sensor.target_fps.recip());

        let mut rig = Self {
            rings: Vec::with_capacity(sources.len()),
            capturers: Vec::with_capacity(sources.len()),
            stats: Vec::with_capacity(sources.len()),
        };
        for source in sources {
            let (width, height) = source.size();
            let ring = Arc::new(FrameRing::new(
                sensor.buffer_count,
                width,
                height,
                sensor.min_depth,
                sensor.max_depth,
            )?);
            let stats = Arc::new(CaptureStats::default());
            let capturer = Capturer::spawn(source, ring.clone(), stats.clone(), period)?;
            rig.rings.push(ring);
            rig.capturers.push(capturer);
            rig.stats.push(stats);
        }
        info!(
            "Capture rig started with {} sources, {} buffers each",
            rig.rings.len(),
            sensor.buffer_count
        );
        Ok(rig)
    }

    pub fn acquire_all(&self) -> Result<Vec<FrameGuard<'_>>> {
        self.rings.iter().map(|ring| ring.acquire()).collect()
    }

    pub fn set_depth_range(&self, min_depth: u16, max_depth: u16) -> Result<()> {
        for ring in &self.rings {
            ring.set_depth_range(min_depth, max_depth)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &[Arc<CaptureStats>] {
        &self.stats
    }

    /// Blocks until at least one frame from every source is published.
    pub fn wait_first_frames(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        while self
            .stats
            .iter()
            .any(|stats| stats.frames.load(Ordering::Relaxed) == 0)
        {
            ensure!(
                start.elapsed() < timeout,
                "No frames captured within {timeout:?}"
            );
            thread::sleep(STALL_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Stops every capture thread. Buffers are released only after all of
    /// them are observed stopped.
    pub fn stop(mut self, timeout: Duration) -> Result<()> {
        for capturer in &mut self.capturers {
            capturer.stop(timeout)?;
        }
        debug!("Capture rig stopped");
        Ok(())
    }
}

//
// Tests
//

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource {
        count: u16,
        fail_on: Option<u16>,
    }

    impl FrameSource for CountingSource {
        fn size(&self) -> (u32, u32) {
            (2, 2)
        }

        fn capture(&mut self, frame: &mut FrameBuffer) -> Result<()> {
            self.count += 1;
            if self.fail_on == Some(self.count) {
                bail!("Device went away");
            }
            frame.depth_plane_mut().fill(self.count);
            Ok(())
        }
    }

    fn ring(count: usize) -> FrameRing {
        FrameRing::new(count, 2, 2, 0, 1000).unwrap()
    }

    #[test]
    fn needs_two_buffers() {
        assert!(FrameRing::new(1, 2, 2, 0, 1000).is_err());
        assert!(FrameRing::new(2, 2, 2, 10, 10).is_err());
    }

    #[test]
    fn publish_rotates_current() {
        let ring = ring(3);
        let running = AtomicBool::new(true);
        let stats = CaptureStats::default();
        let mut source = CountingSource {
            count: 0,
            fail_on: None,
        };
        for expected in [1, 2, 0, 1] {
            let publish = ring.publish_next(&running, &stats, |frame| source.capture(frame));
            assert_eq!(publish, Publish::Published);
            assert_eq!(ring.current_index(), expected);
        }
        assert_eq!(ring.acquire().unwrap().depth_plane(), &[4, 4, 4, 4]);
        assert_eq!(stats.frames.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn failed_capture_keeps_previous_frame() {
        let ring = ring(2);
        let running = AtomicBool::new(true);
        let stats = CaptureStats::default();
        let mut source = CountingSource {
            count: 0,
            fail_on: Some(2),
        };
        ring.publish_next(&running, &stats, |frame| source.capture(frame));
        let publish = ring.publish_next(&running, &stats, |frame| source.capture(frame));
        assert_eq!(publish, Publish::Failed);
        assert_eq!(ring.current_index(), 1);
        assert_eq!(ring.acquire().unwrap().depth_plane(), &[1, 1, 1, 1]);
        assert_eq!(stats.failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn publish_stalls_on_locked_slot() {
        let ring = ring(2);
        let running = AtomicBool::new(true);
        let stats = CaptureStats::default();
        let write = |frame: &mut FrameBuffer| {
            frame.depth_plane_mut().fill(7);
            Ok(())
        };

        // Slot 0 is held by a consumer, slot 1 is free.
        let guard = ring.acquire().unwrap();
        assert_eq!(ring.publish_next(&running, &stats, write), Publish::Published);
        assert_eq!(ring.current_index(), 1);

        // The next slot is the held one: the producer must not touch it.
        running.store(false, Ordering::Release);
        assert_eq!(ring.publish_next(&running, &stats, write), Publish::Stopped);
        assert_eq!(ring.current_index(), 1);
        assert_eq!(stats.stalls.load(Ordering::Relaxed), 1);
        assert_eq!(guard.depth_plane(), &[0, 0, 0, 0]);
        drop(guard);

        running.store(true, Ordering::Release);
        assert_eq!(ring.publish_next(&running, &stats, write), Publish::Published);
        assert_eq!(ring.current_index(), 0);
    }

    #[test]
    fn stale_index_cannot_lock_slot_being_written() {
        let ring = ring(2);
        let running = AtomicBool::new(true);
        let stats = CaptureStats::default();
        let mut source = CountingSource {
            count: 0,
            fail_on: Some(3),
        };

        // A consumer reads current = 1, then the producer moves on to 0.
        ring.publish_next(&running, &stats, |frame| source.capture(frame));
        let stale = ring.current_index();
        assert_eq!(stale, 1);
        ring.publish_next(&running, &stats, |frame| source.capture(frame));
        assert_eq!(ring.current_index(), 0);

        // While slot 1 is being written, the stale index is rejected and the
        // current slot can still be locked.
        let publish = ring.publish_next(&running, &stats, |frame| {
            assert!(ring.try_lock(stale).is_none());
            assert!(!ring.slots[stale].locked.load(Ordering::SeqCst));
            let current = ring.try_lock(0).unwrap();
            current.locked.store(false, Ordering::SeqCst);
            source.capture(frame)
        });
        assert_eq!(publish, Publish::Failed);
        assert_eq!(ring.current_index(), 0);

        let frame = ring.acquire().unwrap();
        assert_eq!(frame.depth_plane(), &[2, 2, 2, 2]);
        assert!(ring.slots[0].locked.load(Ordering::SeqCst));
        drop(frame);
        assert!(!ring.slots[0].locked.load(Ordering::SeqCst));
    }

    #[test]
    fn new_frames_are_unfiltered() {
        let ring = ring(2);
        let running = AtomicBool::new(true);
        let stats = CaptureStats::default();
        ring.acquire().unwrap().filtered = true;
        ring.publish_next(&running, &stats, |_| Ok(()));
        ring.publish_next(&running, &stats, |_| Ok(()));
        assert_eq!(ring.current_index(), 0);
        assert!(!ring.acquire().unwrap().filtered);
    }

    #[test]
    fn depth_range_update() {
        let ring = ring(2);
        assert!(ring.set_depth_range(300, 200).is_err());
        ring.set_depth_range(200, 300).unwrap();
        assert_eq!(ring.acquire().unwrap().depth_range(), (200, 300));
    }

    #[test]
    fn capturer_publishes_and_stops() {
        let ring = Arc::new(ring(3));
        let stats = Arc::new(CaptureStats::default());
        let source = Box::new(CountingSource {
            count: 0,
            fail_on: None,
        });
        let mut capturer =
            Capturer::spawn(source, ring.clone(), stats.clone(), Duration::from_millis(1))
                .unwrap();
        let start = Instant::now();
        while stats.frames.load(Ordering::Relaxed) < 3 {
            assert!(start.elapsed() < Duration::from_secs(5));
            thread::sleep(Duration::from_millis(1));
        }
        capturer.stop(Duration::from_secs(5)).unwrap();
        assert!(!capturer.is_running());
        capturer.stop(Duration::from_secs(5)).unwrap();

        let frames = stats.frames.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(stats.frames.load(Ordering::Relaxed), frames);
    }
}
