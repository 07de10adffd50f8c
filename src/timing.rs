use super::*;

const WINDOW: usize = 8;
const REFRESH_INTERVAL: f32 = 1.0;

/// Frame rate averaged over the last few frames. The reported value only
/// changes about once per second so log lines stay readable.
pub struct Timing {
    recent: VecDeque<f32>,
    since_refresh: f32,
    reported_delta: f32,
}

impl Timing {
    pub fn new() -> Self {
        Self {
            recent: VecDeque::with_capacity(WINDOW + 1),
            since_refresh: 0.0,
            reported_delta: 0.0,
        }
    }

    /// Records one frame. Returns `true` when the reported values changed.
    pub fn push(&mut self, delta_time: f32) -> bool {
        if self.recent.len() == WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(delta_time);

        self.since_refresh += delta_time;
        if self.since_refresh <= REFRESH_INTERVAL {
            return false;
        }
        self.since_refresh = 0.0;
        self.reported_delta = self.recent.iter().sum::<f32>() / self.recent.len() as f32;
        true
    }

    pub fn display_text(&self) -> String {
        format!(
            "{:.1} fps ({:.2} ms)",
            self.reported_delta.recip(),
            1e3 * self.reported_delta
        )
    }
}

//
// Tests
//
