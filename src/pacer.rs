/*
 *  pacer.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Rate limiter for side outputs that must not run every frame
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */
use std::time::{Duration, Instant};

pub struct Pacer {
    next_deadline: Instant,
    interval: Duration,
}

// scrolling presents at up to 1/scrolldelay fps, snapshots want a couple per second
impl Pacer {
    pub fn new(target_fps: u32) -> Self {
        Self { next_deadline: Instant::now(), interval: Self::interval_for(target_fps) }
    }

    #[inline]
    fn interval_for(fps: u32) -> Duration {
        Duration::from_micros(1_000_000u64 / fps.max(1) as u64)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True at most once per interval; firing schedules the next deadline
    #[inline]
    pub fn should_fire(&mut self) -> bool {
        self.should_fire_at(Instant::now())
    }

    pub(crate) fn should_fire_at(&mut self, now: Instant) -> bool {
        if now >= self.next_deadline {
            self.next_deadline = now + self.interval;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_interval() {
        let mut pacer = Pacer::new(2);
        assert_eq!(pacer.interval(), Duration::from_millis(500));

        let t0 = Instant::now() + Duration::from_millis(1);
        assert!(pacer.should_fire_at(t0));
        assert!(!pacer.should_fire_at(t0 + Duration::from_millis(100)));
        assert!(!pacer.should_fire_at(t0 + Duration::from_millis(499)));
        assert!(pacer.should_fire_at(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        assert_eq!(Pacer::new(0).interval(), Duration::from_secs(1));
    }
}
