// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Timeline Buffer

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::TimelinePoint;

pub const DEFAULT_TIMELINE_CAPACITY: usize = 600;

/// Fixed-capacity ring of timeline points. The oldest point is dropped once
/// the buffer is full.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimelineBuffer {
    points: VecDeque<TimelinePoint>,
    capacity: usize,
}

impl Default for TimelineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMELINE_CAPACITY)
    }
}

impl TimelineBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, point: TimelinePoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// The `n` most recent points, oldest first. Fewer if fewer are held.
    pub fn last(&self, n: usize) -> Vec<TimelinePoint> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).cloned().collect()
    }

    pub fn all(&self) -> Vec<TimelinePoint> {
        self.points.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest_current_volume(&self) -> Option<u32> {
        self.points.back().map(|p| p.current_volume)
    }

    pub fn latest_predicted_volume(&self) -> Option<u32> {
        self.points.back().and_then(|p| p.predicted_volume)
    }

    pub fn congestion_detected(&self) -> bool {
        self.points.back().is_some_and(|p| p.congestion_detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn point(volume: u32) -> TimelinePoint {
        TimelinePoint {
            timestamp: FixedOffset::east_opt(7 * 3600)
                .unwrap()
                .with_ymd_and_hms(2026, 3, 2, 7, 0, 0)
                .unwrap(),
            current_volume: volume,
            predicted_volume: Some(volume + 1),
            congestion_threshold: 100.0,
            congestion_detected: volume >= 100,
        }
    }

    #[test]
    fn drops_oldest_when_full() {
        let mut buf = TimelineBuffer::new(3);
        for v in 0..5 {
            buf.append(point(v));
        }
        assert_eq!(buf.len(), 3);
        let volumes: Vec<u32> = buf.all().iter().map(|p| p.current_volume).collect();
        assert_eq!(volumes, vec![2, 3, 4]);
    }

    #[test]
    fn last_returns_oldest_first() {
        let mut buf = TimelineBuffer::default();
        for v in 0..10 {
            buf.append(point(v));
        }
        let volumes: Vec<u32> = buf.last(3).iter().map(|p| p.current_volume).collect();
        assert_eq!(volumes, vec![7, 8, 9]);
        assert_eq!(buf.last(50).len(), 10);
        assert!(buf.last(0).is_empty());
    }

    #[test]
    fn latest_accessors() {
        let mut buf = TimelineBuffer::new(10);
        assert_eq!(buf.latest_current_volume(), None);
        assert!(!buf.congestion_detected());
        buf.append(point(120));
        assert_eq!(buf.latest_current_volume(), Some(120));
        assert_eq!(buf.latest_predicted_volume(), Some(121));
        assert!(buf.congestion_detected());
    }
}
