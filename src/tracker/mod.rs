//! Greedy IoU multi-object tracker, one instance per stream.
//!
//! Matching is deliberately greedy: each existing track, in creation order,
//! takes its best remaining detection. Frame-to-frame motion at the target
//! rates is small compared to box size, so a global assignment buys little.

use crate::inference::{iou, Detection};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

#[cfg(test)]
mod tests;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
pub const DEFAULT_MAX_AGE: u32 = 30;

/// A tracked object as published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: u64,
    /// Identity assigned once when `track_id` is first seen, never reused
    pub stable_uid: u64,
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Consecutive updates without a matching detection
    pub missed_count: u32,
}

impl Track {
    pub fn corners(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    fn absorb(&mut self, detection: &Detection) {
        self.class_id = detection.class_id;
        self.confidence = detection.confidence;
        self.x1 = detection.x1;
        self.y1 = detection.y1;
        self.x2 = detection.x2;
        self.y2 = detection.y2;
        self.missed_count = 0;
    }
}

#[derive(Debug)]
pub struct Tracker {
    iou_threshold: f32,
    max_age: u32,
    /// Live tracks in creation order
    tracks: Vec<Track>,
    next_track_id: u64,
    next_stable_uid: u64,
    stable_uids: HashMap<u64, u64>,
    updates: u64,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::with_params(DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_AGE)
    }
}

impl Tracker {
    pub fn with_params(iou_threshold: f32, max_age: u32) -> Self {
        Self {
            iou_threshold,
            max_age,
            tracks: Vec::new(),
            next_track_id: 1,
            next_stable_uid: 1,
            stable_uids: HashMap::new(),
            updates: 0,
        }
    }

    /// Number of update cycles processed so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Current live tracks, in creation order
    pub fn live(&self) -> &[Track] {
        &self.tracks
    }

    /// Advance one cycle with this frame's detections and return the live set.
    ///
    /// An empty `detections` slice ages every track. The frame is accepted so
    /// appearance-based matching can slot in; IoU matching does not read it.
    pub fn update(&mut self, detections: &[Detection], _frame: &RgbImage) -> Vec<Track> {
        self.updates += 1;

        for track in &mut self.tracks {
            track.missed_count += 1;
        }

        let mut unmatched: Vec<Option<&Detection>> = detections.iter().map(Some).collect();
        for track in &mut self.tracks {
            let best = unmatched
                .iter()
                .enumerate()
                .filter_map(|(i, d)| d.map(|d| (i, iou(track.corners(), d.corners()))))
                .fold(None, |best: Option<(usize, f32)>, (i, score)| match best {
                    Some((_, top)) if top >= score => best,
                    _ => Some((i, score)),
                });

            if let Some((index, score)) = best {
                if score >= self.iou_threshold {
                    if let Some(detection) = unmatched[index].take() {
                        track.absorb(detection);
                    }
                }
            }
        }

        for detection in unmatched.into_iter().flatten() {
            let track_id = self.next_track_id;
            self.next_track_id += 1;
            trace!("New track {} (class {})", track_id, detection.class_id);
            self.tracks.push(Track {
                track_id,
                stable_uid: 0,
                class_id: detection.class_id,
                confidence: detection.confidence,
                x1: detection.x1,
                y1: detection.y1,
                x2: detection.x2,
                y2: detection.y2,
                missed_count: 0,
            });
        }

        let max_age = self.max_age;
        let stable_uids = &mut self.stable_uids;
        self.tracks.retain(|track| {
            let alive = track.missed_count <= max_age;
            if !alive {
                debug!(
                    "Dropping track {} after {} missed updates",
                    track.track_id, track.missed_count
                );
                stable_uids.remove(&track.track_id);
            }
            alive
        });

        let next_uid = &mut self.next_stable_uid;
        for track in &mut self.tracks {
            track.stable_uid = *stable_uids.entry(track.track_id).or_insert_with(|| {
                let uid = *next_uid;
                *next_uid += 1;
                uid
            });
        }

        self.tracks.clone()
    }
}
