use super::*;

fn frame() -> RgbImage {
    RgbImage::new(640, 480)
}

fn detection(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
    Detection {
        class_id: 0,
        confidence: 0.9,
        x1,
        y1,
        x2,
        y2,
    }
}

#[test]
fn test_new_detections_spawn_tracks() {
    let mut tracker = Tracker::default();
    let tracks = tracker.update(
        &[
            detection(10.0, 10.0, 50.0, 50.0),
            detection(200.0, 200.0, 260.0, 280.0),
        ],
        &frame(),
    );

    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].track_id, 1);
    assert_eq!(tracks[1].track_id, 2);
    assert!(tracks.iter().all(|t| t.missed_count == 0));
    assert_ne!(tracks[0].stable_uid, tracks[1].stable_uid);
    assert_eq!(tracker.updates(), 1);
}

#[test]
fn test_track_dropped_after_max_age_misses() {
    let max_age = 5;
    let mut tracker = Tracker::with_params(0.3, max_age);
    tracker.update(&[detection(10.0, 10.0, 50.0, 50.0)], &frame());

    for cycle in 1..=max_age {
        let tracks = tracker.update(&[], &frame());
        assert_eq!(tracks.len(), 1, "dropped early at empty cycle {}", cycle);
        assert_eq!(tracks[0].missed_count, cycle);
    }

    assert!(tracker.update(&[], &frame()).is_empty());
    assert!(tracker.live().is_empty());
}

#[test]
fn test_default_max_age() {
    let mut tracker = Tracker::default();
    tracker.update(&[detection(0.0, 0.0, 20.0, 20.0)], &frame());

    for _ in 0..DEFAULT_MAX_AGE {
        tracker.update(&[], &frame());
    }
    assert_eq!(tracker.live().len(), 1);

    tracker.update(&[], &frame());
    assert!(tracker.live().is_empty());
    assert_eq!(tracker.updates(), u64::from(DEFAULT_MAX_AGE) + 2);
}

#[test]
fn test_match_resets_missed_count() {
    let mut tracker = Tracker::with_params(0.3, 3);
    tracker.update(&[detection(10.0, 10.0, 50.0, 50.0)], &frame());
    tracker.update(&[], &frame());
    tracker.update(&[], &frame());

    let tracks = tracker.update(&[detection(12.0, 11.0, 52.0, 51.0)], &frame());
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].track_id, 1);
    assert_eq!(tracks[0].missed_count, 0);
    assert_eq!(tracks[0].x1, 12.0);
}

#[test]
fn test_stable_uid_persists_while_matched() {
    let mut tracker = Tracker::default();
    let first = tracker.update(&[detection(100.0, 100.0, 200.0, 200.0)], &frame());
    let uid = first[0].stable_uid;

    for step in 1..20 {
        let offset = step as f32 * 2.0;
        let tracks = tracker.update(
            &[detection(100.0 + offset, 100.0, 200.0 + offset, 200.0)],
            &frame(),
        );
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 1);
        assert_eq!(tracks[0].stable_uid, uid);
    }
}

#[test]
fn test_new_track_gets_unused_stable_uid() {
    let mut tracker = Tracker::with_params(0.3, 0);
    let mut seen = std::collections::HashSet::new();

    // max_age 0: every detection that fails to match starts a fresh track
    for step in 0..10 {
        let x = step as f32 * 100.0 % 600.0;
        let tracks = tracker.update(&[detection(x, 0.0, x + 10.0, 10.0)], &frame());
        for track in tracks.iter().filter(|t| t.missed_count == 0) {
            if track.track_id as usize == step + 1 {
                assert!(seen.insert(track.stable_uid), "uid {} reused", track.stable_uid);
            }
        }
    }
    assert_eq!(seen.len(), 10);
}

#[test]
fn test_low_overlap_starts_new_track() {
    let mut tracker = Tracker::default();
    tracker.update(&[detection(0.0, 0.0, 100.0, 100.0)], &frame());

    // IoU of 0.25 is under the 0.3 threshold
    let tracks = tracker.update(&[detection(60.0, 0.0, 160.0, 100.0)], &frame());
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].missed_count, 1);
    assert_eq!(tracks[1].track_id, 2);
}

#[test]
fn test_greedy_matching_in_creation_order() {
    let mut tracker = Tracker::default();
    tracker.update(
        &[
            detection(0.0, 0.0, 100.0, 100.0),
            detection(40.0, 0.0, 140.0, 100.0),
        ],
        &frame(),
    );

    // Both tracks overlap this detection; the older track claims it first
    let tracks = tracker.update(&[detection(30.0, 0.0, 130.0, 100.0)], &frame());

    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].track_id, 1);
    assert_eq!(tracks[0].missed_count, 0);
    assert_eq!(tracks[0].x1, 30.0);
    assert_eq!(tracks[1].track_id, 2);
    assert_eq!(tracks[1].missed_count, 1);
}

#[test]
fn test_detection_matches_at_most_one_track() {
    let mut tracker = Tracker::default();
    tracker.update(
        &[
            detection(0.0, 0.0, 100.0, 100.0),
            detection(300.0, 300.0, 400.0, 400.0),
        ],
        &frame(),
    );

    let tracks = tracker.update(
        &[
            detection(305.0, 305.0, 405.0, 405.0),
            detection(5.0, 5.0, 105.0, 105.0),
        ],
        &frame(),
    );

    assert_eq!(tracks.len(), 2);
    assert!(tracks.iter().all(|t| t.missed_count == 0));
    assert_eq!(tracks[0].x1, 5.0);
    assert_eq!(tracks[1].x1, 305.0);
}

#[test]
fn test_stable_uid_entry_removed_on_drop() {
    let mut tracker = Tracker::with_params(0.3, 1);
    tracker.update(&[detection(0.0, 0.0, 10.0, 10.0)], &frame());
    tracker.update(&[], &frame());
    tracker.update(&[], &frame());

    assert!(tracker.live().is_empty());
    assert!(tracker.stable_uids.is_empty());

    let tracks = tracker.update(&[detection(0.0, 0.0, 10.0, 10.0)], &frame());
    assert_eq!(tracks[0].track_id, 2);
    assert_eq!(tracks[0].stable_uid, 2);
}

#[test]
fn test_track_serializes_for_bus() {
    let mut tracker = Tracker::default();
    let tracks = tracker.update(&[detection(1.0, 2.0, 3.0, 4.0)], &frame());

    let json = serde_json::to_value(&tracks[0]).unwrap();
    assert_eq!(json["track_id"], 1);
    assert_eq!(json["stable_uid"], 1);
    assert_eq!(json["missed_count"], 0);

    let back: Track = serde_json::from_value(json).unwrap();
    assert_eq!(back, tracks[0]);
}
