//! sc-pose: Per-block source pose interpolation
//!
//! Turns keyframed direction trajectories into per-block positions in the
//! panner's coordinate space:
//! - SLERP between the enclosing keyframes (hold at the boundaries)
//! - Degenerate-direction recovery with per-source telemetry
//! - Elevation sanitization against the layout's elevation range
//! - The pre-compensating axis swap the DBAP panner expects

mod engine;
mod slerp;

pub use engine::{ElevationMode, Pose, PoseEngine, PoseStats};
pub use slerp::slerp;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sc_core::Vec3;
    use sc_scene::{Keyframe, Scene, SceneSource, Speaker, SpeakerLayout};

    fn layout_2d() -> SpeakerLayout {
        SpeakerLayout::from_parts(
            vec![
                speaker(-0.5236, 0.0, 2.0, 0),
                speaker(0.5236, 0.0, 2.0, 1),
            ],
            vec![],
        )
        .unwrap()
    }

    fn layout_3d() -> SpeakerLayout {
        SpeakerLayout::from_parts(
            vec![
                speaker(-0.5236, 0.0, 2.0, 0),
                speaker(0.5236, 0.0, 2.0, 1),
                speaker(0.0, 0.5, 2.0, 2),
            ],
            vec![],
        )
        .unwrap()
    }

    fn speaker(azimuth: f32, elevation: f32, radius: f32, device_channel: usize) -> Speaker {
        Speaker {
            azimuth,
            elevation,
            radius,
            device_channel,
        }
    }

    fn scene_with(sources: Vec<SceneSource>) -> Scene {
        Scene {
            sample_rate: 48000,
            sources,
        }
    }

    fn object(key: &str, keyframes: Vec<Keyframe>) -> SceneSource {
        SceneSource {
            key: key.into(),
            is_lfe: false,
            keyframes,
        }
    }

    fn keyframe(time: f64, x: f32, y: f32, z: f32) -> Keyframe {
        Keyframe {
            time,
            direction: Vec3::new(x, y, z),
        }
    }

    #[test]
    fn lfe_sources_are_marked_with_zero_position() {
        let scene = scene_with(vec![SceneSource {
            key: "LFE".into(),
            is_lfe: true,
            keyframes: vec![],
        }]);
        let mut engine = PoseEngine::new(&scene, &layout_2d());
        engine.compute_positions(0.0, ElevationMode::default());

        let pose = engine.poses()[0];
        assert!(pose.is_lfe);
        assert!(pose.is_valid);
        assert_eq!(pose.position, Vec3::ZERO);
    }

    #[test]
    fn static_source_position_is_front_at_radius() {
        let scene = scene_with(vec![object("a", vec![keyframe(0.0, 0.0, 1.0, 0.0)])]);
        let mut engine = PoseEngine::new(&scene, &layout_2d());
        engine.compute_positions(3.0, ElevationMode::default());

        // Front (0,1,0) in layout space becomes (0,0,-r) in panner space
        let pose = engine.poses()[0];
        assert_abs_diff_eq!(pose.position.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(pose.position.y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(pose.position.z, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn moving_source_holds_at_boundaries_and_interpolates_between() {
        let scene = scene_with(vec![object(
            "a",
            vec![keyframe(1.0, 0.0, 1.0, 0.0), keyframe(2.0, 1.0, 0.0, 0.0)],
        )]);
        let mut engine = PoseEngine::new(&scene, &layout_2d());

        // Before the first keyframe: hold front
        engine.compute_positions(0.0, ElevationMode::default());
        assert_abs_diff_eq!(engine.poses()[0].position.z, -2.0, epsilon = 1e-5);

        // Midway: 45° toward the right
        engine.compute_positions(1.5, ElevationMode::default());
        let mid = engine.poses()[0].position;
        assert_abs_diff_eq!(mid.magnitude(), 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(mid.x, -mid.z, epsilon = 1e-4);

        // After the last keyframe: hold right; (1,0,0) -> (r,0,0)
        engine.compute_positions(5.0, ElevationMode::default());
        let end = engine.poses()[0].position;
        assert_abs_diff_eq!(end.x, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(end.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn flat_layout_flattens_elevation() {
        // Source well above the horizon on a 2D layout
        let scene = scene_with(vec![object("a", vec![keyframe(0.0, 0.0, 0.5, 0.8)])]);
        let mut engine = PoseEngine::new(&scene, &layout_2d());
        engine.compute_positions(0.0, ElevationMode::RescaleFullSphere);

        // Panner-space y carries layout-space z
        let pose = engine.poses()[0];
        assert_abs_diff_eq!(pose.position.y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(pose.position.magnitude(), 2.0, epsilon = 1e-4);
    }

    #[test]
    fn elevation_modes_map_the_top_of_the_sphere_differently() {
        // Straight up; 3D layout spans elevations [0, 0.5]
        let scene = scene_with(vec![object("a", vec![keyframe(0.0, 0.0, 1e-3, 1.0)])]);
        let layout = layout_3d();

        for (mode, expected_el) in [
            (ElevationMode::RescaleAtmosUp, 0.5f32),
            (ElevationMode::Clamp, 0.5f32),
            (ElevationMode::RescaleFullSphere, 0.5f32),
        ] {
            let mut engine = PoseEngine::new(&scene, &layout);
            engine.compute_positions(0.0, mode);
            // Panner-space y = layout-space z = sin(el')·r
            let y = engine.poses()[0].position.y;
            assert_abs_diff_eq!(y, expected_el.sin() * 2.0, epsilon = 1e-3);
        }

        // The horizon separates the modes: AtmosUp pins it to el_min,
        // FullSphere puts it mid-range.
        let scene = scene_with(vec![object("a", vec![keyframe(0.0, 0.0, 1.0, 0.0)])]);
        let mut engine = PoseEngine::new(&scene, &layout);
        engine.compute_positions(0.0, ElevationMode::RescaleAtmosUp);
        assert_abs_diff_eq!(engine.poses()[0].position.y, 0.0, epsilon = 1e-4);

        let mut engine = PoseEngine::new(&scene, &layout);
        engine.compute_positions(0.0, ElevationMode::RescaleFullSphere);
        let expected = (0.25f32).sin() * 2.0;
        assert_abs_diff_eq!(engine.poses()[0].position.y, expected, epsilon = 1e-3);
    }

    #[test]
    fn degenerate_keyframes_fall_back_and_count() {
        let scene = scene_with(vec![object(
            "bad",
            vec![
                keyframe(0.0, f32::NAN, 0.0, 0.0),
                keyframe(1.0, f32::NAN, 0.0, 0.0),
            ],
        )]);
        let mut engine = PoseEngine::new(&scene, &layout_2d());
        let stats = engine.stats();

        engine.compute_positions(0.5, ElevationMode::default());
        engine.compute_positions(0.6, ElevationMode::default());

        assert!(stats.fallback_count(0) >= 2);
        assert!(stats.is_flagged(0));
        // Recovered to front, never NaN
        let pose = engine.poses()[0];
        assert!(pose.position.is_finite());
        assert_abs_diff_eq!(pose.position.z, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn fallback_prefers_last_good_direction() {
        // First block sees a good segment, later blocks a broken one
        let scene = scene_with(vec![object(
            "half",
            vec![
                keyframe(0.0, 1.0, 0.0, 0.0),
                keyframe(1.0, 1.0, 0.0, 0.0),
                keyframe(2.0, f32::NAN, 0.0, 0.0),
            ],
        )]);
        let mut engine = PoseEngine::new(&scene, &layout_2d());
        let stats = engine.stats();

        engine.compute_positions(0.5, ElevationMode::default());
        assert_eq!(stats.fallback_count(0), 0);
        let good = engine.poses()[0].position;

        engine.compute_positions(1.9, ElevationMode::default());
        assert!(stats.fallback_count(0) > 0);
        let held = engine.poses()[0].position;
        assert_abs_diff_eq!(held.x, good.x, epsilon = 1e-5);
        assert_abs_diff_eq!(held.z, good.z, epsilon = 1e-5);
    }

    #[test]
    fn mode_indices_round_trip() {
        assert_eq!(ElevationMode::from_index(0), ElevationMode::RescaleAtmosUp);
        assert_eq!(ElevationMode::from_index(1), ElevationMode::Clamp);
        assert_eq!(ElevationMode::from_index(2), ElevationMode::RescaleFullSphere);
        // Out of range decays to the default
        assert_eq!(ElevationMode::from_index(9), ElevationMode::RescaleAtmosUp);
        for mode in [
            ElevationMode::RescaleAtmosUp,
            ElevationMode::Clamp,
            ElevationMode::RescaleFullSphere,
        ] {
            assert_eq!(ElevationMode::from_index(mode.index()), mode);
        }
    }
}
