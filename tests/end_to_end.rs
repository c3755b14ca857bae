use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use locomotion_dataset::core::loaders::{load_clip, read_metadata, read_payload};
use locomotion_dataset::core::writers::write_clip;
use locomotion_dataset::synthetic::{walking_clip, walking_clip_document};
use locomotion_dataset::{FeaturePipeline, PipelineConfig, Preset, RunOutcome};
use tempfile::tempdir;

const JOINTS: usize = 6;

fn pipeline(dir: &Path, parallel: bool) -> FeaturePipeline {
    let mut config = PipelineConfig::preset(Preset::Locomotion);
    config.export.directory = dir.to_path_buf();
    config.export.overwrite = true;
    config.processing.parallel = parallel;
    FeaturePipeline::new(config).unwrap()
}

#[test]
fn straight_walk_exports_expected_dataset() {
    let dir = tempdir().unwrap();
    let bundle = walking_clip(200, 1.0, 0.0).unwrap();

    let summary = match pipeline(dir.path(), true).run(&bundle).unwrap() {
        RunOutcome::Complete(summary) => summary,
        RunOutcome::NotReady => panic!("walking clip should be ready"),
    };
    assert_eq!(summary.rows_written, 81);
    assert_eq!(summary.input_width, 91 + 12 * JOINTS);
    assert_eq!(summary.output_width, 3 + 42 + 12 * JOINTS);

    let metadata = read_metadata(&dir.path().join("metadata.txt")).unwrap();
    assert_eq!(metadata.input_width, 163);
    assert_eq!(metadata.output_width, 117);

    let inputs = read_payload(&dir.path().join("data_X.bin"), 163).unwrap();
    let outputs = read_payload(&dir.path().join("data_Y.bin"), 117).unwrap();
    assert_eq!(inputs.len(), 81);
    assert_eq!(outputs.len(), 81);

    for row in &outputs {
        assert!(row.iter().all(|v| v.is_finite()));
        // No turning on a straight line.
        assert_relative_eq!(row[2], 0.0, epsilon = 1e-4);
        // Every future trajectory sample moves at 1 m/s.
        for sample in 0..6 {
            assert_relative_eq!(row[3 + sample * 7 + 6], 1.0, epsilon = 1e-3);
        }
    }
    for (i, row) in inputs.iter().enumerate() {
        let reference = 60 + i as i64;
        for sample in 0..13 {
            // The clip starts at rest on frame 0.
            if reference + (sample as i64 - 6) * 10 <= 0 {
                continue;
            }
            assert_relative_eq!(row[sample * 7 + 6], 1.0, epsilon = 1e-3);
        }
    }

    let sequences = fs::read_to_string(dir.path().join("sequences_locomotion.txt")).unwrap();
    let lines: Vec<&str> = sequences.lines().collect();
    assert_eq!(lines.len(), 81);
    assert_eq!(lines[0], "0 60 Standard synthetic_walk synthetic");
    assert_eq!(lines[80], "0 140 Standard synthetic_walk synthetic");
}

#[test]
fn parallel_and_sequential_runs_are_identical() {
    let parallel_dir = tempdir().unwrap();
    let sequential_dir = tempdir().unwrap();
    let bundle = walking_clip(240, 1.3, 0.7).unwrap();

    pipeline(parallel_dir.path(), true).run(&bundle).unwrap();
    pipeline(sequential_dir.path(), false).run(&bundle).unwrap();

    for file in ["metadata.txt", "sequences_locomotion.txt", "data_X.bin", "data_Y.bin"] {
        let a = fs::read(parallel_dir.path().join(file)).unwrap();
        let b = fs::read(sequential_dir.path().join(file)).unwrap();
        assert_eq!(a, b, "{file} differs");
    }
}

#[test]
fn exported_clip_round_trips_through_loader() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig::default();
    let clip_path = dir.path().join("walk.yaml");
    write_clip(&clip_path, &walking_clip_document(180, 1.0, 0.0, &config.sequence)).unwrap();

    let bundle = load_clip(&clip_path, &config).unwrap();
    let out = dir.path().join("dataset");
    let table = pipeline(&out, true).extract(&bundle).unwrap().unwrap();
    assert_eq!(table.len(), 61);
}

#[test]
fn appending_second_clip_grows_dataset() {
    let dir = tempdir().unwrap();
    let mut pipeline = pipeline(dir.path(), true);

    pipeline.run(&walking_clip(200, 1.0, 0.0).unwrap()).unwrap();
    pipeline.config_mut().export.overwrite = false;
    let outcome = pipeline.run(&walking_clip(150, 0.5, 1.0).unwrap()).unwrap();

    match outcome {
        RunOutcome::Complete(summary) => {
            assert!(summary.appended);
            assert_eq!(summary.rows_written, 31);
            assert_eq!(summary.total_rows, 112);
        }
        RunOutcome::NotReady => panic!("clip should be ready"),
    }
    let inputs = read_payload(&dir.path().join("data_X.bin"), 163).unwrap();
    assert_eq!(inputs.len(), 112);
}
