//! End-to-end correction through the public API.

use std::path::Path;

use mic_core::{CorrectionMode, Field, ImageStack, StackData, StackShape};
use mic_io::tiff::{read_stack, write_field, write_stack};
use mic_io::{DEFAULT_EXTENSIONS, FieldFormat, ModelRepository, discover_stacks};
use mic_ops::{FailurePolicy, OpsError, PipelineConfig, ScratchPolicy, StackPipeline, correct_dataset};
use tempfile::TempDir;

fn put_channel(root: &Path, objective: &str, wl: u32, v: f64, z: f64, h: usize, w: usize) {
    let dir = root.join(objective).join(wl.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    write_field(dir.join("v.tif"), &Field::filled(h, w, v)).unwrap();
    write_field(dir.join("z.tif"), &Field::filled(h, w, z)).unwrap();
}

fn rgb_stack(d: usize, h: usize, w: usize) -> ImageStack {
    let shape = StackShape::zyxc(d, h, w, 3);
    let data: Vec<u16> = (0..shape.len()).map(|i| (i * 2654435761usize % 65536) as u16).collect();
    ImageStack::new(shape, data).unwrap()
}

fn u16_samples(stack: &ImageStack) -> &[u16] {
    match stack.data() {
        StackData::U16(v) => v,
        other => panic!("expected u16 samples, got {:?}", other.sample_type()),
    }
}

#[test]
fn direct_mode_halves_every_sample() {
    let tmp = TempDir::new().unwrap();
    let models = tmp.path().join("models");
    let raw = tmp.path().join("raw");
    let dest = tmp.path().join("corrected");
    std::fs::create_dir_all(&raw).unwrap();

    for wl in [618, 482, 405] {
        put_channel(&models, "obj", wl, 2.0, 0.0, 64, 64);
    }
    let input = rgb_stack(5, 64, 64);
    write_stack(raw.join("acq.tif"), &input).unwrap();

    let repo = ModelRepository::new(&models, FieldFormat::Tiff);
    let stacks = discover_stacks(&raw, DEFAULT_EXTENSIONS).unwrap();
    let config = PipelineConfig {
        mode: CorrectionMode::Direct,
        workers: 3,
        ..Default::default()
    };
    let report = correct_dataset(&repo, "obj", &[Some(618), Some(482), Some(405)], &stacks, &dest, &config).unwrap();
    assert!(report.is_success());

    let output = read_stack(dest.join("acq.tif")).unwrap();
    assert_eq!(output.shape(), input.shape());
    for (o, i) in u16_samples(&output).iter().zip(u16_samples(&input)) {
        assert_eq!(*o, *i / 2);
    }
}

#[test]
fn missing_channels_pass_through() {
    let tmp = TempDir::new().unwrap();
    let models = tmp.path().join("models");
    put_channel(&models, "obj", 618, 4.0, 100.0, 16, 16);

    let repo = ModelRepository::new(&models, FieldFormat::Tiff);
    // 482 has no files, the third channel is skipped outright
    let model = repo.load("obj", &[Some(618), Some(482), None]).unwrap();

    let raw = tmp.path().join("s.tif");
    let input = rgb_stack(2, 16, 16);
    write_stack(&raw, &input).unwrap();

    let config = PipelineConfig {
        mode: CorrectionMode::ZeroPreserved,
        ..Default::default()
    };
    let mut pipeline = StackPipeline::new(model, tmp.path().join("out"), &config);
    let out = pipeline.correct_stack(&raw).unwrap();
    let output = read_stack(out).unwrap();

    let (src, dst) = (u16_samples(&input), u16_samples(&output));
    for (px_in, px_out) in src.chunks_exact(3).zip(dst.chunks_exact(3)) {
        // uniform fields: z̄ + v̄ (I − z) / v == I
        assert_eq!(px_out[0], px_in[0]);
        assert_eq!(px_out[1], px_in[1]);
        assert_eq!(px_out[2], px_in[2]);
    }
}

#[test]
fn model_resampled_once_per_shape() {
    let tmp = TempDir::new().unwrap();
    let models = tmp.path().join("models");
    put_channel(&models, "obj", 618, 2.0, 0.0, 8, 8);
    let repo = ModelRepository::new(&models, FieldFormat::Tiff);
    let model = repo.load("obj", &[Some(618)]).unwrap();

    let raw = tmp.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    for (name, (h, w)) in [("a.tif", (32, 32)), ("b.tif", (32, 32)), ("c.tif", (16, 24))] {
        let shape = StackShape::zyx(2, h, w);
        let stack = ImageStack::new(shape, vec![400u16; shape.len()]).unwrap();
        write_stack(raw.join(name), &stack).unwrap();
    }
    let stacks = discover_stacks(&raw, DEFAULT_EXTENSIONS).unwrap();

    let config = PipelineConfig {
        mode: CorrectionMode::Direct,
        ..Default::default()
    };
    let mut pipeline = StackPipeline::new(model, tmp.path().join("out"), &config);
    let report = pipeline.run(&stacks);
    assert!(report.is_success());
    assert_eq!(pipeline.resizer().resample_count(), 2);

    for out in &report.corrected {
        let stack = read_stack(out).unwrap();
        assert!(u16_samples(&stack).iter().all(|&v| v == 200));
    }
}

#[test]
fn failing_stack_does_not_stop_batch() {
    let tmp = TempDir::new().unwrap();
    let models = tmp.path().join("models");
    put_channel(&models, "obj", 618, 1.0, 0.0, 8, 8);
    let repo = ModelRepository::new(&models, FieldFormat::Tiff);

    let raw = tmp.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(raw.join("a_broken.tif"), b"not a tiff").unwrap();
    let shape = StackShape::zyx(1, 8, 8);
    write_stack(raw.join("b_ok.tif"), &ImageStack::new(shape, vec![9u8; 64]).unwrap()).unwrap();
    // three channels against a single-channel model
    write_stack(raw.join("c_rgb.tif"), &rgb_stack(1, 8, 8)).unwrap();

    let stacks = discover_stacks(&raw, DEFAULT_EXTENSIONS).unwrap();
    let dest = tmp.path().join("out");
    let config = PipelineConfig {
        scratch: ScratchPolicy::Disk,
        failure_policy: FailurePolicy::ContinueBatch,
        ..Default::default()
    };
    let report = correct_dataset(&repo, "obj", &[Some(618)], &stacks, &dest, &config).unwrap();

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.corrected.len(), 1);
    assert!(report.corrected[0].ends_with("b_ok.tif"));
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(report.failures[0].error, OpsError::Read { .. }));
    assert!(matches!(report.failures[1].error, OpsError::ModelMismatch(_)));
    assert!(!report.is_success());

    // no scratch directories left behind
    assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 1);
}

#[test]
fn unloadable_model_fails_batch() {
    let tmp = TempDir::new().unwrap();
    let repo = ModelRepository::new(tmp.path(), FieldFormat::Tiff);
    let err = correct_dataset(
        &repo,
        "obj",
        &[Some(618)],
        &[],
        &tmp.path().join("out"),
        &PipelineConfig::default(),
    )
    .unwrap_err();
    assert!(err.is_model_load());
}
