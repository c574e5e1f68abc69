// 该文件是 Yinxing （隐形） 项目的一部分。
// tests/pipeline.rs - 批处理流程集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod common;

use std::path::Path;

use anyhow::Result;
use image::Rgb;
use yinxing::{
  camouflage::{Camouflage, CamouflageConfig},
  detection::Detection,
  mask_generator::{GenerateOptions, MaskGenerator},
  model::ModelRegistries,
  ocr::OcrProcessor,
  output::RunSummary,
  remover::{RemovalOrder, Remover},
  task::{Mode, Pipeline, PipelineOptions, SUMMARY_FILE},
};

use common::{HEIGHT, WIDTH, test_registries, write_png};

fn redact_mode(registries: &ModelRegistries, detector: &str) -> Result<Mode> {
  Ok(Mode::Redact {
    generator: MaskGenerator::from_registries(registries, &[detector], &[], "bbox")?,
    camouflage: Camouflage::new("solid", CamouflageConfig::default())?,
    options: GenerateOptions::default(),
  })
}

fn options(input: &Path, output: &Path, resize: Option<(u32, u32)>) -> PipelineOptions {
  PipelineOptions {
    input_dir: input.to_path_buf(),
    output_dir: output.to_path_buf(),
    resize,
  }
}

fn read_detections(path: &Path) -> Result<Vec<Detection>> {
  Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

#[test]
fn corrupt_image_is_skipped() -> Result<()> {
  let input = tempfile::tempdir()?;
  let output = tempfile::tempdir()?;
  for name in ["a.png", "b.png", "nested/c.png"] {
    write_png(&input.path().join(name));
  }
  std::fs::write(input.path().join("broken.jpg"), b"definitely not a jpeg")?;

  let registries = test_registries();
  let pipeline = Pipeline::new(
    options(input.path(), output.path(), None),
    redact_mode(&registries, "fixed")?,
  );
  let summary = pipeline.run_task()?;

  assert_eq!(summary.total_images, 4);
  assert_eq!(summary.processed_images, 3);
  assert_eq!(summary.skipped_images, 1);
  assert_eq!(summary.total_detections_removed, Some(3));
  assert_eq!(summary.per_class_counts["person"], 3);

  let saved = RunSummary::load(&output.path().join(SUMMARY_FILE))?;
  assert_eq!(saved.processed_images, 3);

  for base in ["a", "b", "nested/c"] {
    for suffix in [".json", ".camouflaged.png", ".blended.png", ".mask.png"] {
      let path = output.path().join(format!("{base}{suffix}"));
      assert!(path.exists(), "缺少 {}", path.display());
    }
  }
  assert!(!output.path().join("broken.json").exists());

  let camouflaged = image::open(output.path().join("a.camouflaged.png"))?.to_rgb8();
  assert_eq!(camouflaged.dimensions(), (WIDTH, HEIGHT));
  assert_eq!(*camouflaged.get_pixel(8, 6), Rgb([127, 127, 127]));
  assert_eq!(*camouflaged.get_pixel(0, 0), Rgb([0, 0, 90]));

  let mask = image::open(output.path().join("a.mask.png"))?.to_luma8();
  assert_eq!(mask.get_pixel(8, 6).0, [0]);
  assert_eq!(mask.get_pixel(0, 0).0, [255]);

  let detections = read_detections(&output.path().join("a.json"))?;
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0].class_name.as_deref(), Some("person"));
  assert!(detections[0].segmentation.is_some());
  Ok(())
}

#[test]
fn same_stem_images_keep_separate_outputs() -> Result<()> {
  let input = tempfile::tempdir()?;
  let output = tempfile::tempdir()?;
  write_png(&input.path().join("x.png"));
  image::RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([10, 20, 30])).save(input.path().join("x.jpg"))?;

  let registries = test_registries();
  let summary = Pipeline::new(
    options(input.path(), output.path(), None),
    redact_mode(&registries, "fixed")?,
  )
  .run_task()?;

  assert_eq!(summary.processed_images, 2);
  for base in ["x.jpg", "x.png"] {
    for suffix in [".json", ".camouflaged.png", ".blended.png", ".mask.png"] {
      let path = output.path().join(format!("{base}{suffix}"));
      assert!(path.exists(), "缺少 {}", path.display());
    }
  }
  assert!(!output.path().join("x.json").exists());

  let from_jpg = image::open(output.path().join("x.jpg.camouflaged.png"))?.to_rgb8();
  let from_png = image::open(output.path().join("x.png.camouflaged.png"))?.to_rgb8();
  assert_ne!(from_jpg.get_pixel(0, 0), from_png.get_pixel(0, 0));
  Ok(())
}

#[test]
fn no_detections_writes_only_json() -> Result<()> {
  let input = tempfile::tempdir()?;
  let output = tempfile::tempdir()?;
  write_png(&input.path().join("empty.png"));

  let registries = test_registries();
  let summary = Pipeline::new(
    options(input.path(), output.path(), None),
    redact_mode(&registries, "blind")?,
  )
  .run_task()?;

  assert_eq!(summary.processed_images, 1);
  assert_eq!(summary.total_detections_removed, Some(0));
  assert_eq!(
    std::fs::read_to_string(output.path().join("empty.json"))?,
    "[]"
  );
  for suffix in [".camouflaged.png", ".blended.png", ".mask.png"] {
    assert!(!output.path().join(format!("empty{suffix}")).exists());
  }
  Ok(())
}

#[test]
fn resized_inference_maps_back_to_source() -> Result<()> {
  let input = tempfile::tempdir()?;
  let output = tempfile::tempdir()?;
  write_png(&input.path().join("small.png"));

  let registries = test_registries();
  Pipeline::new(
    options(input.path(), output.path(), Some((WIDTH / 2, HEIGHT / 2))),
    redact_mode(&registries, "fixed")?,
  )
  .run_task()?;

  let detections = read_detections(&output.path().join("small.json"))?;
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0].bbox, [4.0, 3.0, 12.0, 9.0]);
  let rle = detections[0].segmentation.as_ref().unwrap();
  assert_eq!(rle.height(), HEIGHT as usize);
  assert_eq!(rle.width(), WIDTH as usize);

  let mask = image::open(output.path().join("small.mask.png"))?.to_luma8();
  assert_eq!(mask.dimensions(), (WIDTH, HEIGHT));
  Ok(())
}

#[test]
fn remove_mode_inpaints_prompted_objects() -> Result<()> {
  let input = tempfile::tempdir()?;
  let output = tempfile::tempdir()?;
  write_png(&input.path().join("street.png"));

  let registries = test_registries();
  let mode = Mode::Remove {
    generator: MaskGenerator::from_registries(&registries, &[] as &[&str], &["echo"], "bbox")?,
    remover: Remover::from_registries(&registries, "telea", RemovalOrder::LargestFirst)?,
    options: GenerateOptions {
      conf: 0.25,
      allowed_classes: Some(vec!["car".to_string()]),
      ..Default::default()
    },
  };
  let summary = Pipeline::new(options(input.path(), output.path(), None), mode).run_task()?;

  assert_eq!(summary.per_class_counts["car"], 1);
  let inpainted = image::open(output.path().join("street.inpainted.png"))?.to_rgb8();
  assert_eq!(inpainted.dimensions(), (WIDTH, HEIGHT));
  // 掩码外的像素保持原样
  assert_eq!(*inpainted.get_pixel(WIDTH - 1, HEIGHT - 1), Rgb([225, 220, 90]));
  Ok(())
}

#[test]
fn ocr_mode_reports_text_boxes() -> Result<()> {
  let input = tempfile::tempdir()?;
  let output = tempfile::tempdir()?;
  write_png(&input.path().join("sign.png"));

  let registries = test_registries();
  let mode = Mode::Ocr {
    processor: OcrProcessor::from_registries(&registries, &["sign"])?,
    conf: 0.5,
  };
  let summary = Pipeline::new(options(input.path(), output.path(), None), mode).run_task()?;

  assert_eq!(summary.total_text_boxes, Some(1));
  assert_eq!(summary.total_detections_removed, None);
  let detections = read_detections(&output.path().join("sign.json"))?;
  assert_eq!(detections[0].text.as_deref(), Some("EXIT"));
  assert!(output.path().join("sign.detected.png").exists());
  Ok(())
}

#[test]
fn unknown_model_fails_before_processing() {
  let registries = test_registries();
  assert!(MaskGenerator::from_registries(&registries, &["missing"], &[], "bbox").is_err());
  assert!(Remover::from_registries(&registries, "lama", RemovalOrder::AsGiven).is_err());
}
