// Pipeline integration tests
//
// Dispatcher strategies and the job runner: verbatim copy, the in-place
// recompression ladder, partial success across profiles, and job
// isolation in the orchestrator.

use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, Stream, dictionary};
use pdf_lighten::config::profile::{ColorPolicy, CompressionProfile, CompressionStrategy};
use pdf_lighten::dispatch::run_strategy;
use pdf_lighten::error::PdfLightenError;
use pdf_lighten::pipeline::job_runner::{ArtifactOutcome, JobConfig, run_job};
use pdf_lighten::pipeline::orchestrator::run_all_jobs;
use pdf_lighten::process::tools::ToolPaths;
use tempfile::tempdir;

/// Create a single-page PDF, optionally embedding a flate-compressed RGB
/// image XObject.
fn create_test_pdf(path: &Path, with_image: bool) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut resources = dictionary! {};
    let mut content = Vec::new();
    if with_image {
        let (w, h) = (200u32, 200u32);
        let mut raw = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                raw.extend([(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).expect("compress pixels");
        let compressed = encoder.finish().expect("finish compression");

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 200,
                "Height" => 200,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            compressed,
        );
        let image_id = doc.add_object(Object::Stream(image));
        let mut xobjects = lopdf::Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        resources.set("XObject", Object::Dictionary(xobjects));
        content = b"q 200 0 0 200 50 400 cm /Im0 Do Q".to_vec();
    }

    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ],
        "Contents" => content_id,
        "Resources" => resources,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save test PDF");
}

/// The copy strategy reproduces the input byte for byte.
#[test]
fn test_copy_strategy_is_byte_identical() {
    let dir = tempdir().expect("create temp dir");
    let input = dir.path().join("input.pdf");
    let output = dir.path().join("output.pdf");
    create_test_pdf(&input, false);

    let via = run_strategy(&input, &output, &CompressionStrategy::Copy, &ToolPaths::default())
        .expect("copy strategy");
    assert_eq!(via, "copy");
    assert_eq!(
        std::fs::read(&input).unwrap(),
        std::fs::read(&output).unwrap()
    );
}

/// In-place recompression on a well-formed document succeeds on the first
/// rung without external tools.
#[test]
fn test_recompress_strategy_in_place() {
    let dir = tempdir().expect("create temp dir");
    let input = dir.path().join("input.pdf");
    let output = dir.path().join("output.pdf");
    create_test_pdf(&input, true);

    let strategy = CompressionStrategy::RecompressImages {
        quality: 75,
        scale: 1.0,
    };
    let via = run_strategy(&input, &output, &strategy, &ToolPaths::default())
        .expect("recompress strategy");
    assert_eq!(via, "in-place image recompression");

    let doc = Document::load(&output).expect("output is a valid PDF");
    assert_eq!(doc.get_pages().len(), 1);
}

/// When the document cannot be parsed and no external tool is available,
/// the ladder bottoms out at the verbatim copy instead of failing.
#[test]
fn test_recompress_ladder_falls_back_to_copy() {
    let dir = tempdir().expect("create temp dir");
    let input = dir.path().join("broken.pdf");
    let output = dir.path().join("output.pdf");
    std::fs::write(&input, b"%PDF-1.5 this is not a parseable document").unwrap();

    let strategy = CompressionStrategy::RecompressImages {
        quality: 75,
        scale: 1.0,
    };
    // No tools resolved, so the qpdf rung is unavailable too.
    let via =
        run_strategy(&input, &output, &strategy, &ToolPaths::default()).expect("ladder bottom");
    assert_eq!(via, "verbatim copy");
    assert_eq!(
        std::fs::read(&input).unwrap(),
        std::fs::read(&output).unwrap()
    );
}

/// One profile failing (missing processor) must not block the others;
/// the job still succeeds with a per-artifact failure report.
#[test]
fn test_job_partial_success() {
    let dir = tempdir().expect("create temp dir");
    let input = dir.path().join("input.pdf");
    create_test_pdf(&input, false);

    let config = JobConfig {
        input_path: input,
        output_dir: dir.path().join("out"),
        bleed_mm: 3.0,
        color: ColorPolicy::Preserve,
        profiles: vec![CompressionProfile::clean(), CompressionProfile::vector()],
        flatten: false,
    };
    // No ghostscript resolved: the vector profile must fail.
    let result = run_job(&config, &ToolPaths::default()).expect("job runs");
    assert_eq!(result.pages, 1);
    assert_eq!(result.artifacts.len(), 2);

    match &result.artifacts[0].outcome {
        ArtifactOutcome::Produced { via } => assert_eq!(via, "copy"),
        ArtifactOutcome::Failed { error } => panic!("clean profile failed: {error}"),
    }
    assert!(result.artifacts[0].path.exists());

    match &result.artifacts[1].outcome {
        ArtifactOutcome::Failed {
            error: PdfLightenError::ProcessorUnavailable(_),
        } => {}
        ArtifactOutcome::Failed { error } => panic!("unexpected error kind: {error}"),
        ArtifactOutcome::Produced { .. } => panic!("vector profile cannot succeed without gs"),
    }
}

/// Artifact file names follow `{input stem}-{profile}.pdf` in the output
/// directory.
#[test]
fn test_artifact_naming() {
    let dir = tempdir().expect("create temp dir");
    let input = dir.path().join("brochure.pdf");
    create_test_pdf(&input, false);

    let config = JobConfig {
        input_path: input,
        output_dir: dir.path().to_path_buf(),
        bleed_mm: 3.0,
        color: ColorPolicy::Preserve,
        profiles: vec![CompressionProfile::clean(), CompressionProfile::moderate()],
        flatten: false,
    };
    let result = run_job(&config, &ToolPaths::default()).expect("job runs");
    let names: Vec<String> = result
        .artifacts
        .iter()
        .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["brochure-clean.pdf", "brochure-moderate.pdf"]);
}

/// A failing job must not prevent other jobs from completing.
#[test]
fn test_orchestrator_isolates_job_failures() {
    let dir = tempdir().expect("create temp dir");
    let good_input = dir.path().join("good.pdf");
    create_test_pdf(&good_input, false);

    let jobs = vec![
        JobConfig {
            input_path: dir.path().join("missing.pdf"),
            output_dir: dir.path().join("out"),
            bleed_mm: 3.0,
            color: ColorPolicy::Preserve,
            profiles: vec![CompressionProfile::clean()],
            flatten: false,
        },
        JobConfig {
            input_path: good_input,
            output_dir: dir.path().join("out"),
            bleed_mm: 3.0,
            color: ColorPolicy::Preserve,
            profiles: vec![CompressionProfile::clean()],
            flatten: false,
        },
    ];
    let results = run_all_jobs(&jobs, &ToolPaths::default());
    assert_eq!(results.len(), 2);
    assert!(matches!(
        results[0],
        Err(PdfLightenError::DocumentReadError(_))
    ));
    let good = results[1].as_ref().expect("good job succeeds");
    assert_eq!(good.pages, 1);
}
