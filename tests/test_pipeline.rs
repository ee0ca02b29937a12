mod common;

use capscan::config::{MergeConfig, PipelineConfig, RenderConfig, WorkerConfig};
use capscan::error::CapscanError;
use capscan::io;
use capscan::models::INI;
use capscan::pipeline::{Pipeline, Scene, SessionInputs};
use common::*;

fn small_config() -> PipelineConfig {
    PipelineConfig {
        render: RenderConfig {
            width: 128,
            height: 128,
            ..RenderConfig::default()
        },
        workers: WorkerConfig { max_concurrent: 2 },
        ..PipelineConfig::default()
    }
}

fn sphere_session() -> SessionInputs {
    SessionInputs {
        mesh: uv_sphere(90.0, 16, 32),
        texture: None,
        fiducials: canonical_fiducials(90.0),
    }
}

#[tokio::test]
async fn session_writes_all_artefacts() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let session_dir = Pipeline::new_session_dir(root.path());
    assert!(
        session_dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("session-"))
    );

    let report = Pipeline::new(small_config())
        .run(&sphere_session(), &session_dir)
        .await?;

    for view in CameraView::ALL {
        let png = session_dir.join(format!("{}.png", view.file_stem()));
        assert!(png.exists(), "missing {}", png.display());
    }
    assert!(session_dir.join("overview.png").exists());
    assert_eq!(io::load_cameras(&session_dir.join("cameras.json"))?.len(), 17);
    assert_eq!(report.cameras.len(), 17);
    // 17 renders, the overview, cameras.json and the two CSV tables.
    assert_eq!(std::fs::read_dir(&session_dir)?.count(), 21);

    let points = io::load_electrodes(&session_dir.join("electrodes.csv"))?;
    assert_eq!(points.len(), report.points.len());
    let merged = io::load_merged(&session_dir.join("merged_electrodes.csv"))?;
    assert_eq!(merged.len(), report.merged.len());

    // Every mapped point lies on the upper cap of the sphere.
    for p in &report.points {
        let r = p.position().coords.norm();
        assert!((r - 90.0).abs() < 1.0, "point off the surface: r = {r}");
        assert!(p.y > -1e-6);
    }
    Ok(())
}

#[tokio::test]
async fn debug_mode_dumps_numbered_stages() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let debug_dir = root.path().join("debug");

    Pipeline::new(small_config())
        .with_debug(debug_dir.clone())?
        .run(&sphere_session(), &root.path().join("session"))
        .await?;

    let mut stages: Vec<String> = std::fs::read_dir(&debug_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    stages.sort();
    assert_eq!(stages.first().map(String::as_str), Some("01_foreground"));
    assert!(debug_dir.join("01_foreground").join("front.png").exists());
    assert!(stages.iter().any(|s| s.ends_with("_marker_mask")));
    Ok(())
}

#[test]
fn scene_is_built_and_located_outside_a_runtime() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let inputs = sphere_session();
    let before = inputs.mesh.clone();

    let scene = Scene::build(&small_config(), true, &inputs, root.path())?;

    assert_eq!(inputs.mesh, before);
    assert_eq!(scene.rendered.len(), 17);
    assert!(!scene.cap.is_empty());
    assert!(root.path().join("front.png").exists());
    let saved = io::load_cameras(&root.path().join("cameras.json"))?;
    let views: Vec<_> = saved.iter().map(|c| c.view).collect();
    assert_eq!(views, scene.cameras().iter().map(|c| c.view).collect::<Vec<_>>());

    let (points, merged) = scene.locate(&[], &MergeConfig::default());
    assert!(points.is_empty());
    assert!(merged.is_empty());
    Ok(())
}

#[tokio::test]
async fn debug_directory_must_be_empty() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    std::fs::write(root.path().join("leftover.txt"), "x")?;
    assert!(Pipeline::new(small_config()).with_debug(root.path().to_path_buf()).is_err());
    Ok(())
}

#[tokio::test]
async fn missing_fiducial_aborts_before_writing() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let session_dir = root.path().join("session");
    let mut inputs = sphere_session();
    let mut partial = FiducialSet::new();
    for (code, p) in inputs.fiducials.iter() {
        if code != INI {
            partial.insert(code, *p)?;
        }
    }
    inputs.fiducials = partial;

    let err = Pipeline::new(small_config())
        .run(&inputs, &session_dir)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CapscanError>(),
        Some(CapscanError::MissingInput(_))
    ));
    assert!(!session_dir.exists());
    Ok(())
}

#[tokio::test]
async fn missing_input_file_is_reported() -> anyhow::Result<()> {
    let root = tempfile::TempDir::new()?;
    let absent = root.path().join("head.obj");
    let fiducials = root.path().join("fiducials.csv");
    std::fs::write(&fiducials, "NAS,0,0,90\n")?;

    let err = SessionInputs::load(&absent, None, &fiducials).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CapscanError>(),
        Some(CapscanError::MissingInput(_))
    ));
    Ok(())
}
