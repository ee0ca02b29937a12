//! Session orchestration: align, extract, render, detect, label, map, merge.
//!
//! Detection is the only concurrent stage. Every (view, method) pair becomes
//! one blocking unit on the tokio pool; the mapper and merger only run after
//! all units have been joined. Rendering and 2D to 3D mapping are CPU bound
//! too and run through `spawn_blocking`, so the async thread only
//! coordinates.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{MergeConfig, PipelineConfig};
use crate::detection::{PreparedView, StageTrace, ViewDetector, detector_for};
use crate::error::CapscanError;
use crate::geometry::{Alignment, CoordinateFrameAligner, Mesh, RegionExtractor};
use crate::io;
use crate::labeling::MarkerLabeler;
use crate::mapping::ElectrodeMapper;
use crate::merge::ElectrodeMerger;
use crate::models::{Detected3DPoint, DetectionCandidate, DetectionMethod, FiducialSet, MergedElectrode};
use crate::projection::{Camera, CameraView, MultiViewProjector, RenderedView};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    /// Save one image per view under `NN_stage/<view>.png`.
    fn save_stage(&self, index: usize, stage: &str, view: CameraView, image: &GrayImage) -> Result<()> {
        let stage_dir = self
            .output_dir
            .join(format!("{:02}_{}", index, stage.to_lowercase().replace(' ', "_")));
        std::fs::create_dir_all(&stage_dir)?;
        let path = stage_dir.join(format!("{}.png", view.file_stem()));
        image
            .save(&path)
            .map_err(|e| anyhow::anyhow!("Failed to save debug image {}: {}", path.display(), e))?;
        Ok(())
    }
}

/// Everything a session starts from. The pipeline never modifies it.
#[derive(Debug, Clone)]
pub struct SessionInputs {
    pub mesh: Mesh,
    pub texture: Option<RgbImage>,
    pub fiducials: FiducialSet,
}

impl SessionInputs {
    /// Read the three session files. A path that does not exist is a
    /// `MissingInput` error.
    pub fn load(mesh: &Path, texture: Option<&Path>, fiducials: &Path) -> Result<Self> {
        for path in [Some(mesh), texture, Some(fiducials)].into_iter().flatten() {
            if !path.exists() {
                return Err(CapscanError::MissingInput(format!("{} not found", path.display())).into());
            }
        }
        let mesh = io::load_obj(mesh).with_context(|| format!("reading mesh {}", mesh.display()))?;
        let texture = texture
            .map(|p| io::load_texture(p).with_context(|| format!("reading texture {}", p.display())))
            .transpose()?;
        let fiducials = io::load_fiducials(fiducials)
            .with_context(|| format!("reading fiducials {}", fiducials.display()))?;
        Ok(Self {
            mesh,
            texture,
            fiducials,
        })
    }
}

/// Output of one detection unit.
#[derive(Debug)]
pub struct DetectionOutcome {
    pub view: CameraView,
    pub method: DetectionMethod,
    pub candidates: Vec<DetectionCandidate>,
    pub stages: Vec<(String, GrayImage)>,
}

/// What a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_dir: PathBuf,
    pub alignment: Alignment,
    pub cameras: Vec<Camera>,
    pub candidates: Vec<DetectionCandidate>,
    pub points: Vec<Detected3DPoint>,
    pub merged: Vec<MergedElectrode>,
    pub labelled: usize,
}

impl SessionReport {
    pub fn count_by_method(&self) -> BTreeMap<DetectionMethod, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.candidates {
            *counts.entry(c.method).or_insert(0) += 1;
        }
        counts
    }
}

/// The aligned, cut and rendered head a session detects on.
#[derive(Debug)]
pub struct Scene {
    pub cap: Mesh,
    pub alignment: Alignment,
    pub rendered: Vec<RenderedView>,
}

impl Scene {
    /// Align and cut the head, render every view and write the renders, the
    /// overview and `cameras.json` into `session_dir`.
    pub fn build(
        config: &PipelineConfig,
        extract: bool,
        inputs: &SessionInputs,
        session_dir: &Path,
    ) -> Result<Self> {
        let (aligned, fiducials, alignment) =
            CoordinateFrameAligner::new().align(&inputs.mesh, &inputs.fiducials)?;
        log::info!(
            "aligned mesh: {} vertices, {} triangles",
            aligned.vertex_count(),
            aligned.triangle_count()
        );

        let cap = if extract {
            extract_region(config, &aligned, &fiducials)?
        } else {
            aligned
        };

        let projector = MultiViewProjector::new(&cap, inputs.texture.as_ref(), config.render.clone());
        let rendered = projector.render_all()?;
        for view in &rendered {
            let path = session_dir.join(format!("{}.png", view.view().file_stem()));
            view.image
                .save(&path)
                .with_context(|| format!("saving {}", path.display()))?;
        }
        projector
            .render_overview()?
            .save(session_dir.join("overview.png"))
            .context("saving overview render")?;

        let scene = Self {
            cap,
            alignment,
            rendered,
        };
        io::save_cameras(&session_dir.join("cameras.json"), &scene.cameras())?;
        log::info!("rendered {} views into {}", scene.rendered.len(), session_dir.display());
        Ok(scene)
    }

    pub fn cameras(&self) -> Vec<Camera> {
        self.rendered.iter().map(|r| r.camera.clone()).collect()
    }

    /// Ray-cast candidates onto the cap and merge the hits.
    pub fn locate(
        &self,
        candidates: &[DetectionCandidate],
        merge: &MergeConfig,
    ) -> (Vec<Detected3DPoint>, Vec<MergedElectrode>) {
        let points = ElectrodeMapper::new(&self.cap, self.rendered.iter().map(|r| &r.camera))
            .map(candidates);
        let merged = ElectrodeMerger::new(merge.clone()).merge(&points);
        (points, merged)
    }
}

/// Region extraction with a fallback to the unextracted mesh when the
/// geometry does not allow a cut.
fn extract_region(config: &PipelineConfig, aligned: &Mesh, fiducials: &FiducialSet) -> Result<Mesh> {
    let extractor = RegionExtractor::new(config.crop.clone());
    match extractor.extract(aligned, fiducials) {
        Ok(cap) if !cap.is_empty() => Ok(cap),
        Ok(_) => {
            log::warn!("region extraction removed every triangle; using the aligned mesh");
            Ok(aligned.clone())
        }
        Err(CapscanError::GeometryDegenerate(reason)) => {
            log::warn!("region extraction skipped: {reason}");
            Ok(aligned.clone())
        }
        Err(e) => Err(e.into()),
    }
}

/// Session runner.
pub struct Pipeline {
    config: PipelineConfig,
    extract: bool,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            extract: true,
            debug: None,
        }
    }

    /// Skip region extraction and detect on the whole aligned mesh.
    pub fn with_extraction(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A fresh `session-<uuid>` directory under `root`.
    pub fn new_session_dir(root: &Path) -> PathBuf {
        root.join(format!("session-{}", uuid::Uuid::new_v4()))
    }

    fn max_concurrent(&self) -> usize {
        match self.config.workers.max_concurrent {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Run one full session, writing its artefacts into `session_dir`.
    pub async fn run(&self, inputs: &SessionInputs, session_dir: &Path) -> Result<SessionReport> {
        // Missing landmarks abort before anything is written.
        inputs.fiducials.require_all()?;
        std::fs::create_dir_all(session_dir)
            .with_context(|| format!("creating session directory {}", session_dir.display()))?;

        let scene = {
            let config = self.config.clone();
            let extract = self.extract;
            let inputs = inputs.clone();
            let dir = session_dir.to_path_buf();
            tokio::task::spawn_blocking(move || Scene::build(&config, extract, &inputs, &dir))
                .await
                .context("scene preparation task panicked")??
        };
        let scene = Arc::new(scene);

        let outcomes = self.detect_all(&scene.rendered).await;
        self.dump_stages(&outcomes)?;

        let shapes: HashMap<CameraView, (u32, u32)> = scene
            .rendered
            .iter()
            .map(|r| (r.view(), r.image.dimensions()))
            .collect();
        let (candidates, labelled) = self.label_markers(outcomes, &shapes);

        let (candidates, points, merged) = {
            let scene = Arc::clone(&scene);
            let merge = self.config.merge.clone();
            tokio::task::spawn_blocking(move || {
                let (points, merged) = scene.locate(&candidates, &merge);
                (candidates, points, merged)
            })
            .await
            .context("mapping task panicked")?
        };

        io::save_electrodes(&session_dir.join("electrodes.csv"), &points)?;
        io::save_merged(&session_dir.join("merged_electrodes.csv"), &merged)?;

        Ok(SessionReport {
            session_dir: session_dir.to_path_buf(),
            alignment: scene.alignment,
            cameras: scene.cameras(),
            candidates,
            points,
            merged,
            labelled,
        })
    }

    /// Run every detection method on every view, bounded by the worker limit.
    /// A unit that panics contributes nothing.
    pub async fn detect_all(&self, rendered: &[RenderedView]) -> Vec<DetectionOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent().max(1)));
        let tracing = self.debug.is_some();
        let mut set = JoinSet::new();

        for rendered_view in rendered {
            let prepared = Arc::new(PreparedView::from_rendered(rendered_view, &self.config.detection));
            for method in DetectionMethod::ALL {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    log::warn!("worker pool closed; skipping {} {method}", prepared.view);
                    continue;
                };
                let prepared = Arc::clone(&prepared);
                let config = self.config.detection.clone();
                set.spawn_blocking(move || {
                    let _permit = permit;
                    let detector = detector_for(method, &config);
                    let mut trace = if tracing {
                        StageTrace::enabled()
                    } else {
                        StageTrace::disabled()
                    };
                    let candidates = detector.candidates(&prepared, &mut trace);
                    log::debug!("{} {method}: {} candidates", prepared.view, candidates.len());
                    let mut stages = trace.into_stages();
                    if tracing && method == DetectionMethod::Marker {
                        stages.insert(0, ("foreground".to_string(), prepared.foreground.clone()));
                    }
                    DetectionOutcome {
                        view: prepared.view,
                        method,
                        candidates,
                        stages,
                    }
                });
            }
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::warn!("detection unit failed, treating it as empty: {e}"),
            }
        }
        outcomes.sort_by_key(|o| (o.view, o.method));
        log::info!(
            "detection finished: {} units, {} candidates",
            outcomes.len(),
            outcomes.iter().map(|o| o.candidates.len()).sum::<usize>()
        );
        outcomes
    }

    /// Label markers view by view and flatten all candidates.
    fn label_markers(
        &self,
        outcomes: Vec<DetectionOutcome>,
        shapes: &HashMap<CameraView, (u32, u32)>,
    ) -> (Vec<DetectionCandidate>, usize) {
        let labeler = MarkerLabeler::new(self.config.labeling.clone());
        let mut by_view: BTreeMap<CameraView, Vec<DetectionCandidate>> = BTreeMap::new();
        for outcome in outcomes {
            by_view
                .entry(outcome.view)
                .or_default()
                .extend(outcome.candidates);
        }

        let mut labelled = 0;
        let mut all = Vec::new();
        for (view, mut candidates) in by_view {
            if let Some(&shape) = shapes.get(&view) {
                labelled += labeler.label(view, shape, &mut candidates);
            }
            all.extend(candidates);
        }
        log::info!("labelled {labelled} markers");
        (all, labelled)
    }

    /// Write recorded stage images. Stage directories are numbered in the
    /// order the stages first appear.
    fn dump_stages(&self, outcomes: &[DetectionOutcome]) -> Result<()> {
        let Some(debug) = self.debug.as_ref() else {
            return Ok(());
        };
        let mut order: Vec<String> = Vec::new();
        for outcome in outcomes {
            for (stage, image) in &outcome.stages {
                let index = match order.iter().position(|s| s == stage) {
                    Some(i) => i,
                    None => {
                        order.push(stage.clone());
                        order.len() - 1
                    }
                };
                debug.save_stage(index + 1, stage, outcome.view, image)?;
            }
        }
        log::debug!("saved {} debug stages to {}", order.len(), debug.output_dir.display());
        Ok(())
    }
}
