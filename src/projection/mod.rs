pub mod camera;
pub mod render;
pub mod views;

use image::RgbImage;
use nalgebra::Vector3;

pub use camera::Camera;
pub use render::{Rasterizer, sample_texture};
pub use views::{BlobLimits, CameraView, ViewParams};

use crate::config::RenderConfig;
use crate::error::{CapscanError, Result};
use crate::geometry::Mesh;

/// One rendered view together with the camera that produced it.
#[derive(Debug, Clone)]
pub struct RenderedView {
    pub camera: Camera,
    pub image: RgbImage,
}

impl RenderedView {
    pub fn view(&self) -> CameraView {
        self.camera.view
    }
}

/// Renders the aligned cap from the fixed set of camera views.
pub struct MultiViewProjector<'a> {
    mesh: &'a Mesh,
    texture: Option<&'a RgbImage>,
    config: RenderConfig,
}

impl<'a> MultiViewProjector<'a> {
    pub fn new(mesh: &'a Mesh, texture: Option<&'a RgbImage>, config: RenderConfig) -> Self {
        Self {
            mesh,
            texture,
            config,
        }
    }

    /// Bounding-box extents with every axis raised to at least
    /// `extent_floor` times the largest one.
    fn framing_extents(&self) -> Result<(nalgebra::Point3<f64>, Vector3<f64>)> {
        let bounds = self
            .mesh
            .bounds()
            .ok_or_else(|| CapscanError::MissingInput("mesh has no vertices to render".into()))?;
        let ext = bounds.extents();
        let floor = ext.max() * self.config.extent_floor;
        if floor <= 0.0 {
            return Err(CapscanError::GeometryDegenerate(
                "mesh bounding box has zero extent".into(),
            ));
        }
        Ok((bounds.center(), ext.map(|e| e.max(floor))))
    }

    /// Camera for one view. Offset from the mesh centre is the view direction
    /// scaled per axis by the framing extents.
    pub fn camera(&self, view: CameraView) -> Result<Camera> {
        let (center, ext) = self.framing_extents()?;
        let params = view.params();
        let offset = params.direction.component_mul(&ext) * params.distance_scale;
        Camera::look_at(
            view,
            center + offset,
            center,
            &params.up,
            self.config.fov_deg,
            self.config.width,
            self.config.height,
        )
    }

    pub fn cameras(&self) -> Result<Vec<Camera>> {
        CameraView::ALL.iter().map(|v| self.camera(*v)).collect()
    }

    pub fn render(&self, camera: &Camera) -> RgbImage {
        Rasterizer::new(camera, self.config.background, self.config.near_clip)
            .render(self.mesh, self.texture)
    }

    /// Render every view in table order.
    pub fn render_all(&self) -> Result<Vec<RenderedView>> {
        let mut out = Vec::with_capacity(CameraView::ALL.len());
        for camera in self.cameras()? {
            let image = self.render(&camera);
            log::debug!("rendered {} at {}x{}", camera.view, camera.width, camera.height);
            out.push(RenderedView { camera, image });
        }
        Ok(out)
    }

    /// Wide three-quarter render of the whole cap, used for reports only.
    pub fn render_overview(&self) -> Result<RgbImage> {
        let (center, ext) = self.framing_extents()?;
        let direction = Vector3::new(1.0, 0.8, 1.0);
        let camera = Camera::look_at(
            CameraView::TopFrontRight,
            center + direction.component_mul(&ext) * 2.5,
            center,
            &Vector3::y(),
            self.config.fov_deg,
            self.config.width,
            self.config.height,
        )?;
        Ok(self.render(&camera))
    }
}
