//! Vulkan renderer: owns the context and every GPU object built from it

use std::time::Instant;

use super::initialization::context::VulkanContext;
use super::rendering::pipeline::{GraphicsPipeline, PipelineBuilder};
use super::rendering::vertex_layout::Vertex;
use super::resources::buffer::IndexData;
use super::resources::mesh::Mesh;
use super::resources::uniform_buffer::{FrameUniforms, TransformUniform};
use super::state::frame_scheduler::{FrameScheduler, FrameStatus};
use super::state::swapchain_manager::SwapchainManager;
use super::VulkanResult;
use crate::config::{RendererConfig, ShaderConfig};
use crate::render::window::SurfaceWindow;

/// Draws every registered mesh with one pipeline, one frame per call
///
/// Field order is drop order; the context must outlive everything created
/// from it.
pub struct VulkanRenderer {
    scheduler: FrameScheduler,
    meshes: Vec<Mesh>,
    pipeline: GraphicsPipeline,
    uniforms: FrameUniforms,
    swapchains: SwapchainManager,
    context: VulkanContext,
    shaders: ShaderConfig,
    started: Instant,
}

impl VulkanRenderer {
    /// Bring up device, swapchain, uniforms, pipeline and frame scheduler
    pub fn new(window: &mut dyn SurfaceWindow, config: &RendererConfig) -> VulkanResult<Self> {
        log::debug!("Creating VulkanRenderer...");
        let context = VulkanContext::new(window, config)?;
        let swapchains = SwapchainManager::new(&context, window, config.prefer_mailbox)?;
        let uniforms = FrameUniforms::new(&context, config.max_frames_in_flight)?;

        let (color_format, image_count) = {
            let swapchain = swapchains.current()?;
            (swapchain.format().format, swapchain.image_count())
        };
        let pipeline = PipelineBuilder::new(&config.shaders, color_format)
            .descriptor_set_layout(uniforms.layout().handle())
            .build(context.device())?;

        let scheduler = FrameScheduler::new(
            &context,
            config.max_frames_in_flight,
            image_count,
            config.fence_timeout_ns,
            config.clear_color,
        )?;

        log::info!("VulkanRenderer ready");
        Ok(Self {
            scheduler,
            meshes: Vec::new(),
            pipeline,
            uniforms,
            swapchains,
            context,
            shaders: config.shaders.clone(),
            started: Instant::now(),
        })
    }

    /// Upload a mesh; it is drawn every frame from now on
    ///
    /// Returns the mesh's position in draw order.
    pub fn add_mesh(&mut self, vertices: &[Vertex], indices: &IndexData) -> VulkanResult<usize> {
        let mesh = Mesh::new(&self.context, vertices, indices)?;
        log::debug!(
            "Added mesh {}: {} vertices, {} indices",
            self.meshes.len(),
            mesh.vertex_count(),
            mesh.index_count()
        );
        self.meshes.push(mesh);
        Ok(self.meshes.len() - 1)
    }

    /// Number of meshes drawn per frame
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Draw one frame
    pub fn draw_frame(&mut self, window: &mut dyn SurfaceWindow) -> VulkanResult<FrameStatus> {
        let seconds = self.started.elapsed().as_secs_f32();
        let Self {
            scheduler,
            meshes,
            pipeline,
            uniforms,
            swapchains,
            context,
            ..
        } = self;

        let status = scheduler.draw(context, swapchains, window, |target, rendering| {
            uniforms.update(target.frame, &TransformUniform::at(seconds, target.extent))?;
            rendering.bind_pipeline(pipeline.handle());
            rendering.bind_descriptor_sets(pipeline.layout(), &[uniforms.descriptor_set(target.frame)]);
            for mesh in meshes.iter() {
                mesh.bind(rendering);
                mesh.draw(rendering);
            }
            Ok(())
        })?;

        if matches!(status, FrameStatus::Recreated | FrameStatus::Skipped) {
            self.rebuild_pipeline_if_needed()?;
        }
        Ok(status)
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// The shared Vulkan context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    // A new swapchain normally keeps its format; rebuild only when it did not
    fn rebuild_pipeline_if_needed(&mut self) -> VulkanResult<()> {
        let format = self.swapchains.current()?.format().format;
        if format == self.pipeline.color_format() {
            return Ok(());
        }
        log::info!(
            "Swapchain format changed {:?} -> {:?}, rebuilding pipeline",
            self.pipeline.color_format(),
            format
        );
        self.pipeline = PipelineBuilder::new(&self.shaders, format)
            .descriptor_set_layout(self.uniforms.layout().handle())
            .build(self.context.device())?;
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log::debug!("Dropping VulkanRenderer");
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait failed during renderer teardown: {}", e);
        }
    }
}
