//! Frame orchestration
//!
//! [`FrameRenderer`] owns the swapchain, render pass, pipeline, framebuffers,
//! the per-frame command buffer, and the synchronization bundle, and drives
//! one frame from acquisition through presentation. Swapchain recreation is
//! always deferred to the start of the next tick; a frame that observes a
//! stale swapchain is dropped, not patched mid-flight.

use ash::{vk, Device};

use crate::config::{RendererConfig, ShaderConfig};
use crate::render::frame_data::{MeshPushConstants, SceneUniforms};
use crate::render::uploader::RenderMesh;
use crate::render::vulkan::buffer::UniformBuffer;
use crate::render::vulkan::context::DeviceContext;
use crate::render::vulkan::descriptor::{DescriptorSetLayout, DescriptorSetLayoutBuilder};
use crate::render::vulkan::framebuffer::{DepthBuffer, Framebuffer};
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::{GraphicsPipeline, ShaderModule};
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::window::Window;

/// What image acquisition reported this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready at this index.
    Ready(u32),
    /// The swapchain is stale; nothing was acquired.
    OutOfDate,
}

/// What presentation reported this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation.
    Presented,
    /// Presented, but the swapchain no longer matches the surface.
    Suboptimal,
    /// The swapchain is stale; the image may not have been presented.
    OutOfDate,
}

/// Frame lifecycle states.
///
/// `Idle → Recording → Submitted → Idle` on the happy path; any stale-
/// swapchain signal parks the machine in `NeedsRecreate` until the next tick
/// performs the rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between ticks; ready to acquire.
    Idle,
    /// An image is acquired and commands are being recorded.
    Recording(u32),
    /// Commands are submitted; presentation is pending.
    Submitted(u32),
    /// The swapchain must be rebuilt before the next acquisition.
    NeedsRecreate,
}

/// Pure frame state kernel, separated from the API calls so the transition
/// rules can be exercised directly.
#[derive(Debug)]
pub struct FrameStateMachine {
    phase: FramePhase,
}

impl FrameStateMachine {
    /// Start in `Idle`.
    pub fn new() -> Self {
        Self {
            phase: FramePhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Whether the tick must begin with a swapchain rebuild.
    pub fn needs_recreate(&self) -> bool {
        self.phase == FramePhase::NeedsRecreate
    }

    /// Record a successful swapchain rebuild.
    pub fn on_recreated(&mut self) {
        self.phase = FramePhase::Idle;
    }

    /// Feed the acquisition result; returns the image index to record for,
    /// or `None` when the tick must be skipped.
    pub fn on_acquire(&mut self, outcome: AcquireOutcome) -> VulkanResult<Option<u32>> {
        if self.phase != FramePhase::Idle {
            return Err(VulkanError::InvalidOperation(format!(
                "acquire in phase {:?}",
                self.phase
            )));
        }
        match outcome {
            AcquireOutcome::Ready(index) => {
                self.phase = FramePhase::Recording(index);
                Ok(Some(index))
            }
            AcquireOutcome::OutOfDate => {
                self.phase = FramePhase::NeedsRecreate;
                Ok(None)
            }
        }
    }

    /// Record that the frame's commands were submitted.
    pub fn on_submit(&mut self) -> VulkanResult<u32> {
        match self.phase {
            FramePhase::Recording(index) => {
                self.phase = FramePhase::Submitted(index);
                Ok(index)
            }
            phase => Err(VulkanError::InvalidOperation(format!(
                "submit in phase {phase:?}"
            ))),
        }
    }

    /// Feed the presentation result; stale signals defer recreation to the
    /// start of the next tick.
    pub fn on_present(&mut self, outcome: PresentOutcome) -> VulkanResult<()> {
        if !matches!(self.phase, FramePhase::Submitted(_)) {
            return Err(VulkanError::InvalidOperation(format!(
                "present in phase {:?}",
                self.phase
            )));
        }
        self.phase = match outcome {
            PresentOutcome::Presented => FramePhase::Idle,
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => FramePhase::NeedsRecreate,
        };
        Ok(())
    }

    /// An externally observed resize also invalidates the swapchain.
    pub fn on_resized(&mut self) {
        if self.phase == FramePhase::Idle {
            self.phase = FramePhase::NeedsRecreate;
        }
    }
}

impl Default for FrameStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of the presentation chain and per-frame recording state.
pub struct FrameRenderer {
    device: Device,
    swapchain: Swapchain,
    render_pass: RenderPass,
    descriptor_set_layout: DescriptorSetLayout,
    vertex_shader: ShaderModule,
    fragment_shader: ShaderModule,
    pipeline: GraphicsPipeline,
    depth_buffers: Vec<DepthBuffer>,
    framebuffers: Vec<Framebuffer>,
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
    uniforms: UniformBuffer<SceneUniforms>,
    state: FrameStateMachine,
    clear_color: [f32; 4],
}

impl FrameRenderer {
    /// Build the presentation chain against the device context.
    pub fn new(
        context: &DeviceContext,
        window: &Window,
        config: &RendererConfig,
        shaders: &ShaderConfig,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            context.device().swapchain_loader.clone(),
            device.clone(),
            context.surface(),
            context.surface_loader(),
            context.physical_device(),
            vk::Extent2D { width, height },
        )?;

        let render_pass = RenderPass::new_forward_pass(device.clone(), swapchain.format().format)?;

        let descriptor_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;

        let vertex_shader =
            ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment_shader =
            ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            render_pass.handle(),
            descriptor_set_layout.handle(),
            &vertex_shader,
            &fragment_shader,
            swapchain.extent(),
        )?;

        let (depth_buffers, framebuffers) = Self::build_framebuffers(
            &device,
            context,
            &swapchain,
            &render_pass,
        )?;

        let command_buffer = context
            .command_pool()
            .allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?[0];
        let sync = FrameSync::new(device.clone())?;
        let uniforms = UniformBuffer::new(device.clone(), context.memory_properties())?;

        Ok(Self {
            device,
            swapchain,
            render_pass,
            descriptor_set_layout,
            vertex_shader,
            fragment_shader,
            pipeline,
            depth_buffers,
            framebuffers,
            command_buffer,
            sync,
            uniforms,
            state: FrameStateMachine::new(),
            clear_color: config.clear_color,
        })
    }

    fn build_framebuffers(
        device: &Device,
        context: &DeviceContext,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
    ) -> VulkanResult<(Vec<DepthBuffer>, Vec<Framebuffer>)> {
        let mut depth_buffers = Vec::with_capacity(swapchain.image_count());
        let mut framebuffers = Vec::with_capacity(swapchain.image_count());

        for &image_view in swapchain.image_views() {
            let depth = DepthBuffer::new(
                device.clone(),
                context.memory_properties(),
                swapchain.extent(),
            )?;
            let framebuffer = Framebuffer::new(
                device.clone(),
                render_pass.handle(),
                &[image_view, depth.image_view()],
                swapchain.extent(),
            )?;
            depth_buffers.push(depth);
            framebuffers.push(framebuffer);
        }

        Ok((depth_buffers, framebuffers))
    }

    /// Get the descriptor set layout meshes bind against.
    pub fn descriptor_set_layout(&self) -> &DescriptorSetLayout {
        &self.descriptor_set_layout
    }

    /// Get the shared scene uniform buffer.
    pub fn uniform_buffer(&self) -> &UniformBuffer<SceneUniforms> {
        &self.uniforms
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Mark the swapchain stale after an externally observed resize.
    pub fn note_resized(&mut self) {
        self.state.on_resized();
    }

    /// Drive one frame: recreate if needed, acquire, record, submit, present.
    ///
    /// A stale-swapchain signal drops the frame and schedules recreation for
    /// the next tick; the caller sees `Ok(())` either way.
    pub fn draw_frame(
        &mut self,
        context: &DeviceContext,
        window: &Window,
        uniforms: &SceneUniforms,
        meshes: &[RenderMesh],
    ) -> VulkanResult<()> {
        if self.state.needs_recreate() {
            // Fatal for this frame only; the state stays parked so the next
            // tick retries.
            match self.recreate_swapchain(context, window) {
                Ok(()) => self.state.on_recreated(),
                Err(e) => {
                    log::warn!("swapchain recreation failed: {e}; retrying next frame");
                    return Ok(());
                }
            }
        }

        // One frame in flight: the fence throttles the CPU here until the
        // previous submission retired and the command buffer is reusable.
        self.sync.in_flight.wait(u64::MAX)?;

        let acquire = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                self.sync.image_available.handle(),
                vk::Fence::null(),
            )
        };
        let outcome = match acquire {
            Ok((index, _suboptimal)) => AcquireOutcome::Ready(index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::OutOfDate,
            Err(e) => return Err(VulkanError::Api(e)),
        };
        let Some(image_index) = self.state.on_acquire(outcome)? else {
            log::debug!("swapchain out of date at acquire; dropping frame");
            return Ok(());
        };

        self.uniforms.update(uniforms);

        self.record_commands(image_index, meshes)?;

        self.sync.in_flight.reset()?;
        let wait_semaphores = [self.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [self.sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(
                    context.graphics_queue(),
                    &[submit_info.build()],
                    self.sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }
        self.state.on_submit()?;

        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present = unsafe {
            self.swapchain
                .loader()
                .queue_present(context.present_queue(), &present_info)
        };
        let outcome = match present {
            Ok(false) => PresentOutcome::Presented,
            Ok(true) => PresentOutcome::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentOutcome::OutOfDate,
            Err(e) => return Err(VulkanError::Api(e)),
        };
        if outcome != PresentOutcome::Presented {
            log::debug!("swapchain stale at present; recreating next tick");
        }
        self.state.on_present(outcome)
    }

    /// Record the forward pass for one swapchain image.
    ///
    /// The command buffer is reset in place, never reallocated.
    fn record_commands(&mut self, image_index: u32, meshes: &[RenderMesh]) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;

            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.clear_color,
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            ];
            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.handle())
                .framebuffer(self.framebuffers[image_index as usize].handle())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.swapchain.extent(),
                })
                .clear_values(&clear_values);

            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.handle(),
            );

            for mesh in meshes {
                self.device.cmd_bind_vertex_buffers(
                    self.command_buffer,
                    0,
                    &[mesh.vertex_buffer().handle()],
                    &[0],
                );
                self.device.cmd_bind_index_buffer(
                    self.command_buffer,
                    mesh.index_buffer().handle(),
                    0,
                    vk::IndexType::UINT32,
                );
                self.device.cmd_bind_descriptor_sets(
                    self.command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.layout(),
                    0,
                    &[mesh.descriptor_set()],
                    &[],
                );

                let push = MeshPushConstants::new(&mesh.model);
                self.device.cmd_push_constants(
                    self.command_buffer,
                    self.pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );

                self.device.cmd_draw_indexed(
                    self.command_buffer,
                    mesh.index_buffer().index_count(),
                    1,
                    0,
                    0,
                    0,
                );
            }

            self.device.cmd_end_render_pass(self.command_buffer);
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        Ok(())
    }

    /// Tear down and rebuild everything resolution-bound.
    ///
    /// Waits for the device to go idle first: in-flight command buffers
    /// still reference the old swapchain images. The device context and its
    /// pools are untouched.
    fn recreate_swapchain(&mut self, context: &DeviceContext, window: &Window) -> VulkanResult<()> {
        context.wait_idle()?;

        // Resolution-bound resources referencing the old images go first.
        self.framebuffers.clear();
        self.depth_buffers.clear();

        let (width, height) = window.framebuffer_size();
        self.swapchain.recreate(
            context.surface(),
            context.surface_loader(),
            context.physical_device(),
            vk::Extent2D { width, height },
        )?;

        self.pipeline = GraphicsPipeline::new(
            self.device.clone(),
            self.render_pass.handle(),
            self.descriptor_set_layout.handle(),
            &self.vertex_shader,
            &self.fragment_shader,
            self.swapchain.extent(),
        )?;

        let (depth_buffers, framebuffers) = Self::build_framebuffers(
            &self.device,
            context,
            &self.swapchain,
            &self.render_pass,
        )?;
        self.depth_buffers = depth_buffers;
        self.framebuffers = framebuffers;

        log::info!(
            "swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_acquire_skips_the_tick() {
        let mut machine = FrameStateMachine::new();

        let index = machine.on_acquire(AcquireOutcome::OutOfDate).unwrap();
        assert_eq!(index, None);
        assert_eq!(machine.phase(), FramePhase::NeedsRecreate);

        // No submit or present may happen in this state.
        assert!(machine.on_submit().is_err());
        assert!(machine.on_present(PresentOutcome::Presented).is_err());

        // The next tick must recreate before acquiring again.
        assert!(machine.needs_recreate());
        machine.on_recreated();
        let index = machine.on_acquire(AcquireOutcome::Ready(0)).unwrap();
        assert_eq!(index, Some(0));
    }

    #[test]
    fn happy_path_cycles_back_to_idle() {
        let mut machine = FrameStateMachine::new();

        assert_eq!(
            machine.on_acquire(AcquireOutcome::Ready(2)).unwrap(),
            Some(2)
        );
        assert_eq!(machine.on_submit().unwrap(), 2);
        machine.on_present(PresentOutcome::Presented).unwrap();
        assert_eq!(machine.phase(), FramePhase::Idle);
        assert!(!machine.needs_recreate());
    }

    #[test]
    fn stale_present_defers_recreation_to_next_tick() {
        for outcome in [PresentOutcome::OutOfDate, PresentOutcome::Suboptimal] {
            let mut machine = FrameStateMachine::new();
            machine.on_acquire(AcquireOutcome::Ready(0)).unwrap();
            machine.on_submit().unwrap();
            machine.on_present(outcome).unwrap();
            // The frame already submitted and presented (or tried to); only
            // the next tick starts with a rebuild.
            assert!(machine.needs_recreate());
        }
    }

    #[test]
    fn resize_marks_swapchain_stale_between_ticks() {
        let mut machine = FrameStateMachine::new();
        machine.on_resized();
        assert!(machine.needs_recreate());
    }

    #[test]
    fn resize_mid_frame_does_not_corrupt_the_cycle() {
        let mut machine = FrameStateMachine::new();
        machine.on_acquire(AcquireOutcome::Ready(1)).unwrap();
        machine.on_resized();
        // Still recording; the in-flight frame finishes normally.
        assert_eq!(machine.phase(), FramePhase::Recording(1));
    }

    #[test]
    fn acquire_is_rejected_while_a_frame_is_open() {
        let mut machine = FrameStateMachine::new();
        machine.on_acquire(AcquireOutcome::Ready(0)).unwrap();
        assert!(machine.on_acquire(AcquireOutcome::Ready(1)).is_err());
    }
}
