//! Subpasses and the pipeline that runs them over a render target.
//!
//! [`RenderPipeline::draw`] records, in order:
//!
//! 1. layout transitions of every attachment into attachment layouts
//! 2. a dynamic-rendering scope over the whole target (attachments cleared)
//! 3. each [`Subpass`] in insertion order
//! 4. a transition of the output image into the pipeline's final layout
//!    (`PRESENT_SRC_KHR` by default, `TRANSFER_SRC_OPTIMAL` for readback)

use ash::vk;
use tracing::warn;

use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::image::{Image, aspect_for_format, is_depth_format};

use crate::error::RenderResult;
use crate::render_target::RenderTarget;

/// One step of a [`RenderPipeline`], recorded inside its rendering scope.
pub trait Subpass: Send {
    fn name(&self) -> &str {
        "subpass"
    }

    fn draw(&mut self, command_buffer: &CommandBuffer, target: &RenderTarget) -> RenderResult<()>;
}

/// Clears every color attachment to one color.
pub struct ClearSubpass {
    color: [f32; 4],
}

impl ClearSubpass {
    pub fn new(color: [f32; 4]) -> Self {
        Self { color }
    }
}

impl Subpass for ClearSubpass {
    fn name(&self) -> &str {
        "clear"
    }

    fn draw(&mut self, command_buffer: &CommandBuffer, target: &RenderTarget) -> RenderResult<()> {
        let attachments: Vec<vk::ClearAttachment> = (0..target.color_formats().len() as u32)
            .map(|i| vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: i,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue { float32: self.color },
                },
            })
            .collect();

        let rect = vk::ClearRect {
            rect: full_rect(target.extent()),
            base_array_layer: 0,
            layer_count: 1,
        };
        command_buffer.clear_attachments(&attachments, &[rect]);
        Ok(())
    }
}

/// Ordered subpasses sharing one rendering scope.
pub struct RenderPipeline {
    subpasses: Vec<Box<dyn Subpass>>,
    clear_color: [f32; 4],
    final_layout: vk::ImageLayout,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self {
            subpasses: Vec::new(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    pub fn add_subpass(&mut self, subpass: Box<dyn Subpass>) {
        self.subpasses.push(subpass);
    }

    pub fn with_subpass(mut self, subpass: impl Subpass + 'static) -> Self {
        self.add_subpass(Box::new(subpass));
        self
    }

    /// Color the attachments are cleared to when the scope opens.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Layout the output image is left in.
    pub fn set_final_layout(&mut self, layout: vk::ImageLayout) {
        self.final_layout = layout;
    }

    #[inline]
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    /// Records the whole pipeline into `command_buffer`, which must be
    /// recording and outside any rendering scope.
    pub fn draw(&mut self, command_buffer: &CommandBuffer, target: &RenderTarget) -> RenderResult<()> {
        for image in target.images() {
            transition(
                command_buffer,
                image,
                vk::ImageLayout::UNDEFINED,
                attachment_layout(image.format()),
            );
        }

        let clear_color = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = target
            .color_attachments()
            .map(|i| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(target.views()[i].handle())
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_color)
            })
            .collect();
        let depth_attachment = target.depth_attachment().map(|i| {
            vk::RenderingAttachmentInfo::default()
                .image_view(target.views()[i].handle())
                .image_layout(attachment_layout(target.images()[i].format()))
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                })
        });

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(full_rect(target.extent()))
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        command_buffer.begin_rendering(&rendering_info);

        let extent = target.extent();
        command_buffer.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        command_buffer.set_scissor(&full_rect(extent));

        for subpass in &mut self.subpasses {
            subpass.draw(command_buffer, target)?;
        }

        command_buffer.end_rendering();

        transition(
            command_buffer,
            target.output(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            self.final_layout,
        );

        Ok(())
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Layout an image of `format` is rendered in.
pub fn attachment_layout(format: vk::Format) -> vk::ImageLayout {
    if !is_depth_format(format) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if aspect_for_format(format).contains(vk::ImageAspectFlags::STENCIL) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
    }
}

/// Stage and access masks `(src_stage, src_access, dst_stage, dst_access)`
/// for a layout transition.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (
    vk::PipelineStageFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::AccessFlags,
) {
    use vk::ImageLayout as L;

    match (old_layout, new_layout) {
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL | L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
        ),
        _ => {
            warn!(
                "Unhandled layout transition: {:?} -> {:?}",
                old_layout, new_layout
            );
            (
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            )
        }
    }
}

/// Records a whole-image layout transition.
pub fn transition(
    command_buffer: &CommandBuffer,
    image: &Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access, dst_stage, dst_access) = transition_masks(old_layout, new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.handle())
        .subresource_range(image.subresource_range())
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    command_buffer.pipeline_barrier(src_stage, dst_stage, &[barrier]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_layouts() {
        assert_eq!(
            attachment_layout(vk::Format::B8G8R8A8_SRGB),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            attachment_layout(vk::Format::D32_SFLOAT),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            attachment_layout(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_present_transition_waits_on_color_output() {
        let (src_stage, src_access, dst_stage, _) = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert_eq!(src_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_readback_transition_targets_transfer() {
        let (_, _, dst_stage, dst_access) = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_READ);
    }

    #[test]
    fn test_unknown_transition_is_conservative() {
        let (src_stage, _, dst_stage, _) = transition_masks(
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(src_stage, vk::PipelineStageFlags::ALL_COMMANDS);
        assert_eq!(dst_stage, vk::PipelineStageFlags::ALL_COMMANDS);
    }

    #[test]
    fn test_pipeline_collects_subpasses() {
        let pipeline = RenderPipeline::new()
            .with_subpass(ClearSubpass::new([1.0, 0.0, 0.0, 1.0]))
            .with_subpass(ClearSubpass::new([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(pipeline.subpass_count(), 2);
        assert_eq!(pipeline.subpasses[0].name(), "clear");
    }
}
