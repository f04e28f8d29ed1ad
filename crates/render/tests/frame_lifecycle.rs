//! Headless frame lifecycle tests. Skipped when no Vulkan device is present.

mod common;

use std::sync::Arc;

use vkframe_render::{ClearSubpass, RenderError, RenderPipeline, RenderTarget};
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::ResetMode;
use vkframe_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout, write_buffer};
use vkframe_rhi::device::Device;
use vkframe_rhi::image::Image;
use vkframe_rhi::vk;
use vkframe_rhi::{RhiError, RhiResult};

fn color_only(_: &Arc<Device>, output: Image) -> RhiResult<RenderTarget> {
    RenderTarget::new(vec![output])
}

#[test]
fn test_begin_end_advances_active_frame() {
    let Some(mut harness) = common::headless(common::settings(3)) else {
        return;
    };
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");
    assert_eq!(context.frames().len(), 3);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let semaphore = context.begin_frame().expect("begin_frame");
        assert_eq!(semaphore, vk::Semaphore::null());
        seen.push(context.active_frame_index());
        context.end_frame(vk::Semaphore::null()).expect("end_frame");
    }

    assert_eq!(seen, vec![0, 1, 2, 0]);
    assert_eq!(context.active_frame_index(), 1);
    assert!(context.get_last_rendered_frame().is_ok());
}

#[test]
fn test_frame_state_preconditions() {
    let Some(mut harness) = common::headless(common::settings(2)) else {
        return;
    };
    let context = &mut harness.context;

    // Nothing can start before prepare
    assert!(matches!(
        context.begin_frame(),
        Err(RenderError::Precondition(_))
    ));

    context.prepare(1, color_only).expect("prepare");
    assert!(matches!(
        context.get_active_frame(),
        Err(RenderError::Precondition(_))
    ));
    assert!(matches!(
        context.get_last_rendered_frame(),
        Err(RenderError::Precondition(_))
    ));
    assert!(matches!(
        context.end_frame(vk::Semaphore::null()),
        Err(RenderError::Precondition(_))
    ));

    context.begin_frame().expect("begin_frame");
    assert!(context.get_active_frame().is_ok());
    assert!(matches!(
        context.begin_frame(),
        Err(RenderError::Precondition(_))
    ));
    assert!(matches!(context.recreate(), Err(RenderError::Precondition(_))));
    assert!(matches!(
        context.get_last_rendered_frame(),
        Err(RenderError::Precondition(_))
    ));
    context.end_frame(vk::Semaphore::null()).expect("end_frame");

    // Headless contexts have no swapchain to update
    assert!(matches!(
        context.update_swapchain_image_count(3),
        Err(RenderError::Precondition(_))
    ));
}

#[test]
fn test_preferences_are_ignored_after_prepare() {
    let Some(mut harness) = common::headless(common::settings(1)) else {
        return;
    };
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");

    context.request_present_mode(vk::PresentModeKHR::MAILBOX);
    assert_eq!(context.settings().present_mode, None);
}

#[test]
fn test_command_buffer_records_again_after_frame_reset() {
    let Some(mut harness) = common::headless(common::settings(1)) else {
        return;
    };
    let device = harness.device.clone();
    let queue = device.suitable_graphics_queue().expect("graphics queue");
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");

    context.begin_frame().expect("begin_frame");
    let first = context
        .request_frame_command_buffer(queue, ResetMode::ResetPool, vk::CommandBufferLevel::PRIMARY, 0)
        .expect("command buffer");
    first.begin().expect("begin");
    first.end().expect("end");
    context
        .submit_fenced(queue, &[first.handle()])
        .expect("submit");
    assert_eq!(context.get_active_frame().unwrap().active_fences(), 1);
    context.end_frame(vk::Semaphore::null()).expect("end_frame");

    // Single frame ring: the same frame comes back and is reset after its fence
    context.begin_frame().expect("begin_frame");
    assert_eq!(context.get_active_frame().unwrap().active_fences(), 0);
    let second = context
        .request_frame_command_buffer(queue, ResetMode::ResetPool, vk::CommandBufferLevel::PRIMARY, 0)
        .expect("command buffer");
    assert_eq!(second.handle(), first.handle());
    second.begin().expect("begin after reset");
    second.end().expect("end after reset");
    context
        .submit_fenced(queue, &[second.handle()])
        .expect("submit");
    context.end_frame(vk::Semaphore::null()).expect("end_frame");
}

#[test]
fn test_reset_mode_switch_recreates_pool() {
    let Some(mut harness) = common::headless(common::settings(1)) else {
        return;
    };
    let device = harness.device.clone();
    let queue = device.suitable_graphics_queue().expect("graphics queue");
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");
    context.begin_frame().expect("begin_frame");

    for mode in [ResetMode::ResetPool, ResetMode::ResetIndividually, ResetMode::AlwaysAllocate] {
        let cmd = context
            .request_frame_command_buffer(queue, mode, vk::CommandBufferLevel::PRIMARY, 0)
            .expect("command buffer");
        cmd.begin().expect("begin");
        cmd.end().expect("end");
    }

    let frame = context.get_active_frame_mut().unwrap();
    // Only the pool of the last mode survives
    assert_eq!(frame.thread(0).unwrap().active_command_buffers(), 1);

    assert!(matches!(
        context.request_frame_command_buffer(queue, ResetMode::ResetPool, vk::CommandBufferLevel::PRIMARY, 4),
        Err(RenderError::InvalidPoolIndex { index: 4, count: 1 })
    ));
    context.end_frame(vk::Semaphore::null()).expect("end_frame");
}

#[test]
fn test_frame_buffer_and_descriptor_pools() {
    let Some(mut harness) = common::headless(common::settings(1)) else {
        return;
    };
    let device = harness.device.clone();
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");

    let layout = DescriptorSetLayout::new(
        device.clone(),
        &[DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX)],
    )
    .expect("layout");
    let alignment = device.limits().min_uniform_buffer_offset_alignment.max(1);

    context.begin_frame().expect("begin_frame");
    {
        let frame = context.get_active_frame_mut().unwrap();
        let a = frame.allocate_buffer(BufferUsage::Uniform, 64, 0).expect("allocate");
        let b = frame.allocate_buffer(BufferUsage::Uniform, 64, 0).expect("allocate");
        assert_eq!(a.buffer(), b.buffer());
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset() % alignment, 0);
        assert!(b.offset() >= 64);
        a.update_pod(&[1.0f32; 16]).expect("update");
        assert!(a.update(&[0u8; 65]).is_err());

        let set = frame.request_descriptor_set(&layout, 0).expect("descriptor set");
        write_buffer(&device, set, 0, vk::DescriptorType::UNIFORM_BUFFER, &a.descriptor_info());
        assert_eq!(frame.thread(0).unwrap().allocated_descriptor_sets(), 1);

        assert!(matches!(
            frame.allocate_buffer(BufferUsage::Staging, 16, 0),
            Err(RenderError::UnsupportedBufferUsage(BufferUsage::Staging))
        ));
        assert!(matches!(
            frame.allocate_buffer(BufferUsage::Uniform, 16, 1),
            Err(RenderError::InvalidPoolIndex { index: 1, count: 1 })
        ));
    }
    context.end_frame(vk::Semaphore::null()).expect("end_frame");

    // Next cycle of the same frame starts from a rewound pool
    context.begin_frame().expect("begin_frame");
    let frame = context.get_active_frame_mut().unwrap();
    let c = frame.allocate_buffer(BufferUsage::Uniform, 64, 0).expect("allocate");
    assert_eq!(c.offset(), 0);
    assert_eq!(frame.thread(0).unwrap().allocated_descriptor_sets(), 0);
    context.end_frame(vk::Semaphore::null()).expect("end_frame");
}

#[test]
fn test_semaphores_are_recycled_with_the_frame() {
    let Some(mut harness) = common::headless(common::settings(1)) else {
        return;
    };
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");

    context.begin_frame().expect("begin_frame");
    let first = context.request_semaphore().expect("semaphore");
    assert_ne!(first, vk::Semaphore::null());
    assert_eq!(context.get_active_frame().unwrap().active_semaphores(), 1);
    context.end_frame(vk::Semaphore::null()).expect("end_frame");

    context.begin_frame().expect("begin_frame");
    assert_eq!(context.get_active_frame().unwrap().active_semaphores(), 0);
    assert_eq!(context.request_semaphore().expect("semaphore"), first);
    context.end_frame(vk::Semaphore::null()).expect("end_frame");
}

#[test]
fn test_worker_threads_record_into_their_own_pools() {
    let Some(mut harness) = common::headless(common::settings(1)) else {
        return;
    };
    let device = harness.device.clone();
    let queue = device.suitable_graphics_queue().expect("graphics queue");
    let family = queue.family_index();
    let context = &mut harness.context;
    context.prepare(2, color_only).expect("prepare");

    context.begin_frame().expect("begin_frame");
    let frame = context.get_active_frame_mut().unwrap();
    assert_eq!(frame.pools_per_frame(), 2);

    let buffers: Vec<vk::CommandBuffer> = std::thread::scope(|scope| {
        let handles: Vec<_> = frame
            .threads_mut()
            .iter_mut()
            .map(|thread| {
                scope.spawn(move || {
                    let cmd = thread
                        .request_command_buffer(family, ResetMode::ResetPool, vk::CommandBufferLevel::PRIMARY)
                        .expect("command buffer");
                    cmd.begin().expect("begin");
                    cmd.end().expect("end");
                    cmd.handle()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect()
    });

    assert_eq!(buffers.len(), 2);
    assert_ne!(buffers[0], buffers[1]);
    context.submit_fenced(queue, &buffers).expect("submit");
    context.end_frame(vk::Semaphore::null()).expect("end_frame");
}

#[test]
fn test_recreate_and_prepare_rebuild_frames() {
    let Some(mut harness) = common::headless(common::settings(2)) else {
        return;
    };
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");
    context.begin_frame().expect("begin_frame");
    context.end_frame(vk::Semaphore::null()).expect("end_frame");

    context.recreate().expect("recreate");
    assert_eq!(context.frames().len(), 2);
    assert_eq!(context.active_frame_index(), 1);

    context.prepare(3, vkframe_render::DefaultTargetFactory).expect("prepare again");
    assert_eq!(context.frames().len(), 2);
    assert_eq!(context.active_frame_index(), 0);
    let frame = &context.frames()[0];
    assert_eq!(frame.pools_per_frame(), 3);
    assert_eq!(frame.render_target().images().len(), 2);
    assert!(frame.render_target().depth_attachment().is_some());
}

#[test]
fn test_failed_prepare_leaves_context_unprepared() {
    let Some(mut harness) = common::headless(common::settings(2)) else {
        return;
    };
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");
    assert_eq!(context.frames().len(), 2);

    let rejecting = |_: &Arc<Device>, _: Image| -> RhiResult<RenderTarget> {
        Err(RhiError::InvalidArgument("target rejected".to_string()))
    };
    assert!(context.prepare(1, rejecting).is_err());
    assert!(context.frames().is_empty());

    // The frames are gone, so the context must refuse to run them
    assert!(matches!(
        context.begin_frame(),
        Err(RenderError::Precondition(_))
    ));
    assert!(matches!(context.recreate(), Err(RenderError::Precondition(_))));

    context.prepare(1, color_only).expect("prepare after failure");
    context.begin_frame().expect("begin_frame");
    context.end_frame(vk::Semaphore::null()).expect("end_frame");
}

#[test]
fn test_mapped_buffer_writes_and_bounds() {
    let Some(harness) = common::headless(common::settings(1)) else {
        return;
    };
    let device = harness.device.clone();

    let buffer = Buffer::new(device.clone(), BufferUsage::Staging, 64).expect("buffer");
    buffer.write_data(16, &[1, 2, 3, 4]).expect("write");
    assert_eq!(buffer.read_data(16, 4).expect("read"), vec![1, 2, 3, 4]);

    assert!(matches!(
        buffer.write_data(62, &[0; 4]),
        Err(RhiError::InvalidArgument(_))
    ));
    assert!(matches!(
        buffer.write_data(u64::MAX, &[0]),
        Err(RhiError::InvalidArgument(_))
    ));
    assert!(matches!(
        buffer.read_data(u64::MAX, 2),
        Err(RhiError::InvalidArgument(_))
    ));
    drop(buffer);

    let image = Image::new(
        device,
        "scratch",
        vk::Extent2D {
            width: 4,
            height: 4,
        },
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::COLOR_ATTACHMENT,
    )
    .expect("image");
    assert_eq!(image.extent().width, 4);
}

#[test]
fn test_clear_subpass_reaches_the_output_image() {
    let mut settings = common::settings(1);
    settings.surface_format = Some(vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    });
    let Some(mut harness) = common::headless(settings) else {
        return;
    };
    let device = harness.device.clone();
    let queue = device.suitable_graphics_queue().expect("graphics queue");
    let context = &mut harness.context;
    context.prepare(1, color_only).expect("prepare");
    assert_eq!(context.format(), vk::Format::R8G8B8A8_UNORM);

    let extent = context.surface_extent();
    let size = u64::from(extent.width * extent.height * 4);
    let staging = Buffer::new(device.clone(), BufferUsage::Staging, size).expect("staging buffer");

    let mut pipeline = RenderPipeline::new().with_subpass(ClearSubpass::new([1.0, 0.0, 0.0, 1.0]));
    pipeline.set_final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

    context.begin_frame().expect("begin_frame");
    let cmd = context
        .request_frame_command_buffer(queue, ResetMode::ResetPool, vk::CommandBufferLevel::PRIMARY, 0)
        .expect("command buffer");
    cmd.begin().expect("begin");
    {
        let target = context.get_active_frame().unwrap().render_target();
        pipeline.draw(&cmd, target).expect("draw");

        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        cmd.copy_image_to_buffer(
            target.output().handle(),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            staging.handle(),
            &[region],
        );
    }
    cmd.memory_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::PipelineStageFlags::HOST,
        vk::AccessFlags::HOST_READ,
    );
    cmd.end().expect("end");
    context.submit_fenced(queue, &[cmd.handle()]).expect("submit");
    context.end_frame(vk::Semaphore::null()).expect("end_frame");

    device.wait_idle().expect("wait idle");
    let pixels = staging.read_data(0, size as usize).expect("read back");
    for pixel in pixels.chunks_exact(4) {
        assert_eq!(pixel, [255u8, 0, 0, 255]);
    }
}
