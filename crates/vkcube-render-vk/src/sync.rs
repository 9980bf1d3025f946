// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use vkcube_render::FRAME_LAG;

/// One fence and one semaphore chain per FRAME_LAG slot. The ownership
/// semaphores exist only when graphics and present families differ.
pub(crate) struct FrameSync {
    pub fences: [vk::Fence; FRAME_LAG],
    pub image_acquired: [vk::Semaphore; FRAME_LAG],
    pub draw_complete: [vk::Semaphore; FRAME_LAG],
    pub ownership_released: Option<[vk::Semaphore; FRAME_LAG]>,
}

unsafe fn semaphores(device: &ash::Device) -> Result<[vk::Semaphore; FRAME_LAG]> {
    let ci = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    let mut out = [vk::Semaphore::null(); FRAME_LAG];
    for s in &mut out {
        *s = device.create_semaphore(&ci, None).context("create_semaphore")?;
    }
    Ok(out)
}

impl FrameSync {
    /// Fences start signaled so the first wait on each slot returns.
    pub(crate) unsafe fn new(device: &ash::Device, separate: bool) -> Result<Self> {
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let mut fences = [vk::Fence::null(); FRAME_LAG];
        for f in &mut fences {
            *f = device.create_fence(&fence_ci, None).context("create_fence")?;
        }
        Ok(Self {
            fences,
            image_acquired: semaphores(device)?,
            draw_complete: semaphores(device)?,
            ownership_released: if separate {
                Some(semaphores(device)?)
            } else {
                None
            },
        })
    }

    pub(crate) unsafe fn wait(&self, device: &ash::Device, slot: usize) -> Result<()> {
        let fence = [self.fences[slot]];
        device.wait_for_fences(&fence, true, u64::MAX)?;
        device.reset_fences(&fence)?;
        Ok(())
    }

    /// Wait for every slot's fence, then destroy the whole set.
    pub(crate) unsafe fn drain(self, device: &ash::Device) -> Result<()> {
        device
            .wait_for_fences(&self.fences, true, u64::MAX)
            .context("wait_for_fences(all)")?;
        for slot in 0..FRAME_LAG {
            device.destroy_fence(self.fences[slot], None);
            device.destroy_semaphore(self.image_acquired[slot], None);
            device.destroy_semaphore(self.draw_complete[slot], None);
            if let Some(owned) = &self.ownership_released {
                device.destroy_semaphore(owned[slot], None);
            }
        }
        Ok(())
    }
}
