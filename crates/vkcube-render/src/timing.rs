// SPDX-License-Identifier: CEPL-1.0
//! Adaptive inter-present duration (IPD) for display-timing presents.
//!
//! The controller looks at past presentation timings and moves the target
//! IPD in whole refresh cycles: down one cycle after two seconds of presents
//! that could have gone out earlier, up one cycle when a present lands more
//! than a refresh cycle after its desired time.
use tracing::{debug, info};

pub const MILLION: u64 = 1_000_000;
pub const BILLION: u64 = 1_000_000_000;

/// One entry reported by the presentation engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PastPresentationTiming {
    pub present_id: u32,
    pub desired_present_time: u64,
    pub actual_present_time: u64,
    pub earliest_present_time: u64,
    pub present_margin: u64,
}

/// Hint attached to a present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentTime {
    pub present_id: u32,
    pub desired_present_time: u64,
}

/// Net effect of one [`PresentTimer::update_target_ipd`] pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpdAdjustment {
    None,
    /// First samples for this swapchain; clocks were synced, nothing adjusted.
    Synced,
    Faster,
    Slower,
}

fn actual_time_late(desired: u64, actual: u64, refresh: u64) -> bool {
    if actual <= desired {
        return false;
    }
    actual > desired.saturating_add(refresh)
}

fn can_present_earlier(earliest: u64, actual: u64, margin: u64) -> bool {
    earliest < actual && actual - earliest >= 2 * MILLION && margin >= 2 * MILLION
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentTimer {
    refresh_duration: u64,
    multiplier: u64,
    target_ipd: u64,
    prev_desired_present_time: u64,
    next_present_id: u32,
    last_early_id: u32,
    last_late_id: u32,
    synced: bool,
}

impl PresentTimer {
    pub fn new(refresh_duration: u64) -> Self {
        Self {
            refresh_duration,
            multiplier: 1,
            target_ipd: refresh_duration,
            prev_desired_present_time: 0,
            next_present_id: 1,
            last_early_id: 0,
            last_late_id: 0,
            synced: false,
        }
    }

    pub fn refresh_duration(&self) -> u64 {
        self.refresh_duration
    }
    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }
    pub fn target_ipd(&self) -> u64 {
        self.target_ipd
    }
    pub fn prev_desired_present_time(&self) -> u64 {
        self.prev_desired_present_time
    }
    pub fn next_present_id(&self) -> u32 {
        self.next_present_id
    }
    pub fn last_early_id(&self) -> u32 {
        self.last_early_id
    }
    pub fn last_late_id(&self) -> u32 {
        self.last_late_id
    }
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Fold a batch of past timings into the target IPD.
    pub fn update_target_ipd(&mut self, past: &[PastPresentationTiming]) -> IpdAdjustment {
        let Some(last) = past.last() else {
            return IpdAdjustment::None;
        };

        let mut early = false;
        let mut late = false;
        let mut calibrate_next = false;
        let mut just_synced = false;

        for sample in past {
            if !self.synced {
                // Everything still queued was timed against a guess; treat
                // it as already flagged late.
                calibrate_next = true;
                self.last_late_id = self.next_present_id.wrapping_sub(1);
                self.last_early_id = 0;
                self.synced = true;
                just_synced = true;
                break;
            } else if can_present_earlier(
                sample.earliest_present_time,
                sample.actual_present_time,
                sample.present_margin,
            ) {
                if self.last_early_id == sample.present_id {
                    early = true;
                    self.last_early_id = 0;
                } else if self.last_early_id == 0 {
                    // The window end is counted in presents at the current
                    // target IPD, which this pass may itself change.
                    let presents = (2 * BILLION) / self.target_ipd.max(1);
                    self.last_early_id = sample.present_id.wrapping_add(presents as u32);
                }
                late = false;
                self.last_late_id = 0;
            } else if actual_time_late(
                sample.desired_present_time,
                sample.actual_present_time,
                self.refresh_duration,
            ) {
                if self.last_late_id == 0 || self.last_late_id < sample.present_id {
                    late = true;
                    self.last_late_id = self.next_present_id.wrapping_sub(1);
                }
                early = false;
                self.last_early_id = 0;
            } else {
                early = false;
                late = false;
                calibrate_next = true;
                self.last_early_id = 0;
                self.last_late_id = 0;
            }
        }

        let mut adjustment = if just_synced {
            IpdAdjustment::Synced
        } else {
            IpdAdjustment::None
        };
        if early {
            self.multiplier = self.multiplier.saturating_sub(1).max(1);
            self.target_ipd = self.refresh_duration * self.multiplier;
            adjustment = IpdAdjustment::Faster;
            info!(
                multiplier = self.multiplier,
                target_ipd = self.target_ipd,
                "presents early, raising frame rate"
            );
        }
        if late {
            self.multiplier += 1;
            self.target_ipd = self.refresh_duration * self.multiplier;
            adjustment = IpdAdjustment::Slower;
            info!(
                multiplier = self.multiplier,
                target_ipd = self.target_ipd,
                "presents late, lowering frame rate"
            );
        }

        if calibrate_next {
            let presents_since = i64::from(self.next_present_id) - i64::from(last.present_id);
            let offset = presents_since.wrapping_mul(self.target_ipd as i64);
            self.prev_desired_present_time = last.actual_present_time.wrapping_add_signed(offset);
            debug!(
                prev_desired = self.prev_desired_present_time,
                "recalibrated against actual present time"
            );
        }

        adjustment
    }

    /// Desired time for the next present. `now` is the presentation clock;
    /// when it is unknown on the first present no desired time is given.
    pub fn next_present_time(&mut self, now: Option<u64>) -> PresentTime {
        let desired = if self.prev_desired_present_time == 0 {
            now.map_or(0, |t| t + (self.target_ipd >> 1))
        } else {
            self.prev_desired_present_time + self.target_ipd
        };
        let present_id = self.next_present_id;
        self.next_present_id = self.next_present_id.wrapping_add(1);
        self.prev_desired_present_time = desired;
        PresentTime {
            present_id,
            desired_present_time: desired,
        }
    }
}
