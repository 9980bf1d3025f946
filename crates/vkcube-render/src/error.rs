// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

/// Outcome of a successful acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// The image is still presentable but the swapchain no longer matches
    /// the surface exactly.
    Suboptimal,
}

/// Failures the frame loop knows how to recover from, plus everything else.
#[derive(Debug, Error)]
pub enum SwapchainError {
    #[error("swapchain is out of date")]
    OutOfDate,
    #[error("surface lost")]
    SurfaceLost,
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}
