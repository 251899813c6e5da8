//! Error Types
//!
//! This module defines the error types used throughout the batch collector.
//!
//! # Overview
//!
//! The per-frame hot path never fails: dropped drawables, lights without
//! contribution and soft-limit overflows are policy decisions that are logged
//! and skipped. [`BatchError`] therefore only covers the setup surface:
//! - Settings parsing and validation
//! - Scene index bookkeeping
//! - Shadow atlas requests that can never be satisfied
//! - Worker pool construction
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_batch::errors::{BatchError, Result};
//!
//! fn load_settings(json: &str) -> Result<RenderPipelineSettings> {
//!     RenderPipelineSettings::from_json(json)
//! }
//! ```

use thiserror::Error;

/// The main error type for the batch collector.
#[derive(Error, Debug)]
pub enum BatchError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings document could not be parsed.
    #[error("Invalid settings document: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// A settings field holds a value the renderer cannot honor.
    #[error("Invalid settings value: {0}")]
    InvalidSettingsValue(String),

    // ========================================================================
    // Scene Errors
    // ========================================================================
    /// The drawable is not registered in the spatial index.
    #[error("Drawable {id} is not registered in the scene index")]
    DrawableNotFound {
        /// Unique identifier of the drawable
        id: u64,
    },

    // ========================================================================
    // Shadow Map Errors
    // ========================================================================
    /// Requested shadow map region does not fit into a single atlas page.
    #[error("Shadow map {width}x{height} exceeds atlas page size {page_size}")]
    ShadowMapTooLarge {
        /// Requested width in texels
        width: i32,
        /// Requested height in texels
        height: i32,
        /// Atlas page edge length in texels
        page_size: u32,
    },

    // ========================================================================
    // Threading Errors
    // ========================================================================
    /// The worker thread pool could not be created.
    #[error("Failed to build worker thread pool: {0}")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Alias for `Result<T, BatchError>`.
pub type Result<T> = std::result::Result<T, BatchError>;
