//! The model-view matrix stack and projection state shared by one frame.
//!
//! A [`RenderContext`] is created once by the app and passed by `&mut` into every
//! render call. It holds:
//!
//! - the **current model-view matrix** and a LIFO stack of saved matrices
//! - the **current projection matrix**
//! - the identity of the camera whose view is loaded ([`RenderContext::view_owner`])
//!
//! # Push / pop discipline
//!
//! Every push must be matched by a pop within the same frame. Prefer
//! [`RenderContext::scope`], which returns a guard that restores the saved matrix
//! when dropped, so early returns through `?` cannot leak a transform:
//!
//! ```
//! use stackview::{RenderContext, Vec3};
//!
//! let mut ctx = RenderContext::new();
//! {
//!     let mut scope = ctx.scope();
//!     scope.translate(Vec3::new(0.0, 0.5, -7.0));
//!     assert_eq!(scope.depth(), 1);
//! }
//! assert_eq!(ctx.depth(), 0);
//! ```

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Vec3};

use crate::backend::BackendError;
use crate::camera::CameraId;
use crate::mesh::MeshError;

/// Errors that abort the frame being rendered.
///
/// All of these indicate a programming defect rather than a transient condition,
/// so callers should log them and drop the frame, never retry.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// `pop_matrix` was called with nothing on the stack.
    #[error("invalid pop_matrix: the matrix stack is empty")]
    UnbalancedPop,
    /// A frame finished with matrices still pushed.
    #[error("frame finished with {depth} matrices still on the stack")]
    UnbalancedFrame { depth: usize },
    /// A [`MatrixScope`] closed with a different stack depth than it opened with.
    #[error("matrix scope opened at depth {expected} closed at depth {found}")]
    UnbalancedScope { expected: usize, found: usize },
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Matrix state for a single render thread.
#[derive(Debug)]
pub struct RenderContext {
    current: Mat4,
    stack: Vec<Mat4>,
    projection: Mat4,
    view_owner: Option<CameraId>,
    /// First scope imbalance seen this frame, as `(expected, found)` depths.
    scope_fault: Option<(usize, usize)>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            current: Mat4::IDENTITY,
            stack: Vec::new(),
            projection: Mat4::IDENTITY,
            view_owner: None,
            scope_fault: None,
        }
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current model-view matrix.
    pub fn model_view(&self) -> Mat4 {
        self.current
    }

    /// The current projection matrix.
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Number of matrices saved on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The camera whose view matrix was last loaded, if any.
    pub fn view_owner(&self) -> Option<CameraId> {
        self.view_owner
    }

    /// Saves a copy of the current matrix on the stack.
    pub fn push_matrix(&mut self) {
        self.stack.push(self.current);
    }

    /// Restores the most recently saved matrix.
    ///
    /// Popping an empty stack means push/pop calls are mismatched somewhere in the
    /// frame, so it fails instead of falling back to identity.
    pub fn pop_matrix(&mut self) -> Result<(), RenderError> {
        self.current = self.stack.pop().ok_or(RenderError::UnbalancedPop)?;
        Ok(())
    }

    /// Clears the stack and loads `matrix` as the current model-view.
    ///
    /// Only camera activation should call this.
    pub(crate) fn reset_with_matrix(&mut self, matrix: Mat4, owner: CameraId) {
        self.stack.clear();
        self.current = matrix;
        self.view_owner = Some(owner);
    }

    /// Replaces the current model-view without touching the stack.
    pub(crate) fn load_view(&mut self, matrix: Mat4, owner: CameraId) {
        self.current = matrix;
        self.view_owner = Some(owner);
    }

    pub(crate) fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Right-multiplies `matrix` into the current model-view.
    pub fn multiply(&mut self, matrix: Mat4) {
        self.current *= matrix;
    }

    /// Right-multiplies a translation into the current model-view.
    pub fn translate(&mut self, offset: Vec3) {
        self.multiply(Mat4::from_translation(offset));
    }

    /// Pushes the current matrix and returns a guard that pops it on drop.
    pub fn scope(&mut self) -> MatrixScope<'_> {
        self.push_matrix();
        let depth = self.stack.len();
        MatrixScope { ctx: self, depth }
    }

    /// Forgets a scope imbalance left over from a frame that was aborted early.
    pub fn begin_frame(&mut self) {
        self.scope_fault = None;
    }

    /// Checks that every push of the frame was popped.
    ///
    /// A scope that closed unbalanced fails the frame even though its guard
    /// already restored the stack.
    pub fn finish_frame(&mut self) -> Result<(), RenderError> {
        if let Some((expected, found)) = self.scope_fault.take() {
            return Err(RenderError::UnbalancedScope { expected, found });
        }
        match self.stack.len() {
            0 => Ok(()),
            depth => Err(RenderError::UnbalancedFrame { depth }),
        }
    }

    fn record_scope_fault(&mut self, expected: usize, found: usize) {
        self.scope_fault.get_or_insert((expected, found));
    }
}

/// Guard returned by [`RenderContext::scope`].
///
/// Dereferences to the context. On drop it discards anything pushed inside the
/// scope and restores the matrix that was current when the scope opened. An
/// imbalance inside the scope is recorded and reported by
/// [`RenderContext::finish_frame`].
pub struct MatrixScope<'a> {
    ctx: &'a mut RenderContext,
    depth: usize,
}

impl Deref for MatrixScope<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &RenderContext {
        self.ctx
    }
}

impl DerefMut for MatrixScope<'_> {
    fn deref_mut(&mut self) -> &mut RenderContext {
        self.ctx
    }
}

impl Drop for MatrixScope<'_> {
    fn drop(&mut self) {
        let found = self.ctx.stack.len();
        if found < self.depth {
            tracing::error!(
                expected = self.depth,
                found,
                "matrix scope closed after its saved matrix was already popped"
            );
            self.ctx.record_scope_fault(self.depth, found);
            return;
        }
        if found > self.depth {
            tracing::warn!(
                leaked = found - self.depth,
                "matrix scope closed with unpopped matrices"
            );
            self.ctx.record_scope_fault(self.depth, found);
            self.ctx.stack.truncate(self.depth);
        }
        if let Some(saved) = self.ctx.stack.pop() {
            self.ctx.current = saved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> Mat4 {
        Mat4::from_rotation_y(0.3) * Mat4::from_translation(Vec3::new(1.25, -2.0, 0.1))
    }

    #[test]
    fn push_then_pop_restores_bit_identical_matrix() {
        let mut ctx = RenderContext::new();
        ctx.multiply(sample_matrix());
        let before = ctx.model_view();

        ctx.push_matrix();
        ctx.pop_matrix().unwrap();

        assert_eq!(ctx.model_view().to_cols_array(), before.to_cols_array());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn pop_restores_matrix_after_mutation() {
        let mut ctx = RenderContext::new();
        ctx.multiply(sample_matrix());
        let before = ctx.model_view();

        ctx.push_matrix();
        ctx.translate(Vec3::new(0.0, 0.5, -7.0));
        assert_ne!(ctx.model_view(), before);
        ctx.pop_matrix().unwrap();

        assert_eq!(ctx.model_view(), before);
    }

    #[test]
    fn pop_on_empty_stack_is_an_error() {
        let mut ctx = RenderContext::new();
        ctx.translate(Vec3::X);
        let before = ctx.model_view();

        let err = ctx.pop_matrix().unwrap_err();
        assert!(matches!(err, RenderError::UnbalancedPop));
        // The current matrix is left untouched rather than reset to identity.
        assert_eq!(ctx.model_view(), before);
    }

    #[test]
    fn multiply_applies_on_the_right() {
        let mut ctx = RenderContext::new();
        let a = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let b = Mat4::from_rotation_z(1.0);
        ctx.multiply(a);
        ctx.multiply(b);
        assert_eq!(ctx.model_view(), a * b);
    }

    #[test]
    fn reset_clears_stack_and_loads_matrix() {
        let mut ctx = RenderContext::new();
        ctx.push_matrix();
        ctx.push_matrix();
        let owner = CameraId::next();
        ctx.reset_with_matrix(sample_matrix(), owner);

        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.model_view(), sample_matrix());
        assert_eq!(ctx.view_owner(), Some(owner));
    }

    #[test]
    fn scope_restores_on_drop() {
        let mut ctx = RenderContext::new();
        let before = ctx.model_view();
        {
            let mut scope = ctx.scope();
            scope.translate(Vec3::new(3.0, 0.0, 0.0));
            assert_eq!(scope.depth(), 1);
        }
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.model_view(), before);
    }

    #[test]
    fn scope_restores_on_early_return() {
        fn failing_draw(ctx: &mut RenderContext) -> Result<(), RenderError> {
            let mut scope = ctx.scope();
            scope.translate(Vec3::Y);
            if scope.depth() == 1 {
                return Err(RenderError::UnbalancedFrame { depth: 99 });
            }
            Ok(())
        }

        let mut ctx = RenderContext::new();
        assert!(failing_draw(&mut ctx).is_err());
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.model_view(), Mat4::IDENTITY);
    }

    #[test]
    fn leaked_inner_pushes_fail_the_frame() {
        fn leaking_draw(ctx: &mut RenderContext) {
            let mut scope = ctx.scope();
            scope.push_matrix();
            scope.push_matrix();
            scope.translate(Vec3::Z);
        }

        let mut ctx = RenderContext::new();
        leaking_draw(&mut ctx);

        // The guard still restores the stack for whatever runs next.
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.model_view(), Mat4::IDENTITY);
        assert!(matches!(
            ctx.finish_frame(),
            Err(RenderError::UnbalancedScope { expected: 1, found: 3 })
        ));
        assert!(ctx.finish_frame().is_ok());
    }

    #[test]
    fn popping_the_scope_matrix_fails_the_frame() {
        fn over_popping_draw(ctx: &mut RenderContext) -> Result<(), RenderError> {
            let mut scope = ctx.scope();
            scope.translate(Vec3::X);
            scope.pop_matrix()?;
            Ok(())
        }

        let mut ctx = RenderContext::new();
        assert!(over_popping_draw(&mut ctx).is_ok());
        assert_eq!(ctx.depth(), 0);
        assert!(matches!(
            ctx.finish_frame(),
            Err(RenderError::UnbalancedScope { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn begin_frame_discards_fault_from_aborted_frame() {
        let mut ctx = RenderContext::new();
        {
            let mut scope = ctx.scope();
            scope.push_matrix();
        }
        ctx.begin_frame();
        assert!(ctx.finish_frame().is_ok());
    }

    #[test]
    fn finish_frame_reports_unbalanced_depth() {
        let mut ctx = RenderContext::new();
        assert!(ctx.finish_frame().is_ok());
        ctx.push_matrix();
        assert!(matches!(
            ctx.finish_frame(),
            Err(RenderError::UnbalancedFrame { depth: 1 })
        ));
    }
}
