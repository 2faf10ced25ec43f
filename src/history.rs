//! Paint history: committed/redo stacks and the pending slot.
//!
//! The ordered-annotation lifecycle lives here. Two stacks with O(1) head
//! push/pop (`Vec` tail is the head), plus at most one pending paint that is
//! being drawn or edited. Committing moves the pending paint onto the
//! committed stack and clears redo; undo and redo splice between the stacks
//! without touching geometry.

use crate::annotation::Paint;

/// Outcome of [`PaintHistory::commit_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The pending paint was moved onto the committed stack
    Committed,
    /// The pending paint had zero extent and was discarded
    Discarded,
    /// There was no pending paint
    Empty,
}

/// Committed and undone paints plus the in-progress one.
#[derive(Debug, Clone, Default)]
pub struct PaintHistory {
    /// Committed paints; most recent at the tail
    committed: Vec<Paint>,
    /// Undone paints; most recently undone at the tail
    redo: Vec<Paint>,
    /// The paint currently being drawn or edited
    pending: Option<Paint>,
}

impl PaintHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paints in drawing order, oldest first.
    pub fn iter_committed(&self) -> impl Iterator<Item = &Paint> {
        self.committed.iter()
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn pending(&self) -> Option<&Paint> {
        self.pending.as_ref()
    }

    pub fn pending_mut(&mut self) -> Option<&mut Paint> {
        self.pending.as_mut()
    }

    /// Start drawing a new paint. Any previous pending paint is discarded;
    /// the state machine guarantees the session commits or cancels first.
    pub fn set_pending(&mut self, paint: Paint) {
        if let Some(old) = self.pending.replace(paint) {
            log::debug!("discarding stale pending {}", old.kind_name());
        }
    }

    /// Cancel the pending paint without committing it.
    pub fn discard_pending(&mut self) -> Option<Paint> {
        self.pending.take()
    }

    /// Finalize the pending paint into the committed stack.
    ///
    /// A paint that never gained extent (`can_draw` false) is discarded.
    /// A successful commit clears the redo stack: new committed work
    /// invalidates any future history.
    pub fn commit_pending(&mut self) -> CommitOutcome {
        let Some(mut paint) = self.pending.take() else {
            return CommitOutcome::Empty;
        };

        if !paint.can_draw {
            log::debug!("discarding zero-extent {}", paint.kind_name());
            return CommitOutcome::Discarded;
        }

        paint.is_committed = true;
        log::debug!("committed {}", paint.kind_name());
        self.committed.push(paint);
        self.redo.clear();
        CommitOutcome::Committed
    }

    /// Push an already-finalized paint onto the committed stack.
    ///
    /// Used when the session computes commit-time state (the blur cache)
    /// outside the history. Clears the redo stack like any commit.
    pub fn push_committed(&mut self, mut paint: Paint) {
        paint.is_committed = true;
        self.committed.push(paint);
        self.redo.clear();
    }

    /// Move the most recent committed paint onto the redo stack.
    /// No-op when nothing is committed.
    pub fn undo(&mut self) -> bool {
        match self.committed.pop() {
            Some(paint) => {
                log::debug!("undo {}", paint.kind_name());
                self.redo.push(paint);
                true
            }
            None => false,
        }
    }

    /// Move the most recently undone paint back onto the committed stack.
    /// No-op when the redo stack is empty.
    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(paint) => {
                log::debug!("redo {}", paint.kind_name());
                self.committed.push(paint);
                true
            }
            None => false,
        }
    }

    /// Release everything: committed, redo and pending, along with any
    /// surfaces they own (committed blur caches drop with their paints).
    pub fn clear(&mut self) {
        self.committed.clear();
        self.redo.clear();
        self.pending = None;
        log::debug!("paint history cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{BrushPaint, PaintBody, Point, Rgba};

    fn brush_at(x: f32) -> Paint {
        Paint::new(PaintBody::Brush(BrushPaint {
            color: Rgba::new(1.0, 0.0, 0.0, 1.0),
            stroke_width: 2.0,
            points: vec![Point::new(x, 0.0)],
        }))
    }

    fn empty_brush() -> Paint {
        Paint::new(PaintBody::Brush(BrushPaint {
            color: Rgba::new(1.0, 0.0, 0.0, 1.0),
            stroke_width: 2.0,
            points: Vec::new(),
        }))
    }

    #[test]
    fn test_commit_moves_pending_to_committed() {
        let mut h = PaintHistory::new();
        h.set_pending(brush_at(1.0));
        assert_eq!(h.commit_pending(), CommitOutcome::Committed);
        assert_eq!(h.committed_len(), 1);
        assert!(h.pending().is_none());
        assert!(h.iter_committed().next().unwrap().is_committed);
    }

    #[test]
    fn test_zero_extent_commit_discards() {
        let mut h = PaintHistory::new();
        h.set_pending(empty_brush());
        assert_eq!(h.commit_pending(), CommitOutcome::Discarded);
        assert_eq!(h.committed_len(), 0);
        assert!(h.pending().is_none());
    }

    #[test]
    fn test_undo_redo_restores_exact_paint() {
        let mut h = PaintHistory::new();
        h.set_pending(brush_at(7.0));
        h.commit_pending();

        let before: Vec<Paint> = h.iter_committed().cloned().collect();
        assert!(h.undo());
        assert_eq!(h.committed_len(), 0);
        assert_eq!(h.redo_len(), 1);
        assert!(h.redo());

        let after: Vec<Paint> = h.iter_committed().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_undo_redo_noop_on_empty() {
        let mut h = PaintHistory::new();
        assert!(!h.undo());
        assert!(!h.redo());
    }

    #[test]
    fn test_new_commit_clears_redo() {
        // commit(A), commit(B), undo, commit(C), redo
        // -> redo stays empty, committed = [A, C]
        let mut h = PaintHistory::new();
        h.set_pending(brush_at(1.0)); // A
        h.commit_pending();
        h.set_pending(brush_at(2.0)); // B
        h.commit_pending();
        assert!(h.undo());
        h.set_pending(brush_at(3.0)); // C
        h.commit_pending();

        assert_eq!(h.redo_len(), 0);
        assert!(!h.redo());
        let xs: Vec<f32> = h
            .iter_committed()
            .map(|p| match &p.body {
                PaintBody::Brush(b) => b.points[0].x,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(xs, vec![1.0, 3.0]);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut h = PaintHistory::new();
        h.set_pending(brush_at(1.0));
        h.commit_pending();
        h.set_pending(brush_at(2.0));
        h.commit_pending();
        h.undo();
        h.set_pending(brush_at(3.0));

        h.clear();
        assert_eq!(h.committed_len(), 0);
        assert_eq!(h.redo_len(), 0);
        assert!(h.pending().is_none());
    }
}
